//! Symbolic memory for the access IR builder.
//!
//! Every address value is mapped to a [`Place`]: a root (a local, a global,
//! a temporary, a class instance, or an address nobody can see through)
//! followed by field, tuple, payload and opened-existential projections.
//! Access markers and copies are transparent, so two addresses reached
//! through different instructions still compare equal when they name the
//! same storage.
//!
//! The model also remembers the last value known to be in each place. A
//! load from a place with a known value forwards that value, and a load
//! from an unknown place becomes the known value, so repeated loads with
//! no intervening write are recognized as the same value.

use keel_ir::DeclId;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ValueId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PlaceRoot {
    Local(DeclId),
    Global(DeclId),
    Temp(ValueId),
    /// Storage inside the class instance the (resolved) value refers to.
    Object(ValueId),
    /// An address produced by an accessor or key path; it aliases nothing
    /// the model knows about.
    Opaque(ValueId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Projection {
    Field(DeclId),
    Tuple(u32),
    Payload,
    Opened,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Place {
    pub root: PlaceRoot,
    pub path: SmallVec<[Projection; 4]>,
}

impl Place {
    pub fn root(root: PlaceRoot) -> Self {
        Place {
            root,
            path: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn project(&self, projection: Projection) -> Self {
        let mut place = self.clone();
        place.path.push(projection);
        place
    }

    /// Can a write to one place change the other?
    pub fn overlaps(&self, other: &Place) -> bool {
        self.root == other.root
            && self
                .path
                .iter()
                .zip(other.path.iter())
                .all(|(a, b)| a == b)
    }

    /// Local, global and temporary roots are distinct storage from each
    /// other; object and opaque roots may alias anything.
    pub fn is_disjoint_root(&self, other: &Place) -> bool {
        let exclusive = |root: PlaceRoot| {
            matches!(
                root,
                PlaceRoot::Local(_) | PlaceRoot::Global(_) | PlaceRoot::Temp(_)
            )
        };
        exclusive(self.root) && exclusive(other.root) && self.root != other.root
    }
}

#[derive(Default)]
pub struct MemoryModel {
    places: FxHashMap<ValueId, Place>,
    contents: FxHashMap<Place, ValueId>,
    /// Values known to equal an earlier value.
    aliases: FxHashMap<ValueId, ValueId>,
}

impl MemoryModel {
    pub fn bind_place(&mut self, addr: ValueId, place: Place) {
        self.places.insert(addr, place);
    }

    pub fn place(&self, addr: ValueId) -> Option<&Place> {
        self.places.get(&addr)
    }

    /// Record that `value` is the same value as `original`.
    pub fn alias(&mut self, value: ValueId, original: ValueId) {
        let original = self.resolve(original);
        if original != value {
            self.aliases.insert(value, original);
        }
    }

    /// The earliest value known to equal `value`.
    pub fn resolve(&self, mut value: ValueId) -> ValueId {
        while let Some(&original) = self.aliases.get(&value) {
            value = original;
        }
        value
    }

    /// Forget every known value that a write to `place` may change.
    pub fn clobber(&mut self, place: &Place) {
        self.contents.retain(|known, _| !known.overlaps(place));
    }

    /// Forget everything stored under `root`.
    pub fn clobber_root(&mut self, root: PlaceRoot) {
        self.contents.retain(|known, _| known.root != root);
    }

    pub fn store(&mut self, addr: ValueId, value: ValueId) {
        let Some(place) = self.places.get(&addr).cloned() else {
            return;
        };
        self.clobber(&place);
        let value = self.resolve(value);
        self.contents.insert(place, value);
    }

    /// Record a load of `addr` into `dst`, forwarding a known value.
    pub fn load(&mut self, dst: ValueId, addr: ValueId) {
        let Some(place) = self.places.get(&addr).cloned() else {
            return;
        };
        match self.contents.get(&place) {
            Some(&known) => self.alias(dst, known),
            None => {
                self.contents.insert(place, dst);
            }
        }
    }

    pub fn known_value(&self, addr: ValueId) -> Option<ValueId> {
        self.places
            .get(&addr)
            .and_then(|place| self.contents.get(place))
            .copied()
    }

    pub fn copy(&mut self, src: ValueId, dest: ValueId) {
        let known = self.known_value(src);
        match known {
            Some(value) => self.store(dest, value),
            None => self.invalidate(dest),
        }
    }

    /// The storage at `addr` was written by something the model cannot see.
    pub fn invalidate(&mut self, addr: ValueId) {
        if let Some(place) = self.places.get(&addr).cloned() {
            self.clobber(&place);
        }
    }

    pub fn are_obviously_same_value(&self, a: ValueId, b: ValueId) -> bool {
        if self.resolve(a) == self.resolve(b) {
            return true;
        }
        match (self.places.get(&a), self.places.get(&b)) {
            (Some(pa), Some(pb)) => pa == pb,
            _ => false,
        }
    }
}
