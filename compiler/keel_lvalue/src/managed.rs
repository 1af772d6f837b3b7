//! Values paired with the ownership lowering must respect.

use keel_ir::SilType;

use crate::{AccessIrBuilder, LoadQualifier, ValueId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueOwnership {
    /// +1; the holder must consume or destroy it.
    Owned,
    /// +0; valid for the enclosing formal access only.
    Borrowed,
    /// Address of storage being accessed.
    LValue,
    /// No ownership to track.
    Trivial,
}

/// A value plus how it is owned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ManagedValue {
    pub value: ValueId,
    pub ty: SilType,
    pub ownership: ValueOwnership,
}

impl ManagedValue {
    pub fn for_lvalue(value: ValueId, ty: SilType) -> Self {
        ManagedValue {
            value,
            ty: ty.address_type(),
            ownership: ValueOwnership::LValue,
        }
    }

    pub fn owned(value: ValueId, ty: SilType) -> Self {
        ManagedValue {
            value,
            ty,
            ownership: ValueOwnership::Owned,
        }
    }

    pub fn borrowed(value: ValueId, ty: SilType) -> Self {
        ManagedValue {
            value,
            ty,
            ownership: ValueOwnership::Borrowed,
        }
    }

    pub fn trivial(value: ValueId, ty: SilType) -> Self {
        ManagedValue {
            value,
            ty,
            ownership: ValueOwnership::Trivial,
        }
    }

    pub fn is_address(self) -> bool {
        self.ty.is_address()
    }

    pub fn is_plus_one(self) -> bool {
        self.ownership == ValueOwnership::Owned
    }

    /// The same value, viewed as borrowed for the current access.
    #[must_use]
    pub fn borrow(self) -> Self {
        match self.ownership {
            ValueOwnership::Owned => ManagedValue {
                ownership: ValueOwnership::Borrowed,
                ..self
            },
            _ => self,
        }
    }

    /// A +1 copy of an object value, or the value itself if it already
    /// is +1 or needs no copy.
    #[must_use]
    pub fn ensure_plus_one(self, b: &mut AccessIrBuilder) -> Self {
        match self.ownership {
            ValueOwnership::Borrowed => {
                ManagedValue::owned(b.copy_value(self.value), self.ty)
            }
            _ => self,
        }
    }

    /// Read the value stored at an address, copying unless `trivial`.
    pub fn load_from(
        b: &mut AccessIrBuilder,
        addr: ManagedValue,
        trivial: bool,
        take: bool,
    ) -> Self {
        debug_assert!(addr.is_address(), "load from non-address {addr:?}");
        let ty = addr.ty.object_type();
        if trivial {
            return ManagedValue::trivial(b.load(addr.value, LoadQualifier::Trivial), ty);
        }
        let qualifier = if take {
            LoadQualifier::Take
        } else {
            LoadQualifier::Copy
        };
        ManagedValue::owned(b.load(addr.value, qualifier), ty)
    }
}
