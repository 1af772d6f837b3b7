//! Canonical types.
//!
//! Types are hash-consed in a [`TypeTable`]: structurally equal kinds get the
//! same [`TypeId`], so type equality is id equality.

use rustc_hash::FxHashMap;

use crate::{DeclId, Name, ReferenceOwnership, TypeId};

/// Mutability flavour of a key path value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyPathKind {
    ReadOnly,
    Writable,
    ReferenceWritable,
}

/// One element of a tuple type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TupleElement {
    pub label: Option<Name>,
    pub ty: TypeId,
}

/// Structure of a canonical type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Compiler builtin (`Int64`, `NativeObject`, ...).
    Builtin(Name),
    /// Struct, enum, class or protocol type, possibly generic.
    Nominal { decl: DeclId, args: Vec<TypeId> },
    Tuple(Vec<TupleElement>),
    Function { params: Vec<TypeId>, result: TypeId },
    Optional(TypeId),
    Metatype(TypeId),
    ExistentialMetatype(TypeId),
    /// Protocol composition; empty means `Any`.
    Existential(Vec<DeclId>),
    /// Concrete type hidden inside an existential, bound while it is open.
    OpenedArchetype { existential: TypeId, id: u32 },
    GenericParam { depth: u32, index: u32 },
    /// Associated type of a generic parameter, `T.Element`.
    DependentMember { base: TypeId, assoc: DeclId },
    /// `weak` / `unowned` storage of a class reference.
    ReferenceStorage { ownership: ReferenceOwnership, referent: TypeId },
    /// Type of an assignable expression.
    LValue(TypeId),
    /// Type of an `&x` argument expression.
    InOut(TypeId),
    KeyPath { kind: KeyPathKind, root: TypeId, value: TypeId },
    /// Lowered function type; non-empty `yields` marks a coroutine.
    LoweredFunction { params: Vec<TypeId>, yields: Vec<TypeId>, results: Vec<TypeId> },
}

/// Hash-consing table for types.
#[derive(Default)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
    dedup: FxHashMap<TypeKind, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `kind`, returning the existing id for an equal kind.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.dedup.get(&kind) {
            return id;
        }
        let id = TypeId::from_len(self.kinds.len());
        self.kinds.push(kind.clone());
        self.dedup.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
