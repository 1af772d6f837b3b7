//! Declarations of the entity graph.
//!
//! Declarations form a tree through their `parent` links: a module at the
//! root, nominal types, protocols and extensions below it, and members below
//! those. Storage declarations (vars and subscripts) additionally list their
//! accessor declarations.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::{DeclId, Name, Span, StorageImpl, TypeId};

/// Source-level access control.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessLevel {
    Private,
    FilePrivate,
    Internal,
    Public,
    /// Public and overridable/subclassable outside the defining module.
    Open,
}

/// Externally-visible uniqueness of a declaration's symbols.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum FormalLinkage {
    /// Exactly one public definition exists, in the defining module.
    PublicUnique,
    /// Public, but every referencing module may emit its own copy.
    PublicNonUnique,
    /// Visible across files of the defining module only.
    HiddenUnique,
    /// Visible in its own file only.
    Private,
}

impl FormalLinkage {
    /// Default classification for a declaration with the given access level.
    pub fn from_access(access: AccessLevel) -> Self {
        match access {
            AccessLevel::Public | AccessLevel::Open => FormalLinkage::PublicUnique,
            AccessLevel::Internal => FormalLinkage::HiddenUnique,
            AccessLevel::Private | AccessLevel::FilePrivate => FormalLinkage::Private,
        }
    }
}

/// Accessor flavours a storage declaration may provide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessorKind {
    Get,
    Set,
    /// Yield-once read coroutine.
    Read,
    /// Yield-once modify coroutine.
    Modify,
    /// Returns a pointer to the storage for reading.
    Address,
    /// Returns a pointer to the storage for mutation.
    MutableAddress,
    WillSet,
    DidSet,
}

impl AccessorKind {
    pub fn is_coroutine(self) -> bool {
        matches!(self, AccessorKind::Read | AccessorKind::Modify)
    }

    pub fn is_addressor(self) -> bool {
        matches!(self, AccessorKind::Address | AccessorKind::MutableAddress)
    }
}

/// Ownership convention of the buffer returned by an addressor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressorKind {
    /// Plain pointer; the caller must not outlive the base access.
    Unsafe,
    /// Pointer plus an owner reference the caller must release.
    Owning,
    /// Pointer plus a native owner reference the caller must release.
    NativeOwning,
}

/// Reference ownership of a stored property.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceOwnership {
    Strong,
    Weak,
    Unowned,
}

bitflags! {
    /// Boolean properties of a declaration.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DeclFlags: u32 {
        /// Synthesized by the compiler (implicit `self`, default accessors).
        const IMPLICIT = 1 << 0;
        /// Layout may change without recompiling clients.
        const RESILIENT = 1 << 1;
        /// Function or accessor takes `self` inout.
        const MUTATING = 1 << 2;
        /// Immutable binding.
        const LET = 1 << 3;
        /// Static (type-level) member.
        const STATIC = 1 << 4;
        /// Variable created by a debugger expression.
        const DEBUGGER_VAR = 1 << 5;
        /// Module imported from a foreign (C / Objective-C) header.
        const FOREIGN = 1 << 6;
        /// Nominal whose metadata accessor is generated lazily on use.
        const LAZY_METADATA = 1 << 7;
        /// Member dispatched through a vtable or witness table.
        const DYNAMIC_DISPATCH = 1 << 8;
        /// Class-constrained protocol.
        const CLASS_BOUND = 1 << 9;
        /// The `Error` protocol; existentials of it are boxed.
        const ERROR_PROTOCOL = 1 << 10;
        /// Nominal with generic parameters.
        const GENERIC = 1 << 11;
        /// Parameter declaration for `self`.
        const SELF_PARAM = 1 << 12;
        /// Module is the standard library.
        const STDLIB = 1 << 13;
        /// Class exposed to the Objective-C runtime.
        const OBJC = 1 << 14;
        /// Nominal whose metadata needs singleton initialization.
        const SINGLETON_METADATA = 1 << 15;
    }
}

/// The kind-specific payload of a declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Module,
    Struct,
    Enum,
    Class {
        superclass: Option<DeclId>,
    },
    Protocol,
    Extension {
        extended: DeclId,
    },
    /// Closure or other unnamed context.
    AnonymousContext {
        discriminator: u32,
    },
    AssociatedType,
    Func {
        ty: TypeId,
    },
    Constructor {
        ty: TypeId,
        arg_labels: SmallVec<[Name; 2]>,
    },
    Accessor {
        storage: DeclId,
        kind: AccessorKind,
        addressor: Option<AddressorKind>,
        ty: TypeId,
    },
    Var {
        ty: TypeId,
        storage: StorageImpl,
        ownership: ReferenceOwnership,
    },
    Param {
        ty: TypeId,
    },
    Subscript {
        index_ty: TypeId,
        element_ty: TypeId,
        storage: StorageImpl,
    },
    EnumElement {
        payload: Option<TypeId>,
    },
}

impl DeclKind {
    /// Short, stable name of the kind for dumps and panics.
    pub fn describe(&self) -> &'static str {
        match self {
            DeclKind::Module => "module",
            DeclKind::Struct => "struct",
            DeclKind::Enum => "enum",
            DeclKind::Class { .. } => "class",
            DeclKind::Protocol => "protocol",
            DeclKind::Extension { .. } => "extension",
            DeclKind::AnonymousContext { .. } => "anonymous context",
            DeclKind::AssociatedType => "associated type",
            DeclKind::Func { .. } => "func",
            DeclKind::Constructor { .. } => "constructor",
            DeclKind::Accessor { .. } => "accessor",
            DeclKind::Var { .. } => "var",
            DeclKind::Param { .. } => "param",
            DeclKind::Subscript { .. } => "subscript",
            DeclKind::EnumElement { .. } => "enum element",
        }
    }
}

/// A declaration in the entity graph.
#[derive(Clone, Debug)]
pub struct Decl {
    pub name: Name,
    pub kind: DeclKind,
    pub parent: Option<DeclId>,
    pub access: AccessLevel,
    pub formal_linkage: FormalLinkage,
    pub flags: DeclFlags,
    pub span: Span,
    /// Runtime-visible class name for Objective-C interop.
    pub objc_name: Option<Name>,
    /// Accessor declarations of a var or subscript.
    pub accessors: SmallVec<[DeclId; 2]>,
}

impl Decl {
    pub fn is_nominal(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Struct | DeclKind::Enum | DeclKind::Class { .. } | DeclKind::Protocol
        )
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, DeclKind::Class { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self.kind, DeclKind::Protocol)
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.kind, DeclKind::Var { .. } | DeclKind::Subscript { .. })
    }

    pub fn is_context(&self) -> bool {
        self.is_nominal()
            || matches!(
                self.kind,
                DeclKind::Module | DeclKind::Extension { .. } | DeclKind::AnonymousContext { .. }
            )
    }

    pub fn storage_impl(&self) -> Option<&StorageImpl> {
        match &self.kind {
            DeclKind::Var { storage, .. } | DeclKind::Subscript { storage, .. } => Some(storage),
            _ => None,
        }
    }

    pub fn has(&self, flags: DeclFlags) -> bool {
        self.flags.contains(flags)
    }
}
