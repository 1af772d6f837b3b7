//! Access kinds, enforcement and the type data every path component carries.

use std::fmt;

use keel_ir::{AbstractionPattern, AccessKind, SilType, TypeId};

/// What the consumer of an lvalue will do with it.
///
/// Reads are further split by whether the consumer wants the value in
/// memory or as an object, and whether it needs its own (+1) copy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LValueAccessKind {
    /// Evaluated only for side effects.
    IgnoredRead,
    BorrowedAddressRead,
    BorrowedObjectRead,
    OwnedAddressRead,
    OwnedObjectRead,
    Write,
    ReadWrite,
}

impl LValueAccessKind {
    pub fn is_read(self) -> bool {
        !matches!(self, LValueAccessKind::Write | LValueAccessKind::ReadWrite)
    }

    /// Does a read need its own copy of the value?
    pub fn is_owned_read(self) -> bool {
        matches!(
            self,
            LValueAccessKind::OwnedAddressRead | LValueAccessKind::OwnedObjectRead
        )
    }

    pub fn is_address_read(self) -> bool {
        matches!(
            self,
            LValueAccessKind::BorrowedAddressRead | LValueAccessKind::OwnedAddressRead
        )
    }

    /// The formal access this performs on the underlying storage.
    pub fn formal(self) -> AccessKind {
        match self {
            LValueAccessKind::Write => AccessKind::Write,
            LValueAccessKind::ReadWrite => AccessKind::ReadWrite,
            _ => AccessKind::Read,
        }
    }

    /// Same access, but wanting the value in memory.
    #[must_use]
    pub fn to_address(self) -> Self {
        match self {
            LValueAccessKind::IgnoredRead | LValueAccessKind::BorrowedObjectRead => {
                LValueAccessKind::BorrowedAddressRead
            }
            LValueAccessKind::OwnedObjectRead => LValueAccessKind::OwnedAddressRead,
            other => other,
        }
    }

    /// Access kind of the scope marker that guards this access.
    pub fn marker(self) -> AccessMarker {
        if self.is_read() {
            AccessMarker::Read
        } else {
            AccessMarker::Modify
        }
    }
}

impl fmt::Display for LValueAccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LValueAccessKind::IgnoredRead => "ignored-read",
            LValueAccessKind::BorrowedAddressRead => "borrowed-address-read",
            LValueAccessKind::BorrowedObjectRead => "borrowed-object-read",
            LValueAccessKind::OwnedAddressRead => "owned-address-read",
            LValueAccessKind::OwnedObjectRead => "owned-object-read",
            LValueAccessKind::Write => "write",
            LValueAccessKind::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// Kind recorded on an access scope marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessMarker {
    Read,
    Modify,
    /// Initialization of uninitialized memory.
    Init,
}

/// How an access scope is checked for exclusivity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Enforcement {
    /// Proven statically.
    Static,
    /// Checked at runtime.
    Dynamic,
    /// Not yet decided; a later pass picks static or dynamic.
    Unknown,
    /// Not checked (debugger variables, addressor results).
    Unsafe,
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Enforcement::Static => "static",
            Enforcement::Dynamic => "dynamic",
            Enforcement::Unknown => "unknown",
            Enforcement::Unsafe => "unsafe",
        };
        f.write_str(s)
    }
}

/// Types seen by one path component.
///
/// `type_of_rvalue` is always an object type: the lowered type of the value
/// the component reads or writes, in the representation the component
/// produces it in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LValueTypeData {
    pub access_kind: LValueAccessKind,
    pub orig_formal_type: AbstractionPattern,
    pub subst_formal_type: TypeId,
    pub type_of_rvalue: SilType,
}

impl LValueTypeData {
    pub fn new(
        access_kind: LValueAccessKind,
        orig_formal_type: AbstractionPattern,
        subst_formal_type: TypeId,
        type_of_rvalue: SilType,
    ) -> Self {
        LValueTypeData {
            access_kind,
            orig_formal_type,
            subst_formal_type,
            type_of_rvalue: type_of_rvalue.object_type(),
        }
    }
}
