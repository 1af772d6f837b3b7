//! Storage implementation and access-strategy classification.
//!
//! The front end records *how* a var or subscript is implemented; lowering
//! asks *how to access it* for a particular kind of access. The answer is an
//! [`AccessStrategy`]: go straight to storage, call an accessor (directly or
//! through dynamic dispatch), or materialize into a temporary using one
//! strategy to read and another to write back.

use crate::AccessorKind;

/// Formal kind of an access to storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

/// How a storage reference bypasses (or not) the usual accessor rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessSemantics {
    /// Normal access through whatever the declaration provides.
    #[default]
    Ordinary,
    /// Access the backing storage directly (inside observers, initializers).
    DirectToStorage,
    /// Call the declaration's own accessors without dynamic dispatch.
    DirectToImplementation,
}

/// How reads are implemented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReadImpl {
    Stored,
    Get,
    Address,
    Read,
}

/// How writes are implemented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WriteImpl {
    Immutable,
    Stored,
    StoredWithObservers,
    Set,
    MutableAddress,
    Modify,
}

/// How read-modify-write accesses are implemented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReadWriteImpl {
    Immutable,
    Stored,
    MutableAddress,
    Modify,
    /// Read into a temporary, mutate it, write it back.
    MaterializeToTemporary,
}

/// Implementation summary of a var or subscript.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageImpl {
    pub read: ReadImpl,
    pub write: WriteImpl,
    pub read_write: ReadWriteImpl,
}

impl StorageImpl {
    /// Plain mutable stored property.
    pub const fn stored() -> Self {
        StorageImpl {
            read: ReadImpl::Stored,
            write: WriteImpl::Stored,
            read_write: ReadWriteImpl::Stored,
        }
    }

    /// Stored `let` property.
    pub const fn immutable() -> Self {
        StorageImpl {
            read: ReadImpl::Stored,
            write: WriteImpl::Immutable,
            read_write: ReadWriteImpl::Immutable,
        }
    }

    /// Stored property with `willSet`/`didSet` observers.
    pub const fn observed() -> Self {
        StorageImpl {
            read: ReadImpl::Stored,
            write: WriteImpl::StoredWithObservers,
            read_write: ReadWriteImpl::MaterializeToTemporary,
        }
    }

    /// Read-only computed property.
    pub const fn get_only() -> Self {
        StorageImpl {
            read: ReadImpl::Get,
            write: WriteImpl::Immutable,
            read_write: ReadWriteImpl::Immutable,
        }
    }

    /// Computed property with a getter and a setter.
    pub const fn get_set() -> Self {
        StorageImpl {
            read: ReadImpl::Get,
            write: WriteImpl::Set,
            read_write: ReadWriteImpl::MaterializeToTemporary,
        }
    }

    /// Storage reached through addressors.
    pub const fn addressed() -> Self {
        StorageImpl {
            read: ReadImpl::Address,
            write: WriteImpl::MutableAddress,
            read_write: ReadWriteImpl::MutableAddress,
        }
    }

    /// Storage reached through read/modify coroutines.
    pub const fn coroutine() -> Self {
        StorageImpl {
            read: ReadImpl::Read,
            write: WriteImpl::Modify,
            read_write: ReadWriteImpl::Modify,
        }
    }

    pub fn has_storage(&self) -> bool {
        self.read == ReadImpl::Stored
    }

    pub fn supports_mutation(&self) -> bool {
        self.write != WriteImpl::Immutable
    }
}

/// A strategy that does not itself materialize.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DirectStrategy {
    Storage,
    DirectToAccessor(AccessorKind),
    DispatchToAccessor(AccessorKind),
}

/// How to perform one access to a storage declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessStrategy {
    /// Project the underlying storage directly.
    Storage,
    /// Call the named accessor statically.
    DirectToAccessor(AccessorKind),
    /// Call the named accessor through dynamic dispatch.
    DispatchToAccessor(AccessorKind),
    /// Read with one strategy into a temporary, write back with another.
    MaterializeToTemporary {
        read: DirectStrategy,
        write: DirectStrategy,
    },
}

impl AccessStrategy {
    pub fn accessor(self) -> Option<AccessorKind> {
        match self {
            AccessStrategy::DirectToAccessor(kind) | AccessStrategy::DispatchToAccessor(kind) => {
                Some(kind)
            }
            AccessStrategy::Storage | AccessStrategy::MaterializeToTemporary { .. } => None,
        }
    }
}

impl From<DirectStrategy> for AccessStrategy {
    fn from(strategy: DirectStrategy) -> Self {
        match strategy {
            DirectStrategy::Storage => AccessStrategy::Storage,
            DirectStrategy::DirectToAccessor(kind) => AccessStrategy::DirectToAccessor(kind),
            DirectStrategy::DispatchToAccessor(kind) => AccessStrategy::DispatchToAccessor(kind),
        }
    }
}

/// Classify an access to storage with implementation `imp`.
///
/// `dispatch` is true when ordinary accesses to the declaration must go
/// through a vtable or witness table.
///
/// # Panics
/// Panics when asked to write storage that does not support mutation.
pub fn classify_access(
    imp: &StorageImpl,
    semantics: AccessSemantics,
    access: AccessKind,
    dispatch: bool,
) -> AccessStrategy {
    let accessor = |kind| {
        if dispatch && semantics == AccessSemantics::Ordinary {
            DirectStrategy::DispatchToAccessor(kind)
        } else {
            DirectStrategy::DirectToAccessor(kind)
        }
    };

    if semantics == AccessSemantics::DirectToStorage {
        assert!(
            imp.has_storage(),
            "direct-to-storage access on storage without a backing store"
        );
        return AccessStrategy::Storage;
    }

    let read = match imp.read {
        ReadImpl::Stored => DirectStrategy::Storage,
        ReadImpl::Get => accessor(AccessorKind::Get),
        ReadImpl::Address => accessor(AccessorKind::Address),
        ReadImpl::Read => accessor(AccessorKind::Read),
    };
    let write = || match imp.write {
        WriteImpl::Immutable => panic!("write access to immutable storage"),
        WriteImpl::Stored => DirectStrategy::Storage,
        WriteImpl::StoredWithObservers | WriteImpl::Set => accessor(AccessorKind::Set),
        WriteImpl::MutableAddress => accessor(AccessorKind::MutableAddress),
        WriteImpl::Modify => accessor(AccessorKind::Modify),
    };

    match access {
        AccessKind::Read => read.into(),
        AccessKind::Write => write().into(),
        AccessKind::ReadWrite => match imp.read_write {
            ReadWriteImpl::Immutable => panic!("read-write access to immutable storage"),
            ReadWriteImpl::Stored => AccessStrategy::Storage,
            ReadWriteImpl::MutableAddress => accessor(AccessorKind::MutableAddress).into(),
            ReadWriteImpl::Modify => accessor(AccessorKind::Modify).into(),
            ReadWriteImpl::MaterializeToTemporary => AccessStrategy::MaterializeToTemporary {
                read,
                write: write(),
            },
        },
    }
}
