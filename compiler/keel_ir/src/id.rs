//! Arena indices for the entity graph.
//!
//! Every entity owned by [`Program`](crate::Program) is addressed by a
//! 32-bit index. Indices are `Copy`, compare in O(1), and never own the
//! entity they refer to, so link entities and access components can hold
//! them freely for the lifetime of a compilation.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw arena index.
            #[inline]
            pub const fn new(index: u32) -> Self {
                $name(index)
            }

            /// Index into the owning arena.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[expect(
                clippy::cast_possible_truncation,
                reason = "arenas are capped well below u32::MAX entries"
            )]
            pub(crate) fn from_len(len: usize) -> Self {
                assert!(len < u32::MAX as usize, concat!($label, " arena overflow"));
                $name(len as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

define_id!(
    /// Index of a declaration (module, nominal, extension, member, accessor, ...).
    DeclId,
    "DeclId"
);
define_id!(
    /// Index of a hash-consed type. Equal ids mean equal canonical types.
    TypeId,
    "TypeId"
);
define_id!(
    /// Index of a protocol conformance.
    ConformanceId,
    "ConformanceId"
);
define_id!(
    /// Index of a source expression.
    ExprId,
    "ExprId"
);
