//! Keel IR - the typed entity graph shared by linkage and lvalue lowering.
//!
//! This crate contains the data the backend consumes from the front end:
//! - Names for interned identifiers and spans for source locations
//! - Declarations, canonical types, conformances and substitution maps
//! - Storage implementation info and access-strategy classification
//! - Typed source expressions for assignable expressions
//! - Type lowering (abstraction patterns, lowered physical types)
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: strings → `Name(u32)`, types → `TypeId(u32)`
//! - **Flatten Everything**: children are referenced by arena index, never boxed
//! - **Read-only Consumers**: lowering borrows a finished [`Program`] immutably
//!
//! Types that contain floats store them as u64 bits for Hash compatibility.

mod conformance;
mod decl;
mod expr;
mod id;
mod interner;
mod lowering;
mod name;
mod program;
mod span;
mod storage;
mod types;

pub use conformance::{Conformance, ConformanceKind, SubstitutionMap};
pub use decl::{
    AccessLevel, AccessorKind, AddressorKind, Decl, DeclFlags, DeclKind, FormalLinkage,
    ReferenceOwnership,
};
pub use expr::{Expr, ExprKind};
pub use id::{ConformanceId, DeclId, ExprId, TypeId};
pub use interner::{InternError, StringInterner};
pub use lowering::{AbstractionPattern, ExistentialRepr, LoweredRepr, SilCategory, SilType};
pub use name::Name;
pub use program::Program;
pub use span::Span;
pub use storage::{
    classify_access, AccessKind, AccessSemantics, AccessStrategy, DirectStrategy, ReadImpl,
    ReadWriteImpl, StorageImpl, WriteImpl,
};
pub use types::{KeyPathKind, TupleElement, TypeKind, TypeTable};
