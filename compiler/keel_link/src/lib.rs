//! Keel Link - symbol names and linkage for every linkable entity.
//!
//! # Architecture
//!
//! - [`LinkEntity`]: closed sum type of everything that gets a symbol
//! - [`Mangler`] / [`SymbolEncoder`]: deterministic entity → symbol string
//! - [`LinkagePolicy`]: entity → [`LinkageCategory`], plus external availability
//! - [`UniversalLinkageInfo`]: target and compilation-mode facts, and the
//!   lowering of a category to object-level linkage ([`IrLinkage`])
//!
//! Everything here reads a finished [`keel_ir::Program`]; nothing mutates it.
//! Malformed entities (asking a declaration-less entity for its declaration,
//! mangling a compiled function through the general grammar) are internal
//! errors and panic.

mod encoder;
mod entity;
mod linkage;
mod mangle;
mod metadata;
mod target;
mod universal;

pub use encoder::SymbolEncoder;
pub use entity::{
    AssociatedConformance, LinkEntity, LinkEntityKind, MethodRef, SilFunctionRef, SilGlobalRef,
    TypeMetadataAddress, ValueWitness,
};
pub use linkage::{linkage_from_formal, LinkageCategory, LinkageError, LinkagePolicy};
pub use mangle::{
    encode_identifier, Mangler, MANGLE_PREFIX, OBJC_CLASS_PREFIX, OBJC_CLASS_REF_PREFIX,
    OBJC_METACLASS_PREFIX,
};
pub use metadata::{metadata_access_strategy, MetadataAccessStrategy};
pub use target::{ObjectFormat, TargetError, TargetTriple};
pub use universal::{DllStorage, IrLinkage, ObjectLinkage, UniversalLinkageInfo, Visibility};

#[cfg(test)]
mod test_helpers;
