//! How type metadata is accessed, which decides the linkage of caches,
//! access functions and value witness tables.

use keel_ir::{DeclFlags, FormalLinkage, Program, TypeId, TypeKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetadataAccessStrategy {
    /// A unique public access function in the defining module.
    PublicUniqueAccessor,
    /// A unique access function visible within the defining module.
    HiddenUniqueAccessor,
    /// A file-private access function.
    PrivateAccessor,
    /// Foreign type: every user emits its own accessor and the runtime
    /// uniques the candidate metadata.
    ForeignAccessor,
    /// Every user emits its own accessor (generic instances, structural
    /// types, lazily generated metadata).
    NonUniqueAccessor,
}

impl MetadataAccessStrategy {
    /// Strategies whose accessor is emitted on demand in each user.
    pub fn is_lazily_generated(self) -> bool {
        matches!(
            self,
            MetadataAccessStrategy::ForeignAccessor | MetadataAccessStrategy::NonUniqueAccessor
        )
    }
}

/// Classify how metadata for `ty` is accessed.
pub fn metadata_access_strategy(program: &Program, ty: TypeId) -> MetadataAccessStrategy {
    let TypeKind::Nominal { decl, args } = program.type_kind(ty) else {
        return MetadataAccessStrategy::NonUniqueAccessor;
    };
    if !args.is_empty() {
        return MetadataAccessStrategy::NonUniqueAccessor;
    }
    if program.is_foreign_module(program.module_of(*decl)) {
        return MetadataAccessStrategy::ForeignAccessor;
    }
    let nominal = program.decl(*decl);
    if nominal.has(DeclFlags::LAZY_METADATA) {
        return MetadataAccessStrategy::NonUniqueAccessor;
    }
    match nominal.formal_linkage {
        FormalLinkage::PublicUnique => MetadataAccessStrategy::PublicUniqueAccessor,
        FormalLinkage::HiddenUnique => MetadataAccessStrategy::HiddenUniqueAccessor,
        FormalLinkage::Private => MetadataAccessStrategy::PrivateAccessor,
        FormalLinkage::PublicNonUnique => MetadataAccessStrategy::NonUniqueAccessor,
    }
}
