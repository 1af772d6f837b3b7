//! Linkage policy: which linkage category each link entity gets, and
//! whether a definition emitted here duplicates one owned elsewhere.
//!
//! # Architecture
//!
//! The policy is a per-kind decision table, not a formula. Entities that
//! wrap a declaration first compute the declaration's *effective* formal
//! linkage ([`LinkagePolicy::effective_formal_linkage`]): protocol
//! requirements borrow their protocol's linkage, initializers of open
//! classes borrow the class's, and field offsets of resilient classes are
//! capped at hidden. The result goes through [`linkage_from_formal`].
//! Witness tables and conformance descriptors follow the conformance's own
//! linkage; metadata caches and accessors follow the type's metadata access
//! strategy.
//!
//! Malformed input (a non-unique public field offset in a resilient class)
//! is a [`LinkageError`] from [`LinkagePolicy::try_linkage_for`] and a
//! panic from [`LinkagePolicy::linkage_for`].

use std::fmt;

use keel_ir::{
    AccessLevel, AccessorKind, ConformanceId, DeclFlags, DeclId, DeclKind, FormalLinkage,
    Program, TypeId,
};
use thiserror::Error;
use tracing::trace;

use crate::{
    metadata_access_strategy, LinkEntity, LinkEntityKind, MetadataAccessStrategy,
    TypeMetadataAddress,
};

/// Linkage of an emitted symbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LinkageCategory {
    /// Defined here, visible to other modules.
    Public,
    /// Defined in another module.
    PublicExternal,
    /// Defined here, visible to other files of this module.
    Hidden,
    /// Defined in another file of this module.
    HiddenExternal,
    /// Visible to this file only.
    Private,
    /// May be emitted by every user; duplicates are merged.
    Shared,
}

impl LinkageCategory {
    /// Does the canonical definition live somewhere else?
    pub fn is_external(self) -> bool {
        matches!(
            self,
            LinkageCategory::PublicExternal | LinkageCategory::HiddenExternal
        )
    }

    /// The category a reference to a symbol with this linkage uses.
    #[must_use]
    pub fn for_declaration(self) -> Self {
        match self {
            LinkageCategory::Public => LinkageCategory::PublicExternal,
            LinkageCategory::Hidden => LinkageCategory::HiddenExternal,
            other => other,
        }
    }
}

impl fmt::Display for LinkageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkageCategory::Public => "public",
            LinkageCategory::PublicExternal => "public_external",
            LinkageCategory::Hidden => "hidden",
            LinkageCategory::HiddenExternal => "hidden_external",
            LinkageCategory::Private => "private",
            LinkageCategory::Shared => "shared",
        };
        f.write_str(s)
    }
}

/// Linkage of a declaration-derived symbol that need not be unique.
pub fn linkage_from_formal(formal: FormalLinkage, for_definition: bool) -> LinkageCategory {
    match formal {
        FormalLinkage::PublicUnique | FormalLinkage::PublicNonUnique => {
            if for_definition {
                LinkageCategory::Shared
            } else {
                LinkageCategory::PublicExternal
            }
        }
        FormalLinkage::HiddenUnique => {
            if for_definition {
                LinkageCategory::Shared
            } else {
                LinkageCategory::HiddenExternal
            }
        }
        FormalLinkage::Private => LinkageCategory::Private,
    }
}

/// Malformed input to the linkage policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkageError {
    #[error("field offset of '{field}' in resilient class cannot have public non-unique linkage")]
    NonUniqueResilientFieldOffset { field: String },
    #[error("{kind} is only ever relatively referenced and has no external availability")]
    RelativeReferenceOnly { kind: LinkEntityKind },
}

/// Linkage decisions for one compiled module.
pub struct LinkagePolicy<'p> {
    program: &'p Program,
    /// The module being compiled.
    module: DeclId,
}

impl<'p> LinkagePolicy<'p> {
    pub fn new(program: &'p Program, module: DeclId) -> Self {
        LinkagePolicy { program, module }
    }

    pub fn module(&self) -> DeclId {
        self.module
    }

    /// # Panics
    /// Panics on malformed input; see [`LinkagePolicy::try_linkage_for`].
    pub fn linkage_for(&self, entity: &LinkEntity, for_definition: bool) -> LinkageCategory {
        match self.try_linkage_for(entity, for_definition) {
            Ok(linkage) => linkage,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_linkage_for(
        &self,
        entity: &LinkEntity,
        for_definition: bool,
    ) -> Result<LinkageCategory, LinkageError> {
        let linkage = self.linkage_impl(entity, for_definition)?;
        trace!(kind = %entity.kind(), for_definition, %linkage, "linkage");
        Ok(linkage)
    }

    fn linkage_impl(
        &self,
        entity: &LinkEntity,
        for_definition: bool,
    ) -> Result<LinkageCategory, LinkageError> {
        let from_decl = |formal: FormalLinkage| -> Result<LinkageCategory, LinkageError> {
            Ok(linkage_from_formal(formal, for_definition))
        };

        match *entity {
            LinkEntity::DispatchThunk(_)
            | LinkEntity::DispatchThunkInitializer(_)
            | LinkEntity::DispatchThunkAllocator(_)
            | LinkEntity::MethodDescriptor(_)
            | LinkEntity::MethodDescriptorInitializer(_)
            | LinkEntity::MethodDescriptorAllocator(_)
            | LinkEntity::FieldOffset(_)
            | LinkEntity::PropertyDescriptor(_)
            | LinkEntity::AssociatedTypeDescriptor(_)
            | LinkEntity::EnumCase(_)
            | LinkEntity::AssociatedConformanceDescriptor { .. }
            | LinkEntity::ObjCClass(_)
            | LinkEntity::ObjCMetaclass(_)
            | LinkEntity::SwiftMetaclassStub(_)
            | LinkEntity::NominalTypeDescriptor(_)
            | LinkEntity::ClassMetadataBaseOffset(_)
            | LinkEntity::ProtocolDescriptor(_)
            | LinkEntity::ProtocolRequirementsBaseDescriptor(_)
            | LinkEntity::MethodLookupFunction(_) => {
                from_decl(self.try_effective_formal_linkage(entity)?)
            }

            LinkEntity::ValueWitnessTable(ty) => {
                if self.program.nominal_decl_of_type(ty).is_none() {
                    return from_decl(FormalLinkage::PublicUnique);
                }
                Ok(self.lazy_accessor_linkage(ty))
            }
            LinkEntity::TypeMetadataLazyCacheVariable(ty) => Ok(self.lazy_accessor_linkage(ty)),

            LinkEntity::TypeMetadataInstantiationCache(_)
            | LinkEntity::TypeMetadataInstantiationFunction(_)
            | LinkEntity::TypeMetadataSingletonInitializationCache(_)
            | LinkEntity::TypeMetadataCompletionFunction(_)
            | LinkEntity::TypeMetadataPattern(_)
            | LinkEntity::ObjCClassRef(_)
            | LinkEntity::AssociatedTypeWitnessTableAccessFunction { .. }
            | LinkEntity::DefaultAssociatedConformanceAccessor { .. }
            | LinkEntity::GenericProtocolWitnessTableCache(_)
            | LinkEntity::GenericProtocolWitnessTableInstantiationFunction(_) => {
                Ok(LinkageCategory::Private)
            }

            LinkEntity::TypeMetadata { ty, address } => match address {
                TypeMetadataAddress::FullMetadata => Ok(LinkageCategory::Private),
                TypeMetadataAddress::AddressPoint => from_decl(
                    self.type_formal_linkage(ty)
                        .unwrap_or(FormalLinkage::PublicUnique),
                ),
            },

            LinkEntity::ValueWitness { ty, .. } => from_decl(
                self.type_formal_linkage(ty)
                    .unwrap_or(FormalLinkage::PublicNonUnique),
            ),

            LinkEntity::ForeignTypeMetadataCandidate(_)
            | LinkEntity::ModuleDescriptor(_)
            | LinkEntity::ExtensionDescriptor(_)
            | LinkEntity::AnonymousDescriptor(_) => Ok(LinkageCategory::Shared),

            LinkEntity::TypeMetadataAccessFunction(ty) => {
                match metadata_access_strategy(self.program, ty) {
                    MetadataAccessStrategy::PublicUniqueAccessor => {
                        from_decl(FormalLinkage::PublicUnique)
                    }
                    MetadataAccessStrategy::HiddenUniqueAccessor => {
                        from_decl(FormalLinkage::HiddenUnique)
                    }
                    MetadataAccessStrategy::PrivateAccessor => from_decl(FormalLinkage::Private),
                    MetadataAccessStrategy::ForeignAccessor
                    | MetadataAccessStrategy::NonUniqueAccessor => Ok(LinkageCategory::Shared),
                }
            }

            LinkEntity::CoroutineContinuationPrototype(_) => Ok(LinkageCategory::PublicExternal),

            LinkEntity::DirectProtocolWitnessTable(conformance)
            | LinkEntity::ProtocolWitnessTableAccessFunction(conformance)
            | LinkEntity::ProtocolConformanceDescriptor(conformance) => {
                Ok(self.conformance_linkage(conformance, for_definition))
            }

            LinkEntity::ProtocolWitnessTablePattern(conformance)
            | LinkEntity::ResilientProtocolWitnessTable(conformance)
            | LinkEntity::ReflectionAssociatedTypeDescriptor(conformance) => {
                Ok(self.shared_or_private(conformance, for_definition))
            }

            LinkEntity::ProtocolWitnessTableLazyAccessFunction { ty, conformance }
            | LinkEntity::ProtocolWitnessTableLazyCacheVariable { ty, conformance } => {
                let nominal_private =
                    self.type_formal_linkage(ty) == Some(FormalLinkage::Private);
                let conformance_private = self.conformance_linkage(conformance, for_definition)
                    == LinkageCategory::Private;
                if nominal_private || conformance_private {
                    Ok(LinkageCategory::Private)
                } else {
                    Ok(LinkageCategory::Shared)
                }
            }

            LinkEntity::SilFunction(function) => Ok(if for_definition {
                function.linkage
            } else {
                function.linkage.for_declaration()
            }),
            LinkEntity::SilGlobalVariable(global) => Ok(if for_definition {
                global.linkage
            } else {
                global.linkage.for_declaration()
            }),

            LinkEntity::ReflectionBuiltinDescriptor(ty)
            | LinkEntity::ReflectionFieldDescriptor(ty) => {
                if self.type_formal_linkage(ty) == Some(FormalLinkage::PublicNonUnique) {
                    Ok(LinkageCategory::Shared)
                } else {
                    Ok(LinkageCategory::Private)
                }
            }
        }
    }

    /// Formal linkage a declaration-wrapping entity routes through, after
    /// the protocol-requirement, open-class-initializer and resilient
    /// field-offset rules. `None` for entities that do not wrap a
    /// declaration.
    ///
    /// # Panics
    /// Panics on malformed input, like [`LinkagePolicy::linkage_for`].
    pub fn effective_formal_linkage(&self, entity: &LinkEntity) -> Option<FormalLinkage> {
        match self.try_effective_formal_linkage(entity) {
            Ok(formal) => Some(formal),
            Err(LinkageError::RelativeReferenceOnly { .. }) => None,
            Err(err) => panic!("{err}"),
        }
    }

    fn try_effective_formal_linkage(
        &self,
        entity: &LinkEntity,
    ) -> Result<FormalLinkage, LinkageError> {
        let program = self.program;
        let formal = |decl: DeclId| program.decl(decl).formal_linkage;

        match *entity {
            LinkEntity::DispatchThunk(decl)
            | LinkEntity::DispatchThunkInitializer(decl)
            | LinkEntity::DispatchThunkAllocator(decl) => {
                Ok(formal(program.requirement_protocol(decl).unwrap_or(decl)))
            }

            LinkEntity::MethodDescriptor(decl)
            | LinkEntity::MethodDescriptorInitializer(decl)
            | LinkEntity::MethodDescriptorAllocator(decl) => {
                let decl = program.requirement_protocol(decl).unwrap_or(decl);
                Ok(formal(self.open_class_initializer_owner(decl).unwrap_or(decl)))
            }

            LinkEntity::FieldOffset(field) => {
                let mut linkage = formal(field);
                let resilient_class = program.decl(field).parent.is_some_and(|parent| {
                    let parent = program.decl(parent);
                    parent.is_class() && parent.has(DeclFlags::RESILIENT)
                });
                if resilient_class {
                    if linkage == FormalLinkage::PublicNonUnique {
                        return Err(LinkageError::NonUniqueResilientFieldOffset {
                            field: program.decl_name(field).to_string(),
                        });
                    }
                    if linkage == FormalLinkage::PublicUnique {
                        linkage = FormalLinkage::HiddenUnique;
                    }
                }
                Ok(linkage)
            }

            LinkEntity::PropertyDescriptor(storage) => Ok(formal(
                program.accessor(storage, AccessorKind::Get).unwrap_or(storage),
            )),

            LinkEntity::AssociatedTypeDescriptor(assoc) => {
                let protocol = program.requirement_protocol(assoc).unwrap_or_else(|| {
                    panic!("associated type '{}' outside a protocol", program.decl_name(assoc))
                });
                Ok(formal(protocol))
            }

            LinkEntity::EnumCase(decl)
            | LinkEntity::AssociatedConformanceDescriptor { protocol: decl, .. }
            | LinkEntity::ObjCClass(decl)
            | LinkEntity::ObjCMetaclass(decl)
            | LinkEntity::SwiftMetaclassStub(decl)
            | LinkEntity::NominalTypeDescriptor(decl)
            | LinkEntity::ClassMetadataBaseOffset(decl)
            | LinkEntity::ProtocolDescriptor(decl)
            | LinkEntity::ProtocolRequirementsBaseDescriptor(decl)
            | LinkEntity::MethodLookupFunction(decl) => Ok(formal(decl)),

            _ => Err(LinkageError::RelativeReferenceOnly {
                kind: entity.kind(),
            }),
        }
    }

    /// The open class owning a non-private initializer, if any.
    fn open_class_initializer_owner(&self, decl: DeclId) -> Option<DeclId> {
        let d = self.program.decl(decl);
        if !matches!(d.kind, DeclKind::Constructor { .. })
            || d.formal_linkage == FormalLinkage::Private
        {
            return None;
        }
        let class = d.parent?;
        let class_decl = self.program.decl(class);
        (class_decl.is_class() && class_decl.access == AccessLevel::Open).then_some(class)
    }

    fn type_formal_linkage(&self, ty: TypeId) -> Option<FormalLinkage> {
        self.program
            .nominal_decl_of_type(ty)
            .map(|decl| self.program.decl(decl).formal_linkage)
    }

    fn lazy_accessor_linkage(&self, ty: TypeId) -> LinkageCategory {
        if metadata_access_strategy(self.program, ty).is_lazily_generated() {
            LinkageCategory::Shared
        } else {
            LinkageCategory::Private
        }
    }

    fn shared_or_private(
        &self,
        conformance: ConformanceId,
        for_definition: bool,
    ) -> LinkageCategory {
        if self.conformance_linkage(conformance, for_definition) == LinkageCategory::Shared {
            LinkageCategory::Shared
        } else {
            LinkageCategory::Private
        }
    }

    /// Linkage of a conformance's witness table and descriptor.
    ///
    /// Conformances declared in foreign modules are synthesized by every
    /// user and are shared. Otherwise the conformance is as visible as the
    /// less visible of its protocol and its conforming type.
    pub fn conformance_linkage(
        &self,
        conformance: ConformanceId,
        for_definition: bool,
    ) -> LinkageCategory {
        let program = self.program;
        let root = program.conformance(program.root_conformance(conformance));
        if program.is_foreign_module(program.module_of(root.context)) {
            return LinkageCategory::Shared;
        }

        let protocol_access = program.decl(root.protocol).access;
        let type_access = program
            .nominal_decl_of_type(root.ty)
            .map_or(AccessLevel::Public, |decl| program.decl(decl).access);

        match protocol_access.min(type_access) {
            AccessLevel::Private | AccessLevel::FilePrivate => LinkageCategory::Private,
            AccessLevel::Internal => {
                if for_definition {
                    LinkageCategory::Hidden
                } else {
                    LinkageCategory::HiddenExternal
                }
            }
            AccessLevel::Public | AccessLevel::Open => {
                if for_definition {
                    LinkageCategory::Public
                } else {
                    LinkageCategory::PublicExternal
                }
            }
        }
    }

    // ── External availability ───────────────────────────────────────

    /// Is a definition of `entity` emitted here only a discardable copy of
    /// one owned by another module?
    ///
    /// # Panics
    /// Panics for kinds that are only ever relatively referenced.
    pub fn is_available_externally(&self, entity: &LinkEntity) -> bool {
        match self.try_is_available_externally(entity) {
            Ok(available) => available,
            Err(err) => panic!("relative reference to unsupported link entity: {err}"),
        }
    }

    pub fn try_is_available_externally(&self, entity: &LinkEntity) -> Result<bool, LinkageError> {
        let program = self.program;
        match *entity {
            LinkEntity::DispatchThunk(decl)
            | LinkEntity::DispatchThunkInitializer(decl)
            | LinkEntity::DispatchThunkAllocator(decl)
            | LinkEntity::MethodDescriptor(decl)
            | LinkEntity::MethodDescriptorInitializer(decl)
            | LinkEntity::MethodDescriptorAllocator(decl)
            | LinkEntity::AssociatedConformanceDescriptor { protocol: decl, .. }
            | LinkEntity::SwiftMetaclassStub(decl)
            | LinkEntity::ClassMetadataBaseOffset(decl)
            | LinkEntity::PropertyDescriptor(decl)
            | LinkEntity::NominalTypeDescriptor(decl)
            | LinkEntity::ProtocolDescriptor(decl)
            | LinkEntity::ProtocolRequirementsBaseDescriptor(decl)
            | LinkEntity::MethodLookupFunction(decl)
            | LinkEntity::EnumCase(decl) => Ok(self.decl_available_externally(decl)),

            LinkEntity::AssociatedTypeDescriptor(assoc) => Ok(self.decl_available_externally(
                program.requirement_protocol(assoc).unwrap_or(assoc),
            )),

            LinkEntity::ValueWitnessTable(ty) | LinkEntity::TypeMetadata { ty, .. } => {
                Ok(self.type_available_externally(ty))
            }

            LinkEntity::ForeignTypeMetadataCandidate(ty) => {
                assert!(
                    !self.type_available_externally(ty),
                    "foreign metadata candidate for a type owned by another native module"
                );
                Ok(false)
            }

            LinkEntity::ObjCClass(_) | LinkEntity::ObjCMetaclass(_) => Ok(true),

            LinkEntity::DirectProtocolWitnessTable(conformance)
            | LinkEntity::ProtocolConformanceDescriptor(conformance) => {
                let root = program.conformance(program.root_conformance(conformance));
                Ok(self.context_available_externally(root.context))
            }

            LinkEntity::ProtocolWitnessTablePattern(_)
            | LinkEntity::ResilientProtocolWitnessTable(_)
            | LinkEntity::ObjCClassRef(_)
            | LinkEntity::ModuleDescriptor(_)
            | LinkEntity::ExtensionDescriptor(_)
            | LinkEntity::AnonymousDescriptor(_)
            | LinkEntity::TypeMetadataInstantiationCache(_)
            | LinkEntity::TypeMetadataInstantiationFunction(_)
            | LinkEntity::TypeMetadataSingletonInitializationCache(_)
            | LinkEntity::TypeMetadataCompletionFunction(_)
            | LinkEntity::TypeMetadataPattern(_)
            | LinkEntity::DefaultAssociatedConformanceAccessor { .. } => Ok(false),

            LinkEntity::ValueWitness { .. }
            | LinkEntity::TypeMetadataAccessFunction(_)
            | LinkEntity::TypeMetadataLazyCacheVariable(_)
            | LinkEntity::FieldOffset(_)
            | LinkEntity::ProtocolWitnessTableAccessFunction(_)
            | LinkEntity::ProtocolWitnessTableLazyAccessFunction { .. }
            | LinkEntity::ProtocolWitnessTableLazyCacheVariable { .. }
            | LinkEntity::AssociatedTypeWitnessTableAccessFunction { .. }
            | LinkEntity::GenericProtocolWitnessTableCache(_)
            | LinkEntity::GenericProtocolWitnessTableInstantiationFunction(_)
            | LinkEntity::SilFunction(_)
            | LinkEntity::SilGlobalVariable(_)
            | LinkEntity::ReflectionBuiltinDescriptor(_)
            | LinkEntity::ReflectionFieldDescriptor(_)
            | LinkEntity::ReflectionAssociatedTypeDescriptor(_)
            | LinkEntity::CoroutineContinuationPrototype(_) => {
                Err(LinkageError::RelativeReferenceOnly {
                    kind: entity.kind(),
                })
            }
        }
    }

    fn context_available_externally(&self, context: DeclId) -> bool {
        let module = self.program.module_of(context);
        !(self.program.is_foreign_module(module) || module == self.module)
    }

    fn decl_available_externally(&self, decl: DeclId) -> bool {
        self.context_available_externally(self.program.decl(decl).parent.unwrap_or(decl))
    }

    fn type_available_externally(&self, ty: TypeId) -> bool {
        self.program
            .nominal_decl_of_type(ty)
            .map_or(true, |decl| self.decl_available_externally(decl))
    }
}
