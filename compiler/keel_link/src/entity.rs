//! Link entities: everything the backend can give a linker-visible symbol.
//!
//! # Architecture
//!
//! [`LinkEntity`] is a closed sum type with one variant per kind of symbol.
//! Each variant carries exactly the payload its symbol is derived from: a
//! declaration, a formal type, a conformance, an associated-conformance
//! pair, a metadata-address discriminator, or a reference to an already
//! named compiled function or global. All payloads are arena ids (or small
//! `Copy` records), so entities are cheap to copy, hash and cache, and never
//! own what they refer to.
//!
//! Payload accessors ([`LinkEntity::decl`], [`LinkEntity::ty`], ...) exist
//! for code that handles several kinds uniformly. Asking a variant for a
//! payload it does not carry is an internal error and panics.

use std::fmt;

use keel_ir::{ConformanceId, DeclId, DeclKind, Name, Program, TypeId};

use crate::LinkageCategory;

/// Which address of a type's metadata record is referenced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeMetadataAddress {
    /// Start of the full record, including the prefix before the address point.
    FullMetadata,
    /// The address point that metadata pointers refer to.
    AddressPoint,
}

/// Entries of a value witness table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueWitness {
    InitializeBufferWithCopyOfBuffer,
    Destroy,
    InitializeWithCopy,
    AssignWithCopy,
    InitializeWithTake,
    AssignWithTake,
    GetEnumTagSinglePayload,
    StoreEnumTagSinglePayload,
}

impl ValueWitness {
    pub const ALL: [ValueWitness; 8] = [
        ValueWitness::InitializeBufferWithCopyOfBuffer,
        ValueWitness::Destroy,
        ValueWitness::InitializeWithCopy,
        ValueWitness::AssignWithCopy,
        ValueWitness::InitializeWithTake,
        ValueWitness::AssignWithTake,
        ValueWitness::GetEnumTagSinglePayload,
        ValueWitness::StoreEnumTagSinglePayload,
    ];
}

/// An associated conformance requirement `Self.Assoc: Protocol`.
///
/// The order of the pair is significant: the dependent type path is the
/// requirement, the protocol is what it must conform to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssociatedConformance {
    /// Dependent member type rooted at `Self`.
    pub assoc_type: TypeId,
    /// Protocol the associated type must conform to.
    pub protocol: DeclId,
}

/// A compiled function that already has its own symbol name and linkage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SilFunctionRef {
    pub name: Name,
    pub linkage: LinkageCategory,
}

/// A compiled global variable that already has its own symbol name and linkage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SilGlobalRef {
    pub name: Name,
    pub linkage: LinkageCategory,
}

/// How a method is referenced; initializers have two entry points.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MethodRef {
    Func(DeclId),
    /// Initializing entry point of a constructor (`self` already allocated).
    Initializer(DeclId),
    /// Allocating entry point of a constructor.
    Allocator(DeclId),
}

macro_rules! link_entities {
    ($($(#[$meta:meta])* $variant:ident $({ $($field:ident : $fty:ty),* $(,)? })? $(( $tty:ty ))?,)*) => {
        /// A nameable, linkable program entity.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum LinkEntity {
            $($(#[$meta])* $variant $({ $($field: $fty),* })? $(($tty))?,)*
        }

        /// Fieldless discriminant of [`LinkEntity`].
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum LinkEntityKind {
            $($variant,)*
        }

        impl LinkEntity {
            pub fn kind(&self) -> LinkEntityKind {
                match self {
                    $(LinkEntity::$variant { .. } => LinkEntityKind::$variant,)*
                }
            }
        }
    };
}

link_entities! {
    /// Thunk that dispatches a class or protocol method through its table.
    DispatchThunk(DeclId),
    DispatchThunkInitializer(DeclId),
    DispatchThunkAllocator(DeclId),
    /// Descriptor of a method's vtable or witness-table slot.
    MethodDescriptor(DeclId),
    MethodDescriptorInitializer(DeclId),
    MethodDescriptorAllocator(DeclId),
    /// Resilient class method lookup function.
    MethodLookupFunction(DeclId),
    ValueWitness { ty: TypeId, witness: ValueWitness },
    ValueWitnessTable(TypeId),
    TypeMetadataAccessFunction(TypeId),
    TypeMetadataLazyCacheVariable(TypeId),
    TypeMetadataInstantiationCache(DeclId),
    TypeMetadataInstantiationFunction(DeclId),
    TypeMetadataSingletonInitializationCache(DeclId),
    TypeMetadataCompletionFunction(DeclId),
    TypeMetadata { ty: TypeId, address: TypeMetadataAddress },
    TypeMetadataPattern(DeclId),
    /// Candidate metadata for an imported type, uniqued by the runtime.
    ForeignTypeMetadataCandidate(TypeId),
    SwiftMetaclassStub(DeclId),
    ClassMetadataBaseOffset(DeclId),
    NominalTypeDescriptor(DeclId),
    PropertyDescriptor(DeclId),
    ModuleDescriptor(DeclId),
    ExtensionDescriptor(DeclId),
    AnonymousDescriptor(DeclId),
    ProtocolDescriptor(DeclId),
    ProtocolRequirementsBaseDescriptor(DeclId),
    AssociatedTypeDescriptor(DeclId),
    AssociatedConformanceDescriptor { protocol: DeclId, requirement: AssociatedConformance },
    DefaultAssociatedConformanceAccessor { protocol: DeclId, requirement: AssociatedConformance },
    ProtocolConformanceDescriptor(ConformanceId),
    EnumCase(DeclId),
    FieldOffset(DeclId),
    DirectProtocolWitnessTable(ConformanceId),
    GenericProtocolWitnessTableCache(ConformanceId),
    GenericProtocolWitnessTableInstantiationFunction(ConformanceId),
    ResilientProtocolWitnessTable(ConformanceId),
    ProtocolWitnessTableAccessFunction(ConformanceId),
    ProtocolWitnessTablePattern(ConformanceId),
    ProtocolWitnessTableLazyAccessFunction { ty: TypeId, conformance: ConformanceId },
    ProtocolWitnessTableLazyCacheVariable { ty: TypeId, conformance: ConformanceId },
    AssociatedTypeWitnessTableAccessFunction { conformance: ConformanceId, requirement: AssociatedConformance },
    /// Prototype for coroutine continuation functions of the given lowered type.
    CoroutineContinuationPrototype(TypeId),
    ObjCClassRef(DeclId),
    ObjCClass(DeclId),
    ObjCMetaclass(DeclId),
    SilFunction(SilFunctionRef),
    SilGlobalVariable(SilGlobalRef),
    ReflectionBuiltinDescriptor(TypeId),
    ReflectionFieldDescriptor(TypeId),
    ReflectionAssociatedTypeDescriptor(ConformanceId),
}

impl LinkEntity {
    /// Dispatch thunk for a method, choosing the constructor entry point.
    pub fn dispatch_thunk(method: MethodRef) -> Self {
        match method {
            MethodRef::Func(decl) => LinkEntity::DispatchThunk(decl),
            MethodRef::Initializer(decl) => LinkEntity::DispatchThunkInitializer(decl),
            MethodRef::Allocator(decl) => LinkEntity::DispatchThunkAllocator(decl),
        }
    }

    /// Method descriptor for a method, choosing the constructor entry point.
    pub fn method_descriptor(method: MethodRef) -> Self {
        match method {
            MethodRef::Func(decl) => LinkEntity::MethodDescriptor(decl),
            MethodRef::Initializer(decl) => LinkEntity::MethodDescriptorInitializer(decl),
            MethodRef::Allocator(decl) => LinkEntity::MethodDescriptorAllocator(decl),
        }
    }

    /// Descriptor of a context declaration, chosen by its kind.
    ///
    /// # Panics
    /// Panics for declarations that are not contexts.
    pub fn context_descriptor(program: &Program, context: DeclId) -> Self {
        match program.decl(context).kind {
            DeclKind::Module => LinkEntity::ModuleDescriptor(context),
            DeclKind::Extension { .. } => LinkEntity::ExtensionDescriptor(context),
            DeclKind::AnonymousContext { .. } => LinkEntity::AnonymousDescriptor(context),
            DeclKind::Protocol => LinkEntity::ProtocolDescriptor(context),
            DeclKind::Struct | DeclKind::Enum | DeclKind::Class { .. } => {
                LinkEntity::NominalTypeDescriptor(context)
            }
            ref other => panic!("no context descriptor for {}", other.describe()),
        }
    }

    /// The declaration payload.
    ///
    /// # Panics
    /// Panics for kinds that do not carry a declaration.
    pub fn decl(&self) -> DeclId {
        match *self {
            LinkEntity::DispatchThunk(decl)
            | LinkEntity::DispatchThunkInitializer(decl)
            | LinkEntity::DispatchThunkAllocator(decl)
            | LinkEntity::MethodDescriptor(decl)
            | LinkEntity::MethodDescriptorInitializer(decl)
            | LinkEntity::MethodDescriptorAllocator(decl)
            | LinkEntity::MethodLookupFunction(decl)
            | LinkEntity::TypeMetadataInstantiationCache(decl)
            | LinkEntity::TypeMetadataInstantiationFunction(decl)
            | LinkEntity::TypeMetadataSingletonInitializationCache(decl)
            | LinkEntity::TypeMetadataCompletionFunction(decl)
            | LinkEntity::TypeMetadataPattern(decl)
            | LinkEntity::SwiftMetaclassStub(decl)
            | LinkEntity::ClassMetadataBaseOffset(decl)
            | LinkEntity::NominalTypeDescriptor(decl)
            | LinkEntity::PropertyDescriptor(decl)
            | LinkEntity::ModuleDescriptor(decl)
            | LinkEntity::ExtensionDescriptor(decl)
            | LinkEntity::AnonymousDescriptor(decl)
            | LinkEntity::ProtocolDescriptor(decl)
            | LinkEntity::ProtocolRequirementsBaseDescriptor(decl)
            | LinkEntity::AssociatedTypeDescriptor(decl)
            | LinkEntity::AssociatedConformanceDescriptor { protocol: decl, .. }
            | LinkEntity::DefaultAssociatedConformanceAccessor { protocol: decl, .. }
            | LinkEntity::EnumCase(decl)
            | LinkEntity::FieldOffset(decl)
            | LinkEntity::ObjCClassRef(decl)
            | LinkEntity::ObjCClass(decl)
            | LinkEntity::ObjCMetaclass(decl) => decl,
            _ => self.wrong_payload("declaration"),
        }
    }

    /// The formal type payload.
    ///
    /// # Panics
    /// Panics for kinds that do not carry a type.
    pub fn ty(&self) -> TypeId {
        match *self {
            LinkEntity::ValueWitness { ty, .. }
            | LinkEntity::ValueWitnessTable(ty)
            | LinkEntity::TypeMetadataAccessFunction(ty)
            | LinkEntity::TypeMetadataLazyCacheVariable(ty)
            | LinkEntity::TypeMetadata { ty, .. }
            | LinkEntity::ForeignTypeMetadataCandidate(ty)
            | LinkEntity::ProtocolWitnessTableLazyAccessFunction { ty, .. }
            | LinkEntity::ProtocolWitnessTableLazyCacheVariable { ty, .. }
            | LinkEntity::CoroutineContinuationPrototype(ty)
            | LinkEntity::ReflectionBuiltinDescriptor(ty)
            | LinkEntity::ReflectionFieldDescriptor(ty) => ty,
            _ => self.wrong_payload("type"),
        }
    }

    /// The protocol conformance payload.
    ///
    /// # Panics
    /// Panics for kinds that do not carry a conformance.
    pub fn conformance(&self) -> ConformanceId {
        match *self {
            LinkEntity::ProtocolConformanceDescriptor(conformance)
            | LinkEntity::DirectProtocolWitnessTable(conformance)
            | LinkEntity::GenericProtocolWitnessTableCache(conformance)
            | LinkEntity::GenericProtocolWitnessTableInstantiationFunction(conformance)
            | LinkEntity::ResilientProtocolWitnessTable(conformance)
            | LinkEntity::ProtocolWitnessTableAccessFunction(conformance)
            | LinkEntity::ProtocolWitnessTablePattern(conformance)
            | LinkEntity::ProtocolWitnessTableLazyAccessFunction { conformance, .. }
            | LinkEntity::ProtocolWitnessTableLazyCacheVariable { conformance, .. }
            | LinkEntity::AssociatedTypeWitnessTableAccessFunction { conformance, .. }
            | LinkEntity::ReflectionAssociatedTypeDescriptor(conformance) => conformance,
            _ => self.wrong_payload("conformance"),
        }
    }

    /// The associated-conformance pair payload.
    ///
    /// # Panics
    /// Panics for kinds that do not carry an associated conformance.
    pub fn associated_conformance(&self) -> AssociatedConformance {
        match *self {
            LinkEntity::AssociatedConformanceDescriptor { requirement, .. }
            | LinkEntity::DefaultAssociatedConformanceAccessor { requirement, .. }
            | LinkEntity::AssociatedTypeWitnessTableAccessFunction { requirement, .. } => {
                requirement
            }
            _ => self.wrong_payload("associated conformance"),
        }
    }

    /// The metadata-address discriminator of a type metadata entity.
    ///
    /// # Panics
    /// Panics for every kind but `TypeMetadata`.
    pub fn metadata_address(&self) -> TypeMetadataAddress {
        match *self {
            LinkEntity::TypeMetadata { address, .. } => address,
            _ => self.wrong_payload("metadata address"),
        }
    }

    /// The value witness payload.
    ///
    /// # Panics
    /// Panics for every kind but `ValueWitness`.
    pub fn value_witness(&self) -> ValueWitness {
        match *self {
            LinkEntity::ValueWitness { witness, .. } => witness,
            _ => self.wrong_payload("value witness"),
        }
    }

    /// Does this entity's symbol denote type-level data rather than code?
    pub fn is_type_kind(&self) -> bool {
        matches!(
            self.kind(),
            LinkEntityKind::ValueWitnessTable
                | LinkEntityKind::TypeMetadata
                | LinkEntityKind::TypeMetadataPattern
                | LinkEntityKind::ForeignTypeMetadataCandidate
                | LinkEntityKind::NominalTypeDescriptor
                | LinkEntityKind::ProtocolDescriptor
                | LinkEntityKind::ReflectionBuiltinDescriptor
                | LinkEntityKind::ReflectionFieldDescriptor
        )
    }

    /// Does the symbol refer to executable code?
    pub fn is_function(&self) -> bool {
        matches!(
            self.kind(),
            LinkEntityKind::DispatchThunk
                | LinkEntityKind::DispatchThunkInitializer
                | LinkEntityKind::DispatchThunkAllocator
                | LinkEntityKind::MethodLookupFunction
                | LinkEntityKind::ValueWitness
                | LinkEntityKind::TypeMetadataAccessFunction
                | LinkEntityKind::TypeMetadataInstantiationFunction
                | LinkEntityKind::TypeMetadataCompletionFunction
                | LinkEntityKind::DefaultAssociatedConformanceAccessor
                | LinkEntityKind::GenericProtocolWitnessTableInstantiationFunction
                | LinkEntityKind::ProtocolWitnessTableAccessFunction
                | LinkEntityKind::ProtocolWitnessTableLazyAccessFunction
                | LinkEntityKind::AssociatedTypeWitnessTableAccessFunction
                | LinkEntityKind::CoroutineContinuationPrototype
                | LinkEntityKind::SilFunction
        )
    }

    fn wrong_payload(&self, what: &str) -> ! {
        panic!("{:?} link entity has no {what} payload", self.kind())
    }
}

impl fmt::Display for LinkEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
