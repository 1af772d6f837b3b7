//! Symbol mangling for link entities.
//!
//! # Mangling Scheme
//!
//! Native symbols start with `$s` and are read back to front: every
//! production appends its operands first and a short operator last, so a
//! stack-based demangler can rebuild the tree.
//!
//! ```text
//! symbol      ::= '$s' entity-body entity-suffix
//! identifier  ::= <len> <name>                     plain ASCII word
//!               | '0' <len> <escaped>              anything else, '$xx' escapes
//!               | '0_'                             the empty name
//! context     ::= 's'                              standard library
//!               | 'So'                             foreign (C) module
//!               | identifier                       native module
//!               | context identifier ('V'|'O'|'C'|'P')
//!               | nominal-type module 'E'          extension
//!               | context 'XZ' <n> '_'             anonymous context
//! type-list   ::= 'y' | type '_' type*             first element marks the start
//! type        ::= context ('y' type* 'G')?         nominal, optionally bound
//!               | 'B' identifier                   builtin
//!               | type-list 't'                    tuple
//!               | type-list 't' type 'c'           function: params, result
//!               | type 'Sg' | type 'm' | type 'Xp' optional, metatype, existential metatype
//!               | protocol-list 'p'                existential ('yp' is Any)
//!               | 'x' | 'qd' <d> '_' <i> '_'       generic parameter
//!               | type identifier context 'Qz'     dependent member
//! ```
//!
//! Entity suffixes are listed next to [`Mangler::mangle_entity`]'s match
//! arms. Objective-C class symbols bypass the scheme and use the fixed
//! runtime prefixes; compiled functions and globals already carry their
//! name and are never mangled here.

use std::fmt::Write;

use keel_ir::{
    AccessorKind, AddressorKind, ConformanceId, DeclFlags, DeclId, DeclKind, KeyPathKind, Name,
    Program, ReferenceOwnership, TypeId, TypeKind,
};

use crate::{AssociatedConformance, LinkEntity, TypeMetadataAddress, ValueWitness};

/// The prefix of every native mangled symbol.
pub const MANGLE_PREFIX: &str = "$s";

pub const OBJC_CLASS_PREFIX: &str = "OBJC_CLASS_$_";
pub const OBJC_METACLASS_PREFIX: &str = "OBJC_METACLASS_$_";
/// Leading `\x01` tells the object writer not to add a platform prefix.
pub const OBJC_CLASS_REF_PREFIX: &str = "\x01l_OBJC_CLASS_REF_$_";

/// Constructor entry point used when mangling a constructor declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CtorEntry {
    Allocating,
    Initializing,
}

/// Builds one mangled name at a time.
pub struct Mangler<'p> {
    program: &'p Program,
    out: String,
}

impl<'p> Mangler<'p> {
    pub fn new(program: &'p Program) -> Self {
        Mangler {
            program,
            out: String::with_capacity(64),
        }
    }

    /// Mangle a link entity.
    ///
    /// # Panics
    /// Panics for compiled functions and globals, which are named by their
    /// definitions.
    pub fn mangle_entity(mut self, entity: &LinkEntity) -> String {
        match *entity {
            LinkEntity::ObjCClass(class) => {
                return format!("{OBJC_CLASS_PREFIX}{}", self.objc_runtime_name(class));
            }
            LinkEntity::ObjCMetaclass(class) => {
                return format!("{OBJC_METACLASS_PREFIX}{}", self.objc_runtime_name(class));
            }
            LinkEntity::ObjCClassRef(class) => {
                return format!("{OBJC_CLASS_REF_PREFIX}{}", self.objc_runtime_name(class));
            }
            LinkEntity::SilFunction(_) | LinkEntity::SilGlobalVariable(_) => {
                panic!(
                    "{:?} symbols are named by their definition, not mangled",
                    entity.kind()
                );
            }
            _ => {}
        }

        self.out.push_str(MANGLE_PREFIX);
        match *entity {
            // Methods
            LinkEntity::DispatchThunk(decl) => self.method(decl, None, "Tj"),
            LinkEntity::DispatchThunkInitializer(decl) => {
                self.method(decl, Some(CtorEntry::Initializing), "Tj");
            }
            LinkEntity::DispatchThunkAllocator(decl) => {
                self.method(decl, Some(CtorEntry::Allocating), "Tj");
            }
            LinkEntity::MethodDescriptor(decl) => self.method(decl, None, "Tq"),
            LinkEntity::MethodDescriptorInitializer(decl) => {
                self.method(decl, Some(CtorEntry::Initializing), "Tq");
            }
            LinkEntity::MethodDescriptorAllocator(decl) => {
                self.method(decl, Some(CtorEntry::Allocating), "Tq");
            }
            LinkEntity::MethodLookupFunction(class) => self.context_with(class, "Mu"),

            // Value witnesses
            LinkEntity::ValueWitness { ty, witness } => {
                self.ty(ty);
                self.out.push('w');
                self.out.push_str(value_witness_code(witness));
            }
            LinkEntity::ValueWitnessTable(ty) => self.type_with(ty, "WV"),

            // Type metadata
            LinkEntity::TypeMetadataAccessFunction(ty) => self.type_with(ty, "Ma"),
            LinkEntity::TypeMetadataLazyCacheVariable(ty) => self.type_with(ty, "ML"),
            LinkEntity::TypeMetadataInstantiationCache(decl) => self.context_with(decl, "MI"),
            LinkEntity::TypeMetadataInstantiationFunction(decl) => self.context_with(decl, "Mi"),
            LinkEntity::TypeMetadataSingletonInitializationCache(decl) => {
                self.context_with(decl, "Ml");
            }
            LinkEntity::TypeMetadataCompletionFunction(decl) => self.context_with(decl, "Mr"),
            LinkEntity::TypeMetadata { ty, address } => match address {
                TypeMetadataAddress::FullMetadata => self.type_with(ty, "Mf"),
                TypeMetadataAddress::AddressPoint => self.type_with(ty, "N"),
            },
            LinkEntity::TypeMetadataPattern(decl) => self.context_with(decl, "MP"),
            LinkEntity::ForeignTypeMetadataCandidate(ty) => self.type_with(ty, "MN"),
            LinkEntity::SwiftMetaclassStub(class) => self.context_with(class, "Mm"),
            LinkEntity::ClassMetadataBaseOffset(class) => self.context_with(class, "Mo"),

            // Context descriptors
            LinkEntity::NominalTypeDescriptor(decl) => self.context_with(decl, "Mn"),
            LinkEntity::PropertyDescriptor(storage) => {
                self.decl_entity(storage, CtorEntry::Allocating);
                self.out.push_str("MV");
            }
            LinkEntity::ModuleDescriptor(module) => self.context_with(module, "MXM"),
            LinkEntity::ExtensionDescriptor(extension) => self.context_with(extension, "MXE"),
            LinkEntity::AnonymousDescriptor(context) => self.context_with(context, "MXX"),

            // Protocols
            LinkEntity::ProtocolDescriptor(protocol) => self.context_with(protocol, "Mp"),
            LinkEntity::ProtocolRequirementsBaseDescriptor(protocol) => {
                self.context_with(protocol, "TL");
            }
            LinkEntity::AssociatedTypeDescriptor(assoc) => {
                self.decl_entity(assoc, CtorEntry::Allocating);
                self.out.push_str("Tl");
            }
            LinkEntity::AssociatedConformanceDescriptor {
                protocol,
                requirement,
            } => {
                self.context(protocol);
                self.associated_conformance(requirement);
                self.out.push_str("Tn");
            }
            LinkEntity::DefaultAssociatedConformanceAccessor {
                protocol,
                requirement,
            } => {
                self.context(protocol);
                self.associated_conformance(requirement);
                self.out.push_str("TN");
            }
            LinkEntity::ProtocolConformanceDescriptor(conformance) => {
                self.conformance_with(conformance, "Mc");
            }

            // Members
            LinkEntity::EnumCase(element) => {
                self.decl_entity(element, CtorEntry::Allocating);
                self.out.push_str("WC");
            }
            LinkEntity::FieldOffset(field) => {
                self.decl_entity(field, CtorEntry::Allocating);
                self.out.push_str("Wvd");
            }

            // Witness tables
            LinkEntity::DirectProtocolWitnessTable(conformance) => {
                self.conformance_with(conformance, "WP");
            }
            LinkEntity::GenericProtocolWitnessTableCache(conformance) => {
                self.conformance_with(conformance, "WG");
            }
            LinkEntity::GenericProtocolWitnessTableInstantiationFunction(conformance) => {
                self.conformance_with(conformance, "WI");
            }
            LinkEntity::ResilientProtocolWitnessTable(conformance) => {
                self.conformance_with(conformance, "Wr");
            }
            LinkEntity::ProtocolWitnessTableAccessFunction(conformance) => {
                self.conformance_with(conformance, "Wa");
            }
            LinkEntity::ProtocolWitnessTablePattern(conformance) => {
                self.conformance_with(conformance, "Wp");
            }
            LinkEntity::ProtocolWitnessTableLazyAccessFunction { ty, conformance } => {
                self.ty(ty);
                self.conformance_with(conformance, "Wl");
            }
            LinkEntity::ProtocolWitnessTableLazyCacheVariable { ty, conformance } => {
                self.ty(ty);
                self.conformance_with(conformance, "WL");
            }
            LinkEntity::AssociatedTypeWitnessTableAccessFunction {
                conformance,
                requirement,
            } => {
                self.conformance(conformance);
                self.associated_conformance(requirement);
                self.out.push_str("WT");
            }

            LinkEntity::CoroutineContinuationPrototype(ty) => self.type_with(ty, "TC"),

            // Reflection
            LinkEntity::ReflectionBuiltinDescriptor(ty) => self.type_with(ty, "MB"),
            LinkEntity::ReflectionFieldDescriptor(ty) => self.type_with(ty, "MF"),
            LinkEntity::ReflectionAssociatedTypeDescriptor(conformance) => {
                self.conformance_with(conformance, "MA");
            }

            LinkEntity::ObjCClass(_)
            | LinkEntity::ObjCMetaclass(_)
            | LinkEntity::ObjCClassRef(_)
            | LinkEntity::SilFunction(_)
            | LinkEntity::SilGlobalVariable(_) => unreachable!("handled above"),
        }
        self.out
    }

    /// Mangle a type on its own, with the symbol prefix.
    pub fn mangle_type(mut self, ty: TypeId) -> String {
        self.out.push_str(MANGLE_PREFIX);
        self.ty(ty);
        self.out
    }

    // ── Entity helpers ──────────────────────────────────────────────

    fn type_with(&mut self, ty: TypeId, suffix: &str) {
        self.ty(ty);
        self.out.push_str(suffix);
    }

    fn context_with(&mut self, decl: DeclId, suffix: &str) {
        self.context(decl);
        self.out.push_str(suffix);
    }

    fn conformance_with(&mut self, conformance: ConformanceId, suffix: &str) {
        self.conformance(conformance);
        self.out.push_str(suffix);
    }

    /// Constructors are only referenced through one of their two entry
    /// points; everything else never names an entry point.
    fn method(&mut self, decl: DeclId, entry: Option<CtorEntry>, suffix: &str) {
        let is_ctor = matches!(self.program.decl(decl).kind, DeclKind::Constructor { .. });
        assert_eq!(
            is_ctor,
            entry.is_some(),
            "method entity for '{}' does not match its declaration kind",
            self.program.decl_name(decl)
        );
        self.decl_entity(decl, entry.unwrap_or(CtorEntry::Allocating));
        self.out.push_str(suffix);
    }

    /// `type protocol module`.
    fn conformance(&mut self, id: ConformanceId) {
        let program = self.program;
        let conformance = program.conformance(id);
        self.ty(conformance.ty);
        self.context(conformance.protocol);
        self.module(program.module_of(conformance.context));
    }

    /// Requirement type first, then the protocol it must conform to.
    fn associated_conformance(&mut self, requirement: AssociatedConformance) {
        self.ty(requirement.assoc_type);
        self.context(requirement.protocol);
    }

    fn objc_runtime_name(&self, class: DeclId) -> String {
        let decl = self.program.decl(class);
        if let Some(name) = decl.objc_name {
            return self.program.name_str(name).to_string();
        }
        let mut nested = Mangler::new(self.program);
        nested.out.push_str("_TtC");
        nested.module(self.program.module_of(class));
        nested.identifier(decl.name);
        nested.out
    }

    // ── Declarations ────────────────────────────────────────────────

    /// Mangle a declaration as an entity (function, var, accessor, ...).
    fn decl_entity(&mut self, id: DeclId, entry: CtorEntry) {
        let program = self.program;
        let decl = program.decl(id);
        let is_static = decl.has(DeclFlags::STATIC);
        match decl.kind {
            DeclKind::Func { ty } => {
                self.parent_context(id);
                self.identifier(decl.name);
                self.ty(ty);
                self.out.push('F');
                if is_static {
                    self.out.push('Z');
                }
            }
            DeclKind::Constructor { ty, ref arg_labels } => {
                self.parent_context(id);
                self.out.push('y');
                for &label in arg_labels {
                    self.identifier(label);
                }
                self.ty(ty);
                self.out.push_str(match entry {
                    CtorEntry::Allocating => "fC",
                    CtorEntry::Initializing => "fc",
                });
            }
            DeclKind::Var { ty, .. } => {
                self.parent_context(id);
                self.identifier(decl.name);
                self.ty(ty);
                self.out.push('v');
                if is_static {
                    self.out.push('Z');
                }
            }
            DeclKind::Param { ty } => {
                self.parent_context(id);
                self.identifier(decl.name);
                self.ty(ty);
                self.out.push_str("vp");
            }
            DeclKind::Subscript {
                index_ty,
                element_ty,
                ..
            } => {
                self.parent_context(id);
                self.ty(index_ty);
                self.ty(element_ty);
                self.out.push('i');
                if is_static {
                    self.out.push('Z');
                }
            }
            DeclKind::Accessor {
                storage,
                kind,
                addressor,
                ..
            } => {
                self.decl_entity(storage, entry);
                self.out.push_str(accessor_code(kind, addressor));
            }
            DeclKind::EnumElement { payload } => {
                self.parent_context(id);
                self.identifier(decl.name);
                if let Some(payload) = payload {
                    self.ty(payload);
                }
                self.out.push_str("Oe");
            }
            DeclKind::AssociatedType => {
                self.parent_context(id);
                self.identifier(decl.name);
                self.out.push_str("Qa");
            }
            DeclKind::Module
            | DeclKind::Struct
            | DeclKind::Enum
            | DeclKind::Class { .. }
            | DeclKind::Protocol
            | DeclKind::Extension { .. }
            | DeclKind::AnonymousContext { .. } => self.context(id),
        }
    }

    fn parent_context(&mut self, id: DeclId) {
        let program = self.program;
        match program.decl(id).parent {
            Some(parent) => self.context(parent),
            None => panic!("member '{}' has no parent context", program.decl_name(id)),
        }
    }

    /// Mangle a declaration context.
    fn context(&mut self, id: DeclId) {
        let program = self.program;
        let decl = program.decl(id);
        match decl.kind {
            DeclKind::Module => self.module(id),
            DeclKind::Struct | DeclKind::Enum | DeclKind::Class { .. } | DeclKind::Protocol => {
                self.parent_context(id);
                self.identifier(decl.name);
                self.out.push(match decl.kind {
                    DeclKind::Struct => 'V',
                    DeclKind::Enum => 'O',
                    DeclKind::Class { .. } => 'C',
                    _ => 'P',
                });
            }
            DeclKind::Extension { extended } => {
                self.context(extended);
                self.module(program.module_of(id));
                self.out.push('E');
            }
            DeclKind::AnonymousContext { discriminator } => {
                self.parent_context(id);
                self.out.push_str("XZ");
                self.number(u64::from(discriminator));
                self.out.push('_');
            }
            _ => self.decl_entity(id, CtorEntry::Allocating),
        }
    }

    fn module(&mut self, module: DeclId) {
        let decl = self.program.decl(module);
        if decl.has(DeclFlags::STDLIB) {
            self.out.push('s');
        } else if decl.has(DeclFlags::FOREIGN) {
            self.out.push_str("So");
        } else {
            self.identifier(decl.name);
        }
    }

    // ── Types ───────────────────────────────────────────────────────

    fn ty(&mut self, ty: TypeId) {
        let program = self.program;
        match program.type_kind(ty) {
            TypeKind::Builtin(name) => {
                self.out.push('B');
                self.identifier(*name);
            }
            TypeKind::Nominal { decl, args } => {
                self.context(*decl);
                if !args.is_empty() {
                    self.out.push('y');
                    for &arg in args {
                        self.ty(arg);
                    }
                    self.out.push('G');
                }
            }
            TypeKind::Tuple(elements) => {
                if elements.is_empty() {
                    self.out.push('y');
                }
                for (i, element) in elements.iter().enumerate() {
                    if let Some(label) = element.label {
                        self.identifier(label);
                    }
                    self.ty(element.ty);
                    if i == 0 {
                        self.out.push('_');
                    }
                }
                self.out.push('t');
            }
            TypeKind::Function { params, result } => {
                self.type_list(params);
                self.out.push('t');
                self.ty(*result);
                self.out.push('c');
            }
            TypeKind::LoweredFunction {
                params,
                yields,
                results,
            } => {
                for list in [params, yields, results] {
                    self.type_list(list);
                    self.out.push('t');
                }
                self.out.push_str("Xf");
            }
            TypeKind::Optional(object) => {
                self.ty(*object);
                self.out.push_str("Sg");
            }
            TypeKind::Metatype(instance) => {
                self.ty(*instance);
                self.out.push('m');
            }
            TypeKind::ExistentialMetatype(instance) => {
                self.ty(*instance);
                self.out.push_str("Xp");
            }
            TypeKind::Existential(protocols) => {
                if protocols.is_empty() {
                    self.out.push('y');
                }
                for (i, &protocol) in protocols.iter().enumerate() {
                    self.context(protocol);
                    if i == 0 {
                        self.out.push('_');
                    }
                }
                self.out.push('p');
            }
            TypeKind::OpenedArchetype { existential, id } => {
                self.ty(*existential);
                self.out.push_str("Qo");
                self.number(u64::from(*id));
                self.out.push('_');
            }
            TypeKind::GenericParam { depth, index } => {
                if *depth == 0 && *index == 0 {
                    self.out.push('x');
                } else {
                    self.out.push_str("qd");
                    self.number(u64::from(*depth));
                    self.out.push('_');
                    self.number(u64::from(*index));
                    self.out.push('_');
                }
            }
            TypeKind::DependentMember { base, assoc } => {
                self.ty(*base);
                self.identifier(program.decl(*assoc).name);
                match program.requirement_protocol(*assoc) {
                    Some(protocol) => self.context(protocol),
                    None => self.out.push('y'),
                }
                self.out.push_str("Qz");
            }
            TypeKind::ReferenceStorage { ownership, referent } => {
                self.ty(*referent);
                match ownership {
                    ReferenceOwnership::Strong => {}
                    ReferenceOwnership::Weak => self.out.push_str("Xw"),
                    ReferenceOwnership::Unowned => self.out.push_str("Xo"),
                }
            }
            TypeKind::LValue(object) => {
                self.ty(*object);
                self.out.push_str("Xz");
            }
            TypeKind::InOut(object) => {
                self.ty(*object);
                self.out.push('z');
            }
            TypeKind::KeyPath { kind, root, value } => {
                self.ty(*root);
                self.ty(*value);
                self.out.push_str(match kind {
                    KeyPathKind::ReadOnly => "Xkr",
                    KeyPathKind::Writable => "Xkw",
                    KeyPathKind::ReferenceWritable => "XkR",
                });
            }
        }
    }

    /// Elements of a list; the caller appends the closing operator.
    fn type_list(&mut self, types: &[TypeId]) {
        if types.is_empty() {
            self.out.push('y');
        }
        for (i, &ty) in types.iter().enumerate() {
            self.ty(ty);
            if i == 0 {
                self.out.push('_');
            }
        }
    }

    // ── Terminals ───────────────────────────────────────────────────

    fn identifier(&mut self, name: Name) {
        encode_identifier(&mut self.out, self.program.name_str(name));
    }

    fn number(&mut self, n: u64) {
        // Writing to a String cannot fail.
        let _ = write!(self.out, "{n}");
    }
}

/// Append `name` as a length-prefixed identifier.
///
/// Plain ASCII words are written as `<len><name>`. Anything else (empty,
/// punctuation, non-ASCII, a leading digit) is written as `0<len><escaped>`,
/// where every byte outside `[A-Za-z0-9_]` becomes `$xx`. A leading digit is
/// escaped too, so the text after a length never starts with a digit. The
/// empty name is `0_`.
pub fn encode_identifier(out: &mut String, name: &str) {
    if name.is_empty() {
        out.push_str("0_");
        return;
    }
    let is_word_byte = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let is_plain = name
        .bytes()
        .next()
        .is_some_and(|first| !first.is_ascii_digit())
        && name.bytes().all(is_word_byte);
    if is_plain {
        let _ = write!(out, "{}{name}", name.len());
        return;
    }

    let mut escaped = String::with_capacity(name.len() * 2);
    for (i, b) in name.bytes().enumerate() {
        if is_word_byte(b) && !(i == 0 && b.is_ascii_digit()) {
            escaped.push(char::from(b));
        } else {
            let _ = write!(escaped, "${b:02x}");
        }
    }
    let _ = write!(out, "0{}{escaped}", escaped.len());
}

fn value_witness_code(witness: ValueWitness) -> &'static str {
    match witness {
        ValueWitness::InitializeBufferWithCopyOfBuffer => "CP",
        ValueWitness::Destroy => "xx",
        ValueWitness::InitializeWithCopy => "cp",
        ValueWitness::AssignWithCopy => "ca",
        ValueWitness::InitializeWithTake => "tk",
        ValueWitness::AssignWithTake => "ta",
        ValueWitness::GetEnumTagSinglePayload => "xs",
        ValueWitness::StoreEnumTagSinglePayload => "xi",
    }
}

fn accessor_code(kind: AccessorKind, addressor: Option<AddressorKind>) -> &'static str {
    match (kind, addressor.unwrap_or(AddressorKind::Unsafe)) {
        (AccessorKind::Get, _) => "g",
        (AccessorKind::Set, _) => "s",
        (AccessorKind::Read, _) => "r",
        (AccessorKind::Modify, _) => "M",
        (AccessorKind::WillSet, _) => "w",
        (AccessorKind::DidSet, _) => "W",
        (AccessorKind::Address, AddressorKind::Unsafe) => "lu",
        (AccessorKind::Address, AddressorKind::Owning) => "lO",
        (AccessorKind::Address, AddressorKind::NativeOwning) => "lo",
        (AccessorKind::MutableAddress, AddressorKind::Unsafe) => "au",
        (AccessorKind::MutableAddress, AddressorKind::Owning) => "aO",
        (AccessorKind::MutableAddress, AddressorKind::NativeOwning) => "ao",
    }
}

#[cfg(test)]
mod tests;
