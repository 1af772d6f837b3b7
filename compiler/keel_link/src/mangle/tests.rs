use std::collections::HashSet;

use super::*;
use crate::test_helpers::Fixture;
use crate::{LinkageCategory, SilFunctionRef, SilGlobalRef, SymbolEncoder};
use keel_ir::AccessLevel;
use pretty_assertions::assert_eq;

fn mangle(f: &Fixture, entity: &LinkEntity) -> String {
    Mangler::new(&f.program).mangle_entity(entity)
}

#[test]
fn test_encode_identifier() {
    let cases = [
        ("hello", "5hello"),
        ("snake_case2", "11snake_case2"),
        ("a b", "05a$20b"),
        ("", "0_"),
        ("é", "06$c3$a9"),
        ("1a", "04$31a"),
        ("9 b", "07$39$20b"),
    ];
    for (name, expected) in cases {
        let mut out = String::new();
        encode_identifier(&mut out, name);
        assert_eq!(out, expected, "identifier {name:?}");
    }
}

#[test]
fn test_nominal_metadata_symbols() {
    let f = Fixture::new();
    assert_eq!(
        mangle(&f, &LinkEntity::NominalTypeDescriptor(f.point)),
        "$s4main5PointVMn"
    );
    assert_eq!(
        mangle(
            &f,
            &LinkEntity::TypeMetadata {
                ty: f.point_ty,
                address: TypeMetadataAddress::AddressPoint
            }
        ),
        "$s4main5PointVN"
    );
    assert_eq!(
        mangle(
            &f,
            &LinkEntity::TypeMetadata {
                ty: f.point_ty,
                address: TypeMetadataAddress::FullMetadata
            }
        ),
        "$s4main5PointVMf"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::TypeMetadataAccessFunction(f.point_ty)),
        "$s4main5PointVMa"
    );
}

#[test]
fn test_member_symbols() {
    let f = Fixture::new();
    assert_eq!(
        mangle(&f, &LinkEntity::FieldOffset(f.x)),
        "$s4main5PointV1xB5Int64vWvd"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::DispatchThunk(f.area)),
        "$s4main5ShapeP4areaytB5Int64cFTj"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::MethodDescriptorAllocator(f.widget_init)),
        "$s4main6WidgetCy4sizeB5Int64_t4main6WidgetCcfCTq"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::MethodDescriptorInitializer(f.widget_init)),
        "$s4main6WidgetCy4sizeB5Int64_t4main6WidgetCcfcTq"
    );
}

#[test]
#[should_panic(expected = "does not match its declaration kind")]
fn test_constructor_entry_point_on_function_panics() {
    let f = Fixture::new();
    mangle(&f, &LinkEntity::DispatchThunkAllocator(f.area));
}

#[test]
fn test_conformance_symbols() {
    let f = Fixture::new();
    assert_eq!(
        mangle(&f, &LinkEntity::ProtocolConformanceDescriptor(f.point_shape)),
        "$s4main5PointV4main5ShapeP4mainMc"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::DirectProtocolWitnessTable(f.point_shape)),
        "$s4main5PointV4main5ShapeP4mainWP"
    );
}

#[test]
fn test_associated_conformance_keeps_requirement_before_protocol() {
    let mut f = Fixture::new();
    let collection = f
        .program
        .declare(Some(f.main), "Collection", DeclKind::Protocol, AccessLevel::Public);
    let element = f.program.declare(
        Some(collection),
        "Element",
        DeclKind::AssociatedType,
        AccessLevel::Public,
    );
    let equatable = f
        .program
        .declare(Some(f.main), "Equatable", DeclKind::Protocol, AccessLevel::Public);
    let self_ty = f.program.mk(TypeKind::GenericParam { depth: 0, index: 0 });
    let element_ty = f.program.mk(TypeKind::DependentMember {
        base: self_ty,
        assoc: element,
    });
    let requirement = AssociatedConformance {
        assoc_type: element_ty,
        protocol: equatable,
    };
    assert_eq!(
        mangle(
            &f,
            &LinkEntity::AssociatedConformanceDescriptor {
                protocol: collection,
                requirement
            }
        ),
        "$s4main10CollectionPx7Element4main10CollectionPQz4main9EquatablePTn"
    );
}

#[test]
fn test_objc_symbols_use_runtime_prefixes() {
    let mut f = Fixture::new();
    assert_eq!(
        mangle(&f, &LinkEntity::ObjCClass(f.widget)),
        "OBJC_CLASS_$__TtC4main6Widget"
    );

    let objc_name = f.program.intern("NSWidget");
    f.program.decl_mut(f.widget).objc_name = Some(objc_name);
    assert_eq!(
        mangle(&f, &LinkEntity::ObjCClass(f.widget)),
        "OBJC_CLASS_$_NSWidget"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::ObjCMetaclass(f.widget)),
        "OBJC_METACLASS_$_NSWidget"
    );
    assert_eq!(
        mangle(&f, &LinkEntity::ObjCClassRef(f.widget)),
        "\x01l_OBJC_CLASS_REF_$_NSWidget"
    );
}

#[test]
fn test_module_contexts() {
    let mut f = Fixture::new();
    let stdlib = f.program.add_module("Swift");
    f.program.add_flags(stdlib, DeclFlags::STDLIB);
    let c_point = f
        .program
        .declare(Some(f.foreign), "CPoint", DeclKind::Struct, AccessLevel::Public);
    assert_eq!(mangle(&f, &LinkEntity::ModuleDescriptor(f.main)), "$s4mainMXM");
    assert_eq!(mangle(&f, &LinkEntity::ModuleDescriptor(stdlib)), "$ssMXM");
    assert_eq!(
        mangle(&f, &LinkEntity::NominalTypeDescriptor(c_point)),
        "$sSo6CPointVMn"
    );
}

#[test]
fn test_structural_types() {
    let mut f = Fixture::new();
    let unit = f.program.tuple(Vec::new());
    let optional = f.program.optional(f.int);
    let generic = f.program.mk(TypeKind::GenericParam { depth: 1, index: 2 });
    let any = f.program.existential(Vec::new());
    let bound = f.program.mk(TypeKind::Nominal {
        decl: f.point,
        args: vec![f.int],
    });
    let cases = [
        (unit, "$syt"),
        (optional, "$sB5Int64Sg"),
        (generic, "$sqd1_2_"),
        (any, "$syp"),
        (bound, "$s4main5PointVyB5Int64G"),
    ];
    for (ty, expected) in cases {
        assert_eq!(Mangler::new(&f.program).mangle_type(ty), expected);
    }
}

#[test]
#[should_panic(expected = "named by their definition")]
fn test_compiled_function_through_grammar_panics() {
    let f = Fixture::new();
    let name = f.program.intern("main");
    mangle(
        &f,
        &LinkEntity::SilFunction(SilFunctionRef {
            name,
            linkage: LinkageCategory::Public,
        }),
    );
}

#[test]
fn test_encoder_names_compiled_functions_and_caches() {
    let f = Fixture::new();
    let encoder = SymbolEncoder::new(&f.program);
    let name = f.program.intern("$s4main3runyyF");
    let function = LinkEntity::SilFunction(SilFunctionRef {
        name,
        linkage: LinkageCategory::Hidden,
    });
    assert_eq!(encoder.encode(&function), "$s4main3runyyF");
    let descriptor = LinkEntity::NominalTypeDescriptor(f.point);
    let first = encoder.encode(&descriptor);
    let second = encoder.encode(&descriptor);
    assert_eq!(first, second);
    assert_eq!(encoder.cached_len(), 2);
}

/// One entity of every kind over the fixture.
fn every_entity(f: &mut Fixture) -> Vec<LinkEntity> {
    let program = &mut f.program;
    let color = program.declare(Some(f.main), "Color", DeclKind::Enum, AccessLevel::Public);
    let red = program.declare(
        Some(color),
        "red",
        DeclKind::EnumElement { payload: None },
        AccessLevel::Public,
    );
    let extension = program.declare(
        Some(f.main),
        "",
        DeclKind::Extension { extended: f.remote },
        AccessLevel::Public,
    );
    let closure = program.declare(
        Some(f.main),
        "",
        DeclKind::AnonymousContext { discriminator: 0 },
        AccessLevel::Private,
    );
    let assoc = program.declare(
        Some(f.shape),
        "Element",
        DeclKind::AssociatedType,
        AccessLevel::Public,
    );
    let self_ty = program.mk(TypeKind::GenericParam { depth: 0, index: 0 });
    let assoc_ty = program.mk(TypeKind::DependentMember {
        base: self_ty,
        assoc,
    });
    let requirement = AssociatedConformance {
        assoc_type: assoc_ty,
        protocol: f.shape,
    };
    let coroutine = program.mk(TypeKind::LoweredFunction {
        params: Vec::new(),
        yields: vec![f.int],
        results: Vec::new(),
    });
    let function = program.intern("$s4main3runyyF");
    let global = program.intern("$s4main7counterSivp");
    let conformance = f.point_shape;

    let mut entities = vec![
        LinkEntity::DispatchThunk(f.area),
        LinkEntity::DispatchThunkInitializer(f.widget_init),
        LinkEntity::DispatchThunkAllocator(f.widget_init),
        LinkEntity::MethodDescriptor(f.area),
        LinkEntity::MethodDescriptorInitializer(f.widget_init),
        LinkEntity::MethodDescriptorAllocator(f.widget_init),
        LinkEntity::MethodLookupFunction(f.widget),
        LinkEntity::ValueWitnessTable(f.point_ty),
        LinkEntity::TypeMetadataAccessFunction(f.point_ty),
        LinkEntity::TypeMetadataLazyCacheVariable(f.point_ty),
        LinkEntity::TypeMetadataInstantiationCache(f.point),
        LinkEntity::TypeMetadataInstantiationFunction(f.point),
        LinkEntity::TypeMetadataSingletonInitializationCache(f.point),
        LinkEntity::TypeMetadataCompletionFunction(f.point),
        LinkEntity::TypeMetadata {
            ty: f.point_ty,
            address: TypeMetadataAddress::FullMetadata,
        },
        LinkEntity::TypeMetadata {
            ty: f.point_ty,
            address: TypeMetadataAddress::AddressPoint,
        },
        LinkEntity::TypeMetadataPattern(f.point),
        LinkEntity::ForeignTypeMetadataCandidate(f.point_ty),
        LinkEntity::SwiftMetaclassStub(f.widget),
        LinkEntity::ClassMetadataBaseOffset(f.widget),
        LinkEntity::NominalTypeDescriptor(f.point),
        LinkEntity::PropertyDescriptor(f.x),
        LinkEntity::ModuleDescriptor(f.main),
        LinkEntity::ExtensionDescriptor(extension),
        LinkEntity::AnonymousDescriptor(closure),
        LinkEntity::ProtocolDescriptor(f.shape),
        LinkEntity::ProtocolRequirementsBaseDescriptor(f.shape),
        LinkEntity::AssociatedTypeDescriptor(assoc),
        LinkEntity::AssociatedConformanceDescriptor {
            protocol: f.shape,
            requirement,
        },
        LinkEntity::DefaultAssociatedConformanceAccessor {
            protocol: f.shape,
            requirement,
        },
        LinkEntity::ProtocolConformanceDescriptor(conformance),
        LinkEntity::EnumCase(red),
        LinkEntity::FieldOffset(f.x),
        LinkEntity::DirectProtocolWitnessTable(conformance),
        LinkEntity::GenericProtocolWitnessTableCache(conformance),
        LinkEntity::GenericProtocolWitnessTableInstantiationFunction(conformance),
        LinkEntity::ResilientProtocolWitnessTable(conformance),
        LinkEntity::ProtocolWitnessTableAccessFunction(conformance),
        LinkEntity::ProtocolWitnessTablePattern(conformance),
        LinkEntity::ProtocolWitnessTableLazyAccessFunction {
            ty: f.point_ty,
            conformance,
        },
        LinkEntity::ProtocolWitnessTableLazyCacheVariable {
            ty: f.point_ty,
            conformance,
        },
        LinkEntity::AssociatedTypeWitnessTableAccessFunction {
            conformance,
            requirement,
        },
        LinkEntity::CoroutineContinuationPrototype(coroutine),
        LinkEntity::ObjCClassRef(f.widget),
        LinkEntity::ObjCClass(f.widget),
        LinkEntity::ObjCMetaclass(f.widget),
        LinkEntity::SilFunction(SilFunctionRef {
            name: function,
            linkage: LinkageCategory::Public,
        }),
        LinkEntity::SilGlobalVariable(SilGlobalRef {
            name: global,
            linkage: LinkageCategory::Hidden,
        }),
        LinkEntity::ReflectionBuiltinDescriptor(f.int),
        LinkEntity::ReflectionFieldDescriptor(f.point_ty),
        LinkEntity::ReflectionAssociatedTypeDescriptor(conformance),
    ];
    entities.extend(
        ValueWitness::ALL
            .iter()
            .map(|&witness| LinkEntity::ValueWitness {
                ty: f.point_ty,
                witness,
            }),
    );
    entities
}

#[test]
fn test_every_kind_has_a_distinct_symbol() {
    let mut f = Fixture::new();
    let entities = every_entity(&mut f);
    let encoder = SymbolEncoder::new(&f.program);
    let mut seen = HashSet::new();
    for entity in &entities {
        let symbol = encoder.encode(entity);
        assert!(symbol.is_ascii(), "{symbol:?} is not ASCII");
        assert!(seen.insert(symbol.clone()), "duplicate symbol {symbol:?} for {entity:?}");
    }
    assert_eq!(seen.len(), entities.len());
}

#[test]
fn test_encoding_is_deterministic_across_encoders() {
    let mut f = Fixture::new();
    let entities = every_entity(&mut f);
    let first = SymbolEncoder::new(&f.program);
    let second = SymbolEncoder::new(&f.program);
    for entity in &entities {
        assert_eq!(first.encode(entity), second.encode(entity));
    }
}

mod proptest_identifiers {
    use super::*;
    use proptest::prelude::*;

    /// Length in bytes of the first identifier in `s`, read back by its
    /// length prefix alone.
    fn split_identifier(s: &str) -> Option<usize> {
        let (escaped, body) = match s.strip_prefix('0') {
            Some(rest) if rest.starts_with('_') => return Some(2),
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let digits = body.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let len: usize = body[..digits].parse().ok()?;
        Some(usize::from(escaped) + digits + len)
    }

    proptest! {
        #[test]
        fn identifiers_are_ascii_and_injective(a in ".{0,12}", b in ".{0,12}") {
            let mut ea = String::new();
            let mut eb = String::new();
            encode_identifier(&mut ea, &a);
            encode_identifier(&mut eb, &b);
            prop_assert!(ea.is_ascii());
            prop_assert_eq!(a == b, ea == eb);
        }

        #[test]
        fn adjacent_identifiers_split_back_apart(a in ".{0,12}", b in ".{0,12}") {
            let mut joined = String::new();
            encode_identifier(&mut joined, &a);
            encode_identifier(&mut joined, &b);
            let mut first = String::new();
            encode_identifier(&mut first, &a);
            prop_assert_eq!(split_identifier(&joined), Some(first.len()));
        }

        #[test]
        fn struct_names_give_distinct_descriptors(a in "[A-Za-z_][A-Za-z0-9_]{0,8}", b in "[A-Za-z_][A-Za-z0-9_]{0,8}") {
            let mut f = Fixture::new();
            let da = f.program.declare(Some(f.main), &a, DeclKind::Struct, AccessLevel::Public);
            let db = f.program.declare(Some(f.main), &b, DeclKind::Struct, AccessLevel::Public);
            let encoder = SymbolEncoder::new(&f.program);
            let sa = encoder.encode(&LinkEntity::NominalTypeDescriptor(da));
            let sb = encoder.encode(&LinkEntity::NominalTypeDescriptor(db));
            prop_assert_eq!(a == b, sa == sb);
        }
    }
}
