use keel_ir::{
    AccessLevel, AccessorKind, AddressorKind, DeclFlags, DeclId, DeclKind, KeyPathKind,
    ReferenceOwnership, SilType, StorageImpl, TypeKind,
};
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{lower, mnemonics, Fixture};
use crate::{
    AccessIrBuilder, AccessMarker, AssignSource, BlockId, Enforcement, Inst, LoweringOptions,
    Place, PlaceRoot, StoreQualifier, Terminator, Unwind,
};

const ENTRY: BlockId = BlockId::new(0);

fn begin_accesses(b: &AccessIrBuilder) -> Vec<(AccessMarker, Enforcement)> {
    b.insts()
        .filter_map(|inst| match inst {
            Inst::BeginAccess {
                kind, enforcement, ..
            } => Some((*kind, *enforcement)),
            _ => None,
        })
        .collect()
}

/// Build `dest` for writing and assign `src` to it.
fn assign(cx: &mut LowerCx<'_>, dest: ExprId, src: AssignSource) {
    cx.with_formal_scope_infallible(|cx| {
        let lv = LValueBuilder::new(cx).build(dest, LValueAccessKind::Write, LValueOptions::empty());
        AccessResolver::new(cx).assign(lv, src);
    });
}

fn load(cx: &mut LowerCx<'_>, expr: ExprId, options: LValueOptions) -> ManagedValue {
    cx.with_formal_scope_infallible(|cx| {
        let lv = LValueBuilder::new(cx).build(expr, LValueAccessKind::OwnedObjectRead, options);
        AccessResolver::new(cx).load_value(lv)
    })
}

// ── Stored paths ────────────────────────────────────────────────────

#[test]
fn test_assign_to_stored_field() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let x = f.member(a, f.x);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, x, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "integer_literal",
            "begin_access",
            "struct_element_addr",
            "store",
            "end_access"
        ]
    );
    assert_eq!(
        begin_accesses(&b),
        vec![(AccessMarker::Modify, Enforcement::Unknown)]
    );
}

#[test]
fn test_load_after_store_forwards_the_stored_value() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let x = f.member(a, f.x);
    let five = f.int_literal(5);
    let a_again = f.decl_ref(f.a);
    let x_again = f.member(a_again, f.x);
    let (loaded, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, x, AssignSource::Expr(five));
        load(cx, x_again, LValueOptions::empty())
    });

    let stored = b.insts().find_map(|inst| match inst {
        Inst::IntegerLiteral { dst, value: 5 } => Some(*dst),
        _ => None,
    });
    assert_eq!(Some(b.resolve(loaded.value)), stored);
    assert!(!loaded.is_address());
}

#[test]
fn test_load_expression_reads_through_a_path() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let x = f.member(a, f.x);
    let read = f.program.add_expr(ExprKind::Load(x), f.int, keel_ir::Span::DUMMY);
    let (value, b, _) = lower(&f.program, LoweringOptions::default(), |cx| cx.emit_rvalue(read));

    assert_eq!(value.ty, SilType::object(f.int));
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "begin_access",
            "struct_element_addr",
            "load",
            "end_access"
        ]
    );
    assert_eq!(
        begin_accesses(&b),
        vec![(AccessMarker::Read, Enforcement::Unknown)]
    );
}

#[test]
fn test_rvalue_base_is_projected_by_value() {
    let mut f = Fixture::new();
    let a = f.value_ref(f.a);
    let x = f.member(a, f.x);
    let (_, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        load(cx, x, LValueOptions::empty())
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec!["alloc_local", "load", "struct_extract"]
    );
}

#[test]
fn test_rvalue_base_is_spilled_when_an_address_is_wanted() {
    let mut f = Fixture::new();
    let a = f.value_ref(f.a);
    let x = f.member(a, f.x);
    let (_, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        load(cx, x, LValueOptions::TRY_ADDRESS)
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "load",
            "alloc_temp",
            "store",
            "struct_element_addr",
            "load",
            "dealloc_temp"
        ]
    );
}

#[test]
fn test_discard_assignment_stores_into_a_temporary() {
    let mut f = Fixture::new();
    let lvalue_int = f.program.lvalue(f.int);
    let discard = f
        .program
        .add_expr(ExprKind::DiscardAssignment, lvalue_int, keel_ir::Span::DUMMY);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, discard, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec!["alloc_temp", "integer_literal", "store", "dealloc_temp"]
    );
}

#[test]
fn test_inout_address_is_instrumented_for_thread_sanitizer() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let x = f.member(a, f.x);
    let options = LoweringOptions {
        sanitize_thread: true,
        ..LoweringOptions::default()
    };
    let (addr, b, _) = lower(&f.program, options, |cx| {
        cx.with_formal_scope_infallible(|cx| {
            let lv = LValueBuilder::new(cx).build(
                x,
                LValueAccessKind::ReadWrite,
                LValueOptions::empty(),
            );
            AccessResolver::new(cx).materialize_address(lv)
        })
    });
    assert!(addr.is_address());
    let instrumented = b.insts().any(|inst| {
        matches!(inst, Inst::InoutAccessInstrumentation { addr: a } if *a == addr.value)
    });
    assert!(instrumented);
}

// ── Computed paths ──────────────────────────────────────────────────

#[test]
fn test_assign_to_computed_property_calls_only_the_setter() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let area = f.member(a, f.area);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, area, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "integer_literal",
            "begin_access",
            "apply",
            "end_access"
        ]
    );
    let callees: Vec<_> = b
        .insts()
        .filter_map(|inst| match inst {
            Inst::Apply { callee, args, .. } => Some((callee.accessor, callee.kind, args.len())),
            _ => None,
        })
        .collect();
    assert_eq!(callees, vec![(f.area_set, AccessorKind::Set, 1)]);
}

#[test]
fn test_read_write_of_computed_property_writes_back_at_scope_end() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let area = f.member(a, f.area);
    let ((), b, diagnostics) = lower(&f.program, LoweringOptions::default(), |cx| {
        cx.with_formal_scope_infallible(|cx| {
            let lv = LValueBuilder::new(cx).build(
                area,
                LValueAccessKind::ReadWrite,
                LValueOptions::empty(),
            );
            let _ = AccessResolver::new(cx).materialize_address(lv);
        });
    });
    assert!(diagnostics.is_empty());
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "begin_access",
            "alloc_temp",
            "load",
            "apply",
            "store",
            // writeback, newest first
            "load",
            "apply",
            "dealloc_temp",
            "end_access"
        ]
    );
    let kinds: Vec<AccessorKind> = b
        .insts()
        .filter_map(|inst| match inst {
            Inst::Apply { callee, .. } => Some(callee.kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![AccessorKind::Get, AccessorKind::Set]);
}

/// The setter call in `b`: its callee, the place `self` is passed by, and
/// the integer literal each argument is known to hold.
fn setter_call(b: &AccessIrBuilder) -> (DeclId, Option<Place>, Vec<Option<i128>>) {
    let Some((callee, self_arg, args)) = b.insts().find_map(|inst| match inst {
        Inst::Apply {
            callee,
            self_arg,
            args,
            ..
        } if callee.kind == AccessorKind::Set => Some((callee.accessor, *self_arg, args.clone())),
        _ => None,
    }) else {
        panic!("no setter call emitted");
    };
    let literal = |value: crate::ValueId| {
        let value = b.resolve(value);
        b.insts().find_map(|inst| match inst {
            Inst::IntegerLiteral { dst, value: literal } if *dst == value => Some(*literal),
            _ => None,
        })
    };
    let self_place = self_arg.and_then(|self_arg| b.place_of(self_arg).cloned());
    (callee, self_place, args.iter().map(|&arg| literal(arg)).collect())
}

#[test]
fn test_setter_peephole_matches_write_through_materialized_address() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let area = f.member(a, f.area);
    let five = f.int_literal(5);
    let ((), direct, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, area, AssignSource::Expr(five));
    });

    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let area = f.member(a, f.area);
    let five = f.int_literal(5);
    let ((), materialized, diagnostics) = lower(&f.program, LoweringOptions::default(), |cx| {
        cx.with_formal_scope_infallible(|cx| {
            let lv = LValueBuilder::new(cx).build(
                area,
                LValueAccessKind::ReadWrite,
                LValueOptions::empty(),
            );
            let addr = AccessResolver::new(cx).materialize_address(lv);
            let value = cx.emit_rvalue(five);
            cx.b.store(value.value, addr.value, StoreQualifier::Trivial);
        });
    });
    assert!(diagnostics.is_empty());

    let expected = (f.area_set, Some(Place::root(PlaceRoot::Local(f.a))), vec![Some(5)]);
    assert_eq!(setter_call(&direct), expected);
    assert_eq!(setter_call(&materialized), expected);
}

#[test]
fn test_subscript_index_is_evaluated_after_base() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let i = f.value_ref(f.i);
    let element = f.subscript(a, i);
    let (_, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        load(cx, element, LValueOptions::empty())
    });
    let allocs: Vec<keel_ir::DeclId> = b
        .insts()
        .filter_map(|inst| match inst {
            Inst::AllocLocal { decl, .. } => Some(*decl),
            _ => None,
        })
        .collect();
    assert_eq!(allocs, vec![f.a, f.i]);
    let getter = b.insts().find_map(|inst| match inst {
        Inst::Apply { callee, args, .. } => Some((callee.accessor, args.len())),
        _ => None,
    });
    assert_eq!(getter, Some((f.element_get, 1)));
}

// ── Optional chains ─────────────────────────────────────────────────

#[test]
fn test_failed_optional_binding_ends_pending_accesses_on_side_exit() {
    let mut f = Fixture::new();
    let o = f.decl_ref(f.o);
    let bound = f.bind_optional(o, 0);
    let x = f.member(bound, f.x);
    let five = f.int_literal(5);
    let (failure, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        let scope = cx.enter_formal_scope();
        let failure = cx.push_optional_failure_dest();
        let lv = LValueBuilder::new(cx).build(x, LValueAccessKind::Write, LValueOptions::empty());
        AccessResolver::new(cx).assign(lv, AssignSource::Expr(five));
        cx.pop_formal_scope(scope);
        assert_eq!(cx.pop_optional_failure_dest(), failure);
        failure
    });

    assert_eq!(mnemonics(&b, ENTRY), vec!["alloc_local", "begin_access"]);
    let Some(Terminator::SwitchOptional { some, none, .. }) = b.block(ENTRY).terminator.clone()
    else {
        panic!("optional binding does not branch on the optional");
    };

    assert_eq!(mnemonics(&b, none), vec!["end_access"]);
    assert_eq!(b.block(none).terminator, Some(Terminator::Branch(failure)));

    assert_eq!(
        mnemonics(&b, some),
        vec![
            "optional_payload",
            "integer_literal",
            "struct_element_addr",
            "store",
            "end_access"
        ]
    );
}

#[test]
#[should_panic(expected = "outside a deep enough optional chain")]
fn test_optional_binding_outside_chain_panics() {
    let mut f = Fixture::new();
    let o = f.decl_ref(f.o);
    let bound = f.bind_optional(o, 0);
    let x = f.member(bound, f.x);
    lower(&f.program, LoweringOptions::default(), |cx| {
        cx.with_formal_scope_infallible(|cx| {
            LValueBuilder::new(cx).build(x, LValueAccessKind::Write, LValueOptions::empty())
        })
    });
}

// ── Lvalue to lvalue ────────────────────────────────────────────────

fn build_pair(
    cx: &mut LowerCx<'_>,
    src: ExprId,
    dest: ExprId,
) -> (crate::LValue, crate::LValue) {
    let src = LValueBuilder::new(cx).build(
        src,
        LValueAccessKind::BorrowedAddressRead,
        LValueOptions::empty(),
    );
    let dest = LValueBuilder::new(cx).build(dest, LValueAccessKind::Write, LValueOptions::empty());
    (src, dest)
}

#[test]
fn test_assign_between_disjoint_locals_copies_addresses() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let src = f.member(a, f.x);
    let b_ref = f.decl_ref(f.b);
    let dest = f.member(b_ref, f.x);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        cx.with_formal_scope_infallible(|cx| {
            let (src, dest) = build_pair(cx, src, dest);
            AccessResolver::new(cx).assign_lvalue_to_lvalue(src, dest);
        });
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "alloc_local",
            "begin_access",
            "struct_element_addr",
            "begin_access",
            "struct_element_addr",
            "copy_addr",
            "end_access",
            "end_access"
        ]
    );
}

#[test]
fn test_assign_within_one_local_goes_through_a_value() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let src = f.member(a, f.x);
    let a_again = f.decl_ref(f.a);
    let dest = f.member(a_again, f.x);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        cx.with_formal_scope_infallible(|cx| {
            let (src, dest) = build_pair(cx, src, dest);
            AccessResolver::new(cx).assign_lvalue_to_lvalue(src, dest);
        });
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "begin_access",
            "struct_element_addr",
            "load",
            "end_access",
            "begin_access",
            "struct_element_addr",
            "store",
            "end_access"
        ]
    );
}

#[test]
fn test_copy_into_temporary_is_marked_when_verifying() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let x = f.member(a, f.x);
    let options = LoweringOptions {
        verify_exclusivity: true,
        ..LoweringOptions::default()
    };
    let ((), b, _) = lower(&f.program, options, |cx| {
        cx.with_formal_scope_infallible(|cx| {
            let dest = cx.emit_formal_temporary(SilType::object(f.int), keel_ir::Span::DUMMY);
            let src = LValueBuilder::new(cx).build(
                x,
                LValueAccessKind::BorrowedAddressRead,
                LValueOptions::empty(),
            );
            AccessResolver::new(cx).copy_lvalue_into(src, dest, true);
        });
    });
    assert_eq!(
        begin_accesses(&b),
        vec![
            (AccessMarker::Read, Enforcement::Unknown),
            (AccessMarker::Init, Enforcement::Unsafe)
        ]
    );
    let copy = b.insts().find_map(|inst| match inst {
        Inst::CopyAddr { take, init, .. } => Some((*take, *init)),
        _ => None,
    });
    assert_eq!(copy, Some((false, true)));
}

// ── Forced unwrap and reference storage ─────────────────────────────

#[test]
fn test_assign_through_forced_unwrap_checks_for_a_value() {
    let mut f = Fixture::new();
    let o = f.decl_ref(f.o);
    let lvalue_point = f.program.lvalue(f.point_ty);
    let forced = f.expr(
        ExprKind::ForceValue {
            sub: o,
            is_implicit_unwrap: false,
        },
        lvalue_point,
    );
    let x = f.member(forced, f.x);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, x, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "integer_literal",
            "begin_access",
            "precondition_has_value",
            "optional_payload",
            "struct_element_addr",
            "store",
            "end_access"
        ]
    );
}

#[test]
fn test_weak_variable_is_read_and_written_as_reference_storage() {
    let mut f = Fixture::new();
    let optional_widget = f.program.optional(f.widget_ty);
    let weak = f.local("delegate", optional_widget);
    if let DeclKind::Var { ownership, .. } = &mut f.program.decl_mut(weak).kind {
        *ownership = ReferenceOwnership::Weak;
    }
    let strong = f.local("fallback", optional_widget);
    let read = f.decl_ref(weak);
    let written = f.decl_ref(weak);
    let src = f.value_ref(strong);
    let (_, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        let value = load(cx, read, LValueOptions::empty());
        assign(cx, written, AssignSource::Expr(src));
        value
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "begin_access",
            "load_reference",
            "end_access",
            "alloc_local",
            "load",
            "begin_access",
            "store_reference",
            "end_access"
        ]
    );
    let ownerships: Vec<ReferenceOwnership> = b
        .insts()
        .filter_map(|inst| match inst {
            Inst::LoadReference { ownership, .. } => Some(*ownership),
            Inst::StoreReference {
                ownership, init, ..
            } => {
                assert!(!init);
                Some(*ownership)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        ownerships,
        vec![ReferenceOwnership::Weak, ReferenceOwnership::Weak]
    );
}

// ── Addressors and coroutines ───────────────────────────────────────

/// `var slot: Int` on `Point`, reached through an unsafe `address` and an
/// owning `mutableAddress`.
fn add_addressed_slot(f: &mut Fixture) -> DeclId {
    let slot = f.program.add_var(
        f.point,
        "slot",
        f.int,
        StorageImpl::addressed(),
        AccessLevel::Internal,
    );
    f.program
        .add_addressor(slot, AccessorKind::Address, AddressorKind::Unsafe);
    f.program
        .add_addressor(slot, AccessorKind::MutableAddress, AddressorKind::Owning);
    slot
}

#[test]
fn test_read_through_unsafe_addressor_begins_unsafe_access() {
    let mut f = Fixture::new();
    let slot = add_addressed_slot(&mut f);
    let a = f.decl_ref(f.a);
    let member = f.member(a, slot);
    let (_, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        load(cx, member, LValueOptions::empty())
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "begin_access",
            "load",
            "apply",
            "pointer_to_address",
            "begin_access",
            "load",
            "end_access",
            "end_access"
        ]
    );
    assert_eq!(
        begin_accesses(&b),
        vec![
            (AccessMarker::Read, Enforcement::Unknown),
            (AccessMarker::Read, Enforcement::Unsafe)
        ]
    );
    assert!(!b.insts().any(|inst| matches!(inst, Inst::DestroyValue { .. })));
}

#[test]
fn test_write_through_owning_addressor_releases_owner_at_scope_end() {
    let mut f = Fixture::new();
    let slot = add_addressed_slot(&mut f);
    let a = f.decl_ref(f.a);
    let member = f.member(a, slot);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, member, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "integer_literal",
            "begin_access",
            "apply",
            "pointer_to_address",
            "begin_access",
            "store",
            "end_access",
            "destroy_value",
            "end_access"
        ]
    );
    assert_eq!(
        begin_accesses(&b),
        vec![
            (AccessMarker::Modify, Enforcement::Unknown),
            (AccessMarker::Modify, Enforcement::Unsafe)
        ]
    );
    let Some(Inst::Apply { results, .. }) = b
        .insts()
        .find(|inst| matches!(inst, Inst::Apply { .. }))
    else {
        panic!("addressor was not called");
    };
    let destroyed = b.insts().find_map(|inst| match inst {
        Inst::DestroyValue { value } => Some(*value),
        _ => None,
    });
    assert_eq!(destroyed, results.get(1).copied());
}

/// `var cached: Int` on `Point`, reached through `read` and `modify`
/// coroutines.
fn add_coroutine_cache(f: &mut Fixture) -> DeclId {
    let cached = f.program.add_var(
        f.point,
        "cached",
        f.int,
        StorageImpl::coroutine(),
        AccessLevel::Internal,
    );
    f.program.add_accessor(cached, AccessorKind::Read);
    f.program.add_accessor(cached, AccessorKind::Modify);
    cached
}

fn begin_modify(cx: &mut LowerCx<'_>, expr: ExprId) -> ManagedValue {
    let lv =
        LValueBuilder::new(cx).build(expr, LValueAccessKind::ReadWrite, LValueOptions::empty());
    AccessResolver::new(cx).materialize_address(lv)
}

#[test]
fn test_modify_coroutine_ends_at_scope_end() {
    let mut f = Fixture::new();
    let cached = add_coroutine_cache(&mut f);
    let a = f.decl_ref(f.a);
    let member = f.member(a, cached);
    let (addr, b, diagnostics) = lower(&f.program, LoweringOptions::default(), |cx| {
        cx.with_formal_scope_infallible(|cx| begin_modify(cx, member))
    });
    assert!(diagnostics.is_empty());
    assert!(addr.is_address());
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "begin_access",
            "begin_apply",
            "end_apply",
            "end_access"
        ]
    );
    let Some(Inst::BeginApply {
        callee, yields, ..
    }) = b.insts().find(|inst| matches!(inst, Inst::BeginApply { .. }))
    else {
        panic!("modify coroutine was not started");
    };
    assert_eq!(callee.kind, AccessorKind::Modify);
    assert_eq!(yields.first().copied(), Some(addr.value));
}

#[test]
fn test_unwinding_aborts_modify_coroutine() {
    let mut f = Fixture::new();
    let cached = add_coroutine_cache(&mut f);
    let a = f.decl_ref(f.a);
    let member = f.member(a, cached);
    let (landing, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        let scope = cx.enter_formal_scope();
        let _ = begin_modify(cx, member);
        let mut unwind = Unwind::new();
        cx.unwind_formal_scope(scope, &mut unwind);
        unwind.landing_block()
    });

    let Some(landing) = landing else {
        panic!("no cleanup block after unwinding");
    };
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec!["alloc_local", "begin_access", "begin_apply"]
    );
    assert_eq!(mnemonics(&b, landing), vec!["abort_apply", "end_access"]);
    assert_eq!(b.block(landing).terminator, Some(Terminator::Unwind));

    let started = b.insts().find_map(|inst| match inst {
        Inst::BeginApply { token, .. } => Some(*token),
        _ => None,
    });
    let aborted = b.insts().find_map(|inst| match inst {
        Inst::AbortApply { token } => Some(*token),
        _ => None,
    });
    assert_eq!(aborted, started);
    assert!(!b.insts().any(|inst| matches!(inst, Inst::EndApply { .. })));
}

// ── Key paths ───────────────────────────────────────────────────────

/// `base[keyPath: kp]` as an lvalue of `Int`, where `kp` is a local key
/// path of `kind` from `Point` to `Int`.
fn key_path_application(f: &mut Fixture, base: ExprId, kind: KeyPathKind) -> ExprId {
    let kp_ty = f.program.mk(TypeKind::KeyPath {
        kind,
        root: f.point_ty,
        value: f.int,
    });
    let kp = f.local("kp", kp_ty);
    let key_path = f.value_ref(kp);
    let lvalue_int = f.program.lvalue(f.int);
    f.expr(ExprKind::KeyPathApplication { base, key_path }, lvalue_int)
}

#[test]
fn test_read_through_key_path_copies_the_root() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let applied = key_path_application(&mut f, a, KeyPathKind::ReadOnly);
    let (value, b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        load(cx, applied, LValueOptions::empty())
    });
    assert!(!value.is_address());
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            // the key path, then the base
            "alloc_local",
            "load",
            "alloc_local",
            "begin_access",
            "alloc_temp",
            "copy_addr",
            "alloc_temp",
            "key_path_read",
            "load",
            "dealloc_temp",
            "dealloc_temp",
            "end_access"
        ]
    );
    assert_eq!(
        begin_accesses(&b),
        vec![(AccessMarker::Read, Enforcement::Unknown)]
    );
}

#[test]
fn test_write_through_writable_key_path_releases_owner() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let applied = key_path_application(&mut f, a, KeyPathKind::Writable);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, applied, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "load",
            "alloc_local",
            "integer_literal",
            "begin_access",
            "key_path_project",
            "store",
            "destroy_value",
            "end_access"
        ]
    );
    let projected = b.insts().find_map(|inst| match inst {
        Inst::KeyPathProject {
            addr, owner, kind, ..
        } => Some((*addr, *owner, *kind)),
        _ => None,
    });
    let Some((addr, owner, kind)) = projected else {
        panic!("key path was not projected");
    };
    assert_eq!(kind, KeyPathKind::Writable);
    let stored_to = b.insts().find_map(|inst| match inst {
        Inst::Store { addr, .. } => Some(*addr),
        _ => None,
    });
    assert_eq!(stored_to, Some(addr));
    let destroyed = b.insts().find_map(|inst| match inst {
        Inst::DestroyValue { value } => Some(*value),
        _ => None,
    });
    assert_eq!(destroyed, Some(owner));
}

// ── Opened existentials ─────────────────────────────────────────────

/// `existential.<property>` with the existential opened in place, as an
/// lvalue of `Int`. `property` is a `get`/`set` requirement of `protocol`.
fn opened_member(
    f: &mut Fixture,
    protocol: DeclId,
    existential: DeclId,
    property: DeclId,
) -> ExprId {
    let existential_ty = f.program.existential(vec![protocol]);
    let opened_ty = f.program.mk(TypeKind::OpenedArchetype {
        existential: existential_ty,
        id: 0,
    });
    let lvalue_opened = f.program.lvalue(opened_ty);
    let opaque = f.expr(ExprKind::OpaqueValue, lvalue_opened);
    let sub = f.member(opaque, property);
    let source = f.decl_ref(existential);
    let lvalue_int = f.program.lvalue(f.int);
    f.expr(
        ExprKind::OpenExistential {
            existential: source,
            opaque,
            sub,
        },
        lvalue_int,
    )
}

/// A protocol with one `get`/`set` requirement `name: Int`, and a local of
/// its existential type.
fn protocol_with_property(
    f: &mut Fixture,
    name: &str,
    flags: DeclFlags,
) -> (DeclId, DeclId, DeclId) {
    let protocol = f.program.declare(
        Some(f.main),
        name,
        DeclKind::Protocol,
        AccessLevel::Internal,
    );
    f.program.add_flags(protocol, flags);
    let property = f.program.add_var(
        protocol,
        "value",
        f.int,
        StorageImpl::get_set(),
        AccessLevel::Internal,
    );
    f.program.add_accessor(property, AccessorKind::Get);
    f.program.add_accessor(property, AccessorKind::Set);
    let existential_ty = f.program.existential(vec![protocol]);
    let local = f.local("any_value", existential_ty);
    (protocol, property, local)
}

#[test]
fn test_assign_through_opened_opaque_existential_opens_in_place() {
    let mut f = Fixture::new();
    let (protocol, property, local) =
        protocol_with_property(&mut f, "Shape", DeclFlags::empty());
    let member = opened_member(&mut f, protocol, local, property);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, member, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "integer_literal",
            "begin_access",
            "open_existential_addr",
            "apply",
            "end_access"
        ]
    );
    let opened = b.insts().find_map(|inst| match inst {
        Inst::OpenExistentialAddr { dst, mutable, .. } => Some((*dst, *mutable)),
        _ => None,
    });
    let Some((opened, mutable)) = opened else {
        panic!("existential was not opened");
    };
    assert!(mutable);
    let setter_self = b.insts().find_map(|inst| match inst {
        Inst::Apply {
            callee, self_arg, ..
        } if callee.kind == AccessorKind::Set => Some(*self_arg),
        _ => None,
    });
    assert_eq!(setter_self, Some(Some(opened)));
}

#[test]
fn test_assign_through_opened_class_existential_writes_reference_back() {
    let mut f = Fixture::new();
    let (protocol, property, local) =
        protocol_with_property(&mut f, "Named", DeclFlags::CLASS_BOUND);
    let member = opened_member(&mut f, protocol, local, property);
    let five = f.int_literal(5);
    let ((), b, _) = lower(&f.program, LoweringOptions::default(), |cx| {
        assign(cx, member, AssignSource::Expr(five));
    });
    assert_eq!(
        mnemonics(&b, ENTRY),
        vec![
            "alloc_local",
            "integer_literal",
            "begin_access",
            // open a copy of the reference into a temporary
            "alloc_temp",
            "load",
            "open_existential_ref",
            "store",
            "apply",
            // rewrap it at scope end
            "load",
            "init_existential_ref",
            "store",
            "dealloc_temp",
            "end_access"
        ]
    );
    let stores: Vec<StoreQualifier> = b
        .insts()
        .filter_map(|inst| match inst {
            Inst::Store { qualifier, .. } => Some(*qualifier),
            _ => None,
        })
        .collect();
    assert_eq!(stores, vec![StoreQualifier::Init, StoreQualifier::Assign]);
}
