use keel_diagnostic::ErrorCode;
use keel_ir::{Span, TupleElement};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use smallvec::smallvec;

use super::*;
use crate::test_helpers::{lower, Fixture};
use crate::{AccessResolver, LValueAccessKind, LValueBuilder, LValueOptions, LoweringOptions};

/// Materialize both expressions for modification inside one formal scope,
/// as the two inout arguments of one call would be.
fn materialize_pair(f: &Fixture, lhs: ExprId, rhs: ExprId) -> Vec<Diagnostic> {
    let ((), _, diagnostics) = lower(&f.program, LoweringOptions::default(), |cx| {
        let scope = cx.enter_formal_scope();
        for expr in [lhs, rhs] {
            let lv = LValueBuilder::new(cx).build(
                expr,
                LValueAccessKind::ReadWrite,
                LValueOptions::empty(),
            );
            let _ = AccessResolver::new(cx).materialize_address(lv);
        }
        cx.pop_formal_scope(scope);
    });
    diagnostics
}

#[test]
fn test_same_computed_property_twice_is_diagnosed() {
    let mut f = Fixture::new();
    let a1 = f.decl_ref(f.a);
    let lhs = f.member(a1, f.area);
    let a2 = f.decl_ref(f.a);
    let rhs = f.member(a2, f.area);

    let diagnostics = materialize_pair(&f, lhs, rhs);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, ErrorCode::E4001);
    assert!(diagnostics[0].message.contains("'area'"));
    assert_eq!(
        diagnostics[0].primary_span(),
        Some(f.program.expr(rhs).span)
    );
}

#[test]
fn test_same_property_of_different_bases_is_not_diagnosed() {
    let mut f = Fixture::new();
    let a = f.decl_ref(f.a);
    let lhs = f.member(a, f.area);
    let b = f.decl_ref(f.b);
    let rhs = f.member(b, f.area);

    assert!(materialize_pair(&f, lhs, rhs).is_empty());
}

#[test]
fn test_stored_property_twice_is_not_diagnosed() {
    let mut f = Fixture::new();
    let a1 = f.decl_ref(f.a);
    let lhs = f.member(a1, f.x);
    let a2 = f.decl_ref(f.a);
    let rhs = f.member(a2, f.x);

    assert!(materialize_pair(&f, lhs, rhs).is_empty());
}

#[test]
fn test_subscript_with_equal_literal_indices_is_diagnosed() {
    let mut f = Fixture::new();
    let a1 = f.decl_ref(f.a);
    let one = f.int_literal(1);
    let lhs = f.subscript(a1, one);
    let a2 = f.decl_ref(f.a);
    let another_one = f.int_literal(1);
    let rhs = f.subscript(a2, another_one);

    let diagnostics = materialize_pair(&f, lhs, rhs);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, ErrorCode::E4002);
}

#[test]
fn test_subscript_with_distinct_variable_indices_is_not_diagnosed() {
    let mut f = Fixture::new();
    let a1 = f.decl_ref(f.a);
    let i = f.value_ref(f.i);
    let lhs = f.subscript(a1, i);
    let a2 = f.decl_ref(f.a);
    let j = f.value_ref(f.j);
    let rhs = f.subscript(a2, j);

    assert!(materialize_pair(&f, lhs, rhs).is_empty());
}

#[test]
fn test_subscript_with_same_variable_index_is_diagnosed() {
    let mut f = Fixture::new();
    let a1 = f.decl_ref(f.a);
    let i1 = f.value_ref(f.i);
    let lhs = f.subscript(a1, i1);
    let a2 = f.decl_ref(f.a);
    let i2 = f.value_ref(f.i);
    let rhs = f.subscript(a2, i2);

    let diagnostics = materialize_pair(&f, lhs, rhs);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, ErrorCode::E4002);
}

// ── Index equality ──────────────────────────────────────────────────

#[test]
fn test_parens_are_looked_through_only_in_pairs() {
    let mut f = Fixture::new();
    let one = f.int_literal(1);
    let paren = f.program.add_expr(ExprKind::Paren(one), f.int, Span::DUMMY);
    let other = f.int_literal(1);
    let other_paren = f.program.add_expr(ExprKind::Paren(other), f.int, Span::DUMMY);

    assert!(are_certainly_equal_indices(&f.program, paren, other_paren));
    assert!(!are_certainly_equal_indices(&f.program, paren, other));
}

#[test]
fn test_tuples_compare_elementwise() {
    let mut f = Fixture::new();
    let pair_ty = f.program.tuple(vec![
        TupleElement {
            label: None,
            ty: f.int,
        },
        TupleElement {
            label: None,
            ty: f.int,
        },
    ]);
    let tuple = |f: &mut Fixture, first: i128, second: i128| {
        let first = f.int_literal(first);
        let second = f.int_literal(second);
        f.program.add_expr(
            ExprKind::Tuple {
                elements: smallvec![first, second],
                labels: smallvec![None, None],
                has_trailing_closure: false,
            },
            pair_ty,
            Span::DUMMY,
        )
    };
    let lhs = tuple(&mut f, 1, 2);
    let same = tuple(&mut f, 1, 2);
    let different = tuple(&mut f, 1, 3);

    assert!(are_certainly_equal_indices(&f.program, lhs, same));
    assert!(!are_certainly_equal_indices(&f.program, lhs, different));
}

#[test]
fn test_calls_are_equal_only_for_literal_constructors() {
    let mut f = Fixture::new();
    let init_ty = f.program.function(vec![f.int], f.int);
    let int_decl = f.program.declare(
        None,
        "Int",
        keel_ir::DeclKind::Module,
        keel_ir::AccessLevel::Public,
    );
    let label = f.program.intern("integerLiteral");
    let literal_init = f.program.declare(
        Some(int_decl),
        "init",
        DeclKind::Constructor {
            ty: init_ty,
            arg_labels: smallvec![label],
        },
        keel_ir::AccessLevel::Public,
    );
    let other_fn = f.program.declare(
        Some(int_decl),
        "random",
        DeclKind::Func { ty: init_ty },
        keel_ir::AccessLevel::Public,
    );

    let call = |f: &mut Fixture, callee: keel_ir::DeclId| {
        let func = f.program.add_expr(
            ExprKind::DeclRef {
                decl: callee,
                subs: keel_ir::SubstitutionMap::default(),
                semantics: keel_ir::AccessSemantics::Ordinary,
            },
            init_ty,
            Span::DUMMY,
        );
        let arg = f.int_literal(7);
        f.program
            .add_expr(ExprKind::Call { func, arg }, f.int, Span::DUMMY)
    };
    let lhs = call(&mut f, literal_init);
    let rhs = call(&mut f, literal_init);
    assert!(are_certainly_equal_indices(&f.program, lhs, rhs));

    let lhs = call(&mut f, other_fn);
    let rhs = call(&mut f, other_fn);
    assert!(!are_certainly_equal_indices(&f.program, lhs, rhs));
}

proptest! {
    #[test]
    fn prop_integer_literals_equal_iff_values_equal(lhs in any::<i64>(), rhs in any::<i64>()) {
        let mut program = Program::new();
        let int = program.builtin("Int64");
        let l = program.add_expr(ExprKind::IntegerLiteral(i128::from(lhs)), int, Span::DUMMY);
        let r = program.add_expr(ExprKind::IntegerLiteral(i128::from(rhs)), int, Span::DUMMY);
        prop_assert_eq!(are_certainly_equal_indices(&program, l, r), lhs == rhs);
        prop_assert!(are_certainly_equal_indices(&program, l, l));
    }
}
