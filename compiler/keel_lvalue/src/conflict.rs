//! Overlapping-writeback diagnosis.
//!
//! Two writebacks pending in the same formal scope that both `set` the same
//! computed storage on the same base would silently lose one of the
//! writes. When that can be proven the pair is reported; when it cannot
//! (different bases, indices that may differ, storage that is really just
//! memory) lowering stays quiet. Every check here is conservative: `false`
//! means "not provably equal", never "provably different".

use keel_diagnostic::{writeback_overlap_property, writeback_overlap_subscript, Diagnostic};
use keel_ir::{DeclKind, ExprId, ExprKind, Program, ReadImpl, WriteImpl};

use crate::formal_eval::FormalAccess;
use crate::stack::ensure_sufficient_stack;
use crate::{AccessIrBuilder, ManagedValue};

/// Check a pending writeback against one pushed before it.
pub(crate) fn diagnose_conflict(
    program: &Program,
    b: &AccessIrBuilder,
    later: &FormalAccess,
    earlier: &FormalAccess,
) -> Option<Diagnostic> {
    let (lhs, lhs_base) = later.writeback()?;
    let (rhs, rhs_base) = earlier.writeback()?;

    if !lhs.same_kind(rhs) || !are_obviously_same_base(b, lhs_base, rhs_base) {
        return None;
    }
    let lhs_storage = lhs.accessed_storage()?;
    let rhs_storage = rhs.accessed_storage()?;
    if lhs_storage.storage != rhs_storage.storage || lhs_storage.is_super != rhs_storage.is_super {
        return None;
    }

    let storage = lhs_storage.storage;
    if is_monomorphically_stored(program, storage) || program.requirement_protocol(storage).is_some()
    {
        return None;
    }

    match (lhs_storage.indices, rhs_storage.indices) {
        (None, None) => Some(writeback_overlap_property(
            program.decl_name(storage),
            lhs.span,
            rhs.span,
        )),
        (Some(lhs_indices), Some(rhs_indices)) => {
            let equal = lhs_indices.is_obviously_equal(rhs_indices, b)
                || are_certainly_equal_indices(program, lhs_indices.expr, rhs_indices.expr);
            equal.then(|| writeback_overlap_subscript(lhs.span, rhs.span))
        }
        _ => None,
    }
}

fn are_obviously_same_base(
    b: &AccessIrBuilder,
    lhs: Option<ManagedValue>,
    rhs: Option<ManagedValue>,
) -> bool {
    match (lhs, rhs) {
        (None, None) => true,
        (Some(lhs), Some(rhs)) => b.are_obviously_same_value(lhs.value, rhs.value),
        _ => false,
    }
}

/// Storage whose every access is a plain memory access: two writebacks to
/// it are ordinary overlapping memory accesses, checked elsewhere.
fn is_monomorphically_stored(program: &Program, storage: keel_ir::DeclId) -> bool {
    let Some(imp) = program.decl(storage).storage_impl() else {
        return false;
    };
    matches!(imp.read, ReadImpl::Stored | ReadImpl::Address)
        && matches!(
            imp.write,
            WriteImpl::Immutable | WriteImpl::Stored | WriteImpl::MutableAddress
        )
}

/// Are two index expressions certainly the same value?
///
/// Literals compare by value; references to the same declaration compare
/// equal; calls compare equal only when the callee is known to be free of
/// side effects and reads nothing.
pub fn are_certainly_equal_indices(program: &Program, lhs: ExprId, rhs: ExprId) -> bool {
    ensure_sufficient_stack(|| are_certainly_equal_indices_impl(program, lhs, rhs))
}

fn are_certainly_equal_indices_impl(program: &Program, lhs: ExprId, rhs: ExprId) -> bool {
    let lhs_expr = program.expr(lhs);
    let rhs_expr = program.expr(rhs);
    if !lhs_expr.kind.same_kind(&rhs_expr.kind) {
        return false;
    }

    match (&lhs_expr.kind, &rhs_expr.kind) {
        (ExprKind::Paren(l), ExprKind::Paren(r)) => are_certainly_equal_indices(program, *l, *r),
        (ExprKind::Call { func: lf, arg: la }, ExprKind::Call { func: rf, arg: ra }) => {
            are_certainly_equal_indices(program, *lf, *rf)
                && are_certainly_equal_indices(program, *la, *ra)
                && is_read_none_function(program, *lf)
        }
        (ExprKind::TypeExpr(_), ExprKind::TypeExpr(_)) => true,
        (
            ExprKind::DeclRef { decl: l, .. },
            ExprKind::DeclRef { decl: r, .. },
        ) => l == r && lhs_expr.ty == rhs_expr.ty,
        (ExprKind::IntegerLiteral(l), ExprKind::IntegerLiteral(r)) => l == r,
        (ExprKind::FloatLiteral(l), ExprKind::FloatLiteral(r)) => l == r,
        (ExprKind::BooleanLiteral(l), ExprKind::BooleanLiteral(r)) => l == r,
        (ExprKind::StringLiteral(l), ExprKind::StringLiteral(r)) => l == r,
        (
            ExprKind::ConstructorRefCall { func: lf, base: lb },
            ExprKind::ConstructorRefCall { func: rf, base: rb },
        ) => {
            are_certainly_equal_indices(program, *lf, *rf)
                && are_certainly_equal_indices(program, *lb, *rb)
        }
        (
            ExprKind::Tuple {
                elements: le,
                labels: ll,
                has_trailing_closure: lt,
            },
            ExprKind::Tuple {
                elements: re,
                labels: rl,
                has_trailing_closure: rt,
            },
        ) => {
            le.len() == re.len()
                && lt == rt
                && ll == rl
                && le
                    .iter()
                    .zip(re.iter())
                    .all(|(l, r)| are_certainly_equal_indices(program, *l, *r))
        }
        _ => false,
    }
}

/// Literal-initializing constructors: calling one twice with equal
/// arguments certainly yields equal values.
fn is_read_none_function(program: &Program, func: ExprId) -> bool {
    match &program.expr(func).kind {
        ExprKind::DeclRef { decl, .. } => match &program.decl(*decl).kind {
            DeclKind::Constructor { arg_labels, .. } => {
                arg_labels.len() == 1
                    && matches!(
                        program.name_str(arg_labels[0]),
                        "integerLiteral" | "_builtinIntegerLiteral"
                    )
            }
            _ => false,
        },
        ExprKind::ConstructorRefCall { func, .. } => is_read_none_function(program, *func),
        _ => false,
    }
}

#[cfg(test)]
mod tests;
