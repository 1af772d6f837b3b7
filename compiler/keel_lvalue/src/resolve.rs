//! Resolving access paths into loads, stores and addresses.
//!
//! Every operation "drills" through all components but the last,
//! projecting each from the result of the one before, and then treats the
//! last component according to the operation: physical components are
//! loaded from or stored to, logical ones are `get` or `set`.

use crate::component::{store_assign, store_init};
use crate::memory::Place;
use crate::{AccessMarker, ComponentKind, LValue, LowerCx, ManagedValue, PathComponent};

/// Right-hand side of an assignment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssignSource {
    /// An expression, evaluated before the left-hand path.
    Expr(keel_ir::ExprId),
    /// A value computed earlier.
    Value(ManagedValue),
}

pub struct AccessResolver<'c, 'a> {
    cx: &'c mut LowerCx<'a>,
}

impl<'c, 'a> AccessResolver<'c, 'a> {
    pub fn new(cx: &'c mut LowerCx<'a>) -> Self {
        AccessResolver { cx }
    }

    /// Project every component but the last; returns the base of the last
    /// component and the component itself.
    fn drill(&mut self, lv: LValue) -> (Option<ManagedValue>, PathComponent) {
        let mut components = lv.into_components();
        let Some(last) = components.pop() else {
            panic!("resolving an empty access path");
        };
        let mut base = None;
        for component in components {
            base = Some(component.project(self.cx, base));
        }
        (base, last)
    }

    /// Read the value of `lv` in its own formal evaluation scope.
    pub fn load_value(self, lv: LValue) -> ManagedValue {
        self.cx.with_formal_scope_infallible(|cx| {
            let value = AccessResolver::new(cx).load_value_in_scope(lv);
            cx.formal.activate_pending();
            value
        })
    }

    fn load_value_in_scope(&mut self, lv: LValue) -> ManagedValue {
        let access = lv.access_kind();
        let (base, last) = self.drill(lv);
        if !last.is_physical() {
            return last.get(self.cx, base);
        }
        let projected = last.project(self.cx, base);
        if projected.is_address() {
            let trivial = self.cx.program.is_trivial(projected.ty.ty);
            return ManagedValue::load_from(&mut self.cx.b, projected, trivial, false);
        }
        if access.is_owned_read() {
            projected.ensure_plus_one(&mut self.cx.b)
        } else {
            projected
        }
    }

    /// Project the whole path to an address. Writebacks stay pending in the
    /// enclosing formal evaluation scope.
    pub fn materialize_address(self, lv: LValue) -> ManagedValue {
        let access = lv.access_kind();
        let span = lv.last().map(|last| last.span).unwrap_or_default();
        let mut components = lv.into_components();
        let Some(last) = components.pop() else {
            panic!("materializing an empty access path");
        };
        let mut base = None;
        for component in components {
            base = Some(component.project(self.cx, base));
        }
        let is_rvalue = last.is_rvalue();
        let addr = last.project(self.cx, base);
        let addr = if addr.is_address() {
            addr
        } else {
            self.cx.spill(addr, span)
        };
        if self.cx.options.sanitize_thread && !is_rvalue && !access.is_read() {
            self.cx.b.inout_access_instrumentation(addr.value);
        }
        self.cx.formal.activate_pending();
        addr
    }

    /// Store `src` through `lv`.
    pub fn assign(self, lv: LValue, src: AssignSource) {
        self.cx.with_formal_scope_infallible(|cx| {
            AccessResolver::new(cx).assign_impl(lv, src);
            cx.formal.activate_pending();
        });
    }

    fn assign_impl(&mut self, mut lv: LValue, src: AssignSource) {
        let setter_peephole = !lv.opens_existential()
            && matches!(
                lv.last().map(|last| &last.kind),
                Some(ComponentKind::GetterSetter(_))
            );

        let value = self.emit_source(src);

        if setter_peephole {
            let Some(setter) = lv.pop() else {
                unreachable!("setter peephole on an empty path");
            };
            tracing::trace!("assigning through the setter directly");
            let base = if lv.is_empty() {
                None
            } else {
                Some(self.project_all(lv))
            };
            setter.set(self.cx, base, value);
            return;
        }

        let mut value = value;
        while lv.last().is_some_and(PathComponent::is_translation) && lv.len() > 1 {
            let Some(translation) = lv.pop() else {
                break;
            };
            value = translation.untranslate(self.cx, value);
        }

        let (base, last) = self.drill(lv);
        if last.is_physical() {
            let addr = last.project(self.cx, base);
            assert!(addr.is_address(), "assignment to an rvalue");
            store_assign(self.cx, value, addr);
        } else {
            last.set(self.cx, base, value);
        }
    }

    fn emit_source(&mut self, src: AssignSource) -> ManagedValue {
        match src {
            AssignSource::Expr(expr) => self.cx.emit_rvalue(expr),
            AssignSource::Value(value) => value,
        }
    }

    fn project_all(&mut self, lv: LValue) -> ManagedValue {
        let mut base = None;
        for component in lv.into_components() {
            base = Some(component.project(self.cx, base));
        }
        match base {
            Some(base) => base,
            None => unreachable!("projected an empty access path"),
        }
    }

    /// Copy the value of `src` into the memory at `dest`.
    pub fn copy_lvalue_into(self, src: LValue, dest: ManagedValue, is_init: bool) {
        assert!(dest.is_address(), "copy into a non-address");
        self.cx.with_formal_scope_infallible(|cx| {
            if src.is_physical() {
                let span = src.last().map(|last| last.span).unwrap_or_default();
                let type_data = src.type_data();
                let src_addr = AccessResolver::new(cx).materialize_address(src);
                let marker = if is_init {
                    AccessMarker::Init
                } else {
                    AccessMarker::Modify
                };
                let dest = cx.enter_unenforced_access(dest, marker, span, type_data);
                cx.b.copy_addr(src_addr.value, dest.value, false, is_init);
            } else {
                let value = AccessResolver::new(cx).load_value(src);
                if is_init {
                    store_init(cx, value, dest);
                } else {
                    store_assign(cx, value, dest);
                }
            }
            cx.formal.activate_pending();
        });
    }

    /// `dest = src` where both sides are lvalues.
    pub fn assign_lvalue_to_lvalue(self, src: LValue, dest: LValue) {
        self.cx.with_formal_scope_infallible(|cx| {
            let non_conflicting = is_obviously_non_conflicting(cx, &src, &dest);
            if non_conflicting && src.is_physical() && dest.is_physical() {
                tracing::trace!("copying between physical paths directly");
                let src_addr = AccessResolver::new(cx).materialize_address(src);
                let dest_addr = AccessResolver::new(cx).materialize_address(dest);
                if src_addr.ty == dest_addr.ty {
                    cx.b.copy_addr(src_addr.value, dest_addr.value, false, false);
                } else {
                    let trivial = cx.program.is_trivial(src_addr.ty.ty);
                    let value = ManagedValue::load_from(&mut cx.b, src_addr, trivial, false);
                    store_assign(cx, value, dest_addr);
                }
            } else {
                let value = AccessResolver::new(cx).load_value(src);
                AccessResolver::new(cx).assign_impl(dest, AssignSource::Value(value));
            }
            cx.formal.activate_pending();
        });
    }
}

/// Can accessing both paths at once certainly not conflict?
///
/// Reads never conflict with reads; paths rooted in distinct locals,
/// globals or temporaries never conflict with each other.
fn is_obviously_non_conflicting(cx: &LowerCx<'_>, lhs: &LValue, rhs: &LValue) -> bool {
    if lhs.access_kind().is_read() && rhs.access_kind().is_read() {
        return true;
    }
    let root_place = |lv: &LValue| -> Option<&Place> {
        match &lv.components().first()?.kind {
            ComponentKind::Value { value, .. } if value.is_address() => {
                cx.b.place_of(value.value)
            }
            _ => None,
        }
    };
    match (root_place(lhs), root_place(rhs)) {
        (Some(lhs), Some(rhs)) => lhs.is_disjoint_root(rhs),
        _ => false,
    }
}
