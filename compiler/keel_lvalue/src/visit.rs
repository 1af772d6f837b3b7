//! Building access paths from assignable expressions.
//!
//! [`LValueBuilder`] walks an expression of lvalue (or inout) type from the
//! outside in, asking each member or subscript access how it will reach its
//! base, then appends one component per step from the root out. Base
//! expressions are visited, and their rvalue parts evaluated, before index
//! expressions.
//!
//! Existential opening is split across two nodes: the `OpenExistential`
//! expression records itself as pending under its opaque value, and the
//! first use of that opaque value inside the body builds the existential's
//! path and opens it there. Every pending entry must be consumed by the
//! time its `OpenExistential` finishes.

use keel_ir::{
    AbstractionPattern, AccessSemantics, AccessStrategy, DeclKind, ExistentialRepr, ExprId,
    ExprKind, KeyPathKind, SubstitutionMap, TypeId, TypeKind,
};
use rustc_hash::FxHashMap;
use smallvec::smallvec;

use crate::member::{base_access_kind, base_access_kind_for_storage, base_options, StorageAccess};
use crate::stack::ensure_sufficient_stack;
use crate::{
    AccessResolver, ComponentKind, IndexArgs, LValue, LValueAccessKind, LValueOptions,
    LValueTypeData, LowerCx, ManagedValue, PathComponent,
};

pub struct LValueBuilder<'c, 'a> {
    cx: &'c mut LowerCx<'a>,
    /// Opaque value → the `OpenExistential` expression binding it, for
    /// existentials whose opening waits for first use.
    pending_opened: FxHashMap<ExprId, ExprId>,
}

impl<'c, 'a> LValueBuilder<'c, 'a> {
    pub fn new(cx: &'c mut LowerCx<'a>) -> Self {
        LValueBuilder {
            cx,
            pending_opened: FxHashMap::default(),
        }
    }

    /// Build the access path of `expr` for an `access` of the result.
    pub fn build(mut self, expr: ExprId, access: LValueAccessKind, options: LValueOptions) -> LValue {
        let mut lv = self.visit_rec(expr, access, options, None);
        let program = self.cx.program;
        let last = lv.type_data();
        if last.type_of_rvalue != program.natural_lowered_type(last.subst_formal_type) {
            lv.add_orig_to_subst(program, last.orig_formal_type, program.expr(expr).span);
        }
        tracing::debug!(
            expr = program.expr(expr).kind.describe(),
            %access,
            components = lv.len(),
            "built lvalue"
        );
        lv
    }

    /// Build the access path of a stored or computed property of an
    /// already-evaluated base.
    pub fn build_property(
        self,
        base: ManagedValue,
        base_formal_type: TypeId,
        var: keel_ir::DeclId,
        options: LValueOptions,
        access: LValueAccessKind,
        semantics: AccessSemantics,
    ) -> LValue {
        let program = self.cx.program;
        let strategy = program.access_strategy(var, semantics, access.formal());
        let base_access = base_access_kind(self.cx, var, access, strategy, base_formal_type);
        let mut lv = LValue::for_value(program, base_access, base, base_formal_type);
        let formal_type = program.rvalue_type(program.storage_type(var));
        lv.add_storage_component(
            self.cx,
            StorageAccess {
                storage: var,
                subs: SubstitutionMap::default(),
                is_super: false,
                options,
                access_kind: access,
                strategy,
                formal_type,
                base_formal_type: Some(base_formal_type),
                indices: None,
                span: program.decl(var).span,
            },
        );
        lv
    }

    fn visit_rec(
        &mut self,
        expr: ExprId,
        access: LValueAccessKind,
        options: LValueOptions,
        orig: Option<AbstractionPattern>,
    ) -> LValue {
        ensure_sufficient_stack(|| self.visit_rec_impl(expr, access, options, orig))
    }

    fn visit_rec_impl(
        &mut self,
        expr: ExprId,
        access: LValueAccessKind,
        options: LValueOptions,
        orig: Option<AbstractionPattern>,
    ) -> LValue {
        let program = self.cx.program;
        let e = program.expr(expr);
        if program.is_lvalue_or_inout(e.ty) {
            let mut lv = self.visit(expr, access, options);
            if let Some(orig) = orig {
                let wanted = program.lowered_type(orig, lv.subst_formal_type());
                if wanted != lv.type_of_rvalue() {
                    lv.add_subst_to_orig(program, orig, e.span);
                }
            }
            return lv;
        }

        // An rvalue used as the base of an access path.
        let mut value = match self.cx.emit_guaranteed_rvalue(expr) {
            Some(value) => value,
            None => self.cx.emit_rvalue(expr),
        };
        if options.contains(LValueOptions::TRY_ADDRESS) && !value.is_address() {
            value = self.cx.spill(value, e.span);
        }
        let formal = program.rvalue_type(e.ty);
        let type_data =
            LValueTypeData::new(access, AbstractionPattern::Type(formal), formal, value.ty);
        let mut lv = LValue::new();
        lv.add(PathComponent::new(
            ComponentKind::Value {
                value,
                enforcement: None,
                is_rvalue: true,
            },
            type_data,
            e.span,
        ));
        lv
    }

    fn visit(&mut self, expr: ExprId, access: LValueAccessKind, options: LValueOptions) -> LValue {
        let program = self.cx.program;
        let e = program.expr(expr);
        let span = e.span;
        let formal = program.rvalue_type(e.ty);

        match &e.kind {
            ExprKind::Paren(sub) | ExprKind::InOut(sub) => self.visit_rec(*sub, access, options, None),

            ExprKind::DeclRef {
                decl,
                subs,
                semantics,
            } => {
                let strategy = match program.decl(*decl).kind {
                    DeclKind::Param { .. } => AccessStrategy::Storage,
                    _ => program.access_strategy(*decl, *semantics, access.formal()),
                };
                let mut lv = LValue::new();
                lv.add_storage_component(
                    self.cx,
                    StorageAccess {
                        storage: *decl,
                        subs: subs.clone(),
                        is_super: false,
                        options,
                        access_kind: access,
                        strategy,
                        formal_type: formal,
                        base_formal_type: None,
                        indices: None,
                        span,
                    },
                );
                lv
            }

            ExprKind::MemberRef {
                base,
                member,
                subs,
                semantics,
                is_super,
            } => {
                let strategy = program.access_strategy(*member, *semantics, access.formal());
                let base_formal = program.rvalue_type(program.expr(*base).ty);
                let base_access = base_access_kind(self.cx, *member, access, strategy, base_formal);
                let mut lv = self.visit_rec(*base, base_access, base_options(options, strategy), None);
                lv.add_storage_component(
                    self.cx,
                    StorageAccess {
                        storage: *member,
                        subs: subs.clone(),
                        is_super: *is_super,
                        options,
                        access_kind: access,
                        strategy,
                        formal_type: formal,
                        base_formal_type: Some(base_formal),
                        indices: None,
                        span,
                    },
                );
                lv
            }

            ExprKind::Subscript {
                base,
                decl,
                index,
                subs,
                semantics,
                is_super,
            } => {
                let strategy = program.access_strategy(*decl, *semantics, access.formal());
                let base_formal = program.rvalue_type(program.expr(*base).ty);
                let base_access = base_access_kind(self.cx, *decl, access, strategy, base_formal);
                let mut lv = self.visit_rec(*base, base_access, base_options(options, strategy), None);
                let index_value = self.cx.emit_rvalue(*index);
                lv.add_storage_component(
                    self.cx,
                    StorageAccess {
                        storage: *decl,
                        subs: subs.clone(),
                        is_super: *is_super,
                        options,
                        access_kind: access,
                        strategy,
                        formal_type: formal,
                        base_formal_type: Some(base_formal),
                        indices: Some(IndexArgs {
                            values: smallvec![index_value],
                            expr: *index,
                        }),
                        span,
                    },
                );
                lv
            }

            ExprKind::TupleElement { base, index } => {
                let base_access = base_access_kind_for_storage(access);
                let mut lv =
                    self.visit_rec(*base, base_access, options.for_projected_base(), None);
                let orig = match lv.type_data().orig_formal_type {
                    AbstractionPattern::Type(ty)
                        if matches!(program.type_kind(ty), TypeKind::Tuple(_)) =>
                    {
                        AbstractionPattern::Type(program.tuple_element_type(ty, *index))
                    }
                    _ => AbstractionPattern::Opaque,
                };
                let type_data =
                    LValueTypeData::new(access, orig, formal, program.lowered_type(orig, formal));
                lv.add(PathComponent::new(
                    ComponentKind::TupleElement { index: *index },
                    type_data,
                    span,
                ));
                lv
            }

            ExprKind::ForceValue {
                sub,
                is_implicit_unwrap,
            } => {
                let base_access = base_access_kind_for_storage(access);
                let mut lv =
                    self.visit_rec(*sub, base_access, options.for_computed_base(), None);
                let object = self.optional_object(*sub);
                let orig = AbstractionPattern::Type(object);
                let type_data =
                    LValueTypeData::new(access, orig, object, program.lowered_type(orig, object));
                lv.add(PathComponent::new(
                    ComponentKind::ForceOptionalObject {
                        is_implicit_unwrap: *is_implicit_unwrap,
                    },
                    type_data,
                    span,
                ));
                lv
            }

            ExprKind::BindOptional { sub, depth } => {
                let base_access = base_access_kind_for_storage(access).to_address();
                let optional =
                    self.visit_rec(*sub, base_access, options.for_computed_base(), None);
                let addr = AccessResolver::new(self.cx).materialize_address(optional);
                self.cx.emit_bind_optional_address(addr, *depth);

                let object = self.optional_object(*sub);
                let object_ty = program.natural_lowered_type(object);
                let payload = self.cx.b.optional_payload(addr.value, object_ty);
                let type_data = LValueTypeData::new(
                    access,
                    AbstractionPattern::Type(object),
                    object,
                    object_ty,
                );
                let mut lv = LValue::new();
                lv.add(PathComponent::new(
                    ComponentKind::Value {
                        value: ManagedValue::for_lvalue(payload, object_ty),
                        enforcement: None,
                        is_rvalue: false,
                    },
                    type_data,
                    span,
                ));
                lv
            }

            ExprKind::OpenExistential {
                existential,
                opaque,
                sub,
            } => {
                if !program.is_lvalue_or_inout(program.expr(*existential).ty) {
                    let value = self.cx.emit_rvalue(*existential);
                    let opened_ty = program.expr(*opaque).ty;
                    let opened = self.cx.open_existential_rvalue(value, opened_ty, span);
                    self.cx.bind_opaque_value(*opaque, opened);
                    let lv = self.visit_rec(*sub, access, options, None);
                    self.cx.unbind_opaque_value(*opaque);
                    return lv;
                }
                self.pending_opened.insert(*opaque, expr);
                let lv = self.visit_rec(*sub, access, options, None);
                assert!(
                    !self.pending_opened.contains_key(opaque),
                    "opened existential not removed"
                );
                lv
            }

            ExprKind::OpaqueValue => {
                if let Some(open) = self.pending_opened.remove(&expr) {
                    let ExprKind::OpenExistential { existential, .. } = program.expr(open).kind
                    else {
                        unreachable!("pending opened existential is not an OpenExistential");
                    };
                    let lv = self.visit_rec(existential, access, options, None);
                    return self.open_existential_lvalue(lv, access, formal, span);
                }
                let Some(value) = self.cx.opaque_value(expr) else {
                    panic!("opaque value {expr:?} used outside the expression binding it");
                };
                let type_data =
                    LValueTypeData::new(access, AbstractionPattern::Type(formal), formal, value.ty);
                let mut lv = LValue::new();
                lv.add(PathComponent::new(
                    ComponentKind::Value {
                        value: value.borrow(),
                        enforcement: None,
                        is_rvalue: !value.is_address(),
                    },
                    type_data,
                    span,
                ));
                lv
            }

            ExprKind::KeyPathApplication { base, key_path } => {
                let TypeKind::KeyPath { kind, .. } =
                    *program.type_kind(program.rvalue_type(program.expr(*key_path).ty))
                else {
                    panic!("key path application with a non-key-path operand");
                };
                let key_path_value = self.cx.emit_rvalue(*key_path);
                let base_access = match kind {
                    KeyPathKind::Writable if !access.is_read() => LValueAccessKind::ReadWrite,
                    _ => LValueAccessKind::BorrowedAddressRead,
                };
                let mut lv = self.visit_rec(
                    *base,
                    base_access,
                    options.for_computed_base(),
                    Some(AbstractionPattern::Opaque),
                );
                let orig = AbstractionPattern::Opaque;
                let type_data =
                    LValueTypeData::new(access, orig, formal, program.lowered_type(orig, formal));
                lv.add(PathComponent::new(
                    ComponentKind::KeyPathApplication {
                        key_path: key_path_value,
                        kind,
                    },
                    type_data,
                    span,
                ));
                if type_data.type_of_rvalue != program.natural_lowered_type(formal) {
                    lv.add_orig_to_subst(program, orig, span);
                }
                lv
            }

            ExprKind::DotSyntaxBaseIgnored { lhs, rhs } => {
                self.cx.emit_ignored(*lhs);
                self.visit_rec(*rhs, access, options, None)
            }

            ExprKind::DiscardAssignment => {
                let ty = program.natural_lowered_type(formal);
                let temp = self.cx.emit_formal_temporary(ty, span);
                let type_data =
                    LValueTypeData::new(access, AbstractionPattern::Type(formal), formal, ty);
                let mut lv = LValue::new();
                lv.add(PathComponent::new(
                    ComponentKind::Value {
                        value: temp,
                        enforcement: None,
                        is_rvalue: false,
                    },
                    type_data,
                    span,
                ));
                lv
            }

            other => panic!("unexpected {} in lvalue position", other.describe()),
        }
    }

    fn optional_object(&self, expr: ExprId) -> TypeId {
        let program = self.cx.program;
        match program.optional_object_type(program.expr(expr).ty) {
            Some(object) => object,
            None => panic!(
                "{} of non-optional type unwrapped",
                program.expr(expr).kind.describe()
            ),
        }
    }

    /// Open the existential at the end of `lv` as `opened`.
    fn open_existential_lvalue(
        &mut self,
        mut lv: LValue,
        access: LValueAccessKind,
        opened: TypeId,
        span: keel_ir::Span,
    ) -> LValue {
        let program = self.cx.program;
        let orig = AbstractionPattern::Opaque;
        let type_data =
            LValueTypeData::new(access, orig, opened, program.lowered_type(orig, opened));
        let kind = match program.existential_repr(lv.subst_formal_type()) {
            ExistentialRepr::Opaque | ExistentialRepr::Boxed => {
                ComponentKind::OpenOpaqueExistential { opened }
            }
            ExistentialRepr::Class | ExistentialRepr::Metatype => {
                ComponentKind::OpenNonOpaqueExistential { opened }
            }
        };
        lv.add(PathComponent::new(kind, type_data, span));
        lv
    }
}

#[cfg(test)]
mod tests;
