//! Calls to getters, setters, addressors and coroutine accessors.

use keel_ir::{AccessorKind, DeclFlags, DeclKind, SilType, TypeKind};
use smallvec::SmallVec;

use super::AccessorCall;
use crate::{LoadQualifier, LowerCx, ManagedValue, ValueId};

impl AccessorCall {
    fn is_mutating(&self, cx: &LowerCx<'_>) -> bool {
        cx.program.decl(self.accessor).has(DeclFlags::MUTATING)
    }

    /// Lowered type of the accessor declaration.
    fn accessor_type(&self, cx: &LowerCx<'_>) -> keel_ir::TypeId {
        match cx.program.decl(self.accessor).kind {
            DeclKind::Accessor { ty, .. } => ty,
            ref other => panic!("accessor call to {}", other.describe()),
        }
    }

    /// The `self` argument: an address for mutating accessors, otherwise
    /// the base value, loaded at +0 when it is loadable.
    fn self_arg(&self, cx: &mut LowerCx<'_>, base: Option<ManagedValue>) -> Option<ValueId> {
        let base = base?;
        if self.is_mutating(cx) {
            assert!(
                base.is_address(),
                "mutating {:?} accessor of `{}` called on an rvalue base",
                self.kind,
                cx.program.decl_name(self.storage)
            );
            return Some(base.value);
        }
        if base.is_address() && !cx.program.is_address_only(base.ty.ty) {
            return Some(cx.b.load(base.value, LoadQualifier::Borrow));
        }
        Some(base.value)
    }

    fn index_args(&self) -> SmallVec<[ValueId; 4]> {
        self.indices
            .as_ref()
            .map(super::IndexArgs::raw_values)
            .unwrap_or_default()
    }

    pub(super) fn emit_get(
        &self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
        ty: SilType,
    ) -> ManagedValue {
        assert_eq!(self.kind, AccessorKind::Get, "getter call through a {:?}", self.kind);
        let self_arg = self.self_arg(cx, base);
        let args = self.index_args();
        let results = cx.b.apply(self.callee(), self_arg, &args, &[ty]);
        let value = results[0];
        if cx.program.is_trivial(ty.ty) {
            ManagedValue::trivial(value, ty)
        } else {
            ManagedValue::owned(value, ty)
        }
    }

    pub(super) fn emit_set(
        &self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
        value: ManagedValue,
    ) {
        assert_eq!(self.kind, AccessorKind::Set, "setter call through a {:?}", self.kind);
        let value = value.ensure_plus_one(&mut cx.b);
        let self_arg = self.self_arg(cx, base);
        let mut args: SmallVec<[ValueId; 4]> = SmallVec::new();
        args.push(value.value);
        args.extend(self.index_args());
        cx.b.apply(self.callee(), self_arg, &args, &[]);
    }

    /// Call an addressor; returns the address and, for owning addressors,
    /// the owner keeping that address alive.
    pub(super) fn emit_addressor(
        &self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
        ty: SilType,
    ) -> (ManagedValue, Option<ManagedValue>) {
        assert!(self.kind.is_addressor(), "addressor call through a {:?}", self.kind);
        let program = cx.program;
        let result = match program.type_kind(self.accessor_type(cx)) {
            TypeKind::Function { result, .. } => *result,
            other => panic!("addressor with non-function type {other:?}"),
        };
        let result_types: SmallVec<[SilType; 2]> = match program.type_kind(result) {
            TypeKind::Tuple(elements) => elements
                .iter()
                .map(|element| program.natural_lowered_type(element.ty))
                .collect(),
            _ => smallvec::smallvec![program.natural_lowered_type(result)],
        };

        let self_arg = self.self_arg(cx, base);
        let args = self.index_args();
        let results = cx.b.apply(self.callee(), self_arg, &args, &result_types);
        let addr = cx.b.pointer_to_address(results[0], ty);
        let owner = results
            .get(1)
            .map(|&owner| ManagedValue::owned(owner, result_types[1]));
        (ManagedValue::for_lvalue(addr, ty), owner)
    }

    /// Start a `read` or `modify` coroutine; returns its token and the
    /// yielded value.
    pub(super) fn emit_coroutine(
        &self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
        ty: SilType,
    ) -> (ValueId, ManagedValue) {
        assert!(self.kind.is_coroutine(), "coroutine call through a {:?}", self.kind);
        let by_address =
            self.kind == AccessorKind::Modify || cx.program.is_address_only(ty.ty);
        let yield_ty = if by_address {
            ty.address_type()
        } else {
            ty.object_type()
        };
        let self_arg = self.self_arg(cx, base);
        let args = self.index_args();
        let (token, yields) = cx.b.begin_apply(self.callee(), self_arg, &args, &[yield_ty]);
        let yielded = if by_address {
            ManagedValue::for_lvalue(yields[0], ty)
        } else {
            ManagedValue::borrowed(yields[0], yield_ty)
        };
        (token, yielded)
    }
}
