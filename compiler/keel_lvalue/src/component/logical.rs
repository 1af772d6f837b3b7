//! Logical components: `get`, `set`, and projection through a temporary.
//!
//! A logical component has no address of its own. Reading it calls `get`;
//! writing it calls `set`. When a consumer needs an address anyway (an
//! inout argument, a physical member of a computed property) the current
//! value is materialized into a formal temporary and a writeback that
//! `set`s the temporary's final contents is pushed onto the formal
//! evaluation stack.

use keel_ir::{AccessStrategy, DirectStrategy, ExistentialRepr, SilType, Span};

use super::{ComponentKind, MaterializeAccess, PathComponent};
use crate::member::StorageAccess;
use crate::{
    AccessMarker, AccessResolver, AssignSource, LValue, LValueAccessKind, LowerCx, ManagedValue,
    StoreQualifier,
};

impl PathComponent {
    pub(super) fn project_logical(
        self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
    ) -> ManagedValue {
        let access = self.access_kind();
        if access.is_read() {
            return self.project_for_read(cx, base);
        }
        if let ComponentKind::GetterSetter(call) = &self.kind {
            panic!(
                "{access} of `{}` projected through its getter; writes go through the setter",
                cx.program.decl_name(call.storage)
            );
        }

        let span = self.span;
        let type_data = self.type_data;
        let writeback = self.clone();

        let temp = cx.emit_formal_temporary(type_data.type_of_rvalue, span);
        let value = self.get(cx, base.map(ManagedValue::borrow));
        store_init(cx, value, temp);
        let temp = cx.enter_unenforced_access(temp, AccessMarker::Modify, span, type_data);
        cx.push_writeback(writeback, base, Some(temp));
        temp
    }

    fn project_for_read(self, cx: &mut LowerCx<'_>, base: Option<ManagedValue>) -> ManagedValue {
        let access = self.access_kind();
        let span = self.span;
        let value = self.get(cx, base);
        if access.is_address_read() {
            cx.spill(value, span)
        } else {
            value
        }
    }

    /// Compute the component's current value from its base.
    pub(crate) fn get(self, cx: &mut LowerCx<'_>, base: Option<ManagedValue>) -> ManagedValue {
        let ty = self.type_data.type_of_rvalue;
        let span = self.span;
        match self.kind {
            ComponentKind::GetterSetter(call) => call.emit_get(cx, base, ty),

            ComponentKind::MaterializeToTemporary(access) => {
                let lv = access.prepare(
                    cx,
                    base,
                    LValueAccessKind::OwnedObjectRead,
                    access.read,
                    span,
                );
                AccessResolver::new(cx).load_value(lv)
            }

            ComponentKind::OpenNonOpaqueExistential { .. } => {
                let base = logical_base(base, "opened existential");
                let existential = load_copy(cx, base);
                match cx.program.existential_repr(base.ty.ty) {
                    ExistentialRepr::Metatype => ManagedValue::trivial(
                        cx.b.open_existential_metatype(existential.value, ty),
                        ty,
                    ),
                    ExistentialRepr::Class => ManagedValue::owned(
                        cx.b.open_existential_ref(existential.value, ty),
                        ty,
                    ),
                    repr => unreachable!("{repr:?} existential opened as a logical component"),
                }
            }

            ComponentKind::OrigToSubst { .. } | ComponentKind::SubstToOrig => {
                let base = logical_base(base, "reabstraction");
                let value = load_copy(cx, base);
                reabstract(cx, value, ty)
            }

            ComponentKind::Ownership { ownership } => {
                let base = logical_base(base, "reference storage");
                let value = cx.b.load_reference(base.value, ownership, ty);
                ManagedValue::owned(value, ty)
            }

            ref other => unreachable!("{other:?} has no getter"),
        }
    }

    /// Store `value` through the component into its base.
    pub(crate) fn set(self, cx: &mut LowerCx<'_>, base: Option<ManagedValue>, value: ManagedValue) {
        let span = self.span;
        match self.kind {
            ComponentKind::GetterSetter(call) => call.emit_set(cx, base, value),

            ComponentKind::MaterializeToTemporary(access) => {
                let lv = access.prepare(cx, base, LValueAccessKind::Write, access.write, span);
                AccessResolver::new(cx).assign(lv, AssignSource::Value(value));
            }

            ComponentKind::OpenNonOpaqueExistential { .. } => {
                let base = logical_base(base, "opened existential");
                let existential_ty = base.ty.object_type();
                let value = value.ensure_plus_one(&mut cx.b);
                match cx.program.existential_repr(base.ty.ty) {
                    ExistentialRepr::Metatype => {
                        let wrapped = cx.b.init_existential_metatype(value.value, existential_ty);
                        cx.b.store(wrapped, base.value, StoreQualifier::Trivial);
                    }
                    ExistentialRepr::Class => {
                        let wrapped = cx.b.init_existential_ref(value.value, existential_ty);
                        cx.b.store(wrapped, base.value, StoreQualifier::Assign);
                    }
                    repr => unreachable!("{repr:?} existential opened as a logical component"),
                }
            }

            ComponentKind::OrigToSubst { .. } | ComponentKind::SubstToOrig => {
                let base = logical_base(base, "reabstraction");
                let value = self.untranslate_kind(cx, value);
                store_assign(cx, value, base);
            }

            ComponentKind::Ownership { ownership } => {
                let base = logical_base(base, "reference storage");
                let value = value.ensure_plus_one(&mut cx.b);
                cx.b.store_reference(value.value, base.value, ownership, false);
            }

            ref other => unreachable!("{other:?} has no setter"),
        }
    }

    /// Convert a value in this component's representation back into the
    /// base's representation.
    pub(crate) fn untranslate(&self, cx: &mut LowerCx<'_>, value: ManagedValue) -> ManagedValue {
        assert!(self.is_translation(), "{} is not a translation", self.describe());
        self.untranslate_kind(cx, value)
    }

    fn untranslate_kind(&self, cx: &mut LowerCx<'_>, value: ManagedValue) -> ManagedValue {
        let program = cx.program;
        let subst = self.type_data.subst_formal_type;
        let to = match self.kind {
            ComponentKind::OrigToSubst { orig } => program.lowered_type(orig, subst),
            ComponentKind::SubstToOrig => program.natural_lowered_type(subst),
            _ => unreachable!("{} is not a translation", self.describe()),
        };
        reabstract(cx, value, to)
    }

    /// Run this component's writeback when its formal access ends.
    ///
    /// `is_final` is false on side exits (optional-chain failure paths),
    /// where the same writeback will run again on the normal path.
    pub(crate) fn writeback(
        self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
        materialized: Option<ManagedValue>,
        is_final: bool,
    ) {
        tracing::trace!(component = self.describe(), is_final, "writeback");
        match self.kind {
            ComponentKind::EndAccess => {
                let access = logical_base(base, "end of access");
                cx.b.end_access(access.value, false);
            }
            ComponentKind::EndApply { token, .. } => {
                if is_final {
                    cx.b.end_apply(token);
                } else {
                    cx.b.abort_apply(token);
                }
            }
            ComponentKind::DestroyOwner => {
                let owner = logical_base(base, "owner");
                cx.b.destroy_value(owner.value);
            }
            _ => {
                let Some(temp) = materialized else {
                    panic!("{} writeback without a materialized temporary", self.describe());
                };
                let trivial = cx.program.is_trivial(temp.ty.ty);
                let value = ManagedValue::load_from(&mut cx.b, temp, trivial, is_final);
                let base = if is_final {
                    base
                } else {
                    base.map(ManagedValue::borrow)
                };
                self.set(cx, base, value);
            }
        }
    }
}

impl MaterializeAccess {
    /// Build the access path that reads or writes the storage with one of
    /// the two strategies.
    fn prepare(
        &self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
        access_kind: LValueAccessKind,
        strategy: DirectStrategy,
        span: Span,
    ) -> LValue {
        let strategy = AccessStrategy::from(strategy);
        let mut lv = LValue::new();
        if let (Some(base), Some(base_formal_type)) = (base, self.base_formal_type) {
            let base_access = crate::member::base_access_kind(
                cx,
                self.storage,
                access_kind,
                strategy,
                base_formal_type,
            );
            lv = LValue::for_value(cx.program, base_access, base, base_formal_type);
        }
        let formal_type = cx.program.rvalue_type(cx.program.storage_type(self.storage));
        lv.add_storage_component(
            cx,
            StorageAccess {
                storage: self.storage,
                subs: self.subs.clone(),
                is_super: self.is_super,
                options: self.options,
                access_kind,
                strategy,
                formal_type,
                base_formal_type: self.base_formal_type,
                indices: self.indices.clone(),
                span,
            },
        );
        lv
    }
}

fn logical_base(base: Option<ManagedValue>, what: &str) -> ManagedValue {
    match base {
        Some(base) => base,
        None => panic!("{what} component without a base"),
    }
}

fn load_copy(cx: &mut LowerCx<'_>, base: ManagedValue) -> ManagedValue {
    if !base.is_address() {
        return base.ensure_plus_one(&mut cx.b);
    }
    let trivial = cx.program.is_trivial(base.ty.ty);
    ManagedValue::load_from(&mut cx.b, base, trivial, false)
}

fn reabstract(cx: &mut LowerCx<'_>, value: ManagedValue, to: SilType) -> ManagedValue {
    let to = to.object_type();
    if value.ty.repr == to.repr {
        return value;
    }
    let converted = cx.b.reabstract(value.value, to);
    if cx.program.is_trivial(to.ty) {
        ManagedValue::trivial(converted, to)
    } else {
        ManagedValue::owned(converted, to)
    }
}

/// Initialize fresh memory with `value`.
pub(crate) fn store_init(cx: &mut LowerCx<'_>, value: ManagedValue, addr: ManagedValue) {
    if cx.program.is_trivial(value.ty.ty) {
        cx.b.store(value.value, addr.value, StoreQualifier::Trivial);
    } else {
        let value = value.ensure_plus_one(&mut cx.b);
        cx.b.store(value.value, addr.value, StoreQualifier::Init);
    }
}

/// Replace the value in initialized memory.
pub(crate) fn store_assign(cx: &mut LowerCx<'_>, value: ManagedValue, addr: ManagedValue) {
    if cx.program.is_trivial(value.ty.ty) {
        cx.b.store(value.value, addr.value, StoreQualifier::Trivial);
    } else {
        let value = value.ensure_plus_one(&mut cx.b);
        cx.b.store(value.value, addr.value, StoreQualifier::Assign);
    }
}
