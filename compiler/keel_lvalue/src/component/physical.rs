//! Projection of physical components.
//!
//! Each projection takes the address (or, for rvalue roots, the value) of
//! its base and produces the address of the component's storage. Accesses
//! that must be guarded begin an access scope whose end is pushed as a
//! writeback, so the scope closes with the enclosing formal evaluation.

use keel_ir::{ExistentialRepr, KeyPathKind};

use super::{ComponentKind, PathComponent};
use crate::{Enforcement, LoadQualifier, LowerCx, ManagedValue};

impl PathComponent {
    pub(super) fn project_physical(
        self,
        cx: &mut LowerCx<'_>,
        base: Option<ManagedValue>,
    ) -> ManagedValue {
        let access = self.access_kind();
        let ty = self.type_data.type_of_rvalue;
        let span = self.span;
        match self.kind {
            ComponentKind::Value {
                value, enforcement, ..
            } => {
                assert!(base.is_none(), "value component with a base");
                match enforcement {
                    Some(enforcement) if value.is_address() => {
                        cx.enter_access_scope(value, access, enforcement, span, self.type_data)
                    }
                    _ => value,
                }
            }

            ComponentKind::RefElement {
                field,
                is_non_accessing,
            } => {
                let base = expect_base(base, "ref element");
                let object = if base.is_address() {
                    cx.b.load(base.value, LoadQualifier::Borrow)
                } else {
                    base.value
                };
                let addr = ManagedValue::for_lvalue(cx.b.ref_element_addr(object, field, ty), ty);
                if is_non_accessing {
                    return addr;
                }
                match cx.dynamic_enforcement(Some(field)) {
                    Some(enforcement) => {
                        cx.enter_access_scope(addr, access, enforcement, span, self.type_data)
                    }
                    None => addr,
                }
            }

            ComponentKind::StructElement { field } => {
                let base = expect_base(base, "struct element");
                if base.is_address() {
                    ManagedValue::for_lvalue(cx.b.struct_element_addr(base.value, field, ty), ty)
                } else {
                    let value = cx.b.struct_extract(base.value, field, ty);
                    ManagedValue { value, ty, ..base }
                }
            }

            ComponentKind::TupleElement { index } => {
                let base = expect_base(base, "tuple element");
                if base.is_address() {
                    ManagedValue::for_lvalue(cx.b.tuple_element_addr(base.value, index, ty), ty)
                } else {
                    let value = cx.b.tuple_extract(base.value, index, ty);
                    ManagedValue { value, ty, ..base }
                }
            }

            ComponentKind::ForceOptionalObject { .. } => {
                let base = expect_base(base, "force unwrap");
                cx.b.precondition_has_value(base.value);
                let payload = cx.b.optional_payload(base.value, ty);
                if base.is_address() {
                    ManagedValue::for_lvalue(payload, ty)
                } else {
                    ManagedValue { value: payload, ty, ..base }
                }
            }

            ComponentKind::OpenOpaqueExistential { .. } => {
                let base = expect_base(base, "opened existential");
                match cx.program.existential_repr(base.ty.ty) {
                    ExistentialRepr::Opaque => {
                        assert!(base.is_address(), "opening an opaque existential rvalue in place");
                        let opened = cx.b.open_existential_addr(base.value, ty, !access.is_read());
                        ManagedValue::for_lvalue(opened, ty)
                    }
                    ExistentialRepr::Boxed => {
                        let boxed = if base.is_address() {
                            cx.b.load(base.value, LoadQualifier::Borrow)
                        } else {
                            base.value
                        };
                        ManagedValue::for_lvalue(cx.b.open_existential_box(boxed, ty), ty)
                    }
                    repr => unreachable!("{repr:?} existential opened as a physical component"),
                }
            }

            ComponentKind::Addressor(ref call) => {
                let (addr, owner) = call.emit_addressor(cx, base, ty);
                if let Some(owner) = owner {
                    cx.push_destroy_owner(owner, span, self.type_data);
                }
                cx.enter_access_scope(addr, access, Enforcement::Unsafe, span, self.type_data)
            }

            ComponentKind::CoroutineAccessor(ref call) => {
                let (token, yielded) = call.emit_coroutine(cx, base, ty);
                let end = PathComponent::new(
                    ComponentKind::EndApply {
                        token,
                        storage: call.storage,
                        is_super: call.is_super,
                        indices: call.indices.clone(),
                    },
                    self.type_data,
                    span,
                );
                cx.push_writeback(end, base, None);
                if yielded.is_address() {
                    yielded
                } else {
                    cx.spill(yielded, span)
                }
            }

            ComponentKind::KeyPathApplication { key_path, kind } => {
                let base = expect_base(base, "key path application");
                if access.is_read() || kind == KeyPathKind::ReadOnly {
                    assert!(access.is_read(), "{access} through a read-only key path");
                    let root = if base.is_address() {
                        let root = cx.emit_formal_temporary(base.ty.object_type(), span);
                        cx.b.copy_addr(base.value, root.value, false, true);
                        root
                    } else {
                        cx.spill(base, span)
                    };
                    let result = cx.emit_formal_temporary(ty, span);
                    cx.b.key_path_read(result.value, root.value, key_path.value);
                    result
                } else {
                    let (addr, owner) = cx.b.key_path_project(base.value, key_path.value, kind, ty);
                    cx.push_destroy_owner(
                        ManagedValue::owned(owner, ty),
                        span,
                        self.type_data,
                    );
                    ManagedValue::for_lvalue(addr, ty)
                }
            }

            ref other => unreachable!("{other:?} is not a physical component"),
        }
    }
}

fn expect_base(base: Option<ManagedValue>, what: &str) -> ManagedValue {
    match base {
        Some(base) => base,
        None => panic!("{what} component without a base"),
    }
}
