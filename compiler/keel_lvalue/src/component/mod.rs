//! Path components: the steps of an lvalue access path.
//!
//! A component is either *physical* (it projects an address from the
//! address of its base) or *logical* (its value must be computed with a
//! `get` and written back with a `set`). A handful of pseudo components
//! exist only as writeback payloads that end a scope begun during
//! projection.
//!
//! # Architecture
//!
//! - [`PathComponent`]: type data, source span and a [`ComponentKind`]
//! - `physical.rs`: projection of physical components
//! - `logical.rs`: `get`/`set`, projection through a temporary, writeback
//! - `accessor.rs`: accessor calls shared by accessor-based components
//!
//! Components own their index arguments and substitution maps and are
//! consumed by value when projected, so each one is used at most once.
//! Writebacks that must run again clone the component first.

mod accessor;
mod logical;
mod physical;

pub(crate) use logical::{store_assign, store_init};

use std::fmt::Write as _;

use keel_ir::{
    AccessorKind, DeclId, DirectStrategy, ExprId, KeyPathKind, Program, ReferenceOwnership, Span,
    SubstitutionMap, TypeId,
};
use smallvec::SmallVec;

use crate::{
    AccessIrBuilder, Callee, Enforcement, LValueAccessKind, LValueOptions, LValueTypeData,
    LowerCx, ManagedValue, ValueId,
};

// ── Payloads ────────────────────────────────────────────────────────

/// Evaluated subscript indices, plus the expression they came from so
/// overlap diagnosis can compare them structurally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexArgs {
    pub values: SmallVec<[ManagedValue; 2]>,
    pub expr: ExprId,
}

impl IndexArgs {
    /// Do both argument lists lower to obviously the same values?
    pub fn is_obviously_equal(&self, other: &IndexArgs, b: &AccessIrBuilder) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(lhs, rhs)| b.are_obviously_same_value(lhs.value, rhs.value))
    }

    fn raw_values(&self) -> SmallVec<[ValueId; 4]> {
        self.values.iter().map(|value| value.value).collect()
    }
}

/// A call to one accessor of a storage declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessorCall {
    pub storage: DeclId,
    pub accessor: DeclId,
    pub kind: AccessorKind,
    /// Dispatched through a vtable or witness table.
    pub dispatch: bool,
    pub is_super: bool,
    pub subs: SubstitutionMap,
    pub indices: Option<IndexArgs>,
    /// Formal type of the base; `None` for non-member storage.
    pub base_formal_type: Option<TypeId>,
}

impl AccessorCall {
    pub fn callee(&self) -> Callee {
        Callee {
            accessor: self.accessor,
            kind: self.kind,
            dispatch: self.dispatch,
            is_super: self.is_super,
        }
    }
}

/// Storage read with one strategy and written back with another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterializeAccess {
    pub storage: DeclId,
    pub is_super: bool,
    pub subs: SubstitutionMap,
    pub options: LValueOptions,
    pub read: DirectStrategy,
    pub write: DirectStrategy,
    pub indices: Option<IndexArgs>,
    pub base_formal_type: Option<TypeId>,
}

/// The declaration a component accesses, for overlap diagnosis.
#[derive(Copy, Clone, Debug)]
pub struct AccessedStorage<'a> {
    pub storage: DeclId,
    pub is_super: bool,
    pub indices: Option<&'a IndexArgs>,
}

// ── Components ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    // Physical.
    /// Root of a path: an address, or an rvalue used as a base.
    Value {
        value: ManagedValue,
        enforcement: Option<Enforcement>,
        is_rvalue: bool,
    },
    /// Stored property of a class instance.
    RefElement {
        field: DeclId,
        is_non_accessing: bool,
    },
    TupleElement {
        index: u32,
    },
    /// Stored property of a struct.
    StructElement {
        field: DeclId,
    },
    ForceOptionalObject {
        is_implicit_unwrap: bool,
    },
    /// Opens an address-only or boxed existential in place.
    OpenOpaqueExistential {
        opened: TypeId,
    },
    Addressor(AccessorCall),
    CoroutineAccessor(AccessorCall),
    KeyPathApplication {
        key_path: ManagedValue,
        kind: KeyPathKind,
    },

    // Logical.
    /// Opens a class or metatype existential; writing re-wraps it.
    OpenNonOpaqueExistential {
        opened: TypeId,
    },
    GetterSetter(AccessorCall),
    MaterializeToTemporary(MaterializeAccess),
    /// Converts from the abstraction pattern `orig` to the substituted
    /// representation.
    OrigToSubst {
        orig: keel_ir::AbstractionPattern,
    },
    /// Converts from the substituted representation to the component's
    /// original abstraction pattern.
    SubstToOrig,
    /// Weak or unowned reference storage.
    Ownership {
        ownership: ReferenceOwnership,
    },

    // Pseudo components, only ever pushed as writebacks.
    EndAccess,
    EndApply {
        token: ValueId,
        storage: DeclId,
        is_super: bool,
        indices: Option<IndexArgs>,
    },
    DestroyOwner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathComponent {
    pub type_data: LValueTypeData,
    pub span: Span,
    pub kind: ComponentKind,
}

impl PathComponent {
    pub fn new(kind: ComponentKind, type_data: LValueTypeData, span: Span) -> Self {
        PathComponent {
            type_data,
            span,
            kind,
        }
    }

    #[inline]
    pub fn access_kind(&self) -> LValueAccessKind {
        self.type_data.access_kind
    }

    pub fn is_physical(&self) -> bool {
        matches!(
            self.kind,
            ComponentKind::Value { .. }
                | ComponentKind::RefElement { .. }
                | ComponentKind::TupleElement { .. }
                | ComponentKind::StructElement { .. }
                | ComponentKind::ForceOptionalObject { .. }
                | ComponentKind::OpenOpaqueExistential { .. }
                | ComponentKind::Addressor(_)
                | ComponentKind::CoroutineAccessor(_)
                | ComponentKind::KeyPathApplication { .. }
        )
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(
            self.kind,
            ComponentKind::EndAccess | ComponentKind::EndApply { .. } | ComponentKind::DestroyOwner
        )
    }

    pub fn is_logical(&self) -> bool {
        !self.is_physical() && !self.is_pseudo()
    }

    /// A root holding an rvalue rather than the address of storage.
    pub fn is_rvalue(&self) -> bool {
        matches!(self.kind, ComponentKind::Value { is_rvalue: true, .. })
    }

    pub fn is_translation(&self) -> bool {
        matches!(
            self.kind,
            ComponentKind::OrigToSubst { .. } | ComponentKind::SubstToOrig
        )
    }

    pub fn opens_existential(&self) -> bool {
        matches!(
            self.kind,
            ComponentKind::OpenOpaqueExistential { .. }
                | ComponentKind::OpenNonOpaqueExistential { .. }
        )
    }

    /// Do both components have the same variant?
    pub fn same_kind(&self, other: &PathComponent) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }

    pub fn accessed_storage(&self) -> Option<AccessedStorage<'_>> {
        match &self.kind {
            ComponentKind::GetterSetter(call) => Some(AccessedStorage {
                storage: call.storage,
                is_super: call.is_super,
                indices: call.indices.as_ref(),
            }),
            ComponentKind::MaterializeToTemporary(access) => Some(AccessedStorage {
                storage: access.storage,
                is_super: access.is_super,
                indices: access.indices.as_ref(),
            }),
            ComponentKind::EndApply {
                storage,
                is_super,
                indices,
                ..
            } => Some(AccessedStorage {
                storage: *storage,
                is_super: *is_super,
                indices: indices.as_ref(),
            }),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self.kind {
            ComponentKind::Value { .. } => "Value",
            ComponentKind::RefElement { .. } => "RefElement",
            ComponentKind::TupleElement { .. } => "TupleElement",
            ComponentKind::StructElement { .. } => "StructElement",
            ComponentKind::ForceOptionalObject { .. } => "ForceOptionalObject",
            ComponentKind::OpenOpaqueExistential { .. } => "OpenOpaqueExistential",
            ComponentKind::Addressor(_) => "Addressor",
            ComponentKind::CoroutineAccessor(_) => "CoroutineAccessor",
            ComponentKind::KeyPathApplication { .. } => "KeyPathApplication",
            ComponentKind::OpenNonOpaqueExistential { .. } => "OpenNonOpaqueExistential",
            ComponentKind::GetterSetter(_) => "GetterSetter",
            ComponentKind::MaterializeToTemporary(_) => "MaterializeToTemporary",
            ComponentKind::OrigToSubst { .. } => "OrigToSubst",
            ComponentKind::SubstToOrig => "SubstToOrig",
            ComponentKind::Ownership { .. } => "Ownership",
            ComponentKind::EndAccess => "EndAccess",
            ComponentKind::EndApply { .. } => "EndApply",
            ComponentKind::DestroyOwner => "DestroyOwner",
        }
    }

    /// Project the component from its base, consuming it.
    ///
    /// Physical components produce an address; logical ones produce their
    /// value for reads and a writeback temporary otherwise.
    pub(crate) fn project(self, cx: &mut LowerCx<'_>, base: Option<ManagedValue>) -> ManagedValue {
        tracing::trace!(
            component = self.describe(),
            access = %self.access_kind(),
            "project"
        );
        if self.is_physical() {
            self.project_physical(cx, base)
        } else if self.is_logical() {
            self.project_logical(cx, base)
        } else {
            unreachable!("{} is only ever pushed as a writeback", self.describe())
        }
    }

    /// One line describing the component, indented by `indent` spaces.
    pub fn dump(&self, program: &Program, indent: usize) -> String {
        let mut out = format!("{:indent$}{}", "", self.describe());
        let storage_name = |storage: DeclId| program.decl_name(storage);
        // Writing to a String cannot fail.
        let _ = match &self.kind {
            ComponentKind::Value {
                value,
                enforcement,
                is_rvalue,
            } => {
                let enforcement =
                    enforcement.map_or_else(|| "unenforced".to_string(), |e| e.to_string());
                let rvalue = if *is_rvalue { "rvalue, " } else { "" };
                write!(out, "({rvalue}{enforcement}) {:?}", value.value)
            }
            ComponentKind::RefElement { field, .. } | ComponentKind::StructElement { field } => {
                write!(out, "({})", storage_name(*field))
            }
            ComponentKind::TupleElement { index } => write!(out, "({index})"),
            ComponentKind::Addressor(call)
            | ComponentKind::CoroutineAccessor(call)
            | ComponentKind::GetterSetter(call) => {
                write!(out, "({}, {:?})", storage_name(call.storage), call.kind).map(|()| {
                    if call.indices.is_some() {
                        out.push_str(" subscript");
                    }
                })
            }
            ComponentKind::MaterializeToTemporary(access) => {
                write!(out, "({})", storage_name(access.storage))
            }
            ComponentKind::Ownership { ownership } => write!(out, "({ownership:?})"),
            ComponentKind::KeyPathApplication { kind, .. } => write!(out, "({kind:?})"),
            _ => Ok(()),
        };
        let _ = write!(out, " : {}", self.type_data.access_kind);
        out
    }
}
