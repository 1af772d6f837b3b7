//! Storage components: how a variable, property or subscript is reached.
//!
//! The access strategy of a storage declaration decides which component
//! represents it:
//!
//! | Strategy                 | Component                               |
//! |--------------------------|-----------------------------------------|
//! | `Storage`, non-member    | `Value` (local or global address)       |
//! | `Storage`, member        | `RefElement` or `StructElement`         |
//! | `Get` / `Set`            | `GetterSetter`                          |
//! | `Address` / `MutableAddress` | `Addressor`                         |
//! | `Read` / `Modify`        | `CoroutineAccessor`                     |
//! | `MaterializeToTemporary` | `MaterializeToTemporary`                |
//!
//! Weak and unowned stored properties get an extra `Ownership` component.

use keel_ir::{
    AbstractionPattern, AccessStrategy, AccessorKind, DeclFlags, DeclId, DeclKind,
    ReferenceOwnership, Span, SubstitutionMap, TypeId,
};

use crate::{
    AccessorCall, ComponentKind, IndexArgs, LValue, LValueAccessKind, LValueOptions,
    LValueTypeData, LowerCx, MaterializeAccess, PathComponent,
};

/// Everything needed to add the component for one storage access.
#[derive(Clone, Debug)]
pub(crate) struct StorageAccess {
    pub storage: DeclId,
    pub subs: SubstitutionMap,
    pub is_super: bool,
    pub options: LValueOptions,
    pub access_kind: LValueAccessKind,
    pub strategy: AccessStrategy,
    /// Substituted type of the value being accessed.
    pub formal_type: TypeId,
    /// `None` for locals and globals.
    pub base_formal_type: Option<TypeId>,
    pub indices: Option<IndexArgs>,
    pub span: Span,
}

impl StorageAccess {
    /// Type data for components that work on the storage's own memory,
    /// in the representation its declaration implies.
    fn physical_type_data(&self, cx: &LowerCx<'_>) -> LValueTypeData {
        let program = cx.program;
        let orig = AbstractionPattern::Type(program.rvalue_type(program.storage_type(self.storage)));
        LValueTypeData::new(
            self.access_kind,
            orig,
            self.formal_type,
            program.lowered_type(orig, self.formal_type),
        )
    }

    /// Type data for components that produce the value through accessor
    /// calls, already in the substituted representation.
    fn logical_type_data(&self, cx: &LowerCx<'_>) -> LValueTypeData {
        LValueTypeData::new(
            self.access_kind,
            AbstractionPattern::Type(self.formal_type),
            self.formal_type,
            cx.program.natural_lowered_type(self.formal_type),
        )
    }

    fn accessor_call(&self, cx: &LowerCx<'_>, kind: AccessorKind, dispatch: bool) -> AccessorCall {
        let Some(accessor) = cx.program.accessor(self.storage, kind) else {
            panic!(
                "`{}` has no {kind:?} accessor",
                cx.program.decl_name(self.storage)
            );
        };
        AccessorCall {
            storage: self.storage,
            accessor,
            kind,
            dispatch,
            is_super: self.is_super,
            subs: self.subs.clone(),
            indices: self.indices.clone(),
            base_formal_type: self.base_formal_type,
        }
    }
}

impl LValue {
    /// Add the component that accesses `access.storage` with its strategy.
    pub(crate) fn add_storage_component(&mut self, cx: &mut LowerCx<'_>, access: StorageAccess) {
        tracing::trace!(
            storage = cx.program.decl_name(access.storage),
            strategy = ?access.strategy,
            "storage component"
        );
        match access.strategy {
            AccessStrategy::Storage => self.add_stored_component(cx, &access),
            AccessStrategy::DirectToAccessor(kind) => self.add_accessor_component(cx, &access, kind, false),
            AccessStrategy::DispatchToAccessor(kind) => self.add_accessor_component(cx, &access, kind, true),
            AccessStrategy::MaterializeToTemporary { read, write } => {
                let type_data = access.logical_type_data(cx);
                self.add(PathComponent::new(
                    ComponentKind::MaterializeToTemporary(MaterializeAccess {
                        storage: access.storage,
                        is_super: access.is_super,
                        subs: access.subs,
                        options: access.options,
                        read,
                        write,
                        indices: access.indices,
                        base_formal_type: access.base_formal_type,
                    }),
                    type_data,
                    access.span,
                ));
            }
        }
    }

    fn add_stored_component(&mut self, cx: &mut LowerCx<'_>, access: &StorageAccess) {
        let program = cx.program;
        let storage = access.storage;
        assert!(
            !matches!(program.decl(storage).kind, DeclKind::Subscript { .. }),
            "subscripts never have storage"
        );
        let type_data = access.physical_type_data(cx);

        match access.base_formal_type {
            Some(_) if program.decl(storage).has(DeclFlags::STATIC) => {
                // The base only names the type; restart at the global.
                self.clear();
                self.add_non_member_storage(cx, access, type_data);
            }
            None => self.add_non_member_storage(cx, access, type_data),
            Some(base_formal_type) => {
                let kind = if program.is_class_type(program.rvalue_type(base_formal_type)) {
                    ComponentKind::RefElement {
                        field: storage,
                        is_non_accessing: access
                            .options
                            .contains(LValueOptions::IS_NON_ACCESSING)
                            || program.decl(storage).has(DeclFlags::LET),
                    }
                } else {
                    ComponentKind::StructElement { field: storage }
                };
                self.add(PathComponent::new(kind, type_data, access.span));
            }
        }
        self.add_ownership(cx, storage, type_data, access.span);
    }

    fn add_non_member_storage(
        &mut self,
        cx: &mut LowerCx<'_>,
        access: &StorageAccess,
        type_data: LValueTypeData,
    ) {
        let addr = cx.var_address(access.storage);
        let enforcement = cx.storage_enforcement(access.storage, access.options);
        self.add(PathComponent::new(
            ComponentKind::Value {
                value: addr,
                enforcement,
                is_rvalue: false,
            },
            type_data,
            access.span,
        ));
    }

    fn add_ownership(
        &mut self,
        cx: &LowerCx<'_>,
        storage: DeclId,
        type_data: LValueTypeData,
        span: Span,
    ) {
        let ownership = cx.program.reference_ownership(storage);
        if ownership != ReferenceOwnership::Strong {
            self.add(PathComponent::new(
                ComponentKind::Ownership { ownership },
                type_data,
                span,
            ));
        }
    }

    fn add_accessor_component(
        &mut self,
        cx: &mut LowerCx<'_>,
        access: &StorageAccess,
        kind: AccessorKind,
        dispatch: bool,
    ) {
        let call = access.accessor_call(cx, kind, dispatch);
        let component = match kind {
            AccessorKind::Get | AccessorKind::Set => PathComponent::new(
                ComponentKind::GetterSetter(call),
                access.logical_type_data(cx),
                access.span,
            ),
            AccessorKind::Address | AccessorKind::MutableAddress => PathComponent::new(
                ComponentKind::Addressor(call),
                access.physical_type_data(cx),
                access.span,
            ),
            AccessorKind::Read | AccessorKind::Modify => PathComponent::new(
                ComponentKind::CoroutineAccessor(call),
                access.physical_type_data(cx),
                access.span,
            ),
            AccessorKind::WillSet | AccessorKind::DidSet => {
                unreachable!("observers are never an access strategy")
            }
        };
        self.add(component);
    }
}

// ── Base access ─────────────────────────────────────────────────────

/// Access a member access performs on its base when the member is stored
/// inline: a member write only partially writes the base.
pub(crate) fn base_access_kind_for_storage(access: LValueAccessKind) -> LValueAccessKind {
    if access == LValueAccessKind::Write {
        LValueAccessKind::ReadWrite
    } else {
        access
    }
}

/// Access an `access` of `storage` with `strategy` performs on its base.
pub(crate) fn base_access_kind(
    cx: &LowerCx<'_>,
    storage: DeclId,
    access: LValueAccessKind,
    strategy: AccessStrategy,
    base_formal_type: TypeId,
) -> LValueAccessKind {
    let program = cx.program;
    let base_formal_type = program.rvalue_type(base_formal_type);
    match strategy {
        AccessStrategy::Storage => {
            if program.is_class_type(base_formal_type) {
                LValueAccessKind::BorrowedObjectRead
            } else {
                base_access_kind_for_storage(access)
            }
        }
        AccessStrategy::DirectToAccessor(kind) | AccessStrategy::DispatchToAccessor(kind) => {
            let mutating = program
                .accessor(storage, kind)
                .is_some_and(|accessor| program.decl(accessor).has(DeclFlags::MUTATING));
            if mutating {
                LValueAccessKind::ReadWrite
            } else if program.is_address_only(base_formal_type) {
                LValueAccessKind::BorrowedAddressRead
            } else {
                LValueAccessKind::BorrowedObjectRead
            }
        }
        AccessStrategy::MaterializeToTemporary { read, write } => {
            let write_kind = base_access_kind(
                cx,
                storage,
                LValueAccessKind::Write,
                write.into(),
                base_formal_type,
            );
            if write_kind == LValueAccessKind::ReadWrite {
                return write_kind;
            }
            let read_kind = base_access_kind(
                cx,
                storage,
                LValueAccessKind::OwnedAddressRead,
                read.into(),
                base_formal_type,
            );
            if read_kind == write_kind {
                read_kind
            } else if !read_kind.is_read() || !write_kind.is_read() {
                LValueAccessKind::ReadWrite
            } else {
                LValueAccessKind::OwnedObjectRead
            }
        }
    }
}

/// Options for the base of a member accessed with `strategy`.
pub(crate) fn base_options(options: LValueOptions, strategy: AccessStrategy) -> LValueOptions {
    match strategy {
        AccessStrategy::Storage => options.for_projected_base(),
        _ => options.for_computed_base(),
    }
}
