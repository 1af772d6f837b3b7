//! The entity graph of one compilation.
//!
//! # Architecture
//!
//! [`Program`] owns every declaration, type, conformance and expression of
//! the compilation in flat arenas. It is built mutably by the front end (or
//! by tests through the `add_*` builder methods) and then shared immutably
//! with linkage computation and lvalue lowering, which only ever read it.
//!
//! Structural queries (module of a declaration, accessor lookup, access
//! strategy classification) live here so that consumers never walk parent
//! links themselves.

use smallvec::SmallVec;

use crate::{
    classify_access, AccessKind, AccessLevel, AccessSemantics, AccessStrategy, AccessorKind,
    AddressorKind, Conformance, ConformanceId, ConformanceKind, Decl, DeclFlags, DeclId, DeclKind,
    Expr, ExprId, ExprKind, FormalLinkage, Name, ReferenceOwnership, Span, StorageImpl,
    StringInterner, TupleElement, TypeId, TypeKind, TypeTable,
};

pub struct Program {
    interner: StringInterner,
    decls: Vec<Decl>,
    types: TypeTable,
    conformances: Vec<Conformance>,
    exprs: Vec<Expr>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            interner: StringInterner::new(),
            decls: Vec::new(),
            types: TypeTable::new(),
            conformances: Vec::new(),
            exprs: Vec::new(),
        }
    }

    // ── Names ───────────────────────────────────────────────────────

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    pub fn intern(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    pub fn name_str(&self, name: Name) -> &'static str {
        self.interner.lookup(name)
    }

    // ── Declarations ────────────────────────────────────────────────

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn decl_name(&self, id: DeclId) -> &'static str {
        self.name_str(self.decl(id).name)
    }

    /// Add a fully-formed declaration.
    pub fn push_decl(&mut self, decl: Decl) -> DeclId {
        let id = DeclId::from_len(self.decls.len());
        self.decls.push(decl);
        id
    }

    /// Declare `name` under `parent` with linkage derived from `access`.
    pub fn declare(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        kind: DeclKind,
        access: AccessLevel,
    ) -> DeclId {
        let name = self.intern(name);
        self.push_decl(Decl {
            name,
            kind,
            parent,
            access,
            formal_linkage: FormalLinkage::from_access(access),
            flags: DeclFlags::empty(),
            span: Span::DUMMY,
            objc_name: None,
            accessors: SmallVec::new(),
        })
    }

    pub fn add_module(&mut self, name: &str) -> DeclId {
        self.declare(None, name, DeclKind::Module, AccessLevel::Public)
    }

    pub fn add_flags(&mut self, decl: DeclId, flags: DeclFlags) {
        self.decl_mut(decl).flags.insert(flags);
    }

    pub fn set_formal_linkage(&mut self, decl: DeclId, linkage: FormalLinkage) {
        self.decl_mut(decl).formal_linkage = linkage;
    }

    /// Add a stored or computed var member (or global, under a module).
    pub fn add_var(
        &mut self,
        parent: DeclId,
        name: &str,
        ty: TypeId,
        storage: StorageImpl,
        access: AccessLevel,
    ) -> DeclId {
        let var = self.declare(
            Some(parent),
            name,
            DeclKind::Var {
                ty,
                storage,
                ownership: ReferenceOwnership::Strong,
            },
            access,
        );
        if !storage.supports_mutation() {
            self.add_flags(var, DeclFlags::LET);
        }
        var
    }

    pub fn add_subscript(
        &mut self,
        parent: DeclId,
        index_ty: TypeId,
        element_ty: TypeId,
        storage: StorageImpl,
        access: AccessLevel,
    ) -> DeclId {
        self.declare(
            Some(parent),
            "subscript",
            DeclKind::Subscript {
                index_ty,
                element_ty,
                storage,
            },
            access,
        )
    }

    pub fn add_param(&mut self, parent: DeclId, name: &str, ty: TypeId) -> DeclId {
        let param = self.declare(
            Some(parent),
            name,
            DeclKind::Param { ty },
            AccessLevel::Private,
        );
        if name == "self" {
            self.add_flags(param, DeclFlags::SELF_PARAM | DeclFlags::IMPLICIT);
        }
        param
    }

    /// Add an accessor of `kind` to a var or subscript.
    ///
    /// The accessor inherits the storage's parent and access level; its
    /// function type is synthesized from the storage's types.
    pub fn add_accessor(&mut self, storage: DeclId, kind: AccessorKind) -> DeclId {
        self.add_accessor_impl(storage, kind, None)
    }

    /// Add an `Address`/`MutableAddress` accessor with the given ownership.
    pub fn add_addressor(
        &mut self,
        storage: DeclId,
        kind: AccessorKind,
        addressor: AddressorKind,
    ) -> DeclId {
        assert!(kind.is_addressor(), "{kind:?} is not an addressor kind");
        self.add_accessor_impl(storage, kind, Some(addressor))
    }

    fn add_accessor_impl(
        &mut self,
        storage: DeclId,
        kind: AccessorKind,
        addressor: Option<AddressorKind>,
    ) -> DeclId {
        let (index, element) = match self.decl(storage).kind {
            DeclKind::Var { ty, .. } => (None, ty),
            DeclKind::Subscript {
                index_ty,
                element_ty,
                ..
            } => (Some(index_ty), element_ty),
            ref other => panic!("accessor on non-storage {}", other.describe()),
        };
        let unit = self.tuple(Vec::new());
        let raw_pointer = self.builtin("RawPointer");
        let indices: Vec<TypeId> = index.into_iter().collect();
        let ty = match kind {
            AccessorKind::Get => self.function(indices, element),
            AccessorKind::Set | AccessorKind::WillSet | AccessorKind::DidSet => {
                let mut params = vec![element];
                params.extend(indices);
                self.function(params, unit)
            }
            AccessorKind::Read | AccessorKind::Modify => self.mk(TypeKind::LoweredFunction {
                params: indices,
                yields: vec![element],
                results: Vec::new(),
            }),
            AccessorKind::Address | AccessorKind::MutableAddress => match addressor {
                Some(AddressorKind::Owning | AddressorKind::NativeOwning) => {
                    let owner = self.builtin("NativeObject");
                    let result = self.tuple(vec![
                        TupleElement {
                            label: None,
                            ty: raw_pointer,
                        },
                        TupleElement {
                            label: None,
                            ty: owner,
                        },
                    ]);
                    self.function(indices, result)
                }
                _ => self.function(indices, raw_pointer),
            },
        };

        let decl = self.decl(storage);
        let parent = decl.parent;
        let access = decl.access;
        let name = self.name_str(decl.name);
        let accessor = self.declare(
            parent,
            name,
            DeclKind::Accessor {
                storage,
                kind,
                addressor,
                ty,
            },
            access,
        );
        let in_class = self
            .enclosing_nominal(storage)
            .is_some_and(|nominal| self.decl(nominal).is_class());
        let mutating = match kind {
            _ if in_class => DeclFlags::empty(),
            AccessorKind::Set
            | AccessorKind::Modify
            | AccessorKind::MutableAddress
            | AccessorKind::WillSet
            | AccessorKind::DidSet => DeclFlags::MUTATING,
            AccessorKind::Get | AccessorKind::Read | AccessorKind::Address => DeclFlags::empty(),
        };
        let inherited = self.decl(storage).flags & (DeclFlags::STATIC | DeclFlags::DYNAMIC_DISPATCH);
        self.add_flags(accessor, mutating | inherited);
        self.decl_mut(storage).accessors.push(accessor);
        accessor
    }

    // ── Types ───────────────────────────────────────────────────────

    pub fn mk(&mut self, kind: TypeKind) -> TypeId {
        self.types.intern(kind)
    }

    pub fn type_kind(&self, ty: TypeId) -> &TypeKind {
        self.types.kind(ty)
    }

    pub fn builtin(&mut self, name: &str) -> TypeId {
        let name = self.intern(name);
        self.mk(TypeKind::Builtin(name))
    }

    pub fn nominal_type(&mut self, decl: DeclId) -> TypeId {
        self.mk(TypeKind::Nominal {
            decl,
            args: Vec::new(),
        })
    }

    pub fn tuple(&mut self, elements: Vec<TupleElement>) -> TypeId {
        self.mk(TypeKind::Tuple(elements))
    }

    pub fn function(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.mk(TypeKind::Function { params, result })
    }

    pub fn optional(&mut self, ty: TypeId) -> TypeId {
        self.mk(TypeKind::Optional(ty))
    }

    pub fn lvalue(&mut self, ty: TypeId) -> TypeId {
        self.mk(TypeKind::LValue(ty))
    }

    pub fn inout(&mut self, ty: TypeId) -> TypeId {
        self.mk(TypeKind::InOut(ty))
    }

    pub fn metatype(&mut self, ty: TypeId) -> TypeId {
        self.mk(TypeKind::Metatype(ty))
    }

    pub fn existential(&mut self, protocols: Vec<DeclId>) -> TypeId {
        self.mk(TypeKind::Existential(protocols))
    }

    /// Strip an outer lvalue or inout wrapper.
    pub fn rvalue_type(&self, ty: TypeId) -> TypeId {
        match *self.type_kind(ty) {
            TypeKind::LValue(object) | TypeKind::InOut(object) => object,
            _ => ty,
        }
    }

    pub fn is_lvalue_or_inout(&self, ty: TypeId) -> bool {
        matches!(self.type_kind(ty), TypeKind::LValue(_) | TypeKind::InOut(_))
    }

    pub fn optional_object_type(&self, ty: TypeId) -> Option<TypeId> {
        match *self.type_kind(self.rvalue_type(ty)) {
            TypeKind::Optional(object) => Some(object),
            _ => None,
        }
    }

    pub fn nominal_decl_of_type(&self, ty: TypeId) -> Option<DeclId> {
        match *self.type_kind(ty) {
            TypeKind::Nominal { decl, .. } => Some(decl),
            _ => None,
        }
    }

    pub fn tuple_element_type(&self, ty: TypeId, index: u32) -> TypeId {
        match self.type_kind(self.rvalue_type(ty)) {
            TypeKind::Tuple(elements) => match elements.get(index as usize) {
                Some(element) => element.ty,
                None => panic!("tuple element {index} out of range"),
            },
            other => panic!("tuple element of non-tuple type {other:?}"),
        }
    }

    /// True for class types and class-bound archetypes.
    pub fn is_class_type(&self, ty: TypeId) -> bool {
        match *self.type_kind(ty) {
            TypeKind::Nominal { decl, .. } => self.decl(decl).is_class(),
            TypeKind::OpenedArchetype { existential, .. } => self.is_class_existential(existential),
            _ => false,
        }
    }

    pub fn is_class_existential(&self, ty: TypeId) -> bool {
        match self.type_kind(ty) {
            TypeKind::Existential(protocols) => protocols
                .iter()
                .any(|&p| self.decl(p).has(DeclFlags::CLASS_BOUND)),
            _ => false,
        }
    }

    // ── Conformances ────────────────────────────────────────────────

    pub fn add_conformance(&mut self, conformance: Conformance) -> ConformanceId {
        let id = ConformanceId::from_len(self.conformances.len());
        self.conformances.push(conformance);
        id
    }

    pub fn conformance(&self, id: ConformanceId) -> &Conformance {
        &self.conformances[id.index()]
    }

    /// The normal conformance a specialized or inherited one derives from.
    pub fn root_conformance(&self, mut id: ConformanceId) -> ConformanceId {
        loop {
            match self.conformance(id).kind {
                ConformanceKind::Normal => return id,
                ConformanceKind::Specialized { generic, .. } => id = generic,
                ConformanceKind::Inherited { inherited } => id = inherited,
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub fn add_expr(&mut self, kind: ExprKind, ty: TypeId, span: Span) -> ExprId {
        let id = ExprId::from_len(self.exprs.len());
        self.exprs.push(Expr {
            kind,
            ty,
            span,
            implicit: false,
        });
        id
    }

    pub fn add_implicit_expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        let id = self.add_expr(kind, ty, Span::DUMMY);
        self.exprs[id.index()].implicit = true;
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    // ── Structural queries ──────────────────────────────────────────

    /// The module a declaration ultimately belongs to.
    pub fn module_of(&self, mut decl: DeclId) -> DeclId {
        loop {
            let d = self.decl(decl);
            match d.parent {
                Some(parent) => decl = parent,
                None => {
                    assert!(
                        matches!(d.kind, DeclKind::Module),
                        "declaration tree is not rooted at a module"
                    );
                    return decl;
                }
            }
        }
    }

    pub fn is_foreign_module(&self, module: DeclId) -> bool {
        self.decl(module).has(DeclFlags::FOREIGN)
    }

    /// Nominal type a context declares or extends.
    pub fn context_nominal(&self, context: DeclId) -> Option<DeclId> {
        let d = self.decl(context);
        match d.kind {
            DeclKind::Extension { extended } => Some(extended),
            _ if d.is_nominal() => Some(context),
            _ => None,
        }
    }

    /// Nominal type whose body (or extension) contains `member`.
    pub fn enclosing_nominal(&self, member: DeclId) -> Option<DeclId> {
        self.decl(member)
            .parent
            .and_then(|parent| self.context_nominal(parent))
    }

    /// Protocol declaring `member` as a requirement, if any.
    pub fn requirement_protocol(&self, member: DeclId) -> Option<DeclId> {
        let parent = self.decl(member).parent?;
        self.decl(parent).is_protocol().then_some(parent)
    }

    pub fn accessor(&self, storage: DeclId, kind: AccessorKind) -> Option<DeclId> {
        self.decl(storage).accessors.iter().copied().find(|&a| {
            matches!(self.decl(a).kind, DeclKind::Accessor { kind: k, .. } if k == kind)
        })
    }

    /// Declared type of a var's value or a subscript's element.
    pub fn storage_type(&self, storage: DeclId) -> TypeId {
        match self.decl(storage).kind {
            DeclKind::Var { ty, .. } | DeclKind::Param { ty } => ty,
            DeclKind::Subscript { element_ty, .. } => element_ty,
            ref other => panic!("storage type of {}", other.describe()),
        }
    }

    pub fn reference_ownership(&self, storage: DeclId) -> ReferenceOwnership {
        match self.decl(storage).kind {
            DeclKind::Var { ownership, .. } => ownership,
            _ => ReferenceOwnership::Strong,
        }
    }

    /// How to perform an `access` of `storage` under `semantics`.
    pub fn access_strategy(
        &self,
        storage: DeclId,
        semantics: AccessSemantics,
        access: AccessKind,
    ) -> AccessStrategy {
        let decl = self.decl(storage);
        let Some(imp) = decl.storage_impl() else {
            panic!("access strategy of non-storage {}", decl.kind.describe());
        };
        let dispatch =
            decl.has(DeclFlags::DYNAMIC_DISPATCH) || self.requirement_protocol(storage).is_some();
        classify_access(imp, semantics, access, dispatch)
    }

    /// Is `storage` a non-static member of a nominal type?
    pub fn is_instance_member(&self, storage: DeclId) -> bool {
        self.enclosing_nominal(storage).is_some() && !self.decl(storage).has(DeclFlags::STATIC)
    }

    pub fn is_stored(&self, storage: DeclId) -> bool {
        self.decl(storage)
            .storage_impl()
            .is_some_and(StorageImpl::has_storage)
    }

    /// Stored instance properties of a nominal, in declaration order.
    pub fn stored_fields(&self, nominal: DeclId) -> impl Iterator<Item = DeclId> + '_ {
        self.decls.iter().enumerate().filter_map(move |(index, decl)| {
            let id = DeclId::from_len(index);
            let is_field = decl.parent == Some(nominal)
                && matches!(decl.kind, DeclKind::Var { .. })
                && !decl.has(DeclFlags::STATIC)
                && self.is_stored(id);
            is_field.then_some(id)
        })
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
