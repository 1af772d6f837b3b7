//! Per-function lowering context.
//!
//! [`LowerCx`] bundles everything lvalue lowering threads through a
//! function body: the program being lowered, the IR builder, the formal
//! evaluation stack, local variable addresses, bound opaque values, and
//! the failure destinations of enclosing optional chains.

use keel_diagnostic::{Diagnose, Diagnostic};
use keel_ir::{
    DeclFlags, DeclId, DeclKind, ExistentialRepr, ExprId, ExprKind, Program, SilType, Span, TypeId,
};
use rustc_hash::FxHashMap;

use crate::formal_eval::FormalEvaluationContext;
use crate::stack::ensure_sufficient_stack;
use crate::{
    AccessIrBuilder, AccessMarker, AccessResolver, BlockId, Enforcement, LValueAccessKind,
    LValueBuilder, LValueOptions, LoweringOptions, ManagedValue, Terminator, ValueId,
};

/// Where a failed optional binding of a given depth branches to.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FailureDest {
    pub(crate) block: BlockId,
    /// Formal evaluation depth when the chain was entered; entries above
    /// it are cleaned up on the failure path.
    pub(crate) formal_depth: usize,
}

pub struct LowerCx<'a> {
    pub program: &'a Program,
    pub options: LoweringOptions,
    pub b: AccessIrBuilder,
    pub(crate) formal: FormalEvaluationContext,
    diagnostics: &'a mut dyn Diagnose,
    locals: FxHashMap<DeclId, ManagedValue>,
    opaque_values: FxHashMap<ExprId, ManagedValue>,
    failure_dests: Vec<FailureDest>,
}

impl<'a> LowerCx<'a> {
    pub fn new(
        program: &'a Program,
        options: LoweringOptions,
        diagnostics: &'a mut dyn Diagnose,
    ) -> Self {
        LowerCx {
            program,
            options,
            b: AccessIrBuilder::new(),
            formal: FormalEvaluationContext::default(),
            diagnostics,
            locals: FxHashMap::default(),
            opaque_values: FxHashMap::default(),
            failure_dests: Vec::new(),
        }
    }

    pub fn formal(&self) -> &FormalEvaluationContext {
        &self.formal
    }

    /// Finish lowering and hand back the emitted IR.
    ///
    /// # Panics
    /// Panics if a formal evaluation scope or optional chain is still open.
    pub fn finish(self) -> AccessIrBuilder {
        assert!(
            !self.formal.in_scope(),
            "function finished inside a formal evaluation scope"
        );
        assert!(
            self.failure_dests.is_empty(),
            "function finished inside an optional chain"
        );
        self.b
    }

    pub(crate) fn diagnose(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.diagnose(diagnostic);
    }

    // ── Types ───────────────────────────────────────────────────────

    pub fn lowered(&self, ty: TypeId) -> SilType {
        self.program.natural_lowered_type(ty)
    }

    fn managed_object(&self, value: ValueId, ty: SilType) -> ManagedValue {
        if self.program.is_trivial(ty.ty) {
            ManagedValue::trivial(value, ty)
        } else {
            ManagedValue::owned(value, ty)
        }
    }

    // ── Variables ───────────────────────────────────────────────────

    /// Is `decl` a variable of a function body rather than a global or a
    /// static member?
    pub fn is_local(&self, decl: DeclId) -> bool {
        let d = self.program.decl(decl);
        if matches!(d.kind, DeclKind::Param { .. }) {
            return true;
        }
        d.parent.is_some_and(|parent| {
            matches!(
                self.program.decl(parent).kind,
                DeclKind::Func { .. }
                    | DeclKind::Constructor { .. }
                    | DeclKind::Accessor { .. }
                    | DeclKind::AnonymousContext { .. }
            )
        })
    }

    /// Address of a local variable, allocated on first use.
    pub fn local_address(&mut self, decl: DeclId) -> ManagedValue {
        if let Some(&addr) = self.locals.get(&decl) {
            return addr;
        }
        let ty = self.lowered(self.program.storage_type(decl));
        let addr = ManagedValue::for_lvalue(self.b.alloc_local(decl, ty), ty);
        self.locals.insert(decl, addr);
        addr
    }

    pub fn global_address(&mut self, decl: DeclId) -> ManagedValue {
        let ty = self.lowered(self.program.storage_type(decl));
        ManagedValue::for_lvalue(self.b.global_addr(decl, ty), ty)
    }

    /// Address of a local, global or static stored variable.
    pub fn var_address(&mut self, decl: DeclId) -> ManagedValue {
        if self.is_local(decl) {
            self.local_address(decl)
        } else {
            self.global_address(decl)
        }
    }

    // ── Enforcement ─────────────────────────────────────────────────

    fn uses_unsafe_enforcement(&self, decl: Option<DeclId>) -> bool {
        decl.is_some_and(|d| self.program.decl(d).has(DeclFlags::DEBUGGER_VAR))
    }

    pub fn static_enforcement(&self, decl: Option<DeclId>) -> Option<Enforcement> {
        if self.uses_unsafe_enforcement(decl) {
            return Some(Enforcement::Unsafe);
        }
        Some(Enforcement::Static)
    }

    pub fn dynamic_enforcement(&self, decl: Option<DeclId>) -> Option<Enforcement> {
        if !self.options.enforce_exclusivity_dynamic {
            return None;
        }
        if self.uses_unsafe_enforcement(decl) {
            return Some(Enforcement::Unsafe);
        }
        Some(Enforcement::Dynamic)
    }

    pub fn unknown_enforcement(&self, decl: Option<DeclId>) -> Option<Enforcement> {
        if self.uses_unsafe_enforcement(decl) {
            return Some(Enforcement::Unsafe);
        }
        Some(Enforcement::Unknown)
    }

    /// Enforcement of a direct access to a variable's own storage.
    pub fn storage_enforcement(
        &self,
        decl: DeclId,
        options: LValueOptions,
    ) -> Option<Enforcement> {
        if self.program.decl(decl).has(DeclFlags::LET)
            || options.contains(LValueOptions::IS_NON_ACCESSING)
        {
            return None;
        }
        if matches!(self.program.decl(decl).kind, DeclKind::Param { .. }) {
            return self.static_enforcement(Some(decl));
        }
        if self.is_local(decl) {
            return self.unknown_enforcement(Some(decl));
        }
        self.dynamic_enforcement(Some(decl))
    }

    // ── Access scopes ───────────────────────────────────────────────

    /// Begin an access to `addr` and push a writeback that ends it.
    pub(crate) fn enter_access_scope(
        &mut self,
        addr: ManagedValue,
        access: LValueAccessKind,
        enforcement: Enforcement,
        span: Span,
        type_data: crate::LValueTypeData,
    ) -> ManagedValue {
        debug_assert!(addr.is_address(), "access scope on non-address {addr:?}");
        let access_addr = self.b.begin_access(addr.value, access.marker(), enforcement);
        let accessed = ManagedValue::for_lvalue(access_addr, addr.ty);
        self.push_end_access(accessed, span, type_data);
        accessed
    }

    /// Mark an access to a compiler temporary when verification wants
    /// every memory access inside a scope. The scope ends with the
    /// enclosing formal evaluation scope.
    pub(crate) fn enter_unenforced_access(
        &mut self,
        addr: ManagedValue,
        marker: AccessMarker,
        span: Span,
        type_data: crate::LValueTypeData,
    ) -> ManagedValue {
        if !self.options.verify_exclusivity {
            return addr;
        }
        let access_addr = self.b.begin_access(addr.value, marker, Enforcement::Unsafe);
        let accessed = ManagedValue::for_lvalue(access_addr, addr.ty);
        self.push_end_access(accessed, span, type_data);
        accessed
    }

    /// A formal-access temporary of type `ty`, deallocated when the
    /// enclosing formal evaluation scope ends.
    pub(crate) fn emit_formal_temporary(&mut self, ty: SilType, span: Span) -> ManagedValue {
        let addr = self.b.alloc_temp(ty);
        self.push_temporary(addr, span);
        ManagedValue::for_lvalue(addr, ty)
    }

    /// Put an object value in memory so it can be used by address.
    pub(crate) fn spill(&mut self, value: ManagedValue, span: Span) -> ManagedValue {
        if value.is_address() {
            return value;
        }
        let temp = self.emit_formal_temporary(value.ty, span);
        let value = value.ensure_plus_one(&mut self.b);
        let qualifier = if value.ownership == crate::ValueOwnership::Trivial {
            crate::StoreQualifier::Trivial
        } else {
            crate::StoreQualifier::Init
        };
        self.b.store(value.value, temp.value, qualifier);
        temp
    }

    // ── Opaque values ───────────────────────────────────────────────

    pub fn bind_opaque_value(&mut self, expr: ExprId, value: ManagedValue) {
        let previous = self.opaque_values.insert(expr, value);
        assert!(previous.is_none(), "opaque value {expr:?} bound twice");
    }

    pub fn unbind_opaque_value(&mut self, expr: ExprId) {
        self.opaque_values.remove(&expr);
    }

    pub fn opaque_value(&self, expr: ExprId) -> Option<ManagedValue> {
        self.opaque_values.get(&expr).copied()
    }

    /// Open an existential rvalue, returning a value of the opened type.
    pub(crate) fn open_existential_rvalue(
        &mut self,
        existential: ManagedValue,
        opened: TypeId,
        span: Span,
    ) -> ManagedValue {
        let opened_ty = self.lowered(opened);
        match self.program.existential_repr(existential.ty.ty) {
            ExistentialRepr::Opaque => {
                let addr = self.spill(existential, span);
                let opened = self.b.open_existential_addr(addr.value, opened_ty, false);
                ManagedValue::for_lvalue(opened, opened_ty)
            }
            ExistentialRepr::Boxed => {
                let boxed = if existential.is_address() {
                    ManagedValue::load_from(&mut self.b, existential, false, false)
                } else {
                    existential
                };
                let opened = self.b.open_existential_box(boxed.value, opened_ty);
                ManagedValue::for_lvalue(opened, opened_ty)
            }
            ExistentialRepr::Class => {
                let opened = self.b.open_existential_ref(existential.value, opened_ty);
                ManagedValue::borrowed(opened, opened_ty)
            }
            ExistentialRepr::Metatype => {
                let opened = self.b.open_existential_metatype(existential.value, opened_ty);
                ManagedValue::trivial(opened, opened_ty)
            }
        }
    }

    // ── Optional chains ─────────────────────────────────────────────

    /// Enter an optional chain; returns the block its failures reach.
    pub fn push_optional_failure_dest(&mut self) -> BlockId {
        let block = self.b.new_block();
        self.failure_dests.push(FailureDest {
            block,
            formal_depth: self.formal.depth(),
        });
        block
    }

    pub fn pop_optional_failure_dest(&mut self) -> BlockId {
        match self.failure_dests.pop() {
            Some(dest) => dest.block,
            None => panic!("no optional chain to leave"),
        }
    }

    /// Branch to the failure destination of the chain `depth` levels out
    /// when the optional at `addr` is empty; continue in a new block
    /// otherwise.
    pub(crate) fn emit_bind_optional_address(&mut self, addr: ManagedValue, depth: u32) {
        let Some(index) = self
            .failure_dests
            .len()
            .checked_sub(depth as usize + 1)
        else {
            panic!("optional binding of depth {depth} outside a deep enough optional chain");
        };
        let dest = self.failure_dests[index];

        let some = self.b.new_block();
        let none = self.b.new_block();
        self.b.terminate(Terminator::SwitchOptional {
            operand: addr.value,
            some,
            none,
        });

        self.b.position_at(none);
        self.emit_side_exit_cleanups(dest.formal_depth);
        self.b.terminate(Terminator::Branch(dest.block));

        self.b.position_at(some);
    }

    // ── Rvalues ─────────────────────────────────────────────────────

    /// Evaluate an expression as an rvalue.
    pub fn emit_rvalue(&mut self, expr: ExprId) -> ManagedValue {
        ensure_sufficient_stack(|| self.emit_rvalue_impl(expr))
    }

    fn emit_rvalue_impl(&mut self, expr: ExprId) -> ManagedValue {
        let program = self.program;
        let e = program.expr(expr);
        match &e.kind {
            ExprKind::Paren(sub) => self.emit_rvalue(*sub),
            ExprKind::IntegerLiteral(value) => {
                let ty = self.lowered(e.ty);
                ManagedValue::trivial(self.b.integer_literal(*value, ty), ty)
            }
            ExprKind::OpaqueValue => match self.opaque_value(expr) {
                Some(value) => value,
                None => panic!("opaque value {expr:?} used outside the expression binding it"),
            },
            ExprKind::Load(sub) => {
                let sub = *sub;
                self.with_formal_scope_infallible(|cx| {
                    let lv = LValueBuilder::new(cx).build(
                        sub,
                        LValueAccessKind::OwnedObjectRead,
                        LValueOptions::empty(),
                    );
                    AccessResolver::new(cx).load_value(lv)
                })
            }
            ExprKind::DeclRef { decl, .. }
                if self.is_local(*decl)
                    && matches!(
                        program.decl(*decl).kind,
                        DeclKind::Var { .. } | DeclKind::Param { .. }
                    ) =>
            {
                let addr = self.local_address(*decl);
                let trivial = program.is_trivial(addr.ty.ty);
                ManagedValue::load_from(&mut self.b, addr, trivial, false)
            }
            _ => {
                let ty = self.lowered(e.ty);
                let value = self.b.eval_expr(expr, ty);
                self.managed_object(value, ty)
            }
        }
    }

    /// Evaluate an expression only for its side effects.
    pub fn emit_ignored(&mut self, expr: ExprId) {
        let value = self.emit_rvalue(expr);
        if value.is_plus_one() {
            self.b.destroy_value(value.value);
        }
    }

    /// The +0 root for `self` and immutable bindings; `None` when the
    /// expression must be evaluated normally.
    pub(crate) fn emit_guaranteed_rvalue(&mut self, expr: ExprId) -> Option<ManagedValue> {
        let program = self.program;
        let ExprKind::DeclRef { decl, .. } = program.expr(expr).kind else {
            return None;
        };
        let d = program.decl(decl);
        let guaranteed = match d.kind {
            DeclKind::Param { .. } => d.has(DeclFlags::SELF_PARAM),
            DeclKind::Var { .. } => d.has(DeclFlags::LET),
            _ => false,
        };
        if !guaranteed || !self.is_local(decl) {
            return None;
        }
        let addr = self.local_address(decl);
        let ty = addr.ty.object_type();
        if program.is_address_only(ty.ty) {
            return Some(ManagedValue::borrowed(addr.value, addr.ty));
        }
        let value = self.b.load(addr.value, crate::LoadQualifier::Borrow);
        Some(if program.is_trivial(ty.ty) {
            ManagedValue::trivial(value, ty)
        } else {
            ManagedValue::borrowed(value, ty)
        })
    }
}
