//! Formal evaluation: the stack of accesses that end when a statement ends.
//!
//! Projecting an lvalue can start things that must be finished later: an
//! access scope to end, a coroutine to resume, a temporary to write back
//! through a setter, an owner to release. Each of these is pushed onto the
//! [`FormalEvaluationContext`] as a [`FormalAccess`] and addressed by a
//! stable [`FormalAccessId`] while it is live.
//!
//! # Lifecycle
//!
//! ```text
//! Pushed ──activate──▶ Active ──pop_formal_scope──▶ Finalized
//!    │                    │
//!    └────────────────────┴──unwind_formal_scope──▶ Unwound
//! ```
//!
//! Scopes pop last-in first-out. On a normal exit every live entry runs its
//! final action exactly once, newest first; on an unwinding exit every live
//! entry runs its non-final action exactly once, newest first, in a cleanup
//! block chained toward the function's unwind exit. Optional-chain failure
//! paths run non-final copies of the pending actions without consuming
//! them.

use keel_ir::Span;

use crate::component::PathComponent;
use crate::conflict::diagnose_conflict;
use crate::{ComponentKind, LValueTypeData, LowerCx, ManagedValue, Terminator, ValueId};

// ── Entries ─────────────────────────────────────────────────────────

/// Handle to a live formal access.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormalAccessId(u32);

impl FormalAccessId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FormalAccessState {
    /// Pushed by the lvalue operation still in progress.
    Pushed,
    /// The operation that pushed it has finished.
    Active,
    Finalized,
    Unwound,
}

impl FormalAccessState {
    pub fn is_live(self) -> bool {
        matches!(self, FormalAccessState::Pushed | FormalAccessState::Active)
    }
}

#[derive(Clone, Debug)]
pub enum FormalAction {
    /// Run `component`'s writeback against `base`.
    Writeback {
        component: PathComponent,
        base: Option<ManagedValue>,
        /// Temporary holding the value to write back, for logical
        /// components.
        materialized: Option<ManagedValue>,
    },
    /// Release a formal temporary.
    DeallocTemp(ValueId),
}

#[derive(Clone, Debug)]
pub struct FormalAccess {
    pub span: Span,
    pub state: FormalAccessState,
    pub action: FormalAction,
}

impl FormalAccess {
    pub fn writeback(&self) -> Option<(&PathComponent, Option<ManagedValue>)> {
        match &self.action {
            FormalAction::Writeback {
                component, base, ..
            } => Some((component, *base)),
            FormalAction::DeallocTemp(_) => None,
        }
    }
}

/// An open formal evaluation scope, closed by
/// [`LowerCx::pop_formal_scope`] or [`LowerCx::unwind_formal_scope`].
#[must_use = "formal scopes must be popped or unwound"]
#[derive(Debug, PartialEq, Eq)]
pub struct FormalScope {
    start: usize,
    depth: usize,
}

/// An unwinding exit in progress.
///
/// Each scope unwound appends a cleanup block; `landing` is the first one,
/// entered from the point that started unwinding, and `tail` the last,
/// which leaves the function.
#[derive(Debug, Default, thiserror::Error)]
#[error("formal evaluation exited by unwinding")]
pub struct Unwind {
    landing: Option<crate::BlockId>,
    tail: Option<crate::BlockId>,
}

impl Unwind {
    pub fn new() -> Self {
        Self::default()
    }

    /// First cleanup block, once any scope has been unwound.
    pub fn landing_block(&self) -> Option<crate::BlockId> {
        self.landing
    }
}

// ── Context ─────────────────────────────────────────────────────────

#[derive(Default, Debug)]
pub struct FormalEvaluationContext {
    accesses: Vec<FormalAccess>,
    /// Start index of each open scope.
    scopes: Vec<usize>,
}

impl FormalEvaluationContext {
    /// Number of entries, live or not, below the current top.
    pub fn depth(&self) -> usize {
        self.accesses.len()
    }

    pub fn in_scope(&self) -> bool {
        !self.scopes.is_empty()
    }

    pub fn get(&self, id: FormalAccessId) -> &FormalAccess {
        &self.accesses[id.index()]
    }

    pub fn entries(&self) -> &[FormalAccess] {
        &self.accesses
    }

    /// Live entries from `start` up, newest first.
    fn live_from(&self, start: usize) -> Vec<usize> {
        (start..self.accesses.len())
            .rev()
            .filter(|&index| self.accesses[index].state.is_live())
            .collect()
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "formal access counts never exceed u32"
    )]
    fn push(&mut self, span: Span, action: FormalAction) -> FormalAccessId {
        assert!(self.in_scope(), "formal access pushed outside a formal evaluation scope");
        let id = FormalAccessId(self.accesses.len() as u32);
        self.accesses.push(FormalAccess {
            span,
            state: FormalAccessState::Pushed,
            action,
        });
        id
    }

    /// Mark everything pushed by the finished operation active.
    pub fn activate_pending(&mut self) {
        for access in &mut self.accesses {
            if access.state == FormalAccessState::Pushed {
                access.state = FormalAccessState::Active;
            }
        }
    }

    fn set_state(&mut self, index: usize, state: FormalAccessState) {
        self.accesses[index].state = state;
    }
}

// ── Scope operations ────────────────────────────────────────────────

impl LowerCx<'_> {
    pub fn enter_formal_scope(&mut self) -> FormalScope {
        let start = self.formal.accesses.len();
        self.formal.scopes.push(start);
        FormalScope {
            start,
            depth: self.formal.scopes.len(),
        }
    }

    fn check_innermost(&self, scope: &FormalScope) {
        assert_eq!(
            self.formal.scopes.len(),
            scope.depth,
            "formal scopes closed out of order"
        );
    }

    /// Close a scope on the normal path: report overlapping writebacks,
    /// then run every live entry's final action, newest first.
    pub fn pop_formal_scope(&mut self, scope: FormalScope) {
        self.check_innermost(&scope);
        self.diagnose_overlapping_writebacks(scope.start);

        for index in self.formal.live_from(scope.start) {
            let access = self.formal.accesses[index].clone();
            tracing::debug!(index, span = ?access.span, "finalizing formal access");
            self.perform(access.action, true);
            self.formal.set_state(index, FormalAccessState::Finalized);
        }
        self.formal.scopes.pop();
        self.formal.accesses.truncate(scope.start);
    }

    /// Close a scope on an unwinding path.
    ///
    /// The non-final actions run in a new cleanup block, chained after the
    /// cleanup block of the scope unwound before this one (or entered from
    /// the current block if this is the first). The builder is left
    /// positioned in the new, terminated, block.
    pub fn unwind_formal_scope(&mut self, scope: FormalScope, unwind: &mut Unwind) {
        self.check_innermost(&scope);
        let cleanup = self.b.new_block();
        match unwind.tail {
            Some(tail) => self.b.retarget(tail, Terminator::Branch(cleanup)),
            None => {
                if !self.b.is_terminated() {
                    self.b.terminate(Terminator::Branch(cleanup));
                }
                unwind.landing = Some(cleanup);
            }
        }
        self.b.position_at(cleanup);

        for index in self.formal.live_from(scope.start) {
            let access = self.formal.accesses[index].clone();
            tracing::debug!(index, span = ?access.span, "unwinding formal access");
            self.perform(access.action, false);
            self.formal.set_state(index, FormalAccessState::Unwound);
        }
        self.b.terminate(Terminator::Unwind);
        unwind.tail = Some(cleanup);

        self.formal.scopes.pop();
        self.formal.accesses.truncate(scope.start);
    }

    /// Run `f` in a fresh formal scope, popping or unwinding it according
    /// to how `f` exits.
    pub fn with_formal_scope<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Unwind>,
    ) -> Result<T, Unwind> {
        let scope = self.enter_formal_scope();
        match f(self) {
            Ok(value) => {
                self.pop_formal_scope(scope);
                Ok(value)
            }
            Err(mut unwind) => {
                self.unwind_formal_scope(scope, &mut unwind);
                Err(unwind)
            }
        }
    }

    pub(crate) fn with_formal_scope_infallible<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let scope = self.enter_formal_scope();
        let value = f(self);
        self.pop_formal_scope(scope);
        value
    }

    /// Emit non-final copies of every live action above `depth`, newest
    /// first, without consuming them.
    pub(crate) fn emit_side_exit_cleanups(&mut self, depth: usize) {
        for index in self.formal.live_from(depth) {
            let action = self.formal.accesses[index].action.clone();
            self.perform(action, false);
        }
    }

    fn perform(&mut self, action: FormalAction, is_final: bool) {
        match action {
            FormalAction::Writeback {
                component,
                base,
                materialized,
            } => component.writeback(self, base, materialized, is_final),
            FormalAction::DeallocTemp(addr) => self.b.dealloc_temp(addr),
        }
    }

    fn diagnose_overlapping_writebacks(&mut self, start: usize) {
        let live: Vec<usize> = (start..self.formal.accesses.len())
            .filter(|&index| self.formal.accesses[index].state.is_live())
            .collect();
        let mut found = Vec::new();
        for (position, &later) in live.iter().enumerate() {
            for &earlier in &live[..position] {
                let diagnostic = diagnose_conflict(
                    self.program,
                    &self.b,
                    &self.formal.accesses[later],
                    &self.formal.accesses[earlier],
                );
                found.extend(diagnostic);
            }
        }
        for diagnostic in found {
            tracing::warn!(code = %diagnostic.code, "overlapping writebacks");
            self.diagnose(diagnostic);
        }
    }

    // ── Pushing ─────────────────────────────────────────────────────

    pub(crate) fn push_writeback(
        &mut self,
        component: PathComponent,
        base: Option<ManagedValue>,
        materialized: Option<ManagedValue>,
    ) -> FormalAccessId {
        tracing::debug!(component = component.describe(), "pushing writeback");
        let span = component.span;
        self.formal.push(
            span,
            FormalAction::Writeback {
                component,
                base,
                materialized,
            },
        )
    }

    pub(crate) fn push_end_access(
        &mut self,
        access: ManagedValue,
        span: Span,
        type_data: LValueTypeData,
    ) -> FormalAccessId {
        let end = PathComponent::new(ComponentKind::EndAccess, type_data, span);
        self.push_writeback(end, Some(access), None)
    }

    pub(crate) fn push_destroy_owner(
        &mut self,
        owner: ManagedValue,
        span: Span,
        type_data: LValueTypeData,
    ) -> FormalAccessId {
        let destroy = PathComponent::new(ComponentKind::DestroyOwner, type_data, span);
        self.push_writeback(destroy, Some(owner), None)
    }

    pub(crate) fn push_temporary(&mut self, addr: ValueId, span: Span) -> FormalAccessId {
        self.formal.push(span, FormalAction::DeallocTemp(addr))
    }
}
