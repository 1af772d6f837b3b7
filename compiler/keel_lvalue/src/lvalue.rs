//! The access path of one lvalue.

use std::fmt::Write as _;

use keel_ir::{AbstractionPattern, Program, Span, TypeId};

use crate::{ComponentKind, LValueAccessKind, LValueTypeData, ManagedValue, PathComponent};

/// Ordered path components, root first.
///
/// An `LValue` is built by [`LValueBuilder`](crate::LValueBuilder) and
/// consumed exactly once by an [`AccessResolver`](crate::AccessResolver)
/// operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LValue {
    path: Vec<PathComponent>,
}

impl LValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A path rooted at an already-evaluated value: an rvalue if `value` is
    /// an object, otherwise the address of storage accessed elsewhere.
    pub fn for_value(
        program: &Program,
        access: LValueAccessKind,
        value: ManagedValue,
        formal_type: TypeId,
    ) -> Self {
        let formal_type = program.rvalue_type(formal_type);
        let type_data = LValueTypeData::new(
            access,
            AbstractionPattern::Type(formal_type),
            formal_type,
            value.ty,
        );
        let mut lv = LValue::new();
        lv.add(PathComponent::new(
            ComponentKind::Value {
                value,
                enforcement: None,
                is_rvalue: !value.is_address(),
            },
            type_data,
            Span::DUMMY,
        ));
        lv
    }

    pub fn add(&mut self, component: PathComponent) {
        debug_assert!(!component.is_pseudo(), "{} added to a path", component.describe());
        self.path.push(component);
    }

    /// Drop every component, for paths whose base turns out not to matter.
    pub fn clear(&mut self) {
        self.path.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.path
    }

    pub fn last(&self) -> Option<&PathComponent> {
        self.path.last()
    }

    pub(crate) fn pop(&mut self) -> Option<PathComponent> {
        self.path.pop()
    }

    pub(crate) fn into_components(self) -> Vec<PathComponent> {
        self.path
    }

    fn expect_last(&self) -> &PathComponent {
        match self.path.last() {
            Some(last) => last,
            None => panic!("empty access path"),
        }
    }

    /// Type data of the value the whole path produces.
    pub fn type_data(&self) -> LValueTypeData {
        self.expect_last().type_data
    }

    pub fn access_kind(&self) -> LValueAccessKind {
        self.type_data().access_kind
    }

    pub fn type_of_rvalue(&self) -> keel_ir::SilType {
        self.type_data().type_of_rvalue
    }

    pub fn subst_formal_type(&self) -> TypeId {
        self.type_data().subst_formal_type
    }

    /// Is every component physical, so the path denotes memory?
    pub fn is_physical(&self) -> bool {
        self.path.iter().all(PathComponent::is_physical)
    }

    pub fn opens_existential(&self) -> bool {
        self.path.iter().any(PathComponent::opens_existential)
    }

    // ── Reabstraction ───────────────────────────────────────────────

    /// Convert from `orig`'s representation to the substituted one,
    /// cancelling a trailing [`ComponentKind::SubstToOrig`] instead when it
    /// would round-trip.
    pub fn add_orig_to_subst(&mut self, program: &Program, orig: AbstractionPattern, span: Span) {
        let last = self.type_data();
        let subst = last.subst_formal_type;
        let target = program.natural_lowered_type(subst);
        if self.cancels(|kind| matches!(kind, ComponentKind::SubstToOrig), target) {
            self.path.pop();
            return;
        }
        let type_data = LValueTypeData::new(last.access_kind, orig, subst, target);
        self.add(PathComponent::new(
            ComponentKind::OrigToSubst { orig },
            type_data,
            span,
        ));
    }

    /// Convert from the substituted representation to `orig`'s,
    /// cancelling a trailing [`ComponentKind::OrigToSubst`] instead when it
    /// would round-trip.
    pub fn add_subst_to_orig(&mut self, program: &Program, orig: AbstractionPattern, span: Span) {
        let last = self.type_data();
        let subst = last.subst_formal_type;
        let target = program.lowered_type(orig, subst);
        if self.cancels(|kind| matches!(kind, ComponentKind::OrigToSubst { .. }), target) {
            self.path.pop();
            return;
        }
        let type_data = LValueTypeData::new(last.access_kind, orig, subst, target);
        self.add(PathComponent::new(ComponentKind::SubstToOrig, type_data, span));
    }

    /// Is the last component the complement `is_complement` describes,
    /// sitting on a component already of type `target`?
    fn cancels(
        &self,
        is_complement: impl Fn(&ComponentKind) -> bool,
        target: keel_ir::SilType,
    ) -> bool {
        let [.., before, last] = self.path.as_slice() else {
            return false;
        };
        is_complement(&last.kind) && before.type_data.type_of_rvalue == target.object_type()
    }

    // ── Debugging ───────────────────────────────────────────────────

    /// One component per line, root first.
    pub fn dump(&self, program: &Program) -> String {
        let mut out = String::new();
        for component in &self.path {
            let _ = writeln!(out, "{}", component.dump(program, 2));
        }
        out
    }
}
