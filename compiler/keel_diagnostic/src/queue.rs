//! Diagnostic collection.

use crate::Diagnostic;

/// Report-at-location seam used by lowering.
pub trait Diagnose {
    fn diagnose(&mut self, diagnostic: Diagnostic);
}

impl Diagnose for Vec<Diagnostic> {
    fn diagnose(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Collects diagnostics in report order, dropping exact duplicates.
///
/// Lowering can revisit the same access pair when an expression is lowered
/// more than once (for example once per optional-chain path), so identical
/// reports are collapsed.
#[derive(Default, Debug)]
pub struct DiagnosticQueue {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Iterate without draining.
    pub fn peek(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Drain all collected diagnostics, leaving the queue empty.
    pub fn flush(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl Diagnose for DiagnosticQueue {
    fn diagnose(&mut self, diagnostic: Diagnostic) {
        if self.diagnostics.contains(&diagnostic) {
            return;
        }
        self.diagnostics.push(diagnostic);
    }
}
