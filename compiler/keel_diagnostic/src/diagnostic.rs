use std::fmt;

use keel_ir::Span;

use crate::ErrorCode;

/// A labeled span with a message.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

impl Label {
    /// Create a primary label (the main error location).
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Label {
            span,
            message: message.into(),
            is_primary: true,
        }
    }

    /// Create a secondary label (the other site involved).
    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Label {
            span,
            message: message.into(),
            is_primary: false,
        }
    }
}

/// A lowering error: code, message and located labels.
///
/// Lowering only reports errors; it never downgrades a conflict to a
/// warning, so there is no severity.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[must_use = "diagnostics should be reported or returned, not silently dropped"]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    pub labels: Vec<Label>,
}

impl Diagnostic {
    pub fn error(code: ErrorCode) -> Self {
        Diagnostic {
            code,
            message: String::new(),
            labels: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add a primary label at the error location.
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    /// Add a secondary label for context.
    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    /// Get the primary span (first primary label's span).
    pub fn primary_span(&self) -> Option<Span> {
        self.labels.iter().find(|l| l.is_primary).map(|l| l.span)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error [{}]: {}", self.code, self.message)?;
        for label in &self.labels {
            let marker = if label.is_primary { "-->" } else { "   " };
            write!(f, "\n  {} {:?}: {}", marker, label.span, label.message)?;
        }
        Ok(())
    }
}

// ── Lvalue lowering diagnostics ─────────────────────────────────────

/// Two pending writebacks to the same property overlap.
pub fn writeback_overlap_property(property: &str, span: Span, other: Span) -> Diagnostic {
    Diagnostic::error(ErrorCode::E4001)
        .with_message(format!(
            "inout writeback to computed property '{property}' occurs in multiple arguments to call, introducing invalid aliasing"
        ))
        .with_label(span, "writeback to this property")
        .with_secondary_label(other, "concurrent writeback occurred here")
}

/// Two pending writebacks to the same subscript element overlap.
pub fn writeback_overlap_subscript(span: Span, other: Span) -> Diagnostic {
    Diagnostic::error(ErrorCode::E4002)
        .with_message(
            "inout writeback through subscript occurs in multiple arguments to call, introducing invalid aliasing",
        )
        .with_label(span, "writeback through this subscript")
        .with_secondary_label(other, "concurrent writeback occurred here")
}
