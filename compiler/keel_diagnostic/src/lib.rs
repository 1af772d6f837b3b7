//! Diagnostic system for backend lowering.
//!
//! Lowering reports user-facing problems through the [`Diagnose`] seam and
//! never formats them itself:
//! - Error codes for searchability
//! - Clear messages (what went wrong)
//! - Primary span (where it went wrong)
//! - Secondary labels (the other site involved)
//!
//! [`DiagnosticQueue`] is the collecting implementation used by drivers and
//! tests.

mod diagnostic;
mod error_code;
mod queue;

pub use diagnostic::{
    writeback_overlap_property, writeback_overlap_subscript, Diagnostic, Label,
};
pub use error_code::ErrorCode;
pub use queue::{Diagnose, DiagnosticQueue};
