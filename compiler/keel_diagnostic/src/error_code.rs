use std::fmt;

/// Error codes for backend diagnostics.
///
/// Format: E#### where the first digit indicates the phase; E4xxx is
/// lvalue lowering. Internal errors are panics, not diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Lvalue lowering (E4xxx)
    /// Overlapping writebacks to the same property
    E4001,
    /// Overlapping writebacks to the same subscript element
    E4002,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E4001 => "E4001",
            ErrorCode::E4002 => "E4002",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
