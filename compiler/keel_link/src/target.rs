//! Target triples and the object-format facts linkage depends on.
//!
//! Only the pieces of a triple that change symbol linkage are modelled:
//! which object format the target writes (ELF enables protected
//! visibility, COFF needs explicit DLL import/export) and whether a Windows
//! target uses a GNU-flavoured environment that resolves symbols without
//! DLL storage annotations.

use std::fmt;

use thiserror::Error;

/// Error parsing or classifying a target triple.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("invalid target triple '{triple}': {reason}")]
    InvalidTripleFormat { triple: String, reason: String },
    #[error("unsupported operating system '{os}' in target triple '{triple}'")]
    UnsupportedOs { triple: String, os: String },
}

/// Object file format written for a target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectFormat {
    Elf,
    MachO,
    Coff,
    Wasm,
}

/// Parsed components of a target triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTriple {
    /// CPU architecture (e.g., `x86_64`, `aarch64`, `wasm32`)
    pub arch: String,
    /// Hardware vendor (e.g., `unknown`, `apple`, `pc`)
    pub vendor: String,
    /// Operating system (e.g., `linux`, `darwin`, `windows`, `cygwin`)
    pub os: String,
    /// Environment/ABI (e.g., `gnu`, `musl`, `msvc`)
    pub env: Option<String>,
}

impl TargetTriple {
    /// Parse `<arch>-<vendor>-<os>[-<env>]`.
    pub fn parse(triple: &str) -> Result<Self, TargetError> {
        let parts: Vec<&str> = triple.split('-').collect();

        if parts.len() < 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(TargetError::InvalidTripleFormat {
                triple: triple.to_string(),
                reason: "expected at least 3 non-empty components: <arch>-<vendor>-<os>"
                    .to_string(),
            });
        }

        let parsed = Self {
            arch: parts[0].to_string(),
            vendor: parts[1].to_string(),
            os: parts[2].to_string(),
            env: parts.get(3).map(|s| (*s).to_string()),
        };
        parsed.object_format()?;
        Ok(parsed)
    }

    pub fn is_wasm(&self) -> bool {
        self.arch == "wasm32" || self.arch == "wasm64"
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Apple platforms, all of which use Mach-O.
    pub fn is_darwin(&self) -> bool {
        matches!(
            self.os.as_str(),
            "darwin" | "macos" | "macosx" | "ios" | "tvos" | "watchos"
        )
    }

    /// Windows with a Cygwin or MinGW environment.
    pub fn is_cygwin_or_mingw(&self) -> bool {
        self.os == "cygwin" || (self.is_windows() && self.env.as_deref() == Some("gnu"))
    }

    pub fn object_format(&self) -> Result<ObjectFormat, TargetError> {
        if self.is_wasm() {
            return Ok(ObjectFormat::Wasm);
        }
        if self.is_darwin() {
            return Ok(ObjectFormat::MachO);
        }
        match self.os.as_str() {
            "windows" | "cygwin" => Ok(ObjectFormat::Coff),
            "linux" | "freebsd" | "openbsd" | "netbsd" | "android" | "none" | "unknown" => {
                Ok(ObjectFormat::Elf)
            }
            other => Err(TargetError::UnsupportedOs {
                triple: self.to_string(),
                os: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.arch, self.vendor, self.os)?;
        if let Some(env) = &self.env {
            write!(f, "-{env}")?;
        }
        Ok(())
    }
}
