//! Knobs for lvalue lowering.

use bitflags::bitflags;

/// Compilation-wide lowering configuration, fixed for the whole function.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoweringOptions {
    /// Emit dynamically enforced access markers for class properties,
    /// globals and static members. When off those accesses get no marker.
    pub enforce_exclusivity_dynamic: bool,
    /// Instrument every address handed out for an inout access so a
    /// thread sanitizer can observe it.
    pub sanitize_thread: bool,
    /// Also mark accesses to compiler temporaries (writeback buffers,
    /// copy destinations) with unenforced access scopes, so a verifier can
    /// check that every memory access sits inside some scope.
    pub verify_exclusivity: bool,
}

impl LoweringOptions {
    /// Options with dynamic enforcement enabled, the usual release setting.
    pub fn enforcing() -> Self {
        LoweringOptions {
            enforce_exclusivity_dynamic: true,
            ..Self::default()
        }
    }
}

bitflags! {
    /// Per-build flags for [`LValueBuilder::build`](crate::LValueBuilder::build).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LValueOptions: u8 {
        /// The address is only formed, never read or written through
        /// (for example to compare identities), so no access is begun.
        const IS_NON_ACCESSING = 1 << 0;
        /// Spill an rvalue root into a temporary so the path can be
        /// projected by address.
        const TRY_ADDRESS = 1 << 1;
    }
}

impl LValueOptions {
    /// Options for the base of a physically projected member. The base is
    /// accessed exactly as the member is.
    #[must_use]
    pub fn for_projected_base(self) -> Self {
        self
    }

    /// Options for the base of an accessor call. The accessor really does
    /// read or modify its base.
    #[must_use]
    pub fn for_computed_base(self) -> Self {
        self - LValueOptions::IS_NON_ACCESSING
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_computed_base_drops_non_accessing() {
        let options = LValueOptions::IS_NON_ACCESSING | LValueOptions::TRY_ADDRESS;
        assert_eq!(options.for_projected_base(), options);
        assert_eq!(options.for_computed_base(), LValueOptions::TRY_ADDRESS);
    }

    #[test]
    fn test_defaults_are_unenforced() {
        let options = LoweringOptions::default();
        assert!(!options.enforce_exclusivity_dynamic);
        assert!(LoweringOptions::enforcing().enforce_exclusivity_dynamic);
    }
}
