//! Protocol conformances and substitution maps.

use smallvec::SmallVec;

use crate::{ConformanceId, DeclId, TypeId};

/// How a conformance came to exist.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConformanceKind {
    /// Declared directly on a type or extension.
    Normal,
    /// A generic conformance with its parameters bound.
    Specialized {
        generic: ConformanceId,
        subs: SubstitutionMap,
    },
    /// A subclass inheriting its superclass's conformance.
    Inherited { inherited: ConformanceId },
}

/// `ty: protocol`, declared in `context` (a nominal or an extension).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Conformance {
    pub ty: TypeId,
    pub protocol: DeclId,
    pub context: DeclId,
    pub kind: ConformanceKind,
}

/// Replacement types for generic parameters, in declaration order, plus the
/// conformances that satisfy their requirements.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct SubstitutionMap {
    pub replacements: SmallVec<[TypeId; 2]>,
    pub conformances: SmallVec<[ConformanceId; 2]>,
}

impl SubstitutionMap {
    pub fn new(replacements: impl IntoIterator<Item = TypeId>) -> Self {
        SubstitutionMap {
            replacements: replacements.into_iter().collect(),
            conformances: SmallVec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.conformances.is_empty()
    }
}
