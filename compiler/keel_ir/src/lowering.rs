//! Type lowering: from formal types to the physical types the IR works with.
//!
//! A formal type lowers differently depending on the *abstraction pattern*
//! it is viewed through. Values seen through an opaque pattern (a generic
//! parameter, or the maximally abstract pattern used by key paths) use the
//! most general representation; for abstraction-sensitive types such as
//! functions and metatypes that representation differs from the natural
//! one, and converting between the two needs a reabstraction.

use crate::{DeclFlags, DeclKind, Program, TypeId, TypeKind};

/// Pattern a formal type is viewed through when lowering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AbstractionPattern {
    /// Maximally abstract: an unconstrained generic parameter.
    Opaque,
    /// The substituted type itself, or a pattern type containing generics.
    Type(TypeId),
}

impl AbstractionPattern {
    pub fn is_opaque(self, program: &Program) -> bool {
        match self {
            AbstractionPattern::Opaque => true,
            AbstractionPattern::Type(ty) => matches!(
                program.type_kind(ty),
                TypeKind::GenericParam { .. } | TypeKind::DependentMember { .. }
            ),
        }
    }
}

/// Whether a lowered value is held directly or in memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SilCategory {
    Object,
    Address,
}

/// Which representation of an abstraction-sensitive type is in use.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoweredRepr {
    Substituted,
    Opaque,
}

/// A lowered physical type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SilType {
    pub ty: TypeId,
    pub category: SilCategory,
    pub repr: LoweredRepr,
}

impl SilType {
    pub fn object(ty: TypeId) -> Self {
        SilType {
            ty,
            category: SilCategory::Object,
            repr: LoweredRepr::Substituted,
        }
    }

    pub fn is_address(self) -> bool {
        self.category == SilCategory::Address
    }

    pub fn is_object(self) -> bool {
        self.category == SilCategory::Object
    }

    #[must_use]
    pub fn address_type(self) -> Self {
        SilType {
            category: SilCategory::Address,
            ..self
        }
    }

    #[must_use]
    pub fn object_type(self) -> Self {
        SilType {
            category: SilCategory::Object,
            ..self
        }
    }

    #[must_use]
    pub fn with_type(self, ty: TypeId) -> Self {
        SilType { ty, ..self }
    }
}

/// How a value of existential type is laid out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExistentialRepr {
    /// Inline buffer plus type metadata and witness tables; address-only.
    Opaque,
    /// Single class reference plus witness tables.
    Class,
    /// Metatype plus witness tables.
    Metatype,
    /// Heap box (the `Error` existential).
    Boxed,
}

impl Program {
    /// Lower `subst` as seen through `orig`. The result is an object type.
    pub fn lowered_type(&self, orig: AbstractionPattern, subst: TypeId) -> SilType {
        let subst = self.rvalue_type(subst);
        let repr = if orig.is_opaque(self) && self.is_abstraction_sensitive(subst) {
            LoweredRepr::Opaque
        } else {
            LoweredRepr::Substituted
        };
        SilType {
            ty: subst,
            category: SilCategory::Object,
            repr,
        }
    }

    /// Lower `ty` through its own (natural) abstraction pattern.
    pub fn natural_lowered_type(&self, ty: TypeId) -> SilType {
        let ty = self.rvalue_type(ty);
        self.lowered_type(AbstractionPattern::Type(ty), ty)
    }

    /// Does the representation of `ty` depend on the abstraction pattern?
    pub fn is_abstraction_sensitive(&self, ty: TypeId) -> bool {
        match self.type_kind(ty) {
            TypeKind::Function { .. } | TypeKind::Metatype(_) => true,
            TypeKind::Tuple(elements) => elements
                .iter()
                .any(|element| self.is_abstraction_sensitive(element.ty)),
            TypeKind::Optional(object) => self.is_abstraction_sensitive(*object),
            _ => false,
        }
    }

    /// Types that can only be manipulated in memory.
    pub fn is_address_only(&self, ty: TypeId) -> bool {
        match self.type_kind(self.rvalue_type(ty)) {
            TypeKind::Existential(_) => self.existential_repr(ty) == ExistentialRepr::Opaque,
            TypeKind::GenericParam { .. } | TypeKind::DependentMember { .. } => true,
            TypeKind::OpenedArchetype { existential, .. } => {
                !self.is_class_existential(*existential)
            }
            TypeKind::Tuple(elements) => elements
                .iter()
                .any(|element| self.is_address_only(element.ty)),
            TypeKind::Optional(object) => self.is_address_only(*object),
            TypeKind::ReferenceStorage { .. } => false,
            TypeKind::Nominal { decl, args } => {
                let d = self.decl(*decl);
                match d.kind {
                    DeclKind::Struct | DeclKind::Enum => {
                        d.has(DeclFlags::RESILIENT)
                            || args.iter().any(|&arg| self.is_address_only(arg))
                            || self.stored_fields(*decl).any(|field| {
                                self.is_address_only(self.storage_type(field))
                            })
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Types whose copies need no ownership operations.
    pub fn is_trivial(&self, ty: TypeId) -> bool {
        match self.type_kind(self.rvalue_type(ty)) {
            TypeKind::Builtin(name) => self.name_str(*name) != "NativeObject",
            TypeKind::Metatype(_) | TypeKind::ExistentialMetatype(_) => true,
            TypeKind::Tuple(elements) => elements.iter().all(|element| self.is_trivial(element.ty)),
            TypeKind::Optional(object) => self.is_trivial(*object),
            TypeKind::Nominal { decl, args } => match self.decl(*decl).kind {
                DeclKind::Struct | DeclKind::Enum => {
                    !self.decl(*decl).has(DeclFlags::RESILIENT)
                        && args.iter().all(|&arg| self.is_trivial(arg))
                        && self
                            .stored_fields(*decl)
                            .all(|field| self.is_trivial(self.storage_type(field)))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// # Panics
    /// Panics when `ty` is not an existential or existential metatype.
    pub fn existential_repr(&self, ty: TypeId) -> ExistentialRepr {
        let ty = self.rvalue_type(ty);
        match self.type_kind(ty) {
            TypeKind::ExistentialMetatype(_) => ExistentialRepr::Metatype,
            TypeKind::Existential(protocols) => {
                if protocols
                    .iter()
                    .any(|&p| self.decl(p).has(DeclFlags::ERROR_PROTOCOL))
                {
                    ExistentialRepr::Boxed
                } else if self.is_class_existential(ty) {
                    ExistentialRepr::Class
                } else {
                    ExistentialRepr::Opaque
                }
            }
            other => panic!("existential representation of non-existential {other:?}"),
        }
    }
}
