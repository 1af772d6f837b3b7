//! Typed source expressions consumed by lvalue lowering.
//!
//! Expressions live in the [`Program`](crate::Program) arena and refer to
//! their children by [`ExprId`]. Every expression carries its checked type:
//! assignable expressions have an [`LValue`](crate::TypeKind::LValue) type,
//! `&x` arguments an [`InOut`](crate::TypeKind::InOut) type.

use smallvec::SmallVec;

use crate::{AccessSemantics, DeclId, ExprId, Name, Span, SubstitutionMap, TypeId};

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Reference to a var, param or function declaration.
    DeclRef {
        decl: DeclId,
        subs: SubstitutionMap,
        semantics: AccessSemantics,
    },
    /// `base.member` for a var member.
    MemberRef {
        base: ExprId,
        member: DeclId,
        subs: SubstitutionMap,
        semantics: AccessSemantics,
        is_super: bool,
    },
    /// `base[index]`.
    Subscript {
        base: ExprId,
        decl: DeclId,
        index: ExprId,
        subs: SubstitutionMap,
        semantics: AccessSemantics,
        is_super: bool,
    },
    /// `base.0`.
    TupleElement { base: ExprId, index: u32 },
    /// `sub!`.
    ForceValue { sub: ExprId, is_implicit_unwrap: bool },
    /// `sub?` inside an optional chain of the given depth.
    BindOptional { sub: ExprId, depth: u32 },
    /// Opens `existential`, binding its contents to `opaque` while `sub` is
    /// evaluated.
    OpenExistential {
        existential: ExprId,
        opaque: ExprId,
        sub: ExprId,
    },
    /// Placeholder bound by an enclosing [`ExprKind::OpenExistential`].
    OpaqueValue,
    /// `base[keyPath: path]`.
    KeyPathApplication { base: ExprId, key_path: ExprId },
    /// `&sub`.
    InOut(ExprId),
    /// `lhs.rhs` where `lhs` is only evaluated for side effects.
    DotSyntaxBaseIgnored { lhs: ExprId, rhs: ExprId },
    /// `_` on the left of an assignment.
    DiscardAssignment,
    /// Read of an lvalue as an rvalue.
    Load(ExprId),
    Paren(ExprId),
    Tuple {
        elements: SmallVec<[ExprId; 4]>,
        labels: SmallVec<[Option<Name>; 4]>,
        has_trailing_closure: bool,
    },
    Call { func: ExprId, arg: ExprId },
    /// `Type.init` partially applied to its metatype base.
    ConstructorRefCall { func: ExprId, base: ExprId },
    /// A type used as a value.
    TypeExpr(TypeId),
    IntegerLiteral(i128),
    /// Stored as bits so the kind stays `Eq`-comparable bitwise.
    FloatLiteral(u64),
    BooleanLiteral(bool),
    StringLiteral(Name),
}

impl ExprKind {
    /// Short, stable name of the kind for dumps and panics.
    pub fn describe(&self) -> &'static str {
        match self {
            ExprKind::DeclRef { .. } => "decl ref",
            ExprKind::MemberRef { .. } => "member ref",
            ExprKind::Subscript { .. } => "subscript",
            ExprKind::TupleElement { .. } => "tuple element",
            ExprKind::ForceValue { .. } => "force value",
            ExprKind::BindOptional { .. } => "bind optional",
            ExprKind::OpenExistential { .. } => "open existential",
            ExprKind::OpaqueValue => "opaque value",
            ExprKind::KeyPathApplication { .. } => "key path application",
            ExprKind::InOut(_) => "inout",
            ExprKind::DotSyntaxBaseIgnored { .. } => "dot syntax base ignored",
            ExprKind::DiscardAssignment => "discard assignment",
            ExprKind::Load(_) => "load",
            ExprKind::Paren(_) => "paren",
            ExprKind::Tuple { .. } => "tuple",
            ExprKind::Call { .. } => "call",
            ExprKind::ConstructorRefCall { .. } => "constructor ref call",
            ExprKind::TypeExpr(_) => "type expr",
            ExprKind::IntegerLiteral(_) => "integer literal",
            ExprKind::FloatLiteral(_) => "float literal",
            ExprKind::BooleanLiteral(_) => "boolean literal",
            ExprKind::StringLiteral(_) => "string literal",
        }
    }

    /// Discriminant comparison, ignoring payloads.
    pub fn same_kind(&self, other: &ExprKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: Span,
    pub implicit: bool,
}
