//! Shared fixtures for lowering tests.

use keel_diagnostic::Diagnostic;
use keel_ir::{
    AccessLevel, AccessSemantics, AccessorKind, DeclFlags, DeclId, DeclKind, ExprId, ExprKind,
    Program, Span, StorageImpl, SubstitutionMap, TypeId,
};

use crate::{AccessIrBuilder, BlockId, LowerCx, LoweringOptions};

/// A small program:
///
/// ```text
/// struct Point {
///     var x: Int
///     var area: Int { get set }
///     subscript(Int) -> Int { get set }
/// }
/// var total: Int { get set }
/// class Widget {
///     var size: Int
///     static var count: Int
/// }
/// func f() {
///     var a, b: Point
///     var i, j: Int
///     var o: Point?
///     var w: Widget
/// }
/// ```
pub(crate) struct Fixture {
    pub program: Program,
    pub main: DeclId,
    pub func: DeclId,
    pub int: TypeId,
    pub point: DeclId,
    pub point_ty: TypeId,
    pub x: DeclId,
    pub area: DeclId,
    pub area_get: DeclId,
    pub area_set: DeclId,
    pub element: DeclId,
    pub element_get: DeclId,
    pub total: DeclId,
    pub total_get: DeclId,
    pub widget_ty: TypeId,
    pub size: DeclId,
    pub count: DeclId,
    pub a: DeclId,
    pub b: DeclId,
    pub i: DeclId,
    pub j: DeclId,
    pub o: DeclId,
    pub w: DeclId,
    next_span: u32,
}

impl Fixture {
    pub fn new() -> Self {
        let mut program = Program::new();
        let main = program.add_module("main");
        let int = program.builtin("Int64");
        let internal = AccessLevel::Internal;

        let point = program.declare(Some(main), "Point", DeclKind::Struct, internal);
        let point_ty = program.nominal_type(point);
        let x = program.add_var(point, "x", int, StorageImpl::stored(), internal);
        let area = program.add_var(point, "area", int, StorageImpl::get_set(), internal);
        let area_get = program.add_accessor(area, AccessorKind::Get);
        let area_set = program.add_accessor(area, AccessorKind::Set);
        let element = program.add_subscript(point, int, int, StorageImpl::get_set(), internal);
        let element_get = program.add_accessor(element, AccessorKind::Get);
        program.add_accessor(element, AccessorKind::Set);

        let total = program.add_var(main, "total", int, StorageImpl::get_set(), internal);
        let total_get = program.add_accessor(total, AccessorKind::Get);
        program.add_accessor(total, AccessorKind::Set);

        let widget = program.declare(
            Some(main),
            "Widget",
            DeclKind::Class { superclass: None },
            internal,
        );
        let widget_ty = program.nominal_type(widget);
        let size = program.add_var(widget, "size", int, StorageImpl::stored(), internal);
        let count = program.add_var(widget, "count", int, StorageImpl::stored(), internal);
        program.add_flags(count, DeclFlags::STATIC);

        let unit = program.tuple(Vec::new());
        let f_ty = program.function(Vec::new(), unit);
        let f = program.declare(Some(main), "f", DeclKind::Func { ty: f_ty }, internal);
        let private = AccessLevel::Private;
        let a = program.add_var(f, "a", point_ty, StorageImpl::stored(), private);
        let b = program.add_var(f, "b", point_ty, StorageImpl::stored(), private);
        let i = program.add_var(f, "i", int, StorageImpl::stored(), private);
        let j = program.add_var(f, "j", int, StorageImpl::stored(), private);
        let optional_point = program.optional(point_ty);
        let o = program.add_var(f, "o", optional_point, StorageImpl::stored(), private);
        let w = program.add_var(f, "w", widget_ty, StorageImpl::stored(), private);

        Fixture {
            program,
            main,
            func: f,
            int,
            point,
            point_ty,
            x,
            area,
            area_get,
            area_set,
            element,
            element_get,
            total,
            total_get,
            widget_ty,
            size,
            count,
            a,
            b,
            i,
            j,
            o,
            w,
            next_span: 0,
        }
    }

    /// A fresh span, distinct from every span handed out before.
    pub fn span(&mut self) -> Span {
        self.next_span += 10;
        Span::new(self.next_span, self.next_span + 5)
    }

    pub fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        let span = self.span();
        self.program.add_expr(kind, ty, span)
    }

    /// A stored local of `f`.
    pub fn local(&mut self, name: &str, ty: TypeId) -> DeclId {
        let func = self.func;
        self.program
            .add_var(func, name, ty, StorageImpl::stored(), AccessLevel::Private)
    }

    /// `decl` used as an lvalue.
    pub fn decl_ref(&mut self, decl: DeclId) -> ExprId {
        let ty = self.program.storage_type(decl);
        let ty = self.program.lvalue(ty);
        self.expr(
            ExprKind::DeclRef {
                decl,
                subs: SubstitutionMap::default(),
                semantics: AccessSemantics::Ordinary,
            },
            ty,
        )
    }

    /// `decl` used as an rvalue.
    pub fn value_ref(&mut self, decl: DeclId) -> ExprId {
        let ty = self.program.storage_type(decl);
        self.expr(
            ExprKind::DeclRef {
                decl,
                subs: SubstitutionMap::default(),
                semantics: AccessSemantics::Ordinary,
            },
            ty,
        )
    }

    /// `base.member` as an lvalue.
    pub fn member(&mut self, base: ExprId, member: DeclId) -> ExprId {
        let ty = self.program.storage_type(member);
        let ty = self.program.lvalue(ty);
        self.expr(
            ExprKind::MemberRef {
                base,
                member,
                subs: SubstitutionMap::default(),
                semantics: AccessSemantics::Ordinary,
                is_super: false,
            },
            ty,
        )
    }

    /// `base[index]` through `Point`'s subscript, as an lvalue.
    pub fn subscript(&mut self, base: ExprId, index: ExprId) -> ExprId {
        let ty = self.program.lvalue(self.int);
        let decl = self.element;
        self.expr(
            ExprKind::Subscript {
                base,
                decl,
                index,
                subs: SubstitutionMap::default(),
                semantics: AccessSemantics::Ordinary,
                is_super: false,
            },
            ty,
        )
    }

    pub fn int_literal(&mut self, value: i128) -> ExprId {
        let int = self.int;
        self.expr(ExprKind::IntegerLiteral(value), int)
    }

    /// `sub?` at `depth`, as an lvalue of the optional's payload type.
    pub fn bind_optional(&mut self, sub: ExprId, depth: u32) -> ExprId {
        let Some(object) = self.program.optional_object_type(self.program.expr(sub).ty) else {
            panic!("bind_optional on a non-optional expression");
        };
        let ty = self.program.lvalue(object);
        self.expr(ExprKind::BindOptional { sub, depth }, ty)
    }
}

/// Run `f` against a fresh lowering context over `program`; returns its
/// result, the emitted IR and the diagnostics reported.
pub(crate) fn lower<R>(
    program: &Program,
    options: LoweringOptions,
    f: impl FnOnce(&mut LowerCx<'_>) -> R,
) -> (R, AccessIrBuilder, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let (result, b) = {
        let mut cx = LowerCx::new(program, options, &mut diagnostics);
        let result = f(&mut cx);
        (result, cx.finish())
    };
    (result, b, diagnostics)
}

/// Mnemonics of the instructions in `block`, in order.
pub(crate) fn mnemonics(b: &AccessIrBuilder, block: BlockId) -> Vec<&'static str> {
    b.block(block).insts.iter().map(crate::Inst::mnemonic).collect()
}
