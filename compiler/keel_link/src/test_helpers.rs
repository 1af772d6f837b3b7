//! Shared fixtures for linkage and mangling tests.

use keel_ir::{
    AccessLevel, Conformance, ConformanceId, ConformanceKind, DeclFlags, DeclId, DeclKind,
    Program, StorageImpl, TypeId,
};
use smallvec::smallvec;

/// A small program: module `main` with a struct, a protocol and an open
/// class, a second native module `Lib`, and a foreign module `CLib`.
pub(crate) struct Fixture {
    pub program: Program,
    pub main: DeclId,
    pub lib: DeclId,
    pub foreign: DeclId,
    pub int: TypeId,
    /// `public struct Point { public var x: Int }` in `main`.
    pub point: DeclId,
    pub point_ty: TypeId,
    pub x: DeclId,
    /// `public protocol Shape { func area() -> Int }` in `main`.
    pub shape: DeclId,
    pub area: DeclId,
    /// `open class Widget { init(size: Int) }` in `main`; the init is internal.
    pub widget: DeclId,
    pub widget_init: DeclId,
    /// `Point: Shape`, declared in `main`.
    pub point_shape: ConformanceId,
    /// `public struct Remote` in `Lib`.
    pub remote: DeclId,
    pub remote_ty: TypeId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut program = Program::new();
        let main = program.add_module("main");
        let lib = program.add_module("Lib");
        let foreign = program.add_module("CLib");
        program.add_flags(foreign, DeclFlags::FOREIGN);

        let int = program.builtin("Int64");
        let point = program.declare(Some(main), "Point", DeclKind::Struct, AccessLevel::Public);
        let point_ty = program.nominal_type(point);
        let x = program.add_var(point, "x", int, StorageImpl::stored(), AccessLevel::Public);

        let shape = program.declare(Some(main), "Shape", DeclKind::Protocol, AccessLevel::Public);
        let area_ty = program.function(Vec::new(), int);
        let area = program.declare(
            Some(shape),
            "area",
            DeclKind::Func { ty: area_ty },
            AccessLevel::Public,
        );

        let widget = program.declare(
            Some(main),
            "Widget",
            DeclKind::Class { superclass: None },
            AccessLevel::Open,
        );
        let widget_ty = program.nominal_type(widget);
        let init_ty = program.function(vec![int], widget_ty);
        let size = program.intern("size");
        let widget_init = program.declare(
            Some(widget),
            "init",
            DeclKind::Constructor {
                ty: init_ty,
                arg_labels: smallvec![size],
            },
            AccessLevel::Internal,
        );

        let point_shape = program.add_conformance(Conformance {
            ty: point_ty,
            protocol: shape,
            context: point,
            kind: ConformanceKind::Normal,
        });

        let remote = program.declare(Some(lib), "Remote", DeclKind::Struct, AccessLevel::Public);
        let remote_ty = program.nominal_type(remote);

        Fixture {
            program,
            main,
            lib,
            foreign,
            int,
            point,
            point_ty,
            x,
            shape,
            area,
            widget,
            widget_init,
            point_shape,
            remote,
            remote_ty,
        }
    }
}
