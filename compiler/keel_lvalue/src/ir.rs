//! Access IR - the instruction stream lvalue lowering emits.
//!
//! This is the narrow slice of a lower-level IR that lowering needs:
//! address projections, access scope markers, loads and stores, accessor
//! calls, existential opening and the optional-binding branch. Blocks hold
//! straight-line instructions and end in a [`Terminator`].
//!
//! # Architecture
//!
//! - **[`ValueId`]**: an SSA value, object or address, typed by a [`SilType`](keel_ir::SilType)
//! - **[`BlockId`]**: a basic block
//! - **[`Inst`]**: one instruction
//! - **[`Callee`]**: an accessor reference for calls
//!
//! The instructions are produced by [`AccessIrBuilder`](crate::AccessIrBuilder),
//! which also tracks what each address refers to.

use std::fmt;

use keel_ir::{AccessorKind, DeclId, ExprId, KeyPathKind, LoweredRepr, ReferenceOwnership};
use smallvec::SmallVec;

use crate::{AccessMarker, Enforcement};

// ── ID newtypes ─────────────────────────────────────────────────────

/// An SSA value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

// ── Operands ────────────────────────────────────────────────────────

/// Reference to an accessor being called.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Callee {
    pub accessor: DeclId,
    pub kind: AccessorKind,
    /// Called through a vtable or witness table.
    pub dispatch: bool,
    /// Called on `super`, bypassing the dynamic type's override.
    pub is_super: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoadQualifier {
    Trivial,
    Copy,
    Take,
    Borrow,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreQualifier {
    Trivial,
    /// Store into uninitialized memory.
    Init,
    /// Replace (and destroy) the current value.
    Assign,
}

// ── Instructions ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inst {
    /// Stack slot of a local variable or parameter.
    AllocLocal { dst: ValueId, decl: DeclId },
    /// Address of a global or static stored variable.
    GlobalAddr { dst: ValueId, decl: DeclId },
    AllocTemp { dst: ValueId },
    DeallocTemp { addr: ValueId },
    /// An rvalue subexpression evaluated by the expression emitter.
    EvalExpr { dst: ValueId, expr: ExprId },
    IntegerLiteral { dst: ValueId, value: i128 },

    BeginAccess {
        dst: ValueId,
        addr: ValueId,
        kind: AccessMarker,
        enforcement: Enforcement,
    },
    EndAccess { access: ValueId, aborted: bool },
    /// Thread-sanitizer hook for an inout access.
    InoutAccessInstrumentation { addr: ValueId },

    Load {
        dst: ValueId,
        addr: ValueId,
        qualifier: LoadQualifier,
    },
    Store {
        value: ValueId,
        addr: ValueId,
        qualifier: StoreQualifier,
    },
    CopyAddr {
        src: ValueId,
        dest: ValueId,
        take: bool,
        init: bool,
    },
    CopyValue { dst: ValueId, value: ValueId },
    DestroyValue { value: ValueId },

    StructElementAddr { dst: ValueId, base: ValueId, field: DeclId },
    StructExtract { dst: ValueId, base: ValueId, field: DeclId },
    TupleElementAddr { dst: ValueId, base: ValueId, index: u32 },
    TupleExtract { dst: ValueId, base: ValueId, index: u32 },
    RefElementAddr { dst: ValueId, base: ValueId, field: DeclId },

    /// Traps when the optional is empty.
    PreconditionHasValue { operand: ValueId },
    /// Payload of a non-empty optional, by address or by value.
    OptionalPayload { dst: ValueId, operand: ValueId },

    OpenExistentialAddr { dst: ValueId, addr: ValueId, mutable: bool },
    OpenExistentialBox { dst: ValueId, value: ValueId },
    OpenExistentialRef { dst: ValueId, value: ValueId },
    OpenExistentialMetatype { dst: ValueId, value: ValueId },
    InitExistentialRef { dst: ValueId, value: ValueId },
    InitExistentialMetatype { dst: ValueId, value: ValueId },

    /// Convert a value between the substituted and the opaque
    /// representation of an abstraction-sensitive type.
    Reabstract { dst: ValueId, value: ValueId, to: LoweredRepr },

    /// Load a `weak`/`unowned` reference as a strong one.
    LoadReference {
        dst: ValueId,
        addr: ValueId,
        ownership: ReferenceOwnership,
    },
    StoreReference {
        value: ValueId,
        addr: ValueId,
        ownership: ReferenceOwnership,
        init: bool,
    },

    Apply {
        results: SmallVec<[ValueId; 2]>,
        callee: Callee,
        self_arg: Option<ValueId>,
        args: SmallVec<[ValueId; 4]>,
    },
    PointerToAddress { dst: ValueId, pointer: ValueId },
    BeginApply {
        token: ValueId,
        yields: SmallVec<[ValueId; 1]>,
        callee: Callee,
        self_arg: Option<ValueId>,
        args: SmallVec<[ValueId; 4]>,
    },
    EndApply { token: ValueId },
    AbortApply { token: ValueId },

    /// Read through a key path into `dest`.
    KeyPathRead {
        dest: ValueId,
        base: ValueId,
        key_path: ValueId,
    },
    /// Project a writable address through a key path; `owner` keeps the
    /// projected storage alive until it is destroyed.
    KeyPathProject {
        addr: ValueId,
        owner: ValueId,
        base: ValueId,
        key_path: ValueId,
        kind: KeyPathKind,
    },
}

impl Inst {
    /// Short mnemonic for dumps and test assertions.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Inst::AllocLocal { .. } => "alloc_local",
            Inst::GlobalAddr { .. } => "global_addr",
            Inst::AllocTemp { .. } => "alloc_temp",
            Inst::DeallocTemp { .. } => "dealloc_temp",
            Inst::EvalExpr { .. } => "eval_expr",
            Inst::IntegerLiteral { .. } => "integer_literal",
            Inst::BeginAccess { .. } => "begin_access",
            Inst::EndAccess { .. } => "end_access",
            Inst::InoutAccessInstrumentation { .. } => "inout_access_instrumentation",
            Inst::Load { .. } => "load",
            Inst::Store { .. } => "store",
            Inst::CopyAddr { .. } => "copy_addr",
            Inst::CopyValue { .. } => "copy_value",
            Inst::DestroyValue { .. } => "destroy_value",
            Inst::StructElementAddr { .. } => "struct_element_addr",
            Inst::StructExtract { .. } => "struct_extract",
            Inst::TupleElementAddr { .. } => "tuple_element_addr",
            Inst::TupleExtract { .. } => "tuple_extract",
            Inst::RefElementAddr { .. } => "ref_element_addr",
            Inst::PreconditionHasValue { .. } => "precondition_has_value",
            Inst::OptionalPayload { .. } => "optional_payload",
            Inst::OpenExistentialAddr { .. } => "open_existential_addr",
            Inst::OpenExistentialBox { .. } => "open_existential_box",
            Inst::OpenExistentialRef { .. } => "open_existential_ref",
            Inst::OpenExistentialMetatype { .. } => "open_existential_metatype",
            Inst::InitExistentialRef { .. } => "init_existential_ref",
            Inst::InitExistentialMetatype { .. } => "init_existential_metatype",
            Inst::Reabstract { .. } => "reabstract",
            Inst::LoadReference { .. } => "load_reference",
            Inst::StoreReference { .. } => "store_reference",
            Inst::Apply { .. } => "apply",
            Inst::PointerToAddress { .. } => "pointer_to_address",
            Inst::BeginApply { .. } => "begin_apply",
            Inst::EndApply { .. } => "end_apply",
            Inst::AbortApply { .. } => "abort_apply",
            Inst::KeyPathRead { .. } => "key_path_read",
            Inst::KeyPathProject { .. } => "key_path_project",
        }
    }
}

// ── Terminators and blocks ──────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    Branch(BlockId),
    /// Continue in `some` when the optional at `operand` has a value.
    SwitchOptional {
        operand: ValueId,
        some: BlockId,
        none: BlockId,
    },
    /// Leave the function by unwinding.
    Unwind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
}
