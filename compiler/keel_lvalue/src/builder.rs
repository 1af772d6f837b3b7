//! Recording builder for the access IR.
//!
//! Lowering never inspects the instructions it emits; it only needs fresh
//! values back. [`AccessIrBuilder`] appends instructions to the current
//! block, types every result, and feeds the symbolic [`MemoryModel`] so
//! that questions like "are these two bases obviously the same value?" can
//! be answered structurally.
//!
//! # Design
//!
//! Follows the "position at a block, emit instructions, terminate" pattern
//! of an LLVM-style builder. All instructions stay inspectable after
//! emission, which is what the tests (and the overlap diagnosis) rely on.

use keel_ir::{
    AccessorKind, DeclId, ExprId, KeyPathKind, LoweredRepr, ReferenceOwnership, SilType,
};
use smallvec::SmallVec;

use crate::memory::{MemoryModel, Place, PlaceRoot, Projection};
use crate::{
    AccessMarker, Block, BlockId, Callee, Enforcement, Inst, LoadQualifier, StoreQualifier,
    Terminator, ValueId,
};

pub struct AccessIrBuilder {
    blocks: Vec<Block>,
    current_block: BlockId,
    /// Type of each value; `None` for coroutine tokens and key path owners.
    values: Vec<Option<SilType>>,
    memory: MemoryModel,
}

impl Default for AccessIrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessIrBuilder {
    /// Create a builder with an entry block already allocated.
    pub fn new() -> Self {
        AccessIrBuilder {
            blocks: vec![Block::default()],
            current_block: BlockId::new(0),
            values: Vec::new(),
            memory: MemoryModel::default(),
        }
    }

    // ── Blocks ──────────────────────────────────────────────────────

    #[expect(
        clippy::cast_possible_truncation,
        reason = "block indices never exceed u32"
    )]
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    pub fn position_at(&mut self, block: BlockId) {
        debug_assert!(block.index() < self.blocks.len(), "{block:?} out of bounds");
        self.current_block = block;
    }

    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current_block.index()].terminator.is_some()
    }

    pub fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current_block.index()];
        assert!(
            block.terminator.is_none(),
            "{:?} is already terminated",
            self.current_block
        );
        block.terminator = Some(terminator);
    }

    /// Replace the terminator of an already finished block.
    pub fn retarget(&mut self, block: BlockId, terminator: Terminator) {
        let block = &mut self.blocks[block.index()];
        debug_assert!(block.terminator.is_some(), "retargeting an open block");
        block.terminator = Some(terminator);
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Every instruction, block by block.
    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|block| block.insts.iter())
    }

    // ── Values ──────────────────────────────────────────────────────

    #[expect(
        clippy::cast_possible_truncation,
        reason = "value counts never exceed u32"
    )]
    fn fresh(&mut self, ty: Option<SilType>) -> ValueId {
        let id = ValueId::new(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn value_type(&self, value: ValueId) -> Option<SilType> {
        self.values[value.index()]
    }

    fn emit(&mut self, inst: Inst) {
        tracing::trace!(inst = inst.mnemonic(), block = ?self.current_block, "emit");
        self.blocks[self.current_block.index()].insts.push(inst);
    }

    fn projected(&mut self, dst: ValueId, base: ValueId, projection: Projection) {
        if let Some(place) = self.memory.place(base) {
            let place = place.project(projection);
            self.memory.bind_place(dst, place);
        } else {
            self.memory.bind_place(dst, Place::root(PlaceRoot::Opaque(dst)));
        }
    }

    // ── Memory queries ──────────────────────────────────────────────

    pub fn place_of(&self, addr: ValueId) -> Option<&Place> {
        self.memory.place(addr)
    }

    /// The earliest value known to equal `value`.
    pub fn resolve(&self, value: ValueId) -> ValueId {
        self.memory.resolve(value)
    }

    pub fn known_value(&self, addr: ValueId) -> Option<ValueId> {
        self.memory.known_value(addr)
    }

    /// Conservative identity check: same value after forwarding, or
    /// addresses of the same place.
    pub fn are_obviously_same_value(&self, a: ValueId, b: ValueId) -> bool {
        self.memory.are_obviously_same_value(a, b)
    }

    // ── Storage roots ───────────────────────────────────────────────

    pub fn alloc_local(&mut self, decl: DeclId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::AllocLocal { dst, decl });
        self.memory
            .bind_place(dst, Place::root(PlaceRoot::Local(decl)));
        dst
    }

    pub fn global_addr(&mut self, decl: DeclId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::GlobalAddr { dst, decl });
        self.memory
            .bind_place(dst, Place::root(PlaceRoot::Global(decl)));
        dst
    }

    pub fn alloc_temp(&mut self, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::AllocTemp { dst });
        self.memory.bind_place(dst, Place::root(PlaceRoot::Temp(dst)));
        dst
    }

    pub fn dealloc_temp(&mut self, addr: ValueId) {
        self.emit(Inst::DeallocTemp { addr });
        self.memory.invalidate(addr);
    }

    pub fn eval_expr(&mut self, expr: ExprId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::EvalExpr { dst, expr });
        dst
    }

    pub fn integer_literal(&mut self, value: i128, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::IntegerLiteral { dst, value });
        dst
    }

    // ── Access scopes ───────────────────────────────────────────────

    pub fn begin_access(
        &mut self,
        addr: ValueId,
        kind: AccessMarker,
        enforcement: Enforcement,
    ) -> ValueId {
        let dst = self.fresh(self.value_type(addr));
        self.emit(Inst::BeginAccess {
            dst,
            addr,
            kind,
            enforcement,
        });
        if let Some(place) = self.memory.place(addr).cloned() {
            self.memory.bind_place(dst, place);
        }
        dst
    }

    pub fn end_access(&mut self, access: ValueId, aborted: bool) {
        self.emit(Inst::EndAccess { access, aborted });
    }

    pub fn inout_access_instrumentation(&mut self, addr: ValueId) {
        self.emit(Inst::InoutAccessInstrumentation { addr });
    }

    // ── Loads and stores ────────────────────────────────────────────

    pub fn load(&mut self, addr: ValueId, qualifier: LoadQualifier) -> ValueId {
        let ty = self.value_type(addr).map(SilType::object_type);
        let dst = self.fresh(ty);
        self.emit(Inst::Load {
            dst,
            addr,
            qualifier,
        });
        self.memory.load(dst, addr);
        if qualifier == LoadQualifier::Take {
            self.memory.invalidate(addr);
        }
        dst
    }

    pub fn store(&mut self, value: ValueId, addr: ValueId, qualifier: StoreQualifier) {
        self.emit(Inst::Store {
            value,
            addr,
            qualifier,
        });
        self.memory.store(addr, value);
    }

    pub fn copy_addr(&mut self, src: ValueId, dest: ValueId, take: bool, init: bool) {
        self.emit(Inst::CopyAddr {
            src,
            dest,
            take,
            init,
        });
        self.memory.copy(src, dest);
        if take {
            self.memory.invalidate(src);
        }
    }

    pub fn copy_value(&mut self, value: ValueId) -> ValueId {
        let dst = self.fresh(self.value_type(value));
        self.emit(Inst::CopyValue { dst, value });
        self.memory.alias(dst, value);
        dst
    }

    pub fn destroy_value(&mut self, value: ValueId) {
        self.emit(Inst::DestroyValue { value });
    }

    // ── Projections ─────────────────────────────────────────────────

    pub fn struct_element_addr(&mut self, base: ValueId, field: DeclId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::StructElementAddr { dst, base, field });
        self.projected(dst, base, Projection::Field(field));
        dst
    }

    pub fn struct_extract(&mut self, base: ValueId, field: DeclId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::StructExtract { dst, base, field });
        dst
    }

    pub fn tuple_element_addr(&mut self, base: ValueId, index: u32, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::TupleElementAddr { dst, base, index });
        self.projected(dst, base, Projection::Tuple(index));
        dst
    }

    pub fn tuple_extract(&mut self, base: ValueId, index: u32, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::TupleExtract { dst, base, index });
        dst
    }

    pub fn ref_element_addr(&mut self, base: ValueId, field: DeclId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::RefElementAddr { dst, base, field });
        let object = self.memory.resolve(base);
        self.memory.bind_place(
            dst,
            Place::root(PlaceRoot::Object(object)).project(Projection::Field(field)),
        );
        dst
    }

    pub fn precondition_has_value(&mut self, operand: ValueId) {
        self.emit(Inst::PreconditionHasValue { operand });
    }

    /// Payload of an optional; an address for an address operand.
    pub fn optional_payload(&mut self, operand: ValueId, ty: SilType) -> ValueId {
        let is_address = self.value_type(operand).is_some_and(SilType::is_address);
        let ty = if is_address {
            ty.address_type()
        } else {
            ty.object_type()
        };
        let dst = self.fresh(Some(ty));
        self.emit(Inst::OptionalPayload { dst, operand });
        if is_address {
            self.projected(dst, operand, Projection::Payload);
        }
        dst
    }

    // ── Existentials ────────────────────────────────────────────────

    pub fn open_existential_addr(&mut self, addr: ValueId, ty: SilType, mutable: bool) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::OpenExistentialAddr { dst, addr, mutable });
        self.projected(dst, addr, Projection::Opened);
        dst
    }

    /// Address of the value inside an existential box.
    pub fn open_existential_box(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::OpenExistentialBox { dst, value });
        let object = self.memory.resolve(value);
        self.memory.bind_place(
            dst,
            Place::root(PlaceRoot::Object(object)).project(Projection::Opened),
        );
        dst
    }

    pub fn open_existential_ref(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::OpenExistentialRef { dst, value });
        dst
    }

    pub fn open_existential_metatype(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::OpenExistentialMetatype { dst, value });
        dst
    }

    pub fn init_existential_ref(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::InitExistentialRef { dst, value });
        dst
    }

    pub fn init_existential_metatype(&mut self, value: ValueId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::InitExistentialMetatype { dst, value });
        dst
    }

    pub fn reabstract(&mut self, value: ValueId, to: SilType) -> ValueId {
        let dst = self.fresh(Some(to.object_type()));
        self.emit(Inst::Reabstract {
            dst,
            value,
            to: to.repr,
        });
        dst
    }

    /// Representation `value` is currently in, if it is typed.
    pub fn repr_of(&self, value: ValueId) -> Option<LoweredRepr> {
        self.value_type(value).map(|ty| ty.repr)
    }

    // ── Reference storage ───────────────────────────────────────────

    pub fn load_reference(
        &mut self,
        addr: ValueId,
        ownership: ReferenceOwnership,
        ty: SilType,
    ) -> ValueId {
        let dst = self.fresh(Some(ty.object_type()));
        self.emit(Inst::LoadReference {
            dst,
            addr,
            ownership,
        });
        dst
    }

    pub fn store_reference(
        &mut self,
        value: ValueId,
        addr: ValueId,
        ownership: ReferenceOwnership,
        init: bool,
    ) {
        self.emit(Inst::StoreReference {
            value,
            addr,
            ownership,
            init,
        });
        self.memory.invalidate(addr);
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// A mutating accessor may write anything reachable from `self`.
    fn clobber_self(&mut self, callee: Callee, self_arg: Option<ValueId>) {
        let mutates = matches!(
            callee.kind,
            AccessorKind::Set
                | AccessorKind::Modify
                | AccessorKind::MutableAddress
                | AccessorKind::WillSet
                | AccessorKind::DidSet
        );
        let Some(self_arg) = self_arg else {
            return;
        };
        if !mutates {
            return;
        }
        if self.value_type(self_arg).is_some_and(SilType::is_address) {
            self.memory.invalidate(self_arg);
        } else {
            let object = self.memory.resolve(self_arg);
            self.memory.clobber_root(PlaceRoot::Object(object));
        }
    }

    pub fn apply(
        &mut self,
        callee: Callee,
        self_arg: Option<ValueId>,
        args: &[ValueId],
        result_types: &[SilType],
    ) -> SmallVec<[ValueId; 2]> {
        let results: SmallVec<[ValueId; 2]> = result_types
            .iter()
            .map(|&ty| self.fresh(Some(ty.object_type())))
            .collect();
        self.emit(Inst::Apply {
            results: results.clone(),
            callee,
            self_arg,
            args: args.iter().copied().collect(),
        });
        self.clobber_self(callee, self_arg);
        results
    }

    pub fn pointer_to_address(&mut self, pointer: ValueId, ty: SilType) -> ValueId {
        let dst = self.fresh(Some(ty.address_type()));
        self.emit(Inst::PointerToAddress { dst, pointer });
        self.memory
            .bind_place(dst, Place::root(PlaceRoot::Opaque(dst)));
        dst
    }

    /// Start a coroutine accessor; returns its token and yielded values.
    pub fn begin_apply(
        &mut self,
        callee: Callee,
        self_arg: Option<ValueId>,
        args: &[ValueId],
        yield_types: &[SilType],
    ) -> (ValueId, SmallVec<[ValueId; 1]>) {
        let token = self.fresh(None);
        let yields: SmallVec<[ValueId; 1]> = yield_types
            .iter()
            .map(|&ty| self.fresh(Some(ty)))
            .collect();
        self.emit(Inst::BeginApply {
            token,
            yields: yields.clone(),
            callee,
            self_arg,
            args: args.iter().copied().collect(),
        });
        for &value in &yields {
            if self.value_type(value).is_some_and(SilType::is_address) {
                self.memory
                    .bind_place(value, Place::root(PlaceRoot::Opaque(value)));
            }
        }
        self.clobber_self(callee, self_arg);
        (token, yields)
    }

    pub fn end_apply(&mut self, token: ValueId) {
        self.emit(Inst::EndApply { token });
    }

    pub fn abort_apply(&mut self, token: ValueId) {
        self.emit(Inst::AbortApply { token });
    }

    // ── Key paths ───────────────────────────────────────────────────

    pub fn key_path_read(&mut self, dest: ValueId, base: ValueId, key_path: ValueId) {
        self.emit(Inst::KeyPathRead {
            dest,
            base,
            key_path,
        });
        self.memory.invalidate(dest);
    }

    /// Project a writable address; returns `(address, owner)`. The owner is
    /// an untyped handle, like a coroutine token.
    pub fn key_path_project(
        &mut self,
        base: ValueId,
        key_path: ValueId,
        kind: KeyPathKind,
        ty: SilType,
    ) -> (ValueId, ValueId) {
        let addr = self.fresh(Some(ty.address_type()));
        let owner = self.fresh(None);
        self.emit(Inst::KeyPathProject {
            addr,
            owner,
            base,
            key_path,
            kind,
        });
        self.memory
            .bind_place(addr, Place::root(PlaceRoot::Opaque(addr)));
        if self.value_type(base).is_some_and(SilType::is_address) {
            self.memory.invalidate(base);
        } else {
            let object = self.memory.resolve(base);
            self.memory.clobber_root(PlaceRoot::Object(object));
        }
        (addr, owner)
    }
}
