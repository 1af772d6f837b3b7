//! Keel Lvalue - lowering of assignable expressions to access IR.
//!
//! An lvalue expression (`a.b[i]!.c`, `x?.y`, `self.counter`) is lowered
//! in two steps. First it is turned into an [`LValue`]: an ordered path of
//! [`PathComponent`]s, one per storage reference, projection or
//! representation change. Then an [`AccessResolver`] operation consumes the
//! path, emitting the loads, stores, accessor calls and access scope
//! markers the operation needs.
//!
//! # Architecture
//!
//! - [`LValueBuilder`]: expression → [`LValue`], evaluating index and base
//!   rvalues in source order
//! - [`PathComponent`]: physical components produce addresses, logical
//!   ones are read with `get` and written with `set`
//! - [`AccessResolver`]: load, assign, materialize and copy operations
//! - [`FormalEvaluationContext`]: writebacks and scope ends deferred until
//!   the end of the enclosing formal access, run LIFO on normal exit and
//!   on every unwinding or optional-chain exit
//! - [`AccessIrBuilder`]: the instruction stream, with a symbolic memory
//!   model for same-value and disjointness queries
//!
//! # Contract
//!
//! Building and resolving a path happens inside a formal evaluation scope
//! ([`LowerCx::with_formal_scope`]). Malformed input (a non-lvalue
//! expression in lvalue position, a subscript claiming stored storage, a
//! missing accessor) is an internal error and panics.

mod access;
mod builder;
mod component;
mod conflict;
mod cx;
mod formal_eval;
mod ir;
mod lvalue;
mod managed;
mod member;
mod memory;
mod options;
mod resolve;
mod stack;
mod visit;

use std::sync::Once;

pub use access::{AccessMarker, Enforcement, LValueAccessKind, LValueTypeData};
pub use builder::AccessIrBuilder;
pub use component::{
    AccessedStorage, AccessorCall, ComponentKind, IndexArgs, MaterializeAccess, PathComponent,
};
pub use conflict::are_certainly_equal_indices;
pub use cx::LowerCx;
pub use formal_eval::{
    FormalAccess, FormalAccessId, FormalAccessState, FormalAction, FormalEvaluationContext,
    FormalScope, Unwind,
};
pub use ir::{Block, BlockId, Callee, Inst, LoadQualifier, StoreQualifier, Terminator, ValueId};
pub use lvalue::LValue;
pub use managed::{ManagedValue, ValueOwnership};
pub use memory::{MemoryModel, Place, PlaceRoot, Projection};
pub use options::{LValueOptions, LoweringOptions};
pub use resolve::{AccessResolver, AssignSource};
pub use visit::LValueBuilder;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=keel_lvalue=debug` or `RUST_LOG=keel_lvalue=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

#[cfg(test)]
mod test_helpers;
