//! Cached symbol names for one compilation.

use std::cell::RefCell;

use keel_ir::Program;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{LinkEntity, Mangler};

/// Maps link entities to their symbol names.
///
/// Names are a pure function of the entity and the program, so they are
/// computed once and cached for the rest of the compilation.
pub struct SymbolEncoder<'p> {
    program: &'p Program,
    cache: RefCell<FxHashMap<LinkEntity, String>>,
}

impl<'p> SymbolEncoder<'p> {
    pub fn new(program: &'p Program) -> Self {
        SymbolEncoder {
            program,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// The linker-visible symbol name of `entity`.
    pub fn encode(&self, entity: &LinkEntity) -> String {
        if let Some(name) = self.cache.borrow().get(entity) {
            return name.clone();
        }

        let name = match *entity {
            LinkEntity::SilFunction(function) => self.program.name_str(function.name).to_string(),
            LinkEntity::SilGlobalVariable(global) => self.program.name_str(global.name).to_string(),
            _ => Mangler::new(self.program).mangle_entity(entity),
        };
        debug!(kind = %entity.kind(), symbol = %name.escape_debug(), "encoded link entity");
        self.cache.borrow_mut().insert(*entity, name.clone());
        name
    }

    /// Number of distinct entities named so far.
    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }
}
