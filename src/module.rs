//! Top-level module: the arena plus an ordered list of declarations.
//!
//! Grounded in `lumina-ir::module::Module` (owns the arena-adjacent
//! tables a crate of this kind accumulates and keeps declarations in
//! source order) generalized to this crate's single `Arena`: a `Module`
//! here is a thin wrapper recording declaration order and a name, since
//! the arena already owns every node.

use crate::arena::{Arena, NodeId, Sym};
use crate::node::{AddressSpace, Annotation, Node, NodeTag, Payload};

/// A compilation unit: one arena plus the ordered list of top-level
/// declarations it holds (spec.md §3.2).
#[derive(Debug)]
pub struct Module {
    name: String,
    arena: Arena,
    declarations: Vec<NodeId>,
}

impl Module {
    pub fn new(name: impl Into<String>, arena: Arena) -> Self {
        Self {
            name: name.into(),
            arena,
            declarations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    pub fn declarations(&self) -> &[NodeId] {
        &self.declarations
    }

    /// Resolve a declaration by name, in source order. Used by passes
    /// (`passes::tailcall`) that need to look up a pre-declared runtime
    /// helper function by its name rather than by handle.
    pub fn find_declaration(&self, name: &str) -> Option<NodeId> {
        self.declarations.iter().copied().find(|&id| {
            declaration_name(&self.arena, id)
                .map(|sym| self.arena.resolve_string(sym) == name)
                .unwrap_or(false)
        })
    }

    /// `declare_function(module, name, annotations, param_types,
    /// return_types) -> NodeId` (spec.md §4.6): creates the nominal
    /// `Function` declaration with no body, registers it in source
    /// order, and returns its handle so a body can be attached later via
    /// [`Self::set_function_body`].
    pub fn declare_function(
        &mut self,
        name: impl AsRef<str>,
        annotations: Vec<Annotation>,
        param_types: Vec<NodeId>,
        return_types: Vec<NodeId>,
    ) -> NodeId {
        let name = self.arena.intern_string(name);
        let params: Vec<NodeId> = param_types
            .into_iter()
            .map(|ty| crate::value::make_variable(&mut self.arena, None, Some(ty)))
            .collect();
        let id = self.arena.alloc(Node {
            tag: NodeTag::Function,
            ty: None,
            payload: Payload::Function {
                name,
                annotations,
                params,
                return_types,
                body: None,
            },
        });
        self.declarations.push(id);
        id
    }

    /// Fills in a declared function's body exactly once (the nominal
    /// mutation window, spec.md §9).
    pub fn set_function_body(&mut self, function: NodeId, body: NodeId) {
        if let Payload::Function { body: slot, .. } = &mut self.arena.node_mut(function).payload {
            *slot = Some(body);
        }
    }

    pub fn declare_constant(
        &mut self,
        name: impl AsRef<str>,
        annotations: Vec<Annotation>,
        type_hint: Option<NodeId>,
        value: Option<NodeId>,
    ) -> NodeId {
        let name = self.arena.intern_string(name);
        let id = self.arena.alloc(Node {
            tag: NodeTag::Constant,
            ty: None,
            payload: Payload::Constant {
                name,
                annotations,
                type_hint,
                value,
            },
        });
        self.declarations.push(id);
        id
    }

    pub fn declare_global_variable(
        &mut self,
        name: impl AsRef<str>,
        annotations: Vec<Annotation>,
        ty: NodeId,
        address_space: AddressSpace,
        init: Option<NodeId>,
    ) -> NodeId {
        let name = self.arena.intern_string(name);
        let id = self.arena.alloc(Node {
            tag: NodeTag::GlobalVariable,
            ty: None,
            payload: Payload::GlobalVariable {
                name,
                annotations,
                ty,
                address_space,
                init,
            },
        });
        self.declarations.push(id);
        id
    }

    /// `declare_basic_block(module, name, params) -> NodeId`: a nominal
    /// first-class basic block, body attached later the same way as a
    /// function's.
    pub fn declare_basic_block(&mut self, name: impl AsRef<str>, params: Vec<NodeId>) -> NodeId {
        let name = self.arena.intern_string(name);
        self.arena.alloc(Node {
            tag: NodeTag::BasicBlock,
            ty: None,
            payload: Payload::BasicBlock {
                name,
                params,
                body: None,
            },
        })
    }

    pub fn set_basic_block_body(&mut self, block: NodeId, body: NodeId) {
        if let Payload::BasicBlock { body: slot, .. } = &mut self.arena.node_mut(block).payload {
            *slot = Some(body);
        }
    }

    /// A `Case` is the anonymous-lambda continuation a `Control` node
    /// wraps (`SPEC_FULL.md` §4) — nominal, but never registered among
    /// the module's top-level declarations.
    pub fn make_case(&mut self, params: Vec<NodeId>) -> NodeId {
        self.arena.alloc(Node {
            tag: NodeTag::Case,
            ty: None,
            payload: Payload::Case { params, body: None },
        })
    }

    pub fn set_case_body(&mut self, case: NodeId, body: NodeId) {
        if let Payload::Case { body: slot, .. } = &mut self.arena.node_mut(case).payload {
            *slot = Some(body);
        }
    }
}

fn declaration_name(arena: &Arena, id: NodeId) -> Option<Sym> {
    match &arena.node(id).payload {
        Payload::Function { name, .. }
        | Payload::Constant { name, .. }
        | Payload::GlobalVariable { name, .. }
        | Payload::BasicBlock { name, .. } => Some(*name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;

    #[test]
    fn find_declaration_resolves_by_name() {
        let mut module = Module::new("test", Arena::new(ArenaConfig::default()));
        module.declare_function("builtin_fork", vec![], vec![], vec![]);
        assert!(module.find_declaration("builtin_fork").is_some());
        assert!(module.find_declaration("builtin_join").is_none());
    }
}
