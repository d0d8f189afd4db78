//! Body builder: accumulates straight-line instructions and threads them
//! into a `Let`-chain on `finish`.
//!
//! Grounded in `original_source/src/shady/body_builder.c`: `begin_body`
//! opens an accumulator, each `bind_instruction*` call records one
//! `(instruction, result variables)` entry, and `finish_body` pops the
//! entries in reverse, wrapping each remaining tail in a `Let` built via
//! `make_let` — precisely `fold_let`'s quote/beta-reduction concerns
//! aside, a right fold over the recorded entries. `finish_body` itself
//! never calls `fold.c`'s `fold_let`; that happens when `make_let`
//! re-enters the arena's constructor path with `allow_fold` set
//! (`fold.rs`).

use crate::arena::{Arena, NodeId, Sym};
use crate::diagnostics::{CompileError, CompileResult};
use crate::instruction::{make_let, make_yield};
use crate::node::Payload;
use crate::value::make_variable;

struct Entry {
    instruction: NodeId,
    variables: Vec<NodeId>,
    is_mutable: bool,
}

/// Accumulates instructions for one straight-line region. Dropped (via
/// [`BodyBuilder::cancel`]) without ever producing a node if the region
/// turns out to be unreachable or is abandoned mid-construction.
pub struct BodyBuilder {
    entries: Vec<Entry>,
    finished: bool,
}

impl BodyBuilder {
    /// `begin_body(arena) -> BodyBuilder` (spec.md §4.5). Takes no arena
    /// reference of its own — every method borrows the arena you pass it,
    /// mirroring `body_builder.c`'s `BodyBuilder` being a thin accumulator
    /// rather than an arena owner.
    pub fn begin() -> Self {
        Self {
            entries: Vec::new(),
            finished: false,
        }
    }

    /// `bind_instruction(builder, arena, instruction, result_types) ->
    /// Vec<NodeId>` (spec.md §4.5): records the instruction and returns
    /// one fresh `Variable` per declared result type.
    pub fn bind_instruction(
        &mut self,
        arena: &mut Arena,
        instruction: NodeId,
        result_types: &[NodeId],
    ) -> Vec<NodeId> {
        self.bind_instruction_named(arena, instruction, result_types, &[])
    }

    /// Like [`Self::bind_instruction`] but attaches a name hint to each
    /// produced variable (`hints[i]`, if present, names result `i`).
    pub fn bind_instruction_named(
        &mut self,
        arena: &mut Arena,
        instruction: NodeId,
        result_types: &[NodeId],
        hints: &[Sym],
    ) -> Vec<NodeId> {
        let variables: Vec<NodeId> = result_types
            .iter()
            .enumerate()
            .map(|(i, &ty)| make_variable(arena, hints.get(i).copied(), Some(ty)))
            .collect();
        self.entries.push(Entry {
            instruction,
            variables: variables.clone(),
            is_mutable: false,
        });
        variables
    }

    /// `bind(builder, arena, instruction) -> CompileResult<Vec<NodeId>>`
    /// (spec.md §4.5): infers the single result's type from the
    /// instruction's own `ty` field instead of requiring the caller to
    /// repeat it. Only available once construction has populated `ty` —
    /// i.e. `check_types` was set when `instruction` was built, and its
    /// kind is one `instruction::make_prim_op`/`make_call` actually infer
    /// a type for.
    pub fn bind(&mut self, arena: &mut Arena, instruction: NodeId) -> CompileResult<Vec<NodeId>> {
        let ty = arena.node(instruction).ty.ok_or_else(|| {
            CompileError::structural(
                "BB002",
                "cannot infer result type: instruction carries no type",
                crate::diagnostics::Location::at(instruction),
            )
        })?;
        Ok(self.bind_instruction(arena, instruction, &[ty]))
    }

    /// Binds zero-result instructions run purely for side effect (e.g. a
    /// `store` PrimOp).
    pub fn bind_instruction_void(&mut self, instruction: NodeId) {
        self.entries.push(Entry {
            instruction,
            variables: Vec::new(),
            is_mutable: false,
        });
    }

    /// Binds pre-existing variables (rather than fresh ones) to an
    /// instruction, used when rebuilding a body under substitution where
    /// the result identities must be preserved.
    pub fn bind_existing_vars(
        &mut self,
        instruction: NodeId,
        variables: Vec<NodeId>,
        is_mutable: bool,
    ) {
        self.entries.push(Entry {
            instruction,
            variables,
            is_mutable,
        });
    }

    /// `finish_body(builder, arena, terminator) -> NodeId` (spec.md §4.5):
    /// folds the recorded entries, innermost-last, into nested `Let`
    /// nodes terminating in `terminator`.
    pub fn finish(mut self, arena: &mut Arena, terminator: NodeId) -> NodeId {
        self.finished = true;
        let mut tail = terminator;
        for entry in self.entries.drain(..).rev() {
            tail = make_let(arena, entry.instruction, entry.variables, tail, entry.is_mutable);
        }
        tail
    }

    /// `finish_and_wrap_as_block(builder, arena, yield_types, yield_args)
    /// -> NodeId` (spec.md §4.5): terminates the chain with a `Yield` and
    /// wraps it in a `Block` carrying the declared yield types — distinct
    /// from `Control`, which wraps a join-point-capturing `Case` instead
    /// (`SPEC_FULL.md` §4).
    pub fn finish_and_wrap_as_block(
        self,
        arena: &mut Arena,
        yield_types: Vec<NodeId>,
        yield_args: Vec<NodeId>,
    ) -> NodeId {
        let yield_node = make_yield(arena, yield_args);
        let inside = self.finish(arena, yield_node);
        crate::instruction::make_block(arena, yield_types, inside)
    }

    /// `cancel_body(builder)` (spec.md §4.5): discards the accumulated
    /// entries without constructing anything. Useful when a caller starts
    /// speculatively building a region and decides to discard it.
    pub fn cancel(mut self) {
        self.finished = true;
        self.entries.clear();
    }

    /// Checks that every recorded instruction is in fact an instruction
    /// node (defends against a caller binding a terminator by mistake).
    pub fn validate(&self, arena: &Arena) -> CompileResult<()> {
        for entry in &self.entries {
            if !arena.node(entry.instruction).is_instruction() {
                return Err(CompileError::structural(
                    "BB001",
                    "body builder entry is not an instruction node",
                    crate::diagnostics::Location::at(entry.instruction),
                ));
            }
        }
        Ok(())
    }
}

impl Drop for BodyBuilder {
    fn drop(&mut self) {
        debug_assert!(
            self.finished || self.entries.is_empty(),
            "BodyBuilder dropped with unfinished entries — call finish() or cancel()"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::instruction::make_prim_op;
    use crate::node::IntWidth;
    use crate::primop::PrimOp;
    use crate::types::make_int_type;
    use crate::value::make_int_literal;

    #[test]
    fn finish_threads_entries_into_nested_lets() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let one = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);

        let mut builder = BodyBuilder::begin();
        let add = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![one, one]);
        let vars = builder.bind_instruction(&mut arena, add, &[i32_ty]);
        let ret = crate::instruction::make_return(&mut arena, vars.clone());
        let chain = builder.finish(&mut arena, ret);

        match &arena.node(chain).payload {
            Payload::Let {
                instruction,
                variables,
                tail,
                ..
            } => {
                assert_eq!(*instruction, add);
                assert_eq!(variables, &vars);
                assert_eq!(*tail, ret);
            }
            other => panic!("expected Let, got {other:?}"),
        }
    }

    #[test]
    fn bind_infers_result_type_from_instruction() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let one = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);

        let mut builder = BodyBuilder::begin();
        // check_types is on by default, so make_prim_op already populates
        // ty for a same-type Add — no explicit result_types needed.
        let add = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![one, one]);
        let vars = builder.bind(&mut arena, add).unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(arena.node(vars[0]).ty, Some(i32_ty));
    }

    #[test]
    fn bind_rejects_untyped_instruction() {
        let mut arena = Arena::new(ArenaConfig {
            check_types: false,
            allow_fold: true,
        });
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let one = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        let mut builder = BodyBuilder::begin();
        let add = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![one, one]);
        assert!(builder.bind(&mut arena, add).is_err());
        builder.cancel();
    }

    #[test]
    fn cancel_drops_without_constructing() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let len_before = arena.len();
        let mut builder = BodyBuilder::begin();
        let add = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![]);
        builder.bind_instruction(&mut arena, add, &[i32_ty]);
        builder.cancel();
        // the add instruction and the variable it produced were still
        // allocated; cancel only drops the bookkeeping, not the arena's
        // already-interned nodes.
        assert!(arena.len() > len_before);
    }
}
