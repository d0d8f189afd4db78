//! Rewrite framework: substitution, recreation, and cycle-safe dispatch.
//!
//! Grounded in `original_source/src/shady/fold.c`'s `reduce_beta`, which
//! drives substitution through a generic rewriter rather than a bespoke
//! walk. A [`Rewriter`] carries a processed-node cache keyed by source
//! `NodeId`; [`Rewriter::register_processed`] must be called *before*
//! descending into a nominal node's body so a cycle back to that node
//! (e.g. a recursive function referencing itself) finds the
//! already-registered placeholder instead of looping forever.

use std::collections::HashMap;

use crate::arena::{Arena, NodeId};
use crate::node::{Node, NodeTag, Payload};

/// Per-run state for a rewrite pass: the destination arena and a cache
/// from source handle to rewritten handle.
pub struct Rewriter<'a> {
    pub dst: &'a mut Arena,
    processed: HashMap<NodeId, NodeId>,
}

impl<'a> Rewriter<'a> {
    pub fn new(dst: &'a mut Arena) -> Self {
        Self {
            dst,
            processed: HashMap::new(),
        }
    }

    /// Pre-seed the cache for `source`, e.g. with a freshly allocated
    /// placeholder for a nominal node whose body has not been rewritten
    /// yet. Descending into that body and hitting `source` again (a
    /// recursive reference) resolves to `target` instead of recursing.
    pub fn register_processed(&mut self, source: NodeId, target: NodeId) {
        self.processed.insert(source, target);
    }

    pub fn already_processed(&self, source: NodeId) -> Option<NodeId> {
        self.processed.get(&source).copied()
    }

    /// `rewrite_node(rewriter, src_arena, id, dispatch) -> NodeId`
    /// (spec.md §4.6): looks up the cache first; on a miss, calls
    /// `dispatch` to produce the rewritten node and caches the result
    /// before returning it. Nominal nodes are expected to have called
    /// [`Self::register_processed`] themselves, from inside `dispatch`,
    /// before recursing into their own body — this entry point only
    /// protects against re-rewriting an already-finished node twice.
    pub fn rewrite_node(
        &mut self,
        src: &Arena,
        id: NodeId,
        dispatch: impl FnOnce(&mut Self, &Arena, NodeId) -> NodeId,
    ) -> NodeId {
        if let Some(&done) = self.processed.get(&id) {
            return done;
        }
        let result = dispatch(self, src, id);
        self.processed.insert(id, result);
        result
    }

    /// Rewrites a list of operand handles, threading `self` through each.
    pub fn rewrite_all(
        &mut self,
        src: &Arena,
        ids: &[NodeId],
        mut dispatch: impl FnMut(&mut Self, &Arena, NodeId) -> NodeId,
    ) -> Vec<NodeId> {
        ids.iter()
            .map(|&id| self.rewrite_node(src, id, |rw, src, id| dispatch(rw, src, id)))
            .collect()
    }
}

/// A substitution map from source `Variable` handles to replacement
/// handles (already belonging to the destination arena), applied by
/// [`substitute`]. This is `reduce_beta`'s core: replace every occurrence
/// of a bound parameter with the corresponding call argument.
pub type Substitution = HashMap<NodeId, NodeId>;

/// `substitute(dst_arena, src_arena, node, subst) -> NodeId` (spec.md
/// §4.6 "Substituter specialization"): rewrites `node` (and everything it
/// structurally contains) by replacing any `Variable` present as a key in
/// `subst` with its mapped value, and otherwise recreating each
/// structural node in `dst_arena` with its rewritten operands.
/// Non-substituted `Variable`s and nominal declarations pass through
/// unchanged (by handle, since nominal identity is not copied across
/// arenas by this function — see `SPEC_FULL.md` §3.1).
pub fn substitute(dst: &mut Arena, src: &Arena, node: NodeId, subst: &Substitution) -> NodeId {
    let mut rw = Rewriter::new(dst);
    for (&k, &v) in subst {
        rw.register_processed(k, v);
    }
    rewrite_structural(&mut rw, src, node)
}

/// Recreates `id`'s node in `rw.dst`, recursively rewriting every operand
/// `NodeId` it carries, threading the rewriter's cache so shared operands
/// are only rebuilt once and nominal self-references terminate.
fn rewrite_structural(rw: &mut Rewriter, src: &Arena, id: NodeId) -> NodeId {
    rw.rewrite_node(src, id, |rw, src, id| {
        let node = src.node(id);
        if crate::node::is_nominal(node.tag) {
            // Nominal nodes outside the substitution map keep their
            // source identity: copying one across arenas would forge a
            // second, distinct nominal node with the same meaning.
            return id;
        }
        recreate_node(rw, src, node)
    })
}

/// `recreate_node(rewriter, src_arena, node) -> NodeId` (spec.md §4.6):
/// rebuilds one structural node's payload with every `NodeId` operand
/// rewritten, then interns the result the same way its original
/// constructor would have.
fn recreate_node(rw: &mut Rewriter, src: &Arena, node: &Node) -> NodeId {
    macro_rules! rec {
        ($id:expr) => {
            rewrite_structural(rw, src, $id)
        };
    }
    macro_rules! rec_opt {
        ($id:expr) => {
            $id.map(|inner| rewrite_structural(rw, src, inner))
        };
    }
    macro_rules! rec_vec {
        ($ids:expr) => {
            $ids.iter().map(|&x| rewrite_structural(rw, src, x)).collect()
        };
    }

    match &node.payload {
        Payload::IntType { width, signed } => crate::types::make_int_type(rw.dst, *width, *signed),
        Payload::FloatType { width } => crate::types::make_float_type(rw.dst, *width),
        Payload::BoolType => crate::types::make_bool_type(rw.dst),
        Payload::MaskType => crate::types::make_mask_type(rw.dst),
        Payload::PtrType {
            pointee,
            address_space,
        } => {
            let pointee = rec!(*pointee);
            crate::types::make_ptr_type(rw.dst, pointee, *address_space)
        }
        Payload::ArrayType { element, length } => {
            let element = rec!(*element);
            let length = rec_opt!(length);
            crate::types::make_array_type(rw.dst, element, length)
        }
        Payload::PackType { element, width } => {
            let element = rec!(*element);
            crate::types::make_pack_type(rw.dst, element, *width)
        }
        Payload::RecordType {
            members,
            names,
            decorated,
        } => {
            let members = rec_vec!(members);
            crate::types::make_record_type(rw.dst, members, names.clone(), *decorated)
        }
        Payload::FnType {
            is_basic_block,
            param_types,
            return_types,
        } => {
            let param_types = rec_vec!(param_types);
            let return_types = rec_vec!(return_types);
            crate::types::make_fn_type(rw.dst, *is_basic_block, param_types, return_types)
        }
        Payload::QualifiedType { inner, is_uniform } => {
            let inner = rec!(*inner);
            crate::types::make_qualified_type(rw.dst, inner, *is_uniform)
        }
        Payload::JoinPointType { param_types } => {
            let param_types = rec_vec!(param_types);
            crate::types::make_join_point_type(rw.dst, param_types)
        }
        Payload::DeclRefType { decl } => {
            // Declarations are nominal; referencing one never copies it.
            crate::types::make_decl_ref_type(rw.dst, *decl)
        }

        Payload::IntLiteral { width, value } => {
            let ty = node.ty.map(|t| rec!(t)).unwrap_or_else(|| {
                crate::types::make_int_type(rw.dst, *width, true)
            });
            crate::value::make_int_literal(rw.dst, *width, *value, ty)
        }
        Payload::FloatLiteral { width, bits } => {
            let ty = node.ty.map(|t| rec!(t)).unwrap_or_else(|| {
                crate::types::make_float_type(rw.dst, *width)
            });
            crate::value::make_float_literal(rw.dst, *width, *bits, ty)
        }
        Payload::BoolLiteral(v) => {
            let ty = node
                .ty
                .map(|t| rec!(t))
                .unwrap_or_else(|| crate::types::make_bool_type(rw.dst));
            crate::value::make_bool_literal(rw.dst, *v, ty)
        }
        Payload::StringLiteral(sym) => crate::value::make_string_literal(rw.dst, *sym),
        Payload::NullPtr { ty } => {
            let ty = rec!(*ty);
            crate::value::make_null_ptr(rw.dst, ty)
        }
        Payload::Undef { ty } => {
            let ty = rec!(*ty);
            crate::value::make_undef(rw.dst, ty)
        }
        Payload::Composite { ty, elements } => {
            let ty = rec!(*ty);
            let elements = rec_vec!(elements);
            crate::value::make_composite(rw.dst, ty, elements)
        }
        Payload::Tuple { elements } => {
            let elements = rec_vec!(elements);
            let ty = node.ty.map(|t| rec!(t));
            crate::value::make_tuple(rw.dst, elements, ty)
        }
        Payload::Variable { .. } => {
            // Unmapped variable: free in this rewrite, keep the source
            // identity (the caller is responsible for closing over it,
            // e.g. by running this rewrite inside the destination arena
            // that already owns it).
            unreachable!("rewrite_structural short-circuits Variable before recreate_node")
        }
        Payload::FnAddr { func } => crate::value::make_fn_addr(rw.dst, *func),
        Payload::DeclRef { decl } => crate::value::make_decl_ref(rw.dst, *decl),

        Payload::PrimOpInst {
            op,
            type_args,
            operands,
        } => {
            let type_args = rec_vec!(type_args);
            let operands = rec_vec!(operands);
            crate::instruction::make_prim_op(rw.dst, *op, type_args, operands)
        }
        Payload::Call { callee, args } => {
            let callee = rec!(*callee);
            let args = rec_vec!(args);
            crate::instruction::make_call(rw.dst, callee, args)
        }
        Payload::Control { inside } => {
            let inside = rec!(*inside);
            crate::instruction::make_control(rw.dst, inside)
        }
        Payload::Block {
            yield_types,
            inside,
        } => {
            let yield_types = rec_vec!(yield_types);
            let inside = rec!(*inside);
            crate::instruction::make_block(rw.dst, yield_types, inside)
        }
        Payload::If {
            condition,
            yield_types,
            if_true,
            if_false,
        } => {
            let condition = rec!(*condition);
            let yield_types = rec_vec!(yield_types);
            let if_true = rec!(*if_true);
            let if_false = rec_opt!(if_false);
            crate::instruction::make_if(rw.dst, condition, yield_types, if_true, if_false)
        }
        Payload::Match {
            inspect,
            yield_types,
            literals,
            cases,
            default_case,
        } => {
            let inspect = rec!(*inspect);
            let yield_types = rec_vec!(yield_types);
            let literals = rec_vec!(literals);
            let cases = rec_vec!(cases);
            let default_case = rec!(*default_case);
            crate::instruction::make_match(rw.dst, inspect, yield_types, literals, cases, default_case)
        }
        Payload::Loop {
            yield_types,
            initial_args,
            body,
        } => {
            let yield_types = rec_vec!(yield_types);
            let initial_args = rec_vec!(initial_args);
            let body = rec!(*body);
            crate::instruction::make_loop(rw.dst, yield_types, initial_args, body)
        }

        Payload::Yield { args } => {
            let args = rec_vec!(args);
            crate::instruction::make_yield(rw.dst, args)
        }
        Payload::Let {
            instruction,
            variables,
            tail,
            is_mutable,
        } => {
            let instruction = rec!(*instruction);
            // variables are nominal: each rewrites to either its
            // substitution target or, absent one, a fresh variable in
            // the destination arena carrying the same name hint/type.
            let variables = variables
                .iter()
                .map(|&v| {
                    if let Some(mapped) = rw.already_processed(v) {
                        mapped
                    } else if let Payload::Variable { name_hint, .. } = &src.node(v).payload {
                        let ty = src.node(v).ty.map(|t| rewrite_structural(rw, src, t));
                        crate::value::make_variable(rw.dst, *name_hint, ty)
                    } else {
                        unreachable!("Let binds only Variable nodes")
                    }
                })
                .collect::<Vec<_>>();
            let tail = rewrite_structural(rw, src, *tail);
            crate::instruction::make_let(rw.dst, instruction, variables, tail, *is_mutable)
        }

        Payload::TailCall { target, args } => {
            let target = rec!(*target);
            let args = rec_vec!(args);
            crate::instruction::make_tail_call(rw.dst, target, args)
        }
        Payload::Join { join_point, args } => {
            let join_point = rec!(*join_point);
            let args = rec_vec!(args);
            crate::instruction::make_join(rw.dst, join_point, args)
        }
        Payload::Return { args } => {
            let args = rec_vec!(args);
            crate::instruction::make_return(rw.dst, args)
        }
        Payload::MergeBreak { args } => {
            let args = rec_vec!(args);
            crate::instruction::make_merge_break(rw.dst, args)
        }
        Payload::MergeContinue { args } => {
            let args = rec_vec!(args);
            crate::instruction::make_merge_continue(rw.dst, args)
        }
        Payload::Unreachable => crate::instruction::make_unreachable(rw.dst),

        Payload::Function { .. }
        | Payload::Constant { .. }
        | Payload::GlobalVariable { .. }
        | Payload::BasicBlock { .. }
        | Payload::Case { .. } => {
            unreachable!("rewrite_structural short-circuits nominal declarations before recreate_node")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::node::IntWidth;
    use crate::types::make_int_type;
    use crate::value::make_int_literal;

    #[test]
    fn substitute_replaces_mapped_variable() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let param = crate::value::make_variable(&mut arena, None, Some(i32_ty));
        let replacement = make_int_literal(&mut arena, IntWidth::W32, 7, i32_ty);

        let body = crate::instruction::make_prim_op(
            &mut arena,
            crate::primop::PrimOp::Add,
            vec![],
            vec![param, param],
        );

        let mut subst = Substitution::new();
        subst.insert(param, replacement);
        let snapshot = arena.clone();
        let rewritten = substitute(&mut arena, &snapshot, body, &subst);

        match &arena.node(rewritten).payload {
            Payload::PrimOpInst { operands, .. } => {
                assert_eq!(operands, &vec![replacement, replacement]);
            }
            other => panic!("expected PrimOpInst, got {other:?}"),
        }
    }
}
