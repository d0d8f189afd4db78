//! Free-variable analysis: the dominator-walk example pass spec.md §8
//! Scenario E exercises.
//!
//! Grounded in `original_source/src/shady/analysis/free_variables.c`'s
//! `compute_free_variables`: walk the dominator tree rooted at a
//! function, threading a monotonic "already bound or already reported"
//! set through every `Let`, lambda (`Case`), and structured-control
//! branch, reporting a `Variable` the first time it is seen unbound.
//! `scope::build_scope` supplies the dominator tree this walk descends.

use std::collections::HashSet;

use crate::arena::{Arena, NodeId};
use crate::node::Payload;
use crate::scope::{build_scope, Scope};

/// `compute_free_variables(entry) -> Vec<NodeId>` (spec.md §4.7 /
/// `free_variables.c`): every `Variable` referenced in `entry`'s body (or
/// the bodies of anything `entry` dominates) that is not bound by a
/// `Let`, a function/block parameter list, or a lambda (`Case`)
/// parameter list somewhere on the path from `entry` down to that use.
/// Reported in first-use order, each variable reported at most once.
pub fn compute_free_variables(arena: &Arena, entry: NodeId) -> Vec<NodeId> {
    let scope = build_scope(arena, entry);
    let mut ignore: HashSet<NodeId> = HashSet::new();
    let mut free: Vec<NodeId> = Vec::new();
    walk_domtree(arena, &scope, scope.entry(), &mut ignore, &mut free);
    free
}

fn walk_domtree(arena: &Arena, scope: &Scope, idx: usize, ignore: &mut HashSet<NodeId>, free: &mut Vec<NodeId>) {
    let cfnode = scope.node(idx);
    let decl = cfnode.decl;
    let body = match &arena.node(decl).payload {
        Payload::Function { params, body, .. } => {
            ignore.extend(params.iter().copied());
            *body
        }
        Payload::BasicBlock { params, body, .. } => {
            ignore.extend(params.iter().copied());
            *body
        }
        _ => None,
    };
    if let Some(body) = body {
        walk_term(arena, body, ignore, free);
    }
    for &child in &cfnode.children.clone() {
        walk_domtree(arena, scope, child, ignore, free);
    }
}

/// Walks a chain of terminators (the body of a function, block, or
/// lambda), threading `ignore`/`free` through every `Let` binding on the
/// way to the tail.
fn walk_term(arena: &Arena, id: NodeId, ignore: &mut HashSet<NodeId>, free: &mut Vec<NodeId>) {
    match &arena.node(id).payload {
        Payload::Let {
            instruction,
            variables,
            tail,
            ..
        } => {
            let instruction = *instruction;
            let tail = *tail;
            visit_node(arena, instruction, ignore, free);
            ignore.extend(variables.iter().copied());
            walk_term(arena, tail, ignore, free);
        }
        Payload::Yield { args }
        | Payload::Return { args }
        | Payload::MergeBreak { args }
        | Payload::MergeContinue { args } => {
            for &arg in &args.clone() {
                visit_node(arena, arg, ignore, free);
            }
        }
        Payload::TailCall { target, args } => {
            let target = *target;
            let args = args.clone();
            visit_node(arena, target, ignore, free);
            for arg in args {
                visit_node(arena, arg, ignore, free);
            }
        }
        Payload::Join { join_point, args } => {
            let join_point = *join_point;
            let args = args.clone();
            visit_node(arena, join_point, ignore, free);
            for arg in args {
                visit_node(arena, arg, ignore, free);
            }
        }
        Payload::Unreachable => {}
        _ => {}
    }
}

/// Enters a lambda (`Case`): binds its params into `ignore`, then walks
/// its body as a terminator chain. Lambdas share the enclosing
/// dominator-tree scope rather than introducing a new `CfNode` — they
/// cannot themselves contain a jump, only structured control.
fn visit_case(arena: &Arena, case: NodeId, ignore: &mut HashSet<NodeId>, free: &mut Vec<NodeId>) {
    let (params, body) = match &arena.node(case).payload {
        Payload::Case { params, body } => (params.clone(), *body),
        _ => return,
    };
    ignore.extend(params);
    if let Some(body) = body {
        walk_term(arena, body, ignore, free);
    }
}

/// Visits a value or instruction appearing as an operand: reports
/// unbound `Variable`s, recurses through composite/structured-control
/// shapes, and treats nominal references (`FnAddr`, `DeclRef`) and
/// literals as leaves.
fn visit_node(arena: &Arena, id: NodeId, ignore: &mut HashSet<NodeId>, free: &mut Vec<NodeId>) {
    match &arena.node(id).payload {
        Payload::Variable { .. } => {
            if ignore.insert(id) {
                free.push(id);
            }
        }
        Payload::PrimOpInst { operands, .. } => {
            for &op in &operands.clone() {
                visit_node(arena, op, ignore, free);
            }
        }
        Payload::Call { callee, args } => {
            let callee = *callee;
            let args = args.clone();
            visit_node(arena, callee, ignore, free);
            for arg in args {
                visit_node(arena, arg, ignore, free);
            }
        }
        Payload::Control { inside } => {
            visit_case(arena, *inside, ignore, free);
        }
        Payload::Block { inside, .. } => {
            walk_term(arena, *inside, ignore, free);
        }
        Payload::If {
            condition,
            if_true,
            if_false,
            ..
        } => {
            let condition = *condition;
            let if_true = *if_true;
            let if_false = *if_false;
            visit_node(arena, condition, ignore, free);
            visit_case(arena, if_true, ignore, free);
            if let Some(if_false) = if_false {
                visit_case(arena, if_false, ignore, free);
            }
        }
        Payload::Match {
            inspect,
            cases,
            default_case,
            ..
        } => {
            let inspect = *inspect;
            let cases = cases.clone();
            let default_case = *default_case;
            visit_node(arena, inspect, ignore, free);
            for case in cases {
                visit_case(arena, case, ignore, free);
            }
            visit_case(arena, default_case, ignore, free);
        }
        Payload::Loop {
            initial_args, body, ..
        } => {
            let initial_args = initial_args.clone();
            let body = *body;
            for arg in initial_args {
                visit_node(arena, arg, ignore, free);
            }
            visit_case(arena, body, ignore, free);
        }
        Payload::Composite { elements, .. } | Payload::Tuple { elements } => {
            for &el in &elements.clone() {
                visit_node(arena, el, ignore, free);
            }
        }
        // Nominal references and leaf values never carry a free variable
        // of their own; a `Function`/`BasicBlock` reached this way is a
        // global, not a use needing capture.
        Payload::FnAddr { .. }
        | Payload::DeclRef { .. }
        | Payload::NullPtr { .. }
        | Payload::Undef { .. }
        | Payload::IntLiteral { .. }
        | Payload::FloatLiteral { .. }
        | Payload::BoolLiteral(_)
        | Payload::StringLiteral(_) => {}
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::builder::BodyBuilder;
    use crate::instruction::make_return;
    use crate::module::Module;
    use crate::node::IntWidth;
    use crate::primop::PrimOp;
    use crate::types::make_int_type;
    use crate::value::make_variable;

    #[test]
    fn variable_bound_outside_the_function_is_free() {
        let mut module = Module::new("test", Arena::new(ArenaConfig::default()));
        let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
        let outer = make_variable(module.arena_mut(), None, Some(i32_ty));

        let func = module.declare_function("uses_outer", vec![], vec![], vec![i32_ty]);
        let mut bb = BodyBuilder::begin();
        let add = crate::instruction::make_prim_op(module.arena_mut(), PrimOp::Add, vec![], vec![outer, outer]);
        let vars = bb.bind_instruction(module.arena_mut(), add, &[i32_ty]);
        let ret = make_return(module.arena_mut(), vars);
        let body = bb.finish(module.arena_mut(), ret);
        module.set_function_body(func, body);

        let free = compute_free_variables(module.arena(), func);
        assert_eq!(free, vec![outer]);
    }

    #[test]
    fn function_parameters_are_never_free() {
        let mut module = Module::new("test", Arena::new(ArenaConfig::default()));
        let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
        let func = module.declare_function("identity", vec![], vec![i32_ty], vec![i32_ty]);
        let param = match &module.arena().node(func).payload {
            Payload::Function { params, .. } => params[0],
            _ => unreachable!(),
        };
        let ret = make_return(module.arena_mut(), vec![param]);
        module.set_function_body(func, ret);

        let free = compute_free_variables(module.arena(), func);
        assert!(free.is_empty());
    }

    #[test]
    fn let_bound_variable_is_not_reported() {
        let mut module = Module::new("test", Arena::new(ArenaConfig::default()));
        let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
        let func = module.declare_function("shadows", vec![], vec![], vec![i32_ty]);
        let lit = crate::value::make_int_literal(module.arena_mut(), IntWidth::W32, 7, i32_ty);

        let mut bb = BodyBuilder::begin();
        let quote = crate::instruction::make_prim_op(module.arena_mut(), PrimOp::Quote, vec![], vec![lit]);
        let vars = bb.bind_instruction(module.arena_mut(), quote, &[i32_ty]);
        let ret = make_return(module.arena_mut(), vars.clone());
        let body = bb.finish(module.arena_mut(), ret);
        module.set_function_body(func, body);

        let free = compute_free_variables(module.arena(), func);
        assert!(free.is_empty());
    }
}
