//! Instruction and terminator constructors and checkers.
//!
//! Structural tags only — `Let` is the sole terminator with a nominal-ish
//! wrinkle (its bound `Variable`s are nominal even though `Let` itself is
//! hash-consed on `instruction`+`variables`, per `SPEC_FULL.md` §4).

use crate::arena::{Arena, NodeId};
use crate::diagnostics::{CompileError, CompileResult, Location};
use crate::node::{self, Node, NodeTag, Payload};
use crate::primop::PrimOp;
use crate::types;
use crate::value::bind_variable_origin;

// ---------------------------------------------------------------- Instructions

pub fn make_prim_op(
    arena: &mut Arena,
    op: PrimOp,
    type_args: Vec<NodeId>,
    operands: Vec<NodeId>,
) -> NodeId {
    let ty = if arena.config().check_types {
        infer_prim_op_type(arena, op, &operands)
    } else {
        None
    };
    let payload = Payload::PrimOpInst {
        op,
        type_args,
        operands,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::PrimOpInst,
        key,
        Node {
            tag: NodeTag::PrimOpInst,
            ty,
            payload,
        },
    )
}

pub fn make_call(arena: &mut Arena, callee: NodeId, args: Vec<NodeId>) -> NodeId {
    let ty = if arena.config().check_types {
        infer_call_type(arena, callee)
    } else {
        None
    };
    let payload = Payload::Call { callee, args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Call,
        key,
        Node {
            tag: NodeTag::Call,
            ty,
            payload,
        },
    )
}

/// `make_control(arena, inside) -> NodeId`: `inside` must be a nominal
/// `Case` taking exactly one parameter, the join point (spec.md §3.4;
/// `SPEC_FULL.md` §4).
pub fn make_control(arena: &mut Arena, inside: NodeId) -> NodeId {
    let payload = Payload::Control { inside };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Control,
        key,
        Node {
            tag: NodeTag::Control,
            ty: None,
            payload,
        },
    )
}

/// `make_block(arena, yield_types, inside) -> NodeId`: wraps a finished
/// body-builder chain with no join point (`SPEC_FULL.md` §4, distinct
/// from `Control`).
pub fn make_block(arena: &mut Arena, yield_types: Vec<NodeId>, inside: NodeId) -> NodeId {
    let payload = Payload::Block {
        yield_types,
        inside,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Block,
        key,
        Node {
            tag: NodeTag::Block,
            ty: None,
            payload,
        },
    )
}

pub fn make_if(
    arena: &mut Arena,
    condition: NodeId,
    yield_types: Vec<NodeId>,
    if_true: NodeId,
    if_false: Option<NodeId>,
) -> NodeId {
    let payload = Payload::If {
        condition,
        yield_types,
        if_true,
        if_false,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::If,
        key,
        Node {
            tag: NodeTag::If,
            ty: None,
            payload,
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub fn make_match(
    arena: &mut Arena,
    inspect: NodeId,
    yield_types: Vec<NodeId>,
    literals: Vec<NodeId>,
    cases: Vec<NodeId>,
    default_case: NodeId,
) -> NodeId {
    let payload = Payload::Match {
        inspect,
        yield_types,
        literals,
        cases,
        default_case,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Match,
        key,
        Node {
            tag: NodeTag::Match,
            ty: None,
            payload,
        },
    )
}

pub fn make_loop(
    arena: &mut Arena,
    yield_types: Vec<NodeId>,
    initial_args: Vec<NodeId>,
    body: NodeId,
) -> NodeId {
    let payload = Payload::Loop {
        yield_types,
        initial_args,
        body,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Loop,
        key,
        Node {
            tag: NodeTag::Loop,
            ty: None,
            payload,
        },
    )
}

// ---------------------------------------------------------------- Terminators

pub fn make_yield(arena: &mut Arena, args: Vec<NodeId>) -> NodeId {
    let payload = Payload::Yield { args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Yield,
        key,
        Node {
            tag: NodeTag::Yield,
            ty: None,
            payload,
        },
    )
}

/// `make_let(arena, instruction, variables, tail, is_mutable) -> NodeId`
/// (spec.md §4.4 "Bind"). Binds `variables[i].instruction = this node`
/// and `variables[i].output = i` as the one-shot mutation spec.md §9
/// describes, then interns on `(instruction, variables)` only.
pub fn make_let(
    arena: &mut Arena,
    instruction: NodeId,
    variables: Vec<NodeId>,
    tail: NodeId,
    is_mutable: bool,
) -> NodeId {
    let payload = Payload::Let {
        instruction,
        variables: variables.clone(),
        tail,
        is_mutable,
    };
    let key = node::payload_hash(&payload);
    let id = arena.intern_structural(
        NodeTag::Let,
        key,
        Node {
            tag: NodeTag::Let,
            ty: None,
            payload,
        },
    );
    for (i, var) in variables.into_iter().enumerate() {
        bind_variable_origin(arena, var, id, i as u32);
    }
    id
}

pub fn make_tail_call(arena: &mut Arena, target: NodeId, args: Vec<NodeId>) -> NodeId {
    let payload = Payload::TailCall { target, args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::TailCall,
        key,
        Node {
            tag: NodeTag::TailCall,
            ty: None,
            payload,
        },
    )
}

pub fn make_join(arena: &mut Arena, join_point: NodeId, args: Vec<NodeId>) -> NodeId {
    let payload = Payload::Join { join_point, args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Join,
        key,
        Node {
            tag: NodeTag::Join,
            ty: None,
            payload,
        },
    )
}

pub fn make_return(arena: &mut Arena, args: Vec<NodeId>) -> NodeId {
    let payload = Payload::Return { args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Return,
        key,
        Node {
            tag: NodeTag::Return,
            ty: None,
            payload,
        },
    )
}

pub fn make_merge_break(arena: &mut Arena, args: Vec<NodeId>) -> NodeId {
    let payload = Payload::MergeBreak { args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::MergeBreak,
        key,
        Node {
            tag: NodeTag::MergeBreak,
            ty: None,
            payload,
        },
    )
}

pub fn make_merge_continue(arena: &mut Arena, args: Vec<NodeId>) -> NodeId {
    let payload = Payload::MergeContinue { args };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::MergeContinue,
        key,
        Node {
            tag: NodeTag::MergeContinue,
            ty: None,
            payload,
        },
    )
}

pub fn make_unreachable(arena: &mut Arena) -> NodeId {
    let payload = Payload::Unreachable;
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Unreachable,
        key,
        Node {
            tag: NodeTag::Unreachable,
            ty: None,
            payload,
        },
    )
}

// ---------------------------------------------------------------- Typing

/// Result-type inference for a `PrimOpInst` (spec.md §4.3): arithmetic and
/// bitwise ops require both operands to share an underlying type, and
/// their result's uniformity is the join of the operands' (`types::
/// join_uniformity`); `Neg`/`Not` pass their single operand's type
/// through unchanged; `Quote` passes its (sole) operand's type through.
/// Returns `Ok(None)` for ops this crate does not model a result type for
/// (memory, stack, subgroup, join-point ops) rather than guessing.
fn classify_prim_op(
    arena: &Arena,
    op: PrimOp,
    operands: &[NodeId],
) -> Result<Option<NodeId>, (&'static str, String)> {
    use PrimOp::*;
    match op {
        Quote => Ok(match operands {
            [only] => arena.node(*only).ty,
            _ => None,
        }),
        Add | Sub | Mul | Div | Mod | And | Or | Xor | ShiftLeft | ShiftRightLogical
        | ShiftRightArithmetic => {
            let [a, b] = operands else {
                return Err((
                    "IN005",
                    format!("{} requires exactly two operands", op.name()),
                ));
            };
            let (Some(a_ty), Some(b_ty)) = (arena.node(*a).ty, arena.node(*b).ty) else {
                return Ok(None);
            };
            let (a_inner, a_uniform) = types::strip_qualifier(arena, a_ty);
            let (b_inner, b_uniform) = types::strip_qualifier(arena, b_ty);
            if a_inner != b_inner {
                return Err((
                    "IN006",
                    format!("{} operands must share the same underlying type", op.name()),
                ));
            }
            let uniform = types::join_uniformity(a_uniform, b_uniform);
            Ok(Some(if uniform {
                a_inner
            } else if !a_uniform {
                a_ty
            } else {
                b_ty
            }))
        }
        Neg | Not => {
            let [a] = operands else {
                return Err((
                    "IN005",
                    format!("{} requires exactly one operand", op.name()),
                ));
            };
            Ok(arena.node(*a).ty)
        }
        _ => Ok(None),
    }
}

/// Best-effort variant for the raw constructor: swallows a classification
/// error as "nothing inferred" rather than rejecting, since `make_prim_op`
/// itself is infallible (`construct_prim_op` in `fold.rs` is where an
/// ill-typed `PrimOpInst` is actually rejected).
fn infer_prim_op_type(arena: &Arena, op: PrimOp, operands: &[NodeId]) -> Option<NodeId> {
    classify_prim_op(arena, op, operands).ok().flatten()
}

/// `check_prim_op(arena, node) -> CompileResult<Option<NodeId>>`: the
/// validating counterpart of [`infer_prim_op_type`], used by
/// `fold::construct_prim_op` to reject an ill-typed `PrimOpInst` instead
/// of silently leaving it untyped.
pub fn check_prim_op(arena: &Arena, id: NodeId) -> CompileResult<Option<NodeId>> {
    let (op, operands) = match &arena.node(id).payload {
        Payload::PrimOpInst { op, operands, .. } => (*op, operands.clone()),
        _ => return Ok(None),
    };
    classify_prim_op(arena, op, &operands)
        .map_err(|(code, message)| CompileError::typing(code, message, Location::at(id)))
}

/// Best-effort call result type: if `callee` resolves to a function type
/// with exactly one return type, a `Call` produces that type; multi- and
/// zero-result calls are typed by the explicit result types a caller
/// passes to `BodyBuilder::bind_instruction` instead.
fn infer_call_type(arena: &Arena, callee: NodeId) -> Option<NodeId> {
    let callee_ty = arena.node(callee).ty?;
    let (unqualified, _) = types::strip_qualifier(arena, callee_ty);
    match &arena.node(unqualified).payload {
        Payload::FnType { return_types, .. } if return_types.len() == 1 => Some(return_types[0]),
        _ => None,
    }
}

// ---------------------------------------------------------------- Checkers

/// `check_call(arena, node)`: callee must resolve (through `DeclRef`/
/// `FnAddr`) to a function type whose parameter count matches `args`.
pub fn check_call(arena: &Arena, id: NodeId) -> CompileResult<()> {
    let (callee, args) = match &arena.node(id).payload {
        Payload::Call { callee, args } => (*callee, args.len()),
        _ => return Ok(()),
    };
    let callee_ty = match arena.node(callee).ty {
        Some(ty) => ty,
        None => return Ok(()),
    };
    let (unqualified, _) = types::strip_qualifier(arena, callee_ty);
    if let Payload::FnType { param_types, .. } = &arena.node(unqualified).payload {
        if param_types.len() != args {
            return Err(CompileError::typing(
                "IN001",
                "call argument count does not match callee parameter count",
                Location::at(id),
            ));
        }
    }
    Ok(())
}

/// `check_if(arena, node)`: both arms, if both present, must share the
/// declared yield arity (spec.md §4.4 edge case: "if" with only a
/// `true` arm yields nothing and must have an empty `yield_types`).
pub fn check_if(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::If {
            yield_types,
            if_false,
            ..
        } => {
            if if_false.is_none() && !yield_types.is_empty() {
                return Err(CompileError::structural(
                    "IN002",
                    "an if with no else arm cannot yield values",
                    Location::at(id),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `check_match(arena, node)`: one case per literal, plus the default.
pub fn check_match(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::Match {
            literals, cases, ..
        } => {
            if literals.len() != cases.len() {
                return Err(CompileError::structural(
                    "IN003",
                    "match must have exactly one case per literal",
                    Location::at(id),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `check_bindable(arena, instruction, at)`: the node a `Let` is about to
/// bind must actually be an instruction, not a terminator or declaration.
/// Factored out of [`check_let`] so `fold::construct_let` can validate
/// `instruction` before folding decides whether a `Let` node is even
/// built (a successful fold never constructs one).
pub fn check_bindable(arena: &Arena, instruction: NodeId, at: NodeId) -> CompileResult<()> {
    if !arena.node(instruction).is_instruction() {
        return Err(CompileError::structural(
            "IN004",
            "let must bind an instruction node",
            Location::at(at),
        ));
    }
    Ok(())
}

/// `check_let(arena, node)`: the bound instruction must actually be an
/// instruction node, not a terminator or declaration.
pub fn check_let(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::Let { instruction, .. } => check_bindable(arena, *instruction, id),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------- Smart constructors
//
// Checked construction entry points (spec.md §4.1 step 2, §4.3): each
// builds the node via the raw `make_*` constructor above, then — when
// `arena.config().check_types` is set — runs the matching `check_*`
// validator and rejects an ill-typed payload instead of silently leaving
// it with `ty: None`. `fold::construct_prim_op`/`construct_let`/
// `construct_control` play the same role for `PrimOpInst`/`Let`/`Control`;
// these three cover `Call`/`If`/`Match`.

/// `construct_call(arena, callee, args) -> CompileResult<NodeId>`.
pub fn construct_call(arena: &mut Arena, callee: NodeId, args: Vec<NodeId>) -> CompileResult<NodeId> {
    let id = make_call(arena, callee, args);
    if arena.config().check_types {
        check_call(arena, id)?;
    }
    Ok(id)
}

/// `construct_if(arena, condition, yield_types, if_true, if_false) ->
/// CompileResult<NodeId>`.
pub fn construct_if(
    arena: &mut Arena,
    condition: NodeId,
    yield_types: Vec<NodeId>,
    if_true: NodeId,
    if_false: Option<NodeId>,
) -> CompileResult<NodeId> {
    let id = make_if(arena, condition, yield_types, if_true, if_false);
    if arena.config().check_types {
        check_if(arena, id)?;
    }
    Ok(id)
}

/// `construct_match(arena, inspect, yield_types, literals, cases,
/// default_case) -> CompileResult<NodeId>`.
#[allow(clippy::too_many_arguments)]
pub fn construct_match(
    arena: &mut Arena,
    inspect: NodeId,
    yield_types: Vec<NodeId>,
    literals: Vec<NodeId>,
    cases: Vec<NodeId>,
    default_case: NodeId,
) -> CompileResult<NodeId> {
    let id = make_match(arena, inspect, yield_types, literals, cases, default_case);
    if arena.config().check_types {
        check_match(arena, id)?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::node::IntWidth;
    use crate::types::make_int_type;
    use crate::value::make_int_literal;

    #[test]
    fn if_without_else_must_not_yield() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let cond = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        let case = crate::value::make_variable(&mut arena, None, None);
        let node = make_if(&mut arena, cond, vec![i32_ty], case, None);
        assert!(check_if(&arena, node).is_err());
    }

    #[test]
    fn prim_op_infers_arithmetic_result_type_when_check_types_set() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let a = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        let b = make_int_literal(&mut arena, IntWidth::W32, 2, i32_ty);
        let add = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![a, b]);
        assert_eq!(arena.node(add).ty, Some(i32_ty));
    }

    #[test]
    fn prim_op_joins_varying_uniformity() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let varying_i32 = crate::types::make_qualified_type(&mut arena, i32_ty, false);
        let a = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        let v = crate::value::make_variable(&mut arena, None, Some(varying_i32));
        let add = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![a, v]);
        assert_eq!(arena.node(add).ty, Some(varying_i32));
    }

    #[test]
    fn construct_call_rejects_argument_count_mismatch() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let fn_ty = crate::types::make_fn_type(&mut arena, false, vec![i32_ty, i32_ty], vec![i32_ty]);
        let callee = crate::value::make_variable(&mut arena, None, Some(fn_ty));
        let one = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        assert!(construct_call(&mut arena, callee, vec![one]).is_err());
    }

    #[test]
    fn let_hash_consing_ignores_tail() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let instr = make_prim_op(&mut arena, PrimOp::Add, vec![], vec![]);
        let v = crate::value::make_variable(&mut arena, None, Some(i32_ty));
        let tail_a = make_unreachable(&mut arena);
        let tail_b = make_return(&mut arena, vec![]);
        let a = make_let(&mut arena, instr, vec![v], tail_a, false);
        let b = make_let(&mut arena, instr, vec![v], tail_b, true);
        assert_eq!(a, b);
    }
}
