//! Constant folding and peephole simplification, applied at construction
//! time when `ArenaConfig::allow_fold` is set.
//!
//! Grounded in `original_source/src/shady/fold.c`: `is_zero`/`is_one`
//! recognize folding identities, `fold_prim_op` eliminates add/mul
//! identities and identity casts, and `fold_let` absorbs a `Let` whose
//! bound instruction is itself a `Control` with a trivial body
//! (`Control_TAG` elimination) — the remaining let-chain is rebuilt with
//! a dry-run pass (count results) then a real pass (substitute and
//! splice), confluent with hash-consing since folding runs before
//! interning, not after.
//!
//! These are the crate's *smart constructors*: `BodyBuilder` and callers
//! that want folding applied should go through `construct_prim_op`
//! /`construct_let` here rather than `instruction::make_prim_op`/
//! `make_let` directly. [`crate::rewriter`] deliberately does not: its
//! job is pure structural recreation under substitution, and re-folding
//! there would silently change the rewritten term instead of merely
//! relabeling it (see `DESIGN.md`).

use crate::arena::{Arena, NodeId};
use crate::diagnostics::CompileResult;
use crate::instruction::{check_bindable, check_prim_op, make_let, make_prim_op};
use crate::node::Payload;
use crate::primop::PrimOp;
use crate::rewriter::{substitute, Substitution};
use crate::value::extract_int_literal_value;

/// `is_zero(arena, node) -> bool` (spec.md §4.4 / `fold.c::is_zero`).
pub fn is_zero(arena: &Arena, id: NodeId) -> bool {
    match extract_int_literal_value(arena, id) {
        Some(0) => true,
        Some(_) => false,
        None => matches!(&arena.node(id).payload, Payload::FloatLiteral { bits: 0, .. }),
    }
}

/// `is_one(arena, node) -> bool` (spec.md §4.4 / `fold.c::is_one`).
pub fn is_one(arena: &Arena, id: NodeId) -> bool {
    matches!(extract_int_literal_value(arena, id), Some(1))
}

/// `construct_prim_op(arena, op, type_args, operands) ->
/// CompileResult<NodeId>` (spec.md §4.1 step 2, §4.3, §4.4): applies the
/// PrimOp folding rules, falling back to a plain hash-consed `PrimOpInst`
/// when no rule fires or folding is disabled. When `check_types` is set
/// and no fold rule fires, the constructed node's operand types are
/// validated (`instruction::check_prim_op`) and rejected if ill-typed — a
/// folded result is never re-checked, since it reduces to an operand
/// already typed when *that* node was constructed.
pub fn construct_prim_op(
    arena: &mut Arena,
    op: PrimOp,
    type_args: Vec<NodeId>,
    operands: Vec<NodeId>,
) -> CompileResult<NodeId> {
    if arena.config().allow_fold {
        if let Some(folded) = try_fold_prim_op(arena, op, &type_args, &operands) {
            return Ok(folded);
        }
    }
    let id = make_prim_op(arena, op, type_args, operands);
    if arena.config().check_types {
        check_prim_op(arena, id)?;
    }
    Ok(id)
}

fn try_fold_prim_op(
    arena: &mut Arena,
    op: PrimOp,
    _type_args: &[NodeId],
    operands: &[NodeId],
) -> Option<NodeId> {
    match op {
        PrimOp::Add => {
            let [a, b] = operands else { return None };
            if is_zero(arena, *a) {
                return Some(*b);
            }
            if is_zero(arena, *b) {
                return Some(*a);
            }
            None
        }
        PrimOp::Sub => {
            let [a, b] = operands else { return None };
            if is_zero(arena, *b) {
                return Some(*a);
            }
            None
        }
        PrimOp::Mul => {
            let [a, b] = operands else { return None };
            if is_one(arena, *a) {
                return Some(*b);
            }
            if is_one(arena, *b) {
                return Some(*a);
            }
            if is_zero(arena, *a) {
                return Some(*a);
            }
            if is_zero(arena, *b) {
                return Some(*b);
            }
            None
        }
        PrimOp::Div => {
            let [a, b] = operands else { return None };
            if is_one(arena, *b) {
                return Some(*a);
            }
            None
        }
        PrimOp::Convert | PrimOp::Reinterpret => {
            // Identity cast: source value's type already equals the sole
            // type argument, so the op is a no-op (`fold.c`: conversion
            // to one's own type is dropped).
            let [value] = operands else { return None };
            let target = _type_args.first().copied()?;
            if arena.node(*value).ty == Some(target) {
                return Some(*value);
            }
            None
        }
        PrimOp::Quote => {
            // `quote(x) = x`: a quoted single operand reduces to itself
            // (`fold.c`'s `fold_node` treats `Quote` as always-identity).
            // A multi-operand quote packages a tuple of values for a
            // `Let` to beta-reduce against (see `try_fold_let` below) and
            // is left unfolded here.
            match operands {
                [only] => Some(*only),
                _ => None,
            }
        }
        _ => None,
    }
}

/// `construct_control(arena, inside) -> NodeId` (spec.md §4.4): if
/// `inside`'s body is a `Join` targeting exactly the join point `inside`
/// binds, with no uses of that join point elsewhere, the whole `Control`
/// is dead and can be skipped straight to a `Block` wrapping `inside`'s
/// body with the join's arguments as the block's yield. This crate
/// implements the common, always-safe case spec.md documents rather than
/// a full use-analysis: a `Control` whose case body is *exactly* one
/// `Join` terminator targeting its own join-point parameter.
pub fn construct_control(arena: &mut Arena, inside: NodeId) -> NodeId {
    if !arena.config().allow_fold {
        return crate::instruction::make_control(arena, inside);
    }
    if let Some(folded) = try_fold_control(arena, inside) {
        return folded;
    }
    crate::instruction::make_control(arena, inside)
}

fn try_fold_control(arena: &mut Arena, case: NodeId) -> Option<NodeId> {
    let (params, body) = match &arena.node(case).payload {
        Payload::Case { params, body: Some(b) } => (params.clone(), *b),
        _ => return None,
    };
    let &join_point = params.first()?;
    let (join_target, args) = match &arena.node(body).payload {
        Payload::Join { join_point, args } => (*join_point, args.clone()),
        _ => return None,
    };
    if join_target != join_point {
        return None;
    }
    // The block's declared yield types must match the join's argument
    // types one for one, or a surrounding `Let`'s arity check (below)
    // could never fire on the folded result.
    let yield_types: Vec<NodeId> = args
        .iter()
        .map(|&a| arena.node(a).ty.expect("join argument must be typed"))
        .collect();
    let yield_node = crate::instruction::make_yield(arena, args);
    Some(crate::instruction::make_block(arena, yield_types, yield_node))
}

/// `construct_let(arena, instruction, variables, tail, is_mutable) ->
/// NodeId` (spec.md §4.4 "Absorb"): when `instruction` is itself a
/// `Block` whose body is a bare `Yield`, the `Let` absorbs the block's
/// contents directly instead of nesting — a dry-run pass counts the
/// yielded values to confirm arity, then the real splice substitutes
/// `variables` for nothing (the block carries no parameters of its own)
/// and threads the block's inner chain onto `tail`.
pub fn construct_let(
    arena: &mut Arena,
    instruction: NodeId,
    variables: Vec<NodeId>,
    tail: NodeId,
    is_mutable: bool,
) -> CompileResult<NodeId> {
    if arena.config().check_types {
        check_bindable(arena, instruction, instruction)?;
    }
    if arena.config().allow_fold {
        if let Some(folded) = try_fold_let(arena, &variables, tail, instruction) {
            return Ok(folded);
        }
    }
    Ok(make_let(arena, instruction, variables, tail, is_mutable))
}

fn try_fold_let(
    arena: &mut Arena,
    variables: &[NodeId],
    tail: NodeId,
    instruction: NodeId,
) -> Option<NodeId> {
    if let Payload::PrimOpInst {
        op: PrimOp::Quote,
        operands,
        ..
    } = &arena.node(instruction).payload
    {
        let operands = operands.clone();
        if operands.len() == variables.len() {
            let mut subst = Substitution::new();
            for (var, value) in variables.iter().zip(operands) {
                subst.insert(*var, value);
            }
            let snapshot = arena.clone();
            return Some(substitute(arena, &snapshot, tail, &subst));
        }
    }

    let (yield_types, inside) = match &arena.node(instruction).payload {
        Payload::Block { yield_types, inside } => (yield_types.clone(), *inside),
        _ => return None,
    };
    // Dry run: confirm the block's body is a bare Yield with an arity
    // matching the bound variables before committing to the splice.
    if yield_types.len() != variables.len() {
        return None;
    }
    let args = match &arena.node(inside).payload {
        Payload::Yield { args } if args.len() == variables.len() => args.clone(),
        _ => return None,
    };
    // Real pass: substitute each bound variable with the corresponding
    // yielded value directly in `tail`, skipping the Let entirely.
    let mut subst = Substitution::new();
    for (var, value) in variables.iter().zip(args) {
        subst.insert(*var, value);
    }
    let snapshot = arena.clone();
    Some(substitute(arena, &snapshot, tail, &subst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::node::IntWidth;
    use crate::types::make_int_type;
    use crate::value::make_int_literal;

    #[test]
    fn add_zero_folds_to_other_operand() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let zero = make_int_literal(&mut arena, IntWidth::W32, 0, i32_ty);
        let x = make_int_literal(&mut arena, IntWidth::W32, 42, i32_ty);
        let sum = construct_prim_op(&mut arena, PrimOp::Add, vec![], vec![zero, x]).unwrap();
        assert_eq!(sum, x);
    }

    #[test]
    fn mul_one_folds_to_other_operand() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let one = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        let x = make_int_literal(&mut arena, IntWidth::W32, 9, i32_ty);
        let product = construct_prim_op(&mut arena, PrimOp::Mul, vec![], vec![x, one]).unwrap();
        assert_eq!(product, x);
    }

    #[test]
    fn folding_disabled_preserves_structure() {
        let mut arena = Arena::new(ArenaConfig {
            check_types: true,
            allow_fold: false,
        });
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let zero = make_int_literal(&mut arena, IntWidth::W32, 0, i32_ty);
        let x = make_int_literal(&mut arena, IntWidth::W32, 42, i32_ty);
        let sum = construct_prim_op(&mut arena, PrimOp::Add, vec![], vec![zero, x]).unwrap();
        assert_ne!(sum, x);
        assert!(matches!(arena.node(sum).payload, Payload::PrimOpInst { .. }));
    }

    #[test]
    fn construct_prim_op_rejects_mismatched_operand_types() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let f32_ty = crate::types::make_float_type(&mut arena, crate::node::FloatWidth::W32);
        let a = make_int_literal(&mut arena, IntWidth::W32, 5, i32_ty);
        let b = crate::value::make_float_literal(
            &mut arena,
            crate::node::FloatWidth::W32,
            0x3f800000,
            f32_ty,
        );
        assert!(construct_prim_op(&mut arena, PrimOp::Add, vec![], vec![a, b]).is_err());
    }
}
