//! Value node constructors and checkers.
//!
//! Mirrors `types.rs`'s shape: one `make_*` per value kind, one `check_*`
//! pairing result type with operand types, plus `extract_int_literal_value`
//! (spec.md §4.3), grounded in `node.c`'s `extract_int_literal_value`.

use crate::arena::{Arena, NodeId, Sym};
use crate::diagnostics::{CompileError, CompileResult, Location};
use crate::node::{self, IntWidth, Node, NodeTag, Payload};
use crate::types;

pub fn make_int_literal(arena: &mut Arena, width: IntWidth, value: i64, ty: NodeId) -> NodeId {
    let payload = Payload::IntLiteral { width, value };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::IntLiteral,
        key,
        Node {
            tag: NodeTag::IntLiteral,
            ty: Some(ty),
            payload,
        },
    )
}

pub fn make_float_literal(
    arena: &mut Arena,
    width: crate::node::FloatWidth,
    bits: u64,
    ty: NodeId,
) -> NodeId {
    let payload = Payload::FloatLiteral { width, bits };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::FloatLiteral,
        key,
        Node {
            tag: NodeTag::FloatLiteral,
            ty: Some(ty),
            payload,
        },
    )
}

pub fn make_bool_literal(arena: &mut Arena, value: bool, ty: NodeId) -> NodeId {
    let payload = Payload::BoolLiteral(value);
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::BoolLiteral,
        key,
        Node {
            tag: NodeTag::BoolLiteral,
            ty: Some(ty),
            payload,
        },
    )
}

pub fn make_string_literal(arena: &mut Arena, text: Sym) -> NodeId {
    let payload = Payload::StringLiteral(text);
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::StringLiteral,
        key,
        Node {
            tag: NodeTag::StringLiteral,
            ty: None,
            payload,
        },
    )
}

pub fn make_null_ptr(arena: &mut Arena, ty: NodeId) -> NodeId {
    let payload = Payload::NullPtr { ty };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::NullPtr,
        key,
        Node {
            tag: NodeTag::NullPtr,
            ty: Some(ty),
            payload,
        },
    )
}

pub fn make_undef(arena: &mut Arena, ty: NodeId) -> NodeId {
    let payload = Payload::Undef { ty };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Undef,
        key,
        Node {
            tag: NodeTag::Undef,
            ty: Some(ty),
            payload,
        },
    )
}

pub fn make_composite(arena: &mut Arena, ty: NodeId, elements: Vec<NodeId>) -> NodeId {
    let payload = Payload::Composite { ty, elements };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Composite,
        key,
        Node {
            tag: NodeTag::Composite,
            ty: Some(ty),
            payload,
        },
    )
}

pub fn make_tuple(arena: &mut Arena, elements: Vec<NodeId>, ty: Option<NodeId>) -> NodeId {
    let payload = Payload::Tuple { elements };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::Tuple,
        key,
        Node {
            tag: NodeTag::Tuple,
            ty,
            payload,
        },
    )
}

/// `make_variable(arena, name_hint, ty) -> NodeId` (spec.md §3.4):
/// nominal, always fresh. `instruction`/`output` are unset until the
/// owning `Let`/`Case` fills them in (the one-shot mutation window).
pub fn make_variable(arena: &mut Arena, name_hint: Option<Sym>, ty: Option<NodeId>) -> NodeId {
    let id = arena.fresh_id();
    arena.alloc(Node {
        tag: NodeTag::Variable,
        ty,
        payload: Payload::Variable {
            id,
            name_hint,
            instruction: None,
            output: 0,
        },
    })
}

/// Fills in a `Variable`'s back-reference to its binding instruction.
/// Must be called exactly once, before the variable is observed by any
/// reader other than its creator (spec.md §9).
pub(crate) fn bind_variable_origin(
    arena: &mut Arena,
    variable: NodeId,
    instruction: NodeId,
    output: u32,
) {
    if let Payload::Variable {
        instruction: slot,
        output: out_slot,
        ..
    } = &mut arena.node_mut(variable).payload
    {
        *slot = Some(instruction);
        *out_slot = output;
    }
}

pub fn make_fn_addr(arena: &mut Arena, func: NodeId) -> NodeId {
    let payload = Payload::FnAddr { func };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::FnAddr,
        key,
        Node {
            tag: NodeTag::FnAddr,
            ty: None,
            payload,
        },
    )
}

pub fn make_decl_ref(arena: &mut Arena, decl: NodeId) -> NodeId {
    let payload = Payload::DeclRef { decl };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::DeclRef,
        key,
        Node {
            tag: NodeTag::DeclRef,
            ty: None,
            payload,
        },
    )
}

/// `extract_int_literal_value(arena, node) -> Option<i64>`: returns the
/// raw bit pattern held by an `IntLiteral`, sign-extended per its width
/// (spec.md §4.3; `node.c::extract_int_literal_value`).
pub fn extract_int_literal_value(arena: &Arena, id: NodeId) -> Option<i64> {
    match &arena.node(id).payload {
        Payload::IntLiteral { width, value } => Some(match width {
            IntWidth::W8 => *value as i8 as i64,
            IntWidth::W16 => *value as i16 as i64,
            IntWidth::W32 => *value as i32 as i64,
            IntWidth::W64 => *value,
        }),
        _ => None,
    }
}

/// `extract_int_literal_value_zero_extend(arena, node) -> Option<i64>`:
/// the unsigned counterpart of [`extract_int_literal_value`] — the
/// literal's low `width` bits, zero-extended rather than sign-extended
/// (spec.md §8: both extensions must round-trip bit-exact). Callers that
/// treat a narrow `IntLiteral` as unsigned (e.g. a dispatcher's packed
/// match literal) should use this instead of the sign-extending form.
pub fn extract_int_literal_value_zero_extend(arena: &Arena, id: NodeId) -> Option<i64> {
    match &arena.node(id).payload {
        Payload::IntLiteral { width, value } => Some(match width {
            IntWidth::W8 => *value as u8 as i64,
            IntWidth::W16 => *value as u16 as i64,
            IntWidth::W32 => *value as u32 as i64,
            IntWidth::W64 => *value,
        }),
        _ => None,
    }
}

/// `construct_composite(arena, ty, elements) -> CompileResult<NodeId>`:
/// checked counterpart of [`make_composite`], rejecting an element count
/// that doesn't match the declared type's shape (`check_composite`) when
/// `check_types` is set.
pub fn construct_composite(arena: &mut Arena, ty: NodeId, elements: Vec<NodeId>) -> CompileResult<NodeId> {
    let id = make_composite(arena, ty, elements);
    if arena.config().check_types {
        check_composite(arena, id)?;
    }
    Ok(id)
}

/// `check_composite(arena, node)`: element count and element types must
/// match the declared type's shape (array length, pack width, or record
/// member list — whichever the composite's `ty` denotes).
pub fn check_composite(arena: &Arena, id: NodeId) -> CompileResult<()> {
    let (ty, elements) = match &arena.node(id).payload {
        Payload::Composite { ty, elements } => (*ty, elements.clone()),
        _ => return Ok(()),
    };
    let (unqualified, _) = types::strip_qualifier(arena, ty);
    match &arena.node(unqualified).payload {
        crate::node::Payload::ArrayType {
            length: Some(length),
            ..
        } => {
            if let Some(n) = extract_int_literal_value(arena, *length) {
                if n as usize != elements.len() {
                    return Err(CompileError::typing(
                        "VA001",
                        "composite element count does not match array length",
                        Location::at(id),
                    ));
                }
            }
            Ok(())
        }
        crate::node::Payload::PackType { width, .. } => {
            if *width as usize != elements.len() {
                return Err(CompileError::typing(
                    "VA002",
                    "composite element count does not match pack width",
                    Location::at(id),
                ));
            }
            Ok(())
        }
        crate::node::Payload::RecordType { members, .. } => {
            if members.len() != elements.len() {
                return Err(CompileError::typing(
                    "VA003",
                    "composite element count does not match record member count",
                    Location::at(id),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::types::make_int_type;

    #[test]
    fn int_literal_sign_extends_narrow_widths() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i8_ty = make_int_type(&mut arena, IntWidth::W8, true);
        let lit = make_int_literal(&mut arena, IntWidth::W8, 0xff, i8_ty);
        assert_eq!(extract_int_literal_value(&arena, lit), Some(-1));
    }

    #[test]
    fn int_literal_zero_extends_narrow_widths() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i8_ty = make_int_type(&mut arena, IntWidth::W8, true);
        let lit = make_int_literal(&mut arena, IntWidth::W8, 0xff, i8_ty);
        assert_eq!(extract_int_literal_value(&arena, lit), Some(-1));
        assert_eq!(extract_int_literal_value_zero_extend(&arena, lit), Some(255));
    }

    #[test]
    fn construct_composite_rejects_element_count_mismatch() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let len = make_int_literal(&mut arena, IntWidth::W32, 3, i32_ty);
        let array_ty = crate::types::make_array_type(&mut arena, i32_ty, Some(len));
        let a = make_int_literal(&mut arena, IntWidth::W32, 1, i32_ty);
        let b = make_int_literal(&mut arena, IntWidth::W32, 2, i32_ty);
        assert!(construct_composite(&mut arena, array_ty, vec![a, b]).is_err());
    }

    #[test]
    fn variable_origin_is_settable_exactly_once() {
        let mut arena = Arena::new(ArenaConfig::default());
        let v = make_variable(&mut arena, None, None);
        let dummy = v;
        bind_variable_origin(&mut arena, v, dummy, 0);
        match &arena.node(v).payload {
            Payload::Variable { instruction, .. } => assert_eq!(*instruction, Some(dummy)),
            _ => panic!("expected variable"),
        }
    }
}
