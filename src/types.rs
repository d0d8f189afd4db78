//! Type constructors and checkers.
//!
//! Grounded in `lumina-ir::types::IrType`'s constructor style (`pub fn
//! pointer(pointee, address_space) -> Self`, one free function per shape)
//! generalized to this crate's arena-and-handle model: every `make_*`
//! function interns its node into an [`Arena`] and returns a [`NodeId`]
//! rather than building a value in place, and every `check_*` function
//! is the pure validator spec.md §4.2 calls for — it inspects operand
//! types already recorded in the arena and never mutates it.

use crate::arena::{Arena, NodeId};
use crate::diagnostics::{CompileError, CompileResult, Location};
use crate::node::{self, AddressSpace, FloatWidth, IntWidth, Node, NodeTag, Payload};

/// `make_int_type(arena, width, signed) -> NodeId` (spec.md §4.2).
pub fn make_int_type(arena: &mut Arena, width: IntWidth, signed: bool) -> NodeId {
    let payload = Payload::IntType { width, signed };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::IntType,
        key,
        Node {
            tag: NodeTag::IntType,
            ty: None,
            payload,
        },
    )
}

pub fn make_float_type(arena: &mut Arena, width: FloatWidth) -> NodeId {
    let payload = Payload::FloatType { width };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::FloatType,
        key,
        Node {
            tag: NodeTag::FloatType,
            ty: None,
            payload,
        },
    )
}

pub fn make_bool_type(arena: &mut Arena) -> NodeId {
    let payload = Payload::BoolType;
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::BoolType,
        key,
        Node {
            tag: NodeTag::BoolType,
            ty: None,
            payload,
        },
    )
}

pub fn make_mask_type(arena: &mut Arena) -> NodeId {
    let payload = Payload::MaskType;
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::MaskType,
        key,
        Node {
            tag: NodeTag::MaskType,
            ty: None,
            payload,
        },
    )
}

/// `make_ptr_type(arena, pointee, address_space) -> NodeId`.
pub fn make_ptr_type(arena: &mut Arena, pointee: NodeId, address_space: AddressSpace) -> NodeId {
    let payload = Payload::PtrType {
        pointee,
        address_space,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::PtrType,
        key,
        Node {
            tag: NodeTag::PtrType,
            ty: None,
            payload,
        },
    )
}

/// `make_array_type(arena, element, length)`. `length` is `None` for a
/// runtime-sized (unsized tail) array.
pub fn make_array_type(arena: &mut Arena, element: NodeId, length: Option<NodeId>) -> NodeId {
    let payload = Payload::ArrayType { element, length };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::ArrayType,
        key,
        Node {
            tag: NodeTag::ArrayType,
            ty: None,
            payload,
        },
    )
}

/// `make_pack_type(arena, element, width)`: a fixed-width SIMD-style pack
/// (spec.md's vector type), distinct from `ArrayType` because its width is
/// a plain `u32`, not an arena-held length expression.
pub fn make_pack_type(arena: &mut Arena, element: NodeId, width: u32) -> NodeId {
    let payload = Payload::PackType { element, width };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::PackType,
        key,
        Node {
            tag: NodeTag::PackType,
            ty: None,
            payload,
        },
    )
}

pub fn make_record_type(
    arena: &mut Arena,
    members: Vec<NodeId>,
    names: Option<Vec<crate::arena::Sym>>,
    decorated: bool,
) -> NodeId {
    let payload = Payload::RecordType {
        members,
        names,
        decorated,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::RecordType,
        key,
        Node {
            tag: NodeTag::RecordType,
            ty: None,
            payload,
        },
    )
}

pub fn make_fn_type(
    arena: &mut Arena,
    is_basic_block: bool,
    param_types: Vec<NodeId>,
    return_types: Vec<NodeId>,
) -> NodeId {
    let payload = Payload::FnType {
        is_basic_block,
        param_types,
        return_types,
    };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::FnType,
        key,
        Node {
            tag: NodeTag::FnType,
            ty: None,
            payload,
        },
    )
}

/// `make_qualified_type(arena, inner, is_uniform)`: wraps a type with the
/// SIMD-divergence qualifier spec.md §3.3 describes.
pub fn make_qualified_type(arena: &mut Arena, inner: NodeId, is_uniform: bool) -> NodeId {
    let payload = Payload::QualifiedType { inner, is_uniform };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::QualifiedType,
        key,
        Node {
            tag: NodeTag::QualifiedType,
            ty: None,
            payload,
        },
    )
}

pub fn make_join_point_type(arena: &mut Arena, param_types: Vec<NodeId>) -> NodeId {
    let payload = Payload::JoinPointType { param_types };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::JoinPointType,
        key,
        Node {
            tag: NodeTag::JoinPointType,
            ty: None,
            payload,
        },
    )
}

pub fn make_decl_ref_type(arena: &mut Arena, decl: NodeId) -> NodeId {
    let payload = Payload::DeclRefType { decl };
    let key = node::payload_hash(&payload);
    arena.intern_structural(
        NodeTag::DeclRefType,
        key,
        Node {
            tag: NodeTag::DeclRefType,
            ty: None,
            payload,
        },
    )
}

/// Strip a `QualifiedType` wrapper, if present, returning the inner type
/// and whether it was uniform. Types with no qualifier are treated as
/// "uniform" by convention (spec.md §3.3: "absence of the qualifier means
/// uniform").
pub fn strip_qualifier(arena: &Arena, ty: NodeId) -> (NodeId, bool) {
    match &arena.node(ty).payload {
        Payload::QualifiedType { inner, is_uniform } => (*inner, *is_uniform),
        _ => (ty, true),
    }
}

/// Join of two uniformity qualifiers: varying dominates (spec.md §3.3 —
/// mixing a uniform and a varying operand yields a varying result).
pub const fn join_uniformity(a: bool, b: bool) -> bool {
    a && b
}

fn require_type(arena: &Arena, id: NodeId, at: NodeId) -> CompileResult<()> {
    if arena.node(id).is_type() {
        Ok(())
    } else {
        Err(CompileError::typing(
            "TY001",
            format!(
                "expected a type node, found {}",
                node::node_tag_name(arena.node(id).tag)
            ),
            Location::at(at),
        ))
    }
}

/// `check_ptr_type(arena, node) -> CompileResult<()>`: the pointee must
/// itself be a type node.
pub fn check_ptr_type(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::PtrType { pointee, .. } => require_type(arena, *pointee, id),
        _ => Ok(()),
    }
}

/// `check_array_type`: element must be a type; if present, length must be
/// an unsigned integer *value*, not a type (spec.md §4.2 edge case: the
/// array length is a value-level node, unlike `pointee`/`element`).
pub fn check_array_type(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::ArrayType { element, length } => {
            require_type(arena, *element, id)?;
            if let Some(length) = length {
                let node = arena.node(*length);
                if !node.is_value() {
                    return Err(CompileError::typing(
                        "TY002",
                        "array length must be a value, not a type",
                        Location::at(id),
                    ));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn check_pack_type(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::PackType { element, width } => {
            require_type(arena, *element, id)?;
            if *width == 0 {
                return Err(CompileError::typing(
                    "TY003",
                    "pack type width must be nonzero",
                    Location::at(id),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn check_record_type(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::RecordType { members, names, .. } => {
            for member in members {
                require_type(arena, *member, id)?;
            }
            if let Some(names) = names {
                if names.len() != members.len() {
                    return Err(CompileError::structural(
                        "TY004",
                        "record field name count must match member count",
                        Location::at(id),
                    ));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn check_fn_type(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::FnType {
            param_types,
            return_types,
            ..
        } => {
            for ty in param_types.iter().chain(return_types) {
                require_type(arena, *ty, id)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn check_qualified_type(arena: &Arena, id: NodeId) -> CompileResult<()> {
    match &arena.node(id).payload {
        Payload::QualifiedType { inner, .. } => {
            if matches!(arena.node(*inner).payload, Payload::QualifiedType { .. }) {
                return Err(CompileError::structural(
                    "TY005",
                    "qualified types do not nest",
                    Location::at(id),
                ));
            }
            require_type(arena, *inner, id)
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------- Smart constructors
//
// Checked counterparts of the raw `make_*` type constructors above
// (spec.md §4.1 step 2, §4.2): each builds the node, then — when
// `arena.config().check_types` is set — runs the matching `check_*`
// validator, giving those validators a real caller instead of only their
// own `#[cfg(test)]` module. `rewriter.rs` and `passes::tailcall`
// deliberately keep calling the raw `make_*` forms directly: they
// recreate already-validated structure under substitution, the same
// reason they skip re-folding (`fold.rs`'s module doc, `DESIGN.md`).

pub fn construct_ptr_type(
    arena: &mut Arena,
    pointee: NodeId,
    address_space: AddressSpace,
) -> CompileResult<NodeId> {
    let id = make_ptr_type(arena, pointee, address_space);
    if arena.config().check_types {
        check_ptr_type(arena, id)?;
    }
    Ok(id)
}

pub fn construct_array_type(
    arena: &mut Arena,
    element: NodeId,
    length: Option<NodeId>,
) -> CompileResult<NodeId> {
    let id = make_array_type(arena, element, length);
    if arena.config().check_types {
        check_array_type(arena, id)?;
    }
    Ok(id)
}

pub fn construct_pack_type(arena: &mut Arena, element: NodeId, width: u32) -> CompileResult<NodeId> {
    let id = make_pack_type(arena, element, width);
    if arena.config().check_types {
        check_pack_type(arena, id)?;
    }
    Ok(id)
}

pub fn construct_record_type(
    arena: &mut Arena,
    members: Vec<NodeId>,
    names: Option<Vec<crate::arena::Sym>>,
    decorated: bool,
) -> CompileResult<NodeId> {
    let id = make_record_type(arena, members, names, decorated);
    if arena.config().check_types {
        check_record_type(arena, id)?;
    }
    Ok(id)
}

pub fn construct_fn_type(
    arena: &mut Arena,
    is_basic_block: bool,
    param_types: Vec<NodeId>,
    return_types: Vec<NodeId>,
) -> CompileResult<NodeId> {
    let id = make_fn_type(arena, is_basic_block, param_types, return_types);
    if arena.config().check_types {
        check_fn_type(arena, id)?;
    }
    Ok(id)
}

pub fn construct_qualified_type(arena: &mut Arena, inner: NodeId, is_uniform: bool) -> CompileResult<NodeId> {
    let id = make_qualified_type(arena, inner, is_uniform);
    if arena.config().check_types {
        check_qualified_type(arena, id)?;
    }
    Ok(id)
}

/// `is_subtype(arena, sub, sup) -> bool` (spec.md §4.3): a non-qualified
/// type is a subtype of its own `QualifiedType { is_uniform: true }`
/// wrapper (a uniform value may always be used where a type without a
/// stated qualifier is expected), and — the central uniformity rule — a
/// `uniform T` is a subtype of `varying T`, never the reverse: a varying
/// value cannot stand in where every SIMD lane is required to agree.
pub fn is_subtype(arena: &Arena, sub: NodeId, sup: NodeId) -> bool {
    if sub == sup {
        return true;
    }
    match &arena.node(sup).payload {
        Payload::QualifiedType { inner, is_uniform: true } => return *inner == sub,
        Payload::QualifiedType { inner, is_uniform: false } => {
            return match &arena.node(sub).payload {
                Payload::QualifiedType { inner: sub_inner, is_uniform: true } => sub_inner == inner,
                _ => sub == *inner,
            };
        }
        _ => {}
    }
    match (&arena.node(sub).payload, &arena.node(sup).payload) {
        (Payload::ArrayType { element: e1, length: l1 }, Payload::ArrayType { element: e2, length: l2 }) => {
            e1 == e2 && l1 == l2
        }
        (Payload::PtrType { pointee: p1, address_space: a1 }, Payload::PtrType { pointee: p2, address_space: a2 }) => {
            p1 == p2 && a1 == a2
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;

    #[test]
    fn int_type_is_hash_consed() {
        let mut arena = Arena::new(ArenaConfig::default());
        let a = make_int_type(&mut arena, IntWidth::W32, true);
        let b = make_int_type(&mut arena, IntWidth::W32, true);
        let c = make_int_type(&mut arena, IntWidth::W32, false);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn qualified_types_do_not_nest() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let uniform = make_qualified_type(&mut arena, i32_ty, true);
        let nested = make_qualified_type(&mut arena, uniform, false);
        assert!(check_qualified_type(&arena, nested).is_err());
    }

    #[test]
    fn uniform_value_is_subtype_of_unqualified_expectation() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let uniform = make_qualified_type(&mut arena, i32_ty, true);
        assert!(is_subtype(&arena, i32_ty, uniform));
    }

    #[test]
    fn uniform_is_subtype_of_varying_but_not_vice_versa() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let uniform = make_qualified_type(&mut arena, i32_ty, true);
        let varying = make_qualified_type(&mut arena, i32_ty, false);
        assert!(is_subtype(&arena, uniform, varying));
        assert!(is_subtype(&arena, i32_ty, varying), "bare type is uniform by convention");
        assert!(!is_subtype(&arena, varying, uniform));
        assert!(!is_subtype(&arena, varying, i32_ty));
    }

    #[test]
    fn construct_ptr_type_rejects_non_type_pointee() {
        let mut arena = Arena::new(ArenaConfig::default());
        let not_a_type = crate::value::make_variable(&mut arena, None, None);
        assert!(construct_ptr_type(&mut arena, not_a_type, AddressSpace::Generic).is_err());
    }

    #[test]
    fn construct_qualified_type_rejects_nesting() {
        let mut arena = Arena::new(ArenaConfig::default());
        let i32_ty = make_int_type(&mut arena, IntWidth::W32, true);
        let uniform = make_qualified_type(&mut arena, i32_ty, true);
        assert!(construct_qualified_type(&mut arena, uniform, false).is_err());
    }
}
