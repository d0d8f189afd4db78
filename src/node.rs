//! The node taxonomy: tags, classes, and payloads.
//!
//! spec.md §6 describes a build-time generator that turns a JSON grammar
//! into `AddressSpace`, `NodeClass`, `NodeTag`, per-node payload records,
//! a tag→class lookup, per-class classifiers, `node_tags[]`, and
//! `node_type_has_payload[]`. That generator is out of scope (spec.md §1);
//! this module is hand-written to the shape such a generator would emit —
//! the same relationship `lumina-derive`'s proc macros have to the code
//! they expand into, documented once in source rather than re-derived at
//! build time.

use bitflags::bitflags;
use std::hash::{Hash, Hasher};

use crate::arena::{NodeId, Sym};
use crate::primop::PrimOp;

/// Address space a pointer type resides in. Mirrors the enumeration
/// spec.md §6's generator would emit from the grammar's address-space
/// table; `is_physical` is that generator's `is_physical_as` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Generic,
    Private,
    Function,
    Workgroup,
    Global,
    Input,
    Output,
    External,
    PhysicalGlobal,
    PhysicalShared,
    PhysicalPrivate,
    PhysicalSubgroup,
}

impl AddressSpace {
    /// The grammar's `physical` boolean for this address space.
    pub const fn is_physical(self) -> bool {
        matches!(
            self,
            Self::PhysicalGlobal
                | Self::PhysicalShared
                | Self::PhysicalPrivate
                | Self::PhysicalSubgroup
        )
    }
}

/// Integer width, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// Floating-point width, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    W16,
    W32,
    W64,
}

/// A single annotation attached to a declaration (e.g. `Leaf`,
/// `EntryPoint`, or a `name = value` pair like the tail-call pass's
/// generated `FnId`). Annotations are metadata on nominal declarations,
/// not arena-interned structural nodes, so they never affect hash-consing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Annotation {
    Flag(Sym),
    Value { name: Sym, value: NodeId },
}

/// The closed set of node kinds. One variant per grammar-described node,
/// plus the `Invalid` sentinel the generator reserves for unset tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeTag {
    Invalid = 0,

    // Types
    IntType,
    FloatType,
    BoolType,
    PtrType,
    ArrayType,
    PackType,
    RecordType,
    FnType,
    QualifiedType,
    JoinPointType,
    MaskType,
    DeclRefType,

    // Values
    IntLiteral,
    FloatLiteral,
    BoolLiteral,
    StringLiteral,
    NullPtr,
    Undef,
    Composite,
    Tuple,
    Variable,
    FnAddr,
    DeclRef,

    // Instructions
    PrimOpInst,
    Call,
    Control,
    Block,
    If,
    Match,
    Loop,

    // Terminators
    Yield,
    Let,
    TailCall,
    Join,
    Return,
    MergeBreak,
    MergeContinue,
    Unreachable,

    // Declarations (nominal)
    Function,
    Constant,
    GlobalVariable,
    BasicBlock,
    Case,
}

bitflags! {
    /// One distinct bit per node class, as spec.md §6 describes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeClass: u16 {
        const TYPE        = 1 << 0;
        const VALUE       = 1 << 1;
        const INSTRUCTION = 1 << 2;
        const TERMINATOR  = 1 << 3;
        const DECLARATION = 1 << 4;
    }
}

/// The tag→class lookup the generator would emit.
pub const fn node_class(tag: NodeTag) -> NodeClass {
    use NodeTag::*;
    match tag {
        Invalid => NodeClass::empty(),
        IntType | FloatType | BoolType | PtrType | ArrayType | PackType | RecordType | FnType
        | QualifiedType | JoinPointType | MaskType | DeclRefType => NodeClass::TYPE,
        IntLiteral | FloatLiteral | BoolLiteral | StringLiteral | NullPtr | Undef | Composite
        | Tuple | Variable | FnAddr | DeclRef => NodeClass::VALUE,
        PrimOpInst | Call | Control | Block | If | Match | Loop => NodeClass::INSTRUCTION,
        Yield | Let | TailCall | Join | Return | MergeBreak | MergeContinue | Unreachable => {
            NodeClass::TERMINATOR
        }
        Function | Constant | GlobalVariable | BasicBlock | Case => NodeClass::DECLARATION,
    }
}

/// Nominal tags get fresh identity on every construction call; structural
/// tags are hash-consed. spec.md §3.4: "Variables, functions, constants,
/// global variables, and blocks are nominal."
pub const fn is_nominal(tag: NodeTag) -> bool {
    matches!(
        tag,
        NodeTag::Variable
            | NodeTag::Function
            | NodeTag::Constant
            | NodeTag::GlobalVariable
            | NodeTag::BasicBlock
            | NodeTag::Case
    )
}

/// `node_tags[]`: a string name per tag, for diagnostics.
pub const fn node_tag_name(tag: NodeTag) -> &'static str {
    use NodeTag::*;
    match tag {
        Invalid => "invalid",
        IntType => "int_type",
        FloatType => "float_type",
        BoolType => "bool_type",
        PtrType => "ptr_type",
        ArrayType => "array_type",
        PackType => "pack_type",
        RecordType => "record_type",
        FnType => "fn_type",
        QualifiedType => "qualified_type",
        JoinPointType => "join_point_type",
        MaskType => "mask_type",
        DeclRefType => "decl_ref_type",
        IntLiteral => "int_literal",
        FloatLiteral => "float_literal",
        BoolLiteral => "bool_literal",
        StringLiteral => "string_literal",
        NullPtr => "null_ptr",
        Undef => "undef",
        Composite => "composite",
        Tuple => "tuple",
        Variable => "variable",
        FnAddr => "fn_addr",
        DeclRef => "decl_ref",
        PrimOpInst => "prim_op",
        Call => "call",
        Control => "control",
        Block => "block",
        If => "if",
        Match => "match",
        Loop => "loop",
        Yield => "yield",
        Let => "let",
        TailCall => "tail_call",
        Join => "join",
        Return => "return",
        MergeBreak => "merge_break",
        MergeContinue => "merge_continue",
        Unreachable => "unreachable",
        Function => "function",
        Constant => "constant",
        GlobalVariable => "global_variable",
        BasicBlock => "basic_block",
        Case => "case",
    }
}

/// `node_type_has_payload[]`: every tag carries a payload except the
/// three unit kinds below.
pub const fn node_type_has_payload(tag: NodeTag) -> bool {
    !matches!(
        tag,
        NodeTag::Invalid | NodeTag::BoolType | NodeTag::MaskType | NodeTag::Unreachable
    )
}

/// Tag-specific payload (sum-of-products), one variant per `NodeTag`
/// (spec.md §3.1). Unit-payload tags (`BoolType`, `MaskType`,
/// `Unreachable`) still get a payload variant here for uniformity; the
/// generator's `node_type_has_payload` table is what a consumer actually
/// checks before bothering to inspect a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    // ---- Types ----
    IntType {
        width: IntWidth,
        signed: bool,
    },
    FloatType {
        width: FloatWidth,
    },
    BoolType,
    PtrType {
        pointee: NodeId,
        address_space: AddressSpace,
    },
    ArrayType {
        element: NodeId,
        length: Option<NodeId>,
    },
    PackType {
        element: NodeId,
        width: u32,
    },
    RecordType {
        members: Vec<NodeId>,
        names: Option<Vec<Sym>>,
        decorated: bool,
    },
    FnType {
        is_basic_block: bool,
        param_types: Vec<NodeId>,
        return_types: Vec<NodeId>,
    },
    QualifiedType {
        inner: NodeId,
        is_uniform: bool,
    },
    JoinPointType {
        param_types: Vec<NodeId>,
    },
    MaskType,
    DeclRefType {
        decl: NodeId,
    },

    // ---- Values ----
    IntLiteral {
        width: IntWidth,
        /// Raw bit pattern; sign- or zero-extend on read depending on the
        /// caller's interpretation (spec.md `extract_int_literal_value`).
        value: i64,
    },
    FloatLiteral {
        width: FloatWidth,
        bits: u64,
    },
    BoolLiteral(bool),
    StringLiteral(Sym),
    NullPtr {
        ty: NodeId,
    },
    Undef {
        ty: NodeId,
    },
    Composite {
        ty: NodeId,
        elements: Vec<NodeId>,
    },
    Tuple {
        elements: Vec<NodeId>,
    },
    Variable {
        id: u32,
        name_hint: Option<Sym>,
        /// One-shot back-reference to the defining `let`, set after the
        /// owning `Let`/`Case` is constructed (spec.md §9 "nominal
        /// mutation window").
        instruction: Option<NodeId>,
        output: u32,
    },
    FnAddr {
        func: NodeId,
    },
    DeclRef {
        decl: NodeId,
    },

    // ---- Instructions ----
    PrimOpInst {
        op: PrimOp,
        type_args: Vec<NodeId>,
        operands: Vec<NodeId>,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    /// Captures a first-class join point: `control(λ(jp). body)`.
    Control {
        inside: NodeId,
    },
    /// Wraps a finished straight-line chain for `finish_and_wrap_as_block`
    /// (no join point involved) — see `SPEC_FULL.md` §4.
    Block {
        yield_types: Vec<NodeId>,
        inside: NodeId,
    },
    If {
        condition: NodeId,
        yield_types: Vec<NodeId>,
        if_true: NodeId,
        if_false: Option<NodeId>,
    },
    Match {
        inspect: NodeId,
        yield_types: Vec<NodeId>,
        literals: Vec<NodeId>,
        cases: Vec<NodeId>,
        default_case: NodeId,
    },
    Loop {
        yield_types: Vec<NodeId>,
        initial_args: Vec<NodeId>,
        body: NodeId,
    },

    // ---- Terminators ----
    Yield {
        args: Vec<NodeId>,
    },
    Let {
        instruction: NodeId,
        variables: Vec<NodeId>,
        tail: NodeId,
        is_mutable: bool,
    },
    TailCall {
        target: NodeId,
        args: Vec<NodeId>,
    },
    Join {
        join_point: NodeId,
        args: Vec<NodeId>,
    },
    Return {
        args: Vec<NodeId>,
    },
    MergeBreak {
        args: Vec<NodeId>,
    },
    MergeContinue {
        args: Vec<NodeId>,
    },
    Unreachable,

    // ---- Declarations (nominal) ----
    Function {
        name: Sym,
        annotations: Vec<Annotation>,
        params: Vec<NodeId>,
        return_types: Vec<NodeId>,
        body: Option<NodeId>,
    },
    Constant {
        name: Sym,
        annotations: Vec<Annotation>,
        type_hint: Option<NodeId>,
        value: Option<NodeId>,
    },
    GlobalVariable {
        name: Sym,
        annotations: Vec<Annotation>,
        ty: NodeId,
        address_space: AddressSpace,
        init: Option<NodeId>,
    },
    BasicBlock {
        name: Sym,
        params: Vec<NodeId>,
        body: Option<NodeId>,
    },
    Case {
        params: Vec<NodeId>,
        body: Option<NodeId>,
    },
}

/// A single IR term: arena-relative tag, optional checked type, and payload.
#[derive(Debug, Clone)]
pub struct Node {
    pub tag: NodeTag,
    /// Absent for type/declaration nodes, or whenever `check_types` is off.
    pub ty: Option<NodeId>,
    pub payload: Payload,
}

impl Node {
    pub fn class(&self) -> NodeClass {
        node_class(self.tag)
    }

    pub fn is_type(&self) -> bool {
        self.class() == NodeClass::TYPE
    }

    pub fn is_value(&self) -> bool {
        self.class() == NodeClass::VALUE
    }

    pub fn is_instruction(&self) -> bool {
        self.class() == NodeClass::INSTRUCTION
    }

    pub fn is_terminator(&self) -> bool {
        self.class() == NodeClass::TERMINATOR
    }

    pub fn is_declaration(&self) -> bool {
        self.class() == NodeClass::DECLARATION
    }
}

/// Structural hash/equality contract (spec.md §6): the default is
/// field-by-field over the whole payload, except the listed tags use an
/// explicit field subset so ignorable metadata (here: `Let`'s `tail` and
/// `is_mutable`, which name the continuation rather than identify *this*
/// binding) is excluded.
pub(crate) fn structural_eq(a: &Payload, b: &Payload) -> bool {
    use Payload::*;
    match (a, b) {
        (
            Let {
                instruction: i1,
                variables: v1,
                ..
            },
            Let {
                instruction: i2,
                variables: v2,
                ..
            },
        ) => i1 == i2 && v1 == v2,
        (
            QualifiedType {
                inner: i1,
                is_uniform: u1,
            },
            QualifiedType {
                inner: i2,
                is_uniform: u2,
            },
        ) => i1 == i2 && u1 == u2,
        (PackType { element: e1, width: w1 }, PackType { element: e2, width: w2 }) => {
            e1 == e2 && w1 == w2
        }
        (
            RecordType {
                members: m1,
                names: n1,
                decorated: d1,
            },
            RecordType {
                members: m2,
                names: n2,
                decorated: d2,
            },
        ) => m1 == m2 && n1 == n2 && d1 == d2,
        (
            FnType {
                is_basic_block: b1,
                param_types: p1,
                return_types: r1,
            },
            FnType {
                is_basic_block: b2,
                param_types: p2,
                return_types: r2,
            },
        ) => b1 == b2 && p1 == p2 && r1 == r2,
        (
            PtrType {
                pointee: p1,
                address_space: a1,
            },
            PtrType {
                pointee: p2,
                address_space: a2,
            },
        ) => p1 == p2 && a1 == a2,
        (IntLiteral { width: w1, value: v1 }, IntLiteral { width: w2, value: v2 }) => {
            w1 == w2 && v1 == v2
        }
        _ => a == b,
    }
}

/// Hash counterpart of [`structural_eq`] — must agree on the same field
/// subset per tag.
pub(crate) fn payload_hash(payload: &Payload) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    match payload {
        Payload::Let {
            instruction,
            variables,
            ..
        } => {
            instruction.hash(&mut hasher);
            variables.hash(&mut hasher);
        }
        Payload::QualifiedType { inner, is_uniform } => {
            inner.hash(&mut hasher);
            is_uniform.hash(&mut hasher);
        }
        Payload::PackType { element, width } => {
            element.hash(&mut hasher);
            width.hash(&mut hasher);
        }
        Payload::RecordType {
            members,
            names,
            decorated,
        } => {
            members.hash(&mut hasher);
            names.hash(&mut hasher);
            decorated.hash(&mut hasher);
        }
        Payload::FnType {
            is_basic_block,
            param_types,
            return_types,
        } => {
            is_basic_block.hash(&mut hasher);
            param_types.hash(&mut hasher);
            return_types.hash(&mut hasher);
        }
        Payload::PtrType {
            pointee,
            address_space,
        } => {
            address_space.hash(&mut hasher);
            pointee.hash(&mut hasher);
        }
        Payload::IntLiteral { width, value } => {
            width.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        other => other.hash(&mut hasher),
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn let_tail_is_excluded_from_structural_equality() {
        let instr = NodeId(0);
        let vars = vec![NodeId(1)];
        let a = Payload::Let {
            instruction: instr,
            variables: vars.clone(),
            tail: NodeId(2),
            is_mutable: false,
        };
        let b = Payload::Let {
            instruction: instr,
            variables: vars,
            tail: NodeId(99),
            is_mutable: true,
        };
        assert!(structural_eq(&a, &b));
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn node_classes_partition_tags() {
        assert_eq!(node_class(NodeTag::IntType), NodeClass::TYPE);
        assert_eq!(node_class(NodeTag::Variable), NodeClass::VALUE);
        assert_eq!(node_class(NodeTag::Call), NodeClass::INSTRUCTION);
        assert_eq!(node_class(NodeTag::Let), NodeClass::TERMINATOR);
        assert_eq!(node_class(NodeTag::Function), NodeClass::DECLARATION);
    }
}
