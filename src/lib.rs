//! # lumina-ir: Hash-Consed Intermediate Representation
//!
//! `lumina-ir` is the middle-end representation the Lumina shader compiler
//! rewrites shaders through between frontend lowering and backend codegen.
//!
//! ## Philosophy
//!
//! - **Hash-consed**: structurally identical IR nodes share one allocation,
//!   so equality is pointer equality and common-subexpression elimination
//!   falls out of construction for free.
//! - **Typed by construction**: every node can be checked against the
//!   qualified, uniformity-aware type system as it is built, instead of in a
//!   separate verification pass.
//! - **Pass-friendly**: a module is a flat list of declarations over one
//!   arena; passes rewrite it structurally, folding where it's free and
//!   leaving everything else untouched.
//!
//! ## Quick Start
//!
//! ```rust
//! use lumina_ir::arena::{Arena, ArenaConfig};
//! use lumina_ir::module::Module;
//! use lumina_ir::node::IntWidth;
//! use lumina_ir::types::make_int_type;
//! use lumina_ir::value::make_int_literal;
//! use lumina_ir::instruction::make_return;
//!
//! let mut module = Module::new("demo", Arena::new(ArenaConfig::default()));
//! let i32_ty = make_int_type(module.arena_mut(), IntWidth::W32, true);
//! let func = module.declare_function("answer", vec![], vec![], vec![i32_ty]);
//! let forty_two = make_int_literal(module.arena_mut(), IntWidth::W32, 42, i32_ty);
//! let body = make_return(module.arena_mut(), vec![forty_two]);
//! module.set_function_body(func, body);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod analysis;
pub mod arena;
pub mod builder;
pub mod diagnostics;
pub mod fold;
pub mod instruction;
pub mod module;
pub mod node;
pub mod passes;
pub mod primop;
pub mod rewriter;
pub mod scope;
pub mod types;
pub mod value;

pub use arena::{Arena, ArenaConfig, NodeId, Sym};
pub use diagnostics::{CompileError, CompileResult};
pub use module::Module;
pub use node::{Annotation, NodeTag, Payload};

/// The most commonly needed names, for a `use lumina_ir::prelude::*;` import.
pub mod prelude {
    pub use crate::arena::{Arena, ArenaConfig, NodeId, Sym};
    pub use crate::builder::BodyBuilder;
    pub use crate::diagnostics::{CompileError, CompileResult};
    pub use crate::module::Module;
    pub use crate::node::{Annotation, IntWidth, NodeTag, Payload};
}
