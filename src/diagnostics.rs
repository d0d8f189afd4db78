//! Compile-time diagnostics.
//!
//! Grounded in `lumina-ir::validation::Diagnostic`: a hand-rolled struct with
//! a severity, a `&'static str` code, and a message, rather than a
//! `thiserror`/`anyhow` derive — nothing in the graphics workspace reaches
//! for either crate. `CompileError` plays the same role for the four
//! categories spec.md §7 describes (typing, structural invariant,
//! unimplemented path, configuration); `Warning` covers the non-fatal
//! concerns (an unrecognized external address space falling back to
//! `Generic`).

use std::fmt;

use crate::arena::NodeId;

/// A location to attach to a diagnostic: which node, and optionally which
/// operand position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub node: NodeId,
    pub operand: Option<usize>,
}

impl Location {
    pub const fn at(node: NodeId) -> Self {
        Self { node, operand: None }
    }

    pub const fn operand(node: NodeId, index: usize) -> Self {
        Self {
            node,
            operand: Some(index),
        }
    }
}

/// A fatal condition raised while constructing, checking, or rewriting IR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A `check_*` function rejected a node's operand or result types.
    Typing {
        code: &'static str,
        message: String,
        location: Option<Location>,
    },
    /// A structural invariant spec.md calls out was violated (e.g. a
    /// `Join` targeting a join point not in scope, a `Variable` observed
    /// before its owning `Let`/`Case` filled in its back-reference).
    StructuralInvariant {
        code: &'static str,
        message: String,
        location: Option<Location>,
    },
    /// A documented gap: a node shape the current pass does not (yet)
    /// handle, as opposed to a malformed one.
    Unimplemented {
        code: &'static str,
        message: String,
        location: Option<Location>,
    },
    /// A precondition of the calling environment was not met — e.g.
    /// `passes::tailcall::lower_tailcalls` running against a module that
    /// never declared the `builtin_*` runtime helpers it rewrites calls
    /// into (`SPEC_FULL.md` §4).
    Configuration { code: &'static str, message: String },
}

impl CompileError {
    pub fn typing(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self::Typing {
            code,
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn structural(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self::StructuralInvariant {
            code,
            message: message.into(),
            location: Some(location),
        }
    }

    pub fn unimplemented(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unimplemented {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Typing { code, .. }
            | Self::StructuralInvariant { code, .. }
            | Self::Unimplemented { code, .. }
            | Self::Configuration { code, .. } => code,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typing { code, message, .. } => write!(f, "[{code}] type error: {message}"),
            Self::StructuralInvariant { code, message, .. } => {
                write!(f, "[{code}] invariant violated: {message}")
            }
            Self::Unimplemented { code, message, .. } => {
                write!(f, "[{code}] unimplemented: {message}")
            }
            Self::Configuration { code, message } => {
                write!(f, "[{code}] configuration error: {message}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// A non-fatal diagnostic: construction proceeds, but a caller asked for
/// less than what it wrote down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub code: &'static str,
    pub message: String,
    pub location: Option<Location>,
}

impl Warning {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Shorthand used throughout the crate's fallible constructors.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = CompileError::configuration("CFG001", "missing builtin_fork declaration");
        assert_eq!(
            err.to_string(),
            "[CFG001] configuration error: missing builtin_fork declaration"
        );
    }
}
