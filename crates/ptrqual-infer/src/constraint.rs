//! Constraints with provenance.
//!
//! Every constraint records why it was generated and, when the fact that
//! produced it had one, where in the source. The reason string is also the
//! handle for bulk retraction: all constraints sharing a reason can be
//! removed at once.

use std::fmt;

use ptrqual_common::SourceLoc;
use serde::Serialize;

use crate::qual::{Atom, Qualifier, VarId};

/// Index of a constraint in the constraint set. Never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConstraintId(pub u32);

/// The shape of a constraint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConstraintKind {
    /// Both sides must resolve to the same qualifier.
    Eq(Atom, Atom),
    /// The variable must resolve to at least the bound.
    Geq(VarId, Qualifier),
}

impl ConstraintKind {
    /// Build a normalized equality: a variable always sits on the left, and
    /// two variables are ordered by index, so `a == b` and `b == a`
    /// deduplicate to the same constraint.
    pub fn eq(lhs: impl Into<Atom>, rhs: impl Into<Atom>) -> ConstraintKind {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        match (lhs, rhs) {
            (Atom::Const(_), Atom::Var(_)) => ConstraintKind::Eq(rhs, lhs),
            (Atom::Var(a), Atom::Var(b)) if b < a => ConstraintKind::Eq(rhs, lhs),
            _ => ConstraintKind::Eq(lhs, rhs),
        }
    }

    /// All variables mentioned by this constraint.
    pub fn vars(&self) -> impl Iterator<Item = VarId> {
        let (a, b) = match *self {
            ConstraintKind::Eq(l, r) => (l.as_var(), r.as_var()),
            ConstraintKind::Geq(v, _) => (Some(v), None),
        };
        a.into_iter().chain(b)
    }

    /// If this constraint directly forces a variable to `Wild`, that variable.
    pub fn direct_wild(&self) -> Option<VarId> {
        match *self {
            ConstraintKind::Eq(Atom::Var(v), Atom::Const(Qualifier::Wild))
            | ConstraintKind::Geq(v, Qualifier::Wild) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::Eq(l, r) => write!(f, "{} == {}", l, r),
            ConstraintKind::Geq(v, q) => write!(f, "{} >= {}", v, q),
        }
    }
}

/// A constraint plus its provenance.
#[derive(Clone, Debug, Serialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLoc>,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        if let Some(loc) = &self.loc {
            write!(f, " at {}", loc)?;
        }
        Ok(())
    }
}

/// Reason strings used by the engine itself.
pub mod reasons {
    pub const MACRO_DECL: &str = "pointer declared inside a macro expansion";
    pub const NOT_REWRITABLE: &str = "declaration is in a file that cannot be rewritten";
    pub const UNSAFE_CAST: &str = "cast to an incompatible pointer type";
    pub const ARITY_MISMATCH: &str = "declarations of the same function disagree on arity";
    pub const EXTERN_RETURN: &str = "return value of an external function without a body";
    pub const EXTERN_PARAM: &str = "inner pointer of a parameter to an external function";
    pub const WILD_BODY_RETURN: &str = "function returns an unchecked pointer from its body";
    pub const SHAPE_MISMATCH: &str = "assignment between incompatible pointer shapes";
    pub const UNKNOWN_CALLEE: &str = "call to a function with no known signature";
    pub const VARARGS: &str = "argument passed through a variadic parameter list";
    pub const ARRAY_DECL: &str = "declared as an array";
    pub const STRING_LITERAL: &str = "string literal";
    pub const POINTER_ARITH: &str = "pointer arithmetic or indexing";
    pub const ITYPE: &str = "interop type annotation";
    pub const SUBTYPE: &str = "declaration/definition subtyping";
    pub const ASSIGNMENT: &str = "assignment";
    pub const ARGUMENT: &str = "argument bound to parameter";
    pub const RETURN: &str = "returned value";
    pub const LINK: &str = "same symbol declared more than once";
}
