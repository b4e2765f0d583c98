//! Fatal internal-consistency errors.
//!
//! These indicate a bug in fact extraction (or in the engine) rather than
//! something about the analysed program; the driver aborts on any of them.
//! Missing information is never an error: lookups return empty sets instead.

use ptrqual_common::DeclKey;
use thiserror::Error;

use crate::constraint::ConstraintId;
use crate::cvar::CVarId;
use crate::qual::VarId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferError {
    /// A constraint or chain mentions a variable the constraint set never
    /// created.
    #[error("constraint {constraint:?} refers to unregistered variable {var}")]
    UnregisteredAtom {
        constraint: Option<ConstraintId>,
        var: VarId,
    },
    /// Asked for parameter `index` of a function with fewer parameters.
    #[error("function `{function}` has {arity} parameters, parameter {index} requested")]
    ParamOutOfRange {
        function: String,
        index: usize,
        arity: usize,
    },
    /// Dereferenced a constraint variable that only describes a function.
    #[error("cannot dereference function-only constraint variable {0}")]
    DerefFunction(CVarId),
    /// Solve or retraction requested before constraints were built.
    #[error("constraints have not been built yet")]
    NotBuilt,
    /// Retraction requested for a variable with no direct WILD constraint.
    #[error("variable {0} has no constraint forcing it to Wild")]
    NoWildConstraint(VarId),
    /// A function declaration fact did not produce a function variable.
    #[error("no function constraint variable recorded for {0}")]
    UnknownFunction(DeclKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = InferError::ParamOutOfRange {
            function: "f".into(),
            index: 2,
            arity: 1,
        };
        assert_eq!(
            err.to_string(),
            "function `f` has 1 parameters, parameter 2 requested"
        );
        assert_eq!(
            InferError::NoWildConstraint(VarId(5)).to_string(),
            "variable q5 has no constraint forcing it to Wild"
        );
    }
}
