//! Whole-program checked-pointer qualifier inference.
//!
//! Every pointer level of every declaration in a C program gets a solver
//! variable over the lattice `Ptr < NtArr < Arr < Wild`. Facts extracted from
//! the program (declarations, assignments, calls, casts, pointer
//! arithmetic) become equality and lower-bound constraints; the solver finds
//! the safest assignment consistent with them. Pointers that end up `Wild`
//! are clustered by the constraint that caused them, so the worst root
//! causes can be reported and retracted speculatively.
//!
//! # Architecture
//!
//! - [`qual`]: The qualifier lattice, solver variables, atoms
//! - [`constraint`]: Constraints with reasons and source locations
//! - [`solver`]: Constraint set and fixpoint solver
//! - [`cvar`]: Pointer and function constraint variables in an arena
//! - [`facts`]: Input facts from the extraction front end
//! - [`program`]: Variable store and global symbol tables
//! - [`builder`]: Fact-to-constraint translation
//! - [`link`]: Cross-file linking and the extern policy
//! - [`subtyping`]: Definition/declaration reconciliation
//! - [`disjoint`]: WILD root-cause clustering (union-find)
//! - [`cast`], [`stats`], [`diagnostics`]: Reporting
//! - [`session`]: Lifecycle and locking

pub mod builder;
pub mod cast;
pub mod config;
pub mod constraint;
pub mod cvar;
pub mod diagnostics;
pub mod disjoint;
pub mod error;
pub mod facts;
pub mod link;
pub mod program;
pub mod qual;
pub mod session;
pub mod solver;
pub mod stats;
pub mod subtyping;

pub use config::Options;
pub use error::InferError;
pub use facts::Fact;
pub use qual::{Atom, Qualifier, VarId};
pub use session::{Retraction, Session, SolveSummary, Speculation};

/// Parse a JSON array of facts.
pub fn parse_facts(json: &str) -> Result<Vec<Fact>, serde_json::Error> {
    serde_json::from_str(json)
}
