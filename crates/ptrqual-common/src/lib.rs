//! Shared types for the ptrqual workspace.
//!
//! - [`loc`]: persistent declaration identities, source locations and the
//!   line index used to turn them back into byte offsets for diagnostics.

pub mod loc;

pub use loc::{DeclKey, LineIndex, SourceLoc};
