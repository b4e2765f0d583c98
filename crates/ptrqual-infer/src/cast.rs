//! Whether a value flowing between two constraint variables needs an
//! explicit cast once the program is rewritten.

use crate::cvar::{CVarArena, CVarId};
use crate::solver::Constraints;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CastPolicy {
    /// Follow the solved qualifiers.
    #[default]
    Inferred,
    /// Treat the destination as unchecked regardless of its solution.
    ForceWild,
}

/// A checked source needs a cast when the destination is unchecked (or
/// treated as such), or when the destination carries an itype whose solved
/// chain differs from the source's.
pub fn needs_cast(
    arena: &CVarArena,
    cs: &Constraints,
    src: CVarId,
    dst: CVarId,
    policy: CastPolicy,
) -> bool {
    if !arena.is_checked(src, cs) {
        return false;
    }
    let dst_itype = arena.pointer(dst).map_or(false, |p| p.itype.is_some());
    if dst_itype && !arena.solution_equal_to(src, dst, cs) {
        return true;
    }
    !arena.is_checked(dst, cs) || policy == CastPolicy::ForceWild
}
