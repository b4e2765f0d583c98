//! The checked-pointer qualifier lattice.
//!
//! Defines the four qualifier constants (`Qualifier`), solver variables
//! (`VarId`), and the `Atom` that is either one of them. The lattice is a
//! total order `Ptr < NtArr < Arr < Wild`: smaller means safer, `Wild` is the
//! top ("unchecked").

use std::fmt;

use serde::{Deserialize, Serialize};

/// A solver variable, identified by a `u32` index into the constraint set.
///
/// Each pointer level of each declaration owns one. The same index doubles
/// as the union-find key for the WILD disjoint-set analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// A constant of the qualifier lattice.
///
/// Variant order is the lattice order, so the derived `Ord` is the
/// lattice comparison.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Qualifier {
    /// A checked pointer to a single object.
    Ptr,
    /// A checked pointer to a null-terminated run of objects.
    NtArr,
    /// A checked pointer to a run of objects of known extent.
    Arr,
    /// An unchecked pointer.
    Wild,
}

impl Qualifier {
    /// All qualifiers, safest first.
    pub const ALL: [Qualifier; 4] = [
        Qualifier::Ptr,
        Qualifier::NtArr,
        Qualifier::Arr,
        Qualifier::Wild,
    ];

    /// Least upper bound: the less safe of the two.
    pub fn join(self, other: Qualifier) -> Qualifier {
        self.max(other)
    }

    /// Greatest lower bound: the safer of the two.
    pub fn meet(self, other: Qualifier) -> Qualifier {
        self.min(other)
    }

    pub fn is_wild(self) -> bool {
        self == Qualifier::Wild
    }

    /// Read the qualifier of an interop-type annotation such as
    /// `_Ptr<int>` or `_Nt_array_ptr<char>`.
    pub fn from_itype(itype: &str) -> Option<Qualifier> {
        let head = itype.trim_start();
        if head.starts_with("_Nt_array_ptr") {
            Some(Qualifier::NtArr)
        } else if head.starts_with("_Array_ptr") {
            Some(Qualifier::Arr)
        } else if head.starts_with("_Ptr") {
            Some(Qualifier::Ptr)
        } else {
            None
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Qualifier::Ptr => "Ptr",
            Qualifier::NtArr => "NtArr",
            Qualifier::Arr => "Arr",
            Qualifier::Wild => "Wild",
        };
        f.write_str(s)
    }
}

/// Either a fixed lattice value or a solver variable standing in for one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Atom {
    Const(Qualifier),
    Var(VarId),
}

impl Atom {
    pub fn wild() -> Atom {
        Atom::Const(Qualifier::Wild)
    }

    pub fn as_var(self) -> Option<VarId> {
        match self {
            Atom::Var(v) => Some(v),
            Atom::Const(_) => None,
        }
    }

    pub fn as_const(self) -> Option<Qualifier> {
        match self {
            Atom::Const(q) => Some(q),
            Atom::Var(_) => None,
        }
    }
}

impl From<VarId> for Atom {
    fn from(v: VarId) -> Self {
        Atom::Var(v)
    }
}

impl From<Qualifier> for Atom {
    fn from(q: Qualifier) -> Self {
        Atom::Const(q)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Const(q) => write!(f, "{}", q),
            Atom::Var(v) => write!(f, "{}", v),
        }
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for VarId {
    type Value = ();

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        VarId(u)
    }

    fn tag() -> &'static str {
        "VarId"
    }
}
