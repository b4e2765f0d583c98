//! Constraint variables.
//!
//! A constraint variable describes the pointer structure of one declaration:
//! a [`PointerVar`] holds one solver slot per pointer or array level, and a
//! [`FunctionVar`] holds the alternatives for a function's return and each
//! of its parameters. Both live in a [`CVarArena`] and are addressed by
//! [`CVarId`]; nothing owns anything else, so derived views (dereference,
//! address-of) are just new arena entries sharing slots with their source.

use std::collections::BTreeSet;
use std::fmt;

use ptrqual_common::SourceLoc;
use serde::Serialize;

use crate::constraint::reasons;
use crate::error::InferError;
use crate::facts::{FunctionShape, Level, TypeShape};
use crate::qual::{Qualifier, VarId};
use crate::solver::Constraints;

/// Index of a constraint variable in its arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CVarId(pub u32);

impl fmt::Display for CVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An ordered set of alternative constraint variables for one position.
pub type CVarSet = BTreeSet<CVarId>;

#[derive(Clone, Debug, Serialize)]
pub struct PointerVar {
    pub name: String,
    pub base: String,
    /// One slot per level, outermost first. Empty for non-pointer
    /// parameters and returns.
    pub slots: Vec<VarId>,
    /// The function pointed to, for function pointers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<CVarId>,
    /// The outermost level was declared as an array.
    pub arr_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itype: Option<String>,
    pub bounds_interop: bool,
    /// Call-site arguments bound to this parameter or return.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub argument_constraints: CVarSet,
}

#[derive(Clone, Debug, Serialize)]
pub struct FunctionVar {
    pub name: String,
    pub returns: CVarSet,
    pub params: Vec<CVarSet>,
    pub has_body: bool,
    pub has_prototype: bool,
    pub variadic: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintVariable {
    Pointer(PointerVar),
    Function(FunctionVar),
}

impl ConstraintVariable {
    pub fn name(&self) -> &str {
        match self {
            ConstraintVariable::Pointer(p) => &p.name,
            ConstraintVariable::Function(f) => &f.name,
        }
    }
}

/// Declaration-level annotations applied while building a variable.
#[derive(Clone, Debug, Default)]
pub struct Annotations {
    pub itype: Option<String>,
    pub bounds_interop: bool,
    pub has_body: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CVarArena {
    vars: Vec<ConstraintVariable>,
}

impl CVarArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, cv: ConstraintVariable) -> CVarId {
        let id = CVarId(self.vars.len() as u32);
        self.vars.push(cv);
        id
    }

    pub fn get(&self, id: CVarId) -> &ConstraintVariable {
        &self.vars[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: CVarId) -> &mut ConstraintVariable {
        &mut self.vars[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn pointer(&self, id: CVarId) -> Option<&PointerVar> {
        match self.get(id) {
            ConstraintVariable::Pointer(p) => Some(p),
            ConstraintVariable::Function(_) => None,
        }
    }

    pub fn function(&self, id: CVarId) -> Option<&FunctionVar> {
        match self.get(id) {
            ConstraintVariable::Function(f) => Some(f),
            ConstraintVariable::Pointer(_) => None,
        }
    }

    pub fn function_mut(&mut self, id: CVarId) -> Option<&mut FunctionVar> {
        match self.get_mut(id) {
            ConstraintVariable::Function(f) => Some(f),
            ConstraintVariable::Pointer(_) => None,
        }
    }

    // ── Construction ────────────────────────────────────────────────────

    /// Build the constraint variable for a declared type. A bare function
    /// type gives a `FunctionVar`; anything else gives a `PointerVar` with
    /// one slot per level (possibly none).
    pub fn from_shape(
        &mut self,
        cs: &mut Constraints,
        name: &str,
        ty: &TypeShape,
        ann: &Annotations,
    ) -> CVarId {
        match &ty.function {
            Some(f) if ty.levels.is_empty() => self.build_function(cs, name, f, ann),
            _ => self.build_pointer(cs, name, ty, ann),
        }
    }

    fn build_pointer(
        &mut self,
        cs: &mut Constraints,
        name: &str,
        ty: &TypeShape,
        ann: &Annotations,
    ) -> CVarId {
        let mut slots = Vec::with_capacity(ty.levels.len());
        for level in &ty.levels {
            let v = cs.fresh_var();
            if *level == Level::Array {
                cs.add_geq(v, Qualifier::Arr, reasons::ARRAY_DECL, None);
            }
            slots.push(v);
        }
        cs.register_chain(&slots);
        let function = ty.function.as_ref().map(|f| {
            let inner = Annotations::default();
            self.build_function(cs, name, f, &inner)
        });
        self.alloc(ConstraintVariable::Pointer(PointerVar {
            name: name.to_string(),
            base: ty.base.clone(),
            slots,
            function,
            arr_present: ty.levels.first() == Some(&Level::Array),
            itype: ann.itype.clone(),
            bounds_interop: ann.bounds_interop,
            argument_constraints: CVarSet::new(),
        }))
    }

    fn build_function(
        &mut self,
        cs: &mut Constraints,
        name: &str,
        shape: &FunctionShape,
        ann: &Annotations,
    ) -> CVarId {
        let ret_ann = Annotations {
            itype: ann.itype.clone(),
            bounds_interop: ann.bounds_interop,
            has_body: false,
        };
        let ret = self.from_shape(cs, name, &shape.ret, &ret_ann);
        let params = shape
            .params
            .iter()
            .map(|p| {
                let p_ann = Annotations {
                    itype: p.itype.clone(),
                    ..Annotations::default()
                };
                let id = self.from_shape(cs, &p.name, &p.ty, &p_ann);
                CVarSet::from([id])
            })
            .collect();
        self.alloc(ConstraintVariable::Function(FunctionVar {
            name: name.to_string(),
            returns: CVarSet::from([ret]),
            params,
            has_body: ann.has_body,
            has_prototype: shape.has_prototype,
            variadic: shape.variadic,
        }))
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Solved qualifier of each slot, outermost first. Empty for functions.
    pub fn solved_chain(&self, id: CVarId, cs: &Constraints) -> Vec<Qualifier> {
        match self.get(id) {
            ConstraintVariable::Pointer(p) => p.slots.iter().map(|v| cs.assignment(*v)).collect(),
            ConstraintVariable::Function(_) => Vec::new(),
        }
    }

    pub fn outermost(&self, id: CVarId, cs: &Constraints) -> Option<Qualifier> {
        self.pointer(id)
            .and_then(|p| p.slots.first())
            .map(|v| cs.assignment(*v))
    }

    /// A pointer variable is valid only if it has at least one slot.
    pub fn is_valid(&self, id: CVarId) -> bool {
        match self.get(id) {
            ConstraintVariable::Pointer(p) => !p.slots.is_empty(),
            ConstraintVariable::Function(_) => true,
        }
    }

    /// No slot anywhere in the variable resolved to `Wild`.
    pub fn is_checked(&self, id: CVarId, cs: &Constraints) -> bool {
        match self.get(id) {
            ConstraintVariable::Pointer(p) => {
                p.slots.iter().all(|v| !cs.is_wild(*v))
                    && p.function.map_or(true, |f| self.is_checked(f, cs))
            }
            ConstraintVariable::Function(f) => f
                .returns
                .iter()
                .chain(f.params.iter().flatten())
                .all(|c| self.is_checked(*c, cs)),
        }
    }

    /// Two variables have identical solutions: same solved chains, and for
    /// functions the same solutions for the highest return and parameter
    /// alternatives.
    pub fn solution_equal_to(&self, a: CVarId, b: CVarId, cs: &Constraints) -> bool {
        match (self.get(a), self.get(b)) {
            (ConstraintVariable::Pointer(pa), ConstraintVariable::Pointer(pb)) => {
                self.solved_chain(a, cs) == self.solved_chain(b, cs)
                    && match (pa.function, pb.function) {
                        (Some(fa), Some(fb)) => self.solution_equal_to(fa, fb, cs),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (ConstraintVariable::Function(fa), ConstraintVariable::Function(fb)) => {
                fa.params.len() == fb.params.len()
                    && self.sets_equal(&fa.returns, &fb.returns, cs)
                    && fa
                        .params
                        .iter()
                        .zip(&fb.params)
                        .all(|(x, y)| self.sets_equal(x, y, cs))
            }
            _ => false,
        }
    }

    fn sets_equal(&self, a: &CVarSet, b: &CVarSet, cs: &Constraints) -> bool {
        match (self.highest(a, cs), self.highest(b, cs)) {
            (Some(x), Some(y)) => self.solution_equal_to(x, y, cs),
            (None, None) => true,
            _ => false,
        }
    }

    /// Every solver slot reachable from the variable.
    pub fn vars_of(&self, id: CVarId) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.collect_vars(id, &mut out);
        out
    }

    fn collect_vars(&self, id: CVarId, out: &mut BTreeSet<VarId>) {
        match self.get(id) {
            ConstraintVariable::Pointer(p) => {
                out.extend(p.slots.iter().copied());
                if let Some(f) = p.function {
                    self.collect_vars(f, out);
                }
            }
            ConstraintVariable::Function(f) => {
                for c in f.returns.iter().chain(f.params.iter().flatten()) {
                    self.collect_vars(*c, out);
                }
            }
        }
    }

    // ── Selection among alternatives ────────────────────────────────────

    /// Ordering key for alternatives: outermost solved qualifier, then
    /// chain depth. Functions rank by their highest return.
    fn rank(&self, id: CVarId, cs: &Constraints) -> (Qualifier, usize) {
        match self.get(id) {
            ConstraintVariable::Pointer(p) => (
                p.slots
                    .first()
                    .map_or(Qualifier::Ptr, |v| cs.assignment(*v)),
                p.slots.len(),
            ),
            ConstraintVariable::Function(f) => self
                .highest(&f.returns, cs)
                .map_or((Qualifier::Ptr, 0), |r| self.rank(r, cs)),
        }
    }

    fn pick<I>(&self, candidates: I, cs: &Constraints) -> Option<CVarId>
    where
        I: Iterator<Item = CVarId>,
    {
        // Ties go to the lowest id.
        candidates.max_by(|a, b| {
            self.rank(*a, cs)
                .cmp(&self.rank(*b, cs))
                .then_with(|| b.cmp(a))
        })
    }

    /// The highest alternative of a set.
    pub fn highest(&self, set: &CVarSet, cs: &Constraints) -> Option<CVarId> {
        self.pick(set.iter().copied(), cs)
    }

    /// The highest valid pointer alternative whose outermost slot is not
    /// `Wild`.
    pub fn highest_non_wild(&self, set: &CVarSet, cs: &Constraints) -> Option<CVarId> {
        self.pick(
            set.iter().copied().filter(|c| {
                self.is_valid(*c)
                    && self
                        .outermost(*c, cs)
                        .map_or(false, |q| !q.is_wild())
            }),
            cs,
        )
    }

    // ── Constraint generation ───────────────────────────────────────────

    /// Force every slot of the variable, and of everything it embeds, to
    /// `Wild`.
    pub fn constrain_to_wild(
        &self,
        id: CVarId,
        cs: &mut Constraints,
        reason: &str,
        loc: Option<&SourceLoc>,
    ) {
        for v in self.vars_of(id) {
            cs.add_wild(v, reason, loc.cloned());
        }
    }

    pub fn constrain_set_to_wild(
        &self,
        set: &CVarSet,
        cs: &mut Constraints,
        reason: &str,
        loc: Option<&SourceLoc>,
    ) {
        for c in set {
            self.constrain_to_wild(*c, cs, reason, loc);
        }
    }

    /// Equate two constraint variables level by level. Shapes that cannot
    /// be lined up (different depths, pointer against function) make both
    /// sides `Wild`.
    pub fn constrain_eq(
        &self,
        a: CVarId,
        b: CVarId,
        cs: &mut Constraints,
        reason: &str,
        loc: Option<&SourceLoc>,
    ) {
        if a == b {
            return;
        }
        match (self.get(a), self.get(b)) {
            (ConstraintVariable::Pointer(pa), ConstraintVariable::Pointer(pb)) => {
                if pa.slots.len() != pb.slots.len() {
                    if !pa.slots.is_empty() || !pb.slots.is_empty() {
                        self.constrain_to_wild(a, cs, reasons::SHAPE_MISMATCH, loc);
                        self.constrain_to_wild(b, cs, reasons::SHAPE_MISMATCH, loc);
                    }
                    return;
                }
                for (x, y) in pa.slots.iter().zip(&pb.slots) {
                    cs.add_eq(*x, *y, reason, loc.cloned());
                }
                if let (Some(fa), Some(fb)) = (pa.function, pb.function) {
                    self.constrain_eq(fa, fb, cs, reason, loc);
                }
            }
            (ConstraintVariable::Function(fa), ConstraintVariable::Function(fb)) => {
                self.constrain_eq_sets(&fa.returns, &fb.returns, cs, reason, loc);
                if fa.params.len() == fb.params.len() {
                    for (x, y) in fa.params.iter().zip(&fb.params) {
                        self.constrain_eq_sets(x, y, cs, reason, loc);
                    }
                } else if fa.has_prototype && fb.has_prototype {
                    self.constrain_to_wild(a, cs, reasons::ARITY_MISMATCH, loc);
                    self.constrain_to_wild(b, cs, reasons::ARITY_MISMATCH, loc);
                }
            }
            (ConstraintVariable::Pointer(p), ConstraintVariable::Function(_))
            | (ConstraintVariable::Function(_), ConstraintVariable::Pointer(p)) => {
                let func = if matches!(self.get(a), ConstraintVariable::Function(_)) {
                    a
                } else {
                    b
                };
                match p.function {
                    Some(inner) => self.constrain_eq(inner, func, cs, reason, loc),
                    None => {
                        self.constrain_to_wild(a, cs, reasons::SHAPE_MISMATCH, loc);
                        self.constrain_to_wild(b, cs, reasons::SHAPE_MISMATCH, loc);
                    }
                }
            }
        }
    }

    /// Equate every alternative of one set with every alternative of the
    /// other.
    pub fn constrain_eq_sets(
        &self,
        a: &CVarSet,
        b: &CVarSet,
        cs: &mut Constraints,
        reason: &str,
        loc: Option<&SourceLoc>,
    ) {
        for x in a {
            for y in b {
                self.constrain_eq(*x, *y, cs, reason, loc);
            }
        }
    }

    /// Remember that `arg` was bound to the parameter or return `param` at a
    /// call site.
    pub fn record_argument(&mut self, param: CVarId, arg: CVarId) {
        if let ConstraintVariable::Pointer(p) = self.get_mut(param) {
            p.argument_constraints.insert(arg);
        }
    }

    // ── Derived views ───────────────────────────────────────────────────

    /// The variable one level in: same slots minus the outermost. `None`
    /// when nothing remains.
    pub fn dereference(&mut self, id: CVarId) -> Result<Option<CVarId>, InferError> {
        let p = match self.get(id) {
            ConstraintVariable::Pointer(p) => p,
            ConstraintVariable::Function(_) => return Err(InferError::DerefFunction(id)),
        };
        if p.slots.len() <= 1 {
            // `*fp` on a function pointer names the function itself.
            return Ok(p.function.filter(|_| p.slots.len() == 1));
        }
        let derived = PointerVar {
            name: p.name.clone(),
            base: p.base.clone(),
            slots: p.slots[1..].to_vec(),
            function: p.function,
            arr_present: false,
            itype: None,
            bounds_interop: false,
            argument_constraints: CVarSet::new(),
        };
        Ok(Some(self.alloc(ConstraintVariable::Pointer(derived))))
    }

    /// A variable one level out: a fresh outermost slot over the existing
    /// ones. The address of a function is a one-level function pointer.
    pub fn address_of(&mut self, id: CVarId, cs: &mut Constraints) -> CVarId {
        let outer = cs.fresh_var();
        let derived = match self.get(id) {
            ConstraintVariable::Pointer(p) => {
                let mut slots = Vec::with_capacity(p.slots.len() + 1);
                slots.push(outer);
                slots.extend(p.slots.iter().copied());
                PointerVar {
                    name: p.name.clone(),
                    base: p.base.clone(),
                    slots,
                    function: p.function,
                    arr_present: false,
                    itype: None,
                    bounds_interop: false,
                    argument_constraints: CVarSet::new(),
                }
            }
            ConstraintVariable::Function(f) => PointerVar {
                name: f.name.clone(),
                base: String::new(),
                slots: vec![outer],
                function: Some(id),
                arr_present: false,
                itype: None,
                bounds_interop: false,
                argument_constraints: CVarSet::new(),
            },
        };
        cs.register_chain(&derived.slots);
        self.alloc(ConstraintVariable::Pointer(derived))
    }

    /// Display adapter showing solved qualifiers.
    pub fn solved<'a>(&'a self, id: CVarId, cs: &'a Constraints) -> Solved<'a> {
        Solved {
            arena: self,
            cs,
            id,
        }
    }
}

/// Renders a constraint variable with its current solution, e.g.
/// `p: [q3=Ptr, q4=Wild]`.
pub struct Solved<'a> {
    arena: &'a CVarArena,
    cs: &'a Constraints,
    id: CVarId,
}

impl Solved<'_> {
    fn chain(&self, id: CVarId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arena.get(id) {
            ConstraintVariable::Pointer(p) => {
                f.write_str("[")?;
                for (i, v) in p.slots.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", v, self.cs.assignment(*v))?;
                }
                f.write_str("]")?;
                if let Some(inner) = p.function {
                    f.write_str(" ")?;
                    self.chain(inner, f)?;
                }
                Ok(())
            }
            ConstraintVariable::Function(func) => {
                f.write_str("fn(")?;
                for (i, set) in func.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.set(set, f)?;
                }
                f.write_str(") -> ")?;
                self.set(&func.returns, f)
            }
        }
    }

    fn set(&self, set: &CVarSet, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arena.highest(set, self.cs) {
            Some(c) => self.chain(c, f),
            None => f.write_str("_"),
        }
    }
}

impl fmt::Display for Solved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.arena.get(self.id).name())?;
        self.chain(self.id, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::ParamShape;

    fn build(ty: &TypeShape) -> (CVarArena, Constraints, CVarId) {
        let mut arena = CVarArena::new();
        let mut cs = Constraints::new();
        let id = arena.from_shape(&mut cs, "p", ty, &Annotations::default());
        (arena, cs, id)
    }

    #[test]
    fn one_slot_per_level() {
        let (arena, cs, id) = build(&TypeShape::pointer("int", 3));
        assert_eq!(arena.pointer(id).unwrap().slots.len(), 3);
        assert_eq!(cs.num_vars(), 3);
        assert!(arena.is_valid(id));
    }

    #[test]
    fn array_levels_are_at_least_arr() {
        let ty = TypeShape::pointer("int", 1).wrap(Level::Array);
        let (arena, mut cs, id) = build(&ty);
        cs.solve().unwrap();
        assert_eq!(
            arena.solved_chain(id, &cs),
            vec![Qualifier::Arr, Qualifier::Ptr]
        );
        assert!(arena.pointer(id).unwrap().arr_present);
    }

    #[test]
    fn bare_function_builds_components() {
        let ty = TypeShape::function(
            TypeShape::pointer("int", 1),
            vec![
                ParamShape::new("a", TypeShape::scalar("int")),
                ParamShape::new("b", TypeShape::pointer("char", 2)),
            ],
        );
        let (arena, _cs, id) = build(&ty);
        let f = arena.function(id).unwrap();
        assert_eq!(f.params.len(), 2);
        let a = *f.params[0].iter().next().unwrap();
        assert!(!arena.is_valid(a));
        let b = *f.params[1].iter().next().unwrap();
        assert_eq!(arena.pointer(b).unwrap().slots.len(), 2);
    }

    #[test]
    fn function_pointer_embeds_function() {
        let ty = TypeShape::function(TypeShape::pointer("int", 1), vec![]).wrap(Level::Pointer);
        let (arena, _cs, id) = build(&ty);
        let inner = arena.pointer(id).unwrap().function.unwrap();
        assert!(arena.function(inner).is_some());
        assert_eq!(arena.vars_of(id).len(), 2);
    }

    #[test]
    fn constrain_to_wild_reaches_every_slot() {
        let ty = TypeShape::function(TypeShape::pointer("int", 2), vec![]).wrap(Level::Pointer);
        let (arena, mut cs, id) = build(&ty);
        arena.constrain_to_wild(id, &mut cs, reasons::UNSAFE_CAST, None);
        cs.solve().unwrap();
        assert_eq!(cs.wild_vars().len(), 3);
        assert!(!arena.is_checked(id, &cs));
    }

    #[test]
    fn dereference_drops_outermost() {
        let (mut arena, cs, id) = build(&TypeShape::pointer("int", 2));
        let inner = arena.dereference(id).unwrap().unwrap();
        assert_eq!(
            arena.pointer(inner).unwrap().slots,
            arena.pointer(id).unwrap().slots[1..].to_vec()
        );
        assert_eq!(arena.dereference(inner).unwrap(), None);
        assert_eq!(cs.num_vars(), 2);
    }

    #[test]
    fn dereferencing_a_function_is_an_error() {
        let ty = TypeShape::function(TypeShape::scalar("void"), vec![]);
        let (mut arena, _cs, id) = build(&ty);
        assert_eq!(arena.dereference(id), Err(InferError::DerefFunction(id)));
    }

    #[test]
    fn address_of_prepends_a_fresh_slot() {
        let (mut arena, mut cs, id) = build(&TypeShape::pointer("int", 1));
        let addr = arena.address_of(id, &mut cs);
        let slots = &arena.pointer(addr).unwrap().slots;
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1], arena.pointer(id).unwrap().slots[0]);
    }

    #[test]
    fn mismatched_depths_are_wild() {
        let mut arena = CVarArena::new();
        let mut cs = Constraints::new();
        let ann = Annotations::default();
        let a = arena.from_shape(&mut cs, "a", &TypeShape::pointer("void", 1), &ann);
        let b = arena.from_shape(&mut cs, "b", &TypeShape::pointer("int", 2), &ann);
        arena.constrain_eq(a, b, &mut cs, "assign", None);
        cs.solve().unwrap();
        assert_eq!(cs.wild_vars().len(), 3);
    }

    #[test]
    fn highest_prefers_less_safe_then_deeper_then_lower_id() {
        let mut arena = CVarArena::new();
        let mut cs = Constraints::new();
        let ann = Annotations::default();
        let a = arena.from_shape(&mut cs, "a", &TypeShape::pointer("int", 1), &ann);
        let b = arena.from_shape(&mut cs, "b", &TypeShape::pointer("int", 1), &ann);
        let c = arena.from_shape(&mut cs, "c", &TypeShape::pointer("int", 2), &ann);
        let set = CVarSet::from([a, b]);
        assert_eq!(arena.highest(&set, &cs), Some(a));
        let set = CVarSet::from([a, b, c]);
        assert_eq!(arena.highest(&set, &cs), Some(c));
        let b0 = arena.pointer(b).unwrap().slots[0];
        cs.add_geq(b0, Qualifier::Arr, reasons::POINTER_ARITH, None);
        cs.solve().unwrap();
        assert_eq!(arena.highest(&set, &cs), Some(b));
        cs.add_wild(b0, reasons::UNSAFE_CAST, None);
        cs.solve().unwrap();
        assert_eq!(arena.highest_non_wild(&set, &cs), Some(c));
    }

    #[test]
    fn display_shows_solution() {
        let (arena, mut cs, id) = build(&TypeShape::pointer("int", 2));
        let inner = arena.pointer(id).unwrap().slots[1];
        cs.add_wild(inner, reasons::UNSAFE_CAST, None);
        cs.solve().unwrap();
        assert_eq!(
            arena.solved(id, &cs).to_string(),
            "p: [q0=Ptr, q1=Wild]"
        );
    }
}
