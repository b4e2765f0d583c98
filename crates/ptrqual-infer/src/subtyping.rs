//! Reconciling function definitions with their declarations.
//!
//! Definitions and declarations carry separate constraint variables: the
//! body constrains the definition, call sites constrain the declaration.
//! After a solve, this pass adds the constraints that keep the two
//! compatible. The driver alternates solving and reconciling until a round
//! adds nothing.

use tracing::debug;

use crate::constraint::reasons;
use crate::cvar::{CVarArena, CVarId};
use crate::error::InferError;
use crate::program::ProgramInfo;
use crate::qual::VarId;
use crate::solver::Constraints;

/// Run one reconciliation round over every function definition. Returns
/// whether any new constraint was added.
pub fn reconcile(info: &mut ProgramInfo) -> Result<bool, InferError> {
    let before = info.cs.len();
    let defs: Vec<_> = info
        .functions()
        .filter(|f| f.is_definition)
        .map(|f| (f.key.clone(), f.cvar))
        .collect();
    for (key, def) in defs {
        let decl = info.declaration_of(&key)?;
        if decl == def {
            continue;
        }
        let added = info.cs.len();
        reconcile_pair(&info.arena, &mut info.cs, def, decl);
        if info.cs.len() != added {
            debug!(
                function = %key.name,
                added = info.cs.len() - added,
                "reconciled definition with declaration"
            );
        }
    }
    Ok(info.cs.len() != before)
}

fn reconcile_pair(arena: &CVarArena, cs: &mut Constraints, def: CVarId, decl: CVarId) {
    let (Some(def_fn), Some(decl_fn)) = (arena.function(def), arena.function(decl)) else {
        return;
    };

    // Returns.
    let def_ret = arena.highest(&def_fn.returns, cs);
    let decl_ret = arena.highest(&decl_fn.returns, cs);
    if let (Some(dr), Some(cr)) = (def_ret, decl_ret) {
        if arena.is_valid(dr) && arena.is_valid(cr) {
            let def_out = arena.outermost(dr, cs);
            let decl_out = arena.outermost(cr, cs);
            if def_out.map_or(false, |q| q.is_wild()) {
                arena.constrain_set_to_wild(&def_fn.returns, cs, reasons::WILD_BODY_RETURN, None);
                arena.constrain_set_to_wild(&decl_fn.returns, cs, reasons::WILD_BODY_RETURN, None);
            } else if decl_out.map_or(false, |q| q.is_wild()) {
                let call_sites = arena
                    .pointer(cr)
                    .map(|p| p.argument_constraints.clone())
                    .unwrap_or_default();
                if let Some(src) = arena.highest_non_wild(&call_sites, cs) {
                    if def_out < arena.outermost(src, cs) {
                        widen_return(arena, cs, dr, src);
                    }
                }
            }
        }
    }

    // Parameters.
    if def_fn.params.len() != decl_fn.params.len() {
        return;
    }
    for (dp, cp) in def_fn.params.iter().zip(&decl_fn.params) {
        let (Some(dp), Some(cp)) = (arena.highest(dp, cs), arena.highest(cp, cs)) else {
            continue;
        };
        if !arena.is_valid(dp) || !arena.is_valid(cp) {
            continue;
        }
        if arena.outermost(dp, cs).map_or(true, |q| q.is_wild()) {
            continue;
        }
        if !arena.outermost(cp, cs).map_or(false, |q| q.is_wild()) {
            continue;
        }
        let args = arena
            .pointer(cp)
            .map(|p| p.argument_constraints.clone())
            .unwrap_or_default();
        for arg in args {
            if arena.is_valid(arg) && !arena.outermost(arg, cs).map_or(true, |q| q.is_wild()) {
                widen_argument(arena, cs, arg, dp);
            }
        }
    }
}

/// Line two chains up by dropping the excess outermost levels of the
/// longer one.
fn aligned<'a>(
    arena: &'a CVarArena,
    a: CVarId,
    b: CVarId,
) -> Option<(&'a [VarId], &'a [VarId])> {
    let a = &arena.pointer(a)?.slots;
    let b = &arena.pointer(b)?.slots;
    let n = a.len().min(b.len());
    Some((&a[a.len() - n..], &b[b.len() - n..]))
}

/// Raise the definition's return to the call-site value `src`: the
/// outermost level is raised to the source, inner levels meet at the less
/// safe of the two.
fn widen_return(arena: &CVarArena, cs: &mut Constraints, def_ret: CVarId, src: CVarId) {
    let Some((t, s)) = aligned(arena, def_ret, src) else {
        return;
    };
    for (i, (tv, sv)) in t.iter().zip(s).enumerate() {
        let (qt, qs) = (cs.assignment(*tv), cs.assignment(*sv));
        if i == 0 || qt < qs {
            cs.add_geq(*tv, qs, reasons::SUBTYPE, None);
        } else if qs < qt {
            cs.add_geq(*sv, qt, reasons::SUBTYPE, None);
        }
    }
}

/// Raise a call-site argument to the definition parameter's levels. Inner
/// levels follow the definition even when it is `Wild` there.
fn widen_argument(arena: &CVarArena, cs: &mut Constraints, arg: CVarId, def_param: CVarId) {
    let Some((a, d)) = aligned(arena, arg, def_param) else {
        return;
    };
    for (av, dv) in a.iter().zip(d) {
        let (qa, qd) = (cs.assignment(*av), cs.assignment(*dv));
        if qa < qd {
            cs.add_geq(*av, qd, reasons::SUBTYPE, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConstraintBuilder;
    use crate::cvar::{Annotations, CVarSet};
    use crate::facts::{DeclFact, Expr, Fact, ParamShape, TypeShape};
    use crate::qual::Qualifier;
    use ptrqual_common::DeclKey;

    fn first(set: &CVarSet) -> CVarId {
        *set.iter().next().unwrap()
    }

    fn def_fact(params: Vec<ParamShape>) -> (DeclKey, Fact) {
        let k = DeclKey::new("a.c", 1, 1, "f");
        let ty = TypeShape::function(TypeShape::pointer("int", 1), params);
        (
            k.clone(),
            Fact::Declare(DeclFact::function(k, ty).global().definition()),
        )
    }

    #[test]
    fn wild_body_return_spreads_to_declaration() {
        let mut info = ProgramInfo::default();
        let (f, decl) = def_fact(vec![]);
        ConstraintBuilder::new(&mut info).add_facts(&[decl]).unwrap();
        let def = first(&info.get_variable(&f, true).unwrap());
        let ret = first(&info.arena.function(def).unwrap().returns);
        info.cs
            .add_wild(info.arena.pointer(ret).unwrap().slots[0], reasons::UNSAFE_CAST, None);
        info.cs.solve().unwrap();

        assert!(reconcile(&mut info).unwrap());
        info.cs.solve().unwrap();
        let decl = info.declaration_of(&f).unwrap();
        let decl_ret = first(&info.arena.function(decl).unwrap().returns);
        assert_eq!(info.arena.outermost(decl_ret, &info.cs), Some(Qualifier::Wild));
        assert!(!reconcile(&mut info).unwrap());
    }

    #[test]
    fn wild_declaration_return_widens_definition() {
        let mut info = ProgramInfo::default();
        let (f, decl) = def_fact(vec![]);
        ConstraintBuilder::new(&mut info).add_facts(&[decl]).unwrap();
        let decl = info.declaration_of(&f).unwrap();
        let decl_ret = first(&info.arena.function(decl).unwrap().returns);
        let site = info.arena.from_shape(
            &mut info.cs,
            "r",
            &TypeShape::pointer("int", 1),
            &Annotations::default(),
        );
        let site_slot = info.arena.pointer(site).unwrap().slots[0];
        info.cs.add_geq(site_slot, Qualifier::Arr, reasons::POINTER_ARITH, None);
        info.arena.record_argument(decl_ret, site);
        info.cs
            .add_wild(info.arena.pointer(decl_ret).unwrap().slots[0], reasons::UNSAFE_CAST, None);
        info.cs.solve().unwrap();

        assert!(reconcile(&mut info).unwrap());
        info.cs.solve().unwrap();
        let def = first(&info.get_variable(&f, true).unwrap());
        let def_ret = first(&info.arena.function(def).unwrap().returns);
        assert_eq!(info.arena.outermost(def_ret, &info.cs), Some(Qualifier::Arr));
    }

    #[test]
    fn checked_declaration_params_force_nothing() {
        let mut info = ProgramInfo::default();
        let p = DeclKey::new("a.c", 1, 8, "p");
        let (f, decl) = def_fact(vec![
            ParamShape::new("p", TypeShape::pointer("int", 1)).with_key(p.clone())
        ]);
        let facts = vec![
            decl,
            Fact::Arithmetic {
                expr: Expr::decl_in_context(p.clone()),
                loc: None,
            },
        ];
        ConstraintBuilder::new(&mut info).add_facts(&facts).unwrap();
        info.declaration_of(&f).unwrap();
        info.cs.solve().unwrap();
        assert!(!reconcile(&mut info).unwrap());
    }

    #[test]
    fn wild_declaration_param_widens_call_site_arguments() {
        let mut info = ProgramInfo::default();
        let p = DeclKey::new("a.c", 1, 8, "p");
        let (f, decl) = def_fact(vec![
            ParamShape::new("p", TypeShape::pointer("int", 1)).with_key(p.clone())
        ]);
        let facts = vec![
            decl,
            Fact::Arithmetic {
                expr: Expr::decl_in_context(p.clone()),
                loc: None,
            },
        ];
        ConstraintBuilder::new(&mut info).add_facts(&facts).unwrap();
        let decl_param = first(&info.param_of(&f, 0, false).unwrap());
        let arg = info.arena.from_shape(
            &mut info.cs,
            "a",
            &TypeShape::pointer("int", 1),
            &Annotations::default(),
        );
        info.arena.record_argument(decl_param, arg);
        info.cs.add_wild(
            info.arena.pointer(decl_param).unwrap().slots[0],
            reasons::UNSAFE_CAST,
            None,
        );
        info.cs.solve().unwrap();

        assert!(reconcile(&mut info).unwrap());
        info.cs.solve().unwrap();
        assert_eq!(info.arena.outermost(arg, &info.cs), Some(Qualifier::Arr));
    }

    #[test]
    fn wild_inner_param_level_widens_argument_inner_level() {
        let mut info = ProgramInfo::default();
        let p = DeclKey::new("a.c", 1, 8, "p");
        let (f, decl) = def_fact(vec![
            ParamShape::new("p", TypeShape::pointer("int", 2)).with_key(p.clone())
        ]);
        ConstraintBuilder::new(&mut info).add_facts(&[decl]).unwrap();
        let def_param = first(&info.param_of(&f, 0, true).unwrap());
        let decl_param = first(&info.param_of(&f, 0, false).unwrap());
        assert_ne!(def_param, decl_param);
        let inner = info.arena.pointer(def_param).unwrap().slots[1];
        info.cs.add_wild(inner, reasons::UNSAFE_CAST, None);
        let arg = info.arena.from_shape(
            &mut info.cs,
            "a",
            &TypeShape::pointer("int", 2),
            &Annotations::default(),
        );
        info.arena.record_argument(decl_param, arg);
        info.cs.add_wild(
            info.arena.pointer(decl_param).unwrap().slots[0],
            reasons::UNSAFE_CAST,
            None,
        );
        info.cs.solve().unwrap();

        assert!(reconcile(&mut info).unwrap());
        info.cs.solve().unwrap();
        assert_eq!(
            info.arena.solved_chain(def_param, &info.cs),
            vec![Qualifier::Ptr, Qualifier::Wild]
        );
        assert_eq!(
            info.arena.solved_chain(arg, &info.cs),
            vec![Qualifier::Ptr, Qualifier::Wild]
        );
    }
}
