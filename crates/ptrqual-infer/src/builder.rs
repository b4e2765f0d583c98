//! Turns facts into constraint variables and constraints.
//!
//! Declarations are recorded first, so the order of the remaining facts
//! does not matter. Each remaining fact resolves its expressions to sets of
//! constraint variables and relates them.

use ptrqual_common::SourceLoc;
use tracing::{debug, trace};

use crate::constraint::reasons;
use crate::cvar::{CVarId, CVarSet, ConstraintVariable, PointerVar};
use crate::error::InferError;
use crate::facts::{Expr, Fact};
use crate::program::ProgramInfo;
use crate::qual::Qualifier;

pub struct ConstraintBuilder<'a> {
    info: &'a mut ProgramInfo,
}

impl<'a> ConstraintBuilder<'a> {
    pub fn new(info: &'a mut ProgramInfo) -> Self {
        ConstraintBuilder { info }
    }

    /// Record every fact of one or more translation units.
    pub fn add_facts(&mut self, facts: &[Fact]) -> Result<(), InferError> {
        for fact in facts {
            if let Fact::Declare(decl) = fact {
                self.info.add_declaration(decl);
            }
        }
        for fact in facts {
            self.add_fact(fact)?;
        }
        debug!(
            facts = facts.len(),
            vars = self.info.cs.num_vars(),
            constraints = self.info.cs.len(),
            "constraints built"
        );
        Ok(())
    }

    fn add_fact(&mut self, fact: &Fact) -> Result<(), InferError> {
        match fact {
            Fact::Declare(_) => {}
            Fact::Assign { lhs, rhs, loc } => {
                let l = self.expr_vars(lhs)?;
                let r = self.expr_vars(rhs)?;
                self.info.arena.constrain_eq_sets(
                    &l,
                    &r,
                    &mut self.info.cs,
                    reasons::ASSIGNMENT,
                    loc.as_ref(),
                );
            }
            Fact::Call {
                callee,
                args,
                result,
                loc,
            } => self.add_call(callee, args, result.as_ref(), loc.as_ref())?,
            Fact::Return {
                function,
                expr,
                loc,
            } => {
                let funcs = self.info.get_variable(function, true)?;
                let value = self.expr_vars(expr)?;
                for f in funcs {
                    let returns = match self.info.arena.function(f) {
                        Some(func) => func.returns.clone(),
                        None => continue,
                    };
                    self.info.arena.constrain_eq_sets(
                        &returns,
                        &value,
                        &mut self.info.cs,
                        reasons::RETURN,
                        loc.as_ref(),
                    );
                }
            }
            Fact::Cast {
                expr,
                from,
                to,
                loc,
            } => {
                if !to.is_explicit_cast_safe(from) {
                    let vars = self.expr_vars(expr)?;
                    trace!(count = vars.len(), "unsafe cast");
                    self.info.arena.constrain_set_to_wild(
                        &vars,
                        &mut self.info.cs,
                        reasons::UNSAFE_CAST,
                        loc.as_ref(),
                    );
                }
            }
            Fact::Arithmetic { expr, loc } => {
                for c in self.expr_vars(expr)? {
                    let outer = self
                        .info
                        .arena
                        .pointer(c)
                        .and_then(|p| p.slots.first().copied());
                    if let Some(v) = outer {
                        self.info.cs.add_geq(
                            v,
                            Qualifier::Arr,
                            reasons::POINTER_ARITH,
                            loc.clone(),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn add_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        result: Option<&Expr>,
        loc: Option<&SourceLoc>,
    ) -> Result<(), InferError> {
        let targets = self.call_targets(callee)?;
        let mut arg_vars = Vec::with_capacity(args.len());
        for a in args {
            arg_vars.push(self.expr_vars(a)?);
        }
        let result_vars = match result {
            Some(r) => self.expr_vars(r)?,
            None => CVarSet::new(),
        };

        if targets.is_empty() {
            let arena = &self.info.arena;
            for set in arg_vars.iter().chain(Some(&result_vars)) {
                arena.constrain_set_to_wild(set, &mut self.info.cs, reasons::UNKNOWN_CALLEE, loc);
            }
            return Ok(());
        }

        for f in targets {
            let (params, returns) = match self.info.arena.function(f) {
                Some(func) => (func.params.clone(), func.returns.clone()),
                None => continue,
            };
            for (i, args) in arg_vars.iter().enumerate() {
                match params.get(i) {
                    Some(param) => self.bind(param, args, reasons::ARGUMENT, loc),
                    None if self.info.options.handle_varargs => {
                        self.info.arena.constrain_set_to_wild(
                            args,
                            &mut self.info.cs,
                            reasons::VARARGS,
                            loc,
                        );
                    }
                    None => {}
                }
            }
            self.bind(&returns, &result_vars, reasons::ASSIGNMENT, loc);
        }
        Ok(())
    }

    /// Equate call-site values with a parameter or return and remember them
    /// for reconciliation.
    fn bind(&mut self, formal: &CVarSet, actual: &CVarSet, reason: &str, loc: Option<&SourceLoc>) {
        for f in formal {
            for a in actual {
                self.info
                    .arena
                    .constrain_eq(*f, *a, &mut self.info.cs, reason, loc);
                self.info.arena.record_argument(*f, *a);
            }
        }
    }

    /// Function variables a call may reach: functions named directly, or
    /// the functions behind function pointers.
    fn call_targets(&mut self, callee: &Expr) -> Result<Vec<CVarId>, InferError> {
        let mut out = Vec::new();
        for c in self.expr_vars(callee)? {
            match self.info.arena.get(c) {
                ConstraintVariable::Function(_) => out.push(c),
                ConstraintVariable::Pointer(p) => out.extend(p.function),
            }
        }
        Ok(out)
    }

    /// The constraint variables an expression evaluates to.
    pub fn expr_vars(&mut self, expr: &Expr) -> Result<CVarSet, InferError> {
        Ok(match expr {
            Expr::Decl { key, in_context } => self.info.get_variable(key, *in_context)?,
            Expr::Deref { of } | Expr::Index { of } => {
                let mut out = CVarSet::new();
                for c in self.expr_vars(of)? {
                    if let Some(d) = self.info.arena.dereference(c)? {
                        out.insert(d);
                    }
                }
                out
            }
            Expr::AddrOf { of } => {
                let mut out = CVarSet::new();
                for c in self.expr_vars(of)? {
                    out.insert(self.info.arena.address_of(c, &mut self.info.cs));
                }
                out
            }
            Expr::Call { callee } => {
                let mut out = CVarSet::new();
                for f in self.call_targets(callee)? {
                    if let Some(func) = self.info.arena.function(f) {
                        out.extend(func.returns.iter().copied());
                    }
                }
                out
            }
            Expr::StringLiteral => {
                let v = self.info.cs.fresh_var();
                self.info
                    .cs
                    .add_geq(v, Qualifier::NtArr, reasons::STRING_LITERAL, None);
                let lit = PointerVar {
                    name: "<string literal>".to_string(),
                    base: "char".to_string(),
                    slots: vec![v],
                    function: None,
                    arr_present: false,
                    itype: None,
                    bounds_interop: false,
                    argument_constraints: CVarSet::new(),
                };
                CVarSet::from([self.info.arena.alloc(ConstraintVariable::Pointer(lit))])
            }
            Expr::Conditional { branches } => {
                let mut out = CVarSet::new();
                for b in branches {
                    out.extend(self.expr_vars(b)?);
                }
                out
            }
            Expr::Null | Expr::Other => CVarSet::new(),
        })
    }
}
