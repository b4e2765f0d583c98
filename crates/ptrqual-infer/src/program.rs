//! The program variable store.
//!
//! Maps every declaration identity to its constraint variables, keeps the
//! name-keyed global symbol tables used by linking, and owns the constraint
//! set and the constraint-variable arena. Function lookups distinguish the
//! definition (seen from inside its body) from the declaration (seen from
//! call sites); a definition with no declaration gets one synthesized on
//! first need.

use std::collections::{BTreeMap, BTreeSet};

use ptrqual_common::DeclKey;
use serde_json::json;
use tracing::{debug, trace};

use crate::config::Options;
use crate::constraint::reasons;
use crate::cvar::{Annotations, CVarArena, CVarId, CVarSet};
use crate::error::InferError;
use crate::facts::{DeclFact, DeclKind, TypeShape};
use crate::qual::VarId;
use crate::solver::Constraints;

/// What the store remembers about one function declaration or definition.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub key: DeclKey,
    pub cvar: CVarId,
    pub ty: TypeShape,
    pub is_definition: bool,
    pub is_global: bool,
    /// For definitions: the declaration the front end paired it with.
    pub declaration: Option<DeclKey>,
    pub itype: Option<String>,
    pub bounds_interop: bool,
    pub forced_wild: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct ProgramInfo {
    pub(crate) arena: CVarArena,
    pub(crate) cs: Constraints,
    pub(crate) options: Options,
    variables: BTreeMap<DeclKey, CVarSet>,
    /// Global variable name -> pointer variables declared with it.
    global_variables: BTreeMap<String, CVarSet>,
    /// Every function declaration or definition, by identity.
    functions: BTreeMap<DeclKey, FunctionDecl>,
    /// Function name -> whether a body has ever been seen.
    extern_functions: BTreeMap<String, bool>,
    /// Parameter identity -> (owning function, position).
    param_owner: BTreeMap<DeclKey, (DeclKey, usize)>,
    /// Synthesized declarations, by the definition's unique key.
    on_demand: BTreeMap<String, CVarId>,
    /// Source file -> whether it may be rewritten.
    files: BTreeMap<String, bool>,
}

impl ProgramInfo {
    pub fn new(options: Options) -> Self {
        ProgramInfo {
            options,
            ..Default::default()
        }
    }

    pub fn constraints(&self) -> &Constraints {
        &self.cs
    }

    pub fn constraints_mut(&mut self) -> &mut Constraints {
        &mut self.cs
    }

    pub fn arena(&self) -> &CVarArena {
        &self.arena
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn variables(&self) -> &BTreeMap<DeclKey, CVarSet> {
        &self.variables
    }

    pub fn global_variables(&self) -> &BTreeMap<String, CVarSet> {
        &self.global_variables
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.values()
    }

    pub fn function_decl(&self, key: &DeclKey) -> Option<&FunctionDecl> {
        self.functions.get(key)
    }

    pub fn extern_functions(&self) -> &BTreeMap<String, bool> {
        &self.extern_functions
    }

    /// Files that may be rewritten.
    pub fn rewritable_files(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .filter(|(_, ok)| **ok)
            .map(|(f, _)| f.clone())
            .collect()
    }

    pub fn is_rewritable(&self, file: &str) -> bool {
        self.files.get(file).copied().unwrap_or(false)
    }

    // ── Declarations ────────────────────────────────────────────────────

    /// Record a declaration fact. Non-pointer variables produce nothing.
    pub fn add_declaration(&mut self, fact: &DeclFact) {
        let rewritable = self.files.entry(fact.key.file.clone()).or_insert(true);
        *rewritable &= fact.rewritable;

        let forced = if fact.in_macro {
            Some(reasons::MACRO_DECL)
        } else if !fact.rewritable {
            Some(reasons::NOT_REWRITABLE)
        } else {
            None
        };
        let ann = Annotations {
            itype: fact.itype.clone(),
            bounds_interop: fact.bounds_interop,
            has_body: fact.is_definition,
        };

        if fact.kind == DeclKind::Function && fact.ty.is_function() {
            self.add_function(fact, ann, forced);
            return;
        }

        if fact.kind == DeclKind::Parameter && self.param_owner.contains_key(&fact.key) {
            // Already created with its function; only the policy applies.
            if let Some(reason) = forced {
                let set = self.variables.get(&fact.key).cloned().unwrap_or_default();
                let loc = fact.key.loc();
                self.arena
                    .constrain_set_to_wild(&set, &mut self.cs, reason, Some(&loc));
            }
            return;
        }

        if !fact.ty.is_pointer_like() {
            trace!(decl = %fact.key, "skipping non-pointer declaration");
            return;
        }
        let cv = self
            .arena
            .from_shape(&mut self.cs, fact.name(), &fact.ty, &ann);
        if let Some(reason) = forced {
            let loc = fact.key.loc();
            self.arena
                .constrain_to_wild(cv, &mut self.cs, reason, Some(&loc));
        }
        self.variables.entry(fact.key.clone()).or_default().insert(cv);
        if fact.is_global && fact.kind == DeclKind::Variable {
            self.global_variables
                .entry(fact.name().to_string())
                .or_default()
                .insert(cv);
        }
    }

    fn add_function(&mut self, fact: &DeclFact, ann: Annotations, forced: Option<&'static str>) {
        let cv = self
            .arena
            .from_shape(&mut self.cs, fact.name(), &fact.ty, &ann);
        if let Some(reason) = forced {
            let loc = fact.key.loc();
            self.arena
                .constrain_to_wild(cv, &mut self.cs, reason, Some(&loc));
        }
        self.variables.entry(fact.key.clone()).or_default().insert(cv);

        let has_body = self
            .extern_functions
            .entry(fact.name().to_string())
            .or_insert(false);
        *has_body |= fact.is_definition;

        if let (Some(shape), Some(func)) = (&fact.ty.function, self.arena.function(cv)) {
            let params = func.params.clone();
            for (i, (p, set)) in shape.params.iter().zip(params).enumerate() {
                if let Some(pkey) = &p.key {
                    self.param_owner
                        .entry(pkey.clone())
                        .or_insert_with(|| (fact.key.clone(), i));
                    self.variables.entry(pkey.clone()).or_default().extend(set);
                }
            }
        }

        self.functions
            .entry(fact.key.clone())
            .or_insert_with(|| FunctionDecl {
                key: fact.key.clone(),
                cvar: cv,
                ty: fact.ty.clone(),
                is_definition: fact.is_definition,
                is_global: fact.is_global,
                declaration: fact.declaration.clone(),
                itype: fact.itype.clone(),
                bounds_interop: fact.bounds_interop,
                forced_wild: forced,
            });
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// The constraint variables for a declaration.
    ///
    /// In-context lookups (a function's own return or parameters, seen from
    /// its body) resolve to the definition's variables; out-of-context
    /// lookups of functions and parameters resolve through the function's
    /// declaration. Unknown identities give an empty set.
    pub fn get_variable(&mut self, key: &DeclKey, in_context: bool) -> Result<CVarSet, InferError> {
        if in_context {
            return Ok(self.variables.get(key).cloned().unwrap_or_default());
        }
        if self.functions.contains_key(key) {
            let f = self.out_of_context_function(key)?;
            return Ok(CVarSet::from([f]));
        }
        if let Some((owner, index)) = self.param_owner.get(key).cloned() {
            return self.param_of(&owner, index, false);
        }
        Ok(self.variables.get(key).cloned().unwrap_or_default())
    }

    /// Parameter `index` of a function, seen from inside or outside.
    pub fn param_of(
        &mut self,
        function: &DeclKey,
        index: usize,
        in_context: bool,
    ) -> Result<CVarSet, InferError> {
        let fv = if in_context {
            self.functions
                .get(function)
                .map(|f| f.cvar)
                .ok_or_else(|| InferError::UnknownFunction(function.clone()))?
        } else {
            self.out_of_context_function(function)?
        };
        let func = self
            .arena
            .function(fv)
            .ok_or_else(|| InferError::UnknownFunction(function.clone()))?;
        func.params
            .get(index)
            .cloned()
            .ok_or_else(|| InferError::ParamOutOfRange {
                function: function.name.clone(),
                index,
                arity: func.params.len(),
            })
    }

    /// The function variable call sites see for `key`: the key itself if it
    /// is a declaration, else the definition's paired declaration, else a
    /// synthesized one.
    pub fn out_of_context_function(&mut self, key: &DeclKey) -> Result<CVarId, InferError> {
        let f = self
            .functions
            .get(key)
            .ok_or_else(|| InferError::UnknownFunction(key.clone()))?;
        if !f.is_definition {
            return Ok(f.cvar);
        }
        if let Some(decl) = f.declaration.as_ref().and_then(|d| self.functions.get(d)) {
            return Ok(decl.cvar);
        }
        self.synthesize_declaration(key)
    }

    /// The declaration-side variable of a definition, synthesizing it if no
    /// declaration is known.
    pub fn declaration_of(&mut self, def: &DeclKey) -> Result<CVarId, InferError> {
        self.out_of_context_function(def)
    }

    /// The synthesized declaration for a definition, if one exists yet.
    pub fn synthesized(&self, def: &DeclKey) -> Option<CVarId> {
        self.on_demand.get(&def.unique_key()).copied()
    }

    fn synthesize_declaration(&mut self, def: &DeclKey) -> Result<CVarId, InferError> {
        let unique = def.unique_key();
        if let Some(cv) = self.on_demand.get(&unique) {
            return Ok(*cv);
        }
        let f = self
            .functions
            .get(def)
            .cloned()
            .ok_or_else(|| InferError::UnknownFunction(def.clone()))?;
        let ann = Annotations {
            itype: f.itype.clone(),
            bounds_interop: f.bounds_interop,
            has_body: false,
        };
        let cv = self
            .arena
            .from_shape(&mut self.cs, &def.name, &f.ty, &ann);
        if let Some(reason) = f.forced_wild {
            let loc = def.loc();
            self.arena
                .constrain_to_wild(cv, &mut self.cs, reason, Some(&loc));
        }
        debug!(function = %def.name, cvar = %cv, "synthesized declaration");
        self.on_demand.insert(unique, cv);
        Ok(cv)
    }

    /// Definitions of global functions with no paired declaration.
    pub(crate) fn undeclared_definitions(&self) -> Vec<DeclKey> {
        self.functions
            .values()
            .filter(|f| {
                f.is_definition
                    && f.declaration
                        .as_ref()
                        .map_or(true, |d| !self.functions.contains_key(d))
            })
            .map(|f| f.key.clone())
            .collect()
    }

    /// Every solver slot owned by a declaration in a rewritable file, with
    /// the declaration it belongs to. The first declaration wins when
    /// linked declarations share slots.
    pub fn slot_sources(&self) -> BTreeMap<VarId, DeclKey> {
        let mut out = BTreeMap::new();
        for (key, set) in &self.variables {
            if !self.is_rewritable(&key.file) {
                continue;
            }
            for cv in set {
                for v in self.arena.vars_of(*cv) {
                    out.entry(v).or_insert_with(|| key.clone());
                }
            }
        }
        out
    }

    /// Solver slots grouped by the file of the declaration that owns them.
    pub fn slots_by_file(&self) -> BTreeMap<String, BTreeSet<VarId>> {
        let mut out: BTreeMap<String, BTreeSet<VarId>> = BTreeMap::new();
        for (key, set) in &self.variables {
            let slots = out.entry(key.file.clone()).or_default();
            for cv in set {
                slots.extend(self.arena.vars_of(*cv));
            }
        }
        out
    }

    /// Dump the constraint set and the variable store with current
    /// solutions.
    pub fn dump_json(&self) -> serde_json::Value {
        let variables: BTreeMap<String, Vec<String>> = self
            .variables
            .iter()
            .map(|(k, set)| {
                let rendered = set
                    .iter()
                    .map(|cv| self.arena.solved(*cv, &self.cs).to_string())
                    .collect();
                (k.to_string(), rendered)
            })
            .collect();
        json!({
            "constraints": self.cs,
            "variables": variables,
            "extern_functions": self.extern_functions,
        })
    }
}
