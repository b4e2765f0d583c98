//! Facts consumed from the extraction front end.
//!
//! The engine never looks at C source. A front end walks each translation
//! unit and emits a stream of these facts (typically as JSON, one array per
//! unit); the engine turns them into constraint variables and constraints.

use ptrqual_common::{DeclKey, SourceLoc};
use serde::{Deserialize, Serialize};

fn yes() -> bool {
    true
}

/// One level of indirection in a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Pointer,
    Array,
}

/// The syntactic shape of a declared type, as far as pointer inference
/// cares: a base type name, the pointer/array levels wrapped around it
/// (outermost first), and the function signature if the base is a
/// function type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeShape {
    pub base: String,
    #[serde(default)]
    pub levels: Vec<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Box<FunctionShape>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionShape {
    pub ret: TypeShape,
    #[serde(default)]
    pub params: Vec<ParamShape>,
    #[serde(default = "yes")]
    pub has_prototype: bool,
    #[serde(default)]
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamShape {
    #[serde(default)]
    pub name: String,
    pub ty: TypeShape,
    /// Identity of the parameter declaration, when the front end has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<DeclKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itype: Option<String>,
}

/// Classification of non-pointer base types for cast checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarClass {
    Char,
    Integer,
    Floating,
}

fn scalar_class(base: &str) -> Option<ScalarClass> {
    let words: Vec<&str> = base
        .split_whitespace()
        .filter(|w| !matches!(*w, "const" | "volatile" | "restrict"))
        .collect();
    match words.as_slice() {
        ["char"] | ["signed", "char"] | ["unsigned", "char"] => Some(ScalarClass::Char),
        ["float"] | ["double"] | ["long", "double"] => Some(ScalarClass::Floating),
        ["_Bool"] | ["bool"] | ["size_t"] | ["ssize_t"] | ["ptrdiff_t"] | ["intptr_t"]
        | ["uintptr_t"] => Some(ScalarClass::Integer),
        ws if !ws.is_empty()
            && ws
                .iter()
                .all(|w| matches!(*w, "int" | "short" | "long" | "signed" | "unsigned")) =>
        {
            Some(ScalarClass::Integer)
        }
        _ => None,
    }
}

impl TypeShape {
    /// A non-pointer type.
    pub fn scalar(base: impl Into<String>) -> Self {
        TypeShape {
            base: base.into(),
            levels: Vec::new(),
            function: None,
        }
    }

    /// `base` wrapped in `depth` pointer levels.
    pub fn pointer(base: impl Into<String>, depth: usize) -> Self {
        TypeShape {
            base: base.into(),
            levels: vec![Level::Pointer; depth],
            function: None,
        }
    }

    /// A bare function type.
    pub fn function(ret: TypeShape, params: Vec<ParamShape>) -> Self {
        TypeShape {
            base: String::new(),
            levels: Vec::new(),
            function: Some(Box::new(FunctionShape {
                ret,
                params,
                has_prototype: true,
                variadic: false,
            })),
        }
    }

    /// Wrap this type in one more outer level.
    pub fn wrap(mut self, level: Level) -> Self {
        self.levels.insert(0, level);
        self
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_pointer_like(&self) -> bool {
        !self.levels.is_empty()
    }

    pub fn is_function(&self) -> bool {
        self.levels.is_empty() && self.function.is_some()
    }

    /// The type one level in, if this is a pointer or array.
    pub fn pointee(&self) -> Option<TypeShape> {
        if self.levels.is_empty() {
            return None;
        }
        Some(TypeShape {
            base: self.base.clone(),
            levels: self.levels[1..].to_vec(),
            function: self.function.clone(),
        })
    }

    /// Whether an explicit cast from `src` to `self` keeps pointer safety.
    ///
    /// Identical types are safe. Pointers compare their pointees; a pointer
    /// against a non-pointer is not safe. Non-scalar bases must match
    /// exactly, scalar bases must agree on the char/integer/floating class.
    pub fn is_explicit_cast_safe(&self, src: &TypeShape) -> bool {
        if self == src {
            return true;
        }
        match (self.pointee(), src.pointee()) {
            (Some(d), Some(s)) => return d.is_explicit_cast_safe(&s),
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => {}
        }
        if self.function.is_some() || src.function.is_some() {
            return false;
        }
        match (scalar_class(&self.base), scalar_class(&src.base)) {
            (Some(d), Some(s)) => d == s,
            _ => self.base == src.base,
        }
    }
}

impl ParamShape {
    pub fn new(name: impl Into<String>, ty: TypeShape) -> Self {
        ParamShape {
            name: name.into(),
            ty,
            key: None,
            itype: None,
        }
    }

    pub fn with_key(mut self, key: DeclKey) -> Self {
        self.key = Some(key);
        self
    }
}

/// What kind of declarator a declaration fact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Variable,
    Field,
    Parameter,
    Function,
}

/// "A declaration was seen."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclFact {
    pub key: DeclKey,
    pub kind: DeclKind,
    pub ty: TypeShape,
    /// Externally visible (global variable or non-static function).
    #[serde(default)]
    pub is_global: bool,
    /// For functions: this declaration carries the body.
    #[serde(default)]
    pub is_definition: bool,
    #[serde(default = "yes")]
    pub rewritable: bool,
    #[serde(default)]
    pub in_macro: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itype: Option<String>,
    #[serde(default)]
    pub bounds_interop: bool,
    /// For function definitions: the key of the declaration (prototype) the
    /// front end paired with it, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<DeclKey>,
}

impl DeclFact {
    pub fn new(key: DeclKey, kind: DeclKind, ty: TypeShape) -> Self {
        DeclFact {
            key,
            kind,
            ty,
            is_global: false,
            is_definition: false,
            rewritable: true,
            in_macro: false,
            itype: None,
            bounds_interop: false,
            declaration: None,
        }
    }

    pub fn variable(key: DeclKey, ty: TypeShape) -> Self {
        Self::new(key, DeclKind::Variable, ty)
    }

    pub fn function(key: DeclKey, ty: TypeShape) -> Self {
        Self::new(key, DeclKind::Function, ty)
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub fn definition(mut self) -> Self {
        self.is_definition = true;
        self
    }

    pub fn paired_with(mut self, declaration: DeclKey) -> Self {
        self.declaration = Some(declaration);
        self
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// An expression, reduced to what matters for finding the constraint
/// variables it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    /// A reference to a declaration. `in_context` is set for references
    /// from inside the function that owns the declaration (its own
    /// parameters, or its return slot).
    Decl {
        key: DeclKey,
        #[serde(default)]
        in_context: bool,
    },
    Deref {
        of: Box<Expr>,
    },
    Index {
        of: Box<Expr>,
    },
    AddrOf {
        of: Box<Expr>,
    },
    /// The value returned by a call.
    Call {
        callee: Box<Expr>,
    },
    StringLiteral,
    Conditional {
        branches: Vec<Expr>,
    },
    Null,
    Other,
}

impl Expr {
    pub fn decl(key: DeclKey) -> Self {
        Expr::Decl {
            key,
            in_context: false,
        }
    }

    pub fn decl_in_context(key: DeclKey) -> Self {
        Expr::Decl {
            key,
            in_context: true,
        }
    }

    pub fn addr_of(of: Expr) -> Self {
        Expr::AddrOf { of: Box::new(of) }
    }

    pub fn deref(of: Expr) -> Self {
        Expr::Deref { of: Box::new(of) }
    }

    pub fn call(callee: Expr) -> Self {
        Expr::Call {
            callee: Box::new(callee),
        }
    }
}

/// One fact from the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum Fact {
    Declare(DeclFact),
    Assign {
        lhs: Expr,
        rhs: Expr,
        #[serde(default)]
        loc: Option<SourceLoc>,
    },
    Call {
        callee: Expr,
        #[serde(default)]
        args: Vec<Expr>,
        /// Where the returned value is stored, if anywhere.
        #[serde(default)]
        result: Option<Expr>,
        #[serde(default)]
        loc: Option<SourceLoc>,
    },
    Return {
        function: DeclKey,
        expr: Expr,
        #[serde(default)]
        loc: Option<SourceLoc>,
    },
    Cast {
        expr: Expr,
        from: TypeShape,
        to: TypeShape,
        #[serde(default)]
        loc: Option<SourceLoc>,
    },
    /// Pointer arithmetic or subscripting on the expression.
    Arithmetic {
        expr: Expr,
        #[serde(default)]
        loc: Option<SourceLoc>,
    },
}
