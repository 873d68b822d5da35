//! Resolved syntax tree handed over by a compiler front end.
//!
//! Only what the usage visitor looks at is modelled. Names are dotted binary
//! names (`pkg.Outer$Inner`); a symbol the front end could not resolve is a
//! [`Symbol::Error`] carrying the name as spelled.

use serde::{Deserialize, Serialize};

use crate::binary_name::ElementKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Resolved(String),
    Error(String),
}

impl Symbol {
    pub fn resolved(name: impl Into<String>) -> Self {
        Symbol::Resolved(name.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Symbol::Error(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Symbol::Resolved(name) | Symbol::Error(name) => name,
        }
    }

    /// The binary name, when the symbol resolved.
    pub fn binary_name(&self) -> Option<&str> {
        match self {
            Symbol::Resolved(name) => Some(name),
            Symbol::Error(_) => None,
        }
    }
}

/// A type in source, possibly parameterised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub symbol: Symbol,
    #[serde(default)]
    pub type_args: Vec<TypeRef>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            symbol: Symbol::resolved(name),
            type_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = TypeRef>) -> Self {
        self.type_args.extend(args);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Path relative to the source root, `/` separated.
    pub file_name: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub package_annotations: Vec<TypeRef>,
    #[serde(default)]
    pub imports: Vec<TypeRef>,
    #[serde(default)]
    pub types: Vec<ClassDecl>,
}

impl CompilationUnit {
    /// `a/b/Foo.java` -> `Foo`.
    pub fn primary_type_name(&self) -> &str {
        let file = self.file_name.rsplit('/').next().unwrap_or(&self.file_name);
        file.split('.').next().unwrap_or(file)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: Symbol,
    pub simple_name: String,
    pub kind: ElementKind,
    /// Declared inside a method or initializer.
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub annotations: Vec<TypeRef>,
    #[serde(default)]
    pub extends: Vec<TypeRef>,
    #[serde(default)]
    pub implements: Vec<TypeRef>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        let name = name.into();
        let simple_name = name
            .rfind(['.', '$'])
            .map_or(name.as_str(), |idx| &name[idx + 1..])
            .to_string();
        Self {
            name: Symbol::Resolved(name),
            simple_name,
            kind,
            local: false,
            is_private: false,
            annotations: Vec::new(),
            extends: Vec::new(),
            implements: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn extending(mut self, ty: TypeRef) -> Self {
        self.extends.push(ty);
        self
    }

    pub fn implementing(mut self, ty: TypeRef) -> Self {
        self.implements.push(ty);
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "member", rename_all = "snake_case")]
pub enum Member {
    Field {
        name: String,
        #[serde(default)]
        is_private: bool,
        ty: TypeRef,
        #[serde(default)]
        annotations: Vec<TypeRef>,
        #[serde(default)]
        init: Option<Expr>,
    },
    Method {
        name: String,
        #[serde(default)]
        is_private: bool,
        #[serde(default)]
        annotations: Vec<TypeRef>,
        #[serde(default)]
        return_type: Option<TypeRef>,
        #[serde(default)]
        params: Vec<Param>,
        #[serde(default)]
        throws: Vec<TypeRef>,
        #[serde(default)]
        body: Vec<Expr>,
    },
    Class(Box<ClassDecl>),
    Initializer {
        #[serde(default)]
        body: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

/// Expressions and statements, flattened to what carries references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    /// A simple name bound to a field of `owner`, or to a local when `owner`
    /// is absent.
    Ident {
        name: String,
        #[serde(default)]
        owner: Option<Symbol>,
    },
    FieldAccess {
        target: Option<Box<Expr>>,
        owner: Symbol,
        name: String,
    },
    MethodCall {
        target: Option<Box<Expr>>,
        owner: Symbol,
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    New {
        ty: TypeRef,
        #[serde(default)]
        args: Vec<Expr>,
        /// Anonymous class body.
        #[serde(default)]
        body: Option<Box<ClassDecl>>,
    },
    Lambda {
        functional_interface: Symbol,
        #[serde(default)]
        body: Vec<Expr>,
    },
    MemberRef {
        functional_interface: Symbol,
        owner: Symbol,
        name: String,
    },
    /// A type used in an expression position: casts, `instanceof`, class
    /// literals, static qualifiers.
    TypeUse { ty: TypeRef },
    LocalVar {
        name: String,
        ty: TypeRef,
        #[serde(default)]
        init: Option<Box<Expr>>,
    },
    LocalClass(Box<ClassDecl>),
    Literal,
    Block {
        #[serde(default)]
        body: Vec<Expr>,
    },
}
