//! Compiled form of one template *before* it is executed.
//!
//! Everything here is plain data: constants are stored as [`Const`] rather
//! than runtime values, so a [`Program`] is `Send + Sync` and can be shared
//! between renders on different threads.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtE => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtE => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

/// Where a name is looked up, decided once at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// Bound somewhere in the template (parameter, assignment or loop
    /// target). Reading it before it is bound is an unbound-local error.
    Local,
    /// Never bound by the template: `loop`, then globals, then builtins.
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Const),
    Name(String, NameScope),
    Attribute(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    BinaryOp(BinaryOp, Box<Expr>, Box<Expr>),
    UnaryOp(UnaryOp, Box<Expr>),
    /// Short-circuit; yields the deciding operand.
    BoolOp(BoolOp, Vec<Expr>),
    /// `a < b < c` is `Compare(a, [(<, b), (<, c)])`.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    /// `body if test else orelse`
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    ListLit(Vec<Expr>),
    TupleLit(Vec<Expr>),
    DictLit(Vec<(Expr, Expr)>),
}

/// Left-hand side of an assignment or a `for` header.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
    Index(Expr, Expr),
}

impl Target {
    pub fn collect_names(&self, out: &mut BTreeSet<String>) {
        match self {
            Target::Name(name) => {
                out.insert(name.clone());
            }
            Target::Tuple(items) => items.iter().for_each(|t| t.collect_names(out)),
            Target::Index(..) => {}
        }
    }
}

/// One piece of a text line.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    /// `escape` is false for the raw `$:` form.
    Emit { expr: Expr, escape: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    /// `$var name: text`
    Text(Vec<Segment>),
    /// `$var name = expr`
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A literal/body line: its segments followed by a newline unless the
    /// line ended with a continuation backslash.
    Line {
        segments: Vec<Segment>,
        newline: bool,
    },
    Assign(Target, Expr),
    /// `$ expr` evaluated for its side effects.
    Expr(Expr),
    /// Branches in source order; `None` is the `else` branch.
    If(Vec<(Option<Expr>, Vec<Stmt>)>),
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Var(String, VarValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// The `def with (...)` parameter list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub positional: Vec<Param>,
    /// `*name`
    pub rest: Option<String>,
    /// `**name`
    pub extra: Option<String>,
}

impl Params {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.positional
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.rest.as_deref())
            .chain(self.extra.as_deref())
    }
}

/// One compiled template source.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub params: Params,
    pub body: Vec<Stmt>,
    /// Every name the template binds; reads of these never fall back to
    /// globals.
    pub locals: BTreeSet<String>,
    /// Whether the source ended with a newline; if not, one trailing
    /// newline is trimmed from the rendered text.
    pub trailing_newline: bool,
}
