//! Syntax tree produced by [`parser`](super::parser).
//!
//! Every node owns its children.  Function definitions sit behind an [`Rc`]
//! so a function value can outlive the statement that defined it without
//! copying the body.

use std::rc::Rc;

/// A whole template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub blocks: Vec<Block>,
}

/// One top-level unit of a template, or one run inside a statement body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Literal text, copied to the output.
    Text(String),
    /// `{: formula :}`: the formula's value is stringified and appended.
    Ref(Formula),
    /// `{@ … @}`: statements, no direct output.
    Code(Vec<Elem>),
}

/// A statement body.  Bodies may leave code mode (`@} text {@`), so they are
/// a sequence of blocks rather than a plain element list.
pub type Body = Vec<Block>;

#[derive(Debug, Clone, PartialEq)]
pub enum Elem {
    Def(Rc<FuncDef>),
    Stmt(Stmt),
    Formula(Formula),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Body,
}

// ── Statements ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    If {
        branches: Vec<(Expr, Body)>,
        else_body: Option<Body>,
    },
    For {
        kind: ForKind,
        body: Body,
    },
    Break,
    Continue,
    Return(Option<Formula>),
    Import(Import),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForKind {
    /// `for: … end`
    Forever,
    /// `for test: … end`
    While(Expr),
    /// `for init; cond; step: … end`
    Counted {
        init: Formula,
        cond: Expr,
        step: Formula,
    },
    /// `for name in test: … end`
    Each { var: String, iter: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Import {
    /// `import a.b [as m]`
    Module {
        path: Vec<String>,
        alias: Option<String>,
    },
    /// `from a.b import x, y`
    Names { path: Vec<String>, names: Vec<String> },
}

// ── Expressions ───────────────────────────────────────────────────────────────

/// The top of the expression grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// `a = b = c, d = e, f`
    Assign(Vec<Assign>),
    /// `a, b = c, d = 1, 2`: every list but the last is a target list.
    Multi(Vec<Vec<Expr>>),
}

/// `t1 = t2 = … = value`.  `targets` is empty for a bare expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub targets: Vec<Expr>,
    pub value: Expr,
}

impl Assign {
    pub fn bare(value: Expr) -> Self {
        Assign {
            targets: Vec::new(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

/// Operator of an augmented assignment (`+=` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl AugOp {
    pub fn bin_op(self) -> BinOp {
        match self {
            AugOp::Add => BinOp::Add,
            AugOp::Sub => BinOp::Sub,
            AugOp::Mul => BinOp::Mul,
            AugOp::Div => BinOp::Div,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Ident(String),
    Call { name: String, args: Vec<Expr> },
    Paren(Box<Formula>),
    /// Left-associative run of one precedence level: `e0 op1 e1 op2 e2 …`.
    /// Kept flat so long sums don't nest.
    Binary(Box<Expr>, Vec<(BinOp, Expr)>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    /// `head.m1.m2(…)`; members are `Ident` or `Call`, optionally indexed
    /// (`head.m()[0]`).
    Dot(Box<Expr>, Vec<Expr>),
    /// `target op= value`; evaluates to a reference to `target`.
    AugAssign(AugOp, Box<Expr>, Box<Expr>),
    /// `operand[k1][k2]…`
    Index(Box<Expr>, Vec<Expr>),
}

impl Expr {
    /// Whether this expression may appear on the left of `=`.
    pub fn is_assign_target(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Index(..))
    }

    /// Whether this expression may appear on the left of `+=` and friends.
    pub fn is_aug_target(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Index(..) | Expr::AugAssign(..))
    }
}
