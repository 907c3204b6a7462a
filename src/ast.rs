use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Concat, // ~
    Mul,
    Div,
    Rem,
}

impl BinOp {
    /// Binding power; higher binds tighter. All levels are left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::NotEq => 3,
            BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => 4,
            BinOp::Add | BinOp::Sub | BinOp::Concat => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

/// How a member access was written. Both styles resolve identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStyle {
    Dot,     // foo.bar
    Bracket, // foo['bar']
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Array(Vec<Expr>),
    Mapping(Vec<(Expr, Expr)>),
    Member {
        object: Box<Expr>,
        key: Box<Expr>,
        style: AccessStyle,
    },
    Filter {
        input: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `name(args)`: a context callable, or a filter applied to its first argument.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    Set {
        name: String,
        value: Expr,
    },
    /// `{% set name %}...{% endset %}`: the rendered body is assigned.
    SetBlock {
        name: String,
        body: Vec<Node>,
    },
    For {
        key: Option<String>,   // `key` in `for key, value in ...`
        value: String,         // e.g., "item"
        iterable: Expr,
        body: Vec<Node>,
        else_body: Option<Vec<Node>>, // rendered when nothing was iterated
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>, // (condition, body). Includes if and elseifs.
        else_body: Option<Vec<Node>>,
    },
}
