use std::rc::Rc;

use crate::diagnostics::SourcePos;

/// A parsed block of lines, shared between runners and function instances.
pub type Block = Rc<[Node]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Void,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::Less,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::Greater,
            ">=" => BinaryOp::GreaterEqual,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Group(Box<Node>),
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Assign {
        name: String,
        value: Box<Node>,
    },
    Access {
        object: Box<Node>,
        member: String,
    },
    Array(Vec<Node>),
    Index {
        object: Box<Node>,
        index: Box<Node>,
    },
    Await(Box<Node>),
}

/// An operator or named construct awaiting evaluation. `name` selects the
/// expression rule whose `run` handler evaluates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub name: &'static str,
    pub kind: ExprKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Function(FunctionDecl),
    Return(Option<Node>),
    If {
        condition: Node,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        condition: Node,
        body: Block,
    },
    Block(Block),
}

/// A keyword statement; `keyword` selects the statement rule that runs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub keyword: &'static str,
    pub kind: StmtKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Instance(Literal),
    Variable(Variable),
    Expr(Expr),
    Stmt(Box<Stmt>),
}

impl Node {
    pub fn expr(name: &'static str, kind: ExprKind, pos: SourcePos) -> Self {
        Node::Expr(Expr { name, kind, pos })
    }

    pub fn stmt(keyword: &'static str, kind: StmtKind, pos: SourcePos) -> Self {
        Node::Stmt(Box::new(Stmt { keyword, kind, pos }))
    }

    pub fn pos(&self) -> Option<&SourcePos> {
        match self {
            Node::Instance(_) => None,
            Node::Variable(var) => Some(&var.pos),
            Node::Expr(expr) => Some(&expr.pos),
            Node::Stmt(stmt) => Some(&stmt.pos),
        }
    }

    /// Short label used in diagnostics and trace output.
    pub fn describe(&self) -> String {
        match self {
            Node::Instance(Literal::Number(n)) => format!("number {n}"),
            Node::Instance(Literal::Str(s)) => format!("string {s:?}"),
            Node::Instance(Literal::Void) => "void".to_string(),
            Node::Variable(var) => format!("variable `{}`", var.name),
            Node::Expr(expr) => format!("{} expression", expr.name),
            Node::Stmt(stmt) => format!("{} statement", stmt.keyword),
        }
    }

    /// `name = expr` shape, as used by keyword arguments.
    pub fn as_assignment(&self) -> Option<(&str, &Node)> {
        match self {
            Node::Expr(Expr {
                kind: ExprKind::Assign { name, value },
                ..
            }) => Some((name.as_str(), value.as_ref())),
            _ => None,
        }
    }
}
