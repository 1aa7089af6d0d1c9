//! Statement and expression rule tables.
//!
//! A rule couples how a construct is recognised and parsed with how the VM
//! runs the node it produced. Nodes name the rule that runs them (a
//! statement's keyword, an expression's `name`), so registering a rule ahead
//! of the standard ones is enough to extend the language.

use std::{fmt, rc::Rc};

use crate::{
    ast::{
        BinaryOp, Expr, ExprKind, FunctionDecl, Literal, Node, Stmt, StmtKind, UnaryOp, Variable,
    },
    call,
    class::{FunctionBody, FunctionData, Instance, InstanceData, Params},
    context::ContextId,
    diagnostics::{Diagnostic, Result},
    lexer::{Lexer, TokenKind, unescape},
    parser::{self, KEYWORDS, Parser},
    vm::Vm,
};

pub type Matcher = fn(&Parser<'_>) -> bool;
pub type StatementParse = fn(&mut Parser<'_>) -> std::result::Result<Node, Diagnostic>;
pub type StatementRun = fn(&mut Vm, &Stmt, ContextId) -> Result<Option<Instance>>;
pub type PrefixParse = fn(&mut Parser<'_>, u32) -> std::result::Result<Node, Diagnostic>;
pub type InfixParse = fn(&mut Parser<'_>, Node, u32) -> std::result::Result<Node, Diagnostic>;
pub type ExpressionRun = fn(&mut Vm, &Expr, ContextId) -> Result<Instance>;

pub const PREC_OR: u32 = 4;
pub const PREC_AND: u32 = 5;
pub const PREC_EQUALITY: u32 = 10;
pub const PREC_COMPARISON: u32 = 15;
pub const PREC_TERM: u32 = 20;
pub const PREC_FACTOR: u32 = 30;
pub const PREC_UNARY: u32 = 40;
pub const PREC_POSTFIX: u32 = 1000;
pub const PREC_ASSIGN: u32 = 100_000;

pub struct StatementRule {
    /// Also the keyword of the statements it produces.
    pub name: &'static str,
    pub matches: Matcher,
    pub parse: StatementParse,
    pub run: StatementRun,
}

impl fmt::Debug for StatementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementRule").field("name", &self.name).finish_non_exhaustive()
    }
}

pub struct ExpressionRule {
    pub name: &'static str,
    /// Expression names this rule's `run` evaluates.
    pub runs: &'static [&'static str],
    pub precedence: u32,
    pub matches: Matcher,
    pub prefix: Option<PrefixParse>,
    pub infix: Option<InfixParse>,
    pub run: Option<ExpressionRun>,
}

impl fmt::Debug for ExpressionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionRule")
            .field("name", &self.name)
            .field("runs", &self.runs)
            .field("precedence", &self.precedence)
            .field("prefix", &self.prefix.is_some())
            .field("infix", &self.infix.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct RuleSet {
    pub lexer: Lexer,
    pub statements: Vec<StatementRule>,
    pub expressions: Vec<ExpressionRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleSet {
    pub fn standard() -> Self {
        Self {
            lexer: Lexer::new(),
            statements: standard_statements(),
            expressions: standard_expressions(),
        }
    }

    /// Adds a statement rule ahead of every existing one.
    pub fn register_statement(&mut self, rule: StatementRule) {
        self.statements.insert(0, rule);
    }

    /// Adds an expression rule ahead of every existing one.
    pub fn register_expression(&mut self, rule: ExpressionRule) {
        self.expressions.insert(0, rule);
    }

    pub fn parse(&self, source: &str) -> std::result::Result<Vec<Node>, Diagnostic> {
        parser::parse_source(self, source)
    }

    pub fn statement_handler(&self, keyword: &str) -> Option<StatementRun> {
        self.statements
            .iter()
            .find(|rule| rule.name == keyword)
            .map(|rule| rule.run)
    }

    pub fn expression_handler(&self, name: &str) -> Option<ExpressionRun> {
        self.expressions
            .iter()
            .filter(|rule| rule.runs.contains(&name))
            .find_map(|rule| rule.run)
    }
}

fn standard_statements() -> Vec<StatementRule> {
    vec![
        StatementRule {
            name: "fn",
            matches: |p| {
                p.is_word("fn") || (p.is_word("async") && p.peek_at(1).is(TokenKind::Ident, "fn"))
            },
            parse: parse_function,
            run: run_function,
        },
        StatementRule {
            name: "return",
            matches: |p| p.is_word("return"),
            parse: parse_return,
            run: run_return,
        },
        StatementRule {
            name: "if",
            matches: |p| p.is_word("if"),
            parse: parse_if,
            run: run_if,
        },
        StatementRule {
            name: "while",
            matches: |p| p.is_word("while"),
            parse: parse_while,
            run: run_while,
        },
        StatementRule {
            name: "block",
            matches: |p| p.is_bracket("{"),
            parse: |p| {
                let pos = p.pos();
                let block = p.parse_block()?;
                Ok(Node::stmt("block", StmtKind::Block(block), pos))
            },
            run: |vm, stmt, ctx| {
                if let StmtKind::Block(block) = &stmt.kind {
                    vm.run_block(block, ctx)?;
                }
                Ok(None)
            },
        },
    ]
}

fn standard_expressions() -> Vec<ExpressionRule> {
    vec![
        ExpressionRule {
            name: "string",
            runs: &[],
            precedence: PREC_POSTFIX,
            matches: |p| p.is_kind(TokenKind::Str),
            prefix: Some(|p, _| Ok(Node::Instance(Literal::Str(unescape(&p.advance().text))))),
            infix: None,
            run: None,
        },
        ExpressionRule {
            name: "number",
            runs: &[],
            precedence: PREC_POSTFIX,
            matches: |p| p.is_kind(TokenKind::Number),
            prefix: Some(parse_number),
            infix: None,
            run: None,
        },
        ExpressionRule {
            name: "await",
            runs: &["await"],
            precedence: PREC_UNARY,
            matches: |p| p.is_word("await"),
            prefix: Some(|p, precedence| {
                let pos = p.advance().pos;
                let operand = p.parse_expr(precedence)?;
                Ok(Node::expr("await", ExprKind::Await(Box::new(operand)), pos))
            }),
            infix: None,
            run: Some(run_await),
        },
        ExpressionRule {
            name: "variable",
            runs: &[],
            precedence: PREC_POSTFIX,
            matches: |p| p.is_kind(TokenKind::Ident) && !KEYWORDS.contains(&p.peek().text.as_str()),
            prefix: Some(|p, _| {
                let token = p.advance();
                Ok(Node::Variable(Variable {
                    name: token.text,
                    pos: token.pos,
                }))
            }),
            infix: None,
            run: None,
        },
        ExpressionRule {
            name: "bracket",
            runs: &["group", "call"],
            precedence: PREC_POSTFIX,
            matches: |p| p.is_bracket("("),
            prefix: Some(parse_group),
            infix: Some(parse_call),
            run: Some(run_bracket),
        },
        ExpressionRule {
            name: "array",
            runs: &["array", "index"],
            precedence: PREC_POSTFIX,
            matches: |p| p.is_bracket("["),
            prefix: Some(|p, _| {
                let open = p.advance();
                let items = p.parse_list(&open, "]")?;
                Ok(Node::expr("array", ExprKind::Array(items), open.pos))
            }),
            infix: Some(|p, left, _| {
                let open = p.advance();
                let index = p.parse_expr(0)?;
                p.expect_closing(&open, "]")?;
                Ok(Node::expr(
                    "index",
                    ExprKind::Index {
                        object: Box::new(left),
                        index: Box::new(index),
                    },
                    open.pos,
                ))
            }),
            run: Some(run_array),
        },
        ExpressionRule {
            name: "access",
            runs: &["access"],
            precedence: PREC_POSTFIX,
            matches: |p| p.is_symbol("."),
            prefix: None,
            infix: Some(|p, left, _| {
                let pos = p.advance().pos;
                let member = p.expect_ident("member name")?;
                Ok(Node::expr(
                    "access",
                    ExprKind::Access {
                        object: Box::new(left),
                        member: member.text,
                    },
                    pos,
                ))
            }),
            run: Some(run_access),
        },
        ExpressionRule {
            name: "unary",
            runs: &["unary"],
            precedence: PREC_UNARY,
            matches: |p| p.is_symbol("-") || p.is_symbol("!"),
            prefix: Some(parse_unary),
            infix: None,
            run: Some(run_unary),
        },
        binary_rule("or", PREC_OR, |p| p.is_symbol("||")),
        binary_rule("and", PREC_AND, |p| p.is_symbol("&&")),
        binary_rule("equality", PREC_EQUALITY, |p| p.is_symbol("==") || p.is_symbol("!=")),
        binary_rule("comparison", PREC_COMPARISON, |p| {
            ["<", "<=", ">", ">="].iter().any(|op| p.is_symbol(op))
        }),
        binary_rule("term", PREC_TERM, |p| p.is_symbol("+") || p.is_symbol("-")),
        binary_rule("factor", PREC_FACTOR, |p| {
            ["*", "/", "%"].iter().any(|op| p.is_symbol(op))
        }),
        ExpressionRule {
            name: "assign",
            runs: &["assign"],
            precedence: PREC_ASSIGN,
            matches: |p| p.is_symbol("="),
            prefix: None,
            infix: Some(parse_assign),
            run: Some(run_assign),
        },
    ]
}

fn binary_rule(name: &'static str, precedence: u32, matches: Matcher) -> ExpressionRule {
    ExpressionRule {
        name,
        runs: &["binary"],
        precedence,
        matches,
        prefix: None,
        infix: Some(parse_binary),
        run: Some(run_binary),
    }
}

fn parse_function(p: &mut Parser<'_>) -> std::result::Result<Node, Diagnostic> {
    let pos = p.pos();
    let is_async = p.is_word("async");
    if is_async {
        p.advance();
    }
    p.expect(TokenKind::Ident, "fn")?;
    let name = p.expect_ident("function name")?.text;
    let open = p.expect(TokenKind::Bracket, "(")?;
    let mut params: Vec<String> = Vec::new();
    if p.is_bracket(")") {
        p.advance();
    } else {
        loop {
            let param = p.expect_ident("parameter name")?;
            if params.contains(&param.text) {
                return Err(Diagnostic::parser(format!(
                    "duplicate parameter `{}` in `{name}`",
                    param.text
                ))
                .with_pos(param.pos));
            }
            params.push(param.text);
            if p.is_symbol(",") {
                p.advance();
                continue;
            }
            p.expect_closing(&open, ")")?;
            break;
        }
    }
    let body = p.parse_block()?;
    Ok(Node::stmt(
        "fn",
        StmtKind::Function(FunctionDecl {
            name,
            params,
            body,
            is_async,
        }),
        pos,
    ))
}

fn run_function(vm: &mut Vm, stmt: &Stmt, ctx: ContextId) -> Result<Option<Instance>> {
    let StmtKind::Function(decl) = &stmt.kind else {
        return Err(mismatch(stmt.keyword));
    };
    let function = vm.classes.function(FunctionData {
        name: decl.name.clone(),
        params: Params::named(decl.params.iter().cloned()),
        body: FunctionBody::Script(Rc::clone(&decl.body)),
        is_async: decl.is_async,
    });
    vm.contexts.set_var(ctx, decl.name.clone(), function)?;
    Ok(None)
}

fn parse_return(p: &mut Parser<'_>) -> std::result::Result<Node, Diagnostic> {
    let pos = p.advance().pos;
    let value = if p.is_kind(TokenKind::Separator) || p.is_bracket("}") || p.at_end() {
        None
    } else {
        Some(p.parse_expr(0)?)
    };
    Ok(Node::stmt("return", StmtKind::Return(value), pos))
}

fn run_return(vm: &mut Vm, stmt: &Stmt, ctx: ContextId) -> Result<Option<Instance>> {
    let StmtKind::Return(value) = &stmt.kind else {
        return Err(mismatch(stmt.keyword));
    };
    let value = match value {
        Some(node) => vm.eval(node, ctx)?,
        None => vm.classes.void(),
    };
    vm.contexts.set_return(ctx, value)?;
    Ok(None)
}

fn parse_condition(p: &mut Parser<'_>) -> std::result::Result<Node, Diagnostic> {
    let open = p.expect(TokenKind::Bracket, "(")?;
    let condition = p.parse_expr(0)?;
    p.expect_closing(&open, ")")?;
    Ok(condition)
}

fn parse_if(p: &mut Parser<'_>) -> std::result::Result<Node, Diagnostic> {
    let pos = p.advance().pos;
    let condition = parse_condition(p)?;
    let then_branch = p.parse_body()?;
    let else_branch = if p.is_word("else") {
        p.advance();
        Some(p.parse_body()?)
    } else {
        None
    };
    Ok(Node::stmt(
        "if",
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        },
        pos,
    ))
}

fn run_if(vm: &mut Vm, stmt: &Stmt, ctx: ContextId) -> Result<Option<Instance>> {
    let StmtKind::If {
        condition,
        then_branch,
        else_branch,
    } = &stmt.kind
    else {
        return Err(mismatch(stmt.keyword));
    };
    let value = vm.eval(condition, ctx)?;
    if vm.truthy(&value, ctx)? {
        vm.run_block(then_branch, ctx)?;
    } else if let Some(block) = else_branch {
        vm.run_block(block, ctx)?;
    }
    Ok(None)
}

fn parse_while(p: &mut Parser<'_>) -> std::result::Result<Node, Diagnostic> {
    let pos = p.advance().pos;
    let condition = parse_condition(p)?;
    let body = p.parse_body()?;
    Ok(Node::stmt("while", StmtKind::While { condition, body }, pos))
}

fn run_while(vm: &mut Vm, stmt: &Stmt, ctx: ContextId) -> Result<Option<Instance>> {
    let StmtKind::While { condition, body } = &stmt.kind else {
        return Err(mismatch(stmt.keyword));
    };
    while !vm.unwinding(ctx)? {
        let value = vm.eval(condition, ctx)?;
        if !vm.truthy(&value, ctx)? {
            break;
        }
        vm.run_block(body, ctx)?;
    }
    Ok(None)
}

fn parse_number(p: &mut Parser<'_>, _: u32) -> std::result::Result<Node, Diagnostic> {
    let token = p.advance();
    let value: f64 = token.text.parse().map_err(|_| {
        Diagnostic::parser(format!("invalid number literal `{}`", token.text))
            .with_pos(token.pos.clone())
    })?;
    Ok(Node::Instance(Literal::Number(value)))
}

fn parse_group(p: &mut Parser<'_>, _: u32) -> std::result::Result<Node, Diagnostic> {
    let open = p.advance();
    let inner = p.parse_expr(0)?;
    p.expect_closing(&open, ")")?;
    Ok(Node::expr("group", ExprKind::Group(Box::new(inner)), open.pos))
}

fn parse_call(p: &mut Parser<'_>, callee: Node, _: u32) -> std::result::Result<Node, Diagnostic> {
    let open = p.advance();
    let args = p.parse_list(&open, ")")?;
    Ok(Node::expr(
        "call",
        ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        open.pos,
    ))
}

fn parse_unary(p: &mut Parser<'_>, precedence: u32) -> std::result::Result<Node, Diagnostic> {
    let token = p.advance();
    let op = if token.text == "-" { UnaryOp::Negate } else { UnaryOp::Not };
    let operand = p.parse_expr(precedence)?;
    Ok(Node::expr(
        "unary",
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        token.pos,
    ))
}

/// Left-associative: the right operand binds only tighter operators.
fn parse_binary(
    p: &mut Parser<'_>,
    left: Node,
    precedence: u32,
) -> std::result::Result<Node, Diagnostic> {
    let token = p.advance();
    let op = BinaryOp::from_symbol(&token.text).ok_or_else(|| {
        Diagnostic::parser(format!("`{}` is not a binary operator", token.text))
            .with_pos(token.pos.clone())
    })?;
    let right = p.parse_expr(precedence)?;
    Ok(Node::expr(
        "binary",
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        token.pos,
    ))
}

/// Right-associative: the value is parsed from the lowest precedence.
fn parse_assign(p: &mut Parser<'_>, target: Node, _: u32) -> std::result::Result<Node, Diagnostic> {
    let token = p.advance();
    let name = match target {
        Node::Variable(Variable { name, .. }) => name,
        other => {
            return Err(Diagnostic::parser(format!("cannot assign to {}", other.describe()))
                .with_pos(token.pos));
        }
    };
    let value = p.parse_expr(0)?;
    Ok(Node::expr(
        "assign",
        ExprKind::Assign {
            name,
            value: Box::new(value),
        },
        token.pos,
    ))
}

fn run_await(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    let ExprKind::Await(operand) = &expr.kind else {
        return Err(mismatch(expr.name));
    };
    let value = vm.eval(operand, ctx)?;
    match value.as_task() {
        Some(task) => vm.await_task(task),
        None => Ok(value),
    }
}

fn run_bracket(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    match &expr.kind {
        ExprKind::Group(inner) => vm.eval(inner, ctx),
        ExprKind::Call { callee, args } => match callee.as_ref() {
            Node::Expr(Expr {
                kind: ExprKind::Access { object, member },
                ..
            }) => {
                let target = vm.eval(object, ctx)?;
                let function = member_of(vm, &target, member)?;
                call::call(vm, &target, &function, args, ctx)
            }
            other => {
                let function = vm.eval(other, ctx)?;
                call::call(vm, &function, &function, args, ctx)
            }
        },
        _ => Err(mismatch(expr.name)),
    }
}

fn run_array(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    match &expr.kind {
        ExprKind::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(vm.eval(item, ctx)?);
            }
            Ok(vm.classes.array(values))
        }
        ExprKind::Index { object, index } => {
            let object = vm.eval(object, ctx)?;
            let index = vm.eval(index, ctx)?;
            index_into(vm, &object, &index)
        }
        _ => Err(mismatch(expr.name)),
    }
}

fn index_into(vm: &Vm, object: &Instance, index: &Instance) -> Result<Instance> {
    let Some(position) = index.as_number() else {
        return Err(Diagnostic::type_error(format!(
            "index must be a number, not `{}`",
            vm.classes.name_of(index)
        ))
        .into());
    };
    let out_of_bounds = |len: usize| -> crate::diagnostics::RillError {
        Diagnostic::runtime(format!("index {position} out of bounds for length {len}")).into()
    };
    let slot = (position >= 0.0 && position.fract() == 0.0).then_some(position as usize);
    match object.data() {
        InstanceData::Array(items) => slot
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| out_of_bounds(items.len())),
        InstanceData::Str(text) => slot
            .and_then(|i| text.chars().nth(i))
            .map(|c| vm.classes.string(c.to_string()))
            .ok_or_else(|| out_of_bounds(text.chars().count())),
        _ => Err(Diagnostic::type_error(format!(
            "value of class `{}` cannot be indexed",
            vm.classes.name_of(object)
        ))
        .into()),
    }
}

fn run_access(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    let ExprKind::Access { object, member } = &expr.kind else {
        return Err(mismatch(expr.name));
    };
    let target = vm.eval(object, ctx)?;
    member_of(vm, &target, member)
}

fn member_of(vm: &Vm, target: &Instance, member: &str) -> Result<Instance> {
    target.member(member).cloned().ok_or_else(|| {
        Diagnostic::type_error(format!(
            "value of class `{}` has no member `{member}`",
            vm.classes.name_of(target)
        ))
        .into()
    })
}

fn run_unary(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    let ExprKind::Unary { op, operand } = &expr.kind else {
        return Err(mismatch(expr.name));
    };
    let value = vm.eval(operand, ctx)?;
    match op {
        UnaryOp::Negate => match value.as_number() {
            Some(n) => Ok(vm.classes.number(-n)),
            None => Err(Diagnostic::type_error(format!(
                "cannot negate a value of class `{}`",
                vm.classes.name_of(&value)
            ))
            .into()),
        },
        UnaryOp::Not => {
            let truthy = vm.truthy(&value, ctx)?;
            Ok(vm.classes.boolean(!truthy))
        }
    }
}

fn run_binary(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    let ExprKind::Binary { op, left, right } = &expr.kind else {
        return Err(mismatch(expr.name));
    };
    let left = vm.eval(left, ctx)?;
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let decided = vm.truthy(&left, ctx)? == (*op == BinaryOp::Or);
            if decided { Ok(left) } else { vm.eval(right, ctx) }
        }
        _ => {
            let right = vm.eval(right, ctx)?;
            apply_binary(vm, *op, &left, &right)
        }
    }
}

/// Evaluates a non-short-circuit operator on two values.
pub fn apply_binary(vm: &Vm, op: BinaryOp, left: &Instance, right: &Instance) -> Result<Instance> {
    let classes = &vm.classes;
    match op {
        BinaryOp::Equal => return Ok(classes.boolean(values_equal(left, right))),
        BinaryOp::NotEqual => return Ok(classes.boolean(!values_equal(left, right))),
        _ => {}
    }
    let value = match (op, left.data(), right.data()) {
        (BinaryOp::Add, InstanceData::Number(a), InstanceData::Number(b)) => classes.number(a + b),
        (BinaryOp::Add, InstanceData::Str(a), InstanceData::Str(b)) => {
            classes.string(format!("{a}{b}"))
        }
        (BinaryOp::Add, InstanceData::Array(a), InstanceData::Array(b)) => {
            classes.array(a.iter().chain(b.iter()).cloned().collect())
        }
        (BinaryOp::Sub, InstanceData::Number(a), InstanceData::Number(b)) => classes.number(a - b),
        (BinaryOp::Mul, InstanceData::Number(a), InstanceData::Number(b)) => classes.number(a * b),
        (BinaryOp::Div, InstanceData::Number(a), InstanceData::Number(b)) => classes.number(a / b),
        (BinaryOp::Mod, InstanceData::Number(a), InstanceData::Number(b)) => classes.number(a % b),
        (_, InstanceData::Number(a), InstanceData::Number(b)) if compares(op) => {
            classes.boolean(compare(op, a.partial_cmp(b)))
        }
        (_, InstanceData::Str(a), InstanceData::Str(b)) if compares(op) => {
            classes.boolean(compare(op, Some(a.cmp(b))))
        }
        _ => {
            return Err(Diagnostic::type_error(format!(
                "unsupported operand classes for `{}`: `{}` and `{}`",
                op.symbol(),
                classes.name_of(left),
                classes.name_of(right)
            ))
            .into());
        }
    };
    Ok(value)
}

fn compares(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual
    )
}

fn compare(op: BinaryOp, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (op, ordering) {
        (_, None) => false,
        (BinaryOp::Less, Some(o)) => o == Less,
        (BinaryOp::LessEqual, Some(o)) => o != Greater,
        (BinaryOp::Greater, Some(o)) => o == Greater,
        (BinaryOp::GreaterEqual, Some(o)) => o != Less,
        _ => false,
    }
}

/// Value equality for primitives, identity for functions and promises.
/// Instances of different classes are never equal.
pub fn values_equal(left: &Instance, right: &Instance) -> bool {
    if left.class() != right.class() {
        return false;
    }
    match (left.data(), right.data()) {
        (InstanceData::Number(a), InstanceData::Number(b)) => a == b,
        (InstanceData::Str(a), InstanceData::Str(b)) => a == b,
        (InstanceData::Bool(a), InstanceData::Bool(b)) => a == b,
        (InstanceData::Array(a), InstanceData::Array(b)) => {
            Rc::ptr_eq(a, b)
                || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y)))
        }
        (InstanceData::Function(a), InstanceData::Function(b)) => Rc::ptr_eq(a, b),
        (InstanceData::Promise(a), InstanceData::Promise(b)) => a == b,
        (InstanceData::Void, InstanceData::Void) => true,
        _ => false,
    }
}

fn run_assign(vm: &mut Vm, expr: &Expr, ctx: ContextId) -> Result<Instance> {
    let ExprKind::Assign { name, value } = &expr.kind else {
        return Err(mismatch(expr.name));
    };
    let value = vm.eval(value, ctx)?;
    vm.contexts.assign(ctx, name, value.clone())?;
    Ok(value)
}

fn mismatch(name: &str) -> crate::diagnostics::RillError {
    Diagnostic::runtime(format!("`{name}` node has an unexpected shape")).into()
}
