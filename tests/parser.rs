use pretty_assertions::assert_eq;
use rill::{
    DiagnosticKind, RuleSet,
    ast::{ExprKind, Literal, Node, StmtKind, UnaryOp},
    class::format_number,
};

fn parse(source: &str) -> Vec<Node> {
    RuleSet::standard().parse(source).expect("parse should succeed")
}

fn parse_one(source: &str) -> String {
    let nodes = parse(source);
    assert_eq!(nodes.len(), 1, "expected a single line in {source:?}");
    sexpr(&nodes[0])
}

fn list(nodes: &[Node]) -> String {
    nodes.iter().map(sexpr).collect::<Vec<_>>().join(" ")
}

fn sexpr(node: &Node) -> String {
    match node {
        Node::Instance(Literal::Number(n)) => format_number(*n),
        Node::Instance(Literal::Str(s)) => format!("{s:?}"),
        Node::Instance(Literal::Void) => "void".to_string(),
        Node::Variable(var) => var.name.clone(),
        Node::Expr(expr) => match &expr.kind {
            ExprKind::Binary { op, left, right } => {
                format!("({} {} {})", op.symbol(), sexpr(left), sexpr(right))
            }
            ExprKind::Unary { op, operand } => {
                let op = match op {
                    UnaryOp::Negate => "neg",
                    UnaryOp::Not => "not",
                };
                format!("({op} {})", sexpr(operand))
            }
            ExprKind::Group(inner) => format!("(group {})", sexpr(inner)),
            ExprKind::Call { callee, args } if args.is_empty() => {
                format!("(call {})", sexpr(callee))
            }
            ExprKind::Call { callee, args } => format!("(call {} {})", sexpr(callee), list(args)),
            ExprKind::Assign { name, value } => format!("(= {name} {})", sexpr(value)),
            ExprKind::Access { object, member } => format!("(. {} {member})", sexpr(object)),
            ExprKind::Array(items) => format!("[{}]", list(items)),
            ExprKind::Index { object, index } => {
                format!("(index {} {})", sexpr(object), sexpr(index))
            }
            ExprKind::Await(inner) => format!("(await {})", sexpr(inner)),
        },
        Node::Stmt(stmt) => match &stmt.kind {
            StmtKind::Function(decl) => format!(
                "({}fn {} [{}] {{{}}})",
                if decl.is_async { "async " } else { "" },
                decl.name,
                decl.params.join(" "),
                list(&decl.body)
            ),
            StmtKind::Return(Some(value)) => format!("(return {})", sexpr(value)),
            StmtKind::Return(None) => "(return)".to_string(),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(other) => format!(
                    "(if {} {{{}}} {{{}}})",
                    sexpr(condition),
                    list(then_branch),
                    list(other)
                ),
                None => format!("(if {} {{{}}})", sexpr(condition), list(then_branch)),
            },
            StmtKind::While { condition, body } => {
                format!("(while {} {{{}}})", sexpr(condition), list(body))
            }
            StmtKind::Block(block) => format!("{{{}}}", list(block)),
        },
    }
}

#[test]
fn binary_operators_are_left_associative() {
    assert_eq!(parse_one("1 + 2 + 3"), "(+ (+ 1 2) 3)");
    assert_eq!(parse_one("8 - 4 - 2"), "(- (- 8 4) 2)");
}

#[test]
fn precedence_tiers_bind_in_order() {
    assert_eq!(parse_one("1 + 2 * 3"), "(+ 1 (* 2 3))");
    assert_eq!(parse_one("a < b + 1 == c"), "(== (< a (+ b 1)) c)");
    assert_eq!(parse_one("a || b && c"), "(|| a (&& b c))");
    assert_eq!(parse_one("-a * !b"), "(* (neg a) (not b))");
}

#[test]
fn assignment_is_right_associative() {
    assert_eq!(parse_one("a = b = 1 + 2"), "(= a (= b (+ 1 2)))");
}

#[test]
fn parenthesis_groups_or_calls_depending_on_position() {
    assert_eq!(parse_one("(1 + 2) * 3"), "(* (group (+ 1 2)) 3)");
    assert_eq!(parse_one("f(1, x = 2)(3)"), "(call (call f 1 (= x 2)) 3)");
    assert_eq!(parse_one("f()"), "(call f)");
}

#[test]
fn postfix_operators_chain() {
    assert_eq!(parse_one("items.len()"), "(call (. items len))");
    assert_eq!(parse_one("[1, 'a'][0]"), "(index [1 \"a\"] 0)");
    assert_eq!(parse_one("await f(1) + 1"), "(+ (await (call f 1)) 1)");
}

#[test]
fn parses_statements() {
    let nodes = parse(
        "fn add(a, b) { return a + b }
         async fn later() { return }
         if (x) { y } else if (z) w else { v }
         while (i < 3) i = i + 1;
         { nested }",
    );
    let rendered: Vec<String> = nodes.iter().map(sexpr).collect();
    assert_eq!(
        rendered,
        vec![
            "(fn add [a b] {(return (+ a b))})",
            "(async fn later [] {(return)})",
            "(if x {y} {(if z {w} {v})})",
            "(while (< i 3) {(= i (+ i 1))})",
            "{nested}",
        ]
    );
}

#[test]
fn statements_nest_inside_statements() {
    assert_eq!(
        parse_one("while (i < 3) { if (i == 1) { return i } else { return 0 } }"),
        "(while (< i 3) {(if (== i 1) {(return i)} {(return 0)})})"
    );
}

#[test]
fn separators_are_optional() {
    assert_eq!(parse("a; b;; c").len(), 3);
    assert_eq!(parse("a\nb").len(), 2);
}

#[test]
fn unmatched_bracket_reports_the_opening_position() {
    let err = RuleSet::standard().parse("x = 1\nf(1, 2").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("unmatched `(`"), "{}", err.message);
    let pos = err.pos.expect("position");
    assert_eq!((pos.line, pos.column), (2, 2));

    let err = RuleSet::standard().parse("fn f() {\n  return 1").unwrap_err();
    assert!(err.message.contains("unmatched `{`"), "{}", err.message);
    assert_eq!(err.pos.map(|p| (p.line, p.column)), Some((1, 8)));
}

#[test]
fn reports_expected_and_found_tokens() {
    let err = RuleSet::standard().parse("1 + ;").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("expected expression, found `;`"), "{}", err.message);

    let err = RuleSet::standard().parse("if x { y }").unwrap_err();
    assert!(err.message.contains("expected `(`, found `x`"), "{}", err.message);
}

#[test]
fn rejects_invalid_assignment_targets() {
    let err = RuleSet::standard().parse("1 = 2").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Parser);
    assert!(err.message.contains("cannot assign"), "{}", err.message);
}

#[test]
fn keywords_are_not_variables() {
    let err = RuleSet::standard().parse("fn while() {}").unwrap_err();
    assert!(err.message.contains("expected function name"), "{}", err.message);
}
