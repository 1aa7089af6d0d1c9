use std::{
    cell::RefCell,
    io::{self, Write},
    rc::Rc,
};

use rill::{
    DiagnosticKind, Instance, Interpreter, RillError, RuleSet, VmConfig,
    ast::{Node, StmtKind},
    lexer::TokenKind,
    rules::StatementRule,
};

fn eval(source: &str) -> (Interpreter, Instance) {
    let mut interpreter = Interpreter::new();
    let value = interpreter
        .eval_source(source)
        .expect("evaluation should succeed");
    (interpreter, value)
}

fn eval_number(source: &str) -> f64 {
    let (_, value) = eval(source);
    value
        .as_number()
        .unwrap_or_else(|| panic!("expected a number from {source:?}, got {value:?}"))
}

fn eval_rendered(source: &str) -> String {
    let (mut interpreter, value) = eval(source);
    interpreter.render(&value).expect("render")
}

fn eval_error(source: &str) -> RillError {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value:?}"),
        Err(err) => err,
    }
}

fn error_kind(source: &str) -> (DiagnosticKind, String) {
    let err = eval_error(source);
    let diagnostic = err.diagnostic().expect("diagnostic error");
    (diagnostic.kind, diagnostic.message.clone())
}

#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

fn run_printing(source: &str) -> String {
    let captured = Captured::default();
    let mut interpreter = Interpreter::new();
    interpreter.vm_mut().set_output(Box::new(captured.clone()));
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed");
    captured.text()
}

#[test]
fn calls_a_declared_function() {
    assert_eq!(eval_number("fn add(a, b) { return a + b }\nadd(2, 3)"), 5.0);
}

#[test]
fn last_expression_statement_is_the_result() {
    assert_eq!(eval_number("x = 4\nx * 10\nfn ignored() {}"), 40.0);
    let (_, value) = eval("fn only() {}");
    assert!(value.is_void());
}

#[test]
fn while_false_never_runs_its_body() {
    assert_eq!(eval_number("x = 1\nwhile (false) { x = 2 }\nx"), 1.0);
}

#[test]
fn while_loops_until_the_condition_fails() {
    let source = "i = 0; total = 0
        while (i < 5) { total = total + i; i = i + 1 }
        total";
    assert_eq!(eval_number(source), 10.0);
}

#[test]
fn if_else_chains() {
    let source = "fn classify(n) {
            if (n < 0) { return 'negative' }
            else if (n == 0) return 'zero'
            else { return 'positive' }
        }
        classify(-3) + ' ' + classify(0) + ' ' + classify(9)";
    assert_eq!(eval_rendered(source), "negative zero positive");
}

#[test]
fn return_leaves_the_function_from_nested_blocks() {
    let source = "fn first_over(limit) {
            i = 0
            while (true) {
                if (i * i > limit) { return i }
                i = i + 1
            }
            return -1
        }
        first_over(20)";
    assert_eq!(eval_number(source), 5.0);
}

#[test]
fn recursion() {
    let source = "fn fact(n) { if (n <= 1) { return 1 } return n * fact(n - 1) }\nfact(6)";
    assert_eq!(eval_number(source), 720.0);
}

#[test]
fn keyword_arguments_bind_by_name() {
    assert_eq!(eval_number("fn sub(a, b) { return a - b }\nsub(b = 1, a = 10)"), 9.0);
    assert_eq!(eval_number("fn sub(a, b) { return a - b }\nsub(10, b = 4)"), 6.0);
}

#[test]
fn missing_arguments_are_void() {
    let (_, value) = eval("fn second(a, b) { return b }\nsecond(1)");
    assert!(value.is_void());
}

#[test]
fn argument_binding_errors() {
    let prelude = "fn pair(a, b) { return a }\n";
    let cases = [
        ("pair(1, 2, 3)", "too many arguments"),
        ("pair(a = 1, 2)", "argument after keyword"),
        ("pair(a = 1, a = 2)", "overriding argument"),
        ("pair(1, a = 2)", "overriding argument"),
        ("pair(c = 1)", "unknown argument"),
    ];
    for (call, expected) in cases {
        let (kind, message) = error_kind(&format!("{prelude}{call}"));
        assert_eq!(kind, DiagnosticKind::Binding, "{call}");
        assert!(message.contains(expected), "{call}: {message}");
    }
}

#[test]
fn assignment_inside_a_function_stays_local() {
    assert_eq!(eval_number("x = 1\nfn set() { x = 5 }\nset()\nx"), 1.0);
}

#[test]
fn functions_see_their_callers_bindings() {
    let source = "fn read() { return y }
        fn outer() { y = 7; return read() }
        outer()";
    assert_eq!(eval_number(source), 7.0);
}

#[test]
fn assignment_is_an_expression() {
    assert_eq!(eval_number("a = b = 3\na + b"), 6.0);
}

#[test]
fn operators_on_intrinsic_values() {
    assert_eq!(eval_rendered("'ab' + \"cd\""), "abcd");
    assert_eq!(eval_rendered("'abc'[1]"), "b");
    assert_eq!(eval_number("[10, 20, 30][2]"), 30.0);
    assert_eq!(eval_number("([1, 2] + [3]).len()"), 3.0);
    assert_eq!(eval_number("'héllo'.len()"), 5.0);
    assert_eq!(eval_number("7 % 4 + -2"), 1.0);
    assert_eq!(eval_rendered("1 < 2 && 'a' < 'b'"), "true");
    assert_eq!(eval_rendered("0 || 'fallback'"), "0");
    assert_eq!(eval_rendered("false || 'fallback'"), "fallback");
    assert_eq!(eval_rendered("1 == 1.0"), "true");
    assert_eq!(eval_rendered("1 == '1'"), "false");
    assert_eq!(eval_rendered("[1, 'a'] == [1, 'a']"), "true");
    assert_eq!(eval_rendered("!(1 != 2)"), "false");
}

#[test]
fn type_errors() {
    let (kind, message) = error_kind("1 + 'a'");
    assert_eq!(kind, DiagnosticKind::Type);
    assert!(message.contains("`number` and `string`"), "{message}");

    let (kind, _) = error_kind("-'a'");
    assert_eq!(kind, DiagnosticKind::Type);

    let (kind, message) = error_kind("x = 3\nx.missing");
    assert_eq!(kind, DiagnosticKind::Type);
    assert!(message.contains("no member `missing`"), "{message}");
}

#[test]
fn calling_a_non_function_is_a_runtime_error() {
    let (kind, message) = error_kind("x = 3\nx()");
    assert_eq!(kind, DiagnosticKind::Runtime);
    assert!(message.contains("not callable"), "{message}");
}

#[test]
fn unknown_variable_is_a_binding_error() {
    let err = eval_error("a = 1\nb + a");
    let diagnostic = err.diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.kind, DiagnosticKind::Binding);
    assert_eq!(diagnostic.pos.as_ref().map(|p| p.line), Some(2));
}

#[test]
fn return_outside_a_function_is_a_runtime_error() {
    let (kind, message) = error_kind("return 1");
    assert_eq!(kind, DiagnosticKind::Runtime);
    assert!(message.contains("outside of a function"), "{message}");
}

#[test]
fn index_out_of_bounds() {
    let (kind, message) = error_kind("[1, 2][2]");
    assert_eq!(kind, DiagnosticKind::Runtime);
    assert!(message.contains("out of bounds"), "{message}");
}

#[test]
fn call_depth_is_limited() {
    let mut interpreter = Interpreter::with_config(VmConfig::default().with_max_call_depth(16));
    let err = interpreter
        .eval_source("fn down(n) { return down(n + 1) }\ndown(0)")
        .unwrap_err();
    assert_eq!(err.kind(), Some(DiagnosticKind::Runtime));
    assert!(err.to_string().contains("maximum call depth of 16"), "{err}");
}

#[test]
fn default_call_depth_fits_a_test_thread() {
    let mut interpreter = Interpreter::with_config(VmConfig::default());
    let value = interpreter
        .eval_source("fn down(n) { if (n == 0) { return 0 } return down(n - 1) + 1 }\ndown(250)")
        .expect("recursion within the limit");
    assert_eq!(value.as_number(), Some(250.0));

    let err = interpreter
        .eval_source("fn forever(n) { if (true) { return forever(n + 1) } }\nforever(0)")
        .unwrap_err();
    assert_eq!(err.kind(), Some(DiagnosticKind::Runtime));
    assert!(err.to_string().contains("maximum call depth of 256"), "{err}");
}

#[test]
fn failed_evaluation_discards_its_pending_async_work() {
    let captured = Captured::default();
    let mut interpreter = Interpreter::new();
    interpreter.vm_mut().set_output(Box::new(captured.clone()));

    let err = interpreter
        .eval_source("async fn late() { print('late') }\nlate(); nope")
        .unwrap_err();
    assert_eq!(err.kind(), Some(DiagnosticKind::Binding));
    assert_eq!(interpreter.vm().pending_microtasks(), 0);
    assert_eq!(interpreter.vm().pending_lines(), 0);

    interpreter
        .eval_source("print('second')")
        .expect("evaluation should succeed");
    assert_eq!(captured.text(), "second\n");
}

#[test]
fn print_writes_space_separated_values() {
    let output = run_printing("print('hi', 1 + 1, [true])\nprint()");
    assert_eq!(output, "hi 2 [true]\n\n");
}

#[test]
fn exit_stops_the_program() {
    let output = run_printing("print('a')\nexit()\nprint('b')");
    assert_eq!(output, "a\n");
}

#[test]
fn exit_inside_a_function_stops_everything() {
    let output =
        run_printing("fn stop() { print('in'); exit(); print('after exit') }\nstop()\nprint('b')");
    assert_eq!(output, "in\n");
}

#[test]
fn async_functions_return_promises() {
    let source = "async fn twice(x) { return x * 2 }
        p = twice(21)
        await p";
    assert_eq!(eval_number(source), 42.0);

    assert_eq!(
        eval_rendered("async fn one() { return 1 }\none()"),
        "<promise ready>"
    );
}

#[test]
fn async_bodies_run_after_the_current_line() {
    let output = run_printing(
        "async fn work() { print('body') }
        p = work(); print('caller')
        await p
        print('done')",
    );
    assert_eq!(output, "caller\nbody\ndone\n");
}

#[test]
fn awaiting_a_consumed_promise_fails() {
    let (kind, message) = error_kind("async fn one() { return 1 }\np = one()\nawait p\nawait p");
    assert_eq!(kind, DiagnosticKind::Runtime);
    assert!(message.contains("already awaited"), "{message}");
}

#[test]
fn awaiting_a_plain_value_yields_it() {
    assert_eq!(eval_number("await 5"), 5.0);
}

#[test]
fn sleep_resolves_through_the_worker_pool() {
    let output = run_printing(
        "p = sleep(5)
        print('before')
        r = await p
        print('after', r)",
    );
    assert_eq!(output, "before\nafter void\n");
}

#[test]
fn pending_background_work_keeps_the_program_alive() {
    let output = run_printing(
        "async fn later() { await sleep(2); print('woke') }
        later()
        print('scheduled')",
    );
    assert_eq!(output, "scheduled\nwoke\n");
}

#[test]
fn sleep_rejects_bad_durations() {
    let (kind, _) = error_kind("sleep('soon')");
    assert_eq!(kind, DiagnosticKind::Type);
}

#[test]
fn bindings_persist_across_evaluations() {
    let mut interpreter = Interpreter::new();
    interpreter.eval_source("fn inc(n) { return n + 1 }\ncount = 1").expect("define");
    let value = interpreter.eval_source("count = inc(count)\ninc(count)").expect("use");
    assert_eq!(value.as_number(), Some(3.0));

    // a failure does not poison the session
    assert!(interpreter.eval_source("nope").is_err());
    let value = interpreter.eval_source("count").expect("still usable");
    assert_eq!(value.as_number(), Some(2.0));
}

#[test]
fn registered_statement_rules_extend_the_language() {
    let mut rules = RuleSet::standard();
    rules.register_statement(StatementRule {
        name: "unless",
        matches: |p| p.is_word("unless"),
        parse: |p| {
            let pos = p.advance().pos;
            let open = p.expect(TokenKind::Bracket, "(")?;
            let condition = p.parse_expr(0)?;
            p.expect_closing(&open, ")")?;
            let body = p.parse_body()?;
            Ok(Node::stmt(
                "unless",
                StmtKind::If {
                    condition,
                    then_branch: body,
                    else_branch: None,
                },
                pos,
            ))
        },
        run: |vm, stmt, ctx| {
            if let StmtKind::If {
                condition,
                then_branch,
                ..
            } = &stmt.kind
            {
                let value = vm.eval(condition, ctx)?;
                if !vm.truthy(&value, ctx)? {
                    vm.run_block(then_branch, ctx)?;
                }
            }
            Ok(None)
        },
    });

    let mut interpreter = Interpreter::with_rules(rules, VmConfig::default());
    let value = interpreter
        .eval_source("x = 0\nunless (x > 1) { x = 10 }\nunless (x > 1) x = 20\nx")
        .expect("evaluation should succeed");
    assert_eq!(value.as_number(), Some(10.0));
}
