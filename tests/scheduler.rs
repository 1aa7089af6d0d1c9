use std::{cell::RefCell, rc::Rc};

use pretty_assertions::assert_eq;
use rill::{DiagnosticKind, EventStatus, Vm, VmConfig, class::Params, prelude};

type Log = Rc<RefCell<Vec<String>>>;

/// A VM whose global `mark(label)` appends to the returned log.
fn vm_with_log() -> (Vm, Log) {
    let mut vm = Vm::default();
    let log: Log = Rc::default();
    let sink = Rc::clone(&log);
    let mark = vm.classes.native("mark", Params::Variadic, move |vm, call| {
        let label = match call.arg("0") {
            Some(value) => vm.stringify(value, call.context)?,
            None => String::new(),
        };
        sink.borrow_mut().push(label);
        Ok(vm.classes.void())
    });
    let global = vm.global();
    vm.contexts.set_var(global, "mark", mark).expect("bind mark");
    prelude::install(&mut vm, global).expect("prelude");
    (vm, log)
}

fn load(vm: &mut Vm, source: &str) -> rill::vm::RunnerId {
    let program = vm.rules().parse(source).expect("parse");
    let global = vm.global();
    vm.load_program(program, global).expect("load")
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[test]
fn each_tick_runs_lines_then_microtasks_then_microevents() {
    let (mut vm, log) = vm_with_log();
    let events = Rc::clone(&log);
    vm.register_microevent(move |_| {
        events.borrow_mut().push("event".into());
        Ok(EventStatus::Idle)
    });

    load(
        &mut vm,
        "async fn job(label) { mark(label) }\njob('task 1')\nmark('line 1')",
    );
    let report = vm.tick().expect("first tick");
    assert_eq!(report.lines, 3);
    assert_eq!(report.microtasks, 1);
    assert_eq!(entries(&log), vec!["line 1", "task 1", "event"]);

    load(&mut vm, "job('task 2')\nmark('line 2')");
    let report = vm.tick().expect("second tick");
    assert_eq!(report.lines, 2);
    assert_eq!(report.microtasks, 1);
    assert_eq!(
        entries(&log),
        vec!["line 1", "task 1", "event", "line 2", "task 2", "event"]
    );
    assert_eq!(vm.microevent_count(), 1);
}

#[test]
fn runners_interleave_line_by_line() {
    let (mut vm, log) = vm_with_log();
    let first = load(&mut vm, "mark('a1')\nmark('a2')\nmark('a3')");
    let second = load(&mut vm, "mark('b1')\nmark('b2')");

    vm.run().expect("run");
    assert_eq!(entries(&log), vec!["a1", "b1", "a2", "b2", "a3"]);
    assert!(vm.is_finished(first));
    assert!(vm.is_finished(second));
}

#[test]
fn microevents_run_in_registration_order_until_done() {
    let (mut vm, log) = vm_with_log();
    for name in ["first", "second"] {
        let sink = Rc::clone(&log);
        let mut calls = 0;
        vm.register_microevent(move |_| {
            calls += 1;
            sink.borrow_mut().push(format!("{name} {calls}"));
            Ok(if name == "first" && calls == 2 {
                EventStatus::Done
            } else {
                EventStatus::Idle
            })
        });
    }

    for _ in 0..3 {
        vm.tick().expect("tick");
    }
    assert_eq!(
        entries(&log),
        vec!["first 1", "second 1", "first 2", "second 2", "second 3"]
    );
    assert_eq!(vm.microevent_count(), 1);
}

#[test]
fn removed_microevents_stop_running() {
    let (mut vm, log) = vm_with_log();
    let sink = Rc::clone(&log);
    let id = vm.register_microevent(move |_| {
        sink.borrow_mut().push("tick".into());
        Ok(EventStatus::Idle)
    });
    vm.tick().expect("tick");
    assert!(vm.remove_microevent(id));
    assert!(!vm.remove_microevent(id));
    vm.tick().expect("tick");
    assert_eq!(entries(&log), vec!["tick"]);
}

#[test]
fn microtasks_queued_by_microtasks_run_in_the_same_tick() {
    let (mut vm, log) = vm_with_log();
    let outer = Rc::clone(&log);
    vm.enqueue_microtask(move |vm| {
        outer.borrow_mut().push("outer".into());
        let inner = Rc::clone(&outer);
        vm.enqueue_microtask(move |_| {
            inner.borrow_mut().push("inner".into());
            Ok(())
        });
        Ok(())
    });
    let report = vm.tick().expect("tick");
    assert_eq!(report.microtasks, 2);
    assert_eq!(entries(&log), vec!["outer", "inner"]);
}

#[test]
fn progress_keeps_the_loop_alive() {
    let (mut vm, log) = vm_with_log();
    let sink = Rc::clone(&log);
    let mut remaining = 5;
    vm.register_microevent(move |_| {
        remaining -= 1;
        sink.borrow_mut().push(format!("poll {remaining}"));
        Ok(if remaining == 0 {
            EventStatus::Done
        } else {
            EventStatus::Progress
        })
    });
    vm.run().expect("run");
    assert_eq!(log.borrow().len(), 5);
    assert_eq!(vm.microevent_count(), 0);
}

#[test]
fn break_flag_stops_before_the_next_line() {
    let (mut vm, log) = vm_with_log();
    load(&mut vm, "mark(1)\nexit()\nmark(2)");
    vm.run().expect("run");
    assert!(vm.is_halted());
    assert_eq!(entries(&log), vec!["1"]);
    assert_eq!(vm.pending_lines(), 1);
}

#[test]
fn failing_line_aborts_with_its_position_attached() {
    let (mut vm, log) = vm_with_log();
    load(&mut vm, "mark('ok')\nmark(missing)\nmark('never')");
    let err = vm.run().unwrap_err();
    let diagnostic = err.diagnostic().expect("diagnostic");
    assert_eq!(diagnostic.kind, DiagnosticKind::Binding);
    assert!(diagnostic.message.contains("unknown variable `missing`"));
    let pos = diagnostic.pos.clone().expect("position");
    assert_eq!((pos.line, pos.column), (2, 6));
    assert!(
        diagnostic
            .notes
            .iter()
            .any(|note| note.contains("while executing call expression at 2:5")),
        "{:?}",
        diagnostic.notes
    );
    assert_eq!(entries(&log), vec!["ok"]);
}

#[test]
fn idle_limit_bounds_an_empty_run() {
    let mut vm = Vm::new(VmConfig::default().with_idle_tick_limit(1));
    vm.run().expect("run");
    assert_eq!(vm.pending_lines(), 0);
}
