//! Cooperative scheduler.
//!
//! A tick drains three tiers in a fixed order: the ready queue of [`Line`]s,
//! then the microtask queue, then every registered microevent once. Work is
//! never preempted; a rule handler runs to completion once dispatched.

use std::{
    collections::VecDeque,
    io::{self, Write},
    rc::Rc,
    thread,
};

use indexmap::IndexMap;

use crate::{
    ast::{Block, Literal, Node},
    call::{self, Bindings},
    class::{ClassTable, Instance},
    config::VmConfig,
    context::{ContextId, Contexts},
    diagnostics::{Diagnostic, Result},
    pool::{Job, TaskPool},
    rules::RuleSet,
    stack,
    task::{TaskId, TaskTable},
};

pub type Microtask = Box<dyn FnOnce(&mut Vm) -> Result<()>>;
pub type Microevent = Box<dyn FnMut(&mut Vm) -> Result<EventStatus>>;

/// What a microevent accomplished during one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Nothing to do this tick.
    Idle,
    /// Waiting on work outside the interpreter thread.
    Busy,
    /// Produced new work.
    Progress,
    /// Finished; the event is deregistered.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunnerId(u64);

/// A position inside a shared block.
#[derive(Debug, Clone)]
pub struct LineNode {
    block: Block,
    index: usize,
}

impl LineNode {
    pub fn new(block: Block, index: usize) -> Option<Self> {
        (index < block.len()).then_some(Self { block, index })
    }

    pub fn node(&self) -> &Node {
        &self.block[self.index]
    }
}

/// One schedulable unit: a node bound to the runner and context executing it.
#[derive(Debug, Clone)]
pub struct Line {
    pub node: LineNode,
    pub runner: RunnerId,
    pub context: ContextId,
}

#[derive(Debug)]
struct Runner {
    context: ContextId,
    /// Function frame whose return slot ends this runner early.
    frame: Option<ContextId>,
    lines: VecDeque<LineNode>,
    last_value: Option<Instance>,
    finished: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub lines: usize,
    pub microtasks: usize,
    pub events: usize,
    pub busy: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.lines == 0 && self.microtasks == 0 && self.events == 0 && !self.busy
    }

    fn only_waiting(&self) -> bool {
        self.busy && self.lines == 0 && self.microtasks == 0 && self.events == 0
    }
}

pub struct Vm {
    pub classes: ClassTable,
    pub contexts: Contexts,
    pub tasks: TaskTable,
    rules: Rc<RuleSet>,
    config: VmConfig,
    queue: VecDeque<Line>,
    microtasks: VecDeque<Microtask>,
    microevents: IndexMap<EventId, Option<Microevent>>,
    next_event: u64,
    runners: IndexMap<RunnerId, Runner>,
    next_runner: u64,
    halted: bool,
    depth: usize,
    pool: Option<TaskPool>,
    pool_event: Option<EventId>,
    /// Frames of async bodies whose microtask has not run yet.
    async_frames: Vec<ContextId>,
    output: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Self::with_rules(RuleSet::standard(), config)
    }

    pub fn with_rules(rules: RuleSet, config: VmConfig) -> Self {
        Self {
            classes: ClassTable::new(),
            contexts: Contexts::new(),
            tasks: TaskTable::default(),
            rules: Rc::new(rules),
            config,
            queue: VecDeque::new(),
            microtasks: VecDeque::new(),
            microevents: IndexMap::new(),
            next_event: 0,
            runners: IndexMap::new(),
            next_runner: 0,
            halted: false,
            depth: 0,
            pool: None,
            pool_event: None,
            async_frames: Vec::new(),
            output: Box::new(io::stdout()),
        }
    }

    pub fn rules(&self) -> Rc<RuleSet> {
        Rc::clone(&self.rules)
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn global(&self) -> ContextId {
        self.contexts.root()
    }

    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub fn write_line(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}")?;
        self.output.flush()?;
        Ok(())
    }

    /// Raises the break flag; the loop stops before the next line.
    pub fn halt(&mut self) {
        tracing::debug!("break flag raised");
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn clear_halt(&mut self) {
        self.halted = false;
    }

    pub fn enqueue_line(&mut self, line: Line) {
        self.queue.push_back(line);
    }

    pub fn enqueue_microtask<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Vm) -> Result<()> + 'static,
    {
        self.microtasks.push_back(Box::new(task));
    }

    pub fn register_microevent<F>(&mut self, event: F) -> EventId
    where
        F: FnMut(&mut Vm) -> Result<EventStatus> + 'static,
    {
        self.next_event += 1;
        let id = EventId(self.next_event);
        self.microevents.insert(id, Some(Box::new(event)));
        tracing::debug!(event = id.0, "registered microevent");
        id
    }

    pub fn remove_microevent(&mut self, id: EventId) -> bool {
        let removed = self.microevents.shift_remove(&id).is_some();
        if removed {
            tracing::debug!(event = id.0, "removed microevent");
        }
        removed
    }

    pub fn pending_lines(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.len()
    }

    pub fn microevent_count(&self) -> usize {
        self.microevents.len()
    }

    /// Creates a runner over `block` executing in `context`.
    pub fn create_runner(&mut self, block: Block, context: ContextId) -> Result<RunnerId> {
        self.contexts.retain(context)?;
        let frame = self.contexts.function_frame(context)?;
        self.next_runner += 1;
        let id = RunnerId(self.next_runner);
        let lines = (0..block.len())
            .filter_map(|index| LineNode::new(Rc::clone(&block), index))
            .collect();
        self.runners.insert(
            id,
            Runner {
                context,
                frame,
                lines,
                last_value: None,
                finished: false,
            },
        );
        Ok(id)
    }

    /// Loads a program into a scheduled runner and queues its first line.
    pub fn load_program(
        &mut self,
        program: impl Into<Block>,
        context: ContextId,
    ) -> Result<RunnerId> {
        let id = self.create_runner(program.into(), context)?;
        self.advance(id);
        Ok(id)
    }

    pub fn is_finished(&self, id: RunnerId) -> bool {
        self.runners.get(&id).is_none_or(|runner| runner.finished)
    }

    /// Drops a runner and returns the value of its last expression line.
    pub fn finish_runner(&mut self, id: RunnerId) -> Result<Option<Instance>> {
        let Some(runner) = self.runners.swap_remove(&id) else {
            return Ok(None);
        };
        self.contexts.release(runner.context)?;
        Ok(runner.last_value)
    }

    /// Drops all outstanding work after a failed run: queued lines, runners,
    /// microtasks and microevents. Frames held by async bodies that never
    /// ran are released. Pool jobs in flight still settle their promises.
    pub fn reset(&mut self) -> Result<()> {
        let lines = self.queue.len();
        let microtasks = self.microtasks.len();
        self.queue.clear();
        self.microtasks.clear();
        for frame in std::mem::take(&mut self.async_frames) {
            self.contexts.release(frame)?;
        }
        let runners: Vec<RunnerId> = self.runners.keys().copied().collect();
        for id in runners {
            self.finish_runner(id)?;
        }
        let pool_event = self.pool_event;
        self.microevents.retain(|id, _| Some(*id) == pool_event);
        self.depth = 0;
        tracing::debug!(lines, microtasks, "scheduler reset");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn run(&mut self) -> Result<()> {
        let mut idle = 0;
        let mut ticks = 0usize;
        loop {
            let report = self.tick()?;
            ticks += 1;
            if self.halted {
                tracing::debug!(ticks, "stopped on break flag");
                break;
            }
            if report.is_idle() {
                idle += 1;
                if idle >= self.config.idle_tick_limit {
                    tracing::debug!(ticks, "scheduler idle");
                    break;
                }
            } else {
                idle = 0;
                if report.only_waiting() {
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
        Ok(())
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        while let Some(line) = self.queue.pop_front() {
            if self.halted {
                self.queue.push_front(line);
                break;
            }
            report.lines += 1;
            let value = self.exec_line(&line)?;
            self.record(line.runner, value);
            self.advance(line.runner);
        }
        if !self.halted {
            self.drain_microtasks(&mut report)?;
        }
        if !self.halted {
            self.service_microevents(&mut report)?;
        }
        tracing::trace!(?report, "tick");
        Ok(report)
    }

    fn drain_microtasks(&mut self, report: &mut TickReport) -> Result<()> {
        while let Some(task) = self.microtasks.pop_front() {
            report.microtasks += 1;
            task(self)?;
            if self.halted {
                break;
            }
        }
        Ok(())
    }

    fn service_microevents(&mut self, report: &mut TickReport) -> Result<()> {
        let ids: Vec<EventId> = self.microevents.keys().copied().collect();
        for id in ids {
            let Some(mut event) = self.microevents.get_mut(&id).and_then(Option::take) else {
                continue;
            };
            let outcome = event(self);
            match outcome {
                Ok(EventStatus::Done) => {
                    self.microevents.shift_remove(&id);
                }
                _ => {
                    // the event may have removed itself while running
                    if let Some(slot) = self.microevents.get_mut(&id) {
                        *slot = Some(event);
                    }
                }
            }
            match outcome? {
                EventStatus::Progress => report.events += 1,
                EventStatus::Busy => report.busy = true,
                EventStatus::Idle | EventStatus::Done => {}
            }
            if self.halted {
                break;
            }
        }
        Ok(())
    }

    fn record(&mut self, id: RunnerId, value: Option<Instance>) {
        if let (Some(runner), Some(value)) = (self.runners.get_mut(&id), value) {
            runner.last_value = Some(value);
        }
    }

    /// Queues the runner's next line, or marks it finished.
    fn advance(&mut self, id: RunnerId) {
        let returned = self.runner_returned(id);
        let Some(runner) = self.runners.get_mut(&id) else {
            return;
        };
        if returned {
            runner.lines.clear();
        }
        match runner.lines.pop_front() {
            Some(node) => {
                let line = Line {
                    node,
                    runner: id,
                    context: runner.context,
                };
                self.queue.push_back(line);
            }
            None => runner.finished = true,
        }
    }

    fn runner_returned(&self, id: RunnerId) -> bool {
        self.runners
            .get(&id)
            .and_then(|runner| runner.frame)
            .is_some_and(|frame| self.contexts.has_returned(frame))
    }

    /// Whether code running in `context` should stop: the break flag is up or
    /// its function frame already holds a return value.
    pub fn unwinding(&self, context: ContextId) -> Result<bool> {
        if self.halted {
            return Ok(true);
        }
        Ok(self
            .contexts
            .function_frame(context)?
            .is_some_and(|frame| self.contexts.has_returned(frame)))
    }

    pub fn exec_line(&mut self, line: &Line) -> Result<Option<Instance>> {
        let node = line.node.node();
        tracing::trace!(runner = line.runner.0, line = %node.describe(), "dispatch");
        self.dispatch(node, line.context).map_err(|err| {
            let (err, location) = match node.pos() {
                Some(pos) => (err.or_pos(pos), format!(" at {pos}")),
                None => (err, String::new()),
            };
            err.with_note(format!("while executing {}{location}", node.describe()))
        })
    }

    fn dispatch(&mut self, node: &Node, context: ContextId) -> Result<Option<Instance>> {
        match node {
            Node::Stmt(stmt) => {
                let handler = self.rules.statement_handler(stmt.keyword).ok_or_else(|| {
                    Diagnostic::runtime(format!("no rule runs `{}` statements", stmt.keyword))
                        .with_pos(stmt.pos.clone())
                })?;
                handler(self, stmt, context)
            }
            other => self.eval(other, context).map(Some),
        }
    }

    /// Evaluates a value-producing node.
    pub fn eval(&mut self, node: &Node, context: ContextId) -> Result<Instance> {
        match node {
            Node::Instance(literal) => Ok(self.materialize(literal)),
            Node::Variable(var) => self
                .contexts
                .get_var(context, &var.name)
                .map_err(|err| err.or_pos(&var.pos)),
            Node::Expr(expr) => {
                let handler = self.rules.expression_handler(expr.name).ok_or_else(|| {
                    Diagnostic::runtime(format!("no rule runs `{}` expressions", expr.name))
                        .with_pos(expr.pos.clone())
                })?;
                handler(self, expr, context).map_err(|err| err.or_pos(&expr.pos))
            }
            Node::Stmt(stmt) => Err(Diagnostic::runtime(format!(
                "`{}` statement used as a value",
                stmt.keyword
            ))
            .with_pos(stmt.pos.clone())
            .into()),
        }
    }

    pub fn materialize(&self, literal: &Literal) -> Instance {
        match literal {
            Literal::Number(n) => self.classes.number(*n),
            Literal::Str(s) => self.classes.string(s.as_str()),
            Literal::Void => self.classes.void(),
        }
    }

    /// Runs `block` in a fresh runner to completion, line by line, stopping
    /// early on the break flag or once the enclosing function has returned.
    pub fn run_block(&mut self, block: &Block, context: ContextId) -> Result<Option<Instance>> {
        let id = self.create_runner(Rc::clone(block), context)?;
        let outcome = self.drive(id);
        let last = self.finish_runner(id)?;
        outcome?;
        Ok(last)
    }

    fn drive(&mut self, id: RunnerId) -> Result<()> {
        loop {
            if self.halted || self.runner_returned(id) {
                return Ok(());
            }
            let Some(runner) = self.runners.get_mut(&id) else {
                return Ok(());
            };
            let Some(node) = runner.lines.pop_front() else {
                runner.finished = true;
                return Ok(());
            };
            let line = Line {
                node,
                runner: id,
                context: runner.context,
            };
            let value = self.exec_line(&line)?;
            self.record(id, value);
        }
    }

    fn run_frame(&mut self, name: &str, block: &Block, frame: ContextId) -> Result<Instance> {
        if self.depth >= self.config.max_call_depth {
            return Err(Diagnostic::runtime(format!(
                "maximum call depth of {} exceeded in `{name}`",
                self.config.max_call_depth
            ))
            .into());
        }
        self.depth += 1;
        let outcome = stack::ensure_sufficient_stack(|| self.run_block(block, frame));
        self.depth -= 1;
        outcome?;
        let value = self.contexts.take_return(frame)?;
        Ok(value.unwrap_or_else(|| self.classes.void()))
    }

    /// Synchronous invocation of a script function: a function frame seeded
    /// with `args`, whose return slot becomes the result.
    #[tracing::instrument(level = "trace", skip(self, block, args, caller))]
    pub fn invoke_script(
        &mut self,
        name: &str,
        block: &Block,
        args: Bindings,
        caller: ContextId,
    ) -> Result<Instance> {
        let frame = self.contexts.push_function(caller, args)?;
        let outcome = self.run_frame(name, block, frame);
        self.contexts.release(frame)?;
        outcome
    }

    /// Asynchronous invocation: returns a promise at once and runs the body
    /// as a microtask that settles it.
    pub fn spawn_async(
        &mut self,
        name: &str,
        block: Block,
        args: Bindings,
        caller: ContextId,
    ) -> Result<Instance> {
        let task = self.tasks.create();
        let frame = self.contexts.push_function(caller, args)?;
        let name = name.to_string();
        tracing::debug!(function = %name, task = task.raw(), "scheduled async body");
        self.async_frames.push(frame);
        self.enqueue_microtask(move |vm| {
            vm.async_frames.retain(|held| *held != frame);
            let outcome = vm.run_frame(&name, &block, frame);
            vm.contexts.release(frame)?;
            vm.tasks.settle(task, outcome?)
        });
        Ok(self.classes.promise(task))
    }

    /// Runs `job` on the worker pool; the returned promise settles with its result.
    pub fn spawn_blocking(&mut self, job: Job) -> Result<Instance> {
        let task = self.tasks.create();
        if self.pool.is_none() {
            self.pool = Some(TaskPool::new(self.config.worker_threads)?);
        }
        if let Some(pool) = self.pool.as_mut() {
            pool.submit(task, job)?;
        }
        if self.pool_event.is_none() {
            self.pool_event = Some(self.register_microevent(poll_pool));
        }
        Ok(self.classes.promise(task))
    }

    /// Waits for `task` by servicing the microtask and microevent tiers.
    /// The ready queue is left alone.
    pub fn await_task(&mut self, task: TaskId) -> Result<Instance> {
        let mut idle = 0;
        loop {
            if let Some(value) = self.tasks.consume(task)? {
                return Ok(value);
            }
            if self.halted {
                return Err(Diagnostic::runtime("interrupted while awaiting a promise").into());
            }
            let mut report = TickReport::default();
            self.drain_microtasks(&mut report)?;
            self.service_microevents(&mut report)?;
            if report.is_idle() {
                idle += 1;
                if idle > self.config.idle_tick_limit {
                    return Err(Diagnostic::runtime("awaited promise never settled").into());
                }
            } else {
                idle = 0;
                if report.only_waiting() {
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    /// String conversion through the instance's `__str__` member.
    pub fn stringify(&mut self, value: &Instance, context: ContextId) -> Result<String> {
        if let Some(method) = value.member("__str__").cloned() {
            let result = call::invoke(self, value, &method, Bindings::new(), context)?;
            return match result.as_str() {
                Some(text) => Ok(text.to_string()),
                None => Err(Diagnostic::type_error(format!(
                    "`__str__` of `{}` returned `{}`, not a string",
                    self.classes.name_of(value),
                    self.classes.name_of(&result)
                ))
                .into()),
            };
        }
        Ok(format!("<{}>", self.classes.name_of(value)))
    }

    /// Truthiness: booleans by value, others through `__bool__`, truthy otherwise.
    pub fn truthy(&mut self, value: &Instance, context: ContextId) -> Result<bool> {
        if let Some(flag) = value.as_bool() {
            return Ok(flag);
        }
        let Some(method) = value.member("__bool__").cloned() else {
            return Ok(true);
        };
        let result = call::invoke(self, value, &method, Bindings::new(), context)?;
        result.as_bool().ok_or_else(|| {
            Diagnostic::type_error(format!(
                "`__bool__` of `{}` returned `{}`, not a boolean",
                self.classes.name_of(value),
                self.classes.name_of(&result)
            ))
            .into()
        })
    }
}

fn poll_pool(vm: &mut Vm) -> Result<EventStatus> {
    let Some(pool) = vm.pool.as_mut() else {
        vm.pool_event = None;
        return Ok(EventStatus::Done);
    };
    let completions = pool.drain();
    let outstanding = pool.outstanding();
    if completions.is_empty() {
        if outstanding > 0 {
            return Ok(EventStatus::Busy);
        }
        vm.pool_event = None;
        return Ok(EventStatus::Done);
    }
    tracing::debug!(arrived = completions.len(), outstanding, "pool results");
    for completion in completions {
        vm.enqueue_microtask(move |vm| match completion.outcome {
            Ok(value) => {
                let value = value.into_instance(&vm.classes);
                vm.tasks.settle(completion.task, value)
            }
            Err(message) => Err(Diagnostic::runtime(message).into()),
        });
    }
    Ok(EventStatus::Progress)
}
