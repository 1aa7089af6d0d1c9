//! Host-facing entry point: a VM with the prelude installed.

use std::{fs, path::Path, rc::Rc};

use crate::{
    ast::Node,
    class::Instance,
    config::VmConfig,
    diagnostics::Result,
    parser, prelude,
    rules::RuleSet,
    vm::Vm,
};

pub struct Interpreter {
    vm: Vm,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_rules(RuleSet::standard(), config)
    }

    /// Builds the interpreter over a customised rule set.
    pub fn with_rules(rules: RuleSet, config: VmConfig) -> Self {
        let mut vm = Vm::with_rules(rules, config);
        let global = vm.global();
        if let Err(err) = prelude::install(&mut vm, global) {
            tracing::warn!(%err, "prelude not installed");
        }
        Self { vm }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn parse(&self, source: &str) -> Result<Vec<Node>> {
        Ok(self.vm.rules().parse(source)?)
    }

    /// Runs `source` to completion and returns the value of its last
    /// top-level expression statement, or void.
    pub fn eval_source(&mut self, source: &str) -> Result<Instance> {
        let program = self.parse(source)?;
        self.eval_program(program)
    }

    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<Instance> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let file: Rc<str> = Rc::from(path.display().to_string());
        let program = parser::parse_file(&self.vm.rules(), &source, Some(file))?;
        self.eval_program(program)
    }

    fn eval_program(&mut self, program: Vec<Node>) -> Result<Instance> {
        self.vm.clear_halt();
        let global = self.vm.global();
        let runner = self.vm.load_program(program, global)?;
        tracing::debug!(lines = self.vm.pending_lines(), "program loaded");
        if let Err(err) = self.vm.run() {
            self.vm.reset()?;
            return Err(err);
        }
        let value = self.vm.finish_runner(runner)?;
        Ok(value.unwrap_or_else(|| self.vm.classes.void()))
    }

    /// String conversion in the global context, as `print` would render it.
    pub fn render(&mut self, value: &Instance) -> Result<String> {
        let global = self.vm.global();
        self.vm.stringify(value, global)
    }
}
