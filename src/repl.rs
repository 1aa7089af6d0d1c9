use rustyline::{DefaultEditor, error::ReadlineError};

use crate::{
    config::VmConfig,
    diagnostics::{Result, RillError},
    runtime::Interpreter,
};

/// Line-at-a-time session over one interpreter; bindings persist between lines.
pub struct Repl {
    interpreter: Interpreter,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            interpreter: Interpreter::with_config(config),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline("rill> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.eval_line(trimmed) {
                        Ok(Some(rendered)) => println!("{rendered}"),
                        Ok(None) => {}
                        Err(err) => eprintln!("{err}"),
                    }
                    if self.interpreter.vm().is_halted() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }

    /// Evaluates one entry; `None` when it produced void.
    pub fn eval_line(&mut self, line: &str) -> Result<Option<String>> {
        let value = self.interpreter.eval_source(line)?;
        if value.is_void() {
            return Ok(None);
        }
        self.interpreter.render(&value).map(Some)
    }
}

fn readline_error(err: ReadlineError) -> RillError {
    RillError::from(std::io::Error::other(err))
}
