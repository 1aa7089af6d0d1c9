use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};

use rill::{Interpreter, Repl, RillError, VmConfig};

#[derive(Parser)]
#[command(author, version, about = "Rill language interpreter")]
struct Cli {
    #[command(flatten)]
    tuning: Tuning,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct Tuning {
    /// Idle scheduler ticks before a program is considered finished
    #[arg(long, global = true, default_value_t = 3)]
    idle_ticks: usize,
    /// Worker threads for background host work
    #[arg(long, global = true, default_value_t = 2)]
    workers: usize,
}

impl Tuning {
    fn config(&self) -> VmConfig {
        VmConfig::default()
            .with_idle_tick_limit(self.idle_ticks)
            .with_worker_threads(self.workers)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run a Rill script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Rill code and print a non-void result
    Eval { source: String },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.tuning.config();
    match execute(cli.command.unwrap_or(Command::Repl), config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Command, config: VmConfig) -> Result<(), RillError> {
    match command {
        Command::Run { script } => {
            let mut interpreter = Interpreter::with_config(config);
            interpreter.eval_file(&script)?;
            Ok(())
        }
        Command::Repl => Repl::with_config(config).run(),
        Command::Eval { source } => {
            let mut interpreter = Interpreter::with_config(config);
            let value = interpreter.eval_source(&source)?;
            if !value.is_void() {
                println!("{}", interpreter.render(&value)?);
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // Only initialize if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}
