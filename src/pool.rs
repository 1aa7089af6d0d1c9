//! Fixed-size worker pool for host work that must not run on the
//! interpreter thread.
//!
//! Jobs cross into the pool over one channel and their results come back
//! over another. The pool never sees interpreter state: a job produces a
//! [`HostValue`], and the VM turns completions into microtasks that settle
//! the matching tasks.

use std::{
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::{
    class::{ClassTable, Instance},
    diagnostics::{Diagnostic, Result},
    task::TaskId,
};

/// Thread-safe mirror of the primitive values a job may produce.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Void,
    Number(f64),
    Str(String),
    Bool(bool),
}

impl HostValue {
    pub fn into_instance(self, classes: &ClassTable) -> Instance {
        match self {
            HostValue::Void => classes.void(),
            HostValue::Number(n) => classes.number(n),
            HostValue::Str(s) => classes.string(s),
            HostValue::Bool(b) => classes.boolean(b),
        }
    }
}

pub type Job = Box<dyn FnOnce() -> HostValue + Send + 'static>;

struct Request {
    task: TaskId,
    job: Job,
}

#[derive(Debug)]
pub struct Completion {
    pub task: TaskId,
    pub outcome: std::result::Result<HostValue, String>,
}

pub struct TaskPool {
    jobs: Option<Sender<Request>>,
    results: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
    outstanding: usize,
}

impl TaskPool {
    pub fn new(size: usize) -> Result<Self> {
        let (job_tx, job_rx) = channel::unbounded::<Request>();
        let (result_tx, result_rx) = channel::unbounded::<Completion>();
        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("rill-worker-{index}"))
                .spawn(move || worker_loop(jobs, results))?;
            workers.push(handle);
        }
        tracing::debug!(workers = workers.len(), "started task pool");
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers,
            outstanding: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&mut self, task: TaskId, job: Job) -> Result<()> {
        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| Diagnostic::runtime("task pool is shut down"))?;
        sender
            .send(Request { task, job })
            .map_err(|_| Diagnostic::runtime("task pool workers have exited"))?;
        self.outstanding += 1;
        Ok(())
    }

    /// Collects every completion that has arrived, without blocking.
    pub fn drain(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        loop {
            match self.results.try_recv() {
                Ok(completion) => {
                    self.outstanding = self.outstanding.saturating_sub(1);
                    completions.push(completion);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        completions
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(jobs: Receiver<Request>, results: Sender<Completion>) {
    while let Ok(Request { task, job }) = jobs.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(job))
            .map_err(|_| format!("background job for task #{} panicked", task.raw()));
        if results.send(Completion { task, outcome }).is_err() {
            break;
        }
    }
}
