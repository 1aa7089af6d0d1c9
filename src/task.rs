use indexmap::IndexMap;

use crate::{
    class::Instance,
    diagnostics::{Diagnostic, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum TaskState {
    Pending,
    Ready(Instance),
    Consumed,
}

/// Handles behind `promise` values.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: IndexMap<TaskId, TaskState>,
    next: u64,
}

impl TaskTable {
    pub fn create(&mut self) -> TaskId {
        self.next += 1;
        let id = TaskId(self.next);
        self.tasks.insert(id, TaskState::Pending);
        id
    }

    pub fn state(&self, id: TaskId) -> Option<&TaskState> {
        self.tasks.get(&id)
    }

    pub fn is_settled(&self, id: TaskId) -> bool {
        !matches!(self.tasks.get(&id), Some(TaskState::Pending))
    }

    pub fn settle(&mut self, id: TaskId, value: Instance) -> Result<()> {
        match self.tasks.get_mut(&id) {
            Some(state @ TaskState::Pending) => {
                *state = TaskState::Ready(value);
                Ok(())
            }
            Some(_) => Err(Diagnostic::runtime(format!("task #{} settled twice", id.0)).into()),
            None => Err(unknown(id)),
        }
    }

    /// Moves a ready value out, leaving the task consumed. `Ok(None)` while pending.
    pub fn consume(&mut self, id: TaskId) -> Result<Option<Instance>> {
        let state = self.tasks.get_mut(&id).ok_or_else(|| unknown(id))?;
        match std::mem::replace(state, TaskState::Consumed) {
            TaskState::Ready(value) => Ok(Some(value)),
            TaskState::Pending => {
                *state = TaskState::Pending;
                Ok(None)
            }
            TaskState::Consumed => {
                Err(Diagnostic::runtime(format!("promise #{} was already awaited", id.0)).into())
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .values()
            .filter(|state| matches!(state, TaskState::Pending))
            .count()
    }
}

fn unknown(id: TaskId) -> crate::diagnostics::RillError {
    Diagnostic::runtime(format!("unknown task #{}", id.0)).into()
}
