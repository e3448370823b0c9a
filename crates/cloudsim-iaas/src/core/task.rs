//! Ordered execution and communication phases of network cloudlets.

use serde::Serialize;

use crate::core::common::is_negligible;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TaskKind {
    /// Processing of `length` million instructions.
    Execution { length: f64 },
    /// Sending `payload` to another cloudlet.
    SendMessage { dst_cloudlet: u32, payload: u64 },
    /// Waiting for a message from another cloudlet.
    ReceiveMessage { src_cloudlet: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Pending,
    Active,
    Finished,
}

#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
    processed: f64,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            status: TaskStatus::Pending,
            start_time: None,
            finish_time: None,
            processed: 0.,
        }
    }

    pub fn execution(length: f64) -> Self {
        Self::new(TaskKind::Execution { length })
    }

    pub fn send(dst_cloudlet: u32, payload: u64) -> Self {
        Self::new(TaskKind::SendMessage { dst_cloudlet, payload })
    }

    pub fn receive(src_cloudlet: u32) -> Self {
        Self::new(TaskKind::ReceiveMessage { src_cloudlet })
    }

    pub fn is_finished(&self) -> bool {
        self.status == TaskStatus::Finished
    }

    /// Returns CPU length of the task, communication tasks have zero length.
    pub fn length(&self) -> f64 {
        match self.kind {
            TaskKind::Execution { length } => length,
            _ => 0.,
        }
    }

    pub fn is_execution(&self) -> bool {
        matches!(self.kind, TaskKind::Execution { .. })
    }

    /// Returns the number of processed instructions.
    pub fn processed(&self) -> f64 {
        self.processed
    }

    /// Returns the unprocessed part of an execution task.
    pub fn remaining_length(&self) -> f64 {
        (self.length() - self.processed).max(0.)
    }

    /// Accounts processed instructions, snapping to the task length when the rest is negligible.
    pub(crate) fn process(&mut self, amount: f64) {
        self.processed = (self.processed + amount).min(self.length());
        if is_negligible(self.remaining_length(), self.length()) {
            self.processed = self.length();
        }
    }

    pub(crate) fn finish(&mut self, time: f64) {
        self.status = TaskStatus::Finished;
        self.finish_time = Some(time);
    }
}

/// Tasks of a cloudlet executed strictly one after another.
///
/// The position of the current task ranges from -1 (not started) to `len` (all tasks passed).
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskSequence {
    tasks: Vec<Task>,
    // index of the current task plus one
    cursor: usize,
}

impl TaskSequence {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks, cursor: 0 }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_index(&self) -> isize {
        self.cursor as isize - 1
    }

    /// Returns the sum of execution task lengths.
    pub fn length(&self) -> f64 {
        self.tasks.iter().map(|t| t.length()).sum()
    }

    /// Returns the number of instructions processed by all tasks.
    pub fn processed(&self) -> f64 {
        self.tasks.iter().map(|t| t.processed()).sum()
    }

    pub fn current(&self) -> Option<&Task> {
        self.cursor.checked_sub(1).and_then(|i| self.tasks.get(i))
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Task> {
        self.cursor.checked_sub(1).and_then(move |i| self.tasks.get_mut(i))
    }

    /// Moves to the next task and marks it started at the specified time.
    ///
    /// Returns `None` without moving if the current task is not finished yet, or if all tasks are passed.
    pub fn start_next_task(&mut self, time: f64) -> Option<&Task> {
        if let Some(task) = self.current() {
            if !task.is_finished() {
                return None;
            }
        }
        if self.cursor <= self.tasks.len() {
            self.cursor += 1;
        }
        let task = self.current_mut()?;
        task.status = TaskStatus::Active;
        task.start_time = Some(time);
        Some(task)
    }

    /// Returns true if every task is finished.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }
}
