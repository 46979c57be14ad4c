//! Background task execution for long-running membership operations.
//!
//! Bootstrap and join run to completion in the background; the caller gets a
//! [`TaskHandle`] immediately and observes progress through the task's
//! append-only log and its terminal state. Tasks are not cancellable - the
//! only terminal states are [`TaskState::Succeeded`] and
//! [`TaskState::Failed`].

use std::sync::Arc;

use chrono::Utc;
use clusterd_types::Result;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Lifecycle state of a background task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// The task is still executing.
    Running,
    /// The task finished successfully.
    Succeeded,
    /// The task hit a fatal error.
    Failed {
        /// Human-readable failure message.
        message: String,
    },
}

impl TaskState {
    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// Append-only, timestamped task log.
#[derive(Default)]
pub struct TaskLog {
    lines: Mutex<Vec<String>>,
}

impl TaskLog {
    /// Appends one line, mirrored to the tracing log.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "clusterd::task", "{line}");
        self.lines.lock().push(format!("{} {line}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ")));
    }

    /// A copy of all lines appended so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

/// Handle to a spawned background task.
pub struct TaskHandle {
    id: Uuid,
    name: String,
    state: watch::Receiver<TaskState>,
    log: Arc<TaskLog>,
}

impl TaskHandle {
    /// Unique task identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The task's descriptive name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current task state.
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// The task's append-only log.
    pub fn log(&self) -> &TaskLog {
        &self.log
    }

    /// Waits for the task to reach a terminal state.
    pub async fn wait(&mut self) -> TaskState {
        loop {
            let current = self.state.borrow().clone();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                // Sender gone; whatever state it left is final.
                return self.state.borrow().clone();
            }
        }
    }
}

/// Spawns `work` on the blocking pool and returns its handle.
///
/// The worker's `Err` becomes [`TaskState::Failed`] with the error's display
/// message; the error is also appended to the task log so the failure is
/// visible through both channels.
pub fn spawn(name: &str, work: impl FnOnce(&TaskLog) -> Result<()> + Send + 'static) -> TaskHandle {
    let id = Uuid::new_v4();
    let (tx, rx) = watch::channel(TaskState::Running);
    let log = Arc::new(TaskLog::default());

    let worker_log = Arc::clone(&log);
    let task_name = name.to_string();
    tokio::task::spawn_blocking(move || {
        let outcome = work(&worker_log);
        let final_state = match outcome {
            Ok(()) => {
                worker_log.append(format!("task '{task_name}' finished"));
                TaskState::Succeeded
            },
            Err(e) => {
                worker_log.append(format!("task '{task_name}' failed: {e}"));
                TaskState::Failed { message: e.to_string() }
            },
        };
        let _ = tx.send(final_state);
    });

    TaskHandle { id, name: name.to_string(), state: rx, log }
}
