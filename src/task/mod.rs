//! Units of cancellable, fallible background work.
mod file;
mod log;

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::Level as TracingLevel;

pub use crate::task::file::Document;
pub use crate::task::log::{Level, TaskLogger};

/// Observable state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Running,
    Success,
    Failed,
    Canceled,
    Warning,
}

impl TaskStatus {
    /// Terminal states only change through [`Task::clear_status`].
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Canceled | TaskStatus::Warning
        )
    }
}

/// The work wrapped by a [`Task`].
///
/// Returning `Ok(false)` signals failure to the caller of [`Task::run`]
/// without changing the status, the status is only driven by errors and the
/// messages recorded through the [`TaskContext`].
pub trait Operation: Send {
    fn execute(&mut self, context: &mut TaskContext) -> anyhow::Result<bool>;
}

impl<F> Operation for F
where
    F: FnMut(&mut TaskContext) -> anyhow::Result<bool> + Send,
{
    fn execute(&mut self, context: &mut TaskContext) -> anyhow::Result<bool> {
        self(context)
    }
}

/// Handed to an [`Operation`] while it runs.
pub struct TaskContext {
    name: Cow<'static, str>,
    logger: Arc<TaskLogger>,
    error_message: String,
    warning_message: String,
}

impl TaskContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    /// Records an error, the task ends up [`TaskStatus::Failed`].
    pub fn error(&mut self, message: impl Into<String>) {
        self.error_message = message.into();
    }

    /// Records a warning, the task ends up [`TaskStatus::Warning`] unless an
    /// error was recorded too.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.warning_message = message.into();
    }
}

#[derive(Debug, Default)]
struct TaskState {
    status: TaskStatus,
    error_message: String,
    warning_message: String,
    is_canceled: bool,
}

/// A single cancellable unit of work with an observable status.
///
/// A task is shared between the collection that owns it and the worker
/// thread that executes it, so its state sits behind its own lock. The
/// operation has a separate lock held only while it executes, reading the
/// status never waits for the operation.
pub struct Task {
    name: Cow<'static, str>,
    operation: Mutex<Box<dyn Operation>>,
    state: Mutex<TaskState>,
    capture_errors: bool,
    is_debug: bool,
    logger: Arc<TaskLogger>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("capture_errors", &self.capture_errors)
            .field("is_debug", &self.is_debug)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(name: impl Into<Cow<'static, str>>, operation: impl Operation + 'static) -> Self {
        Self {
            name: name.into(),
            operation: Mutex::new(Box::new(operation)),
            state: Mutex::new(TaskState::default()),
            capture_errors: false,
            is_debug: false,
            logger: Arc::new(TaskLogger::default()),
        }
    }

    /// A task around a plain closure, errors are captured as the task's
    /// error message.
    pub fn one_shot<F>(name: impl Into<Cow<'static, str>>, callback: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let mut callback = callback;
        Self::new(name, move |_: &mut TaskContext| callback().map(|_| true))
            .capture_errors(true)
    }

    /// Store errors raised by the operation in the error message instead of
    /// only logging them.
    pub fn capture_errors(mut self, capture: bool) -> Self {
        self.capture_errors = capture;
        self
    }

    /// Append the full error report to captured messages and log errors
    /// with their cause chain.
    pub fn debug(mut self, is_debug: bool) -> Self {
        self.is_debug = is_debug;
        self
    }

    pub(crate) fn set_logger(&mut self, logger: Arc<TaskLogger>) {
        self.logger = logger;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_debug(&self) -> bool {
        self.is_debug
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().unwrap().status
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_canceled(&self) -> bool {
        self.state.lock().unwrap().is_canceled
    }

    pub fn error_message(&self) -> String {
        self.state.lock().unwrap().error_message.clone()
    }

    pub fn warning_message(&self) -> String {
        self.state.lock().unwrap().warning_message.clone()
    }

    /// Flags the task so that [`run`](Self::run) settles it as canceled
    /// instead of executing it. A task that already left `NotStarted` is
    /// left alone and `false` is returned.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.status == TaskStatus::NotStarted {
            state.is_canceled = true;
            true
        } else {
            false
        }
    }

    /// Resets the task to `NotStarted` and lifts a previous cancellation.
    pub fn clear_status(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = TaskStatus::NotStarted;
        state.is_canceled = false;
    }

    /// Runs the operation and settles the status.
    ///
    /// Errors and panics of the operation never escape: they end up in the
    /// status and, when captured, in the error message. Returns `true`
    /// unless the operation failed or returned `Ok(false)`.
    pub fn run(&self) -> bool {
        match self.execute() {
            Some(outcome) => self.settle(outcome),
            None => false,
        }
    }

    /// Everything [`run`](Self::run) does except storing the terminal
    /// status, which the caller does through [`settle`](Self::settle).
    /// Returns `None` if the task already left `NotStarted`.
    pub(crate) fn execute(&self) -> Option<Outcome> {
        {
            let mut state = self.state.lock().unwrap();
            if state.status != TaskStatus::NotStarted {
                tracing::warn!(task = %self.name, status = ?state.status, "task already ran");
                return None;
            }
            if state.is_canceled {
                drop(state);
                self.logger.info(format!("Task {} canceled", self.name));
                return Some(Outcome {
                    status: TaskStatus::Canceled,
                    error_message: String::new(),
                    warning_message: String::new(),
                    is_success: false,
                });
            }
            state.error_message.clear();
            state.warning_message.clear();
            state.status = TaskStatus::Running;
        }

        let span = tracing::span!(TracingLevel::INFO, "task", name = %self.name);
        let _enter = span.enter();
        self.logger.info(format!("Task {} started", self.name));

        let mut context = TaskContext {
            name: self.name.clone(),
            logger: self.logger.clone(),
            error_message: String::new(),
            warning_message: String::new(),
        };

        let result = {
            let mut operation = self.operation.lock().unwrap();
            match catch_unwind(AssertUnwindSafe(|| operation.execute(&mut context))) {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!(panic_message(panic))),
            }
        };

        let TaskContext {
            mut error_message,
            warning_message,
            ..
        } = context;

        let (status, is_success) = match result {
            Ok(is_success) => {
                let status = if !error_message.is_empty() {
                    TaskStatus::Failed
                } else if !warning_message.is_empty() {
                    TaskStatus::Warning
                } else {
                    TaskStatus::Success
                };
                (status, is_success)
            }
            Err(e) => {
                if self.capture_errors {
                    error_message = e.to_string();
                    if self.is_debug {
                        error_message.push('\n');
                        error_message.push_str(&format!("{e:?}"));
                    }
                } else if self.is_debug {
                    self.logger.error(format!("{e:?}"));
                } else {
                    self.logger.error(e.to_string());
                }
                (TaskStatus::Failed, false)
            }
        };

        match status {
            TaskStatus::Failed => self.logger.error(format!("Task {} failed", self.name)),
            TaskStatus::Warning => self.logger.warning(format!("Task {} warned", self.name)),
            _ => self.logger.info(format!("Task {} succeeded", self.name)),
        }

        Some(Outcome {
            status,
            error_message,
            warning_message,
            is_success,
        })
    }

    /// Stores the terminal status of an execution.
    pub(crate) fn settle(&self, outcome: Outcome) -> bool {
        let mut state = self.state.lock().unwrap();
        state.error_message = outcome.error_message;
        state.warning_message = outcome.warning_message;
        state.status = outcome.status;

        outcome.is_success
    }
}

/// Result of [`Task::execute`], not yet visible through [`Task::status`].
#[derive(Debug)]
pub(crate) struct Outcome {
    status: TaskStatus,
    error_message: String,
    warning_message: String,
    is_success: bool,
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("Task panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("Task panicked: {s}")
    } else {
        String::from("Task panicked with unknown payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> Task {
        Task::one_shot("counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting(counter.clone());

        assert_eq!(task.status(), TaskStatus::NotStarted);
        assert!(task.run());
        assert_eq!(task.status(), TaskStatus::Success);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[test]
    fn test_canceled_task_does_not_execute() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting(counter.clone());

        assert!(task.cancel());
        assert!(!task.run());
        assert_eq!(task.status(), TaskStatus::Canceled);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_captured_error() {
        let task = Task::one_shot("boom", || anyhow::bail!("disk full"));

        assert!(!task.run());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error_message(), "disk full");
    }

    #[test]
    fn test_captured_error_in_debug_has_report() {
        let task = Task::one_shot("boom", || {
            Err(anyhow::anyhow!("root cause").context("while saving"))
        })
        .debug(true);

        assert!(!task.run());
        let message = task.error_message();
        assert!(message.starts_with("while saving\n"));
        assert!(message.contains("root cause"));
    }

    #[test]
    fn test_uncaptured_error_is_only_logged() {
        let task = Task::new("boom", |_: &mut TaskContext| -> anyhow::Result<bool> {
            anyhow::bail!("not captured")
        });

        assert!(!task.run());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error_message(), "");
    }

    #[test]
    fn test_panic_is_captured() {
        let task = Task::one_shot("panics", || panic!("oh no"));

        assert!(!task.run());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error_message(), "Task panicked: oh no");
    }

    #[test]
    fn test_recorded_messages() {
        let warned = Task::new("warned", |ctx: &mut TaskContext| {
            ctx.warning("almost empty");
            Ok(true)
        });
        assert!(warned.run());
        assert_eq!(warned.status(), TaskStatus::Warning);
        assert_eq!(warned.warning_message(), "almost empty");

        let failed = Task::new("failed", |ctx: &mut TaskContext| {
            ctx.warning("almost empty");
            ctx.error("empty");
            Ok(true)
        });
        assert!(failed.run());
        assert_eq!(failed.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_explicit_failure_keeps_status() {
        let task = Task::new("refused", |_: &mut TaskContext| Ok(false));

        assert!(!task.run());
        assert_eq!(task.status(), TaskStatus::Success);
    }

    #[test]
    fn test_terminal_status_sticks_until_cleared() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting(counter.clone());

        assert!(task.run());
        assert!(!task.run());
        assert!(!task.cancel());
        assert_eq!(task.status(), TaskStatus::Success);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        task.clear_status();
        assert_eq!(task.status(), TaskStatus::NotStarted);
        assert!(task.run());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_status_lifts_cancellation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting(counter.clone());

        task.cancel();
        task.clear_status();
        assert!(!task.is_canceled());
        assert!(task.run());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_messages_reset_between_runs() {
        let mut fail = true;
        let task = Task::new("flaky", move |ctx: &mut TaskContext| {
            if fail {
                ctx.error("first run failed");
            }
            fail = false;
            Ok(true)
        });

        task.run();
        assert_eq!(task.status(), TaskStatus::Failed);

        task.clear_status();
        task.run();
        assert_eq!(task.status(), TaskStatus::Success);
        assert_eq!(task.error_message(), "");
    }
}
