//! Ordered groups of tasks with shared progress accounting.
use std::borrow::Cow;
use std::sync::{Arc, Condvar, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::TaskLogError;
use crate::task::{Task, TaskLogger, TaskStatus};

#[derive(Debug, Default)]
struct Ledger {
    started: bool,
    finished: usize,
}

/// An ordered group of tasks, run either strictly one after another or
/// concurrently by a [`Worker`](crate::Worker).
///
/// The finished counter and the aggregate status are read and written under
/// a single lock owned by the collection.
#[derive(Debug)]
pub struct Tasks {
    tasks: Vec<Task>,
    is_sequential: bool,
    logger: Arc<TaskLogger>,
    ledger: Mutex<Ledger>,
    settled: Condvar,
}

pub struct TasksBuilder {
    tasks: Vec<Task>,
    is_sequential: bool,
    print_to_std: bool,
    name: Cow<'static, str>,
    log_filepath: Option<Utf8PathBuf>,
}

impl TasksBuilder {
    pub fn sequential(mut self, is_sequential: bool) -> Self {
        self.is_sequential = is_sequential;
        self
    }

    pub fn print_to_std(mut self, print_to_std: bool) -> Self {
        self.print_to_std = print_to_std;
        self
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn log_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.log_filepath = Some(path.into());
        self
    }

    pub fn finish(self) -> Tasks {
        let logger = Arc::new(
            TaskLogger::new(self.name)
                .with_print_to_std(self.print_to_std)
                .with_path(self.log_filepath),
        );

        let mut tasks = self.tasks;
        for task in &mut tasks {
            task.set_logger(logger.clone());
        }

        Tasks {
            is_sequential: self.is_sequential || tasks.len() == 1,
            tasks,
            logger,
            ledger: Mutex::new(Ledger::default()),
            settled: Condvar::new(),
        }
    }
}

impl Tasks {
    /// Concurrent collection without any log sink, see [`Tasks::builder`]
    /// for the other options.
    pub fn new(tasks: Vec<Task>) -> Self {
        Self::builder(tasks).finish()
    }

    pub fn builder(tasks: Vec<Task>) -> TasksBuilder {
        TasksBuilder {
            tasks,
            is_sequential: false,
            print_to_std: false,
            name: Cow::Borrowed(""),
            log_filepath: None,
        }
    }

    pub fn name(&self) -> &str {
        self.logger.name()
    }

    /// Single task collections are always sequential.
    pub fn is_sequential(&self) -> bool {
        self.is_sequential
    }

    pub fn log_filepath(&self) -> Option<&Utf8Path> {
        self.logger.path()
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    /// Started and not every task reached a terminal state yet.
    pub fn is_running(&self) -> bool {
        let ledger = self.ledger.lock().unwrap();
        ledger.started && ledger.finished < self.tasks.len()
    }

    pub fn count_finished(&self) -> usize {
        self.ledger.lock().unwrap().finished
    }

    /// Aggregate status of the contained tasks.
    ///
    /// `Failed` wins over `Warning`, which wins over `Canceled`. `Success`
    /// requires every task to have succeeded. Otherwise the collection is
    /// pending: `NotStarted` if no task left that state, `Running` if some
    /// did. Terminal statuses are stored under the lock guarding the finished
    /// counter, so both always agree.
    pub fn status(&self) -> TaskStatus {
        let _ledger = self.ledger.lock().unwrap();
        aggregate(self.tasks.iter().map(Task::status))
    }

    /// Cooperative cancellation: tasks not yet started are flagged, running
    /// ones finish on their own. Returns how many tasks were flagged.
    pub fn cancel(&self) -> usize {
        let _ledger = self.ledger.lock().unwrap();
        self.tasks.iter().filter(|task| task.cancel()).count()
    }

    /// Resets the counter, the status of every task and the log file.
    pub fn clear(&self) -> Result<(), TaskLogError> {
        self.clear_status();
        self.clear_log()
    }

    pub fn clear_status(&self) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.started = false;
        ledger.finished = 0;
        for task in &self.tasks {
            task.clear_status();
        }
    }

    /// Blocks until every task reached a terminal state. Returns at once if
    /// the collection was never started.
    pub fn wait(&self) {
        let mut ledger = self.ledger.lock().unwrap();
        while ledger.started && ledger.finished < self.tasks.len() {
            ledger = self.settled.wait(ledger).unwrap();
        }
    }

    pub(crate) fn start(&self) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.started = true;
        ledger.finished = 0;
    }

    /// Runs the task at `index` and counts it as finished.
    ///
    /// The terminal status is stored under the same lock as the counter.
    /// Completing the last task closes the log before waiters wake up, so a
    /// new run never has its fresh log closed by the previous one. Returns
    /// whether the task succeeded and the new count.
    pub(crate) fn run_task(&self, index: usize) -> (bool, usize) {
        let task = &self.tasks[index];
        let outcome = task.execute();

        let mut ledger = self.ledger.lock().unwrap();
        let is_success = match outcome {
            Some(outcome) => task.settle(outcome),
            None => false,
        };

        ledger.finished += 1;
        if ledger.finished >= self.tasks.len() {
            self.logger.close();
            self.settled.notify_all();
        }

        (is_success, ledger.finished)
    }

    /// Runs every task on the calling thread, in order. The first failure
    /// stops the run and the remaining tasks are settled as canceled.
    pub fn run_inline(&self) -> bool {
        self.start();

        let mut is_success = true;
        for (index, task) in self.tasks.iter().enumerate() {
            if !is_success {
                task.cancel();
            }
            let (ran, _) = self.run_task(index);
            is_success = is_success && ran;
        }

        if self.tasks.is_empty() {
            self.logger.close();
            self.settled.notify_all();
        }

        is_success
    }

    /// Error messages of the failed tasks, in task order.
    pub fn join_error_messages(&self) -> String {
        join_messages(
            self.tasks
                .iter()
                .filter(|task| task.status() == TaskStatus::Failed)
                .map(Task::error_message)
                .filter(|message| !message.is_empty())
                .collect(),
        )
    }

    /// Warning messages of all the tasks, in task order.
    pub fn join_warning_messages(&self) -> String {
        join_messages(
            self.tasks
                .iter()
                .map(Task::warning_message)
                .filter(|message| !message.is_empty())
                .collect(),
        )
    }

    pub fn read_log(&self, max_lines: Option<usize>) -> Result<String, TaskLogError> {
        self.logger.read(max_lines)
    }

    pub fn clear_log(&self) -> Result<(), TaskLogError> {
        self.logger.clear()
    }

    pub fn close_log(&self) {
        self.logger.close();
    }
}

impl std::ops::Index<usize> for Tasks {
    type Output = Task;

    fn index(&self, index: usize) -> &Self::Output {
        &self.tasks[index]
    }
}

impl<'a> IntoIterator for &'a Tasks {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

fn aggregate(statuses: impl Iterator<Item = TaskStatus>) -> TaskStatus {
    let mut is_failed = false;
    let mut is_warning = false;
    let mut is_canceled = false;
    let mut is_pending = false;
    let mut is_touched = false;

    for status in statuses {
        match status {
            TaskStatus::Failed => is_failed = true,
            TaskStatus::Warning => is_warning = true,
            TaskStatus::Canceled => is_canceled = true,
            TaskStatus::Success => {}
            TaskStatus::Running => is_pending = true,
            TaskStatus::NotStarted => {
                is_pending = true;
                continue;
            }
        }
        is_touched = true;
    }

    if is_failed {
        TaskStatus::Failed
    } else if is_warning {
        TaskStatus::Warning
    } else if is_canceled {
        TaskStatus::Canceled
    } else if !is_pending {
        TaskStatus::Success
    } else if is_touched {
        TaskStatus::Running
    } else {
        TaskStatus::NotStarted
    }
}

fn join_messages(messages: Vec<String>) -> String {
    match messages.as_slice() {
        [] => String::new(),
        [message] => message.clone(),
        messages => messages
            .iter()
            .map(|message| format!("- {message}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
