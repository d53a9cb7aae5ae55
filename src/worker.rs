//! Dispatch of a [`Tasks`] collection onto a thread pool.
//!
//! The worker is owned by the thread that drives the user interface. Tasks
//! run on a bounded `rayon` pool and report back through a channel, the
//! owning thread drains it with [`Worker::poll_events`] (or blocks on
//! [`Worker::wait`]) and only then are the observers called. Observers never
//! run on a pool thread.
//!
//! In sequential mode only the first task is submitted, each completion
//! submits the next one. In concurrent mode every task is submitted at once.
//! Either way the finished counter is incremented under the collection lock
//! and exactly one completion observes the last increment and reports
//! [`WorkerEvent::Finished`].
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};

use rayon::ThreadPool;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::collection::Tasks;
use crate::config::WorkerConfig;
use crate::error::WorkerError;

/// Lifecycle of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Finished,
    Canceling,
    Canceled,
}

/// Notification sent from the pool to the thread owning the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Number of finished tasks, only sent for collections of more than one
    /// task.
    Progress(usize),
    /// Every task reached a terminal state.
    Finished,
}

/// Shared by every job of one run.
struct Dispatch {
    pool: Arc<ThreadPool>,
    tasks: Arc<Tasks>,
    sender: Sender<WorkerEvent>,
    span: tracing::Span,
}

impl Dispatch {
    fn spawn(self: Arc<Self>, index: usize) {
        let pool = self.pool.clone();
        pool.spawn(move || self.execute(index));
    }

    fn execute(self: Arc<Self>, mut index: usize) {
        loop {
            let (_, finished) = {
                let _enter = self.span.enter();
                self.tasks.run_task(index)
            };

            self.complete(finished);
            if !self.tasks.is_sequential() || finished >= self.tasks.len() {
                return;
            }

            // Tasks canceled meanwhile are settled here instead of being
            // submitted again.
            index += 1;
            if !self.tasks[index].is_canceled() {
                self.spawn(index);
                return;
            }
        }
    }

    fn complete(&self, finished: usize) {
        self.span.pb_inc(1);

        if self.tasks.len() > 1 {
            self.sender.send(WorkerEvent::Progress(finished)).ok();
        }

        if finished == self.tasks.len() {
            tracing::info!(tasks = %self.tasks.name(), status = ?self.tasks.status(), "tasks finished");
            self.sender.send(WorkerEvent::Finished).ok();
        }
    }
}

type ProgressFn = Box<dyn FnMut(usize)>;
type NotifyFn = Box<dyn FnMut()>;

/// Runs the tasks of a collection and notifies observers of progress,
/// completion and cancellation.
pub struct Worker {
    pool: Arc<ThreadPool>,
    tasks: Option<Arc<Tasks>>,
    state: WorkerState,
    events: Option<Receiver<WorkerEvent>>,
    on_progress: Vec<ProgressFn>,
    on_finished: Vec<NotifyFn>,
    on_canceled: Vec<NotifyFn>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("tasks", &self.tasks.as_ref().map(|tasks| tasks.name()))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// A worker with its own pool built from the default configuration.
    pub fn new() -> Result<Self, WorkerError> {
        Self::with_config(&WorkerConfig::default())
    }

    pub fn with_config(config: &WorkerConfig) -> Result<Self, WorkerError> {
        Ok(Self::with_pool(Arc::new(config.build_pool()?)))
    }

    /// A worker dispatching onto an existing pool, several workers can share
    /// one.
    pub fn with_pool(pool: Arc<ThreadPool>) -> Self {
        Self {
            pool,
            tasks: None,
            state: WorkerState::Idle,
            events: None,
            on_progress: Vec::new(),
            on_finished: Vec::new(),
            on_canceled: Vec::new(),
        }
    }

    pub fn tasks(&self) -> Option<&Arc<Tasks>> {
        self.tasks.as_ref()
    }

    pub fn set_tasks(&mut self, tasks: Arc<Tasks>) {
        self.tasks = Some(tasks);
        self.state = WorkerState::Idle;
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn on_progress(&mut self, callback: impl FnMut(usize) + 'static) {
        self.on_progress.push(Box::new(callback));
    }

    pub fn on_finished(&mut self, callback: impl FnMut() + 'static) {
        self.on_finished.push(Box::new(callback));
    }

    pub fn on_canceled(&mut self, callback: impl FnMut() + 'static) {
        self.on_canceled.push(Box::new(callback));
    }

    /// Clears the collection and dispatches its tasks. Returns at once, the
    /// outcome is reported through the events.
    pub fn run(&mut self) -> Result<(), WorkerError> {
        let tasks = self.tasks.clone().ok_or(WorkerError::NoTasks)?;
        // Running until the finished event was delivered
        if tasks.is_running()
            || matches!(self.state, WorkerState::Running | WorkerState::Canceling)
        {
            return Err(WorkerError::AlreadyRunning(tasks.name().to_string()));
        }

        self.state = WorkerState::Idle;
        tasks.clear()?;

        let (sender, receiver) = channel();
        self.events = Some(receiver);

        let span = tracing::span!(Level::INFO, "tasks", name = %tasks.name());
        span.pb_set_length(tasks.len() as u64);
        span.pb_set_style(&crate::utils::get_style_tasks()?);
        span.pb_set_message(&format!("Running {} tasks...", tasks.len()));

        tracing::info!(
            tasks = %tasks.name(),
            count = tasks.len(),
            sequential = tasks.is_sequential(),
            "dispatching tasks"
        );

        tasks.start();
        self.state = WorkerState::Running;

        if tasks.is_empty() {
            tasks.close_log();
            sender.send(WorkerEvent::Finished).ok();
            return Ok(());
        }

        let dispatch = Arc::new(Dispatch {
            pool: self.pool.clone(),
            tasks: tasks.clone(),
            sender,
            span,
        });

        if tasks.is_sequential() {
            dispatch.spawn(0);
        } else {
            for index in 0..tasks.len() {
                dispatch.clone().spawn(index);
            }
        }

        Ok(())
    }

    /// Flags the tasks not started yet as canceled and notifies the
    /// observers. Running tasks finish on their own, with
    /// `wait_for_completion` this call blocks until they did.
    pub fn cancel(&mut self, wait_for_completion: bool) {
        let Some(tasks) = self.tasks.clone() else {
            return;
        };

        let count = tasks.cancel();
        tracing::info!(tasks = %tasks.name(), count, "tasks canceled");

        if count > 0 && self.state == WorkerState::Running {
            self.state = WorkerState::Canceling;
        }

        for callback in &mut self.on_canceled {
            callback();
        }

        if wait_for_completion {
            tasks.wait();
        }
    }

    /// Delivers the pending notifications without blocking.
    pub fn poll_events(&mut self) -> Vec<WorkerEvent> {
        let mut events = Vec::new();

        while let Some(receiver) = &self.events {
            match receiver.try_recv() {
                Ok(event) => {
                    self.deliver(event);
                    events.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.events = None;
                }
            }
        }

        events
    }

    /// Delivers notifications, blocking until the collection finished.
    pub fn wait(&mut self) -> Vec<WorkerEvent> {
        let mut events = Vec::new();

        while let Some(receiver) = &self.events {
            match receiver.recv() {
                Ok(event) => {
                    self.deliver(event);
                    events.push(event);
                    if event == WorkerEvent::Finished {
                        break;
                    }
                }
                Err(_) => {
                    self.events = None;
                }
            }
        }

        events
    }

    fn deliver(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(finished) => {
                for callback in &mut self.on_progress {
                    callback(finished);
                }
            }
            WorkerEvent::Finished => {
                self.state = match self.state {
                    WorkerState::Canceling => WorkerState::Canceled,
                    _ => WorkerState::Finished,
                };
                for callback in &mut self.on_finished {
                    callback();
                }
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(tasks) = &self.tasks
            && tasks.is_running()
        {
            tasks.cancel();
            tasks.wait();
        }
    }
}
