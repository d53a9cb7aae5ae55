//! State of a progress bar with a run/cancel button, driven by a [`Worker`].
use std::sync::Arc;

use crate::collection::Tasks;
use crate::error::ProgressError;
use crate::task::TaskStatus;
use crate::worker::{Worker, WorkerEvent};

/// A message the host should display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Error(String),
    Warning(String),
}

#[derive(Debug)]
pub struct ProgressView {
    pub minimum: usize,
    pub maximum: usize,
    pub value: usize,
    pub is_percentage_visible: bool,
    pub run_text: String,
    pub cancel_text: String,
    pub button_text: String,
    pub button_enabled: bool,
    pub label_text: String,
    worker: Worker,
}

impl ProgressView {
    pub fn new(worker: Worker) -> Self {
        Self {
            minimum: 0,
            maximum: 0,
            value: 0,
            is_percentage_visible: false,
            run_text: "Run".into(),
            cancel_text: "Cancel".into(),
            button_text: "Run".into(),
            button_enabled: true,
            label_text: String::new(),
            worker,
        }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Gives access to the observers of the worker.
    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    pub fn tasks(&self) -> Option<&Arc<Tasks>> {
        self.worker.tasks()
    }

    /// Sets the tasks and prepares the range for their first run.
    pub fn set_tasks(&mut self, tasks: Arc<Tasks>) {
        self.worker.set_tasks(tasks);
        self.button_text = self.run_text.clone();
        self.button_enabled = true;
        self.label_text.clear();
        // Tasks were just set
        let _ = self.update_progress_range(true);
    }

    /// Resets the bar. Several tasks show a percentage over `0..=n`, a
    /// single task only shows busy (`maximum == 0`) or done (`maximum == 1`).
    pub fn update_progress_range(&mut self, about_to_run: bool) -> Result<(), ProgressError> {
        self.value = 0;
        self.minimum = 0;

        let count = self.tasks().ok_or(ProgressError::NoTasks)?.len();
        if count > 1 {
            self.is_percentage_visible = true;
            self.maximum = count;
        } else {
            self.is_percentage_visible = false;
            self.maximum = usize::from(!about_to_run);
        }

        Ok(())
    }

    /// Reacts to a click on the button: cancels a running concurrent
    /// collection, otherwise (re)runs the tasks.
    pub fn trigger(&mut self) -> Result<(), ProgressError> {
        self.update_progress_range(true)?;
        let tasks = self.tasks().cloned().ok_or(ProgressError::NoTasks)?;

        self.button_enabled = false;

        if tasks.is_running() && !tasks.is_sequential() {
            self.cancel();
            return Ok(());
        }

        self.label_text.clear();
        self.worker.run()?;

        // Sequential runs can't be canceled
        if !tasks.is_sequential() {
            self.button_enabled = true;
            self.button_text = self.cancel_text.clone();
        }

        Ok(())
    }

    /// Requests the cancellation of the tasks which didn't start yet.
    pub fn cancel(&mut self) {
        let Some(tasks) = self.tasks() else {
            return;
        };

        self.label_text = match tasks.is_sequential() {
            true => "Can't cancel a running task ...".into(),
            false => "Cancelling ...".into(),
        };

        self.worker.cancel(false);
    }

    /// Applies the pending events of the worker without blocking.
    pub fn poll(&mut self) -> Vec<WorkerEvent> {
        let events = self.worker.poll_events();
        self.apply(&events);
        events
    }

    /// Applies the events of the worker until the tasks finished.
    pub fn wait(&mut self) -> Vec<WorkerEvent> {
        let events = self.worker.wait();
        self.apply(&events);
        events
    }

    fn apply(&mut self, events: &[WorkerEvent]) {
        for event in events {
            match event {
                WorkerEvent::Progress(_) => self.progress(),
                WorkerEvent::Finished => self.finished(),
            }
        }
    }

    fn progress(&mut self) {
        if let Some(tasks) = self.tasks() {
            self.value = tasks.count_finished();
        }
    }

    fn finished(&mut self) {
        let Some(tasks) = self.tasks().cloned() else {
            return;
        };

        self.button_enabled = !tasks.is_empty();
        self.button_text = self.run_text.clone();

        if tasks.is_sequential() {
            self.value = 1;
            self.maximum = 1;
        }
    }

    /// The message to display once the tasks finished, if any of them failed
    /// or warned.
    pub fn check(&self) -> Option<Message> {
        let tasks = self.tasks()?;
        match tasks.status() {
            TaskStatus::Failed => Some(Message::Error(tasks.join_error_messages())),
            TaskStatus::Warning => Some(Message::Warning(tasks.join_warning_messages())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::config::WorkerConfig;
    use crate::task::{Task, TaskContext};

    fn view() -> ProgressView {
        ProgressView::new(Worker::with_config(&WorkerConfig::default().threads(2)).unwrap())
    }

    #[test]
    fn test_range_requires_tasks() {
        let mut view = view();
        assert!(matches!(
            view.update_progress_range(false),
            Err(ProgressError::NoTasks)
        ));
        assert!(matches!(view.trigger(), Err(ProgressError::NoTasks)));
    }

    #[test]
    fn test_single_task_range() {
        let mut view = view();
        view.set_tasks(Arc::new(Tasks::new(vec![Task::one_shot("only", || Ok(()))])));
        assert_eq!(view.maximum, 0);
        assert!(!view.is_percentage_visible);

        view.trigger().unwrap();
        assert_eq!(view.maximum, 0);
        assert!(!view.button_enabled);

        view.wait();
        assert_eq!(view.maximum, 1);
        assert_eq!(view.value, 1);
        assert!(view.button_enabled);
        assert_eq!(view.button_text, "Run");
    }

    #[test]
    fn test_range_of_several_tasks() {
        let tasks = (0..5)
            .map(|i| Task::one_shot(format!("task {i}"), || Ok(())))
            .collect();

        let mut view = view();
        view.set_tasks(Arc::new(Tasks::new(tasks)));
        assert_eq!((view.minimum, view.maximum), (0, 5));
        assert!(view.is_percentage_visible);

        view.trigger().unwrap();
        assert!(view.button_enabled);
        assert_eq!(view.button_text, "Cancel");

        view.wait();
        assert_eq!(view.value, 5);
        assert_eq!(view.maximum, 5);
        assert_eq!(view.button_text, "Run");
        assert!(view.button_enabled);
        assert_eq!(view.check(), None);
    }

    #[test]
    fn test_sequential_run_disables_button() {
        let tasks = vec![
            Task::one_shot("a", || Ok(())),
            Task::one_shot("b", || Ok(())),
        ];

        let mut view = view();
        view.set_tasks(Arc::new(Tasks::builder(tasks).sequential(true).finish()));

        view.trigger().unwrap();
        assert!(!view.button_enabled);
        assert_eq!(view.button_text, "Run");

        view.wait();
        assert!(view.button_enabled);
        assert_eq!((view.value, view.maximum), (1, 1));
    }

    #[test]
    fn test_check_messages() {
        let tasks = vec![
            Task::one_shot("a", || anyhow::bail!("disk full")),
            Task::new("b", |ctx: &mut TaskContext| {
                ctx.warning("slow");
                Ok(true)
            }),
            Task::one_shot("c", || anyhow::bail!("no network")),
        ];

        let mut view = view();
        view.set_tasks(Arc::new(Tasks::new(tasks)));
        view.trigger().unwrap();
        view.wait();

        let Some(Message::Error(message)) = view.check() else {
            panic!("expected an error message");
        };
        assert!(message.contains("- disk full"));
        assert!(message.contains("- no network"));
        assert!(!message.contains("slow"));

        let tasks = vec![Task::new("b", |ctx: &mut TaskContext| {
            ctx.warning("slow");
            Ok(true)
        })];
        view.set_tasks(Arc::new(Tasks::new(tasks)));
        view.trigger().unwrap();
        view.wait();

        assert_eq!(view.check(), Some(Message::Warning("slow".into())));
    }

    #[test]
    fn test_trigger_cancels_running_concurrent_tasks() {
        let (open, gate) = channel::<()>();
        let mut tasks = vec![Task::one_shot("gate", move || {
            gate.recv().ok();
            Ok(())
        })];
        for i in 0..3 {
            tasks.push(Task::one_shot(format!("after {i}"), || Ok(())));
        }
        let tasks = Arc::new(Tasks::new(tasks));

        let mut view = ProgressView::new(
            Worker::with_config(&WorkerConfig::default().threads(1)).unwrap(),
        );
        view.set_tasks(tasks.clone());
        view.trigger().unwrap();

        while tasks[0].status() != TaskStatus::Running {
            thread::sleep(Duration::from_millis(1));
        }

        view.trigger().unwrap();
        assert_eq!(view.label_text, "Cancelling ...");
        assert!(!view.button_enabled);

        open.send(()).unwrap();
        view.wait();

        assert_eq!(tasks[0].status(), TaskStatus::Success);
        for task in tasks.iter().skip(1) {
            assert_eq!(task.status(), TaskStatus::Canceled);
        }
        assert!(view.button_enabled);
        assert_eq!(view.button_text, "Run");
    }

    #[test]
    fn test_cancel_label_of_sequential_tasks() {
        let (open, gate) = channel::<()>();
        let tasks = vec![
            Task::one_shot("gate", move || {
                gate.recv().ok();
                Ok(())
            }),
            Task::one_shot("next", || Ok(())),
        ];
        let tasks = Arc::new(Tasks::builder(tasks).sequential(true).finish());

        let mut view = view();
        view.set_tasks(tasks.clone());
        view.trigger().unwrap();
        view.cancel();

        assert_eq!(view.label_text, "Can't cancel a running task ...");

        open.send(()).unwrap();
        view.wait();
        assert_eq!(tasks[1].status(), TaskStatus::Canceled);
    }
}
