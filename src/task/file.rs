use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use crate::task::{Task, TaskContext};

/// Data that can be loaded from and stored to a file by a background task.
pub trait Document: Send + 'static {
    fn open(&mut self, path: &Utf8Path) -> anyhow::Result<()>;
    fn save(&self, path: &Utf8Path) -> anyhow::Result<()>;
}

impl Task {
    /// A task opening `path` into the shared document.
    pub fn open<D: Document>(document: Arc<Mutex<D>>, path: impl Into<Utf8PathBuf>) -> Task {
        let path = path.into();
        let name = format!("open {path}");

        Task::new(name, move |_: &mut TaskContext| {
            document.lock().unwrap().open(&path)?;
            Ok(true)
        })
        .capture_errors(true)
    }

    /// A task saving the shared document into `path`.
    pub fn save<D: Document>(document: Arc<Mutex<D>>, path: impl Into<Utf8PathBuf>) -> Task {
        let path = path.into();
        let name = format!("save {path}");

        Task::new(name, move |_: &mut TaskContext| {
            document.lock().unwrap().save(&path)?;
            Ok(true)
        })
        .capture_errors(true)
    }
}
