use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for the thread pool a [`Worker`](crate::Worker) dispatches onto.
///
/// The configuration can be built in code or loaded from a JSON file:
///
/// ```json
/// { "threads": 4, "thread_name": "io-worker" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads, `0` lets rayon pick one per logical CPU.
    pub threads: usize,
    /// Prefix of the worker thread names.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            thread_name: String::from("kumiki-worker"),
        }
    }
}

impl WorkerConfig {
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Reads the configuration from a JSON file, missing keys fall back to
    /// their defaults.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }

    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        let prefix = self.thread_name.clone();

        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
    }
}
