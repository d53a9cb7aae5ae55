#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod collection;
mod config;
mod error;
mod progress;
pub mod task;
mod utils;
pub mod view;
mod worker;

pub use crate::collection::{Tasks, TasksBuilder};
pub use crate::config::WorkerConfig;
pub use crate::error::*;
pub use crate::progress::{Message, ProgressView};
pub use crate::task::{Task, TaskContext, TaskStatus};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
pub use crate::view::{UpdateOptions, ViewId, ViewKind, ViewTree};
pub use crate::worker::{Worker, WorkerEvent, WorkerState};
