use thiserror::Error;

#[derive(Debug, Error)]
pub enum KumikiError {
    #[error("Task log:\n{0}")]
    TaskLog(#[from] TaskLogError),

    #[error("Worker:\n{0}")]
    Worker(#[from] WorkerError),

    #[error("Progress view:\n{0}")]
    Progress(#[from] ProgressError),

    #[error("View tree:\n{0}")]
    View(#[from] ViewError),

    #[error("Configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[cfg(feature = "logging")]
    #[error("Couldn't install the tracing subscriber.\n{0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Error)]
pub enum TaskLogError {
    #[error("Couldn't open the log file '{0}'.\n{1}")]
    Open(camino::Utf8PathBuf, std::io::Error),

    #[error("Couldn't remove the log file '{0}'.\n{1}")]
    Remove(camino::Utf8PathBuf, std::io::Error),

    #[error("Couldn't read the log file '{0}'.\n{1}")]
    Read(camino::Utf8PathBuf, std::io::Error),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("The worker can't run without tasks")]
    NoTasks,

    #[error("The tasks '{0}' are still running")]
    AlreadyRunning(String),

    #[error("Couldn't build the thread pool.\n{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid progress bar template.\n{0}")]
    Style(#[from] indicatif::style::TemplateError),

    #[error(transparent)]
    TaskLog(#[from] TaskLogError),
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("The tasks must be set first")]
    NoTasks,

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Unknown view {0}")]
    UnknownView(usize),

    #[error("No view at path '{0}'")]
    NotFound(String),

    #[error("View '{0}' already has a child named '{1}'")]
    DuplicateName(String, String),

    #[error("View '{view}' failed to update:\n{source}")]
    Update {
        view: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read the configuration file.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse the configuration file.\n{0}")]
    Json(#[from] serde_json::Error),
}
