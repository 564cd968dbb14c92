use thiserror::Error;

/// Errors produced while running a turn graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("context error: {0}")]
    ContextError(String),

    #[error("graph has no start task")]
    MissingStartTask,

    #[error("turn exceeded {0} task steps")]
    StepLimitExceeded(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
