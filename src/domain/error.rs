use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Format error: {0}")]
    Format(String),
    #[error("Invalid duration: {0} minutes (must be > 0)")]
    InvalidDuration(i64),
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}
