use thiserror::Error;

/// Failure taxonomy for a single run.
#[derive(Debug, Error)]
pub enum DockwatchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    ResourceConflict(String),

    #[error("{0}")]
    Rejected(String),

    #[error("the message field of a log event sent to CloudWatch is an empty string")]
    EmptyMessage,

    #[error("cannot reach the Docker daemon: {0}")]
    RuntimeUnavailable(String),

    #[error("image '{0}' not found: check the image name and try again")]
    ImageNotFound(String),

    #[error("Docker API error: {0}")]
    ProcessApi(String),

    #[error("error streaming container logs: {0}")]
    Streaming(String),
}

/// What a caller should do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Swallow and continue.
    Ignore,
    /// Report once and exit non-zero.
    Fatal,
}

impl DockwatchError {
    /// Single decision point for error policy. Every call site that can
    /// observe an error consults this mapping instead of deciding locally;
    /// a daemon-mode variant would change only this function (adding a
    /// retry arm) and leave the call sites alone.
    pub fn disposition(&self) -> Disposition {
        match self {
            DockwatchError::ResourceConflict(_) => Disposition::Ignore,
            _ => Disposition::Fatal,
        }
    }
}
