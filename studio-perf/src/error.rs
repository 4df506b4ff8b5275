/// Errors raised by the crate itself.
///
/// Operations wrapped by the deduplicator, batch executor or progressive
/// loader keep their own error types; nothing here wraps them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for Error {
    fn from(error: figment::Error) -> Self {
        Error::Config(Box::new(error))
    }
}

/// Errors that can occur while waiting on a batched operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("Batch task was dropped before the operation completed")]
    Dropped,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
