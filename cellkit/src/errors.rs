use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection failed after {attempts} attempts: {last_error}")]
    ConnectionExhausted { attempts: u32, last_error: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Coarse classification of a [`StoreError`], stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    NotFound,
    Transport,
    InvalidState,
    Config,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ConnectionError(_) | StoreError::ConnectionExhausted { .. } => {
                ErrorKind::Connection
            }
            StoreError::TableNotFound(_) => ErrorKind::NotFound,
            StoreError::TransportError(_) => ErrorKind::Transport,
            StoreError::InvalidState(_) => ErrorKind::InvalidState,
            StoreError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// True for failures that a later attempt may not repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionError(_) | StoreError::TransportError(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            StoreError::ConnectionExhausted { attempts: 10, last_error: "refused".into() }.kind(),
            ErrorKind::Connection
        );
        assert_eq!(StoreError::TableNotFound("t".into()).kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::InvalidState("no pending".into()).kind(), ErrorKind::InvalidState);
        assert!(StoreError::TransportError("reset".into()).is_transient());
        assert!(!StoreError::InvalidState("x".into()).is_transient());
    }

    #[test]
    fn test_exhausted_message() {
        let err = StoreError::ConnectionExhausted { attempts: 10, last_error: "refused".into() };
        assert_eq!(err.to_string(), "Connection failed after 10 attempts: refused");
    }
}
