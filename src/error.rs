use thiserror::Error;

use crate::native::{ContextHandle, ErrorInfo, NativeClient};

/// Boxed error raised by user code, such as a row callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for orars operations
#[derive(Debug, Error)]
pub enum OraRsError {
    #[error("Cannot open connection: {0}")]
    CantOpen(String),

    #[error("No handle: {0}")]
    NoHandle(String),

    #[error("No context: {0}")]
    NoContext(String),

    #[error("{0}")]
    Error(String),

    #[error("ORA-{code:05}: {message}")]
    Oracle { code: i32, message: String },

    /// Error returned by a row callback, passed through as-is.
    #[error(transparent)]
    Callback(BoxError),
}

impl OraRsError {
    pub(crate) fn no_handle() -> Self {
        OraRsError::NoHandle(
            "the db handle is not available, the connection is most likely already closed"
                .to_string(),
        )
    }

    pub(crate) fn no_context() -> Self {
        OraRsError::NoContext(
            "the db context is not available, the connection is most likely already closed"
                .to_string(),
        )
    }

    /// Wraps an arbitrary error so a row callback can fail with it.
    pub fn callback(err: impl Into<BoxError>) -> Self {
        OraRsError::Callback(err.into())
    }

    /// Reads the last error recorded by the native layer for `context`.
    /// Returns `NoContext` instead of touching the native layer when the
    /// context has already been released.
    pub fn get_last(client: &dyn NativeClient, context: Option<ContextHandle>) -> Self {
        match context {
            Some(context) => client.get_error(context).into(),
            None => Self::no_context(),
        }
    }

    /// The native error code, if this error came from the native layer.
    pub fn code(&self) -> Option<i32> {
        match self {
            OraRsError::Oracle { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ErrorInfo> for OraRsError {
    fn from(info: ErrorInfo) -> Self {
        OraRsError::Oracle {
            code: info.code,
            message: info.message,
        }
    }
}

/// Result type alias for orars operations
pub type Result<T> = std::result::Result<T, OraRsError>;
