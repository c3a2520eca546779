//! Error taxonomy seen by callers of the controller facade.
//!
//! Raw [`TransportError`](crate::transport::TransportError)s never cross the
//! connection manager: they demote the connection and surface here as
//! [`ControlError::NotConnected`].

use thiserror::Error;

/// Errors returned by controller operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// No camera is bound, or the link failed during the operation.
    ///
    /// Recoverable: the caller shows it as status text and may reconnect.
    #[error("Not connected to camera")]
    NotConnected,

    /// The config document could not be written.
    ///
    /// The in-memory state is rolled back before this is returned.
    #[error("Failed to persist config: {0}")]
    Persist(String),
}

/// Result type for controller operations.
pub type ControlResult<T> = Result<T, ControlError>;
