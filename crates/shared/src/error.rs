use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing required field, password mismatch, password too short.
    Validation,
    /// Wrong credentials or a session the provider no longer accepts.
    Auth,
    /// A remote write/upload/read failed or timed out.
    Network,
    /// An action requiring a session was invoked without one.
    NoSession,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn no_session() -> Self {
        Self::new(ErrorKind::NoSession, "not signed in")
    }

    /// Whether the session should be dropped and the user returned to the
    /// login screen.
    pub fn requires_reauth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
