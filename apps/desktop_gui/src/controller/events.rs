//! UI/backend events and error modeling for the desktop app.

use shared::{
    domain::{EntityId, EntityKind},
    error::{ClientError, ErrorKind},
    protocol::{AuthSession, EntityRecord, UserProfile},
};

/// Decoded RGBA pixels ready to become a texture on the UI thread.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

pub enum UiEvent {
    SignedIn(AuthSession),
    SignedOut,
    Info(String),
    Error(UiError),
    EntitiesSnapshot {
        kind: EntityKind,
        entities: Vec<EntityRecord>,
    },
    EntityCreated {
        kind: EntityKind,
        entity_id: EntityId,
    },
    EntityCreateFailed {
        kind: EntityKind,
        error: UiError,
    },
    ProfileLoaded(UserProfile),
    DisplayNameSaved(String),
    AvatarUploaded(String),
    PasswordChanged,
    ImageLoaded {
        url: String,
        image: DecodedImage,
    },
    ImageLoadFailed {
        url: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SignIn,
    SignUp,
    Profile,
    PasswordChange,
    CreateEntity,
    General,
}

/// Error as shown to the user: the structured kind from the client plus the
/// UI operation it interrupted.
#[derive(Debug, Clone)]
pub struct UiError {
    kind: ErrorKind,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_client(context: UiErrorContext, err: &ClientError) -> Self {
        Self {
            kind: err.kind,
            context,
            message: err.message.clone(),
        }
    }

    /// For failures that never went through the client, such as worker
    /// startup or file reads.
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            context,
            message: message.into(),
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn err_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "Validation",
        ErrorKind::Auth => "Authentication",
        ErrorKind::Network => "Network",
        ErrorKind::NoSession => "Session",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_demand_reauthentication() {
        let err = UiError::from_client(
            UiErrorContext::PasswordChange,
            &ClientError::auth("current password is incorrect"),
        );
        assert!(err.requires_reauth());
        assert_eq!(err.context(), UiErrorContext::PasswordChange);
    }

    #[test]
    fn ad_hoc_messages_read_as_network_problems() {
        let err = UiError::from_message(UiErrorContext::BackendStartup, "failed to build runtime");
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(!err.requires_reauth());
    }
}
