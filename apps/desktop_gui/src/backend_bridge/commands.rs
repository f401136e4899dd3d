//! Backend commands queued from UI to backend worker.

use shared::domain::{EntityDraft, EntityKind};
use std::path::PathBuf;

pub enum BackendCommand {
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
        display_name: String,
    },
    SignOut,
    LoadProfile,
    SaveDisplayName {
        display_name: String,
    },
    ChangePassword {
        current_password: String,
        new_password: String,
    },
    UploadAvatar {
        path: PathBuf,
    },
    CreateEntity {
        kind: EntityKind,
        draft: EntityDraft,
    },
    RefreshEntities {
        kind: EntityKind,
    },
    WatchEntities {
        kind: EntityKind,
    },
    FetchImage {
        url: String,
    },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::SignIn { .. } => "sign_in",
            BackendCommand::SignUp { .. } => "sign_up",
            BackendCommand::SignOut => "sign_out",
            BackendCommand::LoadProfile => "load_profile",
            BackendCommand::SaveDisplayName { .. } => "save_display_name",
            BackendCommand::ChangePassword { .. } => "change_password",
            BackendCommand::UploadAvatar { .. } => "upload_avatar",
            BackendCommand::CreateEntity { .. } => "create_entity",
            BackendCommand::RefreshEntities { .. } => "refresh_entities",
            BackendCommand::WatchEntities { .. } => "watch_entities",
            BackendCommand::FetchImage { .. } => "fetch_image",
        }
    }
}
