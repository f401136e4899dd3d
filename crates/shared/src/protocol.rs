use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EntityDraft, EntityId, UserId};

/// Session handle returned by the identity provider. Passed explicitly to
/// everything that needs the acting user; there is no ambient global user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: UserId,
    pub id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub email: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Creation payload handed to the entity writer. Built from a validated
/// draft; the owner becomes admin and sole initial member. The creation
/// timestamp is assigned by the server, never by this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub admin_id: UserId,
    pub members: Vec<UserId>,
}

impl NewEntity {
    pub fn from_draft(draft: &EntityDraft, owner: UserId, image_url: Option<String>) -> Self {
        Self {
            name: draft.name.trim().to_string(),
            location: draft.location.trim().to_string(),
            image_url,
            admin_id: owner.clone(),
            members: vec![owner],
        }
    }
}

/// Entity record as read back from the document database. This client never
/// owns the record's lifecycle; it only renders list snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub admin_id: UserId,
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

/// User document stored at `users/{user_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}
