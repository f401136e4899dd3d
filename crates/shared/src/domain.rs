use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ErrorKind};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(EntityId);

/// Which kind of record the user is creating or viewing. Determines the
/// target collection and the add-action icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Site,
    Store,
}

impl EntityKind {
    pub fn collection_name(self) -> &'static str {
        match self {
            EntityKind::Site => "sites",
            EntityKind::Store => "stores",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Site => "Site",
            EntityKind::Store => "Store",
        }
    }
}

/// In-progress, unpersisted form of an entity being created. Lives only as
/// long as the creation form is open; discarded on cancel or after a
/// successful submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDraft {
    pub name: String,
    pub location: String,
    pub local_image: Option<PathBuf>,
}

impl EntityDraft {
    /// Submission gate: name and location must be non-empty after trimming.
    /// The image is optional.
    pub fn is_submittable(&self) -> bool {
        !self.name.trim().is_empty() && !self.location.trim().is_empty()
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() {
            return Err(ClientError::new(ErrorKind::Validation, "name is required"));
        }
        if self.location.trim().is_empty() {
            return Err(ClientError::new(
                ErrorKind::Validation,
                "location is required",
            ));
        }
        Ok(())
    }
}
