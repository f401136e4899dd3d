//! Document-database boundary: Firestore-style REST documents and the
//! collection-scoped operations Flux needs (create, list, single-document
//! get/merge-set). The database owns every persistence guarantee; this
//! module only encodes payloads and decodes snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{EntityId, UserId},
    error::{ClientError, ClientResult},
    protocol::{EntityRecord, NewEntity, UserProfile},
};

use crate::transport_error;

/// Typed field value as the document API represents it on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    StringValue(String),
    NullValue(Option<()>),
    ArrayValue { values: Vec<Value> },
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::StringValue(value.into())
    }

    pub fn null() -> Self {
        Value::NullValue(None)
    }

    pub fn string_array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::ArrayValue {
            values: values.into_iter().map(Value::string).collect(),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringValue(value) => Some(value),
            _ => None,
        }
    }
}

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource path; the last segment is the document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

impl Document {
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            name: None,
            fields,
            create_time: None,
            update_time: None,
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        self.name.as_deref()?.rsplit('/').next()
    }

    fn required_string(&self, field: &str) -> ClientResult<String> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::network(format!("document is missing string field '{field}'"))
            })
    }

    fn optional_string(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

pub fn entity_fields(entity: &NewEntity) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::string(&entity.name));
    fields.insert("location".to_string(), Value::string(&entity.location));
    fields.insert(
        "imageUrl".to_string(),
        match &entity.image_url {
            Some(url) => Value::string(url),
            None => Value::null(),
        },
    );
    fields.insert("adminId".to_string(), Value::string(&entity.admin_id.0));
    fields.insert(
        "members".to_string(),
        Value::string_array(entity.members.iter().map(|m| m.0.clone())),
    );
    fields
}

pub fn entity_from_document(document: &Document) -> ClientResult<EntityRecord> {
    let entity_id = document
        .document_id()
        .map(EntityId::from)
        .ok_or_else(|| ClientError::network("entity document has no resource name"))?;
    let created_at = document
        .create_time
        .ok_or_else(|| ClientError::network("entity document has no creation time"))?;
    let members = match document.fields.get("members") {
        Some(Value::ArrayValue { values }) => values
            .iter()
            .filter_map(Value::as_str)
            .map(UserId::from)
            .collect(),
        _ => Vec::new(),
    };

    Ok(EntityRecord {
        entity_id,
        name: document.required_string("name")?,
        location: document.required_string("location")?,
        image_url: document.optional_string("imageUrl"),
        admin_id: UserId(document.required_string("adminId")?),
        members,
        created_at,
    })
}

pub fn profile_fields(profile: &UserProfile) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        "displayName".to_string(),
        Value::string(&profile.display_name),
    );
    fields.insert("email".to_string(), Value::string(&profile.email));
    if let Some(photo_url) = &profile.photo_url {
        fields.insert("photoURL".to_string(), Value::string(photo_url));
    }
    fields
}

pub fn profile_from_document(document: &Document) -> UserProfile {
    UserProfile {
        display_name: document.optional_string("displayName").unwrap_or_default(),
        email: document.optional_string("email").unwrap_or_default(),
        photo_url: document.optional_string("photoURL"),
    }
}

/// Collection-scoped REST access to the document database. One instance per
/// client; requests carry the caller's bearer token.
pub struct DocumentStore {
    http: Client,
    base_url: String,
    project_id: String,
}

impl DocumentStore {
    pub fn new(http: Client, base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            project_id: project_id.into(),
        }
    }

    fn documents_url(&self, path: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{path}",
            self.base_url, self.project_id
        )
    }

    /// Appends a new document to `collection`. The server assigns the
    /// document id and the creation timestamp; calling this twice with the
    /// same fields produces two distinct documents.
    pub async fn create_document(
        &self,
        collection: &str,
        fields: Fields,
        bearer: &str,
    ) -> ClientResult<Document> {
        let response = self
            .http
            .post(self.documents_url(collection))
            .bearer_auth(bearer)
            .json(&Document::from_fields(fields))
            .send()
            .await
            .map_err(|err| transport_error("create document", err))?;
        let response = check_status(response, "create document").await?;
        response
            .json()
            .await
            .map_err(|err| ClientError::network(format!("invalid create response: {err}")))
    }

    /// Lists every document in `collection`, newest first. Ordering is by
    /// the server-assigned creation time.
    pub async fn list_documents(
        &self,
        collection: &str,
        bearer: &str,
    ) -> ClientResult<Vec<Document>> {
        let response = self
            .http
            .get(self.documents_url(collection))
            .query(&[("pageSize", "300")])
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|err| transport_error("list documents", err))?;
        let response = check_status(response, "list documents").await?;
        let body: ListDocumentsResponse = response
            .json()
            .await
            .map_err(|err| ClientError::network(format!("invalid list response: {err}")))?;

        let mut documents = body.documents;
        documents.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        Ok(documents)
    }

    pub async fn get_document(&self, path: &str, bearer: &str) -> ClientResult<Option<Document>> {
        let response = self
            .http
            .get(self.documents_url(path))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|err| transport_error("get document", err))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, "get document").await?;
        let document = response
            .json()
            .await
            .map_err(|err| ClientError::network(format!("invalid document response: {err}")))?;
        Ok(Some(document))
    }

    /// Merge-writes `fields` into the document at `path`, creating it if it
    /// does not exist. Only the named fields are touched.
    pub async fn merge_document(
        &self,
        path: &str,
        fields: Fields,
        bearer: &str,
    ) -> ClientResult<Document> {
        let mask: Vec<(&str, String)> = fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.clone()))
            .collect();
        let response = self
            .http
            .patch(self.documents_url(path))
            .query(&mask)
            .bearer_auth(bearer)
            .json(&Document::from_fields(fields))
            .send()
            .await
            .map_err(|err| transport_error("merge document", err))?;
        let response = check_status(response, "merge document").await?;
        response
            .json()
            .await
            .map_err(|err| ClientError::network(format!("invalid merge response: {err}")))
    }
}

pub(crate) async fn check_status(
    response: reqwest::Response,
    action: &str,
) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{action} failed ({status}): {body}");
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(ClientError::auth(message))
    } else {
        Err(ClientError::network(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::EntityDraft;

    #[test]
    fn values_match_the_wire_shape() {
        let encoded = serde_json::to_value(Value::string("Harbor")).expect("encode");
        assert_eq!(encoded, serde_json::json!({"stringValue": "Harbor"}));

        let encoded = serde_json::to_value(Value::null()).expect("encode");
        assert_eq!(encoded, serde_json::json!({"nullValue": null}));

        let encoded = serde_json::to_value(Value::string_array(["a", "b"])).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({"arrayValue": {"values": [
                {"stringValue": "a"},
                {"stringValue": "b"},
            ]}})
        );
    }

    #[test]
    fn document_id_is_the_last_path_segment() {
        let document = Document {
            name: Some(
                "projects/p/databases/(default)/documents/sites/abc123".to_string(),
            ),
            fields: Fields::new(),
            create_time: None,
            update_time: None,
        };
        assert_eq!(document.document_id(), Some("abc123"));
    }

    #[test]
    fn entity_payloads_survive_the_document_encoding() {
        let draft = EntityDraft {
            name: "Harbor".to_string(),
            location: "Pier 4".to_string(),
            local_image: None,
        };
        let entity = NewEntity::from_draft(&draft, UserId::from("uid-1"), None);

        let mut document = Document::from_fields(entity_fields(&entity));
        document.name =
            Some("projects/p/databases/(default)/documents/sites/doc-1".to_string());
        document.create_time = Some("2026-08-23T10:00:00Z".parse().expect("timestamp"));

        let record = entity_from_document(&document).expect("decode");
        assert_eq!(record.entity_id.as_str(), "doc-1");
        assert_eq!(record.name, "Harbor");
        assert_eq!(record.location, "Pier 4");
        assert_eq!(record.image_url, None);
        assert_eq!(record.admin_id, UserId::from("uid-1"));
        assert_eq!(record.members, vec![UserId::from("uid-1")]);
    }

    #[test]
    fn profile_documents_round_trip() {
        let profile = UserProfile {
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            photo_url: Some("https://media.example/a.png".to_string()),
        };
        let document = Document::from_fields(profile_fields(&profile));
        assert_eq!(profile_from_document(&document), profile);
    }

    #[test]
    fn documents_without_a_creation_time_are_rejected() {
        let draft = EntityDraft {
            name: "Harbor".to_string(),
            location: "Pier 4".to_string(),
            local_image: None,
        };
        let entity = NewEntity::from_draft(&draft, UserId::from("uid-1"), None);
        let mut document = Document::from_fields(entity_fields(&entity));
        document.name =
            Some("projects/p/databases/(default)/documents/sites/doc-1".to_string());

        assert!(entity_from_document(&document).is_err());
    }
}
