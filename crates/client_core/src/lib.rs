use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{EntityId, EntityKind, UserId},
    error::{ClientError, ClientResult},
    protocol::{AuthSession, EntityRecord, NewEntity, UserProfile},
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod firestore;
pub mod identity;
pub mod media;

pub use identity::MIN_PASSWORD_LEN;

use firestore::{
    entity_fields, entity_from_document, profile_fields, profile_from_document, DocumentStore,
    Fields, Value,
};
use identity::IdentityClient;
use media::MediaUploader;

/// Bounded wait applied to every remote call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval behind collection subscriptions. Snapshots are only
/// emitted when the fetched documents actually change.
pub const SUBSCRIPTION_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub(crate) fn transport_error(action: &str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::network(format!("{action} timed out"))
    } else {
        ClientError::network(format!("{action} failed: {err}"))
    }
}

/// Where the three external collaborators live. Overridable so tests can
/// point every boundary at an in-process server.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub identity_url: String,
    pub documents_url: String,
    pub media_url: String,
    pub api_key: String,
    pub project_id: String,
    pub cloud_name: String,
    pub upload_preset: String,
}

impl ServiceEndpoints {
    pub fn production(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Self {
        Self {
            identity_url: "https://identitytoolkit.googleapis.com".to_string(),
            documents_url: "https://firestore.googleapis.com".to_string(),
            media_url: "https://api.cloudinary.com/v1_1".to_string(),
            api_key: api_key.into(),
            project_id: project_id.into(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        }
    }
}

/// Events fanned out to UI subscribers. Collection snapshots arrive through
/// here; request/response operations return their results directly.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    EntitiesSnapshot {
        kind: EntityKind,
        entities: Vec<EntityRecord>,
    },
    SubscriptionError {
        kind: EntityKind,
        message: String,
    },
}

/// External collaborator contract for entity creation. Appends a new record
/// to the collection named by `kind`, stamped with the acting user as owner
/// and sole initial member and a server-assigned creation timestamp.
///
/// Exactly-once submission is the caller's responsibility: calling `create`
/// twice with the same payload produces two distinct records.
#[async_trait]
pub trait EntityWriter: Send + Sync {
    async fn create(&self, kind: EntityKind, entity: NewEntity) -> ClientResult<EntityId>;
}

/// Stand-in writer for the signed-out state.
pub struct MissingEntityWriter;

#[async_trait]
impl EntityWriter for MissingEntityWriter {
    async fn create(&self, kind: EntityKind, _entity: NewEntity) -> ClientResult<EntityId> {
        warn!(collection = kind.collection_name(), "create attempted without a session");
        Err(ClientError::no_session())
    }
}

/// Client over the three remote boundaries: identity provider, document
/// database, and media host. Owns the auth session explicitly; nothing is
/// ambient.
pub struct FluxClient {
    http: Client,
    identity: IdentityClient,
    store: DocumentStore,
    media: MediaUploader,
    session: RwLock<Option<AuthSession>>,
    watches: Mutex<HashMap<EntityKind, JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl FluxClient {
    pub fn new(endpoints: ServiceEndpoints) -> ClientResult<Arc<Self>> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ClientError::network(format!("failed to build http client: {err}")))?;
        let (events, _) = broadcast::channel(64);

        Ok(Arc::new(Self {
            identity: IdentityClient::new(http.clone(), endpoints.identity_url, endpoints.api_key),
            store: DocumentStore::new(
                http.clone(),
                endpoints.documents_url,
                endpoints.project_id,
            ),
            media: MediaUploader::new(
                http.clone(),
                endpoints.media_url,
                endpoints.cloud_name,
                endpoints.upload_preset,
            ),
            http,
            session: RwLock::new(None),
            watches: Mutex::new(HashMap::new()),
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    async fn require_session(&self) -> ClientResult<AuthSession> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(ClientError::no_session)
    }

    // ---------- identity ----------

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        let session = self.identity.sign_in(email, password).await?;
        info!(user_id = %session.user_id, "signed in");
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> ClientResult<AuthSession> {
        let session = self.identity.sign_up(email, password, display_name).await?;
        info!(user_id = %session.user_id, "account created");

        // Seed the user document so the profile screen has something to
        // read on first visit. Best-effort; the profile screen falls back
        // to identity fields anyway.
        let profile = UserProfile {
            display_name: session.display_name.clone(),
            email: session.email.clone(),
            photo_url: None,
        };
        if let Err(err) = self
            .store
            .merge_document(
                &user_document_path(&session.user_id),
                profile_fields(&profile),
                &session.id_token,
            )
            .await
        {
            warn!("could not seed user document after sign-up: {err}");
        }

        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Clears the session and stops every collection subscription.
    pub async fn sign_out(&self) {
        *self.session.write().await = None;
        self.stop_watches().await;
        info!("signed out");
    }

    /// Re-verifies the current password, rotating the stored tokens.
    pub async fn reauthenticate(&self, current_password: &str) -> ClientResult<()> {
        let session = self.require_session().await?;
        let refreshed = self
            .identity
            .reauthenticate(&session.email, current_password)
            .await?;
        let mut guard = self.session.write().await;
        if let Some(active) = guard.as_mut() {
            active.id_token = refreshed.id_token;
            active.refresh_token = refreshed.refresh_token;
        }
        Ok(())
    }

    /// Changes the account password. The caller must have re-authenticated
    /// first; the provider rejects stale sessions with a re-auth error.
    pub async fn change_password(&self, new_password: &str) -> ClientResult<()> {
        let session = self.require_session().await?;
        let tokens = self
            .identity
            .change_password(&session.id_token, new_password)
            .await?;
        let mut guard = self.session.write().await;
        if let Some(active) = guard.as_mut() {
            active.id_token = tokens.id_token;
            active.refresh_token = tokens.refresh_token;
        }
        info!("password changed");
        Ok(())
    }

    // ---------- profile ----------

    pub async fn load_profile(&self) -> ClientResult<UserProfile> {
        let session = self.require_session().await?;
        let document = self
            .store
            .get_document(&user_document_path(&session.user_id), &session.id_token)
            .await?;

        Ok(match document {
            Some(document) => {
                let mut profile = profile_from_document(&document);
                if profile.display_name.is_empty() {
                    profile.display_name = session.display_name.clone();
                }
                if profile.email.is_empty() {
                    profile.email = session.email.clone();
                }
                if profile.photo_url.is_none() {
                    profile.photo_url = session.photo_url.clone();
                }
                profile
            }
            None => UserProfile {
                display_name: session.display_name,
                email: session.email,
                photo_url: session.photo_url,
            },
        })
    }

    pub async fn save_display_name(&self, display_name: &str) -> ClientResult<()> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ClientError::validation("display name cannot be empty"));
        }
        let session = self.require_session().await?;

        let mut fields = Fields::new();
        fields.insert(
            "displayName".to_string(),
            Value::string(display_name),
        );
        fields.insert("email".to_string(), Value::string(&session.email));
        self.store
            .merge_document(
                &user_document_path(&session.user_id),
                fields,
                &session.id_token,
            )
            .await?;
        self.identity
            .update_profile(&session.id_token, Some(display_name), None)
            .await?;

        let mut guard = self.session.write().await;
        if let Some(active) = guard.as_mut() {
            active.display_name = display_name.to_string();
        }
        Ok(())
    }

    /// Uploads avatar bytes to the media host, then records the returned
    /// URL in the user document and the identity profile. A failed upload
    /// leaves the previous photo reference unchanged everywhere.
    pub async fn upload_avatar(&self, bytes: Vec<u8>, filename: &str) -> ClientResult<String> {
        let session = self.require_session().await?;
        let secure_url = self.media.upload_image(bytes, filename).await?;

        let mut fields = Fields::new();
        fields.insert("photoURL".to_string(), Value::string(&secure_url));
        self.store
            .merge_document(
                &user_document_path(&session.user_id),
                fields,
                &session.id_token,
            )
            .await?;
        self.identity
            .update_profile(&session.id_token, None, Some(&secure_url))
            .await?;

        let mut guard = self.session.write().await;
        if let Some(active) = guard.as_mut() {
            active.photo_url = Some(secure_url.clone());
        }
        Ok(secure_url)
    }

    /// Uploads an image without touching the profile, returning the hosted
    /// URL. Used for entity photos.
    pub async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> ClientResult<String> {
        self.require_session().await?;
        self.media.upload_image(bytes, filename).await
    }

    // ---------- entities ----------

    pub async fn list_entities(&self, kind: EntityKind) -> ClientResult<Vec<EntityRecord>> {
        let session = self.require_session().await?;
        let documents = self
            .store
            .list_documents(kind.collection_name(), &session.id_token)
            .await?;
        documents.iter().map(entity_from_document).collect()
    }

    /// Starts (or restarts) the polling subscription for `kind`. Snapshots
    /// are broadcast through [`subscribe_events`]; the previous task for
    /// the same collection is aborted first.
    pub async fn watch_entities(self: &Arc<Self>, kind: EntityKind) {
        let mut watches = self.watches.lock().await;
        if let Some(previous) = watches.remove(&kind) {
            previous.abort();
        }

        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut last: Option<Vec<EntityRecord>> = None;
            loop {
                match client.list_entities(kind).await {
                    Ok(entities) => {
                        if last.as_ref() != Some(&entities) {
                            last = Some(entities.clone());
                            let _ = client.events.send(ClientEvent::EntitiesSnapshot {
                                kind,
                                entities,
                            });
                        }
                    }
                    Err(err) => {
                        let stop = err.requires_reauth();
                        let _ = client.events.send(ClientEvent::SubscriptionError {
                            kind,
                            message: err.to_string(),
                        });
                        if stop {
                            debug!(
                                collection = kind.collection_name(),
                                "subscription stopping after auth failure"
                            );
                            break;
                        }
                    }
                }
                tokio::time::sleep(SUBSCRIPTION_POLL_INTERVAL).await;
            }
        });
        watches.insert(kind, task);
    }

    pub async fn stop_watches(&self) {
        let mut watches = self.watches.lock().await;
        for (_, task) in watches.drain() {
            task.abort();
        }
    }

    /// Fetches raw image bytes from a hosted URL, for avatar and card
    /// rendering.
    pub async fn fetch_image(&self, url: &str) -> ClientResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| transport_error("image fetch", err))?;
        let response = firestore::check_status(response, "image fetch").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ClientError::network(format!("image fetch failed: {err}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl EntityWriter for FluxClient {
    async fn create(&self, kind: EntityKind, entity: NewEntity) -> ClientResult<EntityId> {
        let session = self.require_session().await?;
        let document = self
            .store
            .create_document(
                kind.collection_name(),
                entity_fields(&entity),
                &session.id_token,
            )
            .await?;
        let entity_id = document
            .document_id()
            .map(EntityId::from)
            .ok_or_else(|| ClientError::network("created document has no resource name"))?;
        info!(
            collection = kind.collection_name(),
            entity_id = %entity_id,
            "entity created"
        );
        Ok(entity_id)
    }
}

fn user_document_path(user_id: &UserId) -> String {
    format!("users/{}", user_id.0)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
