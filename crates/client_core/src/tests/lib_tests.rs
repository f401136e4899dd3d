use super::*;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use shared::{domain::EntityDraft, error::ErrorKind};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct BackendState {
    /// Raw bodies of every document POSTed to an entity collection.
    created: Arc<Mutex<Vec<JsonValue>>>,
    /// Raw bodies of every PATCH against a user document.
    profile_merges: Arc<Mutex<Vec<JsonValue>>>,
    /// Bodies of every accounts:update request.
    identity_updates: Arc<Mutex<Vec<JsonValue>>>,
    counter: Arc<Mutex<u32>>,
}

async fn handle_identity(
    State(state): State<BackendState>,
    Path(operation): Path<String>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    match operation.as_str() {
        "accounts:signInWithPassword" => {
            if body["password"] == "correct-horse" {
                (
                    StatusCode::OK,
                    Json(json!({
                        "localId": "uid-1",
                        "idToken": "token-1",
                        "refreshToken": "refresh-1",
                        "email": body["email"],
                        "displayName": "Ada",
                    })),
                )
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": {"message": "INVALID_PASSWORD"}})),
                )
            }
        }
        "accounts:signUp" => (
            StatusCode::OK,
            Json(json!({
                "localId": "uid-new",
                "idToken": "token-new",
                "refreshToken": "refresh-new",
                "email": body["email"],
            })),
        ),
        "accounts:update" => {
            state.identity_updates.lock().await.push(body);
            (
                StatusCode::OK,
                Json(json!({
                    "localId": "uid-1",
                    "idToken": "rotated-token",
                    "refreshToken": "rotated-refresh",
                })),
            )
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"message": "OPERATION_NOT_FOUND"}})),
        ),
    }
}

async fn handle_create_document(
    State(state): State<BackendState>,
    Path((_project, _db, collection)): Path<(String, String, String)>,
    Json(body): Json<JsonValue>,
) -> Json<JsonValue> {
    let mut counter = state.counter.lock().await;
    *counter += 1;
    let document = json!({
        "name": format!(
            "projects/test-project/databases/(default)/documents/{collection}/doc-{counter}"
        ),
        "fields": body["fields"],
        "createTime": format!("2026-08-23T10:00:{:02}Z", *counter),
        "updateTime": format!("2026-08-23T10:00:{:02}Z", *counter),
    });
    state.created.lock().await.push(document.clone());
    Json(document)
}

async fn handle_list_documents(
    State(state): State<BackendState>,
    Path((_project, _db, _collection)): Path<(String, String, String)>,
) -> Json<JsonValue> {
    let documents = state.created.lock().await.clone();
    Json(json!({ "documents": documents }))
}

async fn handle_get_user(
    Path((_project, _db, _uid)): Path<(String, String, String)>,
) -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn handle_merge_user(
    State(state): State<BackendState>,
    Path((_project, _db, uid)): Path<(String, String, String)>,
    Json(body): Json<JsonValue>,
) -> Json<JsonValue> {
    state.profile_merges.lock().await.push(body.clone());
    Json(json!({
        "name": format!(
            "projects/test-project/databases/(default)/documents/users/{uid}"
        ),
        "fields": body["fields"],
        "createTime": "2026-08-23T09:00:00Z",
        "updateTime": "2026-08-23T09:00:01Z",
    }))
}

async fn handle_upload(mut multipart: Multipart) -> Json<JsonValue> {
    let mut preset = String::new();
    let mut filename = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("upload_preset") => preset = field.text().await.unwrap_or_default(),
            Some("file") => filename = field.file_name().unwrap_or_default().to_string(),
            _ => {}
        }
    }
    if preset != "unsigned-flux" || filename == "reject.png" {
        return Json(json!({"error": {"message": "Upload preset not found"}}));
    }
    Json(json!({
        "secure_url": format!("https://media.example/{filename}")
    }))
}

async fn spawn_backend() -> (Arc<FluxClient>, BackendState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    let state = BackendState::default();

    let app = Router::new()
        .route("/v1/:operation", post(handle_identity))
        .route(
            "/v1/projects/:project/databases/:db/documents/:collection",
            post(handle_create_document).get(handle_list_documents),
        )
        .route(
            "/v1/projects/:project/databases/:db/documents/users/:uid",
            get(handle_get_user).patch(handle_merge_user),
        )
        .route("/v1_1/:cloud/image/upload", post(handle_upload))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let base = format!("http://{addr}");
    let endpoints = ServiceEndpoints {
        identity_url: base.clone(),
        documents_url: base.clone(),
        media_url: format!("{base}/v1_1"),
        api_key: "test-key".to_string(),
        project_id: "test-project".to_string(),
        cloud_name: "test-cloud".to_string(),
        upload_preset: "unsigned-flux".to_string(),
    };
    let client = FluxClient::new(endpoints).expect("build client");
    (client, state)
}

fn sample_entity(owner: &str) -> NewEntity {
    let draft = EntityDraft {
        name: "Harbor".to_string(),
        location: "Pier 4".to_string(),
        local_image: None,
    };
    NewEntity::from_draft(&draft, UserId::from(owner), None)
}

#[tokio::test]
async fn sign_in_stores_the_session() {
    let (client, _state) = spawn_backend().await;

    let session = client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");
    assert_eq!(session.user_id.as_str(), "uid-1");
    assert_eq!(session.display_name, "Ada");
    assert!(client.session().await.is_some());
}

#[tokio::test]
async fn sign_in_with_a_wrong_password_is_an_auth_error() {
    let (client, _state) = spawn_backend().await;

    let err = client
        .sign_in("ada@example.com", "nope")
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(err.requires_reauth());
    assert!(client.session().await.is_none());
}

#[tokio::test]
async fn sign_in_rejects_blank_credentials_without_a_request() {
    // Production endpoints are never reached; validation fires first.
    let client = FluxClient::new(ServiceEndpoints::production("k", "p", "c", "preset"))
        .expect("build client");

    let err = client.sign_in("", "").await.expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn sign_up_rejects_short_passwords_before_any_request() {
    let client = FluxClient::new(ServiceEndpoints::production("k", "p", "c", "preset"))
        .expect("build client");

    let err = client
        .sign_up("grace@example.com", "abc", "Grace")
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn sign_up_applies_the_display_name_and_seeds_the_user_document() {
    let (client, state) = spawn_backend().await;

    let session = client
        .sign_up("grace@example.com", "hopper6", "Grace")
        .await
        .expect("sign up");
    assert_eq!(session.display_name, "Grace");

    let updates = state.identity_updates.lock().await;
    assert!(updates
        .iter()
        .any(|body| body["displayName"] == "Grace"));
    let merges = state.profile_merges.lock().await;
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0]["fields"]["displayName"]["stringValue"], "Grace");
}

#[tokio::test]
async fn create_appends_distinct_records_with_the_owner_stamped() {
    let (client, state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let first = client
        .create(EntityKind::Site, sample_entity("uid-1"))
        .await
        .expect("first create");
    let second = client
        .create(EntityKind::Site, sample_entity("uid-1"))
        .await
        .expect("second create");
    assert_ne!(first, second);

    let created = state.created.lock().await;
    assert_eq!(created.len(), 2);
    let fields = &created[0]["fields"];
    assert_eq!(fields["name"]["stringValue"], "Harbor");
    assert_eq!(fields["location"]["stringValue"], "Pier 4");
    assert_eq!(fields["adminId"]["stringValue"], "uid-1");
    assert_eq!(
        fields["members"]["arrayValue"]["values"][0]["stringValue"],
        "uid-1"
    );
    // No image was attached, so the field is written as an explicit null.
    assert!(fields["imageUrl"].get("nullValue").is_some());
}

#[tokio::test]
async fn create_without_a_session_is_rejected() {
    let (client, state) = spawn_backend().await;

    let err = client
        .create(EntityKind::Store, sample_entity("uid-1"))
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::NoSession);
    assert!(state.created.lock().await.is_empty());
}

#[tokio::test]
async fn missing_writer_always_reports_no_session() {
    let writer = MissingEntityWriter;
    let err = writer
        .create(EntityKind::Site, sample_entity("uid-1"))
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::NoSession);
}

#[tokio::test]
async fn list_returns_entities_newest_first() {
    let (client, _state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let draft = EntityDraft {
        name: "Older".to_string(),
        location: "A".to_string(),
        local_image: None,
    };
    client
        .create(
            EntityKind::Site,
            NewEntity::from_draft(&draft, UserId::from("uid-1"), None),
        )
        .await
        .expect("older create");
    let draft = EntityDraft {
        name: "Newer".to_string(),
        location: "B".to_string(),
        local_image: None,
    };
    client
        .create(
            EntityKind::Site,
            NewEntity::from_draft(&draft, UserId::from("uid-1"), None),
        )
        .await
        .expect("newer create");

    let entities = client.list_entities(EntityKind::Site).await.expect("list");
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].name, "Newer");
    assert_eq!(entities[1].name, "Older");
    assert!(entities[0].created_at > entities[1].created_at);
}

#[tokio::test]
async fn watch_broadcasts_a_snapshot_of_existing_entities() {
    let (client, _state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");
    client
        .create(EntityKind::Store, sample_entity("uid-1"))
        .await
        .expect("create");

    let mut events = client.subscribe_events();
    client.watch_entities(EntityKind::Store).await;

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("snapshot in time")
        .expect("channel open");
    match event {
        ClientEvent::EntitiesSnapshot { kind, entities } => {
            assert_eq!(kind, EntityKind::Store);
            assert_eq!(entities.len(), 1);
            assert_eq!(entities[0].name, "Harbor");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    client.sign_out().await;
    assert!(client.watches.lock().await.is_empty());
}

#[tokio::test]
async fn avatar_upload_records_the_hosted_url_everywhere() {
    let (client, state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let url = client
        .upload_avatar(vec![0u8; 16], "avatar.png")
        .await
        .expect("upload");
    assert_eq!(url, "https://media.example/avatar.png");

    let merges = state.profile_merges.lock().await;
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0]["fields"]["photoURL"]["stringValue"], url);
    let updates = state.identity_updates.lock().await;
    assert!(updates.iter().any(|body| body["photoUrl"] == url));
    let session = client.session().await.expect("session");
    assert_eq!(session.photo_url.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn upload_failure_surfaces_the_provider_message() {
    let (client, state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let err = client
        .upload_image(vec![0u8; 16], "reject.png")
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.message.contains("Upload preset not found"));
    assert!(state.profile_merges.lock().await.is_empty());
}

#[tokio::test]
async fn password_change_rotates_the_session_tokens() {
    let (client, _state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    client
        .reauthenticate("correct-horse")
        .await
        .expect("reauthenticate");
    client
        .change_password("brand-new-password")
        .await
        .expect("change password");

    let session = client.session().await.expect("session");
    assert_eq!(session.id_token, "rotated-token");
}

#[tokio::test]
async fn short_new_passwords_are_rejected_locally() {
    let (client, state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let err = client
        .change_password("abc")
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(state.identity_updates.lock().await.is_empty());
}

#[tokio::test]
async fn reauthentication_failure_reads_as_a_password_problem() {
    let (client, _state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let err = client
        .reauthenticate("wrong-password")
        .await
        .expect_err("must fail");
    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(err.message.contains("current password"));
}

#[tokio::test]
async fn profile_falls_back_to_session_fields_when_no_document_exists() {
    let (client, _state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    let profile = client.load_profile().await.expect("profile");
    assert_eq!(profile.display_name, "Ada");
    assert_eq!(profile.email, "ada@example.com");
}

#[tokio::test]
async fn saving_a_display_name_touches_document_identity_and_session() {
    let (client, state) = spawn_backend().await;
    client
        .sign_in("ada@example.com", "correct-horse")
        .await
        .expect("sign in");

    client
        .save_display_name("  Grace  ")
        .await
        .expect("save display name");

    let merges = state.profile_merges.lock().await;
    assert_eq!(merges[0]["fields"]["displayName"]["stringValue"], "Grace");
    let updates = state.identity_updates.lock().await;
    assert!(updates.iter().any(|body| body["displayName"] == "Grace"));
    let session = client.session().await.expect("session");
    assert_eq!(session.display_name, "Grace");

    let err = client
        .save_display_name("   ")
        .await
        .expect_err("blank name must fail");
    assert_eq!(err.kind, ErrorKind::Validation);
}
