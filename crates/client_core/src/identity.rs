//! Identity-provider boundary: email/password accounts over an Identity
//! Toolkit-style REST API. Sessions are plain values handed back to the
//! caller; nothing here is global state.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{
    domain::UserId,
    error::{ClientError, ClientResult},
    protocol::AuthSession,
};
use tracing::debug;

use crate::transport_error;

/// Provider-enforced minimum; checked locally so short passwords are
/// rejected as validation errors before any request is made.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountUpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl AccountResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            user_id: UserId(self.local_id),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            email: self.email,
            display_name: self.display_name.unwrap_or_default(),
            photo_url: self.photo_url,
        }
    }
}

/// Fresh tokens returned when a credential-changing operation rotates the
/// session.
#[derive(Debug, Clone)]
pub struct TokenRefresh {
    pub id_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

pub struct IdentityClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl IdentityClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!(
            "{}/v1/accounts:{operation}?key={}",
            self.base_url, self.api_key
        )
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::validation(
                "email and password are both required",
            ));
        }
        debug!(email, "identity: sign-in request");
        let response = self
            .account_request(
                "signInWithPassword",
                &PasswordCredentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(response.into_session())
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> ClientResult<AuthSession> {
        if email.trim().is_empty() || password.is_empty() || display_name.trim().is_empty() {
            return Err(ClientError::validation("please fill in all fields"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ClientError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        debug!(email, "identity: sign-up request");
        let created = self
            .account_request(
                "signUp",
                &PasswordCredentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        // The display name is applied in a follow-up update, as the signUp
        // operation does not accept one.
        self.update_profile(&created.id_token, Some(display_name), None)
            .await?;

        let mut session = created.into_session();
        session.display_name = display_name.trim().to_string();
        Ok(session)
    }

    /// Re-verifies the account password. Used before sensitive operations
    /// such as a password change.
    pub async fn reauthenticate(&self, email: &str, password: &str) -> ClientResult<AuthSession> {
        self.sign_in(email, password).await.map_err(|err| {
            if err.requires_reauth() {
                ClientError::auth("current password is incorrect")
            } else {
                err
            }
        })
    }

    pub async fn change_password(
        &self,
        id_token: &str,
        new_password: &str,
    ) -> ClientResult<TokenRefresh> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(ClientError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let response = self
            .account_request(
                "update",
                &AccountUpdateRequest {
                    id_token,
                    display_name: None,
                    photo_url: None,
                    password: Some(new_password),
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(TokenRefresh {
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        })
    }

    pub async fn update_profile(
        &self,
        id_token: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> ClientResult<()> {
        self.account_request(
            "update",
            &AccountUpdateRequest {
                id_token,
                display_name,
                photo_url,
                password: None,
                return_secure_token: false,
            },
        )
        .await?;
        Ok(())
    }

    async fn account_request<B: Serialize>(
        &self,
        operation: &str,
        body: &B,
    ) -> ClientResult<AccountResponse> {
        let response = self
            .http
            .post(self.endpoint(operation))
            .json(body)
            .send()
            .await
            .map_err(|err| transport_error("identity request", err))?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|err| {
                ClientError::network(format!("invalid identity response: {err}"))
            });
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ProviderErrorBody>(&body) {
            Ok(parsed) => Err(classify_provider_error(&parsed.error.message)),
            Err(_) => Err(ClientError::network(format!(
                "identity request failed ({status}): {body}"
            ))),
        }
    }
}

/// Maps the provider's error codes onto the client taxonomy. Unknown codes
/// are treated as network failures so the raw text stays visible.
fn classify_provider_error(code: &str) -> ClientError {
    let upper = code.to_ascii_uppercase();
    if upper.starts_with("WEAK_PASSWORD") || upper.starts_with("INVALID_EMAIL") {
        return ClientError::validation(readable_provider_error(&upper));
    }
    if upper.starts_with("EMAIL_NOT_FOUND")
        || upper.starts_with("INVALID_PASSWORD")
        || upper.starts_with("INVALID_LOGIN_CREDENTIALS")
        || upper.starts_with("EMAIL_EXISTS")
        || upper.starts_with("USER_DISABLED")
        || upper.starts_with("INVALID_ID_TOKEN")
        || upper.starts_with("TOKEN_EXPIRED")
        || upper.starts_with("CREDENTIAL_TOO_OLD_LOGIN_AGAIN")
    {
        return ClientError::auth(readable_provider_error(&upper));
    }
    ClientError::network(format!("identity provider error: {code}"))
}

fn readable_provider_error(code: &str) -> String {
    let readable = match code {
        c if c.starts_with("EMAIL_NOT_FOUND") => "no account exists for this email",
        c if c.starts_with("INVALID_PASSWORD") => "wrong password",
        c if c.starts_with("INVALID_LOGIN_CREDENTIALS") => "wrong email or password",
        c if c.starts_with("EMAIL_EXISTS") => "an account already exists for this email",
        c if c.starts_with("USER_DISABLED") => "this account has been disabled",
        c if c.starts_with("WEAK_PASSWORD") => "password must be at least 6 characters",
        c if c.starts_with("INVALID_EMAIL") => "email address is malformed",
        c if c.starts_with("INVALID_ID_TOKEN") || c.starts_with("TOKEN_EXPIRED") => {
            "session expired; please sign in again"
        }
        c if c.starts_with("CREDENTIAL_TOO_OLD_LOGIN_AGAIN") => {
            "please re-enter your password to continue"
        }
        _ => return format!("identity provider error: {code}"),
    };
    readable.to_string()
}
