use std::cell::RefCell;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{
    firestore::{decode_document, encode_document},
    AuthErrorCode, AuthService, AuthSubscription, BackendError, Direction, FeedbackStore, Session,
    StoredDocument, User,
};
use crate::config::FirebaseConfig;

/// Id tokens are refreshed once less than this many seconds are left.
const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Talks to a Firebase project over its REST APIs: Identity Toolkit for
/// email/password accounts, Secure Token for refreshing id tokens, and
/// Firestore for documents.
pub struct FirebaseBackend {
    client: Client,
    config: FirebaseConfig,
    auth_state: watch::Sender<Option<User>>,
    /// The signed-in user's tokens, if the sign-in went through this backend.
    credentials: RefCell<Option<Credentials>>,
}

#[derive(Clone)]
struct Credentials {
    user: User,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) <= now
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

// the Secure Token API answers in snake_case
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CreatedDocument {
    name: String,
}

impl FirebaseBackend {
    pub fn new(config: FirebaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: FirebaseConfig) -> Self {
        let (auth_state, _) = watch::channel(None);
        Self { client, config, auth_state, credentials: RefCell::new(None) }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            self.config.firestore_base_url.trim_end_matches('/'),
            self.config.project_id
        )
    }

    fn sign_in_url(&self) -> String {
        format!(
            "{}/v1/accounts:signInWithPassword",
            self.config.auth_base_url.trim_end_matches('/')
        )
    }

    fn token_url(&self) -> String {
        format!("{}/v1/token", self.config.secure_token_base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// The tokens this backend holds for the session's user, if any.
    fn credentials_for(&self, session: &Session) -> Option<Credentials> {
        let uid = &session.user()?.uid;
        self.credentials.borrow().as_ref().filter(|held| &held.user.uid == uid).cloned()
    }

    /// Trades the refresh token for a new id token and pushes the updated
    /// user. If the token service rejects the refresh, the session is over:
    /// the tokens are dropped and a signed-out event is pushed.
    async fn refresh(&self, credentials: Credentials) -> Result<User, BackendError> {
        debug!(uid = %credentials.user.uid, "Refreshing id token");
        let request = self.client.post(self.token_url()).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
        ]);
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(e @ BackendError::Network(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Token refresh rejected, ending session");
                self.end_session();
                return Err(BackendError::PermissionDenied(format!("session ended: {e}")));
            }
        };
        let body: RefreshResponse =
            response.json().await.map_err(|e| BackendError::Malformed(e.to_string()))?;

        let user = User { id_token: body.id_token, ..credentials.user };
        let expires_at = expiry(&body.expires_in)?;
        *self.credentials.borrow_mut() =
            Some(Credentials { user: user.clone(), refresh_token: body.refresh_token, expires_at });
        self.auth_state.send_replace(Some(user.clone()));
        Ok(user)
    }

    fn end_session(&self) {
        self.credentials.borrow_mut().take();
        self.auth_state.send_replace(None);
    }

    async fn run_query(
        &self,
        token: &str,
        collection: &str,
        order_by: &str,
        direction: Direction,
    ) -> Result<Vec<StoredDocument>, BackendError> {
        let direction = match direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "orderBy": [{ "field": { "fieldPath": order_by }, "direction": direction }],
            }
        });
        let url = format!("{}:runQuery", self.documents_url());
        let request = self.client.post(url).bearer_auth(token).json(&body);
        let results: Vec<Value> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        // an empty result set still yields one element, without a document
        let documents = results
            .iter()
            .filter_map(|result| result.get("document"))
            .map(decode_document)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(collection, count = documents.len(), "Queried documents");
        Ok(documents)
    }
}

impl AuthService for FirebaseBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        debug!(email, "Signing in with password");
        let request = self.client.post(self.sign_in_url()).json(&json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        }));
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(BackendError::Status { message, .. }) => {
                return Err(BackendError::Auth(auth_error_code(&message)));
            }
            Err(e) => return Err(e),
        };
        let body: SignInResponse =
            response.json().await.map_err(|e| BackendError::Malformed(e.to_string()))?;
        let email = if body.email.is_empty() { email.to_string() } else { body.email };
        let user = User { uid: body.local_id, email, id_token: body.id_token };
        let expires_at = expiry(&body.expires_in)?;

        *self.credentials.borrow_mut() =
            Some(Credentials { user: user.clone(), refresh_token: body.refresh_token, expires_at });
        self.auth_state.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        // id tokens are bearer tokens with no server-side session to end, so
        // signing out only forgets the tokens
        self.end_session();
        Ok(())
    }

    fn subscribe(&self) -> AuthSubscription {
        AuthSubscription::new(self.auth_state.subscribe())
    }
}

impl FeedbackStore for FirebaseBackend {
    async fn create_document(&self, collection: &str, data: Value) -> Result<String, BackendError> {
        let body = encode_document(&data)?;
        let url = format!("{}/{}", self.documents_url(), collection);
        let request = self.client.post(url).json(&body);
        let created: CreatedDocument = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let id = created.name.rsplit('/').next().unwrap_or_default().to_string();
        if id.is_empty() {
            let reason = format!("created document `{}` has no id", created.name);
            return Err(BackendError::Malformed(reason));
        }
        debug!(collection, id = %id, "Created document");
        Ok(id)
    }

    /// Runs the query with the session's id token. When this backend holds
    /// the session's refresh token, a token about to expire is refreshed
    /// first, and a query rejected for its credentials is retried once with
    /// a fresh token.
    async fn query_ordered(
        &self,
        session: &Session,
        collection: &str,
        order_by: &str,
        direction: Direction,
    ) -> Result<Vec<StoredDocument>, BackendError> {
        let Some(user) = session.user() else {
            return Err(BackendError::PermissionDenied(format!(
                "reading `{collection}` requires a signed-in user"
            )));
        };
        let token = match self.credentials_for(session) {
            Some(held) if held.expires_soon(Utc::now()) => self.refresh(held).await?.id_token,
            Some(held) => held.user.id_token,
            None => user.id_token.clone(),
        };

        match self.run_query(&token, collection, order_by, direction).await {
            Err(BackendError::PermissionDenied(message)) => {
                let Some(held) = self.credentials_for(session) else {
                    return Err(BackendError::PermissionDenied(message));
                };
                debug!(%message, "Query rejected, refreshing id token");
                let fresh = self.refresh(held).await?;
                self.run_query(&fresh.id_token, collection, order_by, direction).await
            }
            result => result,
        }
    }
}

/// When a token that is valid for `expires_in` seconds from now runs out.
fn expiry(expires_in: &str) -> Result<DateTime<Utc>, BackendError> {
    let seconds: i64 = expires_in
        .parse()
        .map_err(|_| BackendError::Malformed(format!("bad token lifetime `{expires_in}`")))?;
    Ok(Utc::now() + Duration::seconds(seconds))
}

async fn error_from_response(response: Response) -> BackendError {
    let status = response.status();
    let message = match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => envelope.error.message,
        Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::PermissionDenied(message),
        _ => BackendError::Status { status: status.as_u16(), message },
    }
}

/// Maps an Identity Toolkit error message such as
/// `TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account has been disabled`
/// to an auth error code.
fn auth_error_code(message: &str) -> AuthErrorCode {
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "INVALID_LOGIN_CREDENTIALS" | "INVALID_PASSWORD" | "EMAIL_NOT_FOUND" => {
            AuthErrorCode::InvalidCredential
        }
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthErrorCode::TooManyRequests,
        "USER_DISABLED" => AuthErrorCode::UserDisabled,
        other => AuthErrorCode::Other(other.to_lowercase().replace('_', "-")),
    }
}
