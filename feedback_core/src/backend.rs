//! The seam between the application flows and the hosted backend. The flows
//! only ever talk to a `FeedbackStore` and an `AuthService`, so a backend can
//! be swapped for the in-process `MemoryBackend` in tests.

pub mod firebase;
pub mod firestore;
pub mod memory;

use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

pub use firebase::FirebaseBackend;
pub use memory::MemoryBackend;

/// The collection that feedback documents live in.
pub const FEEDBACK_COLLECTION: &str = "feedback";
/// The document field that submissions are ordered by.
pub const SUBMITTED_AT_FIELD: &str = "submittedAt";

/// A signed-in account, as reported by the auth service.
#[derive(PartialEq, Eq, Clone)]
pub struct User {
    pub uid: String,
    pub email: String,
    /// Bearer token proving the sign-in to the store.
    pub id_token: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .finish()
    }
}

/// Who the current caller is. Passed explicitly to every store call that
/// needs authorization.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn signed_out() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn id_token(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id_token.as_str())
    }
}

/// A document as stored in a collection, before any shape checking.
#[derive(Debug, PartialEq, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Defines the document operations that the flows need from the store.
pub trait FeedbackStore {
    /// Creates a new document in the collection, returning the id that the
    /// store assigned to it. The write is a single atomic creation.
    async fn create_document(&self, collection: &str, data: Value) -> Result<String, BackendError>;

    /// Reads every document in the collection, ordered by the given field.
    /// Documents that compare equal keep the order they were created in.
    async fn query_ordered(
        &self,
        session: &Session,
        collection: &str,
        order_by: &str,
        direction: Direction,
    ) -> Result<Vec<StoredDocument>, BackendError>;
}

/// Defines the account operations that the flows need from the auth service.
pub trait AuthService {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Subscribes to changes of the signed-in user. The returned handle
    /// reports the current user immediately and every change after that.
    fn subscribe(&self) -> AuthSubscription;
}

/// A live subscription to auth state changes. Dropping the handle or calling
/// `unsubscribe` ends the subscription.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: Option<watch::Receiver<Option<User>>>,
}

impl AuthSubscription {
    pub fn new(receiver: watch::Receiver<Option<User>>) -> Self {
        Self { receiver: Some(receiver) }
    }

    /// The most recently pushed user, marking it as seen.
    pub fn current(&mut self) -> Option<User> {
        self.receiver.as_mut().and_then(|receiver| receiver.borrow_and_update().clone())
    }

    /// Whether a change was pushed that has not been seen through `current`
    /// or `changed` yet.
    pub fn has_pending(&self) -> bool {
        self.receiver.as_ref().is_some_and(|receiver| receiver.has_changed().unwrap_or(false))
    }

    /// Waits for the next pushed change and returns the new user. Returns
    /// `None` once the subscription has ended, either because it was
    /// unsubscribed or because the auth service went away.
    pub async fn changed(&mut self) -> Option<Option<User>> {
        let receiver = self.receiver.as_mut()?;
        match receiver.changed().await {
            Ok(()) => Some(receiver.borrow_and_update().clone()),
            Err(_) => {
                self.receiver = None;
                None
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}

/// Error codes that the auth service can reject a sign-in with.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AuthErrorCode {
    InvalidCredential,
    TooManyRequests,
    UserDisabled,
    Other(String),
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorCode::InvalidCredential => f.write_str("auth/invalid-credential"),
            AuthErrorCode::TooManyRequests => f.write_str("auth/too-many-requests"),
            AuthErrorCode::UserDisabled => f.write_str("auth/user-disabled"),
            AuthErrorCode::Other(code) => write!(f, "auth/{code}"),
        }
    }
}

/// Error type for every call to the backend. These are for operators; the
/// flows translate them into messages fit for end users.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum BackendError {
    #[error("Authentication rejected: {0}")]
    Auth(AuthErrorCode),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Unable to reach the backend: {0}")]
    Network(String),
    #[error("Backend responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected backend response: {0}")]
    Malformed(String),
}
