use thiserror::Error;
use tracing::{error, info};

use crate::backend::{AuthErrorCode, AuthService, BackendError, Session, User};

/// Error type for signing in and out. The message is shown to the user as-is.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredential,
    #[error("Too many failed attempts. Please try again later.")]
    TooManyRequests,
    #[error("This account has been disabled.")]
    UserDisabled,
    #[error("An error occurred during sign in.")]
    SignIn,
    #[error("An error occurred while signing out.")]
    SignOut,
}

impl AuthError {
    fn from_sign_in(error: &BackendError) -> Self {
        match error {
            BackendError::Auth(code) => {
                info!(%code, "Sign-in rejected");
                match code {
                    AuthErrorCode::InvalidCredential => AuthError::InvalidCredential,
                    AuthErrorCode::TooManyRequests => AuthError::TooManyRequests,
                    AuthErrorCode::UserDisabled => AuthError::UserDisabled,
                    AuthErrorCode::Other(_) => AuthError::SignIn,
                }
            }
            cause => {
                error!(%cause, "Sign-in failed");
                AuthError::SignIn
            }
        }
    }
}

/// A flip of the signed-in status.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AuthTransition {
    SignedIn(User),
    SignedOut,
}

/// Tracks who is signed in and turns raw auth events into transitions.
#[derive(Debug, Default)]
pub struct AuthGate {
    session: Session,
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_signed_in()
    }

    /// Records the user reported by the auth service. Returns a transition
    /// only if the signed-in status flipped; a repeated event for the same
    /// status just refreshes the stored user.
    pub fn apply(&mut self, user: Option<User>) -> Option<AuthTransition> {
        let was_signed_in = self.session.is_signed_in();
        self.session = match user.clone() {
            Some(user) => Session::signed_in(user),
            None => Session::signed_out(),
        };
        match (was_signed_in, user) {
            (false, Some(user)) => Some(AuthTransition::SignedIn(user)),
            (true, None) => Some(AuthTransition::SignedOut),
            _ => None,
        }
    }

    /// Signs in with email and password. On success the session is updated
    /// and the resulting transition, if any, is returned.
    pub async fn sign_in<A: AuthService>(
        &mut self,
        auth: &A,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthTransition>, AuthError> {
        let user = auth.sign_in(email, password).await.map_err(|e| AuthError::from_sign_in(&e))?;
        info!(uid = %user.uid, "Signed in");
        Ok(self.apply(Some(user)))
    }

    /// Signs out. The local session is cleared even if the auth service
    /// reports a failure.
    pub async fn sign_out<A: AuthService>(&mut self, auth: &A) -> Result<(), AuthError> {
        let result = auth.sign_out().await;
        self.apply(None);
        result.map_err(|cause| {
            error!(%cause, "Sign-out failed");
            AuthError::SignOut
        })
    }
}

#[cfg(test)]
mod test {
    use crate::backend::MemoryBackend;

    use super::*;

    fn user(token: &str) -> User {
        User { uid: "u1".to_string(), email: "admin@example.com".to_string(), id_token: token.to_string() }
    }

    #[test]
    fn transitions_only_on_flips() {
        let mut gate = AuthGate::new();
        assert_eq!(gate.apply(None), None);
        assert_eq!(gate.apply(Some(user("a"))), Some(AuthTransition::SignedIn(user("a"))));
        assert_eq!(gate.apply(Some(user("b"))), None);
        assert_eq!(gate.session().id_token(), Some("b"));
        assert_eq!(gate.apply(None), Some(AuthTransition::SignedOut));
        assert_eq!(gate.apply(None), None);
        assert!(!gate.is_signed_in());
    }

    #[tokio::test]
    async fn sign_in_errors_become_messages() {
        let backend = MemoryBackend::new();
        backend.add_account("admin@example.com", "hunter2");
        backend.add_account("gone@example.com", "pw");
        backend.disable_account("gone@example.com");
        let mut gate = AuthGate::new();

        let wrong = gate.sign_in(&backend, "admin@example.com", "nope").await.unwrap_err();
        assert_eq!(wrong.to_string(), "Invalid email or password.");
        let unknown = gate.sign_in(&backend, "who@example.com", "x").await.unwrap_err();
        assert_eq!(unknown, AuthError::InvalidCredential);
        let disabled = gate.sign_in(&backend, "gone@example.com", "pw").await.unwrap_err();
        assert_eq!(disabled.to_string(), "This account has been disabled.");

        backend.fail_next_sign_in(BackendError::Network("offline".to_string()));
        let offline = gate.sign_in(&backend, "admin@example.com", "hunter2").await.unwrap_err();
        assert_eq!(offline.to_string(), "An error occurred during sign in.");

        backend.fail_next_sign_in(BackendError::Auth(AuthErrorCode::Other("auth/weird".to_string())));
        let other = gate.sign_in(&backend, "admin@example.com", "hunter2").await.unwrap_err();
        assert_eq!(other, AuthError::SignIn);
        assert!(!gate.is_signed_in());
    }

    #[tokio::test]
    async fn locks_out_after_repeated_failures() {
        let backend = MemoryBackend::new();
        backend.add_account("admin@example.com", "hunter2");
        let mut gate = AuthGate::new();
        for _ in 0..crate::backend::memory::MAX_FAILED_SIGN_INS {
            let _ = gate.sign_in(&backend, "admin@example.com", "nope").await;
        }
        let locked = gate.sign_in(&backend, "admin@example.com", "hunter2").await.unwrap_err();
        assert_eq!(locked.to_string(), "Too many failed attempts. Please try again later.");
    }

    #[tokio::test]
    async fn sign_in_and_out() {
        let backend = MemoryBackend::new();
        let uid = backend.add_account("admin@example.com", "hunter2");
        let mut gate = AuthGate::new();

        let transition = gate.sign_in(&backend, "admin@example.com", "hunter2").await.unwrap();
        assert!(matches!(transition, Some(AuthTransition::SignedIn(ref user)) if user.uid == uid));
        assert_eq!(gate.session().user().map(|user| user.email.as_str()), Some("admin@example.com"));

        gate.sign_out(&backend).await.unwrap();
        assert!(!gate.is_signed_in());
    }

    #[tokio::test]
    async fn failed_sign_out_still_clears_session() {
        let backend = MemoryBackend::new();
        backend.add_account("admin@example.com", "hunter2");
        let mut gate = AuthGate::new();
        gate.sign_in(&backend, "admin@example.com", "hunter2").await.unwrap();

        backend.fail_next_sign_out(BackendError::Network("offline".to_string()));
        let error = gate.sign_out(&backend).await.unwrap_err();
        assert_eq!(error.to_string(), "An error occurred while signing out.");
        assert!(!gate.is_signed_in());
    }
}
