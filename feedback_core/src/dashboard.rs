use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::auth::{AuthError, AuthGate, AuthTransition};
use crate::backend::{AuthService, AuthSubscription, FeedbackStore, Session};
use crate::data::CategoryList;
use crate::retrieval::{fetch_feedback, FeedbackDetail, FeedbackListing, FeedbackRow, FetchError};

/// The admin side of the app: a sign-in gate in front of the submissions list.
///
/// The dashboard subscribes to auth state once when mounted. Signing in
/// through the dashboard, or the backend reporting a sign-in on its own,
/// loads the submissions; a sign-out from either side clears them.
/// Operations in flight are cancelled by dropping their futures, which leaves
/// the dashboard as it was before the call.
pub struct Dashboard<B> {
    backend: B,
    categories: CategoryList,
    tz: Tz,
    gate: AuthGate,
    subscription: AuthSubscription,
    listing: FeedbackListing,
    /// The message of the last failed operation, cleared by the next success.
    error: Option<String>,
}

impl<B: AuthService + FeedbackStore> Dashboard<B> {
    /// Subscribes to auth state and, if someone is already signed in, loads
    /// the submissions.
    pub async fn mount(backend: B, categories: CategoryList, tz: Tz) -> Self {
        let mut subscription = backend.subscribe();
        let user = subscription.current();
        let mut dashboard = Self {
            backend,
            categories,
            tz,
            gate: AuthGate::new(),
            subscription,
            listing: FeedbackListing::new(),
            error: None,
        };
        if let Some(transition) = dashboard.gate.apply(user) {
            dashboard.apply(transition).await;
        }
        dashboard
    }

    pub fn session(&self) -> &Session {
        self.gate.session()
    }

    pub fn is_signed_in(&self) -> bool {
        self.gate.is_signed_in()
    }

    pub fn listing(&self) -> &FeedbackListing {
        &self.listing
    }

    pub fn categories(&self) -> &CategoryList {
        &self.categories
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Signed in, but the submissions have not arrived yet and nothing has
    /// failed.
    pub fn is_loading(&self) -> bool {
        self.gate.is_signed_in() && !self.listing.is_loaded() && self.error.is_none()
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_active()
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        match self.gate.sign_in(&self.backend, email, password).await {
            Ok(transition) => {
                self.error = None;
                if let Some(transition) = transition {
                    self.apply(transition).await;
                }
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Signs out and clears the submissions, even if the backend reports a
    /// failure.
    pub async fn sign_out(&mut self) -> Result<(), AuthError> {
        let result = self.gate.sign_out(&self.backend).await;
        self.listing.clear();
        self.error = result.err().map(|e| e.to_string());
        result
    }

    /// Waits for the next auth event from the backend and applies it. Returns
    /// false once the subscription has ended.
    pub async fn handle_auth_change(&mut self) -> bool {
        let Some(user) = self.subscription.changed().await else {
            return false;
        };
        if let Some(transition) = self.gate.apply(user) {
            self.apply(transition).await;
        }
        true
    }

    /// Reloads the submissions. Does nothing while signed out.
    pub async fn refresh(&mut self) -> Result<(), FetchError> {
        if !self.gate.is_signed_in() {
            return Ok(());
        }
        match fetch_feedback(&self.backend, self.gate.session()).await {
            Ok(records) => {
                self.listing.replace(records);
                self.error = None;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn select(&mut self, id: &str) -> bool {
        self.listing.select(id)
    }

    pub fn close_detail(&mut self) {
        self.listing.close_detail();
    }

    pub fn rows(&self) -> Vec<FeedbackRow> {
        self.listing.rows(&self.tz)
    }

    pub fn detail(&self, now: DateTime<Utc>) -> Option<FeedbackDetail> {
        self.listing.detail(&self.categories, &self.tz, now)
    }

    /// Ends the auth subscription. Events pushed after this are not seen.
    pub fn unmount(&mut self) {
        self.subscription.unsubscribe();
    }

    async fn apply(&mut self, transition: AuthTransition) {
        match transition {
            AuthTransition::SignedIn(user) => {
                debug!(uid = %user.uid, "Loading feedback for signed-in user");
                // a failure is kept in `self.error` for display
                let _ = self.refresh().await;
            }
            AuthTransition::SignedOut => {
                debug!("Signed out, clearing feedback");
                self.listing.clear();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::backend::{BackendError, MemoryBackend, FEEDBACK_COLLECTION};

    use super::*;

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.add_account("admin@example.com", "hunter2");
        backend.insert_document(
            FEEDBACK_COLLECTION,
            json!({
                "submitter": { "name": "Alex", "designation": "QA" },
                "feedback": [{ "areaId": "requirementsAnalysis", "rating": 4, "comment": "" }],
                "submittedAt": "2024-01-05T15:07:09.000Z",
            }),
        );
        backend
    }

    async fn mounted(backend: &MemoryBackend) -> Dashboard<MemoryBackend> {
        Dashboard::mount(backend.clone(), CategoryList::builtin(), Tz::UTC).await
    }

    #[tokio::test]
    async fn wrong_credentials_do_not_fetch() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;

        let error = dashboard.sign_in("admin@example.com", "wrong").await.unwrap_err();
        assert_eq!(error, AuthError::InvalidCredential);
        assert_eq!(dashboard.error(), Some("Invalid email or password."));
        assert!(!dashboard.is_signed_in());
        assert_eq!(backend.counters().queries, 0);
    }

    #[tokio::test]
    async fn sign_in_fetches_once() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;

        dashboard.sign_in("admin@example.com", "hunter2").await.unwrap();
        assert_eq!(backend.counters().queries, 1);
        assert_eq!(dashboard.listing().len(), 1);
        assert_eq!(dashboard.error(), None);

        // the pushed event for the same sign-in changes nothing
        assert!(dashboard.handle_auth_change().await);
        assert_eq!(backend.counters().queries, 1);

        let rows = dashboard.rows();
        assert_eq!(rows[0].name, "Alex");
        assert!(dashboard.select(&rows[0].id));
        let detail = dashboard.detail(Utc::now()).unwrap();
        assert_eq!(detail.areas[0].title, "Requirements Elicitation & Analysis");
        dashboard.close_detail();
        assert_eq!(dashboard.detail(Utc::now()), None);
    }

    #[tokio::test]
    async fn mounting_while_signed_in_fetches() {
        let backend = backend();
        backend.sign_in("admin@example.com", "hunter2").await.unwrap();

        let dashboard = mounted(&backend).await;
        assert!(dashboard.is_signed_in());
        assert_eq!(dashboard.listing().len(), 1);
        assert_eq!(backend.counters().queries, 1);
    }

    #[tokio::test]
    async fn backend_sign_out_clears_listing() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;
        dashboard.sign_in("admin@example.com", "hunter2").await.unwrap();
        assert!(!dashboard.listing().is_empty());

        backend.expire_sessions();
        assert!(dashboard.handle_auth_change().await);
        assert!(!dashboard.is_signed_in());
        assert!(dashboard.listing().is_empty());

        // nothing to load while signed out
        dashboard.refresh().await.unwrap();
        assert_eq!(backend.counters().queries, 1);
    }

    #[tokio::test]
    async fn sign_out_clears_listing() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;
        dashboard.sign_in("admin@example.com", "hunter2").await.unwrap();

        backend.fail_next_sign_out(BackendError::Network("offline".to_string()));
        assert_eq!(dashboard.sign_out().await, Err(AuthError::SignOut));
        assert_eq!(dashboard.error(), Some("An error occurred while signing out."));
        assert!(!dashboard.is_signed_in());
        assert!(dashboard.listing().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_list() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;
        dashboard.sign_in("admin@example.com", "hunter2").await.unwrap();

        backend.fail_next_query(BackendError::Network("offline".to_string()));
        assert!(dashboard.refresh().await.is_err());
        assert_eq!(dashboard.error(), Some("Could not load feedback."));
        assert_eq!(dashboard.listing().len(), 1);

        dashboard.refresh().await.unwrap();
        assert_eq!(dashboard.error(), None);
    }

    #[tokio::test]
    async fn dropped_refresh_changes_nothing() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;
        dashboard.sign_in("admin@example.com", "hunter2").await.unwrap();
        backend.hold_queries();

        tokio::select! {
            biased;
            _ = dashboard.refresh() => panic!("query should be held"),
            _ = std::future::ready(()) => {}
        }
        backend.insert_document(
            FEEDBACK_COLLECTION,
            json!({
                "submitter": { "name": "Sam", "designation": "Dev" },
                "feedback": [],
                "submittedAt": "2024-02-01T00:00:00.000Z",
            }),
        );
        backend.release_queries();

        assert_eq!(backend.counters().queries, 2);
        assert_eq!(dashboard.listing().len(), 1);
        assert_eq!(dashboard.listing().records()[0].submitter.name, "Alex");
    }

    #[tokio::test]
    async fn unmount_stops_listening() {
        let backend = backend();
        let mut dashboard = mounted(&backend).await;
        dashboard.sign_in("admin@example.com", "hunter2").await.unwrap();

        dashboard.unmount();
        assert!(!dashboard.is_mounted());
        backend.expire_sessions();
        assert!(!dashboard.handle_auth_change().await);
        // the expiry was never seen
        assert!(dashboard.is_signed_in());
        assert_eq!(dashboard.listing().len(), 1);
    }

    #[tokio::test]
    async fn loading_until_first_fetch_lands() {
        let backend = MemoryBackend::new();
        backend.add_account("admin@example.com", "hunter2");
        let mut dashboard = mounted(&backend).await;
        assert!(!dashboard.is_loading());

        // signed in, but the first fetch is still out when the call is dropped
        backend.hold_queries();
        tokio::select! {
            biased;
            _ = dashboard.sign_in("admin@example.com", "hunter2") => panic!("query should be held"),
            _ = std::future::ready(()) => {}
        }
        backend.release_queries();
        assert!(dashboard.is_signed_in());
        assert!(dashboard.is_loading());
        assert_eq!(dashboard.listing().placeholder(), Some("Loading feedback..."));

        backend.fail_next_query(BackendError::Network("offline".to_string()));
        assert!(dashboard.refresh().await.is_err());
        assert!(!dashboard.listing().is_loaded());
        assert!(!dashboard.is_loading());
        assert_eq!(dashboard.error(), Some("Could not load feedback."));

        dashboard.refresh().await.unwrap();
        assert!(!dashboard.is_loading());
        assert_eq!(dashboard.listing().placeholder(), Some("No feedback submissions yet."));
    }
}
