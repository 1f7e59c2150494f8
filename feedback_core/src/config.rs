use std::env;

use chrono_tz::Tz;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com";
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";

/// Connection settings for the hosted Firebase project.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    /// Base URL of the Identity Toolkit API. Point this and
    /// `firestore_base_url` at the local emulators for development.
    pub auth_base_url: String,
    pub firestore_base_url: String,
    /// Base URL of the Secure Token API that refreshes id tokens.
    pub secure_token_base_url: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} must be set.")]
    Missing(&'static str),
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            auth_base_url: DEFAULT_AUTH_URL.to_string(),
            firestore_base_url: DEFAULT_FIRESTORE_URL.to_string(),
            secure_token_base_url: DEFAULT_SECURE_TOKEN_URL.to_string(),
        }
    }

    /// Loads the settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the settings through `lookup`, which maps a variable name to its
    /// value if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key).filter(|value| !value.trim().is_empty()).ok_or_else(|| {
                warn!("{key} not set");
                ConfigError::Missing(key)
            })
        };
        let api_key = required("FEEDBACK_FIREBASE_API_KEY")?;
        let project_id = required("FEEDBACK_FIREBASE_PROJECT_ID")?;

        let mut config = Self::new(api_key, project_id);
        if let Some(url) = lookup("FEEDBACK_AUTH_URL") {
            info!("Using auth endpoint {url}");
            config.auth_base_url = url;
        }
        if let Some(url) = lookup("FEEDBACK_FIRESTORE_URL") {
            info!("Using Firestore endpoint {url}");
            config.firestore_base_url = url;
        }
        if let Some(url) = lookup("FEEDBACK_SECURE_TOKEN_URL") {
            info!("Using token endpoint {url}");
            config.secure_token_base_url = url;
        }
        Ok(config)
    }
}

/// The time zone that dates are displayed in, from `FEEDBACK_DISPLAY_TZ`.
pub fn display_timezone() -> Tz {
    display_timezone_from(env::var("FEEDBACK_DISPLAY_TZ").ok().as_deref())
}

/// Parses an IANA time zone name, falling back to UTC when it is absent or
/// unknown.
pub fn display_timezone_from(name: Option<&str>) -> Tz {
    match name {
        None => {
            info!("FEEDBACK_DISPLAY_TZ not set, using default: UTC");
            Tz::UTC
        }
        Some(name) => name.parse().unwrap_or_else(|e| {
            warn!("Invalid FEEDBACK_DISPLAY_TZ value: {e}");
            Tz::UTC
        }),
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|&(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn loads_required_and_optional() {
        let config = FirebaseConfig::from_lookup(lookup(&[
            ("FEEDBACK_FIREBASE_API_KEY", "key"),
            ("FEEDBACK_FIREBASE_PROJECT_ID", "feedback-form"),
        ]))
        .unwrap();
        assert_eq!(config, FirebaseConfig::new("key", "feedback-form"));

        let emulated = FirebaseConfig::from_lookup(lookup(&[
            ("FEEDBACK_FIREBASE_API_KEY", "key"),
            ("FEEDBACK_FIREBASE_PROJECT_ID", "demo"),
            ("FEEDBACK_AUTH_URL", "http://localhost:9099/identitytoolkit.googleapis.com"),
            ("FEEDBACK_FIRESTORE_URL", "http://localhost:8080"),
            ("FEEDBACK_SECURE_TOKEN_URL", "http://localhost:9099/securetoken.googleapis.com"),
        ]))
        .unwrap();
        assert_eq!(emulated.firestore_base_url, "http://localhost:8080");
        assert_eq!(emulated.auth_base_url, "http://localhost:9099/identitytoolkit.googleapis.com");
        assert_eq!(
            emulated.secure_token_base_url,
            "http://localhost:9099/securetoken.googleapis.com"
        );
    }

    #[test]
    fn missing_values_are_reported() {
        assert_eq!(
            FirebaseConfig::from_lookup(lookup(&[("FEEDBACK_FIREBASE_PROJECT_ID", "p")])),
            Err(ConfigError::Missing("FEEDBACK_FIREBASE_API_KEY"))
        );
        assert_eq!(
            FirebaseConfig::from_lookup(lookup(&[
                ("FEEDBACK_FIREBASE_API_KEY", "key"),
                ("FEEDBACK_FIREBASE_PROJECT_ID", "  "),
            ])),
            Err(ConfigError::Missing("FEEDBACK_FIREBASE_PROJECT_ID"))
        );
    }

    #[test]
    fn timezone_fallback() {
        assert_eq!(display_timezone_from(Some("Asia/Kolkata")), chrono_tz::Asia::Kolkata);
        assert_eq!(display_timezone_from(Some("Mars/Olympus")), Tz::UTC);
        assert_eq!(display_timezone_from(None), Tz::UTC);
    }
}
