//! Remote mirror configuration.
//!
//! # Responsibility
//! - Collect the remote mirror settings from injected configuration.
//! - Validate them once at startup so core logic never sees bad values.
//!
//! # Invariants
//! - No credential or endpoint is embedded in core logic; defaults only cover
//!   the public service endpoints and the collection name.
//! - An absent configuration means local-only mode, not an error.
//! - `Debug` output never contains the API key.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub const ENV_API_KEY: &str = "SKINCARE_MIRROR_API_KEY";
pub const ENV_PROJECT_ID: &str = "SKINCARE_MIRROR_PROJECT_ID";
pub const ENV_COLLECTION: &str = "SKINCARE_MIRROR_COLLECTION";
pub const ENV_FIRESTORE_ENDPOINT: &str = "SKINCARE_MIRROR_ENDPOINT";
pub const ENV_IDENTITY_ENDPOINT: &str = "SKINCARE_IDENTITY_ENDPOINT";

pub const DEFAULT_COLLECTION: &str = "records";
pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

static PROJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid project id regex"));

const ALL_KEYS: &[&str] = &[
    ENV_API_KEY,
    ENV_PROJECT_ID,
    ENV_COLLECTION,
    ENV_FIRESTORE_ENDPOINT,
    ENV_IDENTITY_ENDPOINT,
];

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Blank(&'static str),
    InvalidProjectId(String),
    InvalidCollection(String),
    InvalidEndpoint { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required setting {key}"),
            Self::Blank(key) => write!(f, "setting {key} cannot be blank"),
            Self::InvalidProjectId(value) => write!(
                f,
                "project id `{value}` must use lowercase letters, digits or '-'"
            ),
            Self::InvalidCollection(value) => {
                write!(f, "collection `{value}` must be a single path segment")
            }
            Self::InvalidEndpoint { key, value } => {
                write!(f, "setting {key} must be an http(s) URL, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings for the remote document mirror.
#[derive(Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub api_key: String,
    pub project_id: String,
    pub collection: String,
    /// Document API base URL, without trailing slash.
    pub firestore_endpoint: String,
    /// Identity API base URL used for anonymous sign-in.
    pub identity_endpoint: String,
}

impl Debug for MirrorConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("api_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("collection", &self.collection)
            .field("firestore_endpoint", &self.firestore_endpoint)
            .field("identity_endpoint", &self.identity_endpoint)
            .finish()
    }
}

impl MirrorConfig {
    /// Builds a validated config with default endpoints and collection.
    pub fn new(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            api_key: api_key.into().trim().to_string(),
            project_id: project_id.into().trim().to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            firestore_endpoint: DEFAULT_FIRESTORE_ENDPOINT.to_string(),
            identity_endpoint: DEFAULT_IDENTITY_ENDPOINT.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads settings from process environment.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    ///
    /// Returns `Ok(None)` when no setting is present at all; any partial
    /// configuration is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        if ALL_KEYS.iter().all(|key| lookup(*key).is_none()) {
            return Ok(None);
        }

        let required = |key: &'static str| -> Result<String, ConfigError> {
            let value = lookup(key).ok_or(ConfigError::Missing(key))?;
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::Blank(key));
            }
            Ok(trimmed.to_string())
        };
        let optional = |key: &'static str, default: &str| -> String {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            api_key: required(ENV_API_KEY)?,
            project_id: required(ENV_PROJECT_ID)?,
            collection: optional(ENV_COLLECTION, DEFAULT_COLLECTION),
            firestore_endpoint: trim_endpoint(optional(
                ENV_FIRESTORE_ENDPOINT,
                DEFAULT_FIRESTORE_ENDPOINT,
            )),
            identity_endpoint: trim_endpoint(optional(
                ENV_IDENTITY_ENDPOINT,
                DEFAULT_IDENTITY_ENDPOINT,
            )),
        };
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Blank(ENV_API_KEY));
        }
        if !is_valid_project_id(&self.project_id) {
            return Err(ConfigError::InvalidProjectId(self.project_id.clone()));
        }
        if self.collection.is_empty() || self.collection.contains('/') {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }
        check_endpoint(ENV_FIRESTORE_ENDPOINT, &self.firestore_endpoint)?;
        check_endpoint(ENV_IDENTITY_ENDPOINT, &self.identity_endpoint)?;
        Ok(())
    }
}

fn is_valid_project_id(value: &str) -> bool {
    PROJECT_ID_RE.is_match(value)
}

fn check_endpoint(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("https://") || value.starts_with("http://") {
        return Ok(());
    }
    Err(ConfigError::InvalidEndpoint {
        key,
        value: value.to_string(),
    })
}

fn trim_endpoint(value: String) -> String {
    value.trim_end_matches('/').to_string()
}
