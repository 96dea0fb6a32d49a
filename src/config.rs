//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Bounds and limits the wizard enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentConfig {
    /// Values that must be selected before leaving the selection step.
    pub min_selections: usize,
    /// Values that may be selected at most.
    pub max_selections: usize,
    /// How many top-ranked values the reflection step asks about.
    pub top_values: usize,
    /// Reflections longer than this (in characters) are truncated.
    pub max_reflection_chars: usize,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            min_selections: 3,
            max_selections: 10,
            top_values: 3,
            max_reflection_chars: 2000,
        }
    }
}

impl AssessmentConfig {
    /// Check the bounds are usable together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_selections == 0 {
            return Err(invalid("min_selections", "must be at least 1"));
        }
        if self.min_selections > self.max_selections {
            return Err(invalid(
                "min_selections",
                &format!(
                    "{} is greater than max_selections ({})",
                    self.min_selections, self.max_selections
                ),
            ));
        }
        if self.top_values == 0 || self.top_values > self.max_selections {
            return Err(invalid(
                "top_values",
                &format!("must be between 1 and max_selections ({})", self.max_selections),
            ));
        }
        if self.max_reflection_chars == 0 {
            return Err(invalid("max_reflection_chars", "must be at least 1"));
        }
        Ok(())
    }
}

/// Runtime configuration for the `values-assessment` binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub assessment: AssessmentConfig,
    /// libSQL database file for the local store.
    pub db_path: PathBuf,
    /// Namespace isolating this app's keys inside the local store.
    pub namespace: String,
    pub bind_addr: SocketAddr,
    /// Base URL of the remote store. Remote persistence is off when unset.
    pub remote_url: Option<String>,
    pub auth_token: Option<SecretString>,
    /// Back up and delete legacy keys after a successful migration.
    pub cleanup_legacy: bool,
    /// JSON catalog to load instead of the built-in one.
    pub catalog_path: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from `VALUES_ASSESSMENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = AssessmentConfig::default();
        let assessment = AssessmentConfig {
            min_selections: parse_or(&lookup, "VALUES_ASSESSMENT_MIN_SELECTIONS", defaults.min_selections)?,
            max_selections: parse_or(&lookup, "VALUES_ASSESSMENT_MAX_SELECTIONS", defaults.max_selections)?,
            top_values: parse_or(&lookup, "VALUES_ASSESSMENT_TOP_VALUES", defaults.top_values)?,
            max_reflection_chars: parse_or(
                &lookup,
                "VALUES_ASSESSMENT_MAX_REFLECTION_CHARS",
                defaults.max_reflection_chars,
            )?,
        };
        assessment.validate()?;

        let port: u16 = parse_or(&lookup, "VALUES_ASSESSMENT_PORT", 8080)?;
        let remote_url = lookup("VALUES_ASSESSMENT_REMOTE_URL").filter(|s| !s.trim().is_empty());
        let auth_token = lookup("VALUES_ASSESSMENT_AUTH_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from);

        if remote_url.is_some() && auth_token.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "VALUES_ASSESSMENT_AUTH_TOKEN".to_string(),
                hint: "The remote store needs a token when VALUES_ASSESSMENT_REMOTE_URL is set."
                    .to_string(),
            });
        }

        Ok(Self {
            assessment,
            db_path: lookup("VALUES_ASSESSMENT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/values-assessment.db")),
            namespace: lookup("VALUES_ASSESSMENT_NAMESPACE")
                .unwrap_or_else(|| "values-assessment".to_string()),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            remote_url,
            auth_token,
            cleanup_legacy: parse_or(&lookup, "VALUES_ASSESSMENT_CLEANUP_LEGACY", true)?,
            catalog_path: lookup("VALUES_ASSESSMENT_CATALOG").map(PathBuf::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
