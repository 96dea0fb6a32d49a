//! Authentication boundary: supplies bearer tokens to the remote store.

use secrecy::{ExposeSecret, SecretString};

/// Source of the token the remote store authenticates with.
pub trait AuthTokenProvider: Send + Sync {
    /// The current token, if the user is signed in.
    fn auth_token(&self) -> Option<SecretString>;

    fn is_authenticated(&self) -> bool {
        self.auth_token().is_some()
    }
}

/// A token fixed at startup (e.g. from the environment).
pub struct StaticToken {
    token: Option<SecretString>,
}

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self { token: Some(token) }
    }

    /// A provider that is never authenticated.
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl AuthTokenProvider for StaticToken {
    fn auth_token(&self) -> Option<SecretString> {
        self.token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_owned()))
    }
}
