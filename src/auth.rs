//! Credential lookup for provider adapters
//!
//! The core treats authentication-token acquisition as an external
//! capability: a [`CredentialProvider`] yields a bearer credential on
//! demand, and the absence of one means "operate anonymously", never a
//! fatal error. Interactive login flows live outside this crate.

use std::sync::Arc;

/// Supplies a bearer credential on demand
pub trait CredentialProvider: Send + Sync {
    /// Returns the current bearer token, or `None` to operate anonymously
    fn bearer_token(&self) -> Option<String>;
}

/// Reads a credential from the OS keyring
///
/// Lookup failures (missing entry, locked keyring) are logged at debug
/// level and reported as `None`; adapters then simply send no auth
/// header.
pub struct KeyringCredentials {
    service: String,
    account: String,
}

impl KeyringCredentials {
    /// Creates a keyring-backed credential source
    ///
    /// # Examples
    ///
    /// ```
    /// use parlance::auth::KeyringCredentials;
    ///
    /// let creds = KeyringCredentials::new("parlance", "openai");
    /// ```
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl CredentialProvider for KeyringCredentials {
    fn bearer_token(&self) -> Option<String> {
        match keyring::Entry::new(&self.service, &self.account) {
            Ok(entry) => match entry.get_password() {
                Ok(token) => Some(token),
                Err(e) => {
                    tracing::debug!(
                        "no credential in keyring for {}/{}: {}",
                        self.service,
                        self.account,
                        e
                    );
                    None
                }
            },
            Err(e) => {
                tracing::debug!("keyring unavailable: {}", e);
                None
            }
        }
    }
}

/// Wraps a fixed token, or none at all
///
/// Used for environment-supplied API keys and in tests.
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    /// Creates a source that always yields the given token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Creates a source that yields no credential
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Resolves the credential source for a provider
///
/// An API key in the environment (`PARLANCE_API_KEY`) wins; otherwise
/// the OS keyring entry for the provider is consulted at call time.
pub fn credentials_for(provider_name: &str) -> Arc<dyn CredentialProvider> {
    if let Ok(token) = std::env::var("PARLANCE_API_KEY") {
        if !token.is_empty() {
            return Arc::new(StaticCredentials::new(token));
        }
    }
    Arc::new(KeyringCredentials::new("parlance", provider_name))
}
