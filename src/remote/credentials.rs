//! Access token decryption seam.
//!
//! Tokens are stored encrypted at rest by the authentication layer, which owns
//! the key. The sync engine only needs a bearer token, obtained through
//! [`TokenDecryptor`] at session open.

use crate::error::ConfigError;

pub trait TokenDecryptor: Send + Sync {
    /// Turn the stored form of a token into a bearer token.
    fn decrypt(&self, sealed: &str) -> Result<String, ConfigError>;
}

/// Token stored in the clear (environment variable or local config file).
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextToken;

impl TokenDecryptor for PlaintextToken {
    fn decrypt(&self, sealed: &str) -> Result<String, ConfigError> {
        let token = sealed.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingCredentials("access token is empty".into()));
        }
        Ok(token.to_string())
    }
}
