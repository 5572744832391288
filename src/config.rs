//! Gateway configuration.
//!
//! Loaded once at startup from TOML (file or string), optionally
//! overridden from `DOCGATE_*` environment variables, and immutable for
//! the life of the gateway.

use rand::RngCore;
use serde::Deserialize;

use crate::errors::GatewayError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Shared secret: 64 hex characters (a 256-bit key). Authenticated
    /// callers present it; capability tokens are encrypted under it.
    pub secret: String,
    /// Whether the administrative drop-entity operation is permitted.
    #[serde(default)]
    pub allow_destroy: bool,
}

impl Config {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into(), allow_destroy: false }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    /// `Config` when the text is not valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self, GatewayError> {
        toml::from_str(text).map_err(|e| GatewayError::Config(e.to_string()))
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    /// `Config` on I/O or parse failure.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, GatewayError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| GatewayError::Config(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Applies `DOCGATE_SECRET` and `DOCGATE_ALLOW_DESTROY` overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("DOCGATE_SECRET") {
            self.secret = secret;
        }
        if let Ok(v) = std::env::var("DOCGATE_ALLOW_DESTROY") {
            self.allow_destroy = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// # Errors
    /// `Config` unless the secret is exactly 64 hex characters.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.secret.len() != 64 || !self.secret.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GatewayError::Config(
                "secret must be a 64-character hex string".into(),
            ));
        }
        Ok(())
    }

    /// Produces a fresh 64-hex-character secret from the OS RNG.
    #[must_use]
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
