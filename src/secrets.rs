//! Signer key loading
//!
//! The signing key decides which account trades. It is read from the 1Password
//! CLI when available, otherwise from the environment, and is only ever held
//! in a `Zeroizing<String>` so the buffer is wiped on drop.

use std::env;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

/// 1Password reference tried before `MARKET_SIGNER_KEY`.
pub const SIGNER_KEY_REFERENCE: &str = "op://Private/share-market/signer_key";
pub const SIGNER_KEY_ENV: &str = "MARKET_SIGNER_KEY";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("1Password CLI error: {0}")]
    OnePasswordError(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Secret validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone)]
pub struct SecretConfig {
    /// Accept secrets from environment variables. Off in release builds.
    pub allow_env_vars: bool,

    /// Fail instead of falling back when the `op` CLI cannot answer.
    pub require_op_cli: bool,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            allow_env_vars: cfg!(debug_assertions),
            require_op_cli: false,
        }
    }
}

/// Load a secret from 1Password, falling back to `env_var_name` if allowed.
pub fn load_secret(
    op_reference: &str,
    env_var_name: &str,
    config: &SecretConfig,
) -> Result<Zeroizing<String>, SecretError> {
    match load_from_op_cli(op_reference) {
        Ok(secret) => {
            info!("Loaded secret from 1Password CLI: {}", env_var_name);
            return Ok(secret);
        }
        Err(e) => {
            if config.require_op_cli {
                error!("1Password CLI required but failed: {}", e);
                return Err(e);
            }
            warn!("1Password CLI not available: {}", e);
        }
    }

    if config.allow_env_vars {
        warn!("Loading secret from environment variable {}", env_var_name);
        load_from_env(env_var_name)
    } else {
        error!(
            "No source for {}: 1Password CLI unavailable and env vars disabled",
            env_var_name
        );
        Err(SecretError::NotFound(env_var_name.to_string()))
    }
}

fn load_from_op_cli(reference: &str) -> Result<Zeroizing<String>, SecretError> {
    use std::process::Command;

    let output = Command::new("op")
        .arg("read")
        .arg(reference)
        .output()
        .map_err(|e| SecretError::OnePasswordError(format!("failed to execute 'op': {}", e)))?;

    if !output.status.success() {
        return Err(SecretError::OnePasswordError(format!(
            "'op read' failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = Zeroizing::new(output.stdout);
    let secret = std::str::from_utf8(&stdout)
        .map_err(|e| SecretError::OnePasswordError(format!("invalid UTF-8 from 1Password: {}", e)))?
        .trim();
    if secret.is_empty() {
        return Err(SecretError::OnePasswordError(
            "1Password returned an empty secret".to_string(),
        ));
    }

    Ok(Zeroizing::new(secret.to_string()))
}

fn load_from_env(env_var_name: &str) -> Result<Zeroizing<String>, SecretError> {
    env::var(env_var_name)
        .map(Zeroizing::new)
        .map_err(|_| SecretError::EnvVarNotSet(env_var_name.to_string()))
}

/// Check that `key` is a 32-byte hex private key, with or without `0x`.
pub fn validate_private_key(key: &str) -> Result<(), SecretError> {
    let hex = key.strip_prefix("0x").unwrap_or(key);
    if hex.len() != 64 {
        return Err(SecretError::ValidationFailed(format!(
            "private key must be 64 hex characters, got {}",
            hex.len()
        )));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SecretError::ValidationFailed(
            "private key contains non-hex characters".to_string(),
        ));
    }
    if hex.chars().all(|c| c == '0') {
        return Err(SecretError::ValidationFailed("private key is zero".to_string()));
    }
    Ok(())
}

/// Load and validate the key the market signer uses.
pub fn load_signer_key(config: &SecretConfig) -> Result<Zeroizing<String>, SecretError> {
    let key = load_secret(SIGNER_KEY_REFERENCE, SIGNER_KEY_ENV, config)?;
    validate_private_key(key.trim())?;
    Ok(Zeroizing::new(key.trim().to_string()))
}
