//! Runtime settings store and secret helpers.
//!
//! Two layers: explicit overrides written through [`RuntimeSettings::set`],
//! and an environment baseline captured by [`RuntimeSettings::from_env`].
//! Secret strings are kept encrypted in the override layer (v2 format,
//! AES-256-GCM) and decrypted on read.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::RuntimeError;

const DEFAULT_SALT: &str = "secretsalt";
const AAD: &[u8] = b"elizaos:settings:v2";

/// Setting value type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    String(String),
    Bool(bool),
    Number(f64),
    Null,
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects are not settings.
    pub fn from_json(value: &serde_json::Value) -> Option<SettingValue> {
        match value {
            serde_json::Value::String(s) => Some(SettingValue::String(s.clone())),
            serde_json::Value::Bool(b) => Some(SettingValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(SettingValue::Number),
            serde_json::Value::Null => Some(SettingValue::Null),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// `"true"`/`"false"` strings become booleans.
    pub fn normalized(self) -> SettingValue {
        match self {
            SettingValue::String(s) if s == "true" => SettingValue::Bool(true),
            SettingValue::String(s) if s == "false" => SettingValue::Bool(false),
            other => other,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

/// Process-wide key/value settings.
#[derive(Clone, Default)]
pub struct RuntimeSettings {
    overrides: HashMap<String, SettingValue>,
    env: HashMap<String, String>,
    secret_keys: HashSet<String>,
}

impl RuntimeSettings {
    /// Empty store with no environment baseline
    pub fn new() -> Self {
        RuntimeSettings::default()
    }

    /// Load `.env` if present, then snapshot the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to load .env file");
            }
        }
        RuntimeSettings {
            env: std::env::vars().collect(),
            ..Default::default()
        }
    }

    /// Store seeded from explicit pairs instead of the process environment
    pub fn with_env<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RuntimeSettings {
            env: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ..Default::default()
        }
    }

    /// Salt for secret encryption: `SECRET_SALT` from the baseline, else the
    /// default. Production refuses the default unless explicitly allowed.
    pub fn salt(&self) -> Result<String, RuntimeError> {
        let salt = self
            .env
            .get("SECRET_SALT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SALT.to_string());
        let production = self
            .env
            .get("NODE_ENV")
            .is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let allow_default = self
            .env
            .get("ELIZA_ALLOW_DEFAULT_SECRET_SALT")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if production && salt == DEFAULT_SALT && !allow_default {
            return Err(RuntimeError::Configuration(
                "SECRET_SALT must be set to a non-default value in production. \
                 Set ELIZA_ALLOW_DEFAULT_SECRET_SALT=true to override."
                    .to_string(),
            ));
        }
        Ok(salt)
    }

    /// Write an override. Secret strings are encrypted before storage.
    pub fn set(&mut self, key: &str, value: SettingValue, secret: bool) -> Result<(), RuntimeError> {
        let stored = match (secret, value) {
            (true, SettingValue::String(s)) => {
                let salt = self.salt()?;
                SettingValue::String(encrypt_string_value(&s, &salt)?)
            }
            (_, other) => other,
        };
        if secret {
            self.secret_keys.insert(key.to_string());
        } else {
            self.secret_keys.remove(key);
        }
        self.overrides.insert(key.to_string(), stored);
        Ok(())
    }

    /// Read an override (decrypted), falling back to the environment baseline.
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        if let Some(value) = self.overrides.get(key) {
            let value = match value {
                SettingValue::String(s) if self.secret_keys.contains(key) => {
                    match self.salt() {
                        Ok(salt) => SettingValue::String(decrypt_string_value(s, &salt)),
                        Err(e) => {
                            tracing::warn!(key, error = %e, "Cannot decrypt secret setting");
                            return None;
                        }
                    }
                }
                other => other.clone(),
            };
            return Some(value.normalized());
        }
        self.env
            .get(key)
            .map(|v| SettingValue::String(v.clone()).normalized())
    }

    /// Whether `key` was written as a secret
    pub fn is_secret(&self, key: &str) -> bool {
        self.secret_keys.contains(key)
    }

    /// Remove an override, exposing the baseline again
    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.secret_keys.remove(key);
        self.overrides.remove(key)
    }

    /// Whether `key` has an explicit override
    pub fn has_override(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.overrides.contains_key(key) || self.env.contains_key(key)
    }
}

impl fmt::Debug for RuntimeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overrides: HashMap<&str, String> = self
            .overrides
            .iter()
            .map(|(k, v)| {
                let shown = if self.secret_keys.contains(k) {
                    "[REDACTED]".to_string()
                } else {
                    format!("{v:?}")
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("RuntimeSettings")
            .field("overrides", &overrides)
            .field("env_keys", &self.env.len())
            .finish_non_exhaustive()
    }
}

/// Get the salt from the process environment.
pub fn get_salt() -> Result<String, RuntimeError> {
    RuntimeSettings::with_env(std::env::vars()).salt()
}

/// Encrypt a string value as `v2:<iv>:<ciphertext>:<tag>` (hex).
/// Values that already look encrypted are returned unchanged.
pub fn encrypt_string_value(value: &str, salt: &str) -> Result<String, RuntimeError> {
    if looks_encrypted(value) {
        return Ok(value.to_string());
    }

    let key = derive_key(salt);
    let random = uuid::Uuid::new_v4().into_bytes();
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&random[..12]);

    let gcm = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| RuntimeError::Configuration(format!("invalid key: {e}")))?;
    let encrypted = gcm
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: value.as_bytes(),
                aad: AAD,
            },
        )
        .map_err(|e| RuntimeError::Configuration(format!("encryption failed: {e}")))?;
    let split = encrypted.len().saturating_sub(16);
    let (ciphertext, tag) = encrypted.split_at(split);

    Ok(format!(
        "v2:{}:{}:{}",
        hex::encode(iv),
        hex::encode(ciphertext),
        hex::encode(tag)
    ))
}

/// Decrypt a v2 value. Anything that does not decrypt is returned as-is.
pub fn decrypt_string_value(value: &str, salt: &str) -> String {
    try_decrypt(value, salt).unwrap_or_else(|| value.to_string())
}

fn try_decrypt(value: &str, salt: &str) -> Option<String> {
    let rest = value.strip_prefix("v2:")?;
    let mut parts = rest.split(':');
    let (iv, ciphertext, tag) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(iv), Some(ct), Some(tag), None) => (
            hex::decode(iv).ok()?,
            hex::decode(ct).ok()?,
            hex::decode(tag).ok()?,
        ),
        _ => return None,
    };
    if iv.len() != 12 || tag.len() != 16 {
        return None;
    }

    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);

    let gcm = Aes256Gcm::new_from_slice(&derive_key(salt)).ok()?;
    let plaintext = gcm
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &combined,
                aad: AAD,
            },
        )
        .ok()?;
    String::from_utf8(plaintext).ok()
}

fn derive_key(salt: &str) -> [u8; 32] {
    let digest = Sha256::digest(salt.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    key
}

fn looks_encrypted(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("v2:") else {
        return false;
    };
    let parts: Vec<&str> = rest.split(':').collect();
    parts.len() == 3
        && hex::decode(parts[0]).is_ok_and(|iv| iv.len() == 12)
        && hex::decode(parts[2]).is_ok_and(|tag| tag.len() == 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let salt = "secretsalt";
        let encrypted = encrypt_string_value("hello world", salt).unwrap();
        assert!(encrypted.starts_with("v2:"));
        assert_eq!(encrypt_string_value(&encrypted, salt).unwrap(), encrypted);
        assert_eq!(decrypt_string_value(&encrypted, salt), "hello world");
    }

    #[test]
    fn test_decrypt_with_wrong_salt_returns_input() {
        let encrypted = encrypt_string_value("hello", "salt-a").unwrap();
        assert_eq!(decrypt_string_value(&encrypted, "salt-b"), encrypted);
        assert_eq!(decrypt_string_value("plain", "salt-a"), "plain");
    }

    #[test]
    fn test_overrides_shadow_env_and_normalize_booleans() {
        let mut settings = RuntimeSettings::with_env([("MODE", "fast"), ("DEBUG", "true")]);
        assert_eq!(settings.get("DEBUG"), Some(SettingValue::Bool(true)));
        assert_eq!(settings.get("MODE"), Some(SettingValue::from("fast")));

        settings.set("MODE", "slow".into(), false).unwrap();
        assert_eq!(settings.get("MODE"), Some(SettingValue::from("slow")));

        settings.remove("MODE");
        assert_eq!(settings.get("MODE"), Some(SettingValue::from("fast")));
        assert_eq!(settings.get("MISSING"), None);
    }

    #[test]
    fn test_secrets_are_encrypted_and_redacted() {
        let mut settings = RuntimeSettings::new();
        settings.set("API_KEY", "sk-live-123".into(), true).unwrap();

        assert!(settings.is_secret("API_KEY"));
        assert_eq!(settings.get("API_KEY"), Some(SettingValue::from("sk-live-123")));
        match settings.overrides.get("API_KEY") {
            Some(SettingValue::String(stored)) => assert!(stored.starts_with("v2:")),
            other => panic!("unexpected stored value: {other:?}"),
        }

        let debug = format!("{settings:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-live-123"));
    }

    #[test]
    fn test_production_rejects_default_salt() {
        let mut settings = RuntimeSettings::with_env([("NODE_ENV", "production")]);
        let err = settings.set("TOKEN", "x".into(), true).unwrap_err();
        assert!(matches!(err, RuntimeError::Configuration(_)));

        let allowed = RuntimeSettings::with_env([
            ("NODE_ENV", "production"),
            ("ELIZA_ALLOW_DEFAULT_SECRET_SALT", "true"),
        ]);
        assert_eq!(allowed.salt().unwrap(), "secretsalt");

        let custom = RuntimeSettings::with_env([("NODE_ENV", "production"), ("SECRET_SALT", "s3")]);
        assert_eq!(custom.salt().unwrap(), "s3");
    }
}
