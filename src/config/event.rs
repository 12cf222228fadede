//! Invocation payload and environment snapshot.
//!
//! A backup is triggered with a JSON object of upper-case settings. Numbers
//! and flags are accepted either as JSON values or as strings, since
//! schedulers commonly template every value as a string.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{BackupError, Result};
use crate::secrets::SecretString;

/// Environment variables that take precedence over the event when non-empty.
pub const ENV_OVERRIDES: &[&str] = &[
    "PGDATABASE",
    "PGUSER",
    "PGPASSWORD",
    "PGHOST",
    "S3_BUCKET",
    "ROOT",
    "USE_IAM_AUTH",
    "SECRETS_MANAGER_SECRET_ID",
];

/// Environment variable naming the directory that holds the pg_dump binary.
pub const PGDUMP_PATH_VAR: &str = "PGDUMP_PATH";

/// Settings supplied with a backup invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "PGDATABASE", default)]
    pub database: Option<String>,

    #[serde(rename = "PGUSER", default)]
    pub user: Option<String>,

    #[serde(rename = "PGPASSWORD", default)]
    pub password: Option<SecretString>,

    #[serde(rename = "PGHOST", default)]
    pub host: Option<String>,

    #[serde(rename = "PGPORT", default, deserialize_with = "flexible_u64")]
    pub port: Option<u64>,

    #[serde(rename = "S3_BUCKET", default)]
    pub bucket: Option<String>,

    #[serde(rename = "S3_REGION", default)]
    pub region: Option<String>,

    #[serde(rename = "ROOT", default)]
    pub root: Option<String>,

    #[serde(rename = "S3_STORAGE_CLASS", default)]
    pub storage_class: Option<String>,

    #[serde(rename = "S3_PART_SIZE", default, deserialize_with = "flexible_u64")]
    pub part_size: Option<u64>,

    #[serde(rename = "ENCRYPT_KEY", default)]
    pub encrypt_key: Option<SecretString>,

    #[serde(rename = "USE_IAM_AUTH", default, deserialize_with = "flexible_bool")]
    pub use_iam_auth: Option<bool>,

    #[serde(rename = "SECRETS_MANAGER_SECRET_ID", default)]
    pub secrets_manager_secret_id: Option<String>,

    #[serde(rename = "PGDUMP_PATH", default)]
    pub pgdump_path: Option<String>,

    #[serde(rename = "PGCONNECT_TIMEOUT", default, deserialize_with = "flexible_u64")]
    pub connect_timeout: Option<u64>,

    #[serde(rename = "PGDUMP_ARGS", default)]
    pub pgdump_args: Option<String>,
}

impl EventPayload {
    /// Parse a payload from JSON. `null` and an empty document are treated as
    /// an empty payload.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }

        let payload: Option<Self> = serde_json::from_str(json)
            .map_err(|e| BackupError::configuration(format!("Invalid event payload: {}", e)))?;
        Ok(payload.unwrap_or_default())
    }

    /// Apply non-empty values from the override allow-list in `env`.
    pub fn with_env_overrides(mut self, env: &EnvSnapshot) -> Result<Self> {
        if let Some(value) = env.get("PGDATABASE") {
            self.database = Some(value.to_string());
        }
        if let Some(value) = env.get("PGUSER") {
            self.user = Some(value.to_string());
        }
        if let Some(value) = env.get("PGPASSWORD") {
            self.password = Some(SecretString::new(value));
        }
        if let Some(value) = env.get("PGHOST") {
            self.host = Some(value.to_string());
        }
        if let Some(value) = env.get("S3_BUCKET") {
            self.bucket = Some(value.to_string());
        }
        if let Some(value) = env.get("ROOT") {
            self.root = Some(value.to_string());
        }
        if let Some(value) = env.get("USE_IAM_AUTH") {
            let flag = parse_flag(value).ok_or_else(|| {
                BackupError::configuration_field(
                    format!("USE_IAM_AUTH must be a boolean, got {:?}", value),
                    "USE_IAM_AUTH",
                )
            })?;
            self.use_iam_auth = Some(flag);
        }
        if let Some(value) = env.get("SECRETS_MANAGER_SECRET_ID") {
            self.secrets_manager_secret_id = Some(value.to_string());
        }
        Ok(self)
    }
}

/// The subset of the process environment a backup run depends on.
///
/// Captured once at the program edge so configuration merging stays a pure
/// function of its inputs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the relevant variables from the current process environment.
    pub fn capture() -> Self {
        std::env::vars().filter(|(name, _)| is_relevant(name)).collect()
    }

    /// Value of `name` if it is set and non-empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str).filter(|value| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvSnapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(k, _)| is_relevant(k))
                .collect(),
        }
    }
}

impl fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSnapshot").field("keys", &self.vars.keys().collect::<Vec<_>>()).finish()
    }
}

fn is_relevant(name: &str) -> bool {
    name == PGDUMP_PATH_VAR || ENV_OVERRIDES.contains(&name)
}

/// Interpret a textual flag. Returns `None` for unrecognised values.
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBool {
    Bool(bool),
    Text(String),
}

fn flexible_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawNumber>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawNumber::Number(n)) => Ok(Some(n)),
        Some(RawNumber::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed.parse().map(Some).map_err(|_| {
                de::Error::custom(format!("expected a non-negative integer, got {:?}", text))
            })
        }
    }
}

fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawBool>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawBool::Bool(b)) => Ok(Some(b)),
        Some(RawBool::Text(text)) => parse_flag(&text)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a boolean, got {:?}", text))),
    }
}
