//! Backup object keys and the clock they are derived from.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::encryption::iv_object_key;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Storage key of one database backup:
/// `[<root>/]<YYYY-MM-DD>/<database>-<DD-MM-YYYY@HH-mm-ss>.backup`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupKey(String);

impl BackupKey {
    pub fn generate(database: &str, root: Option<&str>, at: DateTime<Utc>) -> Self {
        let day = at.format("%Y-%m-%d");
        let stamp = at.format("%d-%m-%Y@%H-%M-%S");
        let path = format!("{}/{}-{}.backup", day, database, stamp);

        match root.map(|r| r.trim_matches('/')).filter(|r| !r.is_empty()) {
            Some(root) => Self(format!("{}/{}", root, path)),
            None => Self(path),
        }
    }

    /// Key of the companion object holding the IV.
    pub fn iv_key(&self) -> String {
        iv_object_key(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BackupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
