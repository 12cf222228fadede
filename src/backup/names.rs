//! Database name resolution.

use crate::errors::{BackupError, Result};

/// Split the database field into the ordered list of databases to back up.
///
/// Entries are comma separated and trimmed; empty entries are dropped.
/// Duplicates are kept and each is backed up.
///
/// # Errors
///
/// Returns [`BackupError::DatabaseName`] when no name remains.
pub fn resolve_database_names(raw: &str) -> Result<Vec<String>> {
    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if names.is_empty() {
        return Err(BackupError::database_name(raw));
    }
    Ok(names)
}
