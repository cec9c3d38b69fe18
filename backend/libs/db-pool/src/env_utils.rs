//! Environment variable parsing helpers.
//!
//! Unlike a silent `unwrap_or`, a variable that is present but unparsable is
//! reported instead of quietly replaced by the default.

use std::str::FromStr;

use crate::DbPoolError;

/// Parse `key`, falling back to `default` when the variable is unset.
///
/// ```ignore
/// let max: u32 = parse_env_or("DB_MAX_CONNECTIONS", 20)?;
/// ```
pub fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, DbPoolError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| DbPoolError::InvalidVar {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

/// Read a variable that must be present and non-empty.
pub fn require_env(key: &str) -> Result<String, DbPoolError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DbPoolError::MissingVar(key.to_string())),
    }
}
