//! Database module for PostgreSQL persistence.

mod entities;
mod observations;
mod pool;
mod sites;
mod store;
mod sync_logs;

pub use pool::*;
pub use store::PgStore;

use crate::sync::StoreError;
use serde::{de::DeserializeOwned, Serialize};

/// Decode a text column holding a serde unit variant.
fn decode_enum<T: DeserializeOwned>(column: &str, value: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| StoreError::Corrupt(format!("{column}: unknown value {value:?}")))
}

/// Encode a serde unit variant as its text form.
fn encode_enum<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        _ => Err(StoreError::Corrupt("expected a unit variant".into())),
    }
}

/// Whether a database error is a unique violation.
fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

/// Name of the constraint a database error was raised by.
fn violated_constraint(e: &sqlx::Error) -> Option<&str> {
    e.as_database_error().and_then(|db| db.constraint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_engine::{ComplianceStatus, Direction, RunStatus, SyncStatus};

    #[test]
    fn enum_columns() {
        assert_eq!(encode_enum(&RunStatus::InProgress).unwrap(), "in_progress");
        assert_eq!(encode_enum(&Direction::Push).unwrap(), "push");
        assert_eq!(
            decode_enum::<ComplianceStatus>("compliance_status", "not_required").unwrap(),
            ComplianceStatus::NotRequired
        );
        assert_eq!(
            decode_enum::<SyncStatus>("sync_status", SyncStatus::OutOfSync.as_str()).unwrap(),
            SyncStatus::OutOfSync
        );
    }

    #[test]
    fn unknown_enum_value_is_corrupt() {
        let err = decode_enum::<RunStatus>("status", "exploded").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("exploded")));
    }

    #[test]
    fn non_database_errors_are_not_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(violated_constraint(&sqlx::Error::RowNotFound).is_none());
    }
}
