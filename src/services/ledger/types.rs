//! Core types for the ledger.
//!
//! Contains the entry row, the delete policy and the upsert outcome shared by
//! every ledger backend and by the memory mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serde helper for `DateTime<Utc>` as RFC3339 string.
pub(crate) mod datetime_rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A key/value row as stored in the ledger.
///
/// `deleted_at` is only ever `Some` for rows read back with tombstones
/// included; the live-set queries filter those rows out, so entries handed to
/// callers and to the mirror are always live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Ledger-assigned row id.
    pub id: i64,
    /// Unique key among live rows.
    pub key: String,
    /// Opaque payload.
    pub value: String,
    /// Time of the last write.
    #[serde(with = "datetime_rfc3339")]
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker (soft delete only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Returns true if the row is not tombstoned.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// How `delete` removes a key from the live set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Physically remove the row.
    #[default]
    Hard,
    /// Keep the row and stamp `deleted_at`.
    Soft,
}

impl DeletePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            other => Err(format!(
                "unknown delete policy '{other}' (expected 'hard' or 'soft')"
            )),
        }
    }
}

/// Which edge of the per-key state machine an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// absent -> live
    Inserted,
    /// live -> live
    Updated,
    /// tombstoned -> live
    Revived,
}

/// Result of a ledger upsert: the row exactly as committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    pub entry: Entry,
    pub transition: Transition,
}
