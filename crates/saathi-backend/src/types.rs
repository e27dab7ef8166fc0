//! Row-change and channel types shared by every backend implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column every business table uses to scope rows to their owner.
pub const OWNER_COLUMN: &str = "user_id";

/// Authenticated user's unique id; scopes every row filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no owner is known yet (signed out, session loading).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Kind of row change delivered by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];

    /// Wire name used in feed filters (`INSERT`, `UPDATE`, `DELETE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            ChangeKind::Insert => 0b001,
            ChangeKind::Update => 0b010,
            ChangeKind::Delete => 0b100,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of watched change kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeKinds(u8);

impl ChangeKinds {
    pub const NONE: ChangeKinds = ChangeKinds(0);
    pub const ALL: ChangeKinds = ChangeKinds(0b111);

    pub fn only(kind: ChangeKind) -> Self {
        Self(kind.bit())
    }

    #[must_use]
    pub fn with(self, kind: ChangeKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn contains(&self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ChangeKind> + '_ {
        ChangeKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl Default for ChangeKinds {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<ChangeKind> for ChangeKinds {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, ChangeKinds::with)
    }
}

impl fmt::Debug for ChangeKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A single row change delivered by the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub table: String,
    pub kind: ChangeKind,
    /// New row image (absent for deletes).
    pub record: Option<serde_json::Value>,
    /// Previous row image when the service provides one.
    pub old_record: Option<serde_json::Value>,
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl RowChange {
    /// Owner of the changed row, looked up in the new image then the old one.
    pub fn owner(&self) -> Option<&str> {
        self.record
            .as_ref()
            .and_then(|row| row.get(OWNER_COLUMN))
            .or_else(|| self.old_record.as_ref().and_then(|row| row.get(OWNER_COLUMN)))
            .and_then(|value| value.as_str())
    }
}

/// What a subscriber asks the change feed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub table: String,
    pub owner_id: OwnerId,
    pub kinds: ChangeKinds,
}

impl ChannelRequest {
    pub fn new(table: impl Into<String>, owner_id: OwnerId, kinds: ChangeKinds) -> Self {
        Self {
            table: table.into(),
            owner_id,
            kinds,
        }
    }

    /// Server-side row filter restricting events to the owner's rows.
    pub fn filter_expression(&self) -> String {
        format!("{}=eq.{}", OWNER_COLUMN, self.owner_id)
    }

    /// Whether a change passes this request's table, kind and owner filter.
    pub fn matches(&self, change: &RowChange) -> bool {
        change.table == self.table
            && self.kinds.contains(change.kind)
            && change.owner() == Some(self.owner_id.as_str())
    }
}

/// Opaque reference to one open channel.
///
/// Deliberately not `Clone`: exactly one owner may remove it, and removal
/// consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ChannelHandle(String);

impl ChannelHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}
