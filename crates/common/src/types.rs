//! Remote feed service model
//!
//! Shapes of the objects exchanged with the feed management API. Field
//! names follow the service's camelCase wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A package feed as returned by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning project; absent for organization-scoped feeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectReference>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_date: Option<DateTime<Utc>>,
}

/// Reference to the project a feed lives in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReference {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Update payload for a feed.
///
/// No feed property is updated in place yet; the struct is sent empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedUpdate {}

/// Kind of the most recent change recorded for a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    AddOrUpdate,
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::AddOrUpdate => write!(f, "addOrUpdate"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// Entry of the feed change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedChange {
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<Feed>,
    #[serde(default)]
    pub feed_continuation_token: i64,
}

/// JSON patch operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// A single JSON patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub value: serde_json::Value,
}

impl JsonPatchOperation {
    pub fn replace(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            from: None,
            value,
        }
    }
}

/// Identifies a single feed: its name or id, plus the optional project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedScope {
    pub feed_id: String,
    pub project: Option<Uuid>,
}

impl FeedScope {
    pub fn new(feed_id: impl Into<String>, project: Option<Uuid>) -> Self {
        Self {
            feed_id: feed_id.into(),
            project,
        }
    }
}

impl std::fmt::Display for FeedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}/{}", project, self.feed_id),
            None => write!(f, "{}", self.feed_id),
        }
    }
}
