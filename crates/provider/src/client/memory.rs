//! In-memory feed service
//!
//! Behaves like the remote feed service for a single organization: feeds
//! are scoped by project, names are unique per scope (recycle bin
//! included), soft-deleted feeds can be restored or purged, and every
//! lifecycle step is reflected in the change history. All calls are
//! recorded and single failures can be injected per operation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use feedform_common::{
    ChangeType, Error, Feed, FeedChange, FeedScope, FeedUpdate, JsonPatchOperation, PatchOp,
    ProjectReference, Result,
};

use super::FeedClient;

/// Remote operation kinds, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    CreateFeed,
    GetFeed,
    UpdateFeed,
    DeleteFeed,
    PermanentDeleteFeed,
    GetFeedChange,
    RestoreDeletedFeed,
}

/// A recorded remote call with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateFeed { name: String, project: Option<Uuid> },
    GetFeed(FeedScope),
    UpdateFeed(FeedScope),
    DeleteFeed(FeedScope),
    PermanentDeleteFeed(FeedScope),
    GetFeedChange(FeedScope),
    RestoreDeletedFeed {
        scope: FeedScope,
        patch: Vec<JsonPatchOperation>,
    },
}

impl RemoteCall {
    pub fn op(&self) -> RemoteOp {
        match self {
            RemoteCall::CreateFeed { .. } => RemoteOp::CreateFeed,
            RemoteCall::GetFeed(_) => RemoteOp::GetFeed,
            RemoteCall::UpdateFeed(_) => RemoteOp::UpdateFeed,
            RemoteCall::DeleteFeed(_) => RemoteOp::DeleteFeed,
            RemoteCall::PermanentDeleteFeed(_) => RemoteOp::PermanentDeleteFeed,
            RemoteCall::GetFeedChange(_) => RemoteOp::GetFeedChange,
            RemoteCall::RestoreDeletedFeed { .. } => RemoteOp::RestoreDeletedFeed,
        }
    }
}

struct StoredFeed {
    feed: Feed,
    last_change: ChangeType,
    continuation_token: i64,
}

impl StoredFeed {
    fn project(&self) -> Option<Uuid> {
        self.feed.project.as_ref().map(|p| p.id)
    }

    fn matches(&self, scope: &FeedScope) -> bool {
        if self.project() != scope.project {
            return false;
        }
        let by_name = self
            .feed
            .name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(&scope.feed_id));
        by_name || self.feed.id.to_string().eq_ignore_ascii_case(&scope.feed_id)
    }
}

#[derive(Default)]
struct Inner {
    feeds: Vec<StoredFeed>,
    calls: Vec<RemoteCall>,
    failures: HashMap<RemoteOp, (u16, String)>,
    continuation_token: i64,
    omit_project_reference: bool,
}

impl Inner {
    /// Record the call, then surface an injected failure if one is pending
    fn enter(&mut self, call: RemoteCall) -> Result<()> {
        let op = call.op();
        debug!(?op, "memory feed service call");
        self.calls.push(call);
        match self.failures.remove(&op) {
            Some((status, message)) => Err(Error::api(status, message)),
            None => Ok(()),
        }
    }

    fn position(&self, scope: &FeedScope, deleted: bool) -> Option<usize> {
        self.feeds
            .iter()
            .position(|f| f.feed.is_deleted == deleted && f.matches(scope))
    }

    fn record_change(&mut self, index: usize, change: ChangeType) {
        self.continuation_token += 1;
        let stored = &mut self.feeds[index];
        stored.last_change = change;
        stored.continuation_token = self.continuation_token;
    }

    fn response(&self, index: usize) -> Feed {
        let mut feed = self.feeds[index].feed.clone();
        if self.omit_project_reference {
            feed.project = None;
        }
        feed
    }
}

fn feed_not_found(scope: &FeedScope) -> Error {
    Error::api(404, format!("Feed {} does not exist", scope))
}

/// In-process implementation of [`FeedClient`]
#[derive(Default)]
pub struct MemoryFeedClient {
    inner: Mutex<Inner>,
}

impl MemoryFeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a feed directly in the recycle bin, as if it had been
    /// created and soft deleted earlier.
    pub fn seed_deleted_feed(&self, name: &str, project: Option<Uuid>) -> Uuid {
        let mut inner = self.inner.lock();
        let id = Uuid::new_v4();
        inner.feeds.push(StoredFeed {
            feed: Feed {
                id,
                name: Some(name.to_string()),
                project: project.map(|id| ProjectReference { id, name: None }),
                is_deleted: true,
                deleted_date: Some(Utc::now()),
            },
            last_change: ChangeType::AddOrUpdate,
            continuation_token: 0,
        });
        let index = inner.feeds.len() - 1;
        inner.record_change(index, ChangeType::Delete);
        id
    }

    /// Fail the next call of `op` with the given status
    pub fn fail_next(&self, op: RemoteOp, status: u16, message: impl Into<String>) {
        self.inner.lock().failures.insert(op, (status, message.into()));
    }

    /// Strip the nested project reference from feed responses
    pub fn set_omit_project_reference(&self, omit: bool) {
        self.inner.lock().omit_project_reference = omit;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    pub fn call_ops(&self) -> Vec<RemoteOp> {
        self.inner.lock().calls.iter().map(RemoteCall::op).collect()
    }

    pub fn count(&self, op: RemoteOp) -> usize {
        self.inner.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Look up a feed regardless of its deletion state
    pub fn feed(&self, scope: &FeedScope) -> Option<Feed> {
        let inner = self.inner.lock();
        inner
            .feeds
            .iter()
            .find(|f| f.matches(scope))
            .map(|f| f.feed.clone())
    }
}

#[async_trait]
impl FeedClient for MemoryFeedClient {
    async fn create_feed(&self, name: &str, project: Option<Uuid>) -> Result<Feed> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::CreateFeed {
            name: name.to_string(),
            project,
        })?;

        if name.trim().is_empty() {
            return Err(Error::api(400, "Feed name must not be empty"));
        }

        let scope = FeedScope::new(name, project);
        if inner.position(&scope, false).is_some() {
            return Err(Error::api(409, format!("Feed name {} is already in use", name)));
        }
        if inner.position(&scope, true).is_some() {
            return Err(Error::api(
                409,
                format!("Feed name {} is in use by a feed in the recycle bin", name),
            ));
        }

        inner.feeds.push(StoredFeed {
            feed: Feed {
                id: Uuid::new_v4(),
                name: Some(name.to_string()),
                project: project.map(|id| ProjectReference { id, name: None }),
                is_deleted: false,
                deleted_date: None,
            },
            last_change: ChangeType::AddOrUpdate,
            continuation_token: 0,
        });
        let index = inner.feeds.len() - 1;
        inner.record_change(index, ChangeType::AddOrUpdate);
        Ok(inner.response(index))
    }

    async fn get_feed(&self, scope: &FeedScope) -> Result<Feed> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::GetFeed(scope.clone()))?;

        let index = inner
            .position(scope, false)
            .ok_or_else(|| feed_not_found(scope))?;
        Ok(inner.response(index))
    }

    async fn update_feed(&self, _update: &FeedUpdate, scope: &FeedScope) -> Result<Feed> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::UpdateFeed(scope.clone()))?;

        let index = inner
            .position(scope, false)
            .ok_or_else(|| feed_not_found(scope))?;
        inner.record_change(index, ChangeType::AddOrUpdate);
        Ok(inner.response(index))
    }

    async fn delete_feed(&self, scope: &FeedScope) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::DeleteFeed(scope.clone()))?;

        let index = inner
            .position(scope, false)
            .ok_or_else(|| feed_not_found(scope))?;
        {
            let feed = &mut inner.feeds[index].feed;
            feed.is_deleted = true;
            feed.deleted_date = Some(Utc::now());
        }
        inner.record_change(index, ChangeType::Delete);
        Ok(())
    }

    async fn permanent_delete_feed(&self, scope: &FeedScope) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::PermanentDeleteFeed(scope.clone()))?;

        match inner.position(scope, true) {
            Some(index) => {
                inner.feeds.remove(index);
                Ok(())
            }
            None if inner.position(scope, false).is_some() => Err(Error::api(
                400,
                format!("Feed {} must be deleted before it can be purged", scope),
            )),
            None => Err(feed_not_found(scope)),
        }
    }

    async fn get_feed_change(&self, scope: &FeedScope) -> Result<FeedChange> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::GetFeedChange(scope.clone()))?;

        let index = inner
            .position(scope, false)
            .or_else(|| inner.position(scope, true))
            .ok_or_else(|| feed_not_found(scope))?;
        let stored = &inner.feeds[index];
        Ok(FeedChange {
            change_type: stored.last_change,
            feed: Some(inner.response(index)),
            feed_continuation_token: stored.continuation_token,
        })
    }

    async fn restore_deleted_feed(
        &self,
        scope: &FeedScope,
        patch: &[JsonPatchOperation],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.enter(RemoteCall::RestoreDeletedFeed {
            scope: scope.clone(),
            patch: patch.to_vec(),
        })?;

        let index = inner
            .position(scope, true)
            .ok_or_else(|| feed_not_found(scope))?;

        let restores = matches!(
            patch,
            [op] if op.op == PatchOp::Replace
                && op.path == "/isDeleted"
                && op.value == serde_json::Value::Bool(false)
        );
        if !restores {
            return Err(Error::api(
                400,
                "Restore patch must replace /isDeleted with false",
            ));
        }

        {
            let feed = &mut inner.feeds[index].feed;
            feed.is_deleted = false;
            feed.deleted_date = None;
        }
        inner.record_change(index, ChangeType::AddOrUpdate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Uuid {
        Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
    }

    fn restore_patch() -> Vec<JsonPatchOperation> {
        vec![JsonPatchOperation::replace(
            "/isDeleted",
            serde_json::Value::Bool(false),
        )]
    }

    #[tokio::test]
    async fn test_create_get() {
        let client = MemoryFeedClient::new();
        let created = client.create_feed("pkgs", Some(project())).await.unwrap();

        let fetched = client
            .get_feed(&FeedScope::new("PKGS", Some(project())))
            .await
            .unwrap();
        assert_eq!(created.id, fetched.id);

        let by_id = client
            .get_feed(&FeedScope::new(created.id.to_string(), Some(project())))
            .await
            .unwrap();
        assert_eq!(by_id.name.as_deref(), Some("pkgs"));
    }

    #[tokio::test]
    async fn test_scopes_are_separate() {
        let client = MemoryFeedClient::new();
        client.create_feed("pkgs", Some(project())).await.unwrap();

        let err = client.get_feed(&FeedScope::new("pkgs", None)).await.unwrap_err();
        assert!(err.is_not_found());

        // Same name in the organization scope is allowed
        client.create_feed("pkgs", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let client = MemoryFeedClient::new();
        client.create_feed("pkgs", None).await.unwrap();

        let err = client.create_feed("pkgs", None).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_restore() {
        let client = MemoryFeedClient::new();
        let scope = FeedScope::new("pkgs", None);
        client.create_feed("pkgs", None).await.unwrap();
        client.delete_feed(&scope).await.unwrap();

        assert!(client.get_feed(&scope).await.unwrap_err().is_not_found());
        let change = client.get_feed_change(&scope).await.unwrap();
        assert_eq!(change.change_type, ChangeType::Delete);

        // Recycle bin still holds the name
        let err = client.create_feed("pkgs", None).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 409, .. }));

        client.restore_deleted_feed(&scope, &restore_patch()).await.unwrap();
        let feed = client.get_feed(&scope).await.unwrap();
        assert!(!feed.is_deleted);
        assert_eq!(
            client.get_feed_change(&scope).await.unwrap().change_type,
            ChangeType::AddOrUpdate
        );
    }

    #[tokio::test]
    async fn test_restore_rejects_other_patches() {
        let client = MemoryFeedClient::new();
        let scope = FeedScope::new("pkgs", None);
        client.seed_deleted_feed("pkgs", None);

        let patch = vec![JsonPatchOperation::replace(
            "/name",
            serde_json::Value::String("other".to_string()),
        )];
        let err = client.restore_deleted_feed(&scope, &patch).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 400, .. }));
        assert!(client.feed(&scope).unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_permanent_delete_forgets_history() {
        let client = MemoryFeedClient::new();
        let scope = FeedScope::new("pkgs", None);
        client.create_feed("pkgs", None).await.unwrap();

        let err = client.permanent_delete_feed(&scope).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 400, .. }));

        client.delete_feed(&scope).await.unwrap();
        client.permanent_delete_feed(&scope).await.unwrap();

        assert!(client.feed(&scope).is_none());
        assert!(client.get_feed_change(&scope).await.unwrap_err().is_not_found());
        client.create_feed("pkgs", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let client = MemoryFeedClient::new();
        client.fail_next(RemoteOp::CreateFeed, 503, "service unavailable");

        let err = client.create_feed("pkgs", None).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 503, .. }));
        client.create_feed("pkgs", None).await.unwrap();

        assert_eq!(client.count(RemoteOp::CreateFeed), 2);
    }

    #[tokio::test]
    async fn test_change_tokens_increase() {
        let client = MemoryFeedClient::new();
        let scope = FeedScope::new("pkgs", None);
        client.create_feed("pkgs", None).await.unwrap();
        let first = client.get_feed_change(&scope).await.unwrap();

        client.update_feed(&FeedUpdate::default(), &scope).await.unwrap();
        let second = client.get_feed_change(&scope).await.unwrap();
        assert!(second.feed_continuation_token > first.feed_continuation_token);
    }
}
