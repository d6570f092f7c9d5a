//! Client contract for the remote feed service
//!
//! The adapter only ever talks to the feed sub-client, so this trait
//! carries exactly the calls the feed lifecycle needs. Transport and
//! authentication belong to the implementor.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use feedform_common::{Feed, FeedChange, FeedScope, FeedUpdate, JsonPatchOperation, Result};

pub use memory::MemoryFeedClient;

/// Remote feed lifecycle operations
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Create a feed in the organization or in `project`
    async fn create_feed(&self, name: &str, project: Option<Uuid>) -> Result<Feed>;

    /// Fetch an active feed; absent feeds yield a not-found error
    async fn get_feed(&self, scope: &FeedScope) -> Result<Feed>;

    async fn update_feed(&self, update: &FeedUpdate, scope: &FeedScope) -> Result<Feed>;

    /// Soft delete: the feed moves to the recycle bin
    async fn delete_feed(&self, scope: &FeedScope) -> Result<()>;

    /// Purge a feed from the recycle bin
    async fn permanent_delete_feed(&self, scope: &FeedScope) -> Result<()>;

    /// Most recent change recorded for the feed
    async fn get_feed_change(&self, scope: &FeedScope) -> Result<FeedChange>;

    async fn restore_deleted_feed(
        &self,
        scope: &FeedScope,
        patch: &[JsonPatchOperation],
    ) -> Result<()>;
}
