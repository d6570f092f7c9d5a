//! Feed resource
//!
//! Reconciles a declarative feed against the remote feed service. Feeds
//! are soft deleted by the service; with `features.restore` a feed found
//! in the recycle bin is restored instead of created, and with
//! `features.permanent_delete` deletion also purges it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use feedform_common::{
    ChangeType, Error, Feed, FeedScope, FeedUpdate, JsonPatchOperation, Result,
};

use super::Resource;
use crate::client::FeedClient;
use crate::schema::{feed_schema, ResourceSchema, FEED_TYPE_NAME};
use crate::state::{
    get_block, get_bool_attr, get_optional_string_attr, get_string_attr, list_value, make_state,
    optional_string_value, string_value, DynamicValue,
};

/// Client-side directives of the `features` block.
///
/// These never reach the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedFeatures {
    /// Purge the feed from the recycle bin after deleting it
    pub permanent_delete: bool,
    /// Restore a soft-deleted feed of the same name instead of creating one
    pub restore: bool,
}

impl FeedFeatures {
    pub fn from_value(value: &DynamicValue) -> Self {
        match get_block(value, "features") {
            Some(block) => Self {
                permanent_delete: get_bool_attr(block, "permanent_delete", false),
                restore: get_bool_attr(block, "restore", false),
            },
            None => Self::default(),
        }
    }
}

/// Desired feed, decoded from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSpec {
    pub name: String,
    pub project_id: Option<Uuid>,
    pub features: FeedFeatures,
}

impl FeedSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_id: None,
            features: FeedFeatures::default(),
        }
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_features(mut self, features: FeedFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn from_value(value: &DynamicValue) -> Result<Self> {
        let name = get_string_attr(value, "name");
        if name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "feed name must not be empty or whitespace".to_string(),
            ));
        }

        let project_id = get_optional_string_attr(value, "project_id")
            .map(|raw| {
                Uuid::parse_str(&raw).map_err(|e| {
                    Error::InvalidConfig(format!("project_id {:?} is not a UUID: {}", raw, e))
                })
            })
            .transpose()?;

        Ok(Self {
            name,
            project_id,
            features: FeedFeatures::from_value(value),
        })
    }

    pub fn scope(&self) -> FeedScope {
        FeedScope::new(self.name.clone(), self.project_id)
    }
}

/// Observed feed. An empty `id` means no remote feed exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    pub id: String,
    pub name: String,
    pub project_id: Option<Uuid>,
}

impl FeedState {
    /// Identity fields of the spec with no remote id yet
    pub fn from_spec(spec: &FeedSpec) -> Self {
        Self {
            id: String::new(),
            name: spec.name.clone(),
            project_id: spec.project_id,
        }
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    fn absorb(&mut self, feed: &Feed) {
        self.id = feed.id.to_string();
        if let Some(name) = &feed.name {
            self.name = name.clone();
        }
        if let Some(project) = &feed.project {
            self.project_id = Some(project.id);
        }
    }

    /// Declarative state, carrying the configured `features` block through
    pub fn to_value(&self, features: DynamicValue) -> DynamicValue {
        make_state(vec![
            ("id", string_value(&self.id)),
            ("name", string_value(&self.name)),
            (
                "project_id",
                optional_string_value(self.project_id.map(|p| p.to_string())),
            ),
            ("features", features),
        ])
    }
}

/// Lifecycle adapter between feed specs and the remote feed service
pub struct FeedResource<C: ?Sized> {
    client: Arc<C>,
}

impl<C: FeedClient + ?Sized> FeedResource<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Create the feed, or restore it from the recycle bin when asked to
    pub async fn create_feed(
        &self,
        spec: &FeedSpec,
        cancel: &CancellationToken,
    ) -> Result<FeedState> {
        if spec.features.restore && self.is_restorable(spec, cancel).await {
            info!(feed = %spec.name, project = ?spec.project_id, "Restoring soft-deleted feed");
            self.restore(spec, cancel).await.map_err(|e| {
                wrap_unless_cancelled(e, |source| Error::RestoreFailed {
                    name: spec.name.clone(),
                    source,
                })
            })?;
            return self.read_feed(spec, cancel).await;
        }

        info!(feed = %spec.name, project = ?spec.project_id, "Creating feed");
        guarded(
            cancel,
            "create_feed",
            self.client.create_feed(&spec.name, spec.project_id),
        )
        .await
        .map_err(|e| {
            wrap_unless_cancelled(e, |source| Error::CreateFailed {
                name: spec.name.clone(),
                source,
            })
        })?;

        self.read_feed(spec, cancel).await
    }

    /// Fetch the authoritative state. A missing feed yields a state with an
    /// empty id rather than an error.
    pub async fn read_feed(
        &self,
        spec: &FeedSpec,
        cancel: &CancellationToken,
    ) -> Result<FeedState> {
        let mut state = FeedState::from_spec(spec);

        match guarded(cancel, "get_feed", self.client.get_feed(&spec.scope())).await {
            Ok(feed) => state.absorb(&feed),
            Err(e) if e.is_not_found() => {
                debug!(feed = %spec.name, "Feed not found, clearing id");
            }
            Err(e) => {
                return Err(wrap_unless_cancelled(e, |source| Error::ReadFailed { source }));
            }
        }

        Ok(state)
    }

    /// Send an empty update, then re-read
    pub async fn update_feed(
        &self,
        spec: &FeedSpec,
        cancel: &CancellationToken,
    ) -> Result<FeedState> {
        debug!(feed = %spec.name, "Updating feed");
        // No feed property is mutable in place yet; name and project force replacement.
        let update = FeedUpdate::default();
        guarded(
            cancel,
            "update_feed",
            self.client.update_feed(&update, &spec.scope()),
        )
        .await?;

        self.read_feed(spec, cancel).await
    }

    /// Soft delete the feed, purging it as well when `permanent_delete` is set.
    ///
    /// If the purge fails the feed stays in the recycle bin; the error is
    /// returned unchanged.
    pub async fn delete_feed(&self, spec: &FeedSpec, cancel: &CancellationToken) -> Result<()> {
        let scope = spec.scope();

        info!(feed = %spec.name, project = ?spec.project_id, "Deleting feed");
        guarded(cancel, "delete_feed", self.client.delete_feed(&scope)).await?;

        if spec.features.permanent_delete {
            info!(feed = %spec.name, "Permanently deleting feed");
            guarded(
                cancel,
                "permanent_delete_feed",
                self.client.permanent_delete_feed(&scope),
            )
            .await?;
        }

        Ok(())
    }

    /// Whether the most recent change of the feed is a soft delete.
    ///
    /// Any failure counts as not restorable.
    pub async fn is_restorable(&self, spec: &FeedSpec, cancel: &CancellationToken) -> bool {
        match guarded(
            cancel,
            "get_feed_change",
            self.client.get_feed_change(&spec.scope()),
        )
        .await
        {
            Ok(change) => change.change_type == ChangeType::Delete,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                warn!(
                    feed = %spec.name,
                    error = %e,
                    "Feed change lookup failed, treating feed as not restorable"
                );
                false
            }
        }
    }

    /// Flip `/isDeleted` back to false
    pub async fn restore(&self, spec: &FeedSpec, cancel: &CancellationToken) -> Result<()> {
        let patch = [JsonPatchOperation::replace(
            "/isDeleted",
            serde_json::Value::Bool(false),
        )];
        guarded(
            cancel,
            "restore_deleted_feed",
            self.client.restore_deleted_feed(&spec.scope(), &patch),
        )
        .await
    }
}

#[async_trait]
impl<C: FeedClient + ?Sized> Resource for FeedResource<C> {
    fn type_name(&self) -> &'static str {
        FEED_TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        feed_schema()
    }

    async fn create(
        &self,
        config: &DynamicValue,
        cancel: &CancellationToken,
    ) -> Result<DynamicValue> {
        let spec = FeedSpec::from_value(config)?;
        let state = self.create_feed(&spec, cancel).await?;
        Ok(state.to_value(features_of(config)))
    }

    async fn read(
        &self,
        state: &DynamicValue,
        cancel: &CancellationToken,
    ) -> Result<DynamicValue> {
        let spec = FeedSpec::from_value(state)?;
        let observed = self.read_feed(&spec, cancel).await?;
        Ok(observed.to_value(features_of(state)))
    }

    async fn update(
        &self,
        _state: &DynamicValue,
        config: &DynamicValue,
        cancel: &CancellationToken,
    ) -> Result<DynamicValue> {
        let spec = FeedSpec::from_value(config)?;
        let state = self.update_feed(&spec, cancel).await?;
        Ok(state.to_value(features_of(config)))
    }

    async fn delete(&self, state: &DynamicValue, cancel: &CancellationToken) -> Result<()> {
        let spec = FeedSpec::from_value(state)?;
        self.delete_feed(&spec, cancel).await
    }
}

/// The configured `features` block, or an empty list
fn features_of(value: &DynamicValue) -> DynamicValue {
    match value.get("features") {
        Some(features @ DynamicValue::List(_)) => features.clone(),
        _ => list_value(vec![]),
    }
}

/// Run a remote call unless `cancel` fires first
async fn guarded<T, F>(cancel: &CancellationToken, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::cancelled(operation));
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = call => result,
    }
}

fn wrap_unless_cancelled(error: Error, wrap: impl FnOnce(Box<Error>) -> Error) -> Error {
    if error.is_cancelled() {
        error
    } else {
        wrap(Box::new(error))
    }
}
