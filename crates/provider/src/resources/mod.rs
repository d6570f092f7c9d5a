//! Resource Implementations
//!
//! Implements the CRUD operations for each resource type.

pub mod feed;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use feedform_common::Result;

use crate::schema::ResourceSchema;
use crate::state::DynamicValue;

/// Trait for resource operations over declarative values
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Create a new resource from its configuration
    async fn create(&self, config: &DynamicValue, cancel: &CancellationToken)
        -> Result<DynamicValue>;

    /// Read an existing resource; an empty `id` in the result means it is gone
    async fn read(&self, state: &DynamicValue, cancel: &CancellationToken) -> Result<DynamicValue>;

    /// Update an existing resource
    async fn update(
        &self,
        state: &DynamicValue,
        config: &DynamicValue,
        cancel: &CancellationToken,
    ) -> Result<DynamicValue>;

    /// Delete a resource
    async fn delete(&self, state: &DynamicValue, cancel: &CancellationToken) -> Result<()>;
}
