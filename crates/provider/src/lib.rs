//! feedform Feed Provider
//!
//! Declarative lifecycle management for package feeds: the feed resource
//! adapter, its schema, and the provider entry points that drive it.
//! The remote service is reached through a [`client::FeedClient`]
//! supplied by the embedder.

pub mod client;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod state;

pub use client::{FeedClient, MemoryFeedClient};
pub use provider::{ApplyResponse, FeedProvider, PlanResponse, ReadResponse};
pub use resources::feed::{FeedFeatures, FeedResource, FeedSpec, FeedState};
pub use resources::Resource;
