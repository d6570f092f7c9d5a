//! Feed Provider Implementation
//!
//! Framework-facing entry points: schema, validation, planning, apply and
//! refresh. Resource failures are reported as diagnostics; only requests
//! for unknown resource types are errors.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use feedform_common::{Error, ProviderConfig, Result};

use crate::client::FeedClient;
use crate::resources::{feed::FeedResource, Resource};
use crate::schema::{Diagnostic, ResourceSchema, Severity, FEED_TYPE_NAME};
use crate::state::{get_string_attr, DynamicValue};

/// Result of planning a resource change
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResponse {
    /// Proposed state with defaults filled; `id` is null when a new remote
    /// object will be created
    pub planned_state: DynamicValue,
    /// Attributes whose change forces destroy and re-create
    pub requires_replace: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of applying a resource change
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResponse {
    /// `None` once the resource is gone or was never created; a failed
    /// update or delete keeps the prior state
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of refreshing a resource
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    /// `None` when the remote object no longer exists
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Feed provider
pub struct FeedProvider<C: ?Sized> {
    config: ProviderConfig,
    feeds: FeedResource<C>,
}

impl<C: FeedClient + ?Sized> FeedProvider<C> {
    /// Build the provider around an already configured feed client
    pub fn new(config: ProviderConfig, client: Arc<C>) -> Result<Self> {
        config.validate()?;
        info!(
            organization = config.organization_url.as_deref().unwrap_or("<unset>"),
            "Feed provider configured"
        );
        Ok(Self {
            config,
            feeds: FeedResource::new(client),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn resource_schemas(&self) -> Vec<(&'static str, ResourceSchema)> {
        vec![(self.feeds.type_name(), self.feeds.schema())]
    }

    fn resource(&self, type_name: &str) -> Result<&FeedResource<C>> {
        match type_name {
            FEED_TYPE_NAME => Ok(&self.feeds),
            _ => Err(Error::UnknownResource(type_name.to_string())),
        }
    }

    pub fn validate_resource_config(
        &self,
        type_name: &str,
        config: &DynamicValue,
    ) -> Result<Vec<Diagnostic>> {
        debug!("ValidateResourceConfig called for {}", type_name);
        let resource = self.resource(type_name)?;
        Ok(resource.schema().validate(config))
    }

    pub fn plan_resource_change(
        &self,
        type_name: &str,
        prior: &DynamicValue,
        proposed: &DynamicValue,
    ) -> Result<PlanResponse> {
        debug!("PlanResourceChange called for {}", type_name);
        let schema = self.resource(type_name)?.schema();

        // Destroy
        if proposed.is_null() {
            return Ok(PlanResponse {
                planned_state: DynamicValue::Null,
                requires_replace: vec![],
                diagnostics: vec![],
            });
        }

        let diagnostics = schema.validate(proposed);
        if has_errors(&diagnostics) {
            return Ok(PlanResponse {
                planned_state: proposed.clone(),
                requires_replace: vec![],
                diagnostics,
            });
        }

        let mut planned = schema.apply_defaults(proposed);
        let requires_replace = if prior.is_null() {
            vec![]
        } else {
            schema.requires_replace(prior, &planned)
        };

        // The id is only known up front when the same remote object is kept
        let id = if prior.is_null() || !requires_replace.is_empty() {
            DynamicValue::Null
        } else {
            prior.get("id").cloned().unwrap_or_default()
        };
        if let DynamicValue::Map(map) = &mut planned {
            map.insert("id".to_string(), id);
        }

        Ok(PlanResponse {
            planned_state: planned,
            requires_replace,
            diagnostics,
        })
    }

    pub async fn apply_resource_change(
        &self,
        type_name: &str,
        prior: &DynamicValue,
        planned: &DynamicValue,
        cancel: &CancellationToken,
    ) -> Result<ApplyResponse> {
        info!("ApplyResourceChange called for {}", type_name);
        let resource = self.resource(type_name)?;

        let result = match (prior.is_null(), planned.is_null()) {
            // Create
            (true, false) => resource.create(planned, cancel).await.map(Some),
            // Delete
            (false, true) => resource.delete(prior, cancel).await.map(|_| None),
            // Update
            (false, false) => resource.update(prior, planned, cancel).await.map(Some),
            // No change
            (true, true) => Ok(None),
        };

        match result {
            Ok(new_state) => Ok(ApplyResponse {
                new_state,
                diagnostics: vec![],
            }),
            Err(e) => {
                error!(
                    "Failed to apply {} {}: {}",
                    type_name,
                    get_string_attr(if planned.is_null() { prior } else { planned }, "name"),
                    e
                );
                // A failed create leaves nothing behind; otherwise the prior object
                // may still exist remotely and must stay tracked.
                let new_state = if prior.is_null() {
                    None
                } else {
                    Some(prior.clone())
                };
                Ok(ApplyResponse {
                    new_state,
                    diagnostics: vec![Diagnostic::error(
                        "Failed to apply resource change",
                        e.to_string(),
                    )],
                })
            }
        }
    }

    pub async fn read_resource(
        &self,
        type_name: &str,
        current: &DynamicValue,
        cancel: &CancellationToken,
    ) -> Result<ReadResponse> {
        info!("ReadResource called for {}", type_name);
        let resource = self.resource(type_name)?;

        if current.is_null() {
            return Ok(ReadResponse {
                new_state: None,
                diagnostics: vec![],
            });
        }

        match resource.read(current, cancel).await {
            Ok(state) if get_string_attr(&state, "id").is_empty() => {
                info!(
                    "{} {} no longer exists, removing from state",
                    type_name,
                    get_string_attr(current, "name")
                );
                Ok(ReadResponse {
                    new_state: None,
                    diagnostics: vec![],
                })
            }
            Ok(state) => Ok(ReadResponse {
                new_state: Some(state),
                diagnostics: vec![],
            }),
            // Keep tracking the object; the failure says nothing about its existence
            Err(e) => Ok(ReadResponse {
                new_state: Some(current.clone()),
                diagnostics: vec![Diagnostic::error("Failed to read resource", e.to_string())],
            }),
        }
    }
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{MemoryFeedClient, RemoteOp};
    use crate::state::{bool_value, list_value, make_state, null_value, string_value};

    const PROJECT: &str = "11111111-1111-1111-1111-111111111111";

    fn provider() -> (Arc<MemoryFeedClient>, FeedProvider<MemoryFeedClient>) {
        let client = Arc::new(MemoryFeedClient::new());
        let provider = FeedProvider::new(ProviderConfig::default(), client.clone()).unwrap();
        (client, provider)
    }

    fn config(name: &str) -> DynamicValue {
        make_state(vec![
            ("name", string_value(name)),
            ("project_id", string_value(PROJECT)),
        ])
    }

    #[test]
    fn test_unknown_resource_type() {
        let (_client, provider) = provider();
        let err = provider
            .validate_resource_config("feedform_view", &config("pkgs"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource(_)));
    }

    #[test]
    fn test_rejects_invalid_provider_config() {
        let config = ProviderConfig {
            organization_url: Some("ftp://example".to_string()),
            ..Default::default()
        };
        assert!(FeedProvider::new(config, Arc::new(MemoryFeedClient::new())).is_err());
    }

    #[test]
    fn test_plan_create_leaves_id_unknown() {
        let (_client, provider) = provider();
        let proposed = make_state(vec![
            ("name", string_value("pkgs")),
            ("features", list_value(vec![make_state(vec![])])),
        ]);

        let plan = provider
            .plan_resource_change(FEED_TYPE_NAME, &null_value(), &proposed)
            .unwrap();
        assert!(plan.diagnostics.is_empty());
        assert!(plan.planned_state.get("id").unwrap().is_null());

        let features = crate::state::get_block(&plan.planned_state, "features").unwrap();
        assert_eq!(features.get("restore"), Some(&bool_value(false)));
    }

    #[test]
    fn test_plan_rename_requires_replace() {
        let (_client, provider) = provider();
        let mut prior = config("pkgs");
        if let DynamicValue::Map(map) = &mut prior {
            map.insert("id".to_string(), string_value("0b0c7b5e-3c2c-4f7a-9a0e-6f4a8d3f2a11"));
        }

        let plan = provider
            .plan_resource_change(FEED_TYPE_NAME, &prior, &config("pkgs-v2"))
            .unwrap();
        assert_eq!(plan.requires_replace, vec!["name"]);
        assert!(plan.planned_state.get("id").unwrap().is_null());

        let plan = provider
            .plan_resource_change(FEED_TYPE_NAME, &prior, &config("pkgs"))
            .unwrap();
        assert!(plan.requires_replace.is_empty());
        assert_eq!(
            get_string_attr(&plan.planned_state, "id"),
            "0b0c7b5e-3c2c-4f7a-9a0e-6f4a8d3f2a11"
        );
    }

    #[test]
    fn test_plan_reports_invalid_config() {
        let (_client, provider) = provider();
        let plan = provider
            .plan_resource_change(FEED_TYPE_NAME, &null_value(), &config("  "))
            .unwrap();
        assert!(has_errors(&plan.diagnostics));
    }

    #[tokio::test]
    async fn test_apply_create_failure_becomes_diagnostic() {
        let (client, provider) = provider();
        client.fail_next(RemoteOp::CreateFeed, 409, "conflict");

        let response = provider
            .apply_resource_change(
                FEED_TYPE_NAME,
                &null_value(),
                &config("pkgs"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(response.new_state.is_none());
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("Name: pkgs"));
    }

    #[tokio::test]
    async fn test_failed_purge_keeps_prior_state() {
        let (client, provider) = provider();
        let cancel = CancellationToken::new();
        let mut config = config("pkgs");
        if let DynamicValue::Map(map) = &mut config {
            map.insert(
                "features".to_string(),
                list_value(vec![make_state(vec![("permanent_delete", bool_value(true))])]),
            );
        }
        let prior = provider
            .apply_resource_change(FEED_TYPE_NAME, &null_value(), &config, &cancel)
            .await
            .unwrap()
            .new_state
            .unwrap();
        client.fail_next(RemoteOp::PermanentDeleteFeed, 500, "boom");

        let response = provider
            .apply_resource_change(FEED_TYPE_NAME, &prior, &null_value(), &cancel)
            .await
            .unwrap();

        assert_eq!(response.new_state, Some(prior));
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(client.count(RemoteOp::DeleteFeed), 1);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_prior_state() {
        let (client, provider) = provider();
        let cancel = CancellationToken::new();
        let prior = provider
            .apply_resource_change(FEED_TYPE_NAME, &null_value(), &config("pkgs"), &cancel)
            .await
            .unwrap()
            .new_state
            .unwrap();
        client.fail_next(RemoteOp::UpdateFeed, 500, "boom");

        let response = provider
            .apply_resource_change(FEED_TYPE_NAME, &prior, &config("pkgs"), &cancel)
            .await
            .unwrap();

        assert_eq!(response.new_state, Some(prior));
        assert!(has_errors(&response.diagnostics));
    }

    #[tokio::test]
    async fn test_read_failure_keeps_state() {
        let (client, provider) = provider();
        client.fail_next(RemoteOp::GetFeed, 500, "internal");
        let current = config("pkgs");

        let response = provider
            .read_resource(FEED_TYPE_NAME, &current, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.new_state, Some(current));
        assert!(has_errors(&response.diagnostics));
    }
}
