//! Astra provider implementation
//!
//! Owns one API client per Astra API family and dispatches lifecycle calls to
//! the per-resource adapters in [`crate::resources`].

use std::collections::HashMap;

use astra_core::convergence::{ConvergeError, ConvergenceTarget, Converged, StatusProbe};
use astra_core::provider::{ProviderError, ProviderResult};
use astra_core::resource::{Resource, ResourceId, State};
use astra_core::schema::ResourceSchema;
use log::info;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::{ApiClient, ApiError};
use crate::config::{ProviderConfig, WaitSettings};
use crate::devops::DevOpsClient;
use crate::resources::{self, access_list, cdc, database, keyspace, pcu_association};
use crate::resources::{streaming_tenant, streaming_topic};
use crate::streaming::{PulsarAdminClient, StreamingClient};

/// Attach a resource and a context message to lower-level errors
pub(crate) trait ResultExt<T> {
    fn context_for(self, id: &ResourceId, context: &str) -> ProviderResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_for(self, id: &ResourceId, context: &str) -> ProviderResult<T> {
        self.map_err(|e| ProviderError::from_cause(context, e).for_resource(id.clone()))
    }
}

/// Wait budget for one lifecycle operation
///
/// Every wait of the operation polls at the configured interval and stops at
/// the same deadline, so an operation with several waits stays within one
/// configured timeout.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    settings: WaitSettings,
    deadline: Option<Instant>,
}

impl Budget {
    /// Start the clock for an operation
    pub fn start(settings: WaitSettings) -> Self {
        Self {
            settings,
            deadline: Instant::now().checked_add(settings.timeout),
        }
    }
}

/// DataStax Astra provider
pub struct AstraProvider {
    pub(crate) devops: DevOpsClient,
    pub(crate) streaming: StreamingClient,
    pub(crate) pulsar: PulsarAdminClient,
    config: ProviderConfig,
    org_id: OnceCell<String>,
    cancel: CancellationToken,
    schemas: HashMap<String, ResourceSchema>,
}

impl AstraProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ApiError> {
        let client = |base_url: &str| {
            ApiClient::new(
                base_url,
                &config.token,
                &config.user_agent,
                config.request_timeout,
            )
        };

        Ok(Self {
            devops: DevOpsClient::new(client(&config.astra_api_url)?),
            streaming: StreamingClient::new(client(&config.streaming_api_url)?),
            pulsar: PulsarAdminClient::new(client(&config.pulsar_admin_url)?),
            org_id: OnceCell::new(),
            cancel: CancellationToken::new(),
            schemas: resources::schemas(),
            config,
        })
    }

    /// Abort in-flight waits when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn schemas(&self) -> &HashMap<String, ResourceSchema> {
        &self.schemas
    }

    /// Organization id from config, or looked up once from the token
    pub(crate) async fn org_id(&self) -> Result<&str, ApiError> {
        if let Some(org_id) = &self.config.org_id {
            return Ok(org_id.as_str());
        }
        let org_id = self
            .org_id
            .get_or_try_init(|| async { self.devops.current_org().await.map(|org| org.id) })
            .await?;
        Ok(org_id.as_str())
    }

    /// Build a target bounded by an operation's budget
    pub(crate) fn target<S: PartialEq + std::fmt::Display>(
        budget: Budget,
        success: impl IntoIterator<Item = S>,
        failure: impl IntoIterator<Item = S>,
    ) -> Result<ConvergenceTarget<S>, ConvergeError> {
        Ok(ConvergenceTarget::new(success, failure)?
            .with_interval(budget.settings.interval)
            .with_timeout(budget.settings.timeout)
            .with_deadline(budget.deadline))
    }

    /// Run a wait under this provider's cancellation token
    pub(crate) async fn wait<P: StatusProbe>(
        &self,
        target: &ConvergenceTarget<P::Status>,
        probe: &P,
    ) -> Result<Converged<P::Status, P::Payload>, ConvergeError> {
        target.wait(probe, Some(&self.cancel)).await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        match id.resource_type.as_str() {
            database::TYPE => database::read(self, id, identifier).await,
            keyspace::TYPE => keyspace::read(self, id, identifier).await,
            access_list::TYPE => access_list::read(self, id, identifier).await,
            cdc::TYPE => cdc::read(self, id, identifier).await,
            streaming_tenant::TYPE => streaming_tenant::read(self, id, identifier).await,
            streaming_topic::TYPE => streaming_topic::read(self, id, identifier).await,
            pcu_association::TYPE => pcu_association::read(self, id, identifier).await,
            other => Err(unknown_type(id, other)),
        }
    }

    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let resource = self.prepare(resource)?;
        info!("Creating {}", resource.id);

        match resource.id.resource_type.as_str() {
            database::TYPE => database::create(self, &resource).await,
            keyspace::TYPE => keyspace::create(self, &resource).await,
            access_list::TYPE => access_list::create(self, &resource).await,
            cdc::TYPE => cdc::create(self, &resource).await,
            streaming_tenant::TYPE => streaming_tenant::create(self, &resource).await,
            streaming_topic::TYPE => streaming_topic::create(self, &resource).await,
            pcu_association::TYPE => pcu_association::create(self, &resource).await,
            other => Err(unknown_type(&resource.id, other)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        info!("Updating {} ({})", id, identifier);

        match id.resource_type.as_str() {
            database::TYPE => database::update(self, id, identifier, from, to).await,
            access_list::TYPE => access_list::update(self, id, identifier, to).await,
            keyspace::TYPE
            | cdc::TYPE
            | streaming_tenant::TYPE
            | streaming_topic::TYPE
            | pcu_association::TYPE => Err(ProviderError::new(format!(
                "Update not supported for {}, delete and recreate",
                id.resource_type
            ))
            .for_resource(id.clone())),
            other => Err(unknown_type(id, other)),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        info!("Deleting {} ({})", id, identifier);

        match id.resource_type.as_str() {
            database::TYPE => database::delete(self, id, identifier).await,
            keyspace::TYPE => keyspace::delete(self, id, identifier).await,
            access_list::TYPE => access_list::delete(self, id, identifier).await,
            cdc::TYPE => cdc::delete(self, id, identifier).await,
            streaming_tenant::TYPE => streaming_tenant::delete(self, id, identifier).await,
            streaming_topic::TYPE => streaming_topic::delete(self, id, identifier).await,
            pcu_association::TYPE => pcu_association::delete(self, id, identifier).await,
            other => Err(unknown_type(id, other)),
        }
    }

    /// Apply schema defaults and reject invalid attributes before any remote call
    fn prepare(&self, mut resource: Resource) -> ProviderResult<Resource> {
        let schema = self
            .schemas
            .get(&resource.id.resource_type)
            .ok_or_else(|| unknown_type(&resource.id, &resource.id.resource_type))?;

        schema.apply_defaults(&mut resource.attributes);
        schema.validate(&resource.attributes).map_err(|errors| {
            let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ProviderError::new(format!("Invalid attributes: {}", details.join("; ")))
                .for_resource(resource.id.clone())
        })?;
        Ok(resource)
    }
}

fn unknown_type(id: &ResourceId, resource_type: &str) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", resource_type)).for_resource(id.clone())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use wiremock::MockServer;

    use super::*;

    /// Provider pointed at a mock server with millisecond waits
    pub(crate) fn provider(server: &MockServer) -> AstraProvider {
        provider_with(server, |_| {})
    }

    pub(crate) fn provider_with(
        server: &MockServer,
        customize: impl FnOnce(&mut ProviderConfig),
    ) -> AstraProvider {
        let mut config = ProviderConfig::new("AstraCS:test");
        config.astra_api_url = server.uri();
        config.streaming_api_url = server.uri();
        config.pulsar_admin_url = server.uri();
        config.org_id = Some("org-1".to_string());

        let fast = WaitSettings {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        };
        let waits = &mut config.waits;
        waits.database_create = fast;
        waits.database_update = fast;
        waits.database_delete = fast;
        waits.keyspace = fast;
        waits.cdc_create = fast;
        waits.pcu_association = fast;
        waits.streaming_tenant = fast;

        customize(&mut config);
        AstraProvider::new(config).unwrap()
    }
}
