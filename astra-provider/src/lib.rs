//! DataStax Astra Provider
//!
//! Manages Astra databases, keyspaces, access lists, CDC streams, streaming
//! tenants and topics, and PCU group associations through the Astra DevOps,
//! Streaming and Pulsar admin APIs.
//!
//! ## Module Structure
//!
//! - `client` - Shared HTTP client and API error classification
//! - `config` - Provider configuration from environment or a provider block
//! - `devops` / `streaming` - Typed clients per API family
//! - `probes` - Status probes for the convergence loop
//! - `resources` - Per-resource-type schemas and lifecycle handlers
//! - `provider` - AstraProvider dispatching lifecycle calls to resources

pub mod client;
pub mod config;
pub mod devops;
pub mod id;
pub mod models;
pub mod probes;
pub mod provider;
pub mod resources;
pub mod streaming;
pub mod validation;

// Re-export main types
pub use client::ApiError;
pub use config::{ConfigError, ProviderConfig};
pub use provider::AstraProvider;

use astra_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use astra_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AstraProvider {
    fn name(&self) -> &'static str {
        "astra"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }
}
