//! Astra Streaming tenant
//!
//! The tenant name is the identifier. Its Pulsar cluster is chosen by Astra
//! from the cloud and region unless given, and CDC streams and topics look it
//! up from here to route their requests.

use std::collections::HashMap;

use astra_core::convergence::NotFoundPolicy;
use astra_core::provider::ProviderResult;
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use log::info;

use super::{ignore_not_found, insert_opt, required_str};
use crate::client::ApiError;
use crate::models::{CreateTenantRequest, StreamingTenant};
use crate::probes::{TENANT_AVAILABLE, TenantProbe};
use crate::provider::{AstraProvider, Budget, ResultExt};
use crate::validation;

pub const TYPE: &str = "streaming_tenant";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE)
        .with_description("Astra Streaming (Pulsar) tenant")
        .attribute(
            AttributeSchema::new("tenant_name", validation::tenant_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "cloud_provider",
                AttributeType::Enum(vec!["aws".into(), "gcp".into(), "azure".into()]),
            )
            .required()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .required()
                .force_new()
                .with_provider_name("cloudRegion"),
        )
        .attribute(
            AttributeSchema::new("user_email", AttributeType::String)
                .required()
                .force_new()
                .write_only(),
        )
        .attribute(
            AttributeSchema::new("cluster_name", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("broker_service_url", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("web_service_url", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
}

/// Pulsar cluster hosting `tenant`, or `None` when the tenant does not exist
pub(crate) async fn tenant_cluster(
    provider: &AstraProvider,
    tenant: &str,
) -> Result<Option<String>, ApiError> {
    let org_id = provider.org_id().await?;
    Ok(provider
        .streaming
        .get_tenant(org_id, tenant)
        .await?
        .map(|t| t.cluster_name))
}

fn tenant_state(id: &ResourceId, tenant: &StreamingTenant) -> State {
    let mut attributes = HashMap::new();
    attributes.insert(
        "tenant_name".to_string(),
        Value::from(tenant.tenant_name.as_str()),
    );
    attributes.insert(
        "cloud_provider".to_string(),
        Value::from(tenant.cloud_provider.to_lowercase()),
    );
    insert_opt(&mut attributes, "region", Some(tenant.cloud_region.as_str()));
    insert_opt(&mut attributes, "cluster_name", Some(tenant.cluster_name.as_str()));
    insert_opt(&mut attributes, "user_email", tenant.user_email.as_deref());
    insert_opt(&mut attributes, "broker_service_url", tenant.broker_service_url.as_deref());
    insert_opt(&mut attributes, "web_service_url", tenant.web_service_url.as_deref());
    insert_opt(&mut attributes, "status", tenant.status.as_deref());
    State::existing(id.clone(), attributes).with_identifier(tenant.tenant_name.as_str())
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let org_id = provider
        .org_id()
        .await
        .context_for(id, "Failed to resolve organization")?;
    let tenant = provider
        .streaming
        .get_tenant(org_id, identifier)
        .await
        .context_for(id, "Failed to read streaming tenant")?;

    Ok(match tenant {
        Some(tenant) => tenant_state(id, &tenant),
        None => State::not_found(id.clone()),
    })
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let org_id = provider
        .org_id()
        .await
        .context_for(id, "Failed to resolve organization")?;
    let tenant_name = required_str(resource, "tenant_name")?;

    let request = CreateTenantRequest {
        org_id: org_id.to_string(),
        tenant_name: tenant_name.to_string(),
        cloud_provider: required_str(resource, "cloud_provider")?.to_string(),
        cloud_region: required_str(resource, "region")?.to_string(),
        cluster_name: resource.get_str("cluster_name").map(str::to_string),
        user_email: required_str(resource, "user_email")?.to_string(),
    };
    provider
        .streaming
        .create_tenant(&request)
        .await
        .context_for(id, "Failed to create streaming tenant")?;
    info!("Streaming tenant {} requested", tenant_name);

    // The tenant shows up in reads shortly after the create call returns
    let probe = TenantProbe::new(&provider.streaming, org_id, tenant_name);
    let target = AstraProvider::target(
        Budget::start(provider.config().waits.streaming_tenant),
        [TENANT_AVAILABLE],
        [],
    )
    .context_for(id, "Invalid wait")?
    .on_not_found(NotFoundPolicy::Retry);

    let tenant = provider
        .wait(&target, &probe)
        .await
        .context_for(id, "Streaming tenant did not become available")
        .map_err(|e| e.with_identifier(tenant_name))?
        .into_payload();

    Ok(match tenant {
        Some(tenant) => tenant_state(id, &tenant),
        None => State::not_found(id.clone()),
    })
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let org_id = provider
        .org_id()
        .await
        .context_for(id, "Failed to resolve organization")?;
    let Some(tenant) = provider
        .streaming
        .get_tenant(org_id, identifier)
        .await
        .context_for(id, "Failed to read streaming tenant")?
    else {
        return Ok(());
    };

    ignore_not_found(
        provider
            .streaming
            .delete_tenant(org_id, identifier, &tenant.cluster_name)
            .await,
    )
    .context_for(id, "Failed to delete streaming tenant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::provider;
    use crate::streaming::CURRENT_ORG_HEADER;
    use astra_core::differ::diff;
    use astra_core::provider::Provider;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tenant_body() -> serde_json::Value {
        serde_json::json!({
            "tenantName": "events",
            "clusterName": "pulsar-gcp-useast1",
            "cloudProvider": "GCP",
            "cloudRegion": "useast1",
            "brokerServiceUrl": "pulsar+ssl://pulsar-gcp-useast1.streaming.datastax.com:6651",
            "status": "active"
        })
    }

    fn desired() -> Resource {
        Resource::new(TYPE, "events")
            .with_attribute("tenant_name", "events")
            .with_attribute("cloud_provider", "gcp")
            .with_attribute("region", "useast1")
            .with_attribute("user_email", "ops@example.com")
    }

    #[tokio::test]
    async fn create_waits_until_tenant_is_readable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/streaming/tenants"))
            .and(header(CURRENT_ORG_HEADER, "org-1"))
            .and(body_partial_json(serde_json::json!({
                "orgId": "org-1",
                "tenantName": "events",
                "cloudProvider": "gcp",
                "cloudRegion": "useast1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/streaming/tenants/events"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/streaming/tenants/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tenant_body()))
            .mount(&server)
            .await;

        let astra = provider(&server);
        let provider: &dyn Provider = &astra;
        let state = provider.create(&desired()).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("events"));
        assert_eq!(
            state.attributes["cluster_name"],
            Value::from("pulsar-gcp-useast1")
        );
        // user_email is not echoed back
        assert!(!diff(&desired(), &state, Some(&schema())).is_change());
    }

    #[tokio::test]
    async fn delete_uses_the_tenant_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/streaming/tenants/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tenant_body()))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/streaming/tenants/events/clusters/pulsar-gcp-useast1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server)
            .delete_resource(&ResourceId::new(TYPE, "events"), "events")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleting_a_missing_tenant_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        provider(&server)
            .delete_resource(&ResourceId::new(TYPE, "events"), "events")
            .await
            .unwrap();
    }
}
