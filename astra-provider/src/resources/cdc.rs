//! Change data capture from a database table into a streaming tenant
//!
//! Astra rejects concurrent CDC enable requests, so creation is serialized
//! process-wide by [`CDC_ENABLE_LOCK`]. The lock covers the enable call and the
//! wait for the stream to come up; reads and deletes never take it.

use std::collections::HashMap;

use astra_core::convergence::NotFoundPolicy;
use astra_core::provider::{ProviderError, ProviderResult};
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::{debug, info};
use tokio::sync::Mutex;

use super::streaming_tenant::tenant_cluster;
use super::{ignore_not_found, insert_opt, required_str};
use crate::id::CdcId;
use crate::models::{CdcEntry, DisableCdcRequest, EnableCdcRequest};
use crate::probes::{CdcProbe, find_cdc_entry};
use crate::provider::{AstraProvider, Budget, ResultExt};
use crate::validation;

pub const TYPE: &str = "cdc";

/// Held from the CDC enable request until the stream is running
pub(crate) static CDC_ENABLE_LOCK: Mutex<()> = Mutex::const_new(());

const RUNNING: &str = "Running";
const FAILED: [&str; 2] = ["Failed", "Error"];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE)
        .with_description("CDC stream from a database table to a streaming tenant")
        .attribute(
            AttributeSchema::new("database_id", validation::uuid())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("database_name", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("keyspace", validation::keyspace_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("table", validation::table_name())
                .required()
                .force_new()
                .with_provider_name("tableName"),
        )
        .attribute(
            AttributeSchema::new("tenant_name", validation::tenant_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("topic_partitions", types::positive_int())
                .force_new()
                .write_only()
                .with_default(Value::Int(3)),
        )
        .attribute(AttributeSchema::new("pulsar_cluster", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("connector_status", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("data_topic", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("event_topic", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
}

fn cdc_state(id: &ResourceId, cdc_id: &CdcId, cluster: &str, entry: &CdcEntry) -> State {
    let mut attributes = HashMap::new();
    attributes.insert("database_id".to_string(), Value::from(cdc_id.database_id.as_str()));
    attributes.insert("keyspace".to_string(), Value::from(cdc_id.keyspace.as_str()));
    attributes.insert("table".to_string(), Value::from(cdc_id.table.as_str()));
    attributes.insert("tenant_name".to_string(), Value::from(cdc_id.tenant.as_str()));
    attributes.insert("pulsar_cluster".to_string(), Value::from(cluster));
    insert_opt(&mut attributes, "database_name", Some(entry.database_name.as_str()));
    insert_opt(&mut attributes, "connector_status", Some(entry.connector_status.as_str()));
    insert_opt(&mut attributes, "data_topic", Some(entry.data_topic.as_str()));
    insert_opt(&mut attributes, "event_topic", Some(entry.event_topic.as_str()));
    insert_opt(&mut attributes, "status", Some(entry.cod_status.as_str()));
    State::existing(id.clone(), attributes).with_identifier(cdc_id.to_string())
}

async fn resolve_cluster(
    provider: &AstraProvider,
    id: &ResourceId,
    tenant: &str,
) -> ProviderResult<Option<String>> {
    tenant_cluster(provider, tenant)
        .await
        .context_for(id, &format!("Failed to look up streaming tenant {}", tenant))
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let cdc_id: CdcId = identifier.parse().context_for(id, "Invalid identifier")?;
    let Some(cluster) = resolve_cluster(provider, id, &cdc_id.tenant).await? else {
        return Ok(State::not_found(id.clone()));
    };
    let org_id = provider
        .org_id()
        .await
        .context_for(id, "Failed to resolve organization")?;

    let entries = provider
        .streaming
        .list_cdc(org_id, &cdc_id.tenant, &cluster)
        .await
        .context_for(id, "Failed to list CDC streams")?;

    Ok(match find_cdc_entry(entries, &cdc_id) {
        Some(entry) => cdc_state(id, &cdc_id, &cluster, &entry),
        None => State::not_found(id.clone()),
    })
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let cdc_id = CdcId {
        database_id: required_str(resource, "database_id")?.to_string(),
        keyspace: required_str(resource, "keyspace")?.to_string(),
        table: required_str(resource, "table")?.to_string(),
        tenant: required_str(resource, "tenant_name")?.to_string(),
    };
    let org_id = provider
        .org_id()
        .await
        .context_for(id, "Failed to resolve organization")?;
    let cluster = resolve_cluster(provider, id, &cdc_id.tenant)
        .await?
        .ok_or_else(|| {
            ProviderError::new(format!("Streaming tenant {} not found", cdc_id.tenant))
                .for_resource(id.clone())
        })?;

    let database_name = match resource.get_str("database_name") {
        Some(name) => name.to_string(),
        None => provider
            .devops
            .get_database(&cdc_id.database_id)
            .await
            .context_for(id, "Failed to read database")?
            .and_then(|db| db.info.name)
            .ok_or_else(|| {
                ProviderError::new(format!("Database {} not found", cdc_id.database_id))
                    .for_resource(id.clone())
            })?,
    };

    let request = EnableCdcRequest {
        org_id: org_id.to_string(),
        database_id: cdc_id.database_id.clone(),
        database_name,
        keyspace: cdc_id.keyspace.clone(),
        table_name: cdc_id.table.clone(),
        topic_partitions: resource.get_int("topic_partitions").unwrap_or(3),
    };

    let probe = CdcProbe::new(&provider.streaming, org_id, &cluster, &cdc_id);

    let guard = CDC_ENABLE_LOCK.lock().await;
    debug!("Acquired CDC enable lock for {}", cdc_id);

    // The budget starts once the lock is ours
    let target = AstraProvider::target(
        Budget::start(provider.config().waits.cdc_create),
        [RUNNING.to_string()],
        FAILED.map(str::to_string),
    )
    .context_for(id, "Invalid wait")?
    .on_not_found(NotFoundPolicy::Retry);

    provider
        .streaming
        .enable_cdc(&cdc_id.tenant, &cluster, &request)
        .await
        .context_for(id, "Failed to enable CDC")?;
    info!("CDC enabled for {}, waiting for {}", cdc_id, RUNNING);

    let converged = provider
        .wait(&target, &probe)
        .await
        .context_for(id, "CDC stream did not start")
        .map_err(|e| e.with_identifier(cdc_id.to_string()))?;
    drop(guard);

    let entry = converged.into_payload().ok_or_else(|| {
        ProviderError::new("CDC stream disappeared after enabling").for_resource(id.clone())
    })?;
    Ok(cdc_state(id, &cdc_id, &cluster, &entry))
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let cdc_id: CdcId = identifier.parse().context_for(id, "Invalid identifier")?;
    let Some(cluster) = resolve_cluster(provider, id, &cdc_id.tenant).await? else {
        // Deleting the tenant took the stream with it
        return Ok(());
    };
    let org_id = provider
        .org_id()
        .await
        .context_for(id, "Failed to resolve organization")?;

    let request = DisableCdcRequest {
        org_id: org_id.to_string(),
        database_id: cdc_id.database_id.clone(),
        keyspace: cdc_id.keyspace.clone(),
        table_name: cdc_id.table.clone(),
    };
    ignore_not_found(
        provider
            .streaming
            .disable_cdc(&cdc_id.tenant, &cluster, &request)
            .await,
    )
    .context_for(id, "Failed to disable CDC")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::provider::test_support::provider;
    use crate::streaming::PULSAR_CLUSTER_HEADER;
    use astra_core::provider::Provider;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DB_ID: &str = "3f1c2d4e-5a6b-7c8d-9e0f-112233445566";
    const CDC_PATH: &str = "/v3/astra/tenants/events/cdc";

    async fn mount_tenant(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v2/streaming/tenants/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tenantName": "events",
                "clusterName": "pulsar-gcp-useast1"
            })))
            .mount(server)
            .await;
    }

    fn listing(entries: &[(&str, &str)]) -> ResponseTemplate {
        let body: Vec<serde_json::Value> = entries
            .iter()
            .map(|(table, status)| {
                serde_json::json!({
                    "databaseId": DB_ID,
                    "databaseName": "orders",
                    "keyspace": "app",
                    "databaseTable": table,
                    "codStatus": status,
                    "dataTopic": format!("persistent://events/astracdc/data-{}", table)
                })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(body)
    }

    fn desired(table: &str) -> Resource {
        Resource::new(TYPE, table)
            .with_attribute("database_id", DB_ID)
            .with_attribute("database_name", "orders")
            .with_attribute("keyspace", "app")
            .with_attribute("table", table)
            .with_attribute("tenant_name", "events")
    }

    #[tokio::test]
    async fn create_enables_and_waits_for_running() {
        let server = MockServer::start().await;
        mount_tenant(&server).await;
        Mock::given(method("POST"))
            .and(path(CDC_PATH))
            .and(header(PULSAR_CLUSTER_HEADER, "pulsar-gcp-useast1"))
            .and(body_json(serde_json::json!({
                "orgId": "org-1",
                "databaseId": DB_ID,
                "databaseName": "orders",
                "keyspace": "app",
                "tableName": "orders",
                "topicPartitions": 3
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CDC_PATH))
            .respond_with(listing(&[("users", "Running")]))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CDC_PATH))
            .respond_with(listing(&[("users", "Running"), ("orders", "Pending")]))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CDC_PATH))
            .respond_with(listing(&[("users", "Running"), ("orders", "Running")]))
            .mount(&server)
            .await;

        let state = provider(&server).create_resource(desired("orders")).await.unwrap();

        assert_eq!(
            state.identifier,
            Some(format!("{}/app/orders/events", DB_ID))
        );
        assert_eq!(state.attributes["status"], Value::from("Running"));
        assert_eq!(
            state.attributes["data_topic"],
            Value::from("persistent://events/astracdc/data-orders")
        );
    }

    #[tokio::test]
    async fn failed_stream_is_terminal() {
        let server = MockServer::start().await;
        mount_tenant(&server).await;
        Mock::given(method("POST"))
            .and(path(CDC_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CDC_PATH))
            .respond_with(listing(&[("orders", "Failed")]))
            .expect(1)
            .mount(&server)
            .await;

        let astra = provider(&server);
        let provider: &dyn Provider = &astra;
        let err = provider.create(&desired("orders")).await.unwrap_err();

        assert!(err.message.contains("Failed"), "{}", err.message);
        assert_eq!(err.identifier, Some(format!("{}/app/orders/events", DB_ID)));
    }

    #[tokio::test]
    async fn lock_is_held_while_waiting() {
        let server = MockServer::start().await;
        mount_tenant(&server).await;
        Mock::given(method("POST"))
            .and(path(CDC_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CDC_PATH))
            .respond_with(listing(&[("orders", "Pending")]))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let provider = Arc::new(provider(&server).with_cancellation(token.clone()));
        let task = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.create_resource(desired("orders")).await })
        };

        // Wait until the stream is being polled, i.e. the enable call went out
        let mut polled = false;
        for _ in 0..100 {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests
                .iter()
                .any(|r| r.method.as_str() == "GET" && r.url.path() == CDC_PATH)
            {
                polled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(polled);
        assert!(CDC_ENABLE_LOCK.try_lock().is_err());

        token.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(err.message.contains("cancelled"), "{}", err.message);
    }

    #[tokio::test]
    async fn concurrent_creates_both_complete() {
        let server = MockServer::start().await;
        mount_tenant(&server).await;
        Mock::given(method("POST"))
            .and(path(CDC_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CDC_PATH))
            .respond_with(listing(&[("orders", "Running"), ("users", "Running")]))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let (a, b) = tokio::join!(
            provider.create_resource(desired("orders")),
            provider.create_resource(desired("users"))
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn read_missing_tenant_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let state = provider(&server)
            .read_resource(
                &ResourceId::new(TYPE, "orders"),
                Some(&format!("{}/app/orders/events", DB_ID)),
            )
            .await
            .unwrap();
        assert!(!state.exists);
    }
}
