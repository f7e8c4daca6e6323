//! Pulsar topic in a streaming tenant namespace
//!
//! Topics are managed through the Pulsar admin API on the tenant's cluster.
//! The identifier does not carry the domain or partitioning, so reads look the
//! topic up in each listing.

use std::collections::HashMap;

use astra_core::provider::{ProviderError, ProviderResult};
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use log::{debug, info};

use super::streaming_tenant::tenant_cluster;
use super::{ignore_not_found, required_str};
use crate::client::ApiError;
use crate::id::TopicId;
use crate::provider::{AstraProvider, ResultExt};
use crate::streaming::{TopicDomain, TopicName};
use crate::validation;

pub const TYPE: &str = "streaming_topic";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE)
        .with_description("Pulsar topic in an Astra Streaming tenant")
        .attribute(
            AttributeSchema::new("tenant_name", validation::tenant_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("namespace", validation::pulsar_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("topic", validation::pulsar_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("persistent", AttributeType::Bool)
                .force_new()
                .with_default(Value::Bool(true)),
        )
        .attribute(
            AttributeSchema::new("partitioned", AttributeType::Bool)
                .force_new()
                .with_default(Value::Bool(false)),
        )
        .attribute(
            AttributeSchema::new("num_partitions", types::positive_int())
                .force_new()
                .with_description("Required when partitioned"),
        )
        .attribute(AttributeSchema::new("cluster", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("topic_url", AttributeType::String).read_only())
}

/// A topic as found on the cluster
struct Located {
    name: TopicName,
    partitions: Option<u32>,
}

fn topic_name(id: &TopicId, domain: TopicDomain) -> TopicName {
    TopicName {
        domain,
        tenant: id.tenant.clone(),
        namespace: id.namespace.clone(),
        topic: id.topic.clone(),
    }
}

async fn locate(
    provider: &AstraProvider,
    cluster: &str,
    id: &TopicId,
) -> Result<Option<Located>, ApiError> {
    for domain in [TopicDomain::Persistent, TopicDomain::NonPersistent] {
        let name = topic_name(id, domain);
        if provider.pulsar.topic_exists(cluster, &name, false).await? {
            return Ok(Some(Located {
                name,
                partitions: None,
            }));
        }
        if provider.pulsar.topic_exists(cluster, &name, true).await? {
            let partitions = provider.pulsar.partition_count(cluster, &name).await?;
            return Ok(Some(Located { name, partitions }));
        }
        debug!("Topic {} not listed", name);
    }
    Ok(None)
}

fn topic_state(id: &ResourceId, cluster: &str, topic: &Located) -> State {
    let name = &topic.name;
    let mut attributes = HashMap::new();
    attributes.insert("tenant_name".to_string(), Value::from(name.tenant.as_str()));
    attributes.insert("namespace".to_string(), Value::from(name.namespace.as_str()));
    attributes.insert("topic".to_string(), Value::from(name.topic.as_str()));
    attributes.insert(
        "persistent".to_string(),
        Value::Bool(name.domain == TopicDomain::Persistent),
    );
    attributes.insert(
        "partitioned".to_string(),
        Value::Bool(topic.partitions.is_some()),
    );
    if let Some(n) = topic.partitions {
        attributes.insert("num_partitions".to_string(), Value::Int(i64::from(n)));
    }
    attributes.insert("cluster".to_string(), Value::from(cluster));
    attributes.insert("topic_url".to_string(), Value::from(name.to_string()));

    let identifier = TopicId {
        tenant: name.tenant.clone(),
        namespace: name.namespace.clone(),
        topic: name.topic.clone(),
    };
    State::existing(id.clone(), attributes).with_identifier(identifier.to_string())
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let topic_id: TopicId = identifier.parse().context_for(id, "Invalid identifier")?;
    let Some(cluster) = tenant_cluster(provider, &topic_id.tenant)
        .await
        .context_for(id, "Failed to look up streaming tenant")?
    else {
        return Ok(State::not_found(id.clone()));
    };

    let located = locate(provider, &cluster, &topic_id)
        .await
        .context_for(id, "Failed to read topic")?;
    Ok(match located {
        Some(topic) => topic_state(id, &cluster, &topic),
        None => State::not_found(id.clone()),
    })
}

fn partitions(resource: &Resource) -> ProviderResult<Option<u32>> {
    let invalid = |msg: String| ProviderError::new(msg).for_resource(resource.id.clone());
    let requested = resource.get_int("num_partitions");

    if !resource.get_bool("partitioned").unwrap_or(false) {
        return match requested {
            Some(_) => Err(invalid(
                "num_partitions is only valid for partitioned topics".to_string(),
            )),
            None => Ok(None),
        };
    }
    let n = requested
        .ok_or_else(|| invalid("num_partitions is required for partitioned topics".to_string()))?;
    u32::try_from(n)
        .map(Some)
        .map_err(|_| invalid(format!("num_partitions out of range: {}", n)))
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let partitions = partitions(resource)?;
    let topic_id = TopicId {
        tenant: required_str(resource, "tenant_name")?.to_string(),
        namespace: required_str(resource, "namespace")?.to_string(),
        topic: required_str(resource, "topic")?.to_string(),
    };
    let cluster = tenant_cluster(provider, &topic_id.tenant)
        .await
        .context_for(id, "Failed to look up streaming tenant")?
        .ok_or_else(|| {
            ProviderError::new(format!("Streaming tenant {} not found", topic_id.tenant))
                .for_resource(id.clone())
        })?;

    let domain = TopicDomain::from_persistent(resource.get_bool("persistent").unwrap_or(true));
    let name = topic_name(&topic_id, domain);
    provider
        .pulsar
        .create_topic(&cluster, &name, partitions)
        .await
        .context_for(id, "Failed to create topic")?;
    info!("Topic {} created", name);

    Ok(topic_state(id, &cluster, &Located { name, partitions }))
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let topic_id: TopicId = identifier.parse().context_for(id, "Invalid identifier")?;
    let Some(cluster) = tenant_cluster(provider, &topic_id.tenant)
        .await
        .context_for(id, "Failed to look up streaming tenant")?
    else {
        return Ok(());
    };
    let Some(topic) = locate(provider, &cluster, &topic_id)
        .await
        .context_for(id, "Failed to read topic")?
    else {
        return Ok(());
    };

    ignore_not_found(
        provider
            .pulsar
            .delete_topic(&cluster, &topic.name, topic.partitions.is_some())
            .await,
    )
    .context_for(id, "Failed to delete topic")
}
