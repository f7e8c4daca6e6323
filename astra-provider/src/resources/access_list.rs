//! IP access list of a database
//!
//! One list per database, so the database id doubles as the identifier.
//! Address entries are nested objects whose `description` and `enabled` fields
//! have schema defaults. Reads always report both fields, so a config matches
//! the state whether it spells the defaults out or not.

use std::collections::HashMap;

use astra_core::provider::{ProviderError, ProviderResult};
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{ignore_not_found, required_str};
use crate::models::{AccessList, AccessListAddress, AccessListConfigurations};
use crate::provider::{AstraProvider, ResultExt};
use crate::validation;

pub const TYPE: &str = "access_list";

pub fn schema() -> ResourceSchema {
    let address = AttributeType::Object(vec![
        AttributeSchema::new("address", validation::cidr()).required(),
        AttributeSchema::new("description", AttributeType::String)
            .with_default(Value::from("")),
        AttributeSchema::new("enabled", AttributeType::Bool).with_default(Value::Bool(true)),
    ]);

    ResourceSchema::new(TYPE)
        .with_description("IP access list restricting connections to a database")
        .attribute(
            AttributeSchema::new("database_id", validation::uuid())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("enabled", AttributeType::Bool)
                .with_default(Value::Bool(true))
                .with_provider_name("accessListEnabled"),
        )
        .attribute(
            AttributeSchema::new("addresses", AttributeType::List(Box::new(address))).required(),
        )
}

fn to_request(resource: &Resource) -> ProviderResult<AccessList> {
    let invalid = |msg: &str| ProviderError::new(msg.to_string()).for_resource(resource.id.clone());

    let addresses = resource
        .attributes
        .get("addresses")
        .and_then(Value::as_list)
        .ok_or_else(|| invalid("Missing required attribute 'addresses'"))?
        .iter()
        .map(|entry| {
            let map = entry
                .as_map()
                .ok_or_else(|| invalid("Each address must be an object"))?;
            let address = map
                .get("address")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("Each address needs an 'address'"))?;
            Ok(AccessListAddress {
                address: address.to_string(),
                description: map
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                enabled: map.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            })
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    Ok(AccessList {
        addresses,
        configurations: AccessListConfigurations {
            access_list_enabled: resource.get_bool("enabled").unwrap_or(true),
        },
        ..Default::default()
    })
}

fn access_list_state(id: &ResourceId, database_id: &str, list: &AccessList) -> State {
    let addresses = list
        .addresses
        .iter()
        .map(|a| {
            let mut entry = HashMap::new();
            entry.insert("address".to_string(), Value::from(a.address.as_str()));
            entry.insert("description".to_string(), Value::from(a.description.as_str()));
            entry.insert("enabled".to_string(), Value::Bool(a.enabled));
            Value::Map(entry)
        })
        .collect();

    let mut attributes = HashMap::new();
    attributes.insert("database_id".to_string(), Value::from(database_id));
    attributes.insert(
        "enabled".to_string(),
        Value::Bool(list.configurations.access_list_enabled),
    );
    attributes.insert("addresses".to_string(), Value::List(addresses));
    State::existing(id.clone(), attributes).with_identifier(database_id)
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let list = provider
        .devops
        .get_access_list(identifier)
        .await
        .context_for(id, "Failed to read access list")?;

    Ok(match list {
        Some(list) => access_list_state(id, identifier, &list),
        None => State::not_found(id.clone()),
    })
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let database_id = required_str(resource, "database_id")?;
    let request = to_request(resource)?;

    provider
        .devops
        .create_access_list(database_id, &request)
        .await
        .context_for(&resource.id, "Failed to create access list")?;

    read(provider, &resource.id, database_id).await
}

pub(crate) async fn update(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
    to: &Resource,
) -> ProviderResult<State> {
    let request = to_request(to)?;

    provider
        .devops
        .replace_access_list(identifier, &request)
        .await
        .context_for(id, "Failed to update access list")?;

    read(provider, id, identifier).await
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    ignore_not_found(provider.devops.delete_access_list(identifier).await)
        .context_for(id, "Failed to delete access list")
}
