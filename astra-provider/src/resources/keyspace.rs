//! Keyspace inside an existing database
//!
//! Keyspace changes put the database into `MAINTENANCE` for a while, so every
//! change waits for the database to be `ACTIVE` before and after. Both waits
//! of a create share the keyspace timeout.

use std::collections::HashMap;

use astra_core::provider::ProviderResult;
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, ResourceSchema};
use log::info;

use super::{ignore_not_found, required_str};
use crate::id::KeyspaceId;
use crate::models::DatabaseStatus;
use crate::provider::{AstraProvider, Budget, ResultExt};
use crate::resources::database::wait_for_status;
use crate::validation;

pub const TYPE: &str = "keyspace";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE)
        .with_description("Additional keyspace in an Astra database")
        .attribute(
            AttributeSchema::new("database_id", validation::uuid())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("name", validation::keyspace_name())
                .required()
                .force_new(),
        )
}

fn keyspace_state(id: &ResourceId, keyspace_id: &KeyspaceId) -> State {
    let mut attributes = HashMap::new();
    attributes.insert(
        "database_id".to_string(),
        Value::from(keyspace_id.database_id.as_str()),
    );
    attributes.insert("name".to_string(), Value::from(keyspace_id.keyspace.as_str()));
    State::existing(id.clone(), attributes).with_identifier(keyspace_id.to_string())
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let keyspace_id: KeyspaceId = identifier.parse().context_for(id, "Invalid identifier")?;

    let db = provider
        .devops
        .get_database(&keyspace_id.database_id)
        .await
        .context_for(id, "Failed to read database")?;

    match db {
        Some(db)
            if db.status != DatabaseStatus::Terminated
                && db.has_keyspace(&keyspace_id.keyspace) =>
        {
            Ok(keyspace_state(id, &keyspace_id))
        }
        _ => Ok(State::not_found(id.clone())),
    }
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let keyspace_id = KeyspaceId {
        database_id: required_str(resource, "database_id")?.to_string(),
        keyspace: required_str(resource, "name")?.to_string(),
    };
    let budget = Budget::start(provider.config().waits.keyspace);

    wait_for_status(provider, &keyspace_id.database_id, DatabaseStatus::Active, budget)
        .await
        .context_for(id, "Database is not active")?;

    provider
        .devops
        .add_keyspace(&keyspace_id.database_id, &keyspace_id.keyspace)
        .await
        .context_for(id, "Failed to create keyspace")?;
    info!("Keyspace {} requested", keyspace_id);

    wait_for_status(provider, &keyspace_id.database_id, DatabaseStatus::Active, budget)
        .await
        .context_for(id, "Database did not return to active")
        .map_err(|e| e.with_identifier(keyspace_id.to_string()))?;

    Ok(keyspace_state(id, &keyspace_id))
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let keyspace_id: KeyspaceId = identifier.parse().context_for(id, "Invalid identifier")?;

    ignore_not_found(
        provider
            .devops
            .drop_keyspace(&keyspace_id.database_id, &keyspace_id.keyspace)
            .await,
    )
    .context_for(id, "Failed to delete keyspace")?;

    let budget = Budget::start(provider.config().waits.keyspace);
    wait_for_status(provider, &keyspace_id.database_id, DatabaseStatus::Active, budget)
        .await
        .context_for(id, "Database did not return to active")?;
    Ok(())
}
