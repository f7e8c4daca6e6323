//! Association of a PCU group with a database datacenter

use std::collections::HashMap;

use astra_core::convergence::NotFoundPolicy;
use astra_core::provider::{ProviderError, ProviderResult};
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use log::info;

use super::{ignore_not_found, insert_opt, required_str};
use crate::id::PcuAssociationId;
use crate::models::{AssociationStatus, PcuAssociation};
use crate::probes::{PcuAssociationProbe, find_association};
use crate::provider::{AstraProvider, Budget, ResultExt};
use crate::validation;

pub const TYPE: &str = "pcu_group_association";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE)
        .with_description("Provisioned capacity unit group attached to a datacenter")
        .attribute(
            AttributeSchema::new("pcu_group_id", validation::uuid())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("datacenter_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("provisioning_status", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("created_at", AttributeType::String).read_only())
}

fn association_state(id: &ResourceId, assoc_id: &PcuAssociationId, assoc: &PcuAssociation) -> State {
    let mut attributes = HashMap::new();
    attributes.insert(
        "pcu_group_id".to_string(),
        Value::from(assoc_id.pcu_group_id.as_str()),
    );
    attributes.insert(
        "datacenter_id".to_string(),
        Value::from(assoc_id.datacenter_id.as_str()),
    );
    attributes.insert(
        "provisioning_status".to_string(),
        Value::from(assoc.provisioning_status.to_string()),
    );
    insert_opt(&mut attributes, "created_at", assoc.created_at.as_deref());
    State::existing(id.clone(), attributes).with_identifier(assoc_id.to_string())
}

pub(crate) async fn read(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let assoc_id: PcuAssociationId = identifier.parse().context_for(id, "Invalid identifier")?;
    let associations = provider
        .devops
        .list_pcu_associations(&assoc_id.pcu_group_id)
        .await
        .context_for(id, "Failed to list PCU group associations")?;

    Ok(match find_association(associations, &assoc_id.datacenter_id) {
        Some(assoc) => association_state(id, &assoc_id, &assoc),
        None => State::not_found(id.clone()),
    })
}

pub(crate) async fn create(provider: &AstraProvider, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let assoc_id = PcuAssociationId {
        pcu_group_id: required_str(resource, "pcu_group_id")?.to_string(),
        datacenter_id: required_str(resource, "datacenter_id")?.to_string(),
    };

    provider
        .devops
        .associate_pcu_group(&assoc_id.pcu_group_id, &assoc_id.datacenter_id)
        .await
        .context_for(id, "Failed to associate PCU group")?;
    info!("PCU group association {} requested", assoc_id);

    let target = AstraProvider::target(
        Budget::start(provider.config().waits.pcu_association),
        [AssociationStatus::Created],
        [AssociationStatus::Error, AssociationStatus::Failed],
    )
    .context_for(id, "Invalid wait")?
    .on_not_found(NotFoundPolicy::Retry);
    let probe = PcuAssociationProbe::new(&provider.devops, &assoc_id);

    let assoc = provider
        .wait(&target, &probe)
        .await
        .context_for(id, "PCU group association was not created")
        .map_err(|e| e.with_identifier(assoc_id.to_string()))?
        .into_payload()
        .ok_or_else(|| {
            ProviderError::new("PCU group association disappeared").for_resource(id.clone())
        })?;
    Ok(association_state(id, &assoc_id, &assoc))
}

pub(crate) async fn delete(
    provider: &AstraProvider,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let assoc_id: PcuAssociationId = identifier.parse().context_for(id, "Invalid identifier")?;

    ignore_not_found(
        provider
            .devops
            .dissociate_pcu_group(&assoc_id.pcu_group_id, &assoc_id.datacenter_id)
            .await,
    )
    .context_for(id, "Failed to dissociate PCU group")?;

    // Done once the association is no longer listed
    let target = AstraProvider::target(
        Budget::start(provider.config().waits.pcu_association),
        [],
        [AssociationStatus::Error, AssociationStatus::Failed],
    )
    .context_for(id, "Invalid wait")?
    .on_not_found(NotFoundPolicy::Succeed);
    let probe = PcuAssociationProbe::new(&provider.devops, &assoc_id);

    provider
        .wait(&target, &probe)
        .await
        .context_for(id, "PCU group association was not removed")?;
    Ok(())
}
