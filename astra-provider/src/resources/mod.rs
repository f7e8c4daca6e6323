//! Resource adapters
//!
//! One module per Astra resource type. Each exposes its type name, its
//! attribute schema and the lifecycle functions the provider dispatches to.

use std::collections::HashMap;

use astra_core::provider::{ProviderError, ProviderResult, ResourceType};
use astra_core::resource::{Resource, Value};
use astra_core::schema::ResourceSchema;

use crate::client::ApiError;

pub mod access_list;
pub mod cdc;
pub mod database;
pub mod keyspace;
pub mod pcu_association;
pub mod streaming_tenant;
pub mod streaming_topic;

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $module::TYPE
            }
            fn schema(&self) -> ResourceSchema {
                $module::schema()
            }
        }
    };
}

define_resource_type!(DatabaseType, database);
define_resource_type!(KeyspaceType, keyspace);
define_resource_type!(AccessListType, access_list);
define_resource_type!(CdcType, cdc);
define_resource_type!(StreamingTenantType, streaming_tenant);
define_resource_type!(StreamingTopicType, streaming_topic);
define_resource_type!(PcuAssociationType, pcu_association);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(DatabaseType),
        Box::new(KeyspaceType),
        Box::new(AccessListType),
        Box::new(CdcType),
        Box::new(StreamingTenantType),
        Box::new(StreamingTopicType),
        Box::new(PcuAssociationType),
    ]
}

/// Schemas keyed by resource type name
pub fn schemas() -> HashMap<String, ResourceSchema> {
    resource_types()
        .into_iter()
        .map(|t| (t.name().to_string(), t.schema()))
        .collect()
}

pub(crate) fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_str(key).ok_or_else(|| {
        ProviderError::new(format!("Missing required attribute '{}'", key))
            .for_resource(resource.id.clone())
    })
}

/// Treat 404 on a delete as already done
pub(crate) fn ignore_not_found(result: Result<(), ApiError>) -> Result<(), ApiError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

pub(crate) fn string_list(items: &[String]) -> Value {
    Value::List(items.iter().map(|s| Value::String(s.clone())).collect())
}

pub(crate) fn insert_opt(attributes: &mut HashMap<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        attributes.insert(key.to_string(), Value::String(v.to_string()));
    }
}
