//! Typed request and response bodies for the Astra APIs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status reported for a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseStatus {
    Active,
    Associating,
    Decommissioning,
    Degraded,
    Error,
    Hibernated,
    Hibernating,
    Initializing,
    Maintenance,
    Parked,
    Parking,
    Pending,
    Prepared,
    Preparing,
    Resizing,
    Resuming,
    Synchronizing,
    Terminated,
    Terminating,
    Unparking,
    #[serde(other)]
    Unknown,
}

impl DatabaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseStatus::Active => "ACTIVE",
            DatabaseStatus::Associating => "ASSOCIATING",
            DatabaseStatus::Decommissioning => "DECOMMISSIONING",
            DatabaseStatus::Degraded => "DEGRADED",
            DatabaseStatus::Error => "ERROR",
            DatabaseStatus::Hibernated => "HIBERNATED",
            DatabaseStatus::Hibernating => "HIBERNATING",
            DatabaseStatus::Initializing => "INITIALIZING",
            DatabaseStatus::Maintenance => "MAINTENANCE",
            DatabaseStatus::Parked => "PARKED",
            DatabaseStatus::Parking => "PARKING",
            DatabaseStatus::Pending => "PENDING",
            DatabaseStatus::Prepared => "PREPARED",
            DatabaseStatus::Preparing => "PREPARING",
            DatabaseStatus::Resizing => "RESIZING",
            DatabaseStatus::Resuming => "RESUMING",
            DatabaseStatus::Synchronizing => "SYNCHRONIZING",
            DatabaseStatus::Terminated => "TERMINATED",
            DatabaseStatus::Terminating => "TERMINATING",
            DatabaseStatus::Unparking => "UNPARKING",
            DatabaseStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub id: String,
    #[serde(default)]
    pub org_id: Option<String>,
    pub info: DatabaseInfo,
    pub status: DatabaseStatus,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub cqlsh_url: Option<String>,
    #[serde(default)]
    pub graphql_url: Option<String>,
    #[serde(default)]
    pub data_endpoint_url: Option<String>,
    #[serde(default)]
    pub grafana_url: Option<String>,
}

impl Database {
    /// Default keyspace followed by the additional ones
    pub fn keyspaces(&self) -> Vec<&str> {
        self.info
            .keyspace
            .iter()
            .chain(self.info.additional_keyspaces.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn has_keyspace(&self, name: &str) -> bool {
        self.keyspaces().contains(&name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub keyspace: Option<String>,
    #[serde(default)]
    pub additional_keyspaces: Vec<String>,
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub capacity_units: Option<i64>,
    #[serde(default)]
    pub db_type: Option<String>,
    #[serde(default)]
    pub datacenters: Vec<Datacenter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datacenter {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    pub name: String,
    pub keyspace: String,
    pub cloud_provider: String,
    pub region: String,
    pub tier: String,
    pub capacity_units: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
}

/// Organization the API token belongs to
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// IP access list attached to a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessList {
    #[serde(default, skip_serializing)]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub database_id: Option<String>,
    #[serde(default)]
    pub addresses: Vec<AccessListAddress>,
    #[serde(default)]
    pub configurations: AccessListConfigurations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListAddress {
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListConfigurations {
    #[serde(default)]
    pub access_list_enabled: bool,
}

/// One row of the CDC listing for a streaming tenant
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdcEntry {
    pub database_id: String,
    pub keyspace: String,
    pub database_table: String,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub connector_name: String,
    #[serde(default)]
    pub connector_status: String,
    #[serde(default)]
    pub cdc_status: String,
    #[serde(default)]
    pub cod_status: String,
    #[serde(default)]
    pub data_topic: String,
    #[serde(default)]
    pub event_topic: String,
}

impl CdcEntry {
    pub fn matches(&self, database_id: &str, keyspace: &str, table: &str) -> bool {
        self.database_id == database_id && self.keyspace == keyspace && self.database_table == table
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableCdcRequest {
    pub org_id: String,
    pub database_id: String,
    pub database_name: String,
    pub keyspace: String,
    pub table_name: String,
    pub topic_partitions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableCdcRequest {
    pub org_id: String,
    pub database_id: String,
    pub keyspace: String,
    pub table_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingTenant {
    pub tenant_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cloud_provider: String,
    #[serde(default)]
    pub cloud_region: String,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub broker_service_url: Option<String>,
    #[serde(default)]
    pub web_service_url: Option<String>,
    #[serde(default)]
    pub pulsar_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub org_id: String,
    pub tenant_name: String,
    pub cloud_provider: String,
    pub cloud_region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub user_email: String,
}

/// Provisioning status of a PCU group association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationStatus {
    Creating,
    Created,
    Updating,
    Deleting,
    Error,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AssociationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssociationStatus::Creating => "CREATING",
            AssociationStatus::Created => "CREATED",
            AssociationStatus::Updating => "UPDATING",
            AssociationStatus::Deleting => "DELETING",
            AssociationStatus::Error => "ERROR",
            AssociationStatus::Failed => "FAILED",
            AssociationStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcuAssociation {
    #[serde(rename = "pcuGroupUUID")]
    pub pcu_group_id: String,
    #[serde(rename = "datacenterUUID")]
    pub datacenter_id: String,
    pub provisioning_status: AssociationStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}
