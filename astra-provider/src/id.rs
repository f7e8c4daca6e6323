//! Composite identifiers
//!
//! Resources that live inside another resource are identified by joining the
//! parent keys with `/`, e.g. `3f1c.../app` for a keyspace.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} identifier '{value}': expected {expected}")]
pub struct IdError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

fn split<const N: usize>(
    value: &str,
    kind: &'static str,
    expected: &'static str,
) -> Result<[String; N], IdError> {
    let err = || IdError {
        kind,
        value: value.to_string(),
        expected,
    };
    let parts: Vec<String> = value.split('/').map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(err());
    }
    parts.try_into().map_err(|_| err())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceId {
    pub database_id: String,
    pub keyspace: String,
}

impl FromStr for KeyspaceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [database_id, keyspace] = split::<2>(s, "keyspace", "database_id/keyspace")?;
        Ok(Self {
            database_id,
            keyspace,
        })
    }
}

impl fmt::Display for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database_id, self.keyspace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdcId {
    pub database_id: String,
    pub keyspace: String,
    pub table: String,
    pub tenant: String,
}

impl FromStr for CdcId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [database_id, keyspace, table, tenant] =
            split::<4>(s, "cdc", "database_id/keyspace/table/tenant")?;
        Ok(Self {
            database_id,
            keyspace,
            table,
            tenant,
        })
    }
}

impl fmt::Display for CdcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.database_id, self.keyspace, self.table, self.tenant
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicId {
    pub tenant: String,
    pub namespace: String,
    pub topic: String,
}

impl FromStr for TopicId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [tenant, namespace, topic] = split::<3>(s, "streaming topic", "tenant/namespace/topic")?;
        Ok(Self {
            tenant,
            namespace,
            topic,
        })
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.namespace, self.topic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcuAssociationId {
    pub pcu_group_id: String,
    pub datacenter_id: String,
}

impl FromStr for PcuAssociationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [pcu_group_id, datacenter_id] =
            split::<2>(s, "PCU group association", "pcu_group_id/datacenter_id")?;
        Ok(Self {
            pcu_group_id,
            datacenter_id,
        })
    }
}

impl fmt::Display for PcuAssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pcu_group_id, self.datacenter_id)
    }
}
