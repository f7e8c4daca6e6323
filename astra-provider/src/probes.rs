//! Status probes for the asynchronous Astra operations
//!
//! Each probe performs one read against the API and reports the observed
//! status. Listing endpoints (CDC, PCU associations) return every entry of the
//! parent; the probe picks the one it is waiting for and reports `NotFound`
//! when it is not listed.
//!
//! Probes own a clone of their client and the ids they poll, so a wait can be
//! held across awaits inside the provider's boxed futures.

use astra_core::convergence::{ProbeError, Probed, StatusProbe};
use astra_core::provider::BoxFuture;

use crate::devops::DevOpsClient;
use crate::id::{CdcId, PcuAssociationId};
use crate::models::{
    AssociationStatus, CdcEntry, Database, DatabaseStatus, PcuAssociation, StreamingTenant,
};
use crate::streaming::StreamingClient;

pub struct DatabaseProbe {
    client: DevOpsClient,
    database_id: String,
}

impl DatabaseProbe {
    pub fn new(client: &DevOpsClient, database_id: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            database_id: database_id.into(),
        }
    }
}

impl StatusProbe for DatabaseProbe {
    type Status = DatabaseStatus;
    type Payload = Database;

    fn resource(&self) -> String {
        format!("database {}", self.database_id)
    }

    fn probe(&self) -> BoxFuture<'_, Result<Probed<DatabaseStatus, Database>, ProbeError>> {
        Box::pin(async move {
            Ok(match self.client.get_database(&self.database_id).await? {
                Some(db) => Probed::found(db.status, db),
                None => Probed::NotFound,
            })
        })
    }
}

/// Pick the entry for one table out of a tenant's CDC listing
pub fn find_cdc_entry(entries: Vec<CdcEntry>, id: &CdcId) -> Option<CdcEntry> {
    entries
        .into_iter()
        .find(|e| e.matches(&id.database_id, &id.keyspace, &id.table))
}

pub struct CdcProbe {
    client: StreamingClient,
    org_id: String,
    cluster: String,
    id: CdcId,
}

impl CdcProbe {
    pub fn new(client: &StreamingClient, org_id: &str, cluster: &str, id: &CdcId) -> Self {
        Self {
            client: client.clone(),
            org_id: org_id.to_string(),
            cluster: cluster.to_string(),
            id: id.clone(),
        }
    }
}

impl StatusProbe for CdcProbe {
    type Status = String;
    type Payload = CdcEntry;

    fn resource(&self) -> String {
        format!("cdc {}", self.id)
    }

    fn probe(&self) -> BoxFuture<'_, Result<Probed<String, CdcEntry>, ProbeError>> {
        Box::pin(async move {
            let entries = self
                .client
                .list_cdc(&self.org_id, &self.id.tenant, &self.cluster)
                .await?;
            Ok(match find_cdc_entry(entries, &self.id) {
                Some(entry) => Probed::found(entry.cod_status.clone(), entry),
                None => Probed::NotFound,
            })
        })
    }
}

/// Status a streaming tenant reports once it can be read back
pub const TENANT_AVAILABLE: &str = "available";

/// A new tenant is available as soon as reads return it
pub struct TenantProbe {
    client: StreamingClient,
    org_id: String,
    tenant: String,
}

impl TenantProbe {
    pub fn new(client: &StreamingClient, org_id: &str, tenant: &str) -> Self {
        Self {
            client: client.clone(),
            org_id: org_id.to_string(),
            tenant: tenant.to_string(),
        }
    }
}

impl StatusProbe for TenantProbe {
    type Status = &'static str;
    type Payload = StreamingTenant;

    fn resource(&self) -> String {
        format!("streaming tenant {}", self.tenant)
    }

    fn probe(&self) -> BoxFuture<'_, Result<Probed<&'static str, StreamingTenant>, ProbeError>> {
        Box::pin(async move {
            Ok(match self.client.get_tenant(&self.org_id, &self.tenant).await? {
                Some(tenant) => Probed::found(TENANT_AVAILABLE, tenant),
                None => Probed::NotFound,
            })
        })
    }
}

/// Pick one datacenter's association out of a PCU group listing
pub fn find_association(
    associations: Vec<PcuAssociation>,
    datacenter_id: &str,
) -> Option<PcuAssociation> {
    associations
        .into_iter()
        .find(|a| a.datacenter_id == datacenter_id)
}

pub struct PcuAssociationProbe {
    client: DevOpsClient,
    id: PcuAssociationId,
}

impl PcuAssociationProbe {
    pub fn new(client: &DevOpsClient, id: &PcuAssociationId) -> Self {
        Self {
            client: client.clone(),
            id: id.clone(),
        }
    }
}

impl StatusProbe for PcuAssociationProbe {
    type Status = AssociationStatus;
    type Payload = PcuAssociation;

    fn resource(&self) -> String {
        format!("pcu group association {}", self.id)
    }

    fn probe(
        &self,
    ) -> BoxFuture<'_, Result<Probed<AssociationStatus, PcuAssociation>, ProbeError>> {
        Box::pin(async move {
            let associations = self
                .client
                .list_pcu_associations(&self.id.pcu_group_id)
                .await?;
            Ok(match find_association(associations, &self.id.datacenter_id) {
                Some(assoc) => Probed::found(assoc.provisioning_status, assoc),
                None => Probed::NotFound,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use astra_core::convergence::{ConvergeError, ConvergenceTarget, Converged, NotFoundPolicy};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::ApiClient;

    fn api(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), "AstraCS:test", "astra-test", Duration::from_secs(5)).unwrap()
    }

    fn cdc_entry(database_id: &str, keyspace: &str, table: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "databaseId": database_id,
            "keyspace": keyspace,
            "databaseTable": table,
            "codStatus": status
        })
    }

    fn database(status: &str) -> serde_json::Value {
        serde_json::json!({"id": "3f1c", "status": status, "info": {"name": "orders"}})
    }

    #[test]
    fn cdc_filter_ignores_unrelated_entries() {
        let entries: Vec<CdcEntry> = serde_json::from_value(serde_json::json!([
            cdc_entry("3f1c", "app", "users", "Running"),
            cdc_entry("9a0b", "app", "orders", "Running"),
            cdc_entry("3f1c", "app", "orders", "Pending"),
        ]))
        .unwrap();
        let id: CdcId = "3f1c/app/orders/events".parse().unwrap();

        let entry = find_cdc_entry(entries, &id).unwrap();
        assert_eq!(entry.cod_status, "Pending");
    }

    #[tokio::test]
    async fn database_reaches_active_through_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/databases/3f1c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(database("PENDING")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/databases/3f1c"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/databases/3f1c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(database("ACTIVE")))
            .mount(&server)
            .await;

        let client = DevOpsClient::new(api(&server));
        let probe = DatabaseProbe::new(&client, "3f1c");
        let target = ConvergenceTarget::new([DatabaseStatus::Active], [DatabaseStatus::Error])
            .unwrap()
            .with_interval(Duration::from_millis(10));

        match target.wait(&probe, None).await.unwrap() {
            Converged::Reached {
                status, attempts, ..
            } => {
                assert_eq!(status, DatabaseStatus::Active);
                assert_eq!(attempts, 3);
            }
            other => panic!("Expected Reached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn database_forbidden_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = DevOpsClient::new(api(&server));
        let probe = DatabaseProbe::new(&client, "3f1c");
        let target = ConvergenceTarget::new([DatabaseStatus::Active], [DatabaseStatus::Error])
            .unwrap()
            .with_interval(Duration::from_millis(10));

        let err = target.wait(&probe, None).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Probe { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn dissociated_pcu_group_counts_as_gone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/pcus/association/g1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"pcuGroupUUID": "g1", "datacenterUUID": "other-dc", "provisioningStatus": "CREATED"}
            ])))
            .mount(&server)
            .await;

        let client = DevOpsClient::new(api(&server));
        let id: PcuAssociationId = "g1/dc-1".parse().unwrap();
        let probe = PcuAssociationProbe::new(&client, &id);
        let target = ConvergenceTarget::new(
            Vec::<AssociationStatus>::new(),
            [AssociationStatus::Error],
        )
        .unwrap()
        .on_not_found(NotFoundPolicy::Succeed);

        let result = target.wait(&probe, None).await.unwrap();
        assert!(matches!(result, Converged::Gone { attempts: 1 }));
    }
}
