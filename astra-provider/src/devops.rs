//! Astra DevOps API: databases, keyspaces, access lists and PCU groups

use reqwest::Method;
use reqwest::header::LOCATION;

use crate::client::{ApiClient, ApiError};
use crate::models::{AccessList, CreateDatabaseRequest, Database, Organization, PcuAssociation};

#[derive(Debug, Clone)]
pub struct DevOpsClient {
    api: ApiClient,
}

impl DevOpsClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn current_org(&self) -> Result<Organization, ApiError> {
        self.api
            .send_json(self.api.request(Method::GET, "/v2/currentOrg"))
            .await
    }

    // =========================================================================
    // Databases
    // =========================================================================

    pub async fn get_database(&self, database_id: &str) -> Result<Option<Database>, ApiError> {
        let path = format!("/v2/databases/{}", database_id);
        self.api
            .send_json_opt(self.api.request(Method::GET, &path))
            .await
    }

    /// Start database creation, returning the new database id
    pub async fn create_database(&self, request: &CreateDatabaseRequest) -> Result<String, ApiError> {
        let response = self
            .api
            .send(self.api.request(Method::POST, "/v2/databases").json(request))
            .await?;

        let url = response.url().to_string();
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode {
                url,
                message: "missing Location header with the database id".to_string(),
            })
    }

    pub async fn terminate_database(&self, database_id: &str) -> Result<(), ApiError> {
        let path = format!("/v2/databases/{}/terminate", database_id);
        self.api
            .send(self.api.request(Method::POST, &path))
            .await
            .map(drop)
    }

    pub async fn add_keyspace(&self, database_id: &str, keyspace: &str) -> Result<(), ApiError> {
        let path = format!("/v2/databases/{}/keyspaces/{}", database_id, keyspace);
        self.api
            .send(self.api.request(Method::POST, &path))
            .await
            .map(drop)
    }

    pub async fn drop_keyspace(&self, database_id: &str, keyspace: &str) -> Result<(), ApiError> {
        let path = format!("/v2/databases/{}/keyspaces/{}", database_id, keyspace);
        self.api
            .send(self.api.request(Method::DELETE, &path))
            .await
            .map(drop)
    }

    // =========================================================================
    // Access lists
    // =========================================================================

    pub async fn get_access_list(&self, database_id: &str) -> Result<Option<AccessList>, ApiError> {
        let path = format!("/v2/access-lists/{}", database_id);
        self.api
            .send_json_opt(self.api.request(Method::GET, &path))
            .await
    }

    pub async fn create_access_list(
        &self,
        database_id: &str,
        list: &AccessList,
    ) -> Result<(), ApiError> {
        let path = format!("/v2/access-lists/{}", database_id);
        self.api
            .send(self.api.request(Method::POST, &path).json(list))
            .await
            .map(drop)
    }

    pub async fn replace_access_list(
        &self,
        database_id: &str,
        list: &AccessList,
    ) -> Result<(), ApiError> {
        let path = format!("/v2/access-lists/{}", database_id);
        self.api
            .send(self.api.request(Method::PUT, &path).json(list))
            .await
            .map(drop)
    }

    pub async fn delete_access_list(&self, database_id: &str) -> Result<(), ApiError> {
        let path = format!("/v2/access-lists/{}", database_id);
        self.api
            .send(self.api.request(Method::DELETE, &path))
            .await
            .map(drop)
    }

    // =========================================================================
    // PCU groups
    // =========================================================================

    /// Associations of a PCU group; an unknown group has none
    pub async fn list_pcu_associations(
        &self,
        pcu_group_id: &str,
    ) -> Result<Vec<PcuAssociation>, ApiError> {
        let path = format!("/v2/pcus/association/{}", pcu_group_id);
        Ok(self
            .api
            .send_json_opt(self.api.request(Method::GET, &path))
            .await?
            .unwrap_or_default())
    }

    pub async fn associate_pcu_group(
        &self,
        pcu_group_id: &str,
        datacenter_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/v2/pcus/association/{}/{}", pcu_group_id, datacenter_id);
        self.api
            .send(self.api.request(Method::POST, &path))
            .await
            .map(drop)
    }

    pub async fn dissociate_pcu_group(
        &self,
        pcu_group_id: &str,
        datacenter_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/v2/pcus/association/{}/{}", pcu_group_id, datacenter_id);
        self.api
            .send(self.api.request(Method::DELETE, &path))
            .await
            .map(drop)
    }
}
