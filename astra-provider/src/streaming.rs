//! Astra Streaming API (tenants, CDC) and the Pulsar admin API behind it
//!
//! Both are routed to a Pulsar cluster by the `X-DataStax-Pulsar-Cluster`
//! header; the streaming API also wants the organization in
//! `X-DataStax-Current-Org`.

use std::fmt;

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;

use crate::client::{ApiClient, ApiError};
use crate::models::{CdcEntry, CreateTenantRequest, DisableCdcRequest, EnableCdcRequest, StreamingTenant};

pub const PULSAR_CLUSTER_HEADER: &str = "X-DataStax-Pulsar-Cluster";
pub const CURRENT_ORG_HEADER: &str = "X-DataStax-Current-Org";

#[derive(Debug, Clone)]
pub struct StreamingClient {
    api: ApiClient,
}

impl StreamingClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn org_request(&self, method: Method, path: &str, org_id: &str) -> RequestBuilder {
        self.api
            .request(method, path)
            .header(CURRENT_ORG_HEADER, org_id)
    }

    fn cluster_request(
        &self,
        method: Method,
        path: &str,
        org_id: &str,
        cluster: &str,
    ) -> RequestBuilder {
        self.org_request(method, path, org_id)
            .header(PULSAR_CLUSTER_HEADER, cluster)
    }

    // =========================================================================
    // Tenants
    // =========================================================================

    pub async fn get_tenant(
        &self,
        org_id: &str,
        tenant: &str,
    ) -> Result<Option<StreamingTenant>, ApiError> {
        let path = format!("/v2/streaming/tenants/{}", tenant);
        self.api
            .send_json_opt(self.org_request(Method::GET, &path, org_id))
            .await
    }

    pub async fn create_tenant(&self, request: &CreateTenantRequest) -> Result<(), ApiError> {
        self.api
            .send(
                self.org_request(Method::POST, "/v2/streaming/tenants", &request.org_id)
                    .json(request),
            )
            .await
            .map(drop)
    }

    pub async fn delete_tenant(
        &self,
        org_id: &str,
        tenant: &str,
        cluster: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/v2/streaming/tenants/{}/clusters/{}", tenant, cluster);
        self.api
            .send(self.cluster_request(Method::DELETE, &path, org_id, cluster))
            .await
            .map(drop)
    }

    // =========================================================================
    // CDC
    // =========================================================================

    /// Every CDC stream of a tenant; callers filter for the table they want
    pub async fn list_cdc(
        &self,
        org_id: &str,
        tenant: &str,
        cluster: &str,
    ) -> Result<Vec<CdcEntry>, ApiError> {
        let path = format!("/v3/astra/tenants/{}/cdc", tenant);
        Ok(self
            .api
            .send_json_opt(self.cluster_request(Method::GET, &path, org_id, cluster))
            .await?
            .unwrap_or_default())
    }

    pub async fn enable_cdc(
        &self,
        tenant: &str,
        cluster: &str,
        request: &EnableCdcRequest,
    ) -> Result<(), ApiError> {
        let path = format!("/v3/astra/tenants/{}/cdc", tenant);
        self.api
            .send(
                self.cluster_request(Method::POST, &path, &request.org_id, cluster)
                    .json(request),
            )
            .await
            .map(drop)
    }

    pub async fn disable_cdc(
        &self,
        tenant: &str,
        cluster: &str,
        request: &DisableCdcRequest,
    ) -> Result<(), ApiError> {
        let path = format!("/v3/astra/tenants/{}/cdc", tenant);
        self.api
            .send(
                self.cluster_request(Method::DELETE, &path, &request.org_id, cluster)
                    .json(request),
            )
            .await
            .map(drop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicDomain {
    Persistent,
    NonPersistent,
}

impl TopicDomain {
    pub fn from_persistent(persistent: bool) -> Self {
        if persistent {
            TopicDomain::Persistent
        } else {
            TopicDomain::NonPersistent
        }
    }
}

impl fmt::Display for TopicDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicDomain::Persistent => f.write_str("persistent"),
            TopicDomain::NonPersistent => f.write_str("non-persistent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicName {
    pub domain: TopicDomain,
    pub tenant: String,
    pub namespace: String,
    pub topic: String,
}

impl TopicName {
    fn namespace_path(&self) -> String {
        format!("/admin/v2/{}/{}/{}", self.domain, self.tenant, self.namespace)
    }

    fn path(&self) -> String {
        format!("{}/{}", self.namespace_path(), self.topic)
    }
}

/// `persistent://tenant/namespace/topic`
impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            self.domain, self.tenant, self.namespace, self.topic
        )
    }
}

#[derive(Debug, Deserialize)]
struct PartitionedTopicMetadata {
    partitions: u32,
}

#[derive(Debug, Clone)]
pub struct PulsarAdminClient {
    api: ApiClient,
}

impl PulsarAdminClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn request(&self, method: Method, path: &str, cluster: &str) -> RequestBuilder {
        self.api
            .request(method, path)
            .header(PULSAR_CLUSTER_HEADER, cluster)
    }

    /// Whether the namespace lists the topic as (partitioned or plain) topic
    pub async fn topic_exists(
        &self,
        cluster: &str,
        name: &TopicName,
        partitioned: bool,
    ) -> Result<bool, ApiError> {
        let mut path = name.namespace_path();
        if partitioned {
            path.push_str("/partitioned");
        }
        let topics: Vec<String> = self
            .api
            .send_json_opt(self.request(Method::GET, &path, cluster))
            .await?
            .unwrap_or_default();
        let full_name = name.to_string();
        Ok(topics.iter().any(|t| *t == full_name))
    }

    pub async fn create_topic(
        &self,
        cluster: &str,
        name: &TopicName,
        partitions: Option<u32>,
    ) -> Result<(), ApiError> {
        let builder = match partitions {
            Some(n) => self
                .request(Method::PUT, &format!("{}/partitions", name.path()), cluster)
                .json(&n),
            None => self.request(Method::PUT, &name.path(), cluster),
        };
        self.api.send(builder).await.map(drop)
    }

    /// Partition count of a partitioned topic, `None` when it does not exist
    pub async fn partition_count(
        &self,
        cluster: &str,
        name: &TopicName,
    ) -> Result<Option<u32>, ApiError> {
        let path = format!("{}/partitions", name.path());
        let metadata: Option<PartitionedTopicMetadata> = self
            .api
            .send_json_opt(self.request(Method::GET, &path, cluster))
            .await?;
        Ok(metadata.map(|m| m.partitions))
    }

    pub async fn delete_topic(
        &self,
        cluster: &str,
        name: &TopicName,
        partitioned: bool,
    ) -> Result<(), ApiError> {
        let path = if partitioned {
            format!("{}/partitions", name.path())
        } else {
            name.path()
        };
        self.api
            .send(self.request(Method::DELETE, &path, cluster))
            .await
            .map(drop)
    }
}
