//! Shared HTTP plumbing for the Astra API families
//!
//! Every family (DevOps, Streaming, Pulsar admin) talks JSON over HTTPS with a
//! bearer token. [`ApiClient`] owns one `reqwest::Client` per family and turns
//! non-success responses into [`ApiError`], which knows whether a failure is
//! worth retrying.

use std::time::Duration;

use astra_core::convergence::ProbeError;
use log::debug;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Network failures, throttling and server errors may clear up on their own
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Decode { .. } => false,
        }
    }
}

impl From<ApiError> for ProbeError {
    fn from(e: ApiError) -> Self {
        if e.is_transient() {
            ProbeError::transient(e.to_string())
        } else {
            ProbeError::permanent(e.to_string())
        }
    }
}

/// Bearer-authenticated JSON client rooted at one base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                method: "INIT".to_string(),
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Send a request, mapping non-2xx responses to [`ApiError::Status`]
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build().map_err(|source| ApiError::Transport {
            method: "BUILD".to_string(),
            url: self.base_url.clone(),
            source,
        })?;
        let method = request.method().to_string();
        let url = request.url().to_string();
        debug!("{} {}", method, url);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|source| ApiError::Transport {
                method: method.clone(),
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            method,
            url,
            status,
            body: truncate(body),
        })
    }

    /// Send a request and decode the JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        decode(response).await
    }

    /// Like [`send_json`](Self::send_json), with 404 mapped to `None`
    pub async fn send_json_opt<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        match self.send_json(builder).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let url = response.url().to_string();
    let text = response.text().await.map_err(|e| ApiError::Decode {
        url: url.clone(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode {
        url,
        message: e.to_string(),
    })
}

const MAX_ERROR_BODY: usize = 512;

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::convergence::ProbeErrorKind;
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Org {
        id: String,
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), "AstraCS:test", "astra-test", Duration::from_secs(5)).unwrap()
    }

    fn status_error(status: u16) -> ApiError {
        ApiError::Status {
            method: "GET".to_string(),
            url: "http://localhost/v2/databases/x".to_string(),
            status: StatusCode::from_u16(status).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn status_classification() {
        assert!(status_error(500).is_transient());
        assert!(status_error(503).is_transient());
        assert!(status_error(429).is_transient());
        assert!(!status_error(400).is_transient());
        assert!(!status_error(404).is_transient());
        assert!(status_error(404).is_not_found());

        assert_eq!(ProbeError::from(status_error(502)).kind, ProbeErrorKind::Transient);
        assert_eq!(ProbeError::from(status_error(403)).kind, ProbeErrorKind::Permanent);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = truncate("x".repeat(2000));
        assert_eq!(body.len(), MAX_ERROR_BODY + 3);
        assert!(body.ends_with("..."));
    }

    #[tokio::test]
    async fn sends_bearer_token_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/currentOrg"))
            .and(header("authorization", "Bearer AstraCS:test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "org-1"})))
            .mount(&server)
            .await;

        let client = client(&server);
        let org: Org = client
            .send_json(client.request(Method::GET, "/v2/currentOrg"))
            .await
            .unwrap();
        assert_eq!(org.id, "org-1");
    }

    #[tokio::test]
    async fn not_found_maps_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such database"))
            .mount(&server)
            .await;

        let client = client(&server);
        let result: Option<Org> = client
            .send_json_opt(client.request(Method::GET, "/v2/databases/missing"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("keyspace exists"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .send(client.request(Method::POST, "/v2/databases/3f1c/keyspaces/app"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert!(err.to_string().contains("keyspace exists"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("corrupt{json"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .send_json::<Org>(client.request(Method::GET, "/v2/currentOrg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
