//! Docker Engine API client implementation.
//!
//! This module provides the HTTP client for the swarm endpoints of the Docker
//! Engine API. Only TCP transports are supported (`tcp://`, `http://`,
//! `https://`); TLS material is read from `DOCKER_CERT_PATH` in the layout
//! produced by `docker-machine` (`ca.pem`, `cert.pem`, `key.pem`).

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::{DockerError, Result, StackError};

use super::gateway::ClusterGateway;
use super::types::{
    Filters, IdResponse, Network, NetworkCreateRequest, NetworkCreateResponse, Secret, Service,
    ServiceCreateResponse, ServiceUpdateResponse, ServiceWriteOptions, SwarmSecretSpec,
    SwarmServiceSpec, SystemInfo, Version,
};

/// Default daemon address.
pub const DEFAULT_DOCKER_HOST: &str = "tcp://127.0.0.1:2375";

/// Default Engine API version.
pub const DEFAULT_API_VERSION: &str = "1.41";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for idempotent reads.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 500;

/// Header carrying encoded registry credentials.
const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Connection settings for the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    /// Daemon address, e.g. `tcp://10.0.0.1:2376`.
    pub host: String,
    /// Engine API version, with or without a leading `v`.
    pub api_version: String,
    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`.
    pub cert_path: Option<PathBuf>,
    /// Verify the daemon certificate.
    pub tls_verify: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_DOCKER_HOST.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            cert_path: None,
            tls_verify: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DockerSettings {
    /// Returns true if the connection uses TLS.
    #[must_use]
    pub fn uses_tls(&self) -> bool {
        self.tls_verify || self.cert_path.is_some() || self.host.starts_with("https://")
    }

    /// Builds the versioned API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`DockerError::UnsupportedHost`] for non-TCP transports.
    pub fn base_url(&self) -> Result<String> {
        let scheme = if self.uses_tls() { "https" } else { "http" };
        let address = if let Some(rest) = self.host.strip_prefix("tcp://") {
            format!("{scheme}://{rest}")
        } else if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.clone()
        } else {
            return Err(DockerError::UnsupportedHost {
                host: self.host.clone(),
            }
            .into());
        };

        let version = self.api_version.trim_start_matches('v');
        Ok(format!("{}/v{version}", address.trim_end_matches('/')))
    }
}

/// Error body returned by the daemon.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    /// HTTP client.
    client: Client,
    /// Versioned base URL.
    base_url: String,
}

impl DockerClient {
    /// Creates a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unsupported, TLS material cannot be
    /// loaded, or the HTTP client cannot be created.
    pub fn new(settings: &DockerSettings) -> Result<Self> {
        let base_url = settings.base_url()?;

        let mut builder = Client::builder().timeout(Duration::from_secs(settings.timeout_secs));
        if let Some(cert_path) = &settings.cert_path {
            builder = Self::configure_tls(builder, cert_path)?;
        }
        if settings.uses_tls() && !settings.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| DockerError::network(format!("Failed to create HTTP client: {e}")))?;

        debug!("Docker client targeting {base_url}");
        Ok(Self { client, base_url })
    }

    fn configure_tls(
        builder: reqwest::ClientBuilder,
        cert_path: &Path,
    ) -> Result<reqwest::ClientBuilder> {
        let tls_error = |message: String| StackError::from(DockerError::Tls { message });
        let mut builder = builder;

        let ca_path = cert_path.join("ca.pem");
        if ca_path.exists() {
            let pem = std::fs::read(&ca_path)
                .map_err(|e| tls_error(format!("cannot read {}: {e}", ca_path.display())))?;
            let ca = Certificate::from_pem(&pem)
                .map_err(|e| tls_error(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(ca);
        }

        let cert = cert_path.join("cert.pem");
        let key = cert_path.join("key.pem");
        if cert.exists() && key.exists() {
            let mut pem = std::fs::read(&cert)
                .map_err(|e| tls_error(format!("cannot read {}: {e}", cert.display())))?;
            pem.extend(
                std::fs::read(&key)
                    .map_err(|e| tls_error(format!("cannot read {}: {e}", key.display())))?,
            );
            let identity = Identity::from_pem(&pem)
                .map_err(|e| tls_error(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }

        Ok(builder)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Executes an idempotent GET, retrying transient failures.
    async fn get<T: DeserializeOwned>(&self, path: &str, filters: Option<&Filters>) -> Result<T> {
        let query = match filters {
            Some(filters) if !filters.is_empty() => vec![("filters", filters.to_query()?)],
            _ => Vec::new(),
        };

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for GET {path}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            let request = self.client.get(self.url(path)).query(&query);
            match Self::send(request).await {
                Ok(response) => return Self::decode(response).await,
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DockerError::network("Max retries exceeded").into()))
    }

    /// Executes a POST with a JSON body. Never retried.
    async fn post<B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
        registry_auth: Option<&str>,
    ) -> Result<Response> {
        let mut request = self
            .client
            .post(self.url(path))
            .query(query)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(auth) = registry_auth.filter(|a| !a.is_empty()) {
            request = request.header(REGISTRY_AUTH_HEADER, auth);
        }
        Self::send(request).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        Self::send(self.client.delete(self.url(path))).await?;
        Ok(())
    }

    /// Sends a request and maps error statuses.
    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| DockerError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        trace!("Docker API responded with {status}");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);

        if status.as_u16() == 404 {
            return Err(DockerError::not_found(message).into());
        }
        Err(DockerError::api_error(status.as_u16(), message).into())
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json().await.map_err(|e| {
            DockerError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            }
            .into()
        })
    }

    fn version_query(version: Version) -> [(&'static str, String); 1] {
        [("version", version.index.to_string())]
    }
}

#[async_trait]
impl ClusterGateway for DockerClient {
    async fn daemon_info(&self) -> Result<SystemInfo> {
        self.get("/info", None).await
    }

    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>> {
        self.get("/services", Some(filters)).await
    }

    async fn create_service(
        &self,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceCreateResponse> {
        debug!("POST /services/create {}", spec.name);
        let response = self
            .post(
                "/services/create",
                &[],
                spec,
                options.encoded_registry_auth.as_deref(),
            )
            .await?;
        Self::decode(response).await
    }

    async fn update_service(
        &self,
        id: &str,
        version: Version,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceUpdateResponse> {
        debug!("POST /services/{id}/update version {}", version.index);
        let response = self
            .post(
                &format!("/services/{id}/update"),
                &Self::version_query(version),
                spec,
                options.encoded_registry_auth.as_deref(),
            )
            .await?;
        Self::decode(response).await
    }

    async fn remove_service(&self, id: &str) -> Result<()> {
        self.delete(&format!("/services/{id}")).await
    }

    async fn list_networks(&self, filters: &Filters) -> Result<Vec<Network>> {
        self.get("/networks", Some(filters)).await
    }

    async fn inspect_network(&self, name: &str) -> Result<Network> {
        self.get(&format!("/networks/{name}"), None)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    DockerError::not_found(format!("network {name}")).into()
                } else {
                    e
                }
            })
    }

    async fn create_network(&self, request: &NetworkCreateRequest) -> Result<String> {
        let response = self.post("/networks/create", &[], request, None).await?;
        let created: NetworkCreateResponse = Self::decode(response).await?;
        if !created.warning.is_empty() {
            warn!("Network {}: {}", request.name, created.warning);
        }
        Ok(created.id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        self.delete(&format!("/networks/{id}")).await
    }

    async fn list_secrets(&self, filters: &Filters) -> Result<Vec<Secret>> {
        self.get("/secrets", Some(filters)).await
    }

    async fn inspect_secret(&self, name: &str) -> Result<Secret> {
        self.get(&format!("/secrets/{name}"), None)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    DockerError::not_found(format!("secret {name}")).into()
                } else {
                    e
                }
            })
    }

    async fn create_secret(&self, spec: &SwarmSecretSpec) -> Result<String> {
        let response = self.post("/secrets/create", &[], spec, None).await?;
        let created: IdResponse = Self::decode(response).await?;
        Ok(created.id)
    }

    async fn update_secret(&self, id: &str, version: Version, spec: &SwarmSecretSpec) -> Result<()> {
        self.post(
            &format!("/secrets/{id}/update"),
            &Self::version_query(version),
            spec,
            None,
        )
        .await?;
        Ok(())
    }

    async fn remove_secret(&self, id: &str) -> Result<()> {
        self.delete(&format!("/secrets/{id}")).await
    }
}
