//! Cluster API over HTTP using Kubernetes REST conventions.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{ClusterApi, SourceReader, source_resource};
use crate::config::ClusterConfig;
use crate::error::ApiError;
use crate::types::{ApiResource, DynamicObject, ObjectRef, WatchedResource};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Error body returned by the API server
#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct HttpClusterApi {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpClusterApi {
    pub fn new(client: reqwest::Client, base: Url, token: Option<String>) -> Self {
        Self {
            client,
            base,
            token,
        }
    }

    /// Build a client from the `[cluster]` section.
    ///
    /// Without `api_server`, falls back to the in-cluster service account.
    pub fn from_config(config: &ClusterConfig) -> anyhow::Result<Self> {
        let sa_dir = PathBuf::from(SERVICE_ACCOUNT_DIR);
        let (server, token_file, ca_file) = match &config.api_server {
            Some(server) => (
                server.clone(),
                config.token_file.clone(),
                config.ca_file.clone(),
            ),
            None => {
                let host = std::env::var("KUBERNETES_SERVICE_HOST").context(
                    "cluster.api_server is not set and KUBERNETES_SERVICE_HOST is not defined",
                )?;
                let port =
                    std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
                let host = if host.contains(':') {
                    format!("[{}]", host)
                } else {
                    host
                };
                (
                    format!("https://{}:{}", host, port),
                    Some(config.token_file.clone().unwrap_or(sa_dir.join("token"))),
                    Some(config.ca_file.clone().unwrap_or(sa_dir.join("ca.crt"))),
                )
            }
        };

        let base = Url::parse(&server)
            .with_context(|| format!("Invalid cluster API server URL: {}", server))?;
        let token = token_file.as_deref().map(read_token).transpose()?;

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("revwatch/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify);
        if let Some(ca_file) = &ca_file {
            let pem = std::fs::read(ca_file)
                .with_context(|| format!("Failed to read CA bundle: {}", ca_file.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid CA bundle: {}", ca_file.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder.build().context("Failed to build cluster HTTP client")?;

        Ok(Self::new(client, base, token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&DynamicObject>,
        kind: &str,
        object: &ObjectRef,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "cluster API request");

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::Transport)?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(ApiError::Decode);
        }

        let message = serde_json::from_str::<StatusBody>(&text)
            .map(|s| s.message)
            .unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => ApiError::NotFound {
                kind: kind.to_string(),
                object: object.clone(),
            },
            StatusCode::CONFLICT => ApiError::Conflict {
                kind: kind.to_string(),
                object: object.clone(),
                message,
            },
            other => ApiError::Status {
                status: other.as_u16(),
                message: if message.is_empty() { text } else { message },
            },
        })
    }
}

fn read_token(path: &Path) -> anyhow::Result<String> {
    let token = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bearer token: {}", path.display()))?;
    Ok(token.trim().to_string())
}

fn object_ref(obj: &DynamicObject) -> ObjectRef {
    ObjectRef::new(obj.namespace(), obj.name())
}

#[async_trait]
impl ClusterApi for HttpClusterApi {
    async fn get(
        &self,
        resource: &ApiResource,
        object: &ObjectRef,
    ) -> Result<DynamicObject, ApiError> {
        let path = resource.object_path(&object.namespace, &object.name);
        self.send(Method::GET, &path, None, &resource.kind, object)
            .await
    }

    async fn create(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let object = object_ref(obj);
        let path = resource.collection_path(&object.namespace);
        self.send(Method::POST, &path, Some(obj), &resource.kind, &object)
            .await
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let object = object_ref(obj);
        let path = resource.object_path(&object.namespace, &object.name);
        self.send(Method::PUT, &path, Some(obj), &resource.kind, &object)
            .await
    }
}

#[async_trait]
impl SourceReader for HttpClusterApi {
    async fn get_source(&self, object: &ObjectRef) -> Result<Option<WatchedResource>, ApiError> {
        let resource = source_resource();
        let path = resource.object_path(&object.namespace, &object.name);
        match self
            .send::<WatchedResource>(Method::GET, &path, None, &resource.kind, object)
            .await
        {
            Ok(source) => Ok(Some(source)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
