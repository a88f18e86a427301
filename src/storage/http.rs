use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::LakehouseConfig;
use crate::error::{PipelineError, Result};
use crate::storage::ObjectStore;

/// Object store backed by an S3-compatible HTTP storage gateway
/// (MinIO gateway, Supabase storage and the like).
///
/// Credentials travel as bearer + api-key headers; the gateway is trusted to
/// be at-least-once durable on a 2xx response.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

impl HttpObjectStore {
    pub fn new(cfg: &LakehouseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            bucket: cfg.bucket.clone(),
            access_key: cfg.access_key.clone(),
            secret_key: cfg.secret_key.clone(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.endpoint, self.bucket, key)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.secret_key))
            .header("apikey", self.access_key.clone())
    }

    /// Maps a gateway status code onto the error taxonomy.
    fn classify(&self, key: &str, status: reqwest::StatusCode, body: String) -> PipelineError {
        if status == reqwest::StatusCode::NOT_FOUND {
            PipelineError::NotFound(format!("object '{key}'"))
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            PipelineError::TransientIo(format!("gateway returned {status} for '{key}': {body}"))
        } else {
            PipelineError::PermanentIo(format!("gateway returned {status} for '{key}': {body}"))
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn ensure_container(&self) -> Result<()> {
        let url = format!("{}/storage/v1/bucket", self.endpoint);
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "name": self.bucket }))
            .send()
            .await?;
        let status = resp.status();
        // 409 means the bucket already exists, which is the happy path here.
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(self.classify(&self.bucket, status, body))
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let url = self.object_url(key);
        let resp = self
            .authed(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("upsert", "true")])
            .body(bytes)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.classify(key, status, body));
        }
        debug!("Uploaded object {}", key);
        Ok(format!("{}/{}/{}", self.endpoint, self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self.authed(self.client.get(self.object_url(key))).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.classify(key, status, body));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!("{}/storage/v1/object/list/{}", self.endpoint, self.bucket);
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "prefix": prefix }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.classify(prefix, status, body));
        }
        let entries: Vec<ObjectEntry> = resp.json().await?;
        let mut keys: Vec<String> = entries.into_iter().map(|e| e.name).collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let resp = self.authed(self.client.delete(self.object_url(key))).send().await?;
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(self.classify(key, status, body))
        }
    }
}
