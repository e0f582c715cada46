use crate::utils::config::RemoteConfig;
use crate::utils::{BatchTranslatorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;

    async fn create_bucket(&self) -> Result<()>;
}

/// Puts `body` under `key`, provisioning the bucket once if the first put fails.
pub async fn upload_with_provisioning(
    store: &dyn ObjectStore,
    key: &str,
    body: Vec<u8>,
) -> Result<()> {
    match store.put_object(key, body.clone()).await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(key = key, error = %first, "Upload failed, provisioning bucket");
            store.create_bucket().await.map_err(|e| {
                BatchTranslatorError::RemoteStoreError(format!(
                    "upload of {} failed ({}) and bucket provisioning failed: {}",
                    key, first, e
                ))
            })?;
            store.put_object(key, body).await
        }
    }
}

/// S3-style object store addressed as `{endpoint}/{bucket}/{key}`.
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    region: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            token: config.token.clone(),
        })
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let request = self
            .client
            .put(url)
            .header("x-amz-bucket-region", &self.region);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(BatchTranslatorError::RemoteStoreError(format!(
            "{} returned {}: {}",
            what, status, body
        )))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let url = format!("{}/{}", self.bucket_url(), key);
        let request = self
            .request(url)
            .header("Content-Type", "application/json")
            .body(body);
        self.send(request, &format!("PUT {}", key)).await
    }

    async fn create_bucket(&self) -> Result<()> {
        self.send(self.request(self.bucket_url()), "bucket creation")
            .await?;
        info!(bucket = %self.bucket, region = %self.region, "Created bucket");
        Ok(())
    }
}

/// In-process object store; puts fail until the bucket exists.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    bucket_exists: Mutex<bool>,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    bucket_creations: Mutex<usize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket() -> Self {
        let store = Self::default();
        *store.bucket_exists.lock().unwrap_or_else(|e| e.into_inner()) = true;
        store
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn bucket_creations(&self) -> usize {
        *self.bucket_creations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if !*self.bucket_exists.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(BatchTranslatorError::RemoteStoreError(
                "NoSuchBucket".to_string(),
            ));
        }
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn create_bucket(&self) -> Result<()> {
        *self.bucket_exists.lock().unwrap_or_else(|e| e.into_inner()) = true;
        *self.bucket_creations.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
