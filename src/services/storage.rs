//! File storage backends for uploads, profile images and exports.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder, path::Path as ObjectPath, ObjectStore, PutPayload,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::{AppConfig, StorageConfig};
use crate::types::StorageProvider;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported storage provider: {0}")]
    Unsupported(String),

    #[error("Storage provider {0} is not configured")]
    NotConfigured(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A place files can be written to and removed from
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Disk name recorded on the upload row
    fn disk(&self) -> &'static str;
}

/// Local file system backend rooted at `STORAGE_LOCAL_ROOT`
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = std::path::Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir | std::path::Component::RootDir | std::path::Component::Prefix(_)
            )
        });
        if escapes || path.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let full_path = self.full_path(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!("Saved file to {:?}", full_path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn disk(&self) -> &'static str {
        "local"
    }
}

/// S3 or GCS bucket via `object_store`
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    disk: &'static str,
}

impl ObjectStorage {
    /// Credentials and region come from the standard `AWS_*` variables.
    pub fn s3(bucket: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env().with_bucket_name(bucket).build()?;
        Ok(Self {
            store: Arc::new(store),
            disk: "s3",
        })
    }

    /// Credentials come from `GOOGLE_SERVICE_ACCOUNT` / `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn gcs(bucket: &str) -> Result<Self> {
        let store = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket).build()?;
        Ok(Self {
            store: Arc::new(store),
            disk: "gcs",
        })
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.store.put(&ObjectPath::from(path), PutPayload::from(data)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.store.delete(&ObjectPath::from(path)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn disk(&self) -> &'static str {
        self.disk
    }
}

/// Where a file ended up
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: String,
    pub disk: String,
    pub provider: StorageProvider,
}

/// Maps provider names onto configured backends
pub struct StorageService {
    backends: HashMap<StorageProvider, Arc<dyn StorageBackend>>,
    default_provider: StorageProvider,
    app_url: String,
    public_url: String,
}

impl StorageService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let storage: &StorageConfig = &config.storage;
        let mut backends: HashMap<StorageProvider, Arc<dyn StorageBackend>> = HashMap::new();
        backends.insert(StorageProvider::Local, Arc::new(LocalStorage::new(&storage.local_root)));
        if let Some(bucket) = &storage.s3_bucket {
            backends.insert(StorageProvider::S3, Arc::new(ObjectStorage::s3(bucket)?));
        }
        if let Some(bucket) = &storage.gcs_bucket {
            backends.insert(StorageProvider::Google, Arc::new(ObjectStorage::gcs(bucket)?));
        }

        let default_provider = storage
            .default_provider
            .parse()
            .map_err(|_| StorageError::Unsupported(storage.default_provider.clone()))?;

        Ok(Self {
            backends,
            default_provider,
            app_url: config.app.url.clone(),
            public_url: storage.public_url.clone(),
        })
    }

    /// Local-only service, used by tests and tooling
    pub fn local(root: impl Into<PathBuf>, app_url: &str) -> Self {
        let mut backends: HashMap<StorageProvider, Arc<dyn StorageBackend>> = HashMap::new();
        backends.insert(StorageProvider::Local, Arc::new(LocalStorage::new(root)));
        Self {
            backends,
            default_provider: StorageProvider::Local,
            app_url: app_url.trim_end_matches('/').to_string(),
            public_url: format!("{}/storage", app_url.trim_end_matches('/')),
        }
    }

    pub fn default_provider(&self) -> StorageProvider {
        self.default_provider
    }

    fn backend(&self, provider: StorageProvider) -> Result<&Arc<dyn StorageBackend>> {
        match provider {
            StorageProvider::Local | StorageProvider::S3 | StorageProvider::Google => self
                .backends
                .get(&provider)
                .ok_or_else(|| StorageError::NotConfigured(provider.to_string())),
            other => Err(StorageError::Unsupported(other.to_string())),
        }
    }

    pub async fn store(&self, provider: StorageProvider, path: &str, data: Bytes) -> Result<StoredFile> {
        let backend = self.backend(provider)?;
        backend.put(path, data).await?;
        Ok(StoredFile {
            path: path.to_string(),
            disk: backend.disk().to_string(),
            provider,
        })
    }

    pub async fn remove(&self, provider: StorageProvider, path: &str) -> Result<()> {
        self.backend(provider)?.delete(path).await
    }

    /// Public URL for a stored file: cloudinary paths are already URLs, local
    /// files are served under `APP_URL/storage`, buckets under `STORAGE_PUBLIC_URL`.
    pub fn url_for(&self, provider: &str, disk: &str, path: &str) -> String {
        if provider == StorageProvider::Cloudinary.as_str() {
            return path.to_string();
        }
        if disk == "local" {
            return format!("{}/storage/{}", self.app_url, path.trim_start_matches('/'));
        }
        format!("{}/{}", self.public_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("atlas-storage-{}", uuid::Uuid::new_v4().simple()))
    }

    #[tokio::test]
    async fn local_round_trip_and_delete() {
        let root = temp_root();
        let service = StorageService::local(&root, "http://localhost:3000");

        let stored = service
            .store(StorageProvider::Local, "docs/a.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(stored.disk, "local");
        assert_eq!(std::fs::read(root.join("docs/a.txt")).unwrap(), b"hello");

        service.remove(StorageProvider::Local, "docs/a.txt").await.unwrap();
        assert!(!root.join("docs/a.txt").exists());
        // Deleting twice is fine
        service.remove(StorageProvider::Local, "docs/a.txt").await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn paths_cannot_escape_the_root() {
        let service = StorageService::local(temp_root(), "http://localhost:3000");
        let err = service
            .store(StorageProvider::Local, "../outside.txt", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn unconfigured_and_unsupported_providers_fail() {
        let service = StorageService::local(temp_root(), "http://localhost:3000");
        assert!(matches!(
            service.store(StorageProvider::S3, "a", Bytes::new()).await,
            Err(StorageError::NotConfigured(_))
        ));
        let err = service.store(StorageProvider::Dropbox, "a", Bytes::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Unsupported storage provider: dropbox");
    }

    #[test]
    fn urls_depend_on_provider_and_disk() {
        let service = StorageService::local(temp_root(), "http://localhost:3000/");
        assert_eq!(
            service.url_for("local", "local", "uploads/x.png"),
            "http://localhost:3000/storage/uploads/x.png"
        );
        assert_eq!(
            service.url_for("cloudinary", "cloudinary", "https://res.cloudinary.com/x.png"),
            "https://res.cloudinary.com/x.png"
        );
        assert_eq!(
            service.url_for("s3", "s3", "uploads/x.png"),
            "http://localhost:3000/storage/uploads/x.png"
        );
    }
}
