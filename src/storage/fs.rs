use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::storage::ObjectStore;

/// Filesystem-backed object store rooted at `<root>/<bucket>`.
///
/// Each object is written together with a `.sha256` sidecar; `get` verifies
/// the digest when the sidecar is present and rejects corrupted objects.
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

const DIGEST_SUFFIX: &str = ".sha256";

impl FsObjectStore {
    pub fn new(root: &Path, bucket: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            bucket: bucket.to_string(),
        }
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_dir().join(key)
    }

    fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    fn walk(dir: &Path, bucket_dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::walk(&path, bucket_dir, keys)?;
            } else if let Ok(rel) = path.strip_prefix(bucket_dir) {
                let key = rel.to_string_lossy().replace('\\', "/");
                if !key.ends_with(DIGEST_SUFFIX) {
                    keys.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn ensure_container(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.bucket_dir()).await?;
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let digest = Self::digest(&bytes);
        tokio::fs::write(&path, &bytes).await?;
        tokio::fs::write(sidecar(&path), digest.as_bytes()).await?;
        debug!("Stored object {} ({} bytes)", key, bytes.len());
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::NotFound(format!("object '{key}'"))
            } else {
                e.into()
            }
        })?;
        match tokio::fs::read(sidecar(&path)).await {
            Ok(expected) => {
                let actual = Self::digest(&bytes);
                if expected != actual.as_bytes() {
                    return Err(PipelineError::PermanentIo(format!(
                        "digest mismatch for object '{key}'"
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No digest sidecar for {}, skipping verification", key);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(bytes)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let bucket_dir = self.bucket_dir();
        if !bucket_dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        Self::walk(&bucket_dir, &bucket_dir, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(sidecar(&path)).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(DIGEST_SUFFIX);
    PathBuf::from(os)
}
