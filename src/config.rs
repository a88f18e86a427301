use std::env;
use std::path::PathBuf;

/// Which object-store backend the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local map, used by tests and demos.
    Memory,
    /// Local filesystem rooted at `data_root`.
    Fs,
    /// S3-compatible HTTP gateway at `endpoint`.
    Http,
}

/// Consolidated environment configuration for the lakehouse.
///
/// Built once in `main` and passed by reference into every component
/// constructor; there is no process-wide singleton.
#[derive(Debug, Clone)]
pub struct LakehouseConfig {
    pub backend: StoreBackend,

    // S3/MinIO-style gateway
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,

    // Filesystem backend
    pub data_root: PathBuf,

    // Paths
    pub warehouse_root: String,
    pub landing_prefix: String,
    pub branch: String,

    // Limits
    pub chunk_max_bytes: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub pool_size: usize,

    // Layers
    pub bronze_namespace: String,
    pub silver_namespace: String,
    pub gold_namespace: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl LakehouseConfig {
    /// Resolve the configuration from the environment (after `dotenv`).
    pub fn from_env() -> Self {
        let backend = match env_or("LAKE_STORE", "fs").to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "http" => StoreBackend::Http,
            _ => StoreBackend::Fs,
        };
        Self {
            backend,
            endpoint: env_or("AWS_ENDPOINT", "http://localhost:9000"),
            access_key: env_or("AWS_ACCESS_KEY_ID", "minio"),
            secret_key: env_or("AWS_SECRET_ACCESS_KEY", "minio123"),
            bucket: env_or("BUCKET", "datalake"),
            data_root: PathBuf::from(env_or("DATA_ROOT", "data")),
            warehouse_root: env_or("WAREHOUSE", "warehouse"),
            landing_prefix: env_or("LANDING_PREFIX", "landing/"),
            branch: env_or("LAKE_BRANCH", "main"),
            chunk_max_bytes: env_or("CHUNK_SIZE_BYTES", "921600")
                .parse()
                .unwrap_or(900 * 1024),
            retry_attempts: env_or("WRITE_RETRY_ATTEMPTS", "3").parse().unwrap_or(3),
            retry_delay_ms: env_or("WRITE_RETRY_DELAY_MS", "500").parse().unwrap_or(500),
            pool_size: env_or("STAGE_POOL_SIZE", "4").parse().unwrap_or(4),
            bronze_namespace: env_or("BRONZE_NAMESPACE", "bronze"),
            silver_namespace: env_or("SILVER_NAMESPACE", "silver"),
            gold_namespace: env_or("GOLD_NAMESPACE", "gold"),
        }
    }

    /// Full table id for a table in the bronze layer.
    pub fn bronze_table(&self, table_name: &str) -> String {
        format!("{}.{}", self.bronze_namespace, table_name)
    }

    /// Full table id for a table in the silver layer.
    pub fn silver_table(&self, table_name: &str) -> String {
        format!("{}.{}", self.silver_namespace, table_name)
    }

    /// Full table id for a table in the gold layer.
    pub fn gold_table(&self, table_name: &str) -> String {
        format!("{}.{}", self.gold_namespace, table_name)
    }
}

impl Default for LakehouseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            endpoint: "http://localhost:9000".to_string(),
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            bucket: "datalake".to_string(),
            data_root: PathBuf::from("data"),
            warehouse_root: "warehouse".to_string(),
            landing_prefix: "landing/".to_string(),
            branch: "main".to_string(),
            chunk_max_bytes: 900 * 1024,
            retry_attempts: 3,
            retry_delay_ms: 500,
            pool_size: 4,
            bronze_namespace: "bronze".to_string(),
            silver_namespace: "silver".to_string(),
            gold_namespace: "gold".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids_are_namespace_scoped() {
        let cfg = LakehouseConfig::default();
        assert_eq!(cfg.bronze_table("albums"), "bronze.albums");
        assert_eq!(cfg.silver_table("music_catalog"), "silver.music_catalog");
        assert_eq!(cfg.gold_table("band_avg_scores"), "gold.band_avg_scores");
    }
}
