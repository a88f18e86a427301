use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::catalog::{Catalog, WriteMode};
use crate::error::Result;
use crate::frame::{self, TableHandle};

/// Bounded retry with a fixed delay. The total attempt budget is the
/// pipeline's only timeout; there is no wall-clock deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// Publishes table handles through the catalog boundary.
///
/// Creates the table on first write from the handle's schema, then writes in
/// the requested mode. Transient failures are retried up to the policy's
/// budget; everything else surfaces immediately. Safe to re-invoke after a
/// failed attempt (at-least-once; append-mode duplicates are the caller's
/// concern).
#[derive(Clone)]
pub struct TableWriter {
    catalog: Arc<dyn Catalog>,
    retry: RetryPolicy,
}

impl TableWriter {
    pub fn new(catalog: Arc<dyn Catalog>, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    pub async fn write(&self, handle: &TableHandle, table_id: &str, mode: WriteMode) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_write(handle, table_id, mode).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!("Write to {} recovered on attempt {}", table_id, attempt);
                    }
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        "Write attempt {}/{} to {} failed: {}; retrying in {:?}",
                        attempt, self.retry.max_attempts, table_id, e, self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_write(&self, handle: &TableHandle, table_id: &str, mode: WriteMode) -> Result<()> {
        if !self.catalog.table_exists(table_id).await? {
            let schema = frame::snapshot_schema(handle)?;
            self.catalog.create_table(table_id, &schema).await?;
        }
        self.catalog.write(table_id, handle.clone(), mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ObjectStoreCatalog;
    use crate::error::PipelineError;
    use crate::frame::TableSchema;
    use async_trait::async_trait;
    use polars::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample() -> TableHandle {
        df!("id" => [1i64, 2, 3]).unwrap().lazy()
    }

    fn object_store_catalog() -> Arc<dyn Catalog> {
        let store = Arc::new(crate::storage::InMemoryObjectStore::new("test-bucket"));
        Arc::new(ObjectStoreCatalog::new(store, "warehouse", "main"))
    }

    /// Catalog whose writes fail transiently a fixed number of times.
    struct FlakyCatalog {
        inner: Arc<dyn Catalog>,
        failures_left: AtomicU32,
        write_calls: AtomicU32,
    }

    impl FlakyCatalog {
        fn new(failures: u32) -> Self {
            Self {
                inner: object_store_catalog(),
                failures_left: AtomicU32::new(failures),
                write_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Catalog for FlakyCatalog {
        async fn table_exists(&self, table_id: &str) -> Result<bool> {
            self.inner.table_exists(table_id).await
        }

        async fn create_table(&self, table_id: &str, schema: &TableSchema) -> Result<()> {
            self.inner.create_table(table_id, schema).await
        }

        async fn load_table(&self, table_id: &str) -> Result<TableHandle> {
            self.inner.load_table(table_id).await
        }

        async fn write(&self, table_id: &str, handle: TableHandle, mode: WriteMode) -> Result<()> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(PipelineError::TransientIo("connection reset".to_string()));
            }
            self.inner.write(table_id, handle, mode).await
        }
    }

    #[tokio::test]
    async fn create_happens_once_and_appends_accumulate() {
        let catalog = object_store_catalog();
        let writer = TableWriter::new(catalog.clone(), RetryPolicy::new(3, 1));

        writer.write(&sample(), "bronze.albums", WriteMode::Append).await.unwrap();
        writer.write(&sample(), "bronze.albums", WriteMode::Append).await.unwrap();

        assert!(catalog.table_exists("bronze.albums").await.unwrap());
        let handle = catalog.load_table("bronze.albums").await.unwrap();
        assert_eq!(frame::row_count(&handle).unwrap(), 6);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let catalog = Arc::new(FlakyCatalog::new(2));
        let writer = TableWriter::new(catalog.clone(), RetryPolicy::new(3, 1));

        writer.write(&sample(), "bronze.albums", WriteMode::Append).await.unwrap();
        assert_eq!(catalog.write_calls.load(Ordering::SeqCst), 3);

        let handle = catalog.load_table("bronze.albums").await.unwrap();
        assert_eq!(frame::row_count(&handle).unwrap(), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let catalog = Arc::new(FlakyCatalog::new(5));
        let writer = TableWriter::new(catalog.clone(), RetryPolicy::new(3, 1));

        let err = writer.write(&sample(), "bronze.albums", WriteMode::Append).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(catalog.write_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn schema_conflicts_are_not_retried() {
        let catalog = object_store_catalog();
        let writer = TableWriter::new(catalog.clone(), RetryPolicy::new(3, 1));

        writer.write(&sample(), "silver.albums", WriteMode::Append).await.unwrap();

        let divergent = df!("id" => ["x"]).unwrap().lazy();
        let err = writer.write(&divergent, "silver.albums", WriteMode::Append).await.unwrap_err();
        assert!(matches!(err, PipelineError::WriteConflict { .. }));
    }
}
