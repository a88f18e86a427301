use std::sync::Arc;

use async_trait::async_trait;
use polars::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::frame::{self, TableHandle, TableSchema};
use crate::storage::ObjectStore;

/// Whether a write adds to the table's history or replaces its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Overwrite,
}

/// Catalog boundary: maps `<namespace>.<table>` identifiers to schema and
/// data. The catalog owns the source-of-truth schema snapshot; the pipeline
/// holds no table state between runs.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn table_exists(&self, table_id: &str) -> Result<bool>;

    /// Creates the table with the given schema snapshot. The snapshot is
    /// taken from the first successful write's frame.
    async fn create_table(&self, table_id: &str, schema: &TableSchema) -> Result<()>;

    /// Loads all of a table's data parts into one lazy handle.
    async fn load_table(&self, table_id: &str) -> Result<TableHandle>;

    /// Materializes the handle and persists it in the requested mode.
    async fn write(&self, table_id: &str, handle: TableHandle, mode: WriteMode) -> Result<()>;
}

/// Catalog persisted in the object store: one `schema.json` snapshot plus
/// `part-<uuid>.parquet` data files per table, under
/// `<warehouse>/<branch>/<namespace>/<table>/`. The branch parameter selects
/// an isolated view of the warehouse.
pub struct ObjectStoreCatalog {
    store: Arc<dyn ObjectStore>,
    warehouse_root: String,
    branch: String,
}

impl ObjectStoreCatalog {
    pub fn new(store: Arc<dyn ObjectStore>, warehouse_root: &str, branch: &str) -> Self {
        Self {
            store,
            warehouse_root: warehouse_root.trim_end_matches('/').to_string(),
            branch: branch.to_string(),
        }
    }

    fn table_dir(&self, table_id: &str) -> Result<String> {
        let (namespace, table) = table_id.split_once('.').ok_or_else(|| {
            PipelineError::Validation(format!(
                "table id '{table_id}' is not namespace-scoped (<namespace>.<table>)"
            ))
        })?;
        if namespace.is_empty() || table.is_empty() {
            return Err(PipelineError::Validation(format!(
                "table id '{table_id}' has an empty namespace or table name"
            )));
        }
        Ok(format!(
            "{}/{}/{}/{}",
            self.warehouse_root, self.branch, namespace, table
        ))
    }

    fn schema_key(&self, table_id: &str) -> Result<String> {
        Ok(format!("{}/schema.json", self.table_dir(table_id)?))
    }

    fn part_prefix(&self, table_id: &str) -> Result<String> {
        Ok(format!("{}/part-", self.table_dir(table_id)?))
    }

    async fn load_schema(&self, table_id: &str) -> Result<TableSchema> {
        let bytes = self.store.get(&self.schema_key(table_id)?).await.map_err(|e| match e {
            PipelineError::NotFound(_) => {
                PipelineError::NotFound(format!("table '{table_id}' does not exist"))
            }
            other => other,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Catalog for ObjectStoreCatalog {
    async fn table_exists(&self, table_id: &str) -> Result<bool> {
        match self.store.get(&self.schema_key(table_id)?).await {
            Ok(_) => Ok(true),
            Err(PipelineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_table(&self, table_id: &str, schema: &TableSchema) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(schema)?;
        self.store.put(&self.schema_key(table_id)?, bytes).await?;
        info!("Created table {}", table_id);
        Ok(())
    }

    async fn load_table(&self, table_id: &str) -> Result<TableHandle> {
        let prefix = self.part_prefix(table_id)?;
        let keys = self.store.list(&prefix).await?;
        if keys.is_empty() {
            return Err(PipelineError::NotFound(format!(
                "table '{table_id}' has no data parts"
            )));
        }
        let mut frames = Vec::with_capacity(keys.len());
        for key in &keys {
            let bytes = self.store.get(key).await?;
            frames.push(frame::read_parquet_bytes(&bytes)?.lazy());
        }
        Ok(concat(frames, UnionArgs::default())?)
    }

    async fn write(&self, table_id: &str, handle: TableHandle, mode: WriteMode) -> Result<()> {
        let incoming = frame::snapshot_schema(&handle)?;
        let existing = self.load_schema(table_id).await?;

        match mode {
            WriteMode::Append => {
                existing.check_compatible(&incoming).map_err(|reason| {
                    PipelineError::WriteConflict {
                        table: table_id.to_string(),
                        reason,
                    }
                })?;
            }
            WriteMode::Overwrite => {
                // Overwrite replaces content and snapshot together.
                if existing != incoming {
                    let bytes = serde_json::to_vec_pretty(&incoming)?;
                    self.store.put(&self.schema_key(table_id)?, bytes).await?;
                }
                let prefix = self.part_prefix(table_id)?;
                for key in self.store.list(&prefix).await? {
                    self.store.delete(&key).await?;
                }
            }
        }

        let mut df = handle.collect()?;
        let bytes = frame::write_parquet_bytes(&mut df)?;
        let key = format!("{}{}.parquet", self.part_prefix(table_id)?, Uuid::new_v4());
        let location = self.store.put(&key, bytes).await?;
        debug!(
            "Wrote {} row(s) to {} at {} ({:?})",
            df.height(),
            table_id,
            location,
            mode
        );
        Ok(())
    }
}
