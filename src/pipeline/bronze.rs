use std::collections::BTreeMap;
use std::sync::Arc;

use polars::prelude::*;
use tracing::{info, warn};

use crate::catalog::WriteMode;
use crate::config::LakehouseConfig;
use crate::error::{PipelineError, Result};
use crate::frame;
use crate::pipeline::{TaskFuture, TaskPool};
use crate::storage::ObjectStore;
use crate::transforms::normalize_columns;
use crate::writer::TableWriter;

/// Groups landing object keys (`landing/<dataset>/<ts>_<part>.csv`) by
/// dataset.
fn group_by_dataset(keys: Vec<String>, landing_prefix: &str) -> BTreeMap<String, Vec<String>> {
    let mut by_dataset: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        let Some(rel) = key.strip_prefix(landing_prefix) else {
            continue;
        };
        let Some((dataset, _)) = rel.split_once('/') else {
            warn!("Landing object without a dataset segment: {}", key);
            continue;
        };
        by_dataset.entry(dataset.to_string()).or_default().push(key);
    }
    by_dataset
}

/// Raw capture: concatenates each dataset's landing chunks, normalizes the
/// column names, dedupes whole rows and appends the result to the dataset's
/// bronze table.
pub async fn bronze_flow(
    cfg: &LakehouseConfig,
    store: Arc<dyn ObjectStore>,
    writer: TableWriter,
    pool: &TaskPool,
) -> Result<BTreeMap<String, String>> {
    store.ensure_container().await?;

    let keys = store.list(&cfg.landing_prefix).await?;
    if keys.is_empty() {
        return Err(PipelineError::Validation(format!(
            "no objects under landing prefix '{}'",
            cfg.landing_prefix
        )));
    }
    let by_dataset = group_by_dataset(keys, &cfg.landing_prefix);
    info!("📂 {} landing dataset(s) found", by_dataset.len());

    let mut tasks: Vec<(String, TaskFuture<(String, String)>)> = Vec::new();
    for (dataset, keys) in by_dataset {
        let store = store.clone();
        let writer = writer.clone();
        let table_id = cfg.bronze_table(&dataset);
        let dataset_prefix = format!("{}{}/", cfg.landing_prefix, dataset);
        tasks.push((
            dataset.clone(),
            Box::pin(async move {
                let handle = frame::read_dataset(store.as_ref(), &dataset_prefix, &dataset).await?;
                let handle = normalize_columns(handle)?.unique(None, UniqueKeepStrategy::First);

                writer.write(&handle, &table_id, WriteMode::Append).await?;
                info!("✅ {} chunk(s) captured into {}", keys.len(), table_id);
                Ok((dataset, table_id))
            }),
        ));
    }

    let results = pool.run_all(tasks).await?;
    Ok(results.into_iter().map(|(_, pair)| pair).collect())
}
