use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::analytics;
use crate::catalog::{Catalog, WriteMode};
use crate::config::LakehouseConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{self, TableHandle};
use crate::pipeline::{TaskFuture, TaskPool};
use crate::transforms::TransformRegistry;
use crate::writer::TableWriter;

type PrimaryOutcome = Option<(String, TableHandle)>;

/// Validates, types and publishes the primary silver tables, then derives
/// the join tables once their inputs have landed.
///
/// `albums` and `bands` are mandatory; `reviews` is optional and its absence
/// only skips the datasets derived from it.
pub async fn silver_flow(
    cfg: &LakehouseConfig,
    catalog: Arc<dyn Catalog>,
    writer: TableWriter,
    registry: Arc<TransformRegistry>,
    pool: &TaskPool,
) -> Result<BTreeMap<String, String>> {
    // Primary datasets run as independent pipelines.
    let mut tasks: Vec<(String, TaskFuture<PrimaryOutcome>)> = Vec::new();
    for dataset in registry.datasets() {
        let catalog = catalog.clone();
        let writer = writer.clone();
        let registry = registry.clone();
        let source_id = cfg.bronze_table(dataset);
        let target_id = cfg.silver_table(dataset);
        tasks.push((
            dataset.to_string(),
            Box::pin(async move {
                let transform = registry.get(dataset).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "no transform registered for dataset '{dataset}'"
                    ))
                })?;

                let handle = match catalog.load_table(&source_id).await {
                    Ok(handle) => handle,
                    Err(PipelineError::NotFound(_)) if transform.optional() => {
                        warn!("⚠️ Optional dataset '{}' absent from bronze; skipping", dataset);
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                };

                if frame::row_count(&handle)? == 0 {
                    if transform.optional() {
                        warn!("⚠️ Optional dataset '{}' is empty; skipping", dataset);
                        return Ok(None);
                    }
                    return Err(PipelineError::Validation(format!(
                        "mandatory dataset '{dataset}' is empty"
                    )));
                }

                let transformed = registry.transform(dataset, handle)?;
                writer.write(&transformed, &target_id, WriteMode::Append).await?;
                info!("✅ Published {}", target_id);
                Ok(Some((target_id, transformed)))
            }),
        ));
    }

    let mut published = BTreeMap::new();
    let mut handles: BTreeMap<String, TableHandle> = BTreeMap::new();
    for (dataset, outcome) in pool.run_all(tasks).await? {
        if let Some((target_id, handle)) = outcome {
            published.insert(dataset.clone(), target_id);
            handles.insert(dataset, handle);
        }
    }

    // Derived tables run only after their primary dependencies succeeded.
    let mut derived: Vec<(String, TaskFuture<(String, String)>)> = Vec::new();
    if let (Some(albums), Some(bands)) = (handles.get("albums"), handles.get("bands")) {
        derived.push(write_derived(
            "music_catalog",
            cfg.silver_table("music_catalog"),
            analytics::music_catalog(albums, bands),
            writer.clone(),
        ));
    }
    if let (Some(albums), Some(reviews)) = (handles.get("albums"), handles.get("reviews")) {
        derived.push(write_derived(
            "album_reviews",
            cfg.silver_table("album_reviews"),
            analytics::album_reviews(albums, reviews),
            writer.clone(),
        ));
    }

    for (_, (dataset, target_id)) in pool.run_all(derived).await? {
        published.insert(dataset, target_id);
    }
    Ok(published)
}

fn write_derived(
    dataset: &str,
    target_id: String,
    handle: TableHandle,
    writer: TableWriter,
) -> (String, TaskFuture<(String, String)>) {
    let dataset = dataset.to_string();
    (
        dataset.clone(),
        Box::pin(async move {
            writer.write(&handle, &target_id, WriteMode::Append).await?;
            info!("✅ Published {}", target_id);
            Ok((dataset, target_id))
        }),
    )
}
