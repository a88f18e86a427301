use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::analytics::{self, BRAZIL_ALIASES};
use crate::catalog::{Catalog, WriteMode};
use crate::config::LakehouseConfig;
use crate::error::{PipelineError, Result};
use crate::frame::{self, TableHandle};
use crate::pipeline::{TaskFuture, TaskPool};
use crate::writer::TableWriter;

/// Review analytics over the silver layer. Both inputs are mandatory; the
/// outputs are snapshots, so they are written in overwrite mode.
pub async fn gold_flow(
    cfg: &LakehouseConfig,
    catalog: Arc<dyn Catalog>,
    writer: TableWriter,
    pool: &TaskPool,
) -> Result<BTreeMap<String, String>> {
    // Gather the declared inputs concurrently.
    let mut loads: Vec<(String, TaskFuture<(String, TableHandle)>)> = Vec::new();
    for dataset in ["music_catalog", "reviews"] {
        let catalog = catalog.clone();
        let table_id = cfg.silver_table(dataset);
        loads.push((
            dataset.to_string(),
            Box::pin(async move {
                let handle = catalog.load_table(&table_id).await?;
                if frame::row_count(&handle)? == 0 {
                    return Err(PipelineError::Validation(format!(
                        "mandatory dataset '{dataset}' is empty"
                    )));
                }
                Ok((dataset.to_string(), handle))
            }),
        ));
    }
    let inputs: BTreeMap<String, TableHandle> = pool
        .run_all(loads)
        .await?
        .into_iter()
        .map(|(_, pair)| pair)
        .collect();
    let music = inputs
        .get("music_catalog")
        .ok_or_else(|| PipelineError::NotFound("silver.music_catalog".to_string()))?;
    let reviews = inputs
        .get("reviews")
        .ok_or_else(|| PipelineError::NotFound("silver.reviews".to_string()))?;

    let outputs = vec![
        ("top10_by_country", analytics::top10_by_country(music, reviews)),
        ("band_avg_scores", analytics::band_avg_scores(music, reviews)),
        (
            "brazilian_bands",
            analytics::filter_country(&analytics::band_avg_scores(music, reviews), BRAZIL_ALIASES),
        ),
    ];

    let mut tasks: Vec<(String, TaskFuture<(String, String)>)> = Vec::new();
    for (dataset, handle) in outputs {
        let writer = writer.clone();
        let table_id = cfg.gold_table(dataset);
        tasks.push((
            dataset.to_string(),
            Box::pin(async move {
                writer.write(&handle, &table_id, WriteMode::Overwrite).await?;
                info!("✅ Published {}", table_id);
                Ok((dataset.to_string(), table_id))
            }),
        ));
    }

    let results = pool.run_all(tasks).await?;
    Ok(results.into_iter().map(|(_, pair)| pair).collect())
}
