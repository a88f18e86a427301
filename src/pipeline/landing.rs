use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::chunk::ChunkSplitter;
use crate::config::LakehouseConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::{TaskFuture, TaskPool};
use crate::storage::{chunk_key, ObjectStore};

static DATASET_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());

/// Dataset name for a source file: lowercased stem, sanitized for path
/// safety.
fn dataset_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    let name = DATASET_NAME_RE.replace_all(&stem, "_");
    let name = name.trim_matches('_');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn csv_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Splits every CSV in `folder` into header-preserving chunks and uploads
/// them under the landing prefix. Returns dataset → created object keys.
///
/// Each file carries its own run timestamp, so re-running the ingestion only
/// ever adds objects.
pub async fn landing_flow(
    cfg: &LakehouseConfig,
    store: Arc<dyn ObjectStore>,
    pool: &TaskPool,
    folder: &Path,
) -> Result<BTreeMap<String, Vec<String>>> {
    store.ensure_container().await?;

    let files = csv_files(folder)?;
    if files.is_empty() {
        warn!("No CSV files found in {}", folder.display());
        return Ok(BTreeMap::new());
    }
    info!("📂 {} CSV file(s) to ingest", files.len());

    let mut tasks: Vec<(String, TaskFuture<(String, Vec<String>)>)> = Vec::new();
    for path in files {
        let label = path.display().to_string();
        let store = store.clone();
        let prefix = cfg.landing_prefix.clone();
        let max_bytes = cfg.chunk_max_bytes;
        tasks.push((
            label,
            Box::pin(async move {
                let dataset = dataset_name(&path).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "cannot derive a dataset name from '{}'",
                        path.display()
                    ))
                })?;
                let bytes = tokio::fs::read(&path).await?;
                let run_ts = Utc::now().timestamp_millis();

                let mut keys = Vec::new();
                let splitter = ChunkSplitter::new(Cursor::new(bytes), max_bytes);
                for (part, chunk) in splitter.enumerate() {
                    let key = chunk_key(&prefix, &dataset, run_ts, part);
                    store.put(&key, chunk?).await?;
                    keys.push(key);
                }
                info!("⬆️  {}: {} chunk(s) uploaded", dataset, keys.len());
                Ok((dataset, keys))
            }),
        ));
    }

    let results = pool.run_all(tasks).await?;
    let mut by_dataset: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (_, (dataset, keys)) in results {
        by_dataset.entry(dataset).or_default().extend(keys);
    }
    Ok(by_dataset)
}
