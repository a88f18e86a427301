use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::config::LakehouseConfig;
use crate::error::{PipelineError, Result};
use crate::storage::ObjectStore;
use crate::transforms::TransformRegistry;
use crate::writer::{RetryPolicy, TableWriter};

mod bronze;
mod gold;
mod landing;
mod silver;

pub use bronze::bronze_flow;
pub use gold::gold_flow;
pub use landing::landing_flow;
pub use silver::silver_flow;

/// The four refinement layers, traversed linearly and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Landing,
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Landing => "landing",
            Stage::Bronze => "bronze",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
        };
        write!(f, "{name}")
    }
}

/// Result map of one traversal of the DAG: per layer, the locations each
/// dataset was published to.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub landing: BTreeMap<String, Vec<String>>,
    pub bronze: BTreeMap<String, String>,
    pub silver: BTreeMap<String, String>,
    pub gold: BTreeMap<String, String>,
}

impl RunReport {
    pub fn tables_written(&self) -> usize {
        self.bronze.len() + self.silver.len() + self.gold.len()
    }
}

pub(crate) type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Bounded worker pool for the independent dataset pipelines of one stage.
///
/// All tasks are joined before the pool returns. After the first failure,
/// queued tasks are skipped; in-flight tasks are allowed to finish so no
/// partially written object is abandoned mid-upload. The first failure is
/// what the caller sees.
pub struct TaskPool {
    permits: Arc<Semaphore>,
}

impl TaskPool {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub async fn run_all<T: Send + 'static>(
        &self,
        tasks: Vec<(String, TaskFuture<T>)>,
    ) -> Result<Vec<(String, T)>> {
        let failed = Arc::new(AtomicBool::new(false));
        let mut set: JoinSet<(String, Result<T>)> = JoinSet::new();

        // Permits are taken in submission order, so after a failure the
        // not-yet-started tail of the queue is dropped while in-flight tasks
        // run to completion.
        for (label, fut) in tasks {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if failed.load(Ordering::SeqCst) {
                warn!("Skipping task '{}' after earlier failure", label);
                continue;
            }
            let failed = failed.clone();
            set.spawn(async move {
                let _permit = permit;
                let result = fut.await;
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                (label, result)
            });
        }

        let mut completed = Vec::new();
        let mut first_failure: Option<(String, PipelineError)> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((label, Ok(value))) => completed.push((label, value)),
                Ok((label, Err(e))) => {
                    if first_failure.is_none() {
                        first_failure = Some((label, e));
                    }
                }
                Err(join_err) => {
                    if first_failure.is_none() {
                        first_failure = Some((
                            "worker".to_string(),
                            PipelineError::Validation(format!("worker panicked: {join_err}")),
                        ));
                    }
                }
            }
        }

        if let Some((label, e)) = first_failure {
            error!("Task '{}' failed: {}", label, e);
            return Err(e);
        }
        Ok(completed)
    }
}

/// Sequences Landing → Bronze → Silver → Gold, gating each stage on the
/// previous stage's non-empty output. Terminal states: success with a
/// `RunReport`, or the first unrecoverable failure with stage context.
pub struct Orchestrator {
    cfg: LakehouseConfig,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    writer: TableWriter,
    registry: Arc<TransformRegistry>,
    pool: TaskPool,
}

impl Orchestrator {
    pub fn new(cfg: LakehouseConfig, store: Arc<dyn ObjectStore>, catalog: Arc<dyn Catalog>) -> Self {
        let writer = TableWriter::new(
            catalog.clone(),
            RetryPolicy::new(cfg.retry_attempts, cfg.retry_delay_ms),
        );
        let pool = TaskPool::new(cfg.pool_size);
        Self {
            cfg,
            store,
            catalog,
            writer,
            registry: Arc::new(TransformRegistry::new()),
            pool,
        }
    }

    /// Runs the full pipeline, short-circuiting after landing when no
    /// objects were produced.
    pub async fn run(&self, folder: &Path) -> Result<RunReport> {
        info!("🚀 Starting lakehouse run from {}", folder.display());

        let landing = self.landing(folder).await?;
        let produced: usize = landing.values().map(Vec::len).sum();
        if produced == 0 {
            warn!("Landing produced no objects; skipping bronze, silver and gold");
            return Err(PipelineError::Validation(
                "landing produced no objects".to_string(),
            ));
        }

        let bronze = self.bronze().await?;
        let silver = self.silver().await?;
        let gold = self.gold().await?;

        let report = RunReport {
            landing,
            bronze,
            silver,
            gold,
        };
        info!(
            "✅ Lakehouse run complete: {} object(s) landed, {} table(s) written",
            produced,
            report.tables_written()
        );
        Ok(report)
    }

    pub async fn landing(&self, folder: &Path) -> Result<BTreeMap<String, Vec<String>>> {
        self.staged(
            Stage::Landing,
            landing_flow(&self.cfg, self.store.clone(), &self.pool, folder).await,
        )
    }

    pub async fn bronze(&self) -> Result<BTreeMap<String, String>> {
        self.staged(
            Stage::Bronze,
            bronze_flow(&self.cfg, self.store.clone(), self.writer.clone(), &self.pool).await,
        )
    }

    pub async fn silver(&self) -> Result<BTreeMap<String, String>> {
        self.staged(
            Stage::Silver,
            silver_flow(
                &self.cfg,
                self.catalog.clone(),
                self.writer.clone(),
                self.registry.clone(),
                &self.pool,
            )
            .await,
        )
    }

    pub async fn gold(&self) -> Result<BTreeMap<String, String>> {
        self.staged(
            Stage::Gold,
            gold_flow(&self.cfg, self.catalog.clone(), self.writer.clone(), &self.pool).await,
        )
    }

    fn staged<T>(&self, stage: Stage, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("Stage {} failed: {}", stage, e);
        }
        result
    }
}
