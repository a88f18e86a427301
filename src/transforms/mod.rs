use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::frame::{RequiredSchema, TableHandle};

mod albums;
mod bands;
mod reviews;

pub use albums::AlbumsTransform;
pub use bands::BandsTransform;
pub use reviews::ReviewsTransform;

/// A pure per-dataset transform: referentially transparent given its input
/// handle, no external state.
pub trait DatasetTransform: Send + Sync {
    /// Dataset this transform owns (`albums`, `bands`, ...).
    fn dataset(&self) -> &'static str;

    /// Columns the input must expose before the transform runs.
    fn required_schema(&self) -> RequiredSchema;

    /// Whether a stage may skip this dataset with a warning when its input
    /// is absent, instead of failing the run.
    fn optional(&self) -> bool {
        false
    }

    fn apply(&self, handle: TableHandle) -> Result<TableHandle>;
}

/// Registry of per-dataset transforms, one per (layer, dataset) pair.
pub struct TransformRegistry {
    transforms: HashMap<&'static str, Box<dyn DatasetTransform>>,
}

impl TransformRegistry {
    /// Registry with the built-in dataset transforms.
    pub fn new() -> Self {
        let mut registry = Self {
            transforms: HashMap::new(),
        };
        registry.register(Box::new(AlbumsTransform));
        registry.register(Box::new(BandsTransform));
        registry.register(Box::new(ReviewsTransform));
        registry
    }

    pub fn register(&mut self, transform: Box<dyn DatasetTransform>) {
        self.transforms.insert(transform.dataset(), transform);
    }

    pub fn get(&self, dataset: &str) -> Option<&dyn DatasetTransform> {
        self.transforms.get(dataset).map(|t| t.as_ref())
    }

    /// Registered dataset names in stable order.
    pub fn datasets(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.transforms.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Validates the handle against the dataset's required schema, then
    /// applies the transform.
    pub fn transform(&self, dataset: &str, handle: TableHandle) -> Result<TableHandle> {
        let transform = self.get(dataset).ok_or_else(|| {
            PipelineError::Validation(format!("no transform registered for dataset '{dataset}'"))
        })?;
        crate::frame::validate_schema(&handle, transform.required_schema(), dataset)?;
        transform.apply(handle)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes raw column names: trim, lowercase, spaces to underscores.
/// Collisions are deduplicated with `_2`, `_3`, ... suffixes in first-seen
/// order.
pub fn normalize_and_dedupe<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(columns.len());
    for column in columns {
        let normalized = column.as_ref().trim().to_lowercase().replace(' ', "_");
        let seen = counts.entry(normalized.clone()).or_insert(0);
        *seen += 1;
        if *seen == 1 {
            result.push(normalized);
        } else {
            result.push(format!("{}_{}", normalized, seen));
        }
    }
    result
}

/// Applies `normalize_and_dedupe` to a handle's column names.
pub fn normalize_columns(handle: TableHandle) -> Result<TableHandle> {
    let schema = handle.clone().schema()?;
    let old: Vec<String> = schema.iter_names().map(|name| name.to_string()).collect();
    let new = normalize_and_dedupe(&old);
    Ok(handle.rename(old, new))
}
