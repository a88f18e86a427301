use polars::prelude::*;

use crate::error::Result;
use crate::frame::{RequiredSchema, SemanticType, TableHandle};

use super::DatasetTransform;

const REQUIRED: RequiredSchema = &[
    ("id", SemanticType::Int),
    ("title", SemanticType::Str),
    ("band", SemanticType::Int),
    ("year", SemanticType::Int),
];

/// Types the album identifiers and release year.
pub struct AlbumsTransform;

impl DatasetTransform for AlbumsTransform {
    fn dataset(&self) -> &'static str {
        "albums"
    }

    fn required_schema(&self) -> RequiredSchema {
        REQUIRED
    }

    fn apply(&self, handle: TableHandle) -> Result<TableHandle> {
        Ok(handle.with_columns([
            col("id").cast(DataType::Int64),
            col("band").cast(DataType::Int64),
            col("year").cast(DataType::Int64),
        ]))
    }
}
