use polars::prelude::*;

use crate::error::Result;
use crate::frame::{RequiredSchema, SemanticType, TableHandle};

use super::DatasetTransform;

const REQUIRED: RequiredSchema = &[
    ("id", SemanticType::Int),
    ("name", SemanticType::Str),
    ("country", SemanticType::Str),
    ("genre", SemanticType::Str),
    ("theme", SemanticType::Str),
    ("status", SemanticType::Str),
    ("formed_in", SemanticType::Int),
    ("active", SemanticType::Str),
];

/// Labels the source uses for a band that is still together; collapsed to
/// the canonical `Active`.
const ACTIVE_SYNONYMS: &[&str] = &["active", "still active"];

/// Types the band identifiers, collapses status synonyms and derives
/// `start_year` from the free-text activity ranges (e.g. `1985-present`).
pub struct BandsTransform;

impl DatasetTransform for BandsTransform {
    fn dataset(&self) -> &'static str {
        "bands"
    }

    fn required_schema(&self) -> RequiredSchema {
        REQUIRED
    }

    fn apply(&self, handle: TableHandle) -> Result<TableHandle> {
        let is_active = ACTIVE_SYNONYMS.iter().fold(lit(false), |acc, synonym| {
            acc.or(col("status").str().to_lowercase().eq(lit(*synonym)))
        });

        Ok(handle.with_columns([
            col("id").cast(DataType::Int64),
            col("formed_in").cast(DataType::Int64),
            when(is_active)
                .then(lit("Active"))
                .otherwise(col("status"))
                .alias("status"),
            col("active")
                .str()
                .extract(lit(r"(\d{4})"), 1)
                .cast(DataType::Int64)
                .alias("start_year"),
        ]))
    }
}
