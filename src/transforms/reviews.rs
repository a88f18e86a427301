use polars::prelude::*;

use crate::error::Result;
use crate::frame::{RequiredSchema, SemanticType, TableHandle};

use super::DatasetTransform;

const REQUIRED: RequiredSchema = &[
    ("id", SemanticType::Int),
    ("album", SemanticType::Int),
    ("score", SemanticType::Float),
    ("content", SemanticType::Str),
];

/// Drops header rows that chunked ingestion re-embedded mid-file, types the
/// review columns and restores the commas the exporter escaped as pipes.
pub struct ReviewsTransform;

impl DatasetTransform for ReviewsTransform {
    fn dataset(&self) -> &'static str {
        "reviews"
    }

    fn required_schema(&self) -> RequiredSchema {
        REQUIRED
    }

    fn optional(&self) -> bool {
        true
    }

    fn apply(&self, handle: TableHandle) -> Result<TableHandle> {
        Ok(handle
            .filter(
                col("id")
                    .cast(DataType::String)
                    .str()
                    .contains(lit("id"), false)
                    .not(),
            )
            .with_columns([
                col("id").cast(DataType::Int64),
                col("album").cast(DataType::Int64),
                col("score").cast(DataType::Float64),
                col("content")
                    .str()
                    .replace_all(lit(r"\|"), lit(","), false)
                    .alias("content"),
            ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_header_rows_are_dropped() {
        let handle = df!(
            "id" => ["1", "id", "2"],
            "album" => ["10", "album", "20"],
            "score" => ["9.0", "score", "7.5"],
            "content" => ["great", "content", "solid"]
        )
        .unwrap()
        .lazy();

        let df = ReviewsTransform.apply(handle).unwrap().collect().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("id").unwrap().i64().unwrap().get(0), Some(1));
        assert_eq!(df.column("score").unwrap().f64().unwrap().get(1), Some(7.5));
    }

    #[test]
    fn pipes_in_content_become_commas() {
        let handle = df!(
            "id" => [1i64],
            "album" => [10i64],
            "score" => [8.5f64],
            "content" => ["heavy| fast| loud"]
        )
        .unwrap()
        .lazy();

        let df = ReviewsTransform.apply(handle).unwrap().collect().unwrap();
        assert_eq!(
            df.column("content").unwrap().str().unwrap().get(0),
            Some("heavy, fast, loud")
        );
    }
}
