use std::collections::BTreeMap;
use std::io::Cursor;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::storage::ObjectStore;

/// A reference to tabular data with a knowable schema, lazily evaluated.
/// Materialization happens only when a stage's result is persisted.
pub type TableHandle = LazyFrame;

/// Schema snapshot persisted by the catalog on first table creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub dtype: String,
}

impl TableSchema {
    /// Checks an incoming frame schema against this snapshot, returning the
    /// first divergence as a human-readable reason.
    pub fn check_compatible(&self, incoming: &TableSchema) -> std::result::Result<(), String> {
        let existing: BTreeMap<&str, &str> = self
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.dtype.as_str()))
            .collect();
        let new: BTreeMap<&str, &str> = incoming
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.dtype.as_str()))
            .collect();

        for (name, dtype) in &existing {
            match new.get(name) {
                None => return Err(format!("column '{name}' missing from incoming data")),
                Some(incoming_dtype) if incoming_dtype != dtype => {
                    return Err(format!(
                        "column '{name}' has type {incoming_dtype}, table expects {dtype}"
                    ))
                }
                Some(_) => {}
            }
        }
        for name in new.keys() {
            if !existing.contains_key(name) {
                return Err(format!("column '{name}' not present in table schema"));
            }
        }
        Ok(())
    }
}

/// Semantic column types used by the per-dataset required schemas.
///
/// Validation is strict about presence and advisory about types: downstream
/// non-strict casts coerce malformed values to null instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Int,
    Float,
    Str,
}

impl SemanticType {
    fn matches(&self, dtype: &DataType) -> bool {
        match self {
            SemanticType::Int => matches!(
                dtype,
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
            ),
            SemanticType::Float => matches!(dtype, DataType::Float32 | DataType::Float64),
            SemanticType::Str => matches!(dtype, DataType::String),
        }
    }
}

/// Enumerated required-column mapping for one dataset.
pub type RequiredSchema = &'static [(&'static str, SemanticType)];

/// Asserts that `handle` exposes every required column.
///
/// A missing column fails fast with `PipelineError::Schema`; a type mismatch
/// only warns, since transforms cast non-strictly.
pub fn validate_schema(handle: &TableHandle, required: RequiredSchema, dataset: &str) -> Result<()> {
    let schema = handle.clone().schema()?;
    for &(column, expected) in required {
        match schema.get(column) {
            None => {
                return Err(PipelineError::Schema {
                    dataset: dataset.to_string(),
                    column: column.to_string(),
                })
            }
            Some(actual) if !expected.matches(actual) => {
                warn!(
                    "Column '{}' of dataset '{}' has type {}, expected {:?}; non-strict cast will null malformed values",
                    column, dataset, actual, expected
                );
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Snapshot of a handle's schema, taken without materializing the frame.
pub fn snapshot_schema(handle: &TableHandle) -> Result<TableSchema> {
    let schema = handle.clone().schema()?;
    let columns = schema
        .iter_fields()
        .map(|field| ColumnDef {
            name: field.name().to_string(),
            dtype: field.data_type().to_string(),
        })
        .collect();
    Ok(TableSchema { columns })
}

/// Row count of a handle, evaluated as a single aggregate.
pub fn row_count(handle: &TableHandle) -> Result<usize> {
    let df = handle.clone().select([len().alias("rows")]).collect()?;
    let rows = df.column("rows")?.u32()?.get(0).unwrap_or(0);
    Ok(rows as usize)
}

/// Parses one stored CSV object. The inference window is generous so that
/// numeric columns survive chunking.
pub fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(5000))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()?;
    Ok(df)
}

pub fn read_parquet_bytes(bytes: &[u8]) -> Result<DataFrame> {
    let df = ParquetReader::new(Cursor::new(bytes.to_vec())).finish()?;
    Ok(df)
}

/// Serializes a materialized frame to a parquet buffer (snappy, like the
/// rest of the warehouse).
pub fn write_parquet_bytes(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)?;
    Ok(buf)
}

/// Resolves a layer/dataset prefix to all stored objects and concatenates
/// them row-wise into a single lazy handle.
pub async fn read_dataset(
    store: &dyn ObjectStore,
    dataset_prefix: &str,
    dataset: &str,
) -> Result<TableHandle> {
    let keys = store.list(dataset_prefix).await?;
    if keys.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "dataset '{dataset}' has no objects under '{dataset_prefix}'"
        )));
    }

    let mut frames = Vec::with_capacity(keys.len());
    for key in &keys {
        let bytes = store.get(key).await?;
        let df = if key.ends_with(".parquet") {
            read_parquet_bytes(&bytes)?
        } else if key.ends_with(".csv") {
            read_csv_bytes(&bytes)?
        } else {
            warn!("Skipping object with unrecognized extension: {}", key);
            continue;
        };
        frames.push(df.lazy());
    }
    if frames.is_empty() {
        return Err(PipelineError::NotFound(format!(
            "dataset '{dataset}' has no readable objects under '{dataset_prefix}'"
        )));
    }
    let handle = concat(frames, UnionArgs::default())?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableHandle {
        df!(
            "id" => [1i64, 2, 3],
            "name" => ["Sepultura", "Angra", "Sarcofago"],
            "score" => [9.5f64, 8.0, 7.5]
        )
        .unwrap()
        .lazy()
    }

    const REQUIRED: RequiredSchema = &[
        ("id", SemanticType::Int),
        ("name", SemanticType::Str),
        ("score", SemanticType::Float),
    ];

    #[test]
    fn validation_passes_when_all_columns_present() {
        validate_schema(&sample(), REQUIRED, "bands").unwrap();
    }

    #[test]
    fn validation_names_the_missing_column() {
        const NEEDS_COUNTRY: RequiredSchema = &[("country", SemanticType::Str)];
        let err = validate_schema(&sample(), NEEDS_COUNTRY, "bands").unwrap_err();
        match err {
            PipelineError::Schema { dataset, column } => {
                assert_eq!(dataset, "bands");
                assert_eq!(column, "country");
            }
            other => panic!("expected Schema error, got {other}"),
        }
    }

    #[test]
    fn type_mismatch_is_advisory_only() {
        const ID_AS_STR: RequiredSchema = &[("id", SemanticType::Str)];
        validate_schema(&sample(), ID_AS_STR, "bands").unwrap();
    }

    #[test]
    fn row_count_does_not_require_full_materialization() {
        assert_eq!(row_count(&sample()).unwrap(), 3);
    }

    #[test]
    fn csv_bytes_round_trip() {
        let df = read_csv_bytes(b"id,name\n1,Sepultura\n2,Angra\n").unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names(), &["id", "name"]);
    }

    #[test]
    fn parquet_bytes_round_trip() {
        let mut df = df!("id" => [1i64, 2]).unwrap();
        let bytes = write_parquet_bytes(&mut df).unwrap();
        let back = read_parquet_bytes(&bytes).unwrap();
        assert_eq!(back.height(), 2);
    }

    #[test]
    fn schema_snapshot_detects_divergence() {
        let snapshot = snapshot_schema(&sample()).unwrap();
        assert!(snapshot.check_compatible(&snapshot).is_ok());

        let other = snapshot_schema(&df!("id" => ["x"]).unwrap().lazy()).unwrap();
        let reason = snapshot.check_compatible(&other).unwrap_err();
        assert!(reason.contains("'name'") || reason.contains("'id'"));
    }
}
