use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use polars::prelude::*;
use tempfile::tempdir;

use metalake::catalog::{Catalog, ObjectStoreCatalog, WriteMode};
use metalake::config::LakehouseConfig;
use metalake::error::PipelineError;
use metalake::frame;
use metalake::pipeline::Orchestrator;
use metalake::storage::{InMemoryObjectStore, ObjectStore};
use metalake::writer::{RetryPolicy, TableWriter};

const ALBUMS_CSV: &str = "\
id,title,band,year
1,Roots,1,1996
2,Holy Land,2,1996
3,INRI,3,1987
";

const BANDS_CSV: &str = "\
id,name,country,genre,theme,status,formed_in,active
1,Sepultura,Brazil,Thrash,Society,Active,1984,1984-present
2,Angra,Brazil,Power,Fantasy,still active,1991,1991-present
3,Bathory,Sweden,Black,Vikings,Split-up,1983,1983-2004
";

const REVIEWS_CSV: &str = "\
id,album,score,content
100,1,9.5,classic|heavy
101,2,8.0,melodic
102,3,7.5,raw
";

struct Harness {
    orchestrator: Orchestrator,
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    cfg: LakehouseConfig,
}

fn harness() -> Harness {
    // Tiny chunk cap so even the fixtures exercise multi-part ingestion.
    let cfg = LakehouseConfig {
        chunk_max_bytes: 64,
        ..LakehouseConfig::default()
    };
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new(&cfg.bucket));
    let catalog: Arc<dyn Catalog> = Arc::new(ObjectStoreCatalog::new(
        store.clone(),
        &cfg.warehouse_root,
        &cfg.branch,
    ));
    let orchestrator = Orchestrator::new(cfg.clone(), store.clone(), catalog.clone());
    Harness {
        orchestrator,
        catalog,
        store,
        cfg,
    }
}

fn write_fixtures(dir: &Path, with_reviews: bool) {
    std::fs::write(dir.join("Albums.csv"), ALBUMS_CSV).unwrap();
    std::fs::write(dir.join("Bands.csv"), BANDS_CSV).unwrap();
    if with_reviews {
        std::fs::write(dir.join("Reviews.csv"), REVIEWS_CSV).unwrap();
    }
}

#[tokio::test]
async fn full_pipeline_publishes_every_layer() -> Result<()> {
    let temp = tempdir()?;
    write_fixtures(temp.path(), true);
    let h = harness();

    let report = h.orchestrator.run(temp.path()).await?;

    assert_eq!(report.landing.len(), 3);
    assert_eq!(report.bronze.len(), 3);
    // Three primaries plus two derived join tables.
    assert_eq!(report.silver.len(), 5);
    assert_eq!(report.gold.len(), 3);

    // The chunk cap forces several parts per dataset; bronze must still see
    // every source row exactly once.
    assert!(report.landing["albums"].len() > 1);
    let bronze_albums = h.catalog.load_table("bronze.albums").await?;
    assert_eq!(frame::row_count(&bronze_albums)?, 3);

    // Silver typed the columns and derived the band start year.
    let by_id = h
        .catalog
        .load_table("silver.bands")
        .await?
        .sort_by_exprs(vec![col("id")], SortMultipleOptions::default())
        .collect()?;
    let status = by_id.column("status")?.str()?;
    assert_eq!(status.get(1), Some("Active"));
    let start_year = by_id.column("start_year")?.i64()?;
    assert_eq!(start_year.get(1), Some(1991));

    // Gold keeps only the Brazilian bands in the filtered snapshot.
    let brazilian = h.catalog.load_table("gold.brazilian_bands").await?.collect()?;
    assert_eq!(brazilian.height(), 2);
    let countries = brazilian.column("country")?.str()?;
    for i in 0..brazilian.height() {
        assert_eq!(countries.get(i), Some("Brazil"));
    }

    // Every band of the fixtures has reviews, so top10 covers all of them.
    let top10 = h.catalog.load_table("gold.top10_by_country").await?.collect()?;
    assert_eq!(top10.height(), 3);
    Ok(())
}

#[tokio::test]
async fn empty_landing_folder_fails_the_run_without_writing() -> Result<()> {
    let temp = tempdir()?;
    let h = harness();

    let err = h.orchestrator.run(temp.path()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    // Short-circuit: no table was created in any layer.
    let warehouse = h.store.list(&h.cfg.warehouse_root).await?;
    assert!(warehouse.is_empty());
    Ok(())
}

#[tokio::test]
async fn bronze_without_landing_objects_is_a_validation_failure() -> Result<()> {
    let h = harness();

    let err = h.orchestrator.bronze().await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));

    let warehouse = h.store.list(&h.cfg.warehouse_root).await?;
    assert!(warehouse.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_optional_reviews_skips_only_derived_outputs() -> Result<()> {
    let temp = tempdir()?;
    write_fixtures(temp.path(), false);
    let h = harness();

    h.orchestrator.landing(temp.path()).await?;
    h.orchestrator.bronze().await?;
    let silver = h.orchestrator.silver().await?;

    assert!(silver.contains_key("albums"));
    assert!(silver.contains_key("bands"));
    assert!(silver.contains_key("music_catalog"));
    assert!(!silver.contains_key("reviews"));
    assert!(!silver.contains_key("album_reviews"));

    // Gold's review analytics cannot run without the mandatory reviews input.
    let err = h.orchestrator.gold().await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn missing_mandatory_dataset_aborts_silver() -> Result<()> {
    let temp = tempdir()?;
    // Only reviews land; albums and bands are mandatory for silver.
    std::fs::write(temp.path().join("Reviews.csv"), REVIEWS_CSV).unwrap();
    let h = harness();

    h.orchestrator.landing(temp.path()).await?;
    h.orchestrator.bronze().await?;

    let err = h.orchestrator.silver().await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn empty_mandatory_dataset_aborts_silver_with_validation() -> Result<()> {
    let temp = tempdir()?;
    // Bands and reviews are fine; albums exists in bronze but holds no rows.
    std::fs::write(temp.path().join("Bands.csv"), BANDS_CSV).unwrap();
    std::fs::write(temp.path().join("Reviews.csv"), REVIEWS_CSV).unwrap();
    let h = harness();

    h.orchestrator.landing(temp.path()).await?;
    h.orchestrator.bronze().await?;

    let empty_albums = df!(
        "id" => Vec::<i64>::new(),
        "title" => Vec::<String>::new(),
        "band" => Vec::<i64>::new(),
        "year" => Vec::<i64>::new()
    )?
    .lazy();
    let writer = TableWriter::new(h.catalog.clone(), RetryPolicy::new(1, 1));
    writer
        .write(&empty_albums, &h.cfg.bronze_table("albums"), WriteMode::Append)
        .await?;

    let err = h.orchestrator.silver().await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    Ok(())
}
