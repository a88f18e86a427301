use polars::prelude::*;

use crate::frame::TableHandle;

/// Country labels accepted as Brazil by the gold filter, lowercase.
pub const BRAZIL_ALIASES: &[&str] = &["brazil", "brasil", "br"];

/// Albums joined with their bands: the silver reference table every gold
/// aggregate builds on. All operators stay lazy; nothing materializes until
/// the stage persists its result.
pub fn music_catalog(albums: &TableHandle, bands: &TableHandle) -> TableHandle {
    let albums = albums
        .clone()
        .rename(["id", "title", "band"], ["album_id", "album_title", "band_id"]);
    let bands = bands.clone().rename(["id", "name"], ["band_id", "band_name"]);

    albums
        .join(
            bands,
            [col("band_id")],
            [col("band_id")],
            JoinArgs::new(JoinType::Left),
        )
        .select([
            col("album_id"),
            col("album_title"),
            col("year"),
            col("band_id"),
            col("band_name"),
            col("country"),
            col("genre"),
            col("theme"),
        ])
}

/// Reviews joined with the album they score.
pub fn album_reviews(albums: &TableHandle, reviews: &TableHandle) -> TableHandle {
    let albums = albums.clone().rename(["id", "title"], ["album_id", "album_title"]);
    let reviews = reviews.clone().rename(["id", "album"], ["review_id", "album_id"]);

    reviews
        .join(
            albums,
            [col("album_id")],
            [col("album_id")],
            JoinArgs::new(JoinType::Left),
        )
        .select([
            col("review_id"),
            col("album_id"),
            col("album_title"),
            col("score"),
            col("content"),
        ])
}

/// First `n` rows per `group`, ranked by `rank` descending.
///
/// Ties on `rank` are broken by `tiebreak` ascending, so the result is fully
/// deterministic across runs regardless of input order.
pub fn top_n_per_group(
    handle: &TableHandle,
    group: &str,
    rank: &str,
    tiebreak: &str,
    n: usize,
) -> TableHandle {
    let ordering = SortMultipleOptions::default().with_order_descendings([false, true, false]);
    handle
        .clone()
        .sort_by_exprs(vec![col(group), col(rank), col(tiebreak)], ordering.clone())
        .group_by([col(group)])
        .head(Some(n))
        .sort_by_exprs(vec![col(group), col(rank), col(tiebreak)], ordering)
}

fn reviews_with_bands(music: &TableHandle, reviews: &TableHandle) -> TableHandle {
    reviews
        .clone()
        .rename(["id", "album"], ["review_id", "album_id"])
        .join(
            music.clone(),
            [col("album_id")],
            [col("album_id")],
            JoinArgs::new(JoinType::Left),
        )
}

/// The ten most-reviewed bands of every country.
pub fn top10_by_country(music: &TableHandle, reviews: &TableHandle) -> TableHandle {
    let grouped = reviews_with_bands(music, reviews)
        .group_by([col("country"), col("band_id"), col("band_name")])
        .agg([
            col("review_id").count().alias("review_count"),
            col("score").mean().alias("avg_score"),
        ]);
    top_n_per_group(&grouped, "country", "review_count", "band_id", 10)
}

/// Per-band review statistics, best-scored bands first.
pub fn band_avg_scores(music: &TableHandle, reviews: &TableHandle) -> TableHandle {
    reviews_with_bands(music, reviews)
        .group_by([col("band_id"), col("band_name"), col("country")])
        .agg([
            col("review_id").count().alias("review_count"),
            col("score").mean().alias("avg_score"),
            col("score").min().alias("min_score"),
            col("score").max().alias("max_score"),
        ])
        .sort_by_exprs(
            vec![col("avg_score"), col("band_id")],
            SortMultipleOptions::default().with_order_descendings([true, false]),
        )
}

/// Keeps rows whose `country` matches one of `aliases` after trimming and
/// lowercasing; matching rows keep their original label.
pub fn filter_country(handle: &TableHandle, aliases: &[&str]) -> TableHandle {
    let normalized = col("country").str().strip_chars(lit(NULL)).str().to_lowercase();
    let predicate = aliases
        .iter()
        .fold(lit(false), |acc, alias| acc.or(normalized.clone().eq(lit(*alias))));
    handle.clone().filter(predicate)
}
