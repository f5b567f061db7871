//! Geocode cache resolution and login backfill tests

mod helpers;

use helpers::{create_test_db, seed_pulldown_store, GeocodeAnswer, MockGeocoder};
use knimin_md::db::zipcodes;
use knimin_md::services::geocode_cache::GeocodeCache;
use sqlx::SqlitePool;
use std::sync::Arc;

const LA_JOLLA: &str = "La Jolla CA 92093 United States";
const BOULDER: &str = "Boulder CO 80301 United States";

fn ucsd(geocoder: MockGeocoder) -> MockGeocoder {
    geocoder.found(
        "92093 United States",
        "92093",
        "United States",
        "CA",
        (32.8812, -117.2344, 109.96),
    )
}

async fn stat(cache: &GeocodeCache, label: &str) -> i64 {
    cache
        .stats()
        .await
        .unwrap()
        .into_iter()
        .find(|(name, _)| name == label)
        .map(|(_, count)| count)
        .unwrap()
}

async fn login_cannot_geocode(pool: &SqlitePool, login: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT cannot_geocode FROM ag_login WHERE ag_login_id = ?")
        .bind(login)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_resolve_is_cached_after_first_lookup() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let geocoder = Arc::new(ucsd(MockGeocoder::new()));
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let first = cache.resolve(Some("92093"), Some("United States")).await.unwrap();
    let second = cache.resolve(Some(" 92093 "), Some("United States ")).await.unwrap();

    assert!(first.is_resolved());
    assert!(second.is_resolved());
    assert_eq!(first.latitude, Some(32.8812));
    assert_eq!(second.latitude, first.latitude);
    assert_eq!(second.state.as_deref(), Some("CA"));
    assert_eq!(geocoder.queries(), vec!["92093 United States".to_string()]);
    assert_eq!(zipcodes::count_cached(&pool).await.unwrap(), (1, 0));
}

#[tokio::test]
async fn test_not_found_is_cached_negative() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let geocoder = Arc::new(MockGeocoder::new());
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let first = cache.resolve(Some("00000"), Some("Atlantis")).await.unwrap();
    let second = cache.resolve(Some("00000"), Some("Atlantis")).await.unwrap();

    assert!(!first.geocodable);
    assert!(!second.geocodable);
    assert!(second.latitude.is_none());
    assert_eq!(geocoder.calls(), 1);
    assert_eq!(zipcodes::count_cached(&pool).await.unwrap(), (0, 1));
}

#[tokio::test]
async fn test_resolver_error_is_cached_negative() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let geocoder = Arc::new(MockGeocoder::new().answer("10001 USA", GeocodeAnswer::Fails));
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let location = cache.resolve(Some("10001"), Some("USA")).await.unwrap();
    cache.resolve(Some("10001"), Some("USA")).await.unwrap();

    assert!(!location.is_resolved());
    assert_eq!(geocoder.calls(), 1);
}

#[tokio::test]
async fn test_rate_limit_is_not_cached() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let geocoder =
        Arc::new(MockGeocoder::new().answer("92093 United States", GeocodeAnswer::RateLimited));
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let first = cache.resolve(Some("92093"), Some("United States")).await.unwrap();
    cache.resolve(Some("92093"), Some("United States")).await.unwrap();

    assert!(!first.is_resolved());
    assert_eq!(geocoder.calls(), 2);
    assert_eq!(zipcodes::count_cached(&pool).await.unwrap(), (0, 0));
}

#[tokio::test]
async fn test_missing_key_parts_skip_resolver() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let geocoder = Arc::new(ucsd(MockGeocoder::new()));
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let no_zip = cache.resolve(None, Some("United States")).await.unwrap();
    let blank_zip = cache.resolve(Some("  "), Some("United States")).await.unwrap();
    let no_country = cache.resolve(Some("92093"), Some("")).await.unwrap();

    assert!(!no_zip.is_resolved());
    assert!(!blank_zip.is_resolved());
    assert!(!no_country.is_resolved());
    assert_eq!(geocoder.calls(), 0);
    assert_eq!(zipcodes::count_cached(&pool).await.unwrap(), (0, 0));
}

#[tokio::test]
async fn test_backfill_marks_failures_and_skips_them_without_retry() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_pulldown_store(&pool).await.unwrap();
    let geocoder = Arc::new(ucsd(MockGeocoder::new()).found(
        LA_JOLLA,
        "92093",
        "United States",
        "CA",
        (32.8812, -117.2344, 109.96),
    ));
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let summary = cache.backfill(None, false).await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.geocoded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.halted_on_rate_limit);
    assert_eq!(geocoder.queries(), vec![LA_JOLLA.to_string(), BOULDER.to_string()]);

    assert_eq!(stat(&cache, "Total Rows").await, 2);
    assert_eq!(stat(&cache, "Cannot Geocode").await, 1);
    assert_eq!(stat(&cache, "Null Elevation Field").await, 1);
    assert_eq!(login_cannot_geocode(&pool, "login-2").await, Some(1));

    let again = cache.backfill(None, false).await.unwrap();
    assert_eq!(again.attempted, 0);
    assert_eq!(geocoder.calls(), 2);

    let retried = cache.backfill(None, true).await.unwrap();
    assert_eq!(retried.attempted, 1);
    assert_eq!(retried.failed, 1);
    assert_eq!(geocoder.queries().last().map(String::as_str), Some(BOULDER));
}

#[tokio::test]
async fn test_backfill_respects_limit() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_pulldown_store(&pool).await.unwrap();
    let geocoder = Arc::new(MockGeocoder::new());
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let summary = cache.backfill(Some(1), false).await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(geocoder.queries(), vec![LA_JOLLA.to_string()]);
    assert_eq!(login_cannot_geocode(&pool, "login-2").await, None);
}

#[tokio::test]
async fn test_rate_limit_halts_backfill_and_leaves_rest_untouched() {
    let (_dir, pool) = create_test_db().await.unwrap();
    seed_pulldown_store(&pool).await.unwrap();
    let geocoder = Arc::new(
        MockGeocoder::new()
            .found(LA_JOLLA, "92093", "United States", "CA", (32.8812, -117.2344, 109.96))
            .answer(BOULDER, GeocodeAnswer::RateLimited),
    );
    let cache = GeocodeCache::new(pool.clone(), geocoder.clone());

    let summary = cache.backfill(None, false).await.unwrap();
    assert!(summary.halted_on_rate_limit);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.geocoded, 1);

    // Work done before the quota ran out is kept
    assert_eq!(login_cannot_geocode(&pool, "login-1").await, Some(0));
    assert_eq!(login_cannot_geocode(&pool, "login-2").await, None);
    assert_eq!(stat(&cache, "Null Elevation Field").await, 1);
    assert_eq!(stat(&cache, "Cannot Geocode").await, 0);
}
