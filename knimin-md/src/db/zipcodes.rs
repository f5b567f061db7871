//! Geocode cache persistence
//!
//! Rows are keyed by the normalized `(zipcode, country)` pair and written
//! last-writer-wins, so repeated resolutions converge.

use crate::types::Location;
use knimin_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Cache key for a zipcode/country pair: zipcode upper-cased with all
/// whitespace removed, country trimmed
pub fn normalize_key(zipcode: &str, country: &str) -> (String, String) {
    let zipcode: String = zipcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    (zipcode, country.trim().to_string())
}

/// Stored location for a pair, including negative (not geocodable) entries
pub async fn get_cached_location(
    pool: &SqlitePool,
    zipcode: &str,
    country: &str,
) -> Result<Option<Location>> {
    let (zipcode, country) = normalize_key(zipcode, country);
    let row = sqlx::query(
        r#"
        SELECT zipcode, country, latitude, longitude, elevation, city, state, cannot_geocode
        FROM zipcodes
        WHERE zipcode = ? AND country = ?
        "#,
    )
    .bind(&zipcode)
    .bind(&country)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::query("get_cached_location", e))?;

    Ok(row.map(|row| {
        let cannot_geocode: bool = row.get("cannot_geocode");
        Location {
            zipcode: Some(row.get("zipcode")),
            country: Some(row.get("country")),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            elevation: row.get("elevation"),
            city: row.get("city"),
            state: row.get("state"),
            geocodable: !cannot_geocode,
        }
    }))
}

/// Persist a resolution result under the normalized key of `zipcode`/`country`
pub async fn upsert_location(
    pool: &SqlitePool,
    zipcode: &str,
    country: &str,
    location: &Location,
) -> Result<()> {
    let (zipcode, country) = normalize_key(zipcode, country);
    sqlx::query(
        r#"
        INSERT INTO zipcodes
            (zipcode, country, latitude, longitude, elevation, city, state, cannot_geocode, cached_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
        ON CONFLICT(zipcode, country) DO UPDATE SET
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            elevation = excluded.elevation,
            city = excluded.city,
            state = excluded.state,
            cannot_geocode = excluded.cannot_geocode,
            cached_at = excluded.cached_at
        "#,
    )
    .bind(&zipcode)
    .bind(&country)
    .bind(location.latitude)
    .bind(location.longitude)
    .bind(location.elevation)
    .bind(&location.city)
    .bind(&location.state)
    .bind(!location.geocodable)
    .execute(pool)
    .await
    .map_err(|e| Error::query("upsert_location", e))?;

    Ok(())
}

/// Number of cached pairs, split into (geocodable, not geocodable)
pub async fn count_cached(pool: &SqlitePool) -> Result<(i64, i64)> {
    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN cannot_geocode = 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN cannot_geocode = 1 THEN 1 ELSE 0 END), 0)
        FROM zipcodes
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(|e| Error::query("count_cached", e))?;
    Ok(row)
}
