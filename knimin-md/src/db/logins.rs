//! Participant login geocoding state

use knimin_common::{Error, Result};
use sqlx::SqlitePool;

/// Address fields of a login awaiting geocoding
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LoginAddress {
    pub ag_login_id: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

impl LoginAddress {
    /// Free-text address sent to the geocoder
    pub fn query_string(&self) -> String {
        [&self.city, &self.state, &self.zip, &self.country]
            .iter()
            .map(|part| part.as_deref().unwrap_or("").trim())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Outcome of one backfill attempt
#[derive(Debug, Clone, PartialEq)]
pub struct LoginGeocode {
    pub ag_login_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    pub cannot_geocode: bool,
}

/// Reset previously failed logins so they are attempted again
pub async fn clear_failed_geocodes(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ag_login
        SET latitude = NULL, longitude = NULL, elevation = NULL, cannot_geocode = NULL
        WHERE cannot_geocode = 1
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::query("clear_failed_geocodes", e))?;

    Ok(result.rows_affected())
}

/// Logins never attempted, oldest id first
pub async fn get_logins_to_geocode(
    pool: &SqlitePool,
    limit: Option<usize>,
) -> Result<Vec<LoginAddress>> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    sqlx::query_as::<_, LoginAddress>(
        r#"
        SELECT ag_login_id, city, state, zip, country
        FROM ag_login
        WHERE elevation IS NULL AND cannot_geocode IS NULL
        ORDER BY ag_login_id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::query("get_logins_to_geocode", e))
}

/// Persist backfill results in one transaction
pub async fn update_login_geocodes(pool: &SqlitePool, updates: &[LoginGeocode]) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::query("update_login_geocodes", e))?;

    for update in updates {
        sqlx::query(
            r#"
            UPDATE ag_login
            SET latitude = ?, longitude = ?, elevation = ?, cannot_geocode = ?
            WHERE ag_login_id = ?
            "#,
        )
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(update.elevation)
        .bind(update.cannot_geocode)
        .bind(&update.ag_login_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::query("update_login_geocodes", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| Error::query("update_login_geocodes", e))?;
    Ok(())
}

/// Geocoding coverage counters as (label, count)
pub async fn geocode_stats(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let stat_queries = [
        ("Total Rows", "SELECT COUNT(*) FROM ag_login"),
        (
            "Cannot Geocode",
            "SELECT COUNT(*) FROM ag_login WHERE cannot_geocode = 1",
        ),
        (
            "Null Latitude Field",
            "SELECT COUNT(*) FROM ag_login WHERE latitude IS NULL",
        ),
        (
            "Null Elevation Field",
            "SELECT COUNT(*) FROM ag_login WHERE elevation IS NULL",
        ),
    ];

    let mut results = Vec::with_capacity(stat_queries.len());
    for (name, sql) in stat_queries {
        let total: i64 = sqlx::query_scalar(sql)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::query("geocode_stats", e))?;
        results.push((name.to_string(), total));
    }
    Ok(results)
}
