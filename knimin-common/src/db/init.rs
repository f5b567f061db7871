//! Database initialization
//!
//! Creates the lookup store tables read and written by the pulldown
//! pipeline. Every statement is idempotent so initialization is safe to
//! run on every start.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every lookup store table
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_ag_login_table(pool).await?;
    create_ag_kit_table(pool).await?;
    create_ag_kit_barcodes_table(pool).await?;
    create_ag_handout_barcodes_table(pool).await?;
    create_ag_login_surveys_table(pool).await?;
    create_redcap_instruments_table(pool).await?;
    create_zipcodes_table(pool).await?;
    create_iso_country_lookup_table(pool).await?;
    create_body_site_lookup_table(pool).await?;
    create_external_survey_tables(pool).await?;

    info!("Lookup store schema ready");
    Ok(())
}

/// Participant logins; geocoding columns are filled in by backfill
///
/// `cannot_geocode`: NULL = never attempted, 0 = geocoded, 1 = failed
async fn create_ag_login_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ag_login (
            ag_login_id TEXT PRIMARY KEY,
            email TEXT,
            name TEXT,
            address TEXT,
            city TEXT,
            state TEXT,
            zip TEXT,
            country TEXT,
            latitude REAL,
            longitude REAL,
            elevation REAL,
            cannot_geocode INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ag_kit_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ag_kit (
            ag_kit_id TEXT PRIMARY KEY,
            ag_login_id TEXT REFERENCES ag_login(ag_login_id),
            supplied_kit_id TEXT UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ag_kit_barcodes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ag_kit_barcodes (
            barcode TEXT PRIMARY KEY,
            ag_kit_id TEXT REFERENCES ag_kit(ag_kit_id),
            survey_id TEXT,
            site_sampled TEXT,
            environment_sampled TEXT,
            sample_date TEXT,
            sample_time TEXT,
            participant_name TEXT,
            withdrawn INTEGER NOT NULL DEFAULT 0,
            deposited INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ag_kit_barcodes_survey_id ON ag_kit_barcodes(survey_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ag_handout_barcodes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ag_handout_barcodes (
            barcode TEXT PRIMARY KEY,
            kit_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ag_login_surveys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ag_login_surveys (
            survey_id TEXT PRIMARY KEY,
            ag_login_id TEXT REFERENCES ag_login(ag_login_id),
            redcap_record_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_redcap_instruments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS redcap_instruments (
            redcap_instrument_id TEXT PRIMARY KEY,
            survey_type TEXT NOT NULL,
            secondary INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Geocode cache keyed by normalized (zipcode, country)
async fn create_zipcodes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS zipcodes (
            zipcode TEXT NOT NULL,
            country TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            elevation REAL,
            city TEXT,
            state TEXT,
            cannot_geocode INTEGER NOT NULL DEFAULT 0,
            cached_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (zipcode, country)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_iso_country_lookup_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS iso_country_lookup (
            country TEXT PRIMARY KEY,
            ebi TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_body_site_lookup_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS body_site_lookup (
            site_sampled TEXT PRIMARY KEY,
            taxon_id TEXT NOT NULL,
            common_name TEXT NOT NULL,
            scientific_name TEXT NOT NULL,
            sample_type TEXT NOT NULL,
            body_habitat TEXT NOT NULL,
            body_site TEXT NOT NULL,
            body_product TEXT NOT NULL,
            env_matter TEXT NOT NULL,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_external_survey_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS external_survey_sources (
            external_survey_id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_survey TEXT NOT NULL UNIQUE,
            external_survey_description TEXT,
            external_survey_url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS external_survey_answers (
            survey_id TEXT NOT NULL,
            external_survey_id INTEGER NOT NULL
                REFERENCES external_survey_sources(external_survey_id),
            pulldown_date TEXT NOT NULL,
            answers TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database")
    }

    #[tokio::test]
    async fn test_create_schema_is_idempotent() {
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "ag_handout_barcodes",
            "ag_kit",
            "ag_kit_barcodes",
            "ag_login",
            "ag_login_surveys",
            "body_site_lookup",
            "external_survey_answers",
            "external_survey_sources",
            "iso_country_lookup",
            "redcap_instruments",
            "zipcodes",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_init_database_creates_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("knimin.db");

        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM zipcodes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
