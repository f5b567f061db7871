//! Lookup store fixtures

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tempfile::TempDir;

/// Create temporary store with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_knimin.db");
    let pool = knimin_md::db::init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

async fn exec(pool: &SqlitePool, sql: &str) -> Result<()> {
    sqlx::query(sql).execute(pool).await?;
    Ok(())
}

/// Store with two participants (one human, one dog) and four barcodes
///
/// - `000000001`: human survey `survey-h1` (record 1), logged with time
/// - `000000002`: human survey `survey-h2` (record 2), logged without time
/// - `000000003`: animal survey `survey-a1` (record 3)
/// - `000000004`: logged sample with no survey link
///
/// Instruments: `ag-human-en-us` (Human), `ag-animal-en-us` (Animal) and
/// `ag-fermented-en-us` (Fermented, never answered).
pub async fn seed_pulldown_store(pool: &SqlitePool) -> Result<()> {
    exec(
        pool,
        "INSERT INTO ag_login (ag_login_id, city, state, zip, country) VALUES \
         ('login-1', 'La Jolla', 'CA', '92093', 'United States'), \
         ('login-2', 'Boulder', 'CO', '80301', 'United States')",
    )
    .await?;
    exec(
        pool,
        "INSERT INTO ag_kit (ag_kit_id, ag_login_id, supplied_kit_id) VALUES \
         ('kit-1', 'login-1', 'tst_aaaaa'), ('kit-2', 'login-2', 'tst_bbbbb')",
    )
    .await?;
    exec(
        pool,
        "INSERT INTO ag_login_surveys (survey_id, ag_login_id, redcap_record_id) VALUES \
         ('survey-h1', 'login-1', 1), ('survey-h2', 'login-1', 2), ('survey-a1', 'login-2', 3)",
    )
    .await?;
    exec(
        pool,
        "INSERT INTO ag_kit_barcodes \
            (barcode, ag_kit_id, survey_id, site_sampled, sample_date, sample_time) VALUES \
         ('000000001', 'kit-1', 'survey-h1', 'Stool', '2016-07-04', '09:30'), \
         ('000000002', 'kit-1', 'survey-h2', 'Stool', '2016-01-15', NULL), \
         ('000000003', 'kit-2', 'survey-a1', 'Stool', '2016-03-02', '18:00'), \
         ('000000004', 'kit-2', NULL, 'Stool', '2016-03-02', NULL)",
    )
    .await?;
    exec(
        pool,
        "INSERT INTO redcap_instruments (redcap_instrument_id, survey_type, secondary) VALUES \
         ('ag-human-en-us', 'Human', 0), \
         ('ag-animal-en-us', 'Animal', 0), \
         ('ag-fermented-en-us', 'Fermented', 1)",
    )
    .await?;
    exec(
        pool,
        "INSERT INTO iso_country_lookup (country, ebi) VALUES ('United States', 'USA')",
    )
    .await?;
    exec(
        pool,
        "INSERT INTO body_site_lookup VALUES \
         ('Stool', '408170', 'human gut metagenome', 'human gut metagenome', 'Stool', \
          'UBERON:feces', 'UBERON:feces', 'UBERON:feces', 'ENVO:feces', \
          'American Gut Project Stool sample')",
    )
    .await?;
    Ok(())
}

/// Parse a tab-separated table into header and rows keyed by first field
pub fn tsv_rows(tsv: &str) -> (Vec<String>, HashMap<String, HashMap<String, String>>) {
    let mut lines = tsv.lines();
    let header: Vec<String> = lines
        .next()
        .unwrap_or_default()
        .split('\t')
        .map(str::to_string)
        .collect();

    let rows = lines
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            let row: HashMap<String, String> = header
                .iter()
                .cloned()
                .zip(fields.iter().map(|f| f.to_string()))
                .collect();
            (fields[0].to_string(), row)
        })
        .collect();
    (header, rows)
}
