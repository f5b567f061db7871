//! Barcode and survey linkage queries

use super::{placeholders, select_barcodes, IDS, MAX_BIND_PARAMS};
use chrono::{NaiveDate, NaiveTime};
use knimin_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeSet, HashMap};

/// Width of a registered barcode
pub const BARCODE_WIDTH: usize = 9;

/// Sample, kit and login details for a registered barcode
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeDetails {
    pub barcode: String,
    pub survey_id: Option<String>,
    pub ag_login_id: Option<String>,
    pub site_sampled: Option<String>,
    pub environment_sampled: Option<String>,
    pub sample_date: Option<NaiveDate>,
    pub sample_time: Option<NaiveTime>,
    pub withdrawn: bool,
}

/// Survey id to barcode pairs for the given barcodes
///
/// Barcodes without a survey link are not returned. One survey id may map
/// to several barcodes (multiple samples from one participant).
pub async fn get_barcode_surveys(
    pool: &SqlitePool,
    barcodes: &[String],
) -> Result<Vec<(String, String)>> {
    survey_barcode_pairs(pool, "get_barcode_surveys", "barcode", barcodes).await
}

/// Survey id to barcode pairs for the given survey ids
pub async fn get_survey_barcodes(
    pool: &SqlitePool,
    survey_ids: &[String],
) -> Result<Vec<(String, String)>> {
    survey_barcode_pairs(pool, "get_survey_barcodes", "survey_id", survey_ids).await
}

async fn survey_barcode_pairs(
    pool: &SqlitePool,
    context: &str,
    key_column: &str,
    keys: &[String],
) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for chunk in keys.chunks(MAX_BIND_PARAMS) {
        let sql = format!(
            "SELECT survey_id, barcode FROM ag_kit_barcodes \
             WHERE {} IN ({}) AND survey_id IS NOT NULL ORDER BY barcode",
            key_column,
            placeholders(chunk.len())
        );
        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for key in chunk {
            query = query.bind(key.as_str());
        }
        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| Error::query(context, e))?;
        pairs.extend(rows);
    }
    pairs.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(pairs)
}

/// External survey record ids attached to the given barcodes, ascending
pub async fn get_records_for_barcodes(pool: &SqlitePool, barcodes: &[String]) -> Result<Vec<i64>> {
    let mut records = BTreeSet::new();
    for chunk in barcodes.chunks(MAX_BIND_PARAMS) {
        let sql = format!(
            "SELECT DISTINCT s.redcap_record_id \
             FROM ag_login_surveys s \
             JOIN ag_kit_barcodes b ON b.survey_id = s.survey_id \
             WHERE b.barcode IN ({})",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for barcode in chunk {
            query = query.bind(barcode.as_str());
        }
        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| Error::query("get_records_for_barcodes", e))?;
        records.extend(rows);
    }
    Ok(records.into_iter().collect())
}

/// Barcodes carrying a survey/consent link
pub async fn get_consented(pool: &SqlitePool, barcodes: &[String]) -> Result<BTreeSet<String>> {
    select_barcodes(
        pool,
        "get_consented",
        &format!(
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({}) AND survey_id IS NOT NULL",
            IDS
        ),
        barcodes,
    )
    .await
}

/// Sample details keyed by barcode
///
/// Requested barcodes are truncated to the registered 9-digit form.
pub async fn get_ag_barcode_details(
    pool: &SqlitePool,
    barcodes: &[String],
) -> Result<HashMap<String, BarcodeDetails>> {
    let keys: Vec<String> = barcodes
        .iter()
        .map(|b| b.chars().take(BARCODE_WIDTH).collect())
        .collect();

    let mut details = HashMap::with_capacity(keys.len());
    for chunk in keys.chunks(MAX_BIND_PARAMS) {
        let sql = format!(
            "SELECT b.barcode, b.survey_id, k.ag_login_id, b.site_sampled, \
                    b.environment_sampled, b.sample_date, b.sample_time, b.withdrawn \
             FROM ag_kit_barcodes b \
             LEFT JOIN ag_kit k ON k.ag_kit_id = b.ag_kit_id \
             WHERE b.barcode IN ({})",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query(&sql);
        for barcode in chunk {
            query = query.bind(barcode.as_str());
        }
        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| Error::query("get_ag_barcode_details", e))?;

        for row in rows {
            let barcode: String = row.get("barcode");
            let sample_date: Option<String> = row.get("sample_date");
            let sample_time: Option<String> = row.get("sample_time");

            let parsed = BarcodeDetails {
                sample_date: sample_date
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .map(|d| parse_sample_date(&barcode, d))
                    .transpose()?,
                sample_time: sample_time
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| parse_sample_time(&barcode, t))
                    .transpose()?,
                survey_id: row.get("survey_id"),
                ag_login_id: row.get("ag_login_id"),
                site_sampled: row.get("site_sampled"),
                environment_sampled: row.get("environment_sampled"),
                withdrawn: row.get("withdrawn"),
                barcode: barcode.clone(),
            };
            details.insert(barcode, parsed);
        }
    }

    Ok(details)
}

fn parse_sample_date(barcode: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        Error::InvalidInput(format!(
            "Barcode {} has malformed sample_date '{}': {}",
            barcode, value, e
        ))
    })
}

fn parse_sample_time(barcode: &str, value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|e| {
            Error::InvalidInput(format!(
                "Barcode {} has malformed sample_time '{}': {}",
                barcode, value, e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    async fn seed(pool: &SqlitePool) {
        sqlx::query("INSERT INTO ag_login (ag_login_id, zip, country) VALUES ('login-1', '92093', 'USA')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO ag_kit (ag_kit_id, ag_login_id, supplied_kit_id) VALUES ('kit-1', 'login-1', 'tst_abcde')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO ag_login_surveys (survey_id, ag_login_id, redcap_record_id) VALUES ('survey-a', 'login-1', 17)",
        )
        .execute(pool)
        .await
        .unwrap();

        for barcode in ["000000001", "000000002"] {
            sqlx::query(
                r#"
                INSERT INTO ag_kit_barcodes
                    (barcode, ag_kit_id, survey_id, site_sampled, sample_date, sample_time)
                VALUES (?, 'kit-1', 'survey-a', 'Stool', '2016-01-05', '09:30')
                "#,
            )
            .bind(barcode)
            .execute(pool)
            .await
            .unwrap();
        }
        insert_kit_barcode(pool, "000000003", None, None, false, None).await;
    }

    #[tokio::test]
    async fn test_barcode_surveys_skip_unlinked() {
        let pool = memory_store().await;
        seed(&pool).await;

        let requested: Vec<String> = ["000000001", "000000002", "000000003", "999999999"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pairs = get_barcode_surveys(&pool, &requested).await.unwrap();

        assert_eq!(
            pairs,
            vec![
                ("survey-a".to_string(), "000000001".to_string()),
                ("survey-a".to_string(), "000000002".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_survey_barcodes_fan_out() {
        let pool = memory_store().await;
        seed(&pool).await;

        let surveys = vec!["survey-a".to_string(), "survey-x".to_string()];
        let pairs = get_survey_barcodes(&pool, &surveys).await.unwrap();
        let barcodes: Vec<&str> = pairs.iter().map(|(_, b)| b.as_str()).collect();
        assert_eq!(barcodes, vec!["000000001", "000000002"]);
    }

    #[tokio::test]
    async fn test_records_are_distinct() {
        let pool = memory_store().await;
        seed(&pool).await;

        let requested = vec!["000000001".to_string(), "000000002".to_string()];
        let records = get_records_for_barcodes(&pool, &requested).await.unwrap();
        assert_eq!(records, vec![17]);
    }

    #[tokio::test]
    async fn test_barcode_details_truncate_and_parse() {
        let pool = memory_store().await;
        seed(&pool).await;

        let requested = vec!["000000001.extra".to_string(), "000000003".to_string()];
        let details = get_ag_barcode_details(&pool, &requested).await.unwrap();

        let first = &details["000000001"];
        assert_eq!(first.ag_login_id.as_deref(), Some("login-1"));
        assert_eq!(first.sample_date, NaiveDate::from_ymd_opt(2016, 1, 5));
        assert_eq!(first.sample_time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(first.site_sampled.as_deref(), Some("Stool"));

        let unlinked = &details["000000003"];
        assert!(unlinked.survey_id.is_none());
        assert!(unlinked.sample_date.is_none());
    }

    #[tokio::test]
    async fn test_blank_sample_date_and_time_are_unlogged() {
        let pool = memory_store().await;
        seed(&pool).await;
        sqlx::query(
            "UPDATE ag_kit_barcodes SET sample_date = '  ', sample_time = '' WHERE barcode = '000000002'",
        )
        .execute(&pool)
        .await
        .unwrap();

        let requested = vec!["000000001".to_string(), "000000002".to_string()];
        let details = get_ag_barcode_details(&pool, &requested).await.unwrap();

        let blank = &details["000000002"];
        assert!(blank.sample_date.is_none());
        assert!(blank.sample_time.is_none());
        assert_eq!(blank.survey_id.as_deref(), Some("survey-a"));
        assert_eq!(details["000000001"].sample_date, NaiveDate::from_ymd_opt(2016, 1, 5));
    }

    #[tokio::test]
    async fn test_consented_only_with_survey() {
        let pool = memory_store().await;
        seed(&pool).await;

        let requested = vec!["000000001".to_string(), "000000003".to_string()];
        let consented = get_consented(&pool, &requested).await.unwrap();
        assert!(consented.contains("000000001"));
        assert!(!consented.contains("000000003"));
    }
}
