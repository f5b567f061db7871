//! Survey instruments and third-party (external) survey answers

use chrono::{Local, NaiveDateTime};
use knimin_common::{Error, Result};
use regex::Regex;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::io::Read;

use super::{placeholders, MAX_BIND_PARAMS};

/// Characters stripped from both ends of every external answer
const ANSWER_STRIP: &[char] = &['"', '\'', '[', ']', '_', ',', '\t', '\r', '\n', '\\', '/', ' '];

const PULLDOWN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Answers of one participant to an external survey, column to value
pub type ExternalAnswers = BTreeMap<String, String>;

/// Survey instruments grouped by survey type
///
/// With `secondary == false` only primary instruments are returned.
pub async fn get_survey_types(
    pool: &SqlitePool,
    secondary: bool,
) -> Result<BTreeMap<String, Vec<String>>> {
    let sql = if secondary {
        "SELECT survey_type, redcap_instrument_id FROM redcap_instruments \
         ORDER BY survey_type, redcap_instrument_id"
    } else {
        "SELECT survey_type, redcap_instrument_id FROM redcap_instruments \
         WHERE secondary = 0 ORDER BY survey_type, redcap_instrument_id"
    };
    let rows: Vec<(String, String)> = sqlx::query_as(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| Error::query("get_survey_types", e))?;

    let mut types: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (survey_type, instrument) in rows {
        types.entry(survey_type).or_default().push(instrument);
    }
    Ok(types)
}

/// Register a new external survey source, returning its id
pub async fn add_external_survey(
    pool: &SqlitePool,
    survey: &str,
    description: &str,
    url: &str,
) -> Result<i64> {
    if external_survey_id(pool, survey).await?.is_some() {
        return Err(Error::InvalidInput(format!(
            "Survey '{}' already exists",
            survey
        )));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO external_survey_sources
            (external_survey, external_survey_description, external_survey_url)
        VALUES (?, ?, ?)
        RETURNING external_survey_id
        "#,
    )
    .bind(survey)
    .bind(description)
    .bind(url)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::query("add_external_survey", e))?;

    Ok(id)
}

/// Names of every registered external survey
pub async fn list_external_surveys(pool: &SqlitePool) -> Result<Vec<String>> {
    sqlx::query_scalar(
        "SELECT external_survey FROM external_survey_sources ORDER BY external_survey_id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::query("list_external_surveys", e))
}

async fn external_survey_id(pool: &SqlitePool, survey: &str) -> Result<Option<i64>> {
    sqlx::query_scalar(
        "SELECT external_survey_id FROM external_survey_sources WHERE external_survey = ?",
    )
    .bind(survey)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::query("external_survey_id", e))
}

pub async fn external_survey_exists(pool: &SqlitePool, survey: &str) -> Result<bool> {
    Ok(external_survey_id(pool, survey).await?.is_some())
}

/// Options for loading an external survey export
#[derive(Debug, Clone)]
pub struct ExternalSurveyLoad<'a> {
    pub survey: &'a str,
    /// When the answers were pulled from the source; defaults to now
    pub pulldown_date: Option<NaiveDateTime>,
    pub separator: u8,
    /// Header of the column holding the participant's survey id
    pub survey_id_col: &'a str,
    /// Pattern removed from every survey id before storing
    pub trim: Option<&'a Regex>,
}

impl<'a> ExternalSurveyLoad<'a> {
    pub fn new(survey: &'a str) -> Self {
        Self {
            survey,
            pulldown_date: None,
            separator: b'\t',
            survey_id_col: "survey_id",
            trim: None,
        }
    }
}

/// Store the answers of a delimited external survey file
///
/// Returns the number of answer rows inserted. All rows are written in one
/// transaction.
pub async fn store_external_survey<R: Read>(
    pool: &SqlitePool,
    reader: R,
    load: &ExternalSurveyLoad<'_>,
) -> Result<usize> {
    let external_id = external_survey_id(pool, load.survey)
        .await?
        .ok_or_else(|| {
            Error::InvalidInput(format!("Unknown external survey: {}", load.survey))
        })?;
    let pulldown_date = load
        .pulldown_date
        .unwrap_or_else(|| Local::now().naive_local())
        .format(PULLDOWN_DATE_FORMAT)
        .to_string();

    let inserts = parse_external_answers(reader, load)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::query("store_external_survey", e))?;
    for (survey_id, answers) in &inserts {
        let answers = serde_json::to_string(answers)
            .map_err(|e| Error::Internal(format!("Encode answers failed: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO external_survey_answers
                (survey_id, external_survey_id, pulldown_date, answers)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(survey_id)
        .bind(external_id)
        .bind(&pulldown_date)
        .bind(answers)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::query("store_external_survey", e))?;
    }
    tx.commit()
        .await
        .map_err(|e| Error::query("store_external_survey", e))?;

    tracing::info!(
        survey = load.survey,
        rows = inserts.len(),
        "Stored external survey answers"
    );
    Ok(inserts.len())
}

fn parse_external_answers<R: Read>(
    reader: R,
    load: &ExternalSurveyLoad<'_>,
) -> Result<Vec<(String, ExternalAnswers)>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(load.separator)
        .quoting(false)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("Read external survey header failed: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if !headers.iter().any(|h| h == load.survey_id_col) {
        return Err(Error::InvalidInput(format!(
            "External survey file has no '{}' column",
            load.survey_id_col
        )));
    }

    let mut inserts = Vec::new();
    for record in csv_reader.records() {
        let record = record
            .map_err(|e| Error::InvalidInput(format!("Read external survey row failed: {}", e)))?;

        let mut answers = ExternalAnswers::new();
        let mut survey_id = None;
        for (header, value) in headers.iter().zip(record.iter()) {
            let value = value.trim_matches(ANSWER_STRIP).to_string();
            if header == load.survey_id_col {
                survey_id = Some(match load.trim {
                    Some(pattern) => pattern.replace_all(&value, "").into_owned(),
                    None => value,
                });
            } else {
                answers.insert(header.clone(), value);
            }
        }

        if let Some(survey_id) = survey_id {
            inserts.push((survey_id, answers));
        }
    }
    Ok(inserts)
}

/// Answers to `survey` for the given survey ids
///
/// When a survey id was loaded in several pulldowns the newest answers win.
/// `pulldown_date` restricts the lookup to a single load.
pub async fn get_external_survey(
    pool: &SqlitePool,
    survey: &str,
    survey_ids: &[String],
    pulldown_date: Option<NaiveDateTime>,
) -> Result<BTreeMap<String, ExternalAnswers>> {
    let mut found = BTreeMap::new();
    let pulldown_date = pulldown_date.map(|d| d.format(PULLDOWN_DATE_FORMAT).to_string());

    for chunk in survey_ids.chunks(MAX_BIND_PARAMS) {
        let date_filter = if pulldown_date.is_some() {
            " AND a.pulldown_date = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT a.survey_id, a.answers \
             FROM external_survey_answers a \
             JOIN external_survey_sources s USING (external_survey_id) \
             WHERE s.external_survey = ? AND a.survey_id IN ({}){} \
             ORDER BY a.pulldown_date ASC, a.rowid ASC",
            placeholders(chunk.len()),
            date_filter
        );

        let mut query = sqlx::query_as::<_, (String, String)>(&sql).bind(survey);
        for survey_id in chunk {
            query = query.bind(survey_id.as_str());
        }
        if let Some(date) = &pulldown_date {
            query = query.bind(date.as_str());
        }
        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| Error::query("get_external_survey", e))?;

        for (survey_id, answers) in rows {
            let answers: ExternalAnswers = serde_json::from_str(&answers).map_err(|e| {
                Error::Internal(format!(
                    "Stored answers for survey id {} are not valid JSON: {}",
                    survey_id, e
                ))
            })?;
            found.insert(survey_id, answers);
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_store;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 5, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_survey_types_primary_only() {
        let pool = memory_store().await;
        sqlx::query(
            "INSERT INTO redcap_instruments VALUES \
             ('ag-human-en-us', 'Human', 0), \
             ('ag-fermented-en-us', 'Human', 1), \
             ('ag-animal-en-us', 'Animal', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let all = get_survey_types(&pool, true).await.unwrap();
        assert_eq!(all["Human"], vec!["ag-fermented-en-us", "ag-human-en-us"]);
        let primary = get_survey_types(&pool, false).await.unwrap();
        assert_eq!(primary["Human"], vec!["ag-human-en-us"]);
        assert_eq!(primary["Animal"], vec!["ag-animal-en-us"]);
    }

    #[tokio::test]
    async fn test_add_external_survey_rejects_duplicates() {
        let pool = memory_store().await;
        add_external_survey(&pool, "Vioscreen", "FFQ", "https://vioscreen.com")
            .await
            .unwrap();
        let err = add_external_survey(&pool, "Vioscreen", "FFQ", "https://vioscreen.com")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(list_external_surveys(&pool).await.unwrap(), vec!["Vioscreen"]);
        assert!(external_survey_exists(&pool, "Vioscreen").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_unknown_survey_is_input_error() {
        let pool = memory_store().await;
        let load = ExternalSurveyLoad::new("Nope");
        let err = store_external_survey(&pool, "survey_id\tq1\n".as_bytes(), &load)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_store_and_get_newest_answers() {
        let pool = memory_store().await;
        add_external_survey(&pool, "Vioscreen", "FFQ", "https://vioscreen.com")
            .await
            .unwrap();
        let trim = Regex::new("^x").unwrap();

        let first = "SID\tCALORIES\tPROTEIN\nxsurvey-a\t\"2100\"\t[55]\nxsurvey-b\t1800\t40\n";
        let mut load = ExternalSurveyLoad::new("Vioscreen");
        load.survey_id_col = "SID";
        load.trim = Some(&trim);
        load.pulldown_date = Some(at(1));
        let inserted = store_external_survey(&pool, first.as_bytes(), &load)
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let second = "SID\tCALORIES\tPROTEIN\nxsurvey-a\t2500\t60\n";
        load.pulldown_date = Some(at(9));
        store_external_survey(&pool, second.as_bytes(), &load)
            .await
            .unwrap();

        let ids = vec!["survey-a".to_string(), "survey-b".to_string(), "survey-c".to_string()];
        let answers = get_external_survey(&pool, "Vioscreen", &ids, None)
            .await
            .unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers["survey-a"]["CALORIES"], "2500");
        assert_eq!(answers["survey-b"]["PROTEIN"], "40");

        let pinned = get_external_survey(&pool, "Vioscreen", &ids, Some(at(1)))
            .await
            .unwrap();
        assert_eq!(pinned["survey-a"]["CALORIES"], "2100");
        assert_eq!(pinned["survey-a"]["PROTEIN"], "55");
    }

    #[tokio::test]
    async fn test_missing_survey_id_column() {
        let pool = memory_store().await;
        add_external_survey(&pool, "Vioscreen", "FFQ", "").await.unwrap();
        let load = ExternalSurveyLoad::new("Vioscreen");
        let err = store_external_survey(&pool, "id\tq1\nabc\t1\n".as_bytes(), &load)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("survey_id"));
    }
}
