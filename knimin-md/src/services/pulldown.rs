//! Pulldown orchestration
//!
//! Exports and formats every survey type attached to the requested
//! barcodes, then explains each requested barcode missing from the output.

use crate::db::{barcodes, surveys};
use crate::error::{PulldownError, Result};
use crate::services::batch_exporter::batch_grab;
use crate::services::classifier::classify;
use crate::services::formatter::{constants::blank_value, MetadataFormatter, BARCODE};
use crate::services::geocode_cache::GeocodeCache;
use crate::services::survey_client::SurveyExporter;
use crate::table::Table;
use crate::types::{Cell, FailureReason, SurveyKind};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Optional pulldown behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct PulldownOptions<'a> {
    /// Control sample names appended to the Human table
    pub blanks: Option<&'a [String]>,
    /// Third-party surveys joined onto Human rows
    pub external: Option<&'a [String]>,
    /// Keep identifying columns and full coordinate precision
    pub full: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulldownResult {
    /// Tab-separated table per survey type
    pub tables: BTreeMap<String, String>,
    /// Reason for every requested barcode missing from all tables
    pub failures: BTreeMap<String, FailureReason>,
}

/// Metadata pulldown pipeline
///
/// Holds one survey export client and one geocode cache for the lifetime
/// of the process.
pub struct Pulldown {
    db: SqlitePool,
    exporter: Arc<dyn SurveyExporter>,
    geocache: GeocodeCache,
    batch_size: usize,
}

impl Pulldown {
    pub fn new(
        db: SqlitePool,
        exporter: Arc<dyn SurveyExporter>,
        geocache: GeocodeCache,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            exporter,
            geocache,
            batch_size,
        }
    }

    /// Pull down formatted metadata for `requested` barcodes
    pub async fn pulldown(
        &self,
        requested: &[String],
        options: PulldownOptions<'_>,
    ) -> Result<PulldownResult> {
        if let Some(external) = options.external {
            for survey in external {
                if !surveys::external_survey_exists(&self.db, survey).await? {
                    return Err(PulldownError::UnknownExternalSurvey(survey.clone()));
                }
            }
        }

        let survey_types = surveys::get_survey_types(&self.db, true).await?;
        let records = barcodes::get_records_for_barcodes(&self.db, requested).await?;
        let backbone = barcodes::get_barcode_surveys(&self.db, requested).await?;
        let formatter = MetadataFormatter::new(&self.db, &self.geocache);

        let mut result = PulldownResult::default();
        let mut formatted_barcodes: BTreeSet<String> = BTreeSet::new();

        for (survey_type, instruments) in &survey_types {
            let raw = batch_grab(self.exporter.as_ref(), instruments, &records, self.batch_size)
                .await?;
            if raw.is_empty() {
                debug!(survey_type = %survey_type, "No survey answers, skipping survey type");
                continue;
            }

            let kind = SurveyKind::from_name(survey_type);
            let answered: BTreeSet<String> = raw.keys().cloned().collect();
            let mut table = formatter
                .format(kind, raw, &backbone, options.full, options.external)
                .await?;
            // Rows joined in without answers of their own don't count
            formatted_barcodes.extend(
                backbone
                    .iter()
                    .filter(|(survey_id, barcode)| {
                        answered.contains(survey_id) && table.contains_key(barcode)
                    })
                    .map(|(_, barcode)| barcode.clone()),
            );

            if kind == SurveyKind::Human {
                if let Some(blanks) = options.blanks {
                    table.append(blank_rows(&table, blanks));
                }
            }

            info!(survey_type = %survey_type, rows = table.len(), "Formatted survey type");
            result.tables.insert(survey_type.clone(), table.to_tsv()?);
        }

        let missing: BTreeSet<String> = requested
            .iter()
            .filter(|barcode| !formatted_barcodes.contains(*barcode))
            .cloned()
            .collect();
        result.failures = classify(&self.db, &missing).await?;

        info!(
            requested = requested.len(),
            survey_types = result.tables.len(),
            formatted = formatted_barcodes.len(),
            failures = result.failures.len(),
            "Pulldown complete"
        );
        Ok(result)
    }
}

/// Control rows carrying the fixed blank placeholder in every column
fn blank_rows(template: &Table, blanks: &[String]) -> Table {
    let mut table = Table::new(BARCODE);
    for blank in blanks {
        table.insert_row(
            blank.clone(),
            template
                .columns()
                .iter()
                .map(|column| (column.clone(), Cell::from_raw(blank_value(column)))),
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_rows_follow_template_columns() {
        let mut template = Table::new(BARCODE);
        template.insert_row(
            "000000001",
            vec![
                ("SAMPLE_TYPE".to_string(), Cell::text("Stool")),
                ("AGE_YEARS".to_string(), Cell::text("30")),
            ],
        );

        let blanks = blank_rows(&template, &["BLANK.01".to_string()]);
        assert_eq!(blanks.columns(), template.columns());
        assert_eq!(blanks.get("BLANK.01", "SAMPLE_TYPE"), Some(&Cell::text("control blank")));
        assert_eq!(blanks.get("BLANK.01", "AGE_YEARS"), Some(&Cell::Unspecified));
    }
}
