//! Chunked survey export
//!
//! Record ids are exported in bounded-size requests and reassembled into
//! a single table keyed by survey id. A failed chunk fails the whole call.

use crate::error::{PulldownError, Result};
use crate::services::survey_client::{ExportRequest, RawRecord, SurveyExporter};
use crate::table::Table;
use crate::types::Cell;
use tracing::{debug, warn};

/// Index column of exported survey tables
pub const SURVEY_ID: &str = "SURVEY_ID";

/// Export the answers of `records` for `instruments`, `batch_size` records per call
///
/// Column names are upper-cased and any missing answer is filled with
/// `Unspecified`. Records without a survey id are skipped.
pub async fn batch_grab(
    client: &dyn SurveyExporter,
    instruments: &[String],
    records: &[i64],
    batch_size: usize,
) -> Result<Table> {
    let batch_size = batch_size.max(1);
    let mut exported: Vec<RawRecord> = Vec::with_capacity(records.len());

    for (chunk_index, chunk) in records.chunks(batch_size).enumerate() {
        debug!(
            chunk = chunk_index,
            records = chunk.len(),
            batch_size,
            "Exporting survey chunk"
        );
        let request = ExportRequest {
            records: chunk,
            instruments,
            labels: true,
        };
        let rows = client
            .export(&request)
            .await
            .map_err(|source| PulldownError::BatchExport { batch_size, source })?;
        exported.extend(rows);
    }

    Ok(assemble(exported))
}

fn assemble(exported: Vec<RawRecord>) -> Table {
    let mut table = Table::new(SURVEY_ID);

    for record in exported {
        let mut survey_id = None;
        let mut cells = Vec::with_capacity(record.len());
        for (field, value) in record {
            let column = field.to_uppercase();
            if column == SURVEY_ID {
                survey_id = Some(value.trim().to_string()).filter(|s| !s.is_empty());
            } else {
                cells.push((column, Cell::from_raw(&value)));
            }
        }

        let Some(survey_id) = survey_id else {
            warn!("Exported record has no survey id, skipping");
            continue;
        };
        if table.contains_key(&survey_id) {
            warn!(survey_id = %survey_id, "Duplicate survey id in export, keeping first");
            continue;
        }
        table.insert_row(survey_id, cells);
    }

    table.fill_missing(Cell::Unspecified);
    table
}
