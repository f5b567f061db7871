//! Metadata formatting
//!
//! Turns a raw survey export (keyed by survey id) into the submission
//! table for one survey type, keyed by barcode. Human tables are geolocated
//! and enriched with derived health fields and sample details; Animal and
//! other tables only receive their invariant columns.

pub mod constants;
pub mod derived;

use crate::db::barcodes::{self, BarcodeDetails};
use crate::db::lookups::{self, BodySite, CountryLookup};
use crate::db::surveys;
use crate::error::{PulldownError, Result};
use crate::services::geocode_cache::GeocodeCache;
use crate::table::{JoinKind, Table};
use crate::types::{Cell, Location, Precision, SurveyKind};
use chrono::{Datelike, NaiveTime};
use sqlx::SqlitePool;
use std::collections::HashMap;

use constants::*;
use derived::*;

/// Row key of formatted tables
pub const BARCODE: &str = "BARCODE";

/// Backbone pairs of (survey id, barcode)
pub type Backbone = [(String, String)];

pub struct MetadataFormatter<'a> {
    db: &'a SqlitePool,
    geocache: &'a GeocodeCache,
}

impl<'a> MetadataFormatter<'a> {
    pub fn new(db: &'a SqlitePool, geocache: &'a GeocodeCache) -> Self {
        Self { db, geocache }
    }

    /// Format the raw export of one survey type
    ///
    /// `full` keeps personally identifying columns and full coordinate
    /// precision. `external` names third-party surveys joined onto Human
    /// rows.
    pub async fn format(
        &self,
        kind: SurveyKind,
        raw: Table,
        backbone: &Backbone,
        full: bool,
        external: Option<&[String]>,
    ) -> Result<Table> {
        match kind {
            SurveyKind::Human => self.format_human(raw, backbone, full, external).await,
            SurveyKind::Animal => Ok(format_animal(raw, backbone)),
            SurveyKind::Other => Ok(format_basic(raw, backbone)),
        }
    }

    async fn format_human(
        &self,
        mut data: Table,
        backbone: &Backbone,
        full: bool,
        external: Option<&[String]>,
    ) -> Result<Table> {
        self.geolocate(&mut data, Precision::from_full(full)).await?;

        for (column, value) in HUMAN_INVARIANTS {
            data.fill_constant(column, Cell::text(*value));
        }
        data.derive_column("HOST_SUBJECT_ID", |_, row| cell_of(row, "RECORD_ID"));

        data.derive_column("ALCOHOL_CONSUMPTION", |_, row| {
            categorize_etoh(&cell_of(row, "ALCOHOL_FREQUENCY"))
        });
        data.derive_column("BMI_CORRECTED", |_, row| correct_bmi(&cell_of(row, "BMI")));
        data.derive_column("BMI_CAT", |_, row| {
            categorize_bmi(&cell_of(row, "BMI_CORRECTED"))
        });
        data.derive_column("AGE_CORRECTED", |_, row| {
            correct_age(
                &cell_of(row, "AGE_YEARS"),
                &cell_of(row, "HEIGHT_CM"),
                &cell_of(row, "WEIGHT_KG"),
                &cell_of(row, "ALCOHOL_CONSUMPTION"),
            )
        });
        data.derive_column("AGE_CAT", |_, row| {
            categorize_age(&cell_of(row, "AGE_CORRECTED"))
        });

        data.derive_column("SUBSET_AGE", |_, row| {
            Cell::from_bool(within(&cell_of(row, "AGE_YEARS"), 19.0, 70.0))
        });
        data.derive_column("SUBSET_DIABETES", |_, row| {
            Cell::from_bool(cell_of(row, "DIABETES").value() == Some(NO_CONDITION))
        });
        data.derive_column("SUBSET_IBD", |_, row| {
            Cell::from_bool(cell_of(row, "IBD").value() == Some(NO_CONDITION))
        });
        data.derive_column("SUBSET_ANTIBIOTIC_HISTORY", |_, row| {
            Cell::from_bool(cell_of(row, "ANTIBIOTIC_HISTORY").value() == Some(NO_RECENT_ANTIBIOTICS))
        });
        data.derive_column("SUBSET_BMI", |_, row| {
            Cell::from_bool(within(&cell_of(row, "BMI"), 18.5, 30.0))
        });
        data.derive_column("SUBSET_HEALTHY", |_, row| {
            let healthy = [
                "SUBSET_AGE",
                "SUBSET_DIABETES",
                "SUBSET_IBD",
                "SUBSET_ANTIBIOTIC_HISTORY",
                "SUBSET_BMI",
            ]
            .iter()
            .all(|flag| cell_of(row, flag).value() == Some("True"));
            Cell::from_bool(healthy)
        });

        data.derive_column("BIRTH_MONTH", |_, row| {
            split_birth_date(&cell_of(row, "BIRTH_DATE")).0
        });
        data.derive_column("BIRTH_YEAR", |_, row| {
            split_birth_date(&cell_of(row, "BIRTH_DATE")).1
        });
        data.drop_columns(&["BIRTH_DATE"]);

        if let Some(external) = external {
            for survey in external {
                let joined = self.external_table(survey, &data).await?;
                data.left_join(&joined);
            }
        }

        let mut combined = data.rekey(backbone, BARCODE, JoinKind::Inner);
        let keys: Vec<String> = combined.keys().cloned().collect();
        combined.derive_column("ANONYMIZED_NAME", |barcode, _| Cell::text(barcode));

        let details = barcodes::get_ag_barcode_details(self.db, &keys).await?;
        let body_sites = lookups::get_body_sites(self.db).await?;
        for barcode in &keys {
            let sample = sample_cells(barcode, details.get(barcode), &body_sites)?;
            for (column, cell) in sample {
                combined.set(barcode, column, cell);
            }
        }

        combined.drop_columns(REDCAP_REMOVE);
        if !full {
            combined.drop_columns(EBI_REMOVE);
        }
        Ok(combined)
    }

    /// Attach location columns resolved through the geocode cache
    async fn geolocate(&self, data: &mut Table, precision: Precision) -> Result<()> {
        let countries: CountryLookup = lookups::get_countries(self.db).await?;
        let keys: Vec<String> = data.keys().cloned().collect();
        let mut resolved: HashMap<(Option<String>, Option<String>), Location> = HashMap::new();

        for key in keys {
            let zipcode = data.get(&key, "ZIP_CODE").and_then(|c| c.value()).map(str::to_string);
            let country = data.get(&key, "COUNTRY").and_then(|c| c.value()).map(str::to_string);

            let pair = (zipcode.clone(), country.clone());
            let location = match resolved.get(&pair) {
                Some(location) => location.clone(),
                None => {
                    let location = self
                        .geocache
                        .resolve(zipcode.as_deref(), country.as_deref())
                        .await?
                        .with_precision(precision);
                    resolved.insert(pair, location.clone());
                    location
                }
            };

            for (column, cell) in location_cells(&location, country.as_deref(), &countries, precision)
            {
                data.set(&key, column, cell);
            }
        }
        Ok(())
    }

    /// Answers of one external survey as columns prefixed with its name
    async fn external_table(&self, survey: &str, data: &Table) -> Result<Table> {
        if !surveys::external_survey_exists(self.db, survey).await? {
            return Err(PulldownError::UnknownExternalSurvey(survey.to_string()));
        }
        let survey_ids: Vec<String> = data.keys().cloned().collect();
        let answers = surveys::get_external_survey(self.db, survey, &survey_ids, None).await?;

        let mut table = Table::new(data.index_name());
        for (survey_id, answers) in answers {
            table.insert_row(
                survey_id,
                answers
                    .into_iter()
                    .map(|(column, value)| (column, Cell::from_raw(&value))),
            );
        }

        let prefix = survey.to_uppercase();
        table.rename_columns(|column| format!("{}_{}", prefix, column.to_uppercase()));
        Ok(table)
    }
}

fn format_animal(data: Table, backbone: &Backbone) -> Table {
    let mut combined = data.rekey(backbone, BARCODE, JoinKind::Left);
    for (column, value) in ANIMAL_INVARIANTS {
        combined.fill_constant(column, Cell::text(*value));
    }
    combined.derive_column("ANONYMIZED_NAME", |barcode, _| Cell::text(barcode));
    combined.fill_missing(Cell::Unspecified);
    combined.drop_columns(REDCAP_REMOVE);
    combined
}

fn format_basic(mut data: Table, backbone: &Backbone) -> Table {
    for (column, value) in BASIC_INVARIANTS {
        data.fill_constant(column, Cell::text(*value));
    }
    let mut combined = data.rekey(backbone, BARCODE, JoinKind::Inner);
    combined.derive_column("ANONYMIZED_NAME", |barcode, _| Cell::text(barcode));
    combined.drop_columns(REDCAP_REMOVE);
    combined
}

/// Value of `column`, `Unspecified` when the row has none
fn cell_of(row: &crate::table::Row, column: &str) -> Cell {
    row.get(column).cloned().unwrap_or(Cell::Unspecified)
}

fn format_coordinate(value: Option<f64>, precision: Precision) -> Cell {
    match (value, precision) {
        (Some(v), Precision::Default) => Cell::text(format!("{:.1}", v)),
        (Some(v), Precision::Full) => Cell::text(v.to_string()),
        (None, _) => Cell::Unspecified,
    }
}

fn location_cells(
    location: &Location,
    requested_country: Option<&str>,
    countries: &CountryLookup,
    precision: Precision,
) -> Vec<(&'static str, Cell)> {
    let state = location.state.as_deref().filter(|_| location.is_resolved());
    let (census, economic) = match state.and_then(regions) {
        Some((census, economic)) => (Cell::text(census), Cell::text(economic)),
        None => (Cell::Unspecified, Cell::Unspecified),
    };

    let (latitude, longitude, elevation) = if location.is_resolved() {
        (location.latitude, location.longitude, location.elevation)
    } else {
        (None, None, None)
    };

    vec![
        (
            "COUNTRY",
            Cell::from_option(requested_country.map(|c| countries.display_name(c).to_string())),
        ),
        ("LATITUDE", format_coordinate(latitude, precision)),
        ("LONGITUDE", format_coordinate(longitude, precision)),
        ("ELEVATION", format_coordinate(elevation, precision)),
        ("STATE", Cell::from_option(state)),
        ("CENSUS_REGION", census),
        ("ECONOMIC_REGION", economic),
    ]
}

/// Collection and body-site columns of one barcode
///
/// A recorded site with no body-site entry is a data-integrity error.
fn sample_cells(
    barcode: &str,
    details: Option<&BarcodeDetails>,
    body_sites: &HashMap<String, BodySite>,
) -> Result<Vec<(&'static str, Cell)>> {
    let site = details
        .and_then(|d| d.site_sampled.clone())
        .unwrap_or_default();
    let body_site = body_sites
        .get(&site)
        .ok_or_else(|| PulldownError::UnknownBodySite {
            barcode: barcode.to_string(),
            site: site.clone(),
        })?;

    let sample_date = details.and_then(|d| d.sample_date);
    let sample_time = details.and_then(|d| d.sample_time);

    let mut cells = vec![
        (
            "COLLECTION_SEASON",
            Cell::from_option(sample_date.map(|d| season(d.month()))),
        ),
        (
            "COLLECTION_MONTH",
            Cell::from_option(sample_date.and_then(|d| month_name(d.month()))),
        ),
        (
            "COLLECTION_DATE",
            Cell::from_option(sample_date.map(|d| d.format("%m/%d/%Y").to_string())),
        ),
        (
            "COLLECTION_TIME",
            Cell::from_option(sample_time.map(|t| t.format("%H:%M").to_string())),
        ),
        (
            "COLLECTION_TIMESTAMP",
            Cell::from_option(sample_date.map(|d| {
                d.and_time(sample_time.unwrap_or(NaiveTime::MIN))
                    .format("%m/%d/%Y %H:%M")
                    .to_string()
            })),
        ),
    ];

    cells.extend([
        ("TAXON_ID", Cell::text(body_site.taxon_id.clone())),
        ("COMMON_NAME", Cell::text(body_site.common_name.clone())),
        ("ENV_MATTER", Cell::text(body_site.env_matter.clone())),
        ("SCIENTIFIC_NAME", Cell::text(body_site.scientific_name.clone())),
        ("SAMPLE_TYPE", Cell::text(body_site.sample_type.clone())),
        ("BODY_HABITAT", Cell::text(body_site.body_habitat.clone())),
        ("BODY_SITE", Cell::text(body_site.body_site.clone())),
        ("BODY_PRODUCT", Cell::text(body_site.body_product.clone())),
        ("DESCRIPTION", Cell::text(body_site.description.clone())),
    ]);
    Ok(cells)
}
