//! Fixed tables used by the metadata formatter

use chrono::Month;

pub const PROJECT_TITLE: &str = "American Gut Project";

/// Columns written identically on every Human row
pub const HUMAN_INVARIANTS: &[(&str, &str)] = &[
    ("HOST_TAXID", "9606"),
    ("TITLE", PROJECT_TITLE),
    ("ALTITUDE", "0"),
    ("ASSIGNED_FROM_GEO", "Yes"),
    ("ENV_BIOME", "ENVO:dense settlement biome"),
    ("ENV_FEATURE", "ENVO:human-associated habitat"),
    ("DEPTH", "0"),
    ("DNA_EXTRACTED", "Yes"),
    ("HAS_PHYSICAL_SPECIMEN", "Yes"),
    ("PHYSICAL_SPECIMEN_REMAINING", "Yes"),
    ("PHYSICAL_SPECIMEN_LOCATION", "UCSDMI"),
    ("REQUIRED_SAMPLE_INFO_STATUS", "completed"),
    ("HOST_COMMON_NAME", "human"),
    ("PUBLIC", "Yes"),
];

pub const ANIMAL_INVARIANTS: &[(&str, &str)] = &[
    ("TITLE", PROJECT_TITLE),
    ("ALTITUDE", "0"),
    ("ASSIGNED_FROM_GEO", "Yes"),
    ("ENV_BIOME", "ENVO:dense settlement biome"),
    ("ENV_FEATURE", "ENVO:animal-associated habitat"),
    ("DEPTH", "0"),
    ("DESCRIPTION", "American Gut Project Animal sample"),
    ("DNA_EXTRACTED", "Yes"),
    ("HAS_PHYSICAL_SPECIMEN", "Yes"),
    ("PHYSICAL_SPECIMEN_REMAINING", "Yes"),
    ("PHYSICAL_SPECIMEN_LOCATION", "UCSDMI"),
    ("REQUIRED_SAMPLE_INFO_STATUS", "completed"),
];

pub const BASIC_INVARIANTS: &[(&str, &str)] = &[
    ("TITLE", PROJECT_TITLE),
    ("ALTITUDE", "0"),
    ("ASSIGNED_FROM_GEO", "Yes"),
    ("DEPTH", "0"),
    ("DESCRIPTION", "American Gut Project sample"),
    ("DNA_EXTRACTED", "Yes"),
    ("HAS_PHYSICAL_SPECIMEN", "Yes"),
    ("PHYSICAL_SPECIMEN_REMAINING", "Yes"),
    ("PHYSICAL_SPECIMEN_LOCATION", "UCSDMI"),
    ("REQUIRED_SAMPLE_INFO_STATUS", "completed"),
];

/// Survey export bookkeeping columns, never exported
pub const REDCAP_REMOVE: &[&str] = &[
    "RECORD_ID",
    "REDCAP_SURVEY_IDENTIFIER",
    "REDCAP_DATA_ACCESS_GROUP",
    "REDCAP_REPEAT_INSTRUMENT",
    "REDCAP_REPEAT_INSTANCE",
];

/// Columns holding personally identifying information
pub const EBI_REMOVE: &[&str] = &[
    "ZIP_CODE",
    "CITY",
    "BIRTH_MONTH",
    "ABOUT_YOURSELF_TEXT",
    "PARTICIPANT_NAME",
    "EMAIL",
    "ANTIBIOTIC_MED",
    "ANTIBIOTIC_CONDITION",
    "CONDITIONS_MEDICATION",
    "MEDICATION_LIST",
    "SUPPLEMENTS",
    "SPECIAL_RESTRICTIONS",
    "ALLERGIC_TO_SPECIFIC",
    "NON_FOOD_ALLERGIES_SPECIFIC",
];

/// Placeholder values of synthetic blank control rows
const BLANK_VALUES: &[(&str, &str)] = &[
    ("TITLE", PROJECT_TITLE),
    ("HOST_TAXID", "256318"),
    ("TAXON_ID", "256318"),
    ("SCIENTIFIC_NAME", "metagenome"),
    ("COMMON_NAME", "metagenome"),
    ("SAMPLE_TYPE", "control blank"),
    ("DESCRIPTION", "American Gut Project control blank"),
    ("ENV_BIOME", "ENVO:urban biome"),
    ("ENV_FEATURE", "ENVO:research facility"),
    ("ENV_MATTER", "ENVO:sterile water"),
    ("ALTITUDE", "0"),
    ("DEPTH", "0"),
    ("ASSIGNED_FROM_GEO", "No"),
    ("DNA_EXTRACTED", "Yes"),
    ("HAS_PHYSICAL_SPECIMEN", "Yes"),
    ("PHYSICAL_SPECIMEN_REMAINING", "Yes"),
    ("PHYSICAL_SPECIMEN_LOCATION", "UCSDMI"),
    ("REQUIRED_SAMPLE_INFO_STATUS", "completed"),
    ("PUBLIC", "Yes"),
    ("LATITUDE", "32.9"),
    ("LONGITUDE", "-117.2"),
    ("ELEVATION", "110.0"),
    ("STATE", "CA"),
    ("COUNTRY", "USA"),
];

/// Placeholder for `column` in a blank control row
pub fn blank_value(column: &str) -> &'static str {
    BLANK_VALUES
        .iter()
        .find(|(c, _)| *c == column)
        .map(|(_, v)| *v)
        .unwrap_or(crate::types::UNSPECIFIED)
}

/// Collection season of a sample month
pub fn season(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "Winter",
        3..=5 => "Spring",
        6..=8 => "Summer",
        _ => "Fall",
    }
}

/// English month name, `None` outside 1..=12
pub fn month_name(month: u32) -> Option<&'static str> {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
}

/// (state, census region, economic region)
const REGIONS_BY_STATE: &[(&str, &str, &str)] = &[
    ("AK", "West", "Far West"),
    ("AL", "South", "Southeast"),
    ("AR", "South", "Southeast"),
    ("AZ", "West", "Southwest"),
    ("CA", "West", "Far West"),
    ("CO", "West", "Rocky Mountain"),
    ("CT", "Northeast", "New England"),
    ("DC", "South", "Mideast"),
    ("DE", "South", "Mideast"),
    ("FL", "South", "Southeast"),
    ("GA", "South", "Southeast"),
    ("HI", "West", "Far West"),
    ("IA", "Midwest", "Plains"),
    ("ID", "West", "Rocky Mountain"),
    ("IL", "Midwest", "Great Lakes"),
    ("IN", "Midwest", "Great Lakes"),
    ("KS", "Midwest", "Plains"),
    ("KY", "South", "Southeast"),
    ("LA", "South", "Southeast"),
    ("MA", "Northeast", "New England"),
    ("MD", "South", "Mideast"),
    ("ME", "Northeast", "New England"),
    ("MI", "Midwest", "Great Lakes"),
    ("MN", "Midwest", "Plains"),
    ("MO", "Midwest", "Plains"),
    ("MS", "South", "Southeast"),
    ("MT", "West", "Rocky Mountain"),
    ("NC", "South", "Southeast"),
    ("ND", "Midwest", "Plains"),
    ("NE", "Midwest", "Plains"),
    ("NH", "Northeast", "New England"),
    ("NJ", "Northeast", "Mideast"),
    ("NM", "West", "Southwest"),
    ("NV", "West", "Far West"),
    ("NY", "Northeast", "Mideast"),
    ("OH", "Midwest", "Great Lakes"),
    ("OK", "South", "Southwest"),
    ("OR", "West", "Far West"),
    ("PA", "Northeast", "Mideast"),
    ("RI", "Northeast", "New England"),
    ("SC", "South", "Southeast"),
    ("SD", "Midwest", "Plains"),
    ("TN", "South", "Southeast"),
    ("TX", "South", "Southwest"),
    ("UT", "West", "Rocky Mountain"),
    ("VA", "South", "Southeast"),
    ("VT", "Northeast", "New England"),
    ("WA", "West", "Far West"),
    ("WI", "Midwest", "Great Lakes"),
    ("WV", "South", "Southeast"),
    ("WY", "West", "Rocky Mountain"),
];

/// Census and economic region of a US state abbreviation
pub fn regions(state: &str) -> Option<(&'static str, &'static str)> {
    REGIONS_BY_STATE
        .iter()
        .find(|(s, _, _)| s.eq_ignore_ascii_case(state.trim()))
        .map(|(_, census, economic)| (*census, *economic))
}
