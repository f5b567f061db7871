//! Static lookup tables: countries and body sites

use knimin_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Placeholder country used by scrubbed copies of the store
pub const REMOVED_COUNTRY: &str = "REMOVED";

/// Country name to submission display name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryLookup {
    names: HashMap<String, String>,
}

impl CountryLookup {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    /// Display name for `country`; countries without an entry pass through
    pub fn display_name<'a>(&'a self, country: &'a str) -> &'a str {
        self.names
            .get(country)
            .map(String::as_str)
            .unwrap_or(country)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Load the country display lookup
pub async fn get_countries(pool: &SqlitePool) -> Result<CountryLookup> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT country, ebi FROM iso_country_lookup")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::query("get_countries", e))?;

    let mut names: HashMap<String, String> = rows.into_iter().collect();
    names
        .entry(REMOVED_COUNTRY.to_string())
        .or_insert_with(|| REMOVED_COUNTRY.to_string());
    Ok(CountryLookup::new(names))
}

/// Taxonomy bundle describing a sampled body site
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BodySite {
    pub site_sampled: String,
    pub taxon_id: String,
    pub common_name: String,
    pub scientific_name: String,
    pub sample_type: String,
    pub body_habitat: String,
    pub body_site: String,
    pub body_product: String,
    pub env_matter: String,
    pub description: String,
}

/// Body-site bundles keyed by the recorded sample site
pub async fn get_body_sites(pool: &SqlitePool) -> Result<HashMap<String, BodySite>> {
    let sites = sqlx::query_as::<_, BodySite>(
        r#"
        SELECT site_sampled, taxon_id, common_name, scientific_name, sample_type,
               body_habitat, body_site, body_product, env_matter, description
        FROM body_site_lookup
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::query("get_body_sites", e))?;

    Ok(sites
        .into_iter()
        .map(|site| (site.site_sampled.clone(), site))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_store;

    #[tokio::test]
    async fn test_countries_are_total() {
        let pool = memory_store().await;
        sqlx::query("INSERT INTO iso_country_lookup (country, ebi) VALUES ('US', 'USA')")
            .execute(&pool)
            .await
            .unwrap();

        let countries = get_countries(&pool).await.unwrap();
        assert_eq!(countries.display_name("US"), "USA");
        assert_eq!(countries.display_name("Atlantis"), "Atlantis");
        assert_eq!(countries.display_name(REMOVED_COUNTRY), REMOVED_COUNTRY);
        assert_eq!(countries.len(), 2);
    }

    #[tokio::test]
    async fn test_body_sites_keyed_by_site() {
        let pool = memory_store().await;
        sqlx::query(
            r#"
            INSERT INTO body_site_lookup VALUES
                ('Stool', '408170', 'human gut metagenome', 'human gut metagenome',
                 'Stool', 'UBERON:feces', 'UBERON:feces', 'UBERON:feces',
                 'ENVO:feces', 'American Gut Project Stool sample')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let sites = get_body_sites(&pool).await.unwrap();
        assert_eq!(sites["Stool"].taxon_id, "408170");
        assert!(!sites.contains_key("Nares"));
    }
}
