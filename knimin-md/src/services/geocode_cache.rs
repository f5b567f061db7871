//! Persistent geocode cache
//!
//! Every `(zipcode, country)` pair is resolved against the external
//! resolver at most once. Both positive and negative outcomes are stored,
//! so a pair the resolver cannot place is never queried again.

use crate::db::{logins, zipcodes};
use crate::error::Result;
use crate::services::geocoder::{GeocodeError, GeocodeResult, Geocoder};
use crate::types::Location;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a login geocoding backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub attempted: usize,
    pub geocoded: usize,
    pub failed: usize,
    /// The resolver reported quota exhaustion and the run stopped early
    pub halted_on_rate_limit: bool,
}

pub struct GeocodeCache {
    db: SqlitePool,
    resolver: Arc<dyn Geocoder>,
}

impl GeocodeCache {
    pub fn new(db: SqlitePool, resolver: Arc<dyn Geocoder>) -> Self {
        Self { db, resolver }
    }

    /// Resolve a zipcode/country pair to a location
    ///
    /// Missing zipcode or country yields an unresolved location without
    /// touching the resolver or the cache. Results are returned at full
    /// precision; callers apply `Location::with_precision` for export.
    pub async fn resolve(&self, zipcode: Option<&str>, country: Option<&str>) -> Result<Location> {
        let (zipcode, country) = match (non_empty(zipcode), non_empty(country)) {
            (Some(z), Some(c)) => (z, c),
            _ => return Ok(Location::unresolved(zipcode, country)),
        };

        if let Some(cached) = zipcodes::get_cached_location(&self.db, zipcode, country).await? {
            debug!(zipcode, country, geocodable = cached.geocodable, "Geocode cache hit");
            return Ok(cached);
        }

        let (key_zip, key_country) = zipcodes::normalize_key(zipcode, country);
        let query = format!("{} {}", key_zip, key_country);
        debug!(query = %query, "Geocode cache miss, calling resolver");

        let location = match self.resolver.geocode(&query).await {
            Ok(Some(found)) => accept_result(&key_zip, &key_country, found),
            Ok(None) => Location::unresolved(Some(key_zip.as_str()), Some(key_country.as_str())),
            Err(GeocodeError::RateLimitExceeded) => {
                warn!(zipcode, country, "Geocoder quota exhausted, leaving pair uncached");
                return Ok(Location::unresolved(Some(key_zip.as_str()), Some(key_country.as_str())));
            }
            Err(e) => {
                warn!(zipcode, country, error = %e, "Geocoder failed, caching pair as not geocodable");
                Location::unresolved(Some(key_zip.as_str()), Some(key_country.as_str()))
            }
        };

        zipcodes::upsert_location(&self.db, &key_zip, &key_country, &location).await?;
        Ok(location)
    }

    /// Geocode participant logins that have never been attempted
    ///
    /// With `retry` previously failed logins are cleared and attempted
    /// again. Quota exhaustion stops the run; logins not yet reached are
    /// left untouched so a later run resumes with them.
    pub async fn backfill(&self, limit: Option<usize>, retry: bool) -> Result<BackfillSummary> {
        if retry {
            let cleared = logins::clear_failed_geocodes(&self.db).await?;
            info!(cleared, "Cleared failed login geocodes for retry");
        }

        let pending = logins::get_logins_to_geocode(&self.db, limit).await?;
        let mut summary = BackfillSummary::default();
        let mut updates = Vec::with_capacity(pending.len());

        for login in pending {
            let address = login.query_string();
            debug!(ag_login_id = %login.ag_login_id, address = %address, "Geocoding login");

            let update = match self.resolver.geocode(&address).await {
                Ok(Some(found)) if found.latitude.is_some() => logins::LoginGeocode {
                    ag_login_id: login.ag_login_id,
                    latitude: found.latitude,
                    longitude: found.longitude,
                    elevation: found.elevation,
                    cannot_geocode: false,
                },
                Err(GeocodeError::RateLimitExceeded) => {
                    warn!(
                        attempted = summary.attempted,
                        "Geocoder quota exhausted, halting backfill"
                    );
                    summary.halted_on_rate_limit = true;
                    break;
                }
                other => {
                    if let Err(e) = other {
                        debug!(ag_login_id = %login.ag_login_id, error = %e, "Login geocode failed");
                    }
                    logins::LoginGeocode {
                        ag_login_id: login.ag_login_id,
                        latitude: None,
                        longitude: None,
                        elevation: None,
                        cannot_geocode: true,
                    }
                }
            };

            summary.attempted += 1;
            if update.cannot_geocode {
                summary.failed += 1;
            } else {
                summary.geocoded += 1;
            }
            updates.push(update);
        }

        logins::update_login_geocodes(&self.db, &updates).await?;
        info!(
            attempted = summary.attempted,
            geocoded = summary.geocoded,
            failed = summary.failed,
            halted = summary.halted_on_rate_limit,
            "Login geocode backfill complete"
        );
        Ok(summary)
    }

    /// Login geocoding coverage as (label, count)
    pub async fn stats(&self) -> Result<Vec<(String, i64)>> {
        Ok(logins::geocode_stats(&self.db).await?)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accept a resolver answer only if it lands in the requested country and postcode
fn accept_result(zipcode: &str, country: &str, found: GeocodeResult) -> Location {
    if found.latitude.is_none() {
        return Location::unresolved(Some(zipcode), Some(country));
    }

    let country_matches = found
        .country
        .as_deref()
        .map(|c| c.trim().eq_ignore_ascii_case(country))
        .unwrap_or(false);
    let clean_postcode = found
        .postcode
        .as_deref()
        .unwrap_or("")
        .to_lowercase()
        .replace(' ', "");
    let clean_zipcode = zipcode
        .to_lowercase()
        .replace(' ', "")
        .split('-')
        .next()
        .unwrap_or("")
        .to_string();

    if !country_matches || !clean_postcode.starts_with(&clean_zipcode) {
        return Location::unresolved(Some(zipcode), Some(country));
    }

    Location {
        zipcode: Some(zipcode.to_string()),
        country: Some(country.to_string()),
        latitude: found.latitude,
        longitude: found.longitude,
        elevation: found.elevation,
        city: found.city,
        state: found.state,
        geocodable: true,
    }
}
