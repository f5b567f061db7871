//! Geocode resolver client
//!
//! `Geocoder` turns a free-text address into coordinates. The Google Maps
//! implementation issues a geocode request followed by an elevation request
//! for the resolved point.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const GOOGLE_MAPS_BASE_URL: &str = "https://maps.googleapis.com/maps/api";
const USER_AGENT: &str = "knimin-md/0.1.0";
const RATE_LIMIT_MS: u64 = 100; // 10 requests per second

/// Geocode resolver errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Daily quota or request rate exhausted; callers should stop and resume later
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request denied: {0}")]
    RequestDenied(String),
}

/// Location returned by the resolver for an address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeResult {
    pub postcode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve an address; `Ok(None)` means the resolver found nothing
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeEntry>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeEntry {
    address_components: Vec<AddressComponent>,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    short_name: String,
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    status: String,
    #[serde(default)]
    results: Vec<ElevationEntry>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElevationEntry {
    elevation: f64,
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Geocoder rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Google Maps geocoding + elevation client
pub struct GoogleGeocoder {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: String) -> Result<Self, GeocodeError> {
        Self::with_base_url(api_key, GOOGLE_MAPS_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, GeocodeError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/{}/json", self.base_url, endpoint);
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let status = response.status();
        if status == 429 {
            return Err(GeocodeError::RateLimitExceeded);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))
    }

    async fn elevation(&self, lat: f64, lng: f64) -> Result<Option<f64>, GeocodeError> {
        let locations = format!("{},{}", lat, lng);
        let response: ElevationResponse = self
            .get_json("elevation", &[("locations", locations.as_str())])
            .await?;
        check_status(&response.status, response.error_message.as_deref())?;
        Ok(response.results.first().map(|r| r.elevation))
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>, GeocodeError> {
        tracing::debug!(address = %address, "Querying geocoder");

        let response: GeocodeResponse = self.get_json("geocode", &[("address", address)]).await?;
        if response.status == "ZERO_RESULTS" {
            return Ok(None);
        }
        check_status(&response.status, response.error_message.as_deref())?;

        let Some(entry) = response.results.into_iter().next() else {
            return Ok(None);
        };
        let mut result = parse_entry(entry);
        if let (Some(lat), Some(lng)) = (result.latitude, result.longitude) {
            result.elevation = self.elevation(lat, lng).await?;
        }
        Ok(Some(result))
    }
}

fn check_status(status: &str, message: Option<&str>) -> Result<(), GeocodeError> {
    match status {
        "OK" => Ok(()),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Err(GeocodeError::RateLimitExceeded),
        "REQUEST_DENIED" => Err(GeocodeError::RequestDenied(
            message.unwrap_or("no message").to_string(),
        )),
        other => Err(GeocodeError::Api(
            200,
            format!("{}: {}", other, message.unwrap_or("no message")),
        )),
    }
}

fn parse_entry(entry: GeocodeEntry) -> GeocodeResult {
    let component = |kind: &str| {
        entry
            .address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
    };

    GeocodeResult {
        postcode: component("postal_code").map(|c| c.long_name.clone()),
        latitude: Some(entry.geometry.location.lat),
        longitude: Some(entry.geometry.location.lng),
        elevation: None,
        city: component("locality").map(|c| c.long_name.clone()),
        state: component("administrative_area_level_1").map(|c| c.short_name.clone()),
        country: component("country").map(|c| c.long_name.clone()),
    }
}
