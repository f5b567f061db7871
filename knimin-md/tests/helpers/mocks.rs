//! Mock survey export and geocoding services counting their calls

use async_trait::async_trait;
use knimin_md::services::geocoder::{GeocodeError, GeocodeResult, Geocoder};
use knimin_md::services::survey_client::{ExportError, ExportRequest, RawRecord, SurveyExporter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Survey export service holding (instrument, record id, answers) triples
#[derive(Default)]
pub struct MockExporter {
    records: Vec<(String, i64, RawRecord)>,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl MockExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, instrument: &str, record_id: i64, answers: &[(&str, &str)]) -> Self {
        let mut record: RawRecord = answers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        record.insert("record_id".to_string(), record_id.to_string());
        self.records.push((instrument.to_string(), record_id, record));
        self
    }

    /// Fail the n-th export call (0-based)
    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurveyExporter for MockExporter {
    async fn export(&self, request: &ExportRequest<'_>) -> Result<Vec<RawRecord>, ExportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if Some(call) == self.fail_on_call {
            return Err(ExportError::Api(500, "export failed".to_string()));
        }

        Ok(self
            .records
            .iter()
            .filter(|(instrument, record_id, _)| {
                request.records.contains(record_id) && request.instruments.contains(instrument)
            })
            .map(|(_, _, record)| record.clone())
            .collect())
    }
}

/// Scripted resolver answer
#[derive(Debug, Clone)]
pub enum GeocodeAnswer {
    Found(GeocodeResult),
    NotFound,
    RateLimited,
    Fails,
}

/// Geocoder answering from a fixed address table; unknown addresses are not found
#[derive(Default)]
pub struct MockGeocoder {
    answers: HashMap<String, GeocodeAnswer>,
    queries: Mutex<Vec<String>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, address: &str, answer: GeocodeAnswer) -> Self {
        self.answers.insert(address.to_string(), answer);
        self
    }

    pub fn found(
        self,
        address: &str,
        postcode: &str,
        country: &str,
        state: &str,
        coordinates: (f64, f64, f64),
    ) -> Self {
        self.answer(
            address,
            GeocodeAnswer::Found(GeocodeResult {
                postcode: Some(postcode.to_string()),
                latitude: Some(coordinates.0),
                longitude: Some(coordinates.1),
                elevation: Some(coordinates.2),
                city: None,
                state: Some(state.to_string()),
                country: Some(country.to_string()),
            }),
        )
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>, GeocodeError> {
        self.queries.lock().unwrap().push(address.to_string());
        match self.answers.get(address) {
            Some(GeocodeAnswer::Found(result)) => Ok(Some(result.clone())),
            Some(GeocodeAnswer::RateLimited) => Err(GeocodeError::RateLimitExceeded),
            Some(GeocodeAnswer::Fails) => Err(GeocodeError::Api(500, "boom".to_string())),
            Some(GeocodeAnswer::NotFound) | None => Ok(None),
        }
    }
}
