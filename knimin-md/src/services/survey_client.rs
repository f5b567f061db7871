//! Survey export service client
//!
//! The pipeline only needs one remote operation: export the answers of a
//! set of records for a set of instruments. `SurveyExporter` is that seam;
//! `RedcapClient` is the production implementation over the REDCap API.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "knimin-md/0.1.0";
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Survey export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid API token")]
    InvalidToken,
}

/// One raw exported record: field code to answer text
pub type RawRecord = BTreeMap<String, String>;

/// Parameters of a single export call
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest<'a> {
    pub records: &'a [i64],
    pub instruments: &'a [String],
    /// Export answer labels instead of coded values
    pub labels: bool,
}

#[async_trait]
pub trait SurveyExporter: Send + Sync {
    /// Export string-typed answers for the requested records
    async fn export(&self, request: &ExportRequest<'_>) -> Result<Vec<RawRecord>, ExportError>;
}

/// REDCap API client
pub struct RedcapClient {
    http_client: reqwest::Client,
    url: String,
    token: String,
}

impl RedcapClient {
    pub fn new(url: String, token: String) -> Result<Self, ExportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url,
            token,
        })
    }

    fn form_params(&self, request: &ExportRequest<'_>) -> Vec<(String, String)> {
        let mut params = vec![
            ("token".to_string(), self.token.clone()),
            ("content".to_string(), "record".to_string()),
            ("format".to_string(), "json".to_string()),
            ("type".to_string(), "flat".to_string()),
            (
                "rawOrLabel".to_string(),
                if request.labels { "label" } else { "raw" }.to_string(),
            ),
            ("exportSurveyFields".to_string(), "true".to_string()),
            ("exportCheckboxLabel".to_string(), "true".to_string()),
            ("returnFormat".to_string(), "json".to_string()),
        ];
        for (i, record) in request.records.iter().enumerate() {
            params.push((format!("records[{}]", i), record.to_string()));
        }
        for (i, form) in request.instruments.iter().enumerate() {
            params.push((format!("forms[{}]", i), form.clone()));
        }
        params
    }
}

#[async_trait]
impl SurveyExporter for RedcapClient {
    async fn export(&self, request: &ExportRequest<'_>) -> Result<Vec<RawRecord>, ExportError> {
        if request.records.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            records = request.records.len(),
            instruments = request.instruments.len(),
            "Exporting survey records"
        );

        let response = self
            .http_client
            .post(&self.url)
            .form(&self.form_params(request))
            .send()
            .await
            .map_err(|e| ExportError::Network(e.to_string()))?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(ExportError::InvalidToken);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExportError::Api(status.as_u16(), error_text));
        }

        let body: Vec<serde_json::Map<String, Value>> = response
            .json()
            .await
            .map_err(|e| ExportError::Parse(e.to_string()))?;

        Ok(body.into_iter().map(stringify_record).collect())
    }
}

/// Flatten a JSON record into string-typed answers
pub(crate) fn stringify_record(record: serde_json::Map<String, Value>) -> RawRecord {
    record
        .into_iter()
        .map(|(field, value)| {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            (field, text)
        })
        .collect()
}
