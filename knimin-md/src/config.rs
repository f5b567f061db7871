//! Service credential resolution for knimin-md
//!
//! Credentials resolve with ENV → TOML priority.

use knimin_common::config::TomlConfig;
use knimin_common::{Error, Result};
use tracing::{info, warn};

pub const REDCAP_API_KEY_ENV: &str = "KNIMIN_REDCAP_API_KEY";
pub const GEOCODER_API_KEY_ENV: &str = "KNIMIN_GEOCODER_API_KEY";

/// Survey export service connection
#[derive(Debug, Clone, PartialEq)]
pub struct RedcapSettings {
    pub url: String,
    pub api_key: String,
}

/// Resolve the survey export service URL and API key
pub fn resolve_redcap(toml_config: &TomlConfig) -> Result<RedcapSettings> {
    let url = toml_config
        .redcap
        .url
        .clone()
        .filter(|u| is_valid_key(u))
        .ok_or_else(|| {
            Error::Config(
                "REDCap URL not configured. Set [redcap] url in ~/.config/knimin/config.toml"
                    .to_string(),
            )
        })?;

    let api_key = resolve_credential(
        "REDCap API key",
        REDCAP_API_KEY_ENV,
        toml_config.redcap.api_key.as_deref(),
        "[redcap] api_key",
    )?;

    Ok(RedcapSettings { url, api_key })
}

/// Resolve the geocoding service API key
pub fn resolve_geocoder_api_key(toml_config: &TomlConfig) -> Result<String> {
    resolve_credential(
        "Geocoder API key",
        GEOCODER_API_KEY_ENV,
        toml_config.geocoder.api_key.as_deref(),
        "[geocoder] api_key",
    )
}

/// Resolve one credential
///
/// **Priority:** ENV → TOML
fn resolve_credential(
    name: &str,
    env_var: &str,
    toml_value: Option<&str>,
    toml_key: &str,
) -> Result<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
            name
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", name);
        return Ok(value);
    }

    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", name);
        return Ok(value.to_string());
    }

    Err(Error::Config(format!(
        "{} not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: ~/.config/knimin/config.toml ({} = \"your-key\")",
        name, env_var, toml_key
    )))
}

/// Validate credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
