use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PACKET_RELAY_ENDPOINT is required but not set")]
    EndpointMissing,

    #[error("PACKET_RELAY_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("PACKET_RELAY_APP_ID is required but not set")]
    AppIdMissing,

    #[error("PACKET_RELAY_KEY and PACKET_RELAY_SECRET must be set together")]
    PartialCredentials,

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),
}

/// Key pair for signing event-API requests. Optional: an unsigned relay
/// only works against endpoints that skip signature checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCredentials {
    pub key: String,
    pub secret: String,
}

#[derive(Debug)]
pub struct Config {
    pub endpoint: Url,
    pub app_id: String,
    pub credentials: Option<ApiCredentials>,
    pub listen_port: u16,
    pub flush_interval: Duration,
    pub publish_timeout: Duration,
    pub buffer_max_records: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("PACKET_RELAY_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let endpoint = parse_endpoint(vars)?;
        let app_id = parse_app_id(vars)?;
        let credentials = parse_credentials(vars)?;
        let listen_port = parse_port(vars, "PACKET_RELAY_LISTEN_PORT", 8080)?;
        let flush_interval = parse_duration_ms(vars, "PACKET_RELAY_FLUSH_INTERVAL_MS", 30_000)?;
        let publish_timeout = parse_duration_ms(vars, "PACKET_RELAY_PUBLISH_TIMEOUT_MS", 5000)?;
        let buffer_max_records = parse_buffer_max_records(vars, "PACKET_RELAY_BUFFER_MAX_RECORDS")?;

        Ok(Self {
            endpoint,
            app_id,
            credentials,
            listen_port,
            flush_interval,
            publish_timeout,
            buffer_max_records,
        })
    }
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("PACKET_RELAY_ENDPOINT")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::EndpointMissing)?;

    let url = Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone()))?;
    // `mailto:x` and bare `localhost:6001` parse as URLs, but leave nowhere
    // to put the /apps/{app_id}/events path.
    if url.cannot_be_a_base() {
        return Err(ConfigError::EndpointInvalidUrl(raw.clone()));
    }
    Ok(url)
}

fn parse_app_id(vars: &HashMap<String, String>) -> Result<String, ConfigError> {
    vars.get("PACKET_RELAY_APP_ID")
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or(ConfigError::AppIdMissing)
}

fn parse_credentials(vars: &HashMap<String, String>) -> Result<Option<ApiCredentials>, ConfigError> {
    let key = vars.get("PACKET_RELAY_KEY").filter(|s| !s.is_empty());
    let secret = vars.get("PACKET_RELAY_SECRET").filter(|s| !s.is_empty());

    match (key, secret) {
        (Some(key), Some(secret)) => Ok(Some(ApiCredentials {
            key: key.clone(),
            secret: secret.clone(),
        })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::PartialCredentials),
    }
}

fn parse_port(
    vars: &HashMap<String, String>,
    name: &str,
    default: u16,
) -> Result<u16, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            // A zero interval or timeout would mean flush-every-record or
            // never-complete requests.
            if ms == 0 {
                return Err(ConfigError::InvalidNumeric(name.to_owned(), val.clone()));
            }
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn parse_buffer_max_records(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<usize>, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let records: usize = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            if records == 0 {
                Ok(None)
            } else {
                Ok(Some(records))
            }
        }
        None => Ok(Some(10_000)),
    }
}
