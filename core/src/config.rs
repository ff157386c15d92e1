use std::collections::BTreeMap;
use std::io;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use activity_feed_api::ActivityQuery;
use activity_feed_api::provider::Provider;
use activity_feed_api::provider::RetryConfig;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Overrides the per-user home directory (`~/.activity-feed`).
pub const FEED_HOME_ENV_VAR: &str = "ACTIVITY_FEED_HOME";
/// Bearer token that wins over every on-disk source.
pub const FEED_TOKEN_ENV_VAR: &str = "ACTIVITY_FEED_TOKEN";
pub const CONFIG_TOML_FILE: &str = "config.toml";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_LIMIT: u32 = 50;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STREAM_MAX_RETRIES: u64 = 5;
/// Hard ceiling so a typo in config cannot retry forever.
const MAX_STREAM_MAX_RETRIES: u64 = 100;
const STREAM_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid override {0:?}: expected key=value")]
    Override(String),
}

/// Shape of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigToml {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub limit: Option<u32>,
    pub board_id: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub stream_max_retries: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

/// Values set by dedicated command-line flags. These beat `-c` overrides
/// and `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub board_id: Option<String>,
    pub limit: Option<u32>,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub feed_home: PathBuf,
    pub base_url: String,
    /// Token from `config.toml`; see [`crate::auth::TokenAuth`] for the full
    /// resolution order.
    pub token: Option<String>,
    pub limit: u32,
    pub board_id: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub stream_max_retries: u64,
    pub stream_idle_timeout: Option<Duration>,
    pub http_headers: HeaderMap,
}

impl Config {
    /// Load `config.toml` from `feed_home`, apply `-c` style overrides on top
    /// of the raw TOML, then the dedicated flag overrides.
    pub fn load(
        feed_home: PathBuf,
        cli_overrides: Vec<(String, toml::Value)>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut root = read_config_toml(&feed_home)?;
        for (path, value) in cli_overrides {
            apply_toml_override(&mut root, &path, value);
        }
        let cfg: ConfigToml = root.try_into().map_err(|source| ConfigError::Parse {
            path: feed_home.join(CONFIG_TOML_FILE),
            source,
        })?;
        Self::from_toml(cfg, overrides, feed_home)
    }

    pub fn from_toml(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        feed_home: PathBuf,
    ) -> Result<Self, ConfigError> {
        let ConfigOverrides {
            base_url,
            board_id,
            limit,
        } = overrides;

        let base_url = base_url
            .or(cfg.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        validate_base_url(&base_url)?;

        let limit = limit.or(cfg.limit).unwrap_or(DEFAULT_LIMIT);
        if limit == 0 {
            return Err(ConfigError::Invalid("limit must be at least 1".to_string()));
        }

        let stream_max_retries = cfg
            .stream_max_retries
            .unwrap_or(DEFAULT_STREAM_MAX_RETRIES)
            .min(MAX_STREAM_MAX_RETRIES);

        Ok(Self {
            feed_home,
            base_url,
            token: cfg.token.filter(|token| !token.trim().is_empty()),
            limit,
            board_id: board_id.or(cfg.board_id),
            request_timeout: positive_millis(
                "request_timeout_ms",
                cfg.request_timeout_ms,
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?,
            connect_timeout: positive_millis(
                "connect_timeout_ms",
                cfg.connect_timeout_ms,
                DEFAULT_CONNECT_TIMEOUT_MS,
            )?,
            stream_max_retries,
            stream_idle_timeout: cfg
                .stream_idle_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            http_headers: header_map(&cfg.http_headers)?,
        })
    }

    /// Query sent to both the list and the stream endpoint.
    pub fn query(&self) -> ActivityQuery {
        ActivityQuery {
            limit: Some(self.limit),
            board_id: self.board_id.clone(),
            since: None,
        }
    }

    pub fn provider(&self) -> Provider {
        Provider {
            name: "activity-feed".to_string(),
            base_url: self.base_url.clone(),
            query_params: None,
            headers: self.http_headers.clone(),
            request_timeout: Some(self.request_timeout),
            stream_retry: RetryConfig {
                max_attempts: self.stream_max_retries,
                base_delay: STREAM_RETRY_BASE_DELAY,
                retry_429: true,
                retry_5xx: true,
                retry_transport: true,
            },
            stream_idle_timeout: self.stream_idle_timeout,
        }
    }
}

/// `$ACTIVITY_FEED_HOME` if set, otherwise `~/.activity-feed`. The
/// directory is not required to exist.
pub fn find_feed_home() -> io::Result<PathBuf> {
    if let Ok(val) = std::env::var(FEED_HOME_ENV_VAR)
        && !val.is_empty()
    {
        return Ok(PathBuf::from(val));
    }

    let mut home = dirs::home_dir()
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "could not find home directory"))?;
    home.push(".activity-feed");
    Ok(home)
}

/// Parse one `-c key=value` flag. The value is parsed as TOML when possible
/// (`limit=20`, `http_headers={x="y"}`) and taken as a plain string
/// otherwise (`base_url=http://host`).
pub fn parse_override(raw: &str) -> Result<(String, toml::Value), ConfigError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(ConfigError::Override(raw.to_string()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::Override(raw.to_string()));
    }
    let value = value.trim();
    let parsed = parse_toml_value(value).unwrap_or_else(|| {
        toml::Value::String(value.trim_matches(|c| c == '"' || c == '\'').to_string())
    });
    Ok((key.to_string(), parsed))
}

fn parse_toml_value(raw: &str) -> Option<toml::Value> {
    let wrapped = format!("value = {raw}");
    let table: toml::Table = toml::from_str(&wrapped).ok()?;
    table.get("value").cloned()
}

/// Set `path` (dot separated) inside `root`, creating intermediate tables and
/// replacing non-table values on the way.
fn apply_toml_override(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_table() {
            *current = toml::Value::Table(toml::Table::new());
        }
        let toml::Value::Table(table) = current else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_string(), value);
            return;
        }
        current = table
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    }
}

fn read_config_toml(feed_home: &Path) -> Result<toml::Value, ConfigError> {
    let path = feed_home.join(CONFIG_TOML_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config.toml; using defaults");
            return Ok(toml::Value::Table(toml::Table::new()));
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    toml::from_str::<toml::Table>(&contents)
        .map(toml::Value::Table)
        .map_err(|source| ConfigError::Parse { path, source })
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(base_url)
        .map_err(|err| ConfigError::Invalid(format!("base_url {base_url:?}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid(format!(
            "base_url {base_url:?}: unsupported scheme {scheme:?}"
        ))),
    }
}

fn positive_millis(key: &str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::Invalid(format!("{key} must be at least 1"))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ConfigError::Invalid(format!("http_headers.{name}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| ConfigError::Invalid(format!("http_headers.{name}: {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
