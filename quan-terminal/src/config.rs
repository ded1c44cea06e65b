//! Client configuration, read from `QUAN_*` environment variables.

use crate::{error::ConfigError, feed::FeedConfig};
use std::{path::PathBuf, str::FromStr, time::Duration};
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SESSION_PATH: &str = ".quan-terminal/session.json";
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API
    pub api_base: Url,
    /// Timeout of one REST exchange
    pub request_timeout: Duration,
    /// Location of the persisted session
    pub session_path: PathBuf,
    /// Symbol tracked when the dashboard first opens
    pub default_symbol: String,
    pub feed: FeedConfig,
}

impl ClientConfig {
    /// Configuration pointing at `api_base`, with streaming endpoints on the same host.
    pub fn new(api_base: Url) -> Result<Self, ConfigError> {
        let ws_base = derive_ws_base(&api_base)?;
        Ok(Self {
            api_base,
            request_timeout: Duration::from_secs(15),
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
            default_symbol: DEFAULT_SYMBOL.to_string(),
            feed: FeedConfig::new(ws_base),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; unset or blank variables take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_base = parse_url(
            "QUAN_API_BASE",
            &var("QUAN_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        )?;
        let mut config = Self::new(api_base)?;

        if let Some(ws_base) = var("QUAN_WS_BASE") {
            config.feed.ws_base = parse_url("QUAN_WS_BASE", &ws_base)?;
        }
        if let Some(path) = var("QUAN_SESSION_PATH") {
            config.session_path = PathBuf::from(path);
        }
        if let Some(symbol) = var("QUAN_SYMBOL") {
            config.default_symbol = symbol.trim().to_uppercase();
        }
        let reconnect_delay_ms = var("QUAN_RECONNECT_DELAY_MS");
        if let Some(ms) = parse_var::<u64>("QUAN_RECONNECT_DELAY_MS", reconnect_delay_ms)? {
            config.feed.reconnect_delay = Duration::from_millis(ms);
        }
        let read_timeout_secs = var("QUAN_READ_TIMEOUT_SECS");
        if let Some(secs) = parse_var::<u64>("QUAN_READ_TIMEOUT_SECS", read_timeout_secs)? {
            config.feed.read_timeout = Duration::from_secs(secs.max(1));
        }
        let ping_interval_secs = var("QUAN_PING_INTERVAL_SECS");
        if let Some(secs) = parse_var::<u64>("QUAN_PING_INTERVAL_SECS", ping_interval_secs)? {
            config.feed.ping_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(size) = parse_var::<usize>("QUAN_CHANNEL_BUFFER", var("QUAN_CHANNEL_BUFFER"))? {
            config.feed.channel_buffer_size = size.max(1);
        }
        if let Some(capacity) =
            parse_var::<usize>("QUAN_PRICE_CAPACITY", var("QUAN_PRICE_CAPACITY"))?
        {
            config.feed.price_capacity = capacity;
        }
        if let Some(capacity) =
            parse_var::<usize>("QUAN_BALANCE_CAPACITY", var("QUAN_BALANCE_CAPACITY"))?
        {
            config.feed.balance_capacity = capacity;
        }

        Ok(config)
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    pub fn with_default_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.default_symbol = symbol.into().to_uppercase();
        self
    }

    pub fn with_feed(mut self, feed: FeedConfig) -> Self {
        self.feed = feed;
        self
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn parse_var<T: FromStr>(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                name,
                value: value.clone(),
            })
        })
        .transpose()
}

/// Streaming base for an API base: `http -> ws`, `https -> wss`.
fn derive_ws_base(api_base: &Url) -> Result<Url, ConfigError> {
    let scheme = match api_base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConfigError::UnsupportedScheme {
                name: "QUAN_API_BASE",
                scheme: other.to_string(),
            });
        }
    };

    let mut ws_base = api_base.clone();
    ws_base
        .set_scheme(scheme)
        .map_err(|()| ConfigError::UnsupportedScheme {
            name: "QUAN_API_BASE",
            scheme: api_base.scheme().to_string(),
        })?;
    Ok(ws_base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.api_base.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.feed.ws_base.as_str(), "ws://127.0.0.1:8000/");
        assert_eq!(config.session_path, PathBuf::from(DEFAULT_SESSION_PATH));
        assert_eq!(config.default_symbol, "BTCUSDT");
        assert_eq!(config.feed.reconnect_delay, Duration::from_millis(2000));
        assert_eq!(config.feed.read_timeout, Duration::from_secs(120));
        assert_eq!(config.feed.ping_interval, Duration::from_secs(30));
        assert_eq!(config.feed.channel_buffer_size, 1000);
        assert_eq!(config.feed.price_capacity, 60);
        assert_eq!(config.feed.balance_capacity, 50);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("QUAN_API_BASE", "https://quan.example"),
            ("QUAN_SYMBOL", "ethusdt"),
            ("QUAN_RECONNECT_DELAY_MS", "500"),
            ("QUAN_PRICE_CAPACITY", "30"),
            ("QUAN_PING_INTERVAL_SECS", "10"),
            ("QUAN_SESSION_PATH", "/tmp/s.json"),
            ("QUAN_CHANNEL_BUFFER", ""),
        ]))
        .unwrap();

        assert_eq!(config.feed.ws_base.as_str(), "wss://quan.example/");
        assert_eq!(config.default_symbol, "ETHUSDT");
        assert_eq!(config.feed.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.feed.price_capacity, 30);
        assert_eq!(config.feed.ping_interval, Duration::from_secs(10));
        assert_eq!(config.session_path, PathBuf::from("/tmp/s.json"));
        assert_eq!(config.feed.channel_buffer_size, 1000);
    }

    #[test]
    fn test_config_builder() {
        let feed = FeedConfig::new(Url::parse("wss://stream.example").unwrap())
            .with_reconnect_delay(Duration::from_secs(1));
        let config = ClientConfig::new(Url::parse("https://quan.example").unwrap())
            .unwrap()
            .with_session_path("/var/lib/quan/session.json")
            .with_default_symbol("solusdt")
            .with_feed(feed);

        assert_eq!(
            config.session_path,
            PathBuf::from("/var/lib/quan/session.json")
        );
        assert_eq!(config.default_symbol, "SOLUSDT");
        assert_eq!(config.feed.ws_base.as_str(), "wss://stream.example/");
        assert_eq!(config.feed.reconnect_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_explicit_ws_base_wins() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("QUAN_API_BASE", "http://api.local:8000"),
            ("QUAN_WS_BASE", "ws://stream.local:9001"),
        ]))
        .unwrap();

        assert_eq!(config.feed.ws_base.as_str(), "ws://stream.local:9001/");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("QUAN_API_BASE", "not a url")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("QUAN_API_BASE", "ftp://host")])),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("QUAN_RECONNECT_DELAY_MS", "soon")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
