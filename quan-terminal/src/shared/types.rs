/// Core data types exchanged with the Quan backend
///
/// Streaming payloads arrive on the price and balance feeds; the remaining types are
/// the JSON request/response bodies of the REST endpoints.
use crate::error::FeedError;
use serde::{Deserialize, Serialize};

/// Price tick from the price feed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceTick {
    /// Instrument symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Last traded price
    pub price: f64,
    /// Price change, signed
    pub change: f64,
    /// Traded volume
    pub volume: f64,
    /// Unix time of the tick in seconds
    #[serde(rename = "timestamp")]
    pub timestamp_seconds: f64,
}

/// Price feed message: either a tick or an error report
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PriceMessage {
    Error { error: String },
    Tick(PriceTick),
}

impl PriceMessage {
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        serde_json::from_str(text).map_err(|error| FeedError::Malformed(error.to_string()))
    }
}

/// Balance feed message
///
/// Exactly one of `balance` or `error` is present.
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceUpdate {
    Balance(f64),
    Error(String),
}

#[derive(Debug, Deserialize)]
struct RawBalanceUpdate {
    #[serde(default)]
    balance: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

impl BalanceUpdate {
    pub fn parse(text: &str) -> Result<Self, FeedError> {
        let raw = serde_json::from_str::<RawBalanceUpdate>(text)
            .map_err(|error| FeedError::Malformed(error.to_string()))?;

        match (raw.balance, raw.error) {
            (Some(balance), None) => Ok(Self::Balance(balance)),
            (None, Some(error)) => Ok(Self::Error(error)),
            (Some(_), Some(_)) => Err(FeedError::Malformed(
                "balance message carries both balance and error".to_string(),
            )),
            (None, None) => Err(FeedError::Malformed(
                "balance message carries neither balance nor error".to_string(),
            )),
        }
    }
}

/// Login or registration request body
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Successful login or registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AccountStatus {
    pub configured: bool,
}

/// Exchange API credentials stored server-side for the user
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
}

/// Persisted bot configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BotConfig {
    /// "static" (fixed symbol) or "dynamic" (bot picks the coin)
    pub bot_mode: String,
    /// Empty in dynamic mode
    #[serde(default)]
    pub symbol: String,
    pub lev: u32,
    pub percent: f64,
    pub tp: f64,
    pub sl: f64,
    #[serde(default)]
    pub roi_trigger: Option<f64>,
    #[serde(default = "default_bot_count")]
    pub bot_count: u32,
}

fn default_bot_count() -> u32 {
    1
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_mode: "static".to_string(),
            symbol: String::new(),
            lev: 10,
            percent: 5.0,
            tp: 50.0,
            sl: 0.0,
            roi_trigger: None,
            bot_count: default_bot_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotStatus {
    pub running: bool,
    pub bot_count: u32,
    #[serde(default)]
    pub active_symbols: Vec<String>,
    pub mode: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Position & bot summary text
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotInfo {
    pub bot_id: String,
    pub mode: String,
    pub active_coins: u32,
    pub max_coins: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct BotList {
    #[serde(default)]
    pub bots: Vec<BotInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopBot {
    pub bot_id: String,
}

/// Generic acknowledgement returned by command endpoints
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    /// An absent `ok` flag counts as success.
    pub fn is_ok(&self) -> bool {
        self.ok.unwrap_or(true)
    }
}
