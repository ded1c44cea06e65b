//! Typed calls to the backend REST endpoints.

use crate::{
    error::GatewayError,
    gateway::{CallOptions, RequestGateway},
    shared::types::{
        AccountStatus, Ack, ApiKeys, AuthResponse, BotConfig, BotList, BotStatus, Credentials,
        StopBot, Summary,
    },
};

#[derive(Clone)]
pub struct BackendApi {
    gateway: RequestGateway,
}

impl BackendApi {
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<AuthResponse, GatewayError> {
        let options = CallOptions::post().with_body(credentials)?.unauthenticated();
        self.gateway.call("/api/register", options).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, GatewayError> {
        let options = CallOptions::post().with_body(credentials)?.unauthenticated();
        self.gateway.call("/api/login", options).await
    }

    pub async fn account_status(&self) -> Result<AccountStatus, GatewayError> {
        self.gateway
            .call("/api/account-status", CallOptions::get())
            .await
    }

    pub async fn setup_account(&self, keys: &ApiKeys) -> Result<Ack, GatewayError> {
        let options = CallOptions::post().with_body(keys)?;
        self.gateway.call("/api/setup-account", options).await
    }

    pub async fn bot_config(&self) -> Result<BotConfig, GatewayError> {
        self.gateway.call("/api/bot-config", CallOptions::get()).await
    }

    pub async fn save_bot_config(&self, config: &BotConfig) -> Result<Ack, GatewayError> {
        let options = CallOptions::post().with_body(config)?;
        self.gateway.call("/api/bot-config", options).await
    }

    pub async fn bot_start(&self) -> Result<Ack, GatewayError> {
        self.gateway.call("/api/bot-start", CallOptions::post()).await
    }

    pub async fn bot_stop(&self) -> Result<Ack, GatewayError> {
        self.gateway.call("/api/bot-stop", CallOptions::post()).await
    }

    pub async fn bot_status(&self) -> Result<BotStatus, GatewayError> {
        self.gateway.call("/api/bot-status", CallOptions::get()).await
    }

    pub async fn summary(&self) -> Result<Summary, GatewayError> {
        self.gateway.call("/api/summary", CallOptions::get()).await
    }

    pub async fn bots(&self) -> Result<BotList, GatewayError> {
        self.gateway.call("/api/bots", CallOptions::get()).await
    }

    pub async fn add_bot(&self, config: &BotConfig) -> Result<Ack, GatewayError> {
        let options = CallOptions::post().with_body(config)?;
        self.gateway.call("/api/add-bot", options).await
    }

    pub async fn stop_bot(&self, bot_id: &str) -> Result<Ack, GatewayError> {
        let options = CallOptions::post().with_body(&StopBot {
            bot_id: bot_id.to_string(),
        })?;
        self.gateway.call("/api/stop-bot", options).await
    }

    pub async fn stop_all_bots(&self) -> Result<Ack, GatewayError> {
        self.gateway
            .call("/api/stop-all-bots", CallOptions::post())
            .await
    }

    pub async fn stop_all_coins(&self) -> Result<Ack, GatewayError> {
        self.gateway
            .call("/api/stop-all-coins", CallOptions::post())
            .await
    }
}
