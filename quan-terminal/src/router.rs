//! Screen state machine.
//!
//! The router owns the [`AppContext`]. Entering a screen runs its entry actions:
//! the dashboard opens the price and balance feeds and loads the summary, the config
//! screen loads the persisted bot configuration. Leaving the dashboard closes its feeds.
//! Every backend failure is settled here: a rejected credential logs the user out with
//! [`SESSION_EXPIRED_MESSAGE`], anything else becomes the screen's status line.

use crate::{
    context::AppContext,
    error::{GatewayError, RouterError},
    feed::{FeedEvent, FeedKind, FeedParams, FeedUpdate},
    session::Session,
    shared::{
        projector::{BalanceView, TickView},
        types::{Ack, ApiKeys, BotConfig, BotInfo, BotStatus, Credentials},
    },
};
use derive_more::Display;
use std::collections::VecDeque;
use tracing::{info, warn};

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again.";

/// Rows kept in the recent ticks table
pub const RECENT_TICKS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Screen {
    Auth,
    SetupAccount,
    Dashboard,
    Config,
    ApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Ok,
    Error,
}

/// Inline status line of the active screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Ok,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }
}

/// Everything the dashboard screen displays
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub summary: String,
    pub bots: Vec<BotInfo>,
    pub bot_status: Option<BotStatus>,
    pub last_tick: Option<TickView>,
    /// Newest first
    pub recent_ticks: VecDeque<TickView>,
    pub balance: Option<BalanceView>,
    pub price_error: Option<String>,
    pub balance_error: Option<String>,
}

impl DashboardData {
    fn clear_ticks(&mut self) {
        self.last_tick = None;
        self.recent_ticks.clear();
        self.price_error = None;
    }
}

#[derive(Debug, Clone, Copy)]
enum AuthAction {
    Login,
    Register,
}

impl AuthAction {
    fn label(&self) -> &'static str {
        match self {
            AuthAction::Login => "Login",
            AuthAction::Register => "Registration",
        }
    }
}

pub struct ScreenRouter {
    ctx: AppContext,
    screen: Screen,
    configured: bool,
    symbol: String,
    status: Option<StatusMessage>,
    dashboard: DashboardData,
    bot_config: Option<BotConfig>,
}

impl ScreenRouter {
    pub fn new(ctx: AppContext) -> Self {
        let symbol = ctx.config.default_symbol.clone();
        Self {
            ctx,
            screen: Screen::Auth,
            configured: false,
            symbol,
            status: None,
            dashboard: DashboardData::default(),
            bot_config: None,
        }
    }

    /// Restore the persisted session and pick the first screen.
    pub async fn start(&mut self) {
        match self.ctx.session.restore() {
            Some(_) => self.after_login().await,
            None => self.enter(Screen::Auth).await,
        }
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), RouterError> {
        self.require("login", &[Screen::Auth])?;
        self.authenticate(AuthAction::Login, username, password).await;
        Ok(())
    }

    pub async fn register(&mut self, username: &str, password: &str) -> Result<(), RouterError> {
        self.require("register", &[Screen::Auth])?;
        self.authenticate(AuthAction::Register, username, password).await;
        Ok(())
    }

    async fn authenticate(&mut self, action: AuthAction, username: &str, password: &str) {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            self.status = Some(StatusMessage::error("Username and password are required."));
            return;
        }

        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let result = match action {
            AuthAction::Login => self.ctx.api.login(&credentials).await,
            AuthAction::Register => self.ctx.api.register(&credentials).await,
        };

        match result {
            Ok(auth) => {
                let session = Session {
                    token: auth.token,
                    username: auth.username,
                };
                if let Err(error) = self.ctx.session.establish(session) {
                    warn!(%error, "Session could not be persisted");
                }
                self.after_login().await;
            }
            Err(error) => {
                self.status = Some(StatusMessage::error(format!(
                    "{} failed: {error}",
                    action.label()
                )));
            }
        }
    }

    /// Route an authenticated user by account configuration status. Any failure here
    /// means the stored credential cannot be trusted.
    async fn after_login(&mut self) {
        match self.ctx.api.account_status().await {
            Ok(status) => {
                self.configured = status.configured;
                self.status = None;
                let next = if status.configured {
                    Screen::Dashboard
                } else {
                    Screen::SetupAccount
                };
                self.enter(next).await;
            }
            Err(error) => {
                warn!(%error, "Account status check failed");
                self.expire_session();
            }
        }
    }

    pub async fn setup_account(
        &mut self,
        api_key: &str,
        api_secret: &str,
    ) -> Result<(), RouterError> {
        self.require("setup account", &[Screen::SetupAccount, Screen::ApiKey])?;

        let (api_key, api_secret) = (api_key.trim(), api_secret.trim());
        if api_key.is_empty() || api_secret.is_empty() {
            self.status = Some(StatusMessage::error("API key and secret are required."));
            return Ok(());
        }

        let keys = ApiKeys {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        };
        let result = self.ctx.api.setup_account(&keys).await;
        if self.settle_ack(result, "Saving API keys failed") {
            self.configured = true;
            self.status = Some(StatusMessage::ok("API keys saved."));
            self.enter(Screen::Dashboard).await;
        }
        Ok(())
    }

    /// Move to `screen`. Entering the current screen again re-runs its entry actions.
    pub async fn navigate(&mut self, screen: Screen) -> Result<(), RouterError> {
        if !self.ctx.session.handle().is_authenticated() {
            return Err(RouterError::NotAuthenticated);
        }
        match screen {
            Screen::Auth => {
                return Err(RouterError::InvalidAction {
                    action: "navigate to auth",
                    screen: self.screen,
                });
            }
            Screen::Dashboard if !self.configured => {
                return Err(RouterError::AccountNotConfigured);
            }
            _ => {}
        }

        self.status = None;
        self.enter(screen).await;
        Ok(())
    }

    /// Switch the tracked symbol; the price feed is retargeted and its series cleared.
    pub fn change_symbol(&mut self, symbol: &str) -> Result<(), RouterError> {
        self.require("change symbol", &[Screen::Dashboard])?;
        let token = self
            .ctx
            .session
            .handle()
            .token()
            .ok_or(RouterError::NotAuthenticated)?;

        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            self.status = Some(StatusMessage::error("Symbol is required."));
            return Ok(());
        }

        info!(from = %self.symbol, to = %symbol, "Changing symbol");
        self.symbol = symbol;
        self.dashboard.clear_ticks();
        self.ctx
            .feeds
            .retarget(FeedKind::Price, FeedParams::price(&self.symbol, token));
        Ok(())
    }

    /// Close all feeds, clear the session and return to the auth screen.
    pub fn logout(&mut self) {
        info!("Logging out");
        self.reset_to_auth();
        self.status = None;
    }

    fn expire_session(&mut self) {
        self.reset_to_auth();
        self.status = Some(StatusMessage::error(SESSION_EXPIRED_MESSAGE));
    }

    /// Drop all session state and move to Auth directly; Auth has no entry actions.
    fn reset_to_auth(&mut self) {
        self.ctx.feeds.close_all();
        self.ctx.session.clear();
        self.configured = false;
        self.dashboard = DashboardData::default();
        self.bot_config = None;

        if self.screen != Screen::Auth {
            info!(from = %self.screen, to = %Screen::Auth, "Screen transition");
            self.screen = Screen::Auth;
        }
    }

    async fn enter(&mut self, next: Screen) {
        let previous = self.screen;
        if previous == Screen::Dashboard {
            self.ctx.feeds.close_all();
        }

        self.screen = next;
        info!(from = %previous, to = %next, "Screen transition");

        match next {
            Screen::Dashboard => {
                self.activate_dashboard_feeds();
                self.load_dashboard().await;
            }
            Screen::Config => self.load_bot_config().await,
            Screen::Auth | Screen::SetupAccount | Screen::ApiKey => {}
        }
    }

    fn activate_dashboard_feeds(&mut self) {
        let Some(token) = self.ctx.session.handle().token() else {
            warn!("Dashboard entered without a session");
            return;
        };

        // Fresh chart on every entry
        self.dashboard.clear_ticks();
        self.ctx.feeds.retarget(
            FeedKind::Price,
            FeedParams::price(&self.symbol, token.clone()),
        );
        self.ctx
            .feeds
            .open(FeedKind::Balance, FeedParams::balance(token));
    }

    async fn load_dashboard(&mut self) {
        let summary = match self.ctx.api.summary().await {
            Ok(summary) => summary.summary,
            Err(error) if error.is_session_expired() => {
                self.expire_session();
                return;
            }
            Err(error) => format!("Loading summary failed: {error}"),
        };
        self.dashboard.summary = summary;

        let bots = self.ctx.api.bots().await;
        match bots {
            Ok(list) => self.dashboard.bots = list.bots,
            Err(error) if error.is_session_expired() => self.expire_session(),
            Err(error) => {
                if self.status.is_none() {
                    self.status = Some(StatusMessage::error(format!(
                        "Loading bots failed: {error}"
                    )));
                }
            }
        }
    }

    async fn load_bot_config(&mut self) {
        let result = self.ctx.api.bot_config().await;
        if let Some(config) = self.settle(result, "Loading bot configuration failed") {
            self.bot_config = Some(config);
        }
    }

    /// Reload summary and bot list.
    pub async fn refresh_dashboard(&mut self) -> Result<(), RouterError> {
        self.require("refresh", &[Screen::Dashboard])?;
        self.status = None;
        self.load_dashboard().await;
        Ok(())
    }

    pub async fn add_bot(&mut self, config: &BotConfig) -> Result<(), RouterError> {
        self.require("add bot", &[Screen::Dashboard])?;
        let result = self.ctx.api.add_bot(config).await;
        self.finish_dashboard_command(
            result,
            "Bot added and configuration saved.",
            "Adding bot failed",
        )
        .await;
        Ok(())
    }

    pub async fn stop_bot(&mut self, bot_id: &str) -> Result<(), RouterError> {
        self.require("stop bot", &[Screen::Dashboard])?;
        let result = self.ctx.api.stop_bot(bot_id).await;
        self.finish_dashboard_command(
            result,
            &format!("Bot {bot_id} stopped."),
            "Stopping bot failed",
        )
        .await;
        Ok(())
    }

    pub async fn stop_all_bots(&mut self) -> Result<(), RouterError> {
        self.require("stop all bots", &[Screen::Dashboard])?;
        let result = self.ctx.api.stop_all_bots().await;
        self.finish_dashboard_command(result, "All bots stopped.", "Stopping all bots failed")
            .await;
        Ok(())
    }

    pub async fn stop_all_coins(&mut self) -> Result<(), RouterError> {
        self.require("stop all coins", &[Screen::Dashboard])?;
        let result = self.ctx.api.stop_all_coins().await;
        self.finish_dashboard_command(result, "All coins stopped.", "Stopping all coins failed")
            .await;
        Ok(())
    }

    pub async fn start_bots(&mut self) -> Result<(), RouterError> {
        self.require("start bots", &[Screen::Dashboard, Screen::Config])?;
        let result = self.ctx.api.bot_start().await;
        if self.settle_ack(result, "Starting bots failed") {
            self.status = Some(StatusMessage::ok("Bots started."));
            self.refresh_bot_status_inner().await;
        }
        Ok(())
    }

    pub async fn stop_bots(&mut self) -> Result<(), RouterError> {
        self.require("stop bots", &[Screen::Dashboard, Screen::Config])?;
        let result = self.ctx.api.bot_stop().await;
        if self.settle_ack(result, "Stopping bots failed") {
            self.status = Some(StatusMessage::ok("Bots stopped."));
            self.refresh_bot_status_inner().await;
        }
        Ok(())
    }

    pub async fn refresh_bot_status(&mut self) -> Result<(), RouterError> {
        self.require("bot status", &[Screen::Dashboard, Screen::Config])?;
        self.refresh_bot_status_inner().await;
        Ok(())
    }

    async fn refresh_bot_status_inner(&mut self) {
        let result = self.ctx.api.bot_status().await;
        if let Some(status) = self.settle(result, "Loading bot status failed") {
            self.dashboard.bot_status = Some(status);
        }
    }

    pub async fn save_bot_config(&mut self, config: BotConfig) -> Result<(), RouterError> {
        self.require("save bot config", &[Screen::Config])?;
        let result = self.ctx.api.save_bot_config(&config).await;
        if self.settle_ack(result, "Saving bot configuration failed") {
            self.bot_config = Some(config);
            self.status = Some(StatusMessage::ok("Bot configuration saved."));
        }
        Ok(())
    }

    async fn finish_dashboard_command(
        &mut self,
        result: Result<Ack, GatewayError>,
        success: &str,
        failure: &str,
    ) {
        if self.settle_ack(result, failure) {
            self.status = Some(StatusMessage::ok(success));
            self.load_dashboard().await;
        }
    }

    /// Resolve a backend result: expire the session on a rejected credential, otherwise
    /// turn the error into the status line.
    fn settle<T>(&mut self, result: Result<T, GatewayError>, failure: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) if error.is_session_expired() => {
                warn!(%error, "Credential rejected, expiring session");
                self.expire_session();
                None
            }
            Err(error) => {
                self.status = Some(StatusMessage::error(format!("{failure}: {error}")));
                None
            }
        }
    }

    /// Like [`Self::settle`], additionally treating an `ok: false` acknowledgement as a
    /// failure.
    fn settle_ack(&mut self, result: Result<Ack, GatewayError>, failure: &str) -> bool {
        let Some(ack) = self.settle(result, failure) else {
            return false;
        };
        if ack.is_ok() {
            return true;
        }

        let reason = ack.message.unwrap_or_else(|| "request rejected".to_string());
        self.status = Some(StatusMessage::error(format!("{failure}: {reason}")));
        false
    }

    /// Apply a feed event and fold its outcome into the dashboard.
    pub fn handle_feed_event(&mut self, event: FeedEvent) -> Option<FeedUpdate> {
        let update = self.ctx.feeds.handle_event(event)?;

        match &update {
            FeedUpdate::Tick(view) => {
                self.dashboard.price_error = None;
                self.dashboard.recent_ticks.push_front(view.clone());
                self.dashboard.recent_ticks.truncate(RECENT_TICKS);
                self.dashboard.last_tick = Some(view.clone());
            }
            FeedUpdate::Balance(view) => {
                self.dashboard.balance_error = None;
                self.dashboard.balance = Some(view.clone());
            }
            FeedUpdate::Error { kind, error } => {
                let text = error.to_string();
                match kind {
                    FeedKind::Price => self.dashboard.price_error = Some(text),
                    FeedKind::Balance => self.dashboard.balance_error = Some(text),
                }
            }
            FeedUpdate::Status { .. } => {}
        }

        Some(update)
    }

    fn require(&self, action: &'static str, screens: &[Screen]) -> Result<(), RouterError> {
        if screens.contains(&self.screen) {
            Ok(())
        } else {
            Err(RouterError::InvalidAction {
                action,
                screen: self.screen,
            })
        }
    }

    /// Close feeds before the router goes away.
    pub fn teardown(&mut self) {
        self.ctx.teardown();
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn dashboard(&self) -> &DashboardData {
        &self.dashboard
    }

    pub fn bot_config(&self) -> Option<&BotConfig> {
        self.bot_config.as_ref()
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }
}
