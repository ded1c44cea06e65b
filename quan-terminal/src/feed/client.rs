/// Realtime feed client owning one handle, one rolling series and one error sink per
/// feed kind
use super::{
    ConnectionState, FeedEvent, FeedEventBody, FeedHandle, FeedKind, FeedParams, FeedTarget,
    FeedUpdate,
    connector::{DEFAULT_PING_INTERVAL, FeedConnector, LoopTiming, run_feed_loop},
    timeout::DEFAULT_READ_TIMEOUT,
};
use crate::{
    error::FeedError,
    shared::{
        projector::{project_balance, project_tick},
        series::RollingSeries,
        types::{BalanceUpdate, PriceMessage},
    },
};
use chrono::Local;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// Feed client configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Base URL of the streaming endpoints
    pub ws_base: Url,
    /// Delay before reconnecting after a connection ends
    pub reconnect_delay: Duration,
    /// A connection silent for this long is treated as lost
    pub read_timeout: Duration,
    /// Ping interval to keep connections alive
    pub ping_interval: Duration,
    /// Maximum channel buffer size for feed events
    pub channel_buffer_size: usize,
    /// Rolling series capacity of the price feed
    pub price_capacity: usize,
    /// Rolling series capacity of the balance feed
    pub balance_capacity: usize,
}

impl FeedConfig {
    pub fn new(ws_base: Url) -> Self {
        Self {
            ws_base,
            reconnect_delay: Duration::from_millis(2000),
            read_timeout: DEFAULT_READ_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            channel_buffer_size: 1000,
            price_capacity: 60,
            balance_capacity: 50,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size.max(1);
        self
    }

    pub fn with_capacity(mut self, kind: FeedKind, capacity: usize) -> Self {
        match kind {
            FeedKind::Price => self.price_capacity = capacity,
            FeedKind::Balance => self.balance_capacity = capacity,
        }
        self
    }

    pub fn capacity(&self, kind: FeedKind) -> usize {
        match kind {
            FeedKind::Price => self.price_capacity,
            FeedKind::Balance => self.balance_capacity,
        }
    }
}

/// Owns at most one live handle per [`FeedKind`].
///
/// Every handle gets a fresh generation. Events carrying any other generation than the
/// current handle's are discarded, so nothing from a superseded or closed connection
/// reaches a series.
pub struct RealtimeFeedClient {
    config: FeedConfig,
    connector: Arc<dyn FeedConnector>,
    handles: HashMap<FeedKind, FeedHandle>,
    series: HashMap<FeedKind, RollingSeries>,
    errors: HashMap<FeedKind, FeedError>,
    next_generation: u64,
    event_tx: mpsc::Sender<FeedEvent>,
}

impl RealtimeFeedClient {
    /// Create a new client. The returned receiver yields the events of every handle the
    /// client opens; pass each one back to [`handle_event`](Self::handle_event).
    pub fn new(
        config: FeedConfig,
        connector: Arc<dyn FeedConnector>,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer_size.max(1));
        let series = FeedKind::ALL
            .into_iter()
            .map(|kind| (kind, RollingSeries::new(config.capacity(kind))))
            .collect();

        let client = Self {
            config,
            connector,
            handles: HashMap::new(),
            series,
            errors: HashMap::new(),
            next_generation: 1,
            event_tx,
        };

        (client, event_rx)
    }

    /// Open `kind` against `params`, closing any existing handle for it first.
    ///
    /// Returns immediately; the connection is established by a spawned task.
    pub fn open(&mut self, kind: FeedKind, params: FeedParams) {
        self.close(kind);

        let target = FeedTarget::new(kind, params);
        let generation = self.next_generation;
        self.next_generation += 1;

        let url = target.url(&self.config.ws_base);
        let timing = LoopTiming {
            reconnect_delay: self.config.reconnect_delay,
            read_timeout: self.config.read_timeout,
        };
        let task = tokio::spawn(run_feed_loop(
            Arc::clone(&self.connector),
            kind,
            generation,
            url,
            timing,
            self.event_tx.clone(),
        ));

        info!(%kind, generation, symbol = ?target.symbol(), "Opened feed");
        self.handles
            .insert(kind, FeedHandle::new(target, generation, Some(task)));
    }

    /// Replace the subscription of `kind`, clearing its series before any point of the
    /// new target can be appended.
    pub fn retarget(&mut self, kind: FeedKind, params: FeedParams) {
        self.close(kind);
        if let Some(series) = self.series.get_mut(&kind) {
            series.clear();
        }
        self.errors.remove(&kind);
        self.open(kind, params);
    }

    /// Close `kind`, cancelling any pending reconnect. No-op when nothing is open.
    pub fn close(&mut self, kind: FeedKind) {
        if let Some(mut handle) = self.handles.remove(&kind) {
            handle.close();
            info!(%kind, generation = handle.generation(), "Closed feed");
        }
    }

    pub fn close_all(&mut self) {
        for kind in FeedKind::ALL {
            self.close(kind);
        }
    }

    /// Apply an event reported by a feed task.
    pub fn handle_event(&mut self, event: FeedEvent) -> Option<FeedUpdate> {
        let FeedEvent {
            kind,
            generation,
            body,
        } = event;

        let Some(handle) = self.handles.get_mut(&kind) else {
            debug!(%kind, generation, "Dropping event for closed feed");
            return None;
        };
        if handle.generation() != generation {
            debug!(
                %kind,
                generation,
                current = handle.generation(),
                "Dropping event from superseded feed handle"
            );
            return None;
        }

        match body {
            FeedEventBody::Connecting => handle.on_connecting().then(|| FeedUpdate::Status {
                kind,
                state: handle.state(),
            }),
            FeedEventBody::Opened => handle.on_open().then(|| FeedUpdate::Status {
                kind,
                state: handle.state(),
            }),
            FeedEventBody::Closed => {
                let changed = handle.on_close();
                if changed {
                    warn!(%kind, generation, "Feed disconnected, reconnecting...");
                }
                changed.then(|| FeedUpdate::Status {
                    kind,
                    state: handle.state(),
                })
            }
            FeedEventBody::Frame(text) => Some(self.apply_frame(kind, &text)),
        }
    }

    fn apply_frame(&mut self, kind: FeedKind, text: &str) -> FeedUpdate {
        let result = match kind {
            FeedKind::Price => self.apply_price_frame(text),
            FeedKind::Balance => self.apply_balance_frame(text),
        };

        match result {
            Ok(update) => {
                self.errors.remove(&kind);
                update
            }
            Err(error) => {
                if let FeedError::Malformed(_) = error {
                    warn!(%kind, %error, "Dropping malformed feed payload");
                    debug!("Raw payload: {}", text.chars().take(200).collect::<String>());
                }
                self.errors.insert(kind, error.clone());
                FeedUpdate::Error { kind, error }
            }
        }
    }

    fn apply_price_frame(&mut self, text: &str) -> Result<FeedUpdate, FeedError> {
        match PriceMessage::parse(text)? {
            PriceMessage::Error { error } => Err(FeedError::Remote(error)),
            PriceMessage::Tick(tick) => {
                let series = self.series_mut(FeedKind::Price);
                Ok(FeedUpdate::Tick(project_tick(&tick, series)))
            }
        }
    }

    fn apply_balance_frame(&mut self, text: &str) -> Result<FeedUpdate, FeedError> {
        let update = BalanceUpdate::parse(text)?;
        let series = self.series_mut(FeedKind::Balance);
        project_balance(&update, series, Local::now())
            .map(FeedUpdate::Balance)
            .map_err(FeedError::Remote)
    }

    fn series_mut(&mut self, kind: FeedKind) -> &mut RollingSeries {
        let capacity = self.config.capacity(kind);
        self.series
            .entry(kind)
            .or_insert_with(|| RollingSeries::new(capacity))
    }

    /// Connection state for the status indicator
    pub fn state(&self, kind: FeedKind) -> ConnectionState {
        self.handles
            .get(&kind)
            .map(FeedHandle::state)
            .unwrap_or(ConnectionState::Idle)
    }

    pub fn target(&self, kind: FeedKind) -> Option<&FeedTarget> {
        self.handles.get(&kind).map(FeedHandle::target)
    }

    /// Generation of the current handle of `kind`
    pub fn generation(&self, kind: FeedKind) -> Option<u64> {
        self.handles.get(&kind).map(FeedHandle::generation)
    }

    pub fn series(&self, kind: FeedKind) -> Option<&RollingSeries> {
        self.series.get(&kind)
    }

    /// Last error reported by `kind` since its last good message
    pub fn last_error(&self, kind: FeedKind) -> Option<&FeedError> {
        self.errors.get(&kind)
    }

    pub fn is_open(&self, kind: FeedKind) -> bool {
        self.handles.contains_key(&kind)
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

impl Drop for RealtimeFeedClient {
    fn drop(&mut self) {
        self.close_all();
    }
}
