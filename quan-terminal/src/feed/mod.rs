//! Realtime feeds: one live connection per [`FeedKind`].
//!
//! Connection I/O runs in spawned tasks which only report [`FeedEvent`]s back to the
//! owner. The owner applies them through
//! [`RealtimeFeedClient::handle_event`](client::RealtimeFeedClient::handle_event), which
//! is where every handle transition and every stale-generation check happens.

use crate::{
    error::FeedError,
    shared::projector::{BalanceView, TickView},
};
use derive_more::Display;
use url::Url;

pub mod client;
pub mod connector;
pub mod handle;
pub mod timeout;

pub use client::{FeedConfig, RealtimeFeedClient};
pub use connector::{FeedConnector, FrameStream, TungsteniteConnector};
pub use handle::{ConnectionState, FeedHandle};

/// Logical realtime stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FeedKind {
    #[display("price")]
    Price,
    #[display("balance")]
    Balance,
}

impl FeedKind {
    pub const ALL: [FeedKind; 2] = [FeedKind::Price, FeedKind::Balance];

    fn path(&self) -> &'static str {
        match self {
            FeedKind::Price => "ws/prices",
            FeedKind::Balance => "ws/balance",
        }
    }
}

/// Subscription parameters of a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedParams {
    /// Tracked symbol, for feeds scoped to one instrument
    pub symbol: Option<String>,
    /// Session token of the subscriber
    pub token: String,
}

impl FeedParams {
    pub fn price(symbol: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into().to_uppercase()),
            token: token.into(),
        }
    }

    pub fn balance(token: impl Into<String>) -> Self {
        Self {
            symbol: None,
            token: token.into(),
        }
    }
}

/// What a feed handle is connected to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTarget {
    pub kind: FeedKind,
    pub params: FeedParams,
}

impl FeedTarget {
    pub fn new(kind: FeedKind, params: FeedParams) -> Self {
        Self { kind, params }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.params.symbol.as_deref()
    }

    /// Streaming endpoint for this target under `ws_base`.
    pub fn url(&self, ws_base: &Url) -> Url {
        let mut url = ws_base.clone();
        let path = format!("{}/{}", ws_base.path().trim_end_matches('/'), self.kind.path());
        url.set_path(&path);
        url.set_query(None);

        {
            let mut query = url.query_pairs_mut();
            if let Some(symbol) = &self.params.symbol {
                query.append_pair("symbol", symbol);
            }
            query.append_pair("token", &self.params.token);
        }

        url
    }
}

/// Event reported by a feed task
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub kind: FeedKind,
    /// Generation of the handle whose task produced the event
    pub generation: u64,
    pub body: FeedEventBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEventBody {
    Connecting,
    Opened,
    Frame(String),
    Closed,
}

/// Outcome of applying a [`FeedEvent`] that the rendering layer should reflect
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Status {
        kind: FeedKind,
        state: ConnectionState,
    },
    Tick(TickView),
    Balance(BalanceView),
    Error {
        kind: FeedKind,
        error: FeedError,
    },
}
