//! Application context: the single owner of configuration, session, backend access and
//! realtime feeds.

use crate::{
    api::BackendApi,
    config::ClientConfig,
    error::GatewayError,
    feed::{FeedConnector, FeedEvent, RealtimeFeedClient, TungsteniteConnector},
    gateway::{HttpTransport, ReqwestTransport, RequestGateway},
    session::{FileSessionStore, SessionManager, SessionStore},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

pub struct AppContext {
    pub config: ClientConfig,
    pub session: SessionManager,
    pub api: BackendApi,
    pub feeds: RealtimeFeedClient,
}

impl AppContext {
    /// Assemble a context from explicit transports and storage.
    ///
    /// The returned receiver carries the feed events to pass back through
    /// [`RealtimeFeedClient::handle_event`].
    pub fn create(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        connector: Arc<dyn FeedConnector>,
        store: Box<dyn SessionStore>,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let session = SessionManager::new(store);
        let api = BackendApi::new(RequestGateway::new(transport, session.handle()));
        let (feeds, feed_rx) = RealtimeFeedClient::new(config.feed.clone(), connector);

        let context = Self {
            config,
            session,
            api,
            feeds,
        };
        (context, feed_rx)
    }

    /// Context talking to the configured backend over HTTP and WebSocket, with the
    /// session persisted at `config.session_path`.
    pub fn connect(
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<FeedEvent>), GatewayError> {
        let transport = ReqwestTransport::new(config.api_base.clone(), config.request_timeout)?;
        let store = FileSessionStore::new(config.session_path.clone());
        let connector = TungsteniteConnector::new(config.feed.ping_interval);

        info!(
            api_base = %config.api_base,
            ws_base = %config.feed.ws_base,
            session_path = %config.session_path.display(),
            "Creating application context"
        );

        Ok(Self::create(
            config,
            Arc::new(transport),
            Arc::new(connector),
            Box::new(store),
        ))
    }

    /// Close every feed. The session is left untouched so it survives a restart.
    pub fn teardown(&mut self) {
        info!("Tearing down application context");
        self.feeds.close_all();
    }
}
