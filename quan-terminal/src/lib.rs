//! Quan Terminal - realtime synchronization client for the Quan trading bot dashboard.
//!
//! The library provides:
//! - Request gateway and typed backend endpoints
//! - Realtime price and balance feeds with fixed-delay reconnection
//! - Persisted authentication session
//! - Screen state machine tying feed lifecycles to the dashboard
//!
//! ```rust,no_run
//! use quan_terminal::{AppContext, ClientConfig, ScreenRouter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (context, mut feed_rx) = AppContext::connect(ClientConfig::from_env()?)?;
//!     let mut router = ScreenRouter::new(context);
//!     router.start().await;
//!
//!     while let Some(event) = feed_rx.recv().await {
//!         if let Some(update) = router.handle_feed_event(event) {
//!             println!("{update:?}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod logging;
pub mod router;
pub mod session;
pub mod shared;

// Re-export commonly used types for convenience
pub use api::BackendApi;
pub use config::ClientConfig;
pub use context::AppContext;
pub use error::{ConfigError, FeedError, GatewayError, RouterError, SessionError};
pub use feed::{
    ConnectionState, FeedConfig, FeedEvent, FeedKind, FeedParams, FeedUpdate, RealtimeFeedClient,
};
pub use gateway::RequestGateway;
pub use router::{Screen, ScreenRouter, StatusLevel, StatusMessage};
pub use session::{Session, SessionManager};
pub use shared::series::RollingSeries;
