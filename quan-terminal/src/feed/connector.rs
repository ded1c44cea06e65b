//! Feed transport: WebSocket connector and the per-handle connection loop.

use super::{FeedEvent, FeedEventBody, FeedKind, timeout::ReadDeadline};
use crate::error::FeedError;
use async_trait::async_trait;
use futures::{Sink, SinkExt, StreamExt, future, stream, stream::BoxStream};
use std::{fmt::Display, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

/// Default interval between keepalive pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Text frames of one live connection. The stream ends when the connection closes.
pub type FrameStream = BoxStream<'static, Result<String, FeedError>>;

/// Opens feed connections.
#[async_trait]
pub trait FeedConnector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<FrameStream, FeedError>;
}

/// [`FeedConnector`] over `tokio-tungstenite`, pinging the server every
/// `ping_interval` while the connection is read.
#[derive(Debug, Clone, Copy)]
pub struct TungsteniteConnector {
    ping_interval: Duration,
}

impl TungsteniteConnector {
    pub fn new(ping_interval: Duration) -> Self {
        Self { ping_interval }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(DEFAULT_PING_INTERVAL)
    }
}

#[async_trait]
impl FeedConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<FrameStream, FeedError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|error| FeedError::Connect(error.to_string()))?;
        let (write, read) = ws_stream.split();

        let frames = read
            .take_while(|msg| {
                let open = !matches!(msg, Ok(Message::Close(_)));
                if !open {
                    info!("Server closed feed connection");
                }
                future::ready(open)
            })
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|error| FeedError::Malformed(error.to_string())),
                    ),
                    // Heartbeat messages - tungstenite answers pings itself
                    Ok(_) => None,
                    Err(error) => Some(Err(FeedError::Transport(error.to_string()))),
                })
            })
            .boxed();

        Ok(with_keepalive(write, frames, self.ping_interval))
    }
}

/// Drive `frames` while sending a `Ping` into `sink` every `ping_interval`.
///
/// Pings only go out while the returned stream is polled, so dropping it stops them. A
/// failed ping surfaces as a terminal [`FeedError::Transport`].
pub(crate) fn with_keepalive<K>(
    sink: K,
    frames: FrameStream,
    ping_interval: Duration,
) -> FrameStream
where
    K: Sink<Message> + Unpin + Send + 'static,
    K::Error: Display,
{
    let mut pings = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    pings.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(
        (sink, frames, pings),
        |(mut sink, mut frames, mut pings)| async move {
            loop {
                tokio::select! {
                    frame = frames.next() => {
                        return frame.map(|frame| (frame, (sink, frames, pings)));
                    }
                    _ = pings.tick() => {
                        if let Err(error) = sink.send(Message::Ping(vec![].into())).await {
                            debug!(%error, "Failed to send ping, connection likely dead");
                            let error = FeedError::Transport(format!("ping failed: {error}"));
                            return Some((Err(error), (sink, frames, pings)));
                        }
                    }
                }
            }
        },
    )
    .boxed()
}

/// Timing of a feed connection loop
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopTiming {
    pub reconnect_delay: Duration,
    pub read_timeout: Duration,
}

/// Connection loop of one feed handle: connect, forward frames, and reconnect after
/// `reconnect_delay` whenever the connection ends, forever.
///
/// The loop only stops when the owner aborts its task or drops the event receiver.
pub(crate) async fn run_feed_loop(
    connector: Arc<dyn FeedConnector>,
    kind: FeedKind,
    generation: u64,
    url: Url,
    timing: LoopTiming,
    event_tx: mpsc::Sender<FeedEvent>,
) {
    info!(%kind, generation, "Starting feed loop");

    let emit = |body: FeedEventBody| {
        let event_tx = event_tx.clone();
        async move {
            let delivered = event_tx
                .send(FeedEvent {
                    kind,
                    generation,
                    body,
                })
                .await
                .is_ok();
            if !delivered {
                warn!(%kind, generation, "Feed event receiver dropped, stopping feed loop");
            }
            delivered
        }
    };

    loop {
        if !emit(FeedEventBody::Connecting).await {
            return;
        }

        match connector.connect(&url).await {
            Ok(frames) => {
                info!(%kind, generation, "Feed connected");
                if !emit(FeedEventBody::Opened).await {
                    return;
                }

                let mut frames = ReadDeadline::new(frames, timing.read_timeout);
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => {
                            if !emit(FeedEventBody::Frame(text)).await {
                                return;
                            }
                        }
                        Err(error) if error.is_terminal() => {
                            warn!(%kind, generation, %error, "Feed connection lost");
                            break;
                        }
                        Err(error) => {
                            warn!(%kind, generation, %error, "Dropping undecodable frame");
                        }
                    }
                }

                if !emit(FeedEventBody::Closed).await {
                    return;
                }
            }
            Err(error) => {
                error!(%kind, generation, %error, "Failed to connect feed");
                if !emit(FeedEventBody::Closed).await {
                    return;
                }
            }
        }

        debug!(
            %kind,
            generation,
            "Waiting {:?} before reconnecting...",
            timing.reconnect_delay
        );
        tokio::time::sleep(timing.reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connector whose connections deliver the given frames and then end
    struct ScriptedConnector {
        frames: Vec<Result<String, FeedError>>,
        attempts: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl FeedConnector for ScriptedConnector {
        async fn connect(&self, _url: &Url) -> Result<FrameStream, FeedError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FeedError::Connect("refused".to_string()));
            }
            Ok(stream::iter(self.frames.clone()).boxed())
        }
    }

    fn timing() -> LoopTiming {
        LoopTiming {
            reconnect_delay: Duration::from_millis(2000),
            read_timeout: Duration::from_secs(120),
        }
    }

    async fn next_body(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEventBody {
        rx.recv().await.unwrap().body
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_forwards_frames_and_reconnects() {
        let connector = Arc::new(ScriptedConnector {
            frames: vec![
                Ok("one".to_string()),
                Err(FeedError::Malformed("bad utf8".to_string())),
                Ok("two".to_string()),
                Err(FeedError::Transport("reset".to_string())),
                Ok("never".to_string()),
            ],
            attempts: AtomicUsize::new(0),
            fail: false,
        });
        let (tx, mut rx) = mpsc::channel(16);
        let url = Url::parse("ws://localhost/ws/prices").unwrap();

        let task = tokio::spawn(run_feed_loop(
            connector.clone(),
            FeedKind::Price,
            3,
            url,
            timing(),
            tx,
        ));

        assert_eq!(next_body(&mut rx).await, FeedEventBody::Connecting);
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Opened);
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Frame("one".to_string()));
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Frame("two".to_string()));
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Closed);

        let started = tokio::time::Instant::now();
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Connecting);
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reports_closed_and_retries() {
        let connector = Arc::new(ScriptedConnector {
            frames: vec![],
            attempts: AtomicUsize::new(0),
            fail: true,
        });
        let (tx, mut rx) = mpsc::channel(16);
        let url = Url::parse("ws://localhost/ws/balance").unwrap();

        let task = tokio::spawn(run_feed_loop(
            connector.clone(),
            FeedKind::Balance,
            1,
            url,
            timing(),
            tx,
        ));

        for _ in 0..3 {
            assert_eq!(next_body(&mut rx).await, FeedEventBody::Connecting);
            assert_eq!(next_body(&mut rx).await, FeedEventBody::Closed);
        }
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);

        task.abort();
    }

    #[tokio::test]
    async fn test_loop_stops_when_receiver_dropped() {
        let connector = Arc::new(ScriptedConnector {
            frames: vec![],
            attempts: AtomicUsize::new(0),
            fail: true,
        });
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        run_feed_loop(
            connector.clone(),
            FeedKind::Balance,
            1,
            Url::parse("ws://localhost/ws/balance").unwrap(),
            timing(),
            tx,
        )
        .await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }
    /// Connections that stay open and silent
    struct SilentConnector;

    #[async_trait]
    impl FeedConnector for SilentConnector {
        async fn connect(&self, _url: &Url) -> Result<FrameStream, FeedError> {
            Ok(stream::pending().boxed())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_is_closed_after_read_timeout() {
        let (tx, mut rx) = mpsc::channel(16);
        let url = Url::parse("ws://localhost/ws/balance").unwrap();
        let timing = LoopTiming {
            reconnect_delay: Duration::from_millis(2000),
            read_timeout: Duration::from_secs(10),
        };

        let task = tokio::spawn(run_feed_loop(
            Arc::new(SilentConnector),
            FeedKind::Balance,
            7,
            url,
            timing,
            tx,
        ));

        assert_eq!(next_body(&mut rx).await, FeedEventBody::Connecting);
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Opened);

        let opened = tokio::time::Instant::now();
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Closed);
        assert!(opened.elapsed() >= Duration::from_secs(10));
        assert_eq!(next_body(&mut rx).await, FeedEventBody::Connecting);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings_idle_connection() {
        let (ping_tx, mut ping_rx) = futures::channel::mpsc::channel::<Message>(8);
        let ping_interval = Duration::from_secs(30);
        let mut frames = with_keepalive(ping_tx, stream::pending().boxed(), ping_interval);
        let reader = tokio::spawn(async move { frames.next().await });

        let started = tokio::time::Instant::now();
        for expected in 1..=2u32 {
            let message = ping_rx.next().await.unwrap();
            assert!(matches!(message, Message::Ping(_)));
            assert!(started.elapsed() >= Duration::from_secs(30 * u64::from(expected)));
        }

        reader.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ping_is_terminal() {
        let (ping_tx, ping_rx) = futures::channel::mpsc::channel::<Message>(8);
        drop(ping_rx);
        let ping_interval = Duration::from_secs(30);
        let mut frames = with_keepalive(ping_tx, stream::pending().boxed(), ping_interval);

        let error = frames.next().await.unwrap().unwrap_err();
        assert!(error.is_terminal());
    }
}
