//! Event channel - the single push connection to the consensus feed
//!
//! Runs the connection state machine
//! `Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting ...`
//! on a background task, decodes frames into [`ConsensusEvent`]s and fans
//! them out to subscribers in arrival order. A malformed frame is treated as
//! a transport fault: the connection is closed and re-established.

use crate::backoff::Backoff;
use crate::subscriptions::{SubscriptionId, Subscribers};
use crate::types::{ChannelConfig, ChannelState, ChannelStatus};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pbft_api_client::Session;
use pbft_trade_types::ConsensusEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Error, Debug)]
pub enum ChannelError {
    /// `stop()` was called; build a new channel to connect again
    #[error("channel has been stopped")]
    Stopped,

    #[error("channel already started")]
    AlreadyStarted,

    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
}

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// State shared with the connection task
struct Shared {
    subscribers: Subscribers<ConsensusEvent>,
    status: watch::Sender<ChannelStatus>,
    stopped: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: ChannelState, new_connection: bool) {
        let stopped = &self.stopped;
        let changed = self.status.send_if_modified(|status| {
            // stop() owns the final state
            if stopped.load(Ordering::SeqCst) {
                return false;
            }
            if new_connection {
                status.epoch += 1;
            }
            status.state = state;
            true
        });
        if changed {
            tracing::debug!("Consensus channel state: {:?}", state);
        }
    }

    /// Read frames until the connection ends; returns why it ended
    async fn read_frames(&self, ws_stream: WsStream, idle_timeout: Option<Duration>) -> String {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut pinged = false;

        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit / 2, ws_receiver.next()).await {
                    Ok(next) => next,
                    Err(_) if !pinged => {
                        // Any reply, a pong included, proves the link is alive
                        pinged = true;
                        if let Err(e) = ws_sender.send(Message::Ping(Vec::new())).await {
                            return format!("ping failed: {}", e);
                        }
                        continue;
                    }
                    Err(_) => return format!("no frames for {}ms", limit.as_millis()),
                },
                None => ws_receiver.next().await,
            };
            let Some(msg) = next else {
                break;
            };
            pinged = false;

            let decoded = match msg {
                Ok(Message::Text(text)) => ConsensusEvent::decode(&text),
                Ok(Message::Binary(data)) => ConsensusEvent::decode_bytes(&data),
                Ok(Message::Close(_)) => return "server closed connection".to_string(),
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return format!("websocket error: {}", e),
            };

            match decoded {
                Ok(event) => {
                    tracing::trace!("Consensus event: {:?}", event);
                    self.subscribers.notify(&event);
                }
                Err(e) => {
                    tracing::warn!("Dropping malformed consensus frame: {}", e);
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return format!("malformed frame: {}", e);
                }
            }
        }

        "stream ended".to_string()
    }
}

/// Owner of the push connection
pub struct EventChannel {
    config: ChannelConfig,
    /// Identity sent with the handshake, if any
    session: Option<Session>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl EventChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (status, _) = watch::channel(ChannelStatus::default());
        Self {
            config,
            session: None,
            shared: Arc::new(Shared {
                subscribers: Subscribers::new(),
                status,
                stopped: AtomicBool::new(false),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Send the session's bearer token with each handshake
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Register a handler for decoded events
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ConsensusEvent) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(handler)
    }

    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        self.shared.subscribers.unsubscribe(subscription_id)
    }

    pub fn status(&self) -> ChannelStatus {
        *self.shared.status.borrow()
    }

    /// Receiver for status changes; intermediate states may be coalesced
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    /// Start connecting in the background. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<(), ChannelError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running(_) => return Err(ChannelError::AlreadyStarted),
            Lifecycle::Stopped => return Err(ChannelError::Stopped),
            Lifecycle::Idle => {}
        }

        self.config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;

        let shared = self.shared.clone();
        let config = self.config.clone();
        let session = self.session.clone();
        let handle = tokio::spawn(async move {
            run_connection(shared, config, session).await;
        });

        *lifecycle = Lifecycle::Running(handle);
        tracing::info!("Consensus channel started for {}", self.config.url);
        Ok(())
    }

    /// Stop for good. No event is delivered after this returns, and a
    /// pending reconnect timer is cancelled.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        // Waits out a delivery already in progress
        self.shared.subscribers.close();

        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        if let Lifecycle::Running(handle) = previous {
            handle.abort();
        }

        self.shared
            .status
            .send_modify(|status| status.state = ChannelState::Disconnected);
        tracing::info!("Consensus channel stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Lifecycle::Running(handle) = &*self.lifecycle.lock() {
            handle.abort();
        }
    }
}

async fn connect(config: &ChannelConfig, session: Option<&Session>) -> anyhow::Result<WsStream> {
    let mut request = config.url.as_str().into_client_request()?;
    if let Some(identity) = session.and_then(Session::current_identity) {
        let value = HeaderValue::from_str(&format!("Bearer {}", identity.token))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws_stream, _) = tokio::time::timeout(config.handshake_timeout, connect_async(request))
        .await
        .map_err(|_| anyhow::anyhow!("handshake timed out"))??;
    Ok(ws_stream)
}

async fn run_connection(shared: Arc<Shared>, config: ChannelConfig, session: Option<Session>) {
    let mut backoff = Backoff::new(
        config.initial_backoff,
        config.max_backoff,
        config.backoff_multiplier,
        config.jitter,
    );

    loop {
        shared.set_state(ChannelState::Connecting, false);

        match connect(&config, session.as_ref()).await {
            Ok(ws_stream) => {
                backoff.reset();
                shared.set_state(ChannelState::Connected, true);
                tracing::info!("Connected to consensus feed at {}", config.url);

                let reason = shared.read_frames(ws_stream, config.idle_timeout).await;
                tracing::warn!("Consensus feed connection lost: {}", reason);
            }
            Err(e) => {
                tracing::warn!("Handshake with {} failed: {}", config.url, e);
            }
        }

        shared.set_state(ChannelState::Reconnecting, false);
        let delay = backoff.next_delay();
        tracing::info!(
            "Reconnecting to consensus feed in {}ms (attempt {})",
            delay.as_millis(),
            backoff.attempts()
        );
        tokio::time::sleep(delay).await;
    }
}
