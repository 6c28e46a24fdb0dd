//! Solana PubSub `logsSubscribe` clients.
//!
//! [`LogsSubscriber`] is the long-lived, reconnecting program watcher.
//! [`MintLogStream`] is a short-lived single subscription used to sample
//! trade flow on one mint.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use membot_common::Commitment;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, interval, timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message},
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Placeholder period for the ping timer when heartbeats are off.
const IDLE_TIMER_PERIOD: Duration = Duration::from_secs(3600);

/// Errors from WebSocket subscriptions.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("WebSocket connection failed: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("Connection timeout")]
    Timeout,

    #[error("Stream ended unexpectedly")]
    StreamEnded,

    #[error("Channel send error")]
    ChannelClosed,
}

/// One `logsNotification`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogNotification {
    /// Program the subscription was for, when known.
    pub program_id: Option<String>,
    pub signature: String,
    pub slot: u64,
    pub logs: Vec<String>,
    /// The transaction failed on chain.
    pub failed: bool,
}

/// Parsed inbound PubSub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PubSubFrame {
    /// Reply to a subscribe request: request id → subscription id.
    Ack { request_id: u64, subscription: u64 },
    Notification { subscription: u64, notification: LogNotification },
    Other,
}

/// Parse one text frame.
pub fn parse_frame(text: &str) -> PubSubFrame {
    let Ok(msg) = serde_json::from_str::<Value>(text) else {
        return PubSubFrame::Other;
    };

    if msg.get("method").and_then(Value::as_str) == Some("logsNotification") {
        let Some(params) = msg.get("params") else {
            return PubSubFrame::Other;
        };
        let subscription = params.get("subscription").and_then(Value::as_u64).unwrap_or(0);
        let value = params.pointer("/result/value");
        let slot = params.pointer("/result/context/slot").and_then(Value::as_u64).unwrap_or(0);
        let signature = value
            .and_then(|v| v.get("signature"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let logs = value
            .and_then(|v| v.get("logs"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        let failed = value.and_then(|v| v.get("err")).is_some_and(|e| !e.is_null());
        // Some providers echo the program; most do not.
        let program_id = value
            .and_then(|v| v.get("programId").or_else(|| v.get("program")))
            .and_then(Value::as_str)
            .map(str::to_string);
        return PubSubFrame::Notification {
            subscription,
            notification: LogNotification {
                program_id,
                signature,
                slot,
                logs,
                failed,
            },
        };
    }

    match (msg.get("id").and_then(Value::as_u64), msg.get("result").and_then(Value::as_u64)) {
        (Some(request_id), Some(subscription)) => PubSubFrame::Ack { request_id, subscription },
        _ => PubSubFrame::Other,
    }
}

fn subscribe_request(id: u64, mention: &str, commitment: Commitment) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "logsSubscribe",
        "params": [
            {"mentions": [mention]},
            {"commitment": commitment.as_str()},
        ],
    })
    .to_string()
}

async fn connect(url: &str, connect_timeout: Duration) -> Result<WsStream, SubscriptionError> {
    match timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(SubscriptionError::Connection(e.to_string())),
        Err(_) => Err(SubscriptionError::Timeout),
    }
}

// ============================================================================
// Program watcher
// ============================================================================

/// Configuration for the program log watcher.
#[derive(Debug, Clone)]
pub struct LogsSubscriberConfig {
    pub ws_url: String,
    pub programs: Vec<String>,
    pub commitment: Commitment,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for LogsSubscriberConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            programs: Vec::new(),
            commitment: Commitment::Processed,
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

/// Reconnecting `logsSubscribe` client for a set of programs.
pub struct LogsSubscriber {
    config: LogsSubscriberConfig,
    tx: mpsc::Sender<LogNotification>,
}

impl LogsSubscriber {
    pub fn new(config: LogsSubscriberConfig, tx: mpsc::Sender<LogNotification>) -> Self {
        Self { config, tx }
    }

    /// Run until shutdown or until the receiver is dropped.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), SubscriptionError> {
        if self.config.programs.is_empty() {
            warn!("No program IDs configured; nothing to watch");
            return Ok(());
        }

        loop {
            match self.run_connection(&mut shutdown).await {
                Ok(()) => {
                    info!("Log watcher: clean shutdown");
                    return Ok(());
                }
                Err(SubscriptionError::ChannelClosed) => return Err(SubscriptionError::ChannelClosed),
                Err(e) => {
                    warn!("WebSocket error, reconnecting in {:?} ({e})", self.config.reconnect_delay);
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                        _ = shutdown.recv() => return Ok(()),
                    }
                }
            }
        }
    }

    async fn run_connection(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), SubscriptionError> {
        info!(
            "Opening WS to {} and subscribing to {} program(s)",
            self.config.ws_url,
            self.config.programs.len()
        );
        let ws = connect(&self.config.ws_url, self.config.connect_timeout).await?;
        let (mut write, mut read) = ws.split();

        let mut pending: HashMap<u64, String> = HashMap::new();
        for (i, program) in self.config.programs.iter().enumerate() {
            let id = i as u64 + 1;
            write
                .send(Message::Text(subscribe_request(id, program, self.config.commitment).into()))
                .await?;
            pending.insert(id, program.clone());
        }
        let mut subscriptions: HashMap<u64, String> = HashMap::new();

        // A zero interval disables heartbeats.
        let pinging = !self.config.ping_interval.is_zero();
        let mut ping_timer = interval(if pinging { self.config.ping_interval } else { IDLE_TIMER_PERIOD });
        ping_timer.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            PubSubFrame::Ack { request_id, subscription } => {
                                if let Some(program) = pending.remove(&request_id) {
                                    info!("Subscribed to program={program} sub_id={subscription}");
                                    subscriptions.insert(subscription, program);
                                }
                            }
                            PubSubFrame::Notification { subscription, mut notification } => {
                                if notification.program_id.is_none() {
                                    notification.program_id = subscriptions.get(&subscription).cloned();
                                }
                                self.tx.send(notification).await.map_err(|_| SubscriptionError::ChannelClosed)?;
                            }
                            PubSubFrame::Other => {}
                        },
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server: {:?}", frame);
                            return Err(SubscriptionError::StreamEnded);
                        }
                        Some(Err(e)) => return Err(SubscriptionError::WebSocket(e)),
                        None => return Err(SubscriptionError::StreamEnded),
                        _ => {}
                    }
                }

                _ = ping_timer.tick(), if pinging => {
                    debug!("Watcher heartbeat: connected and listening");
                    write.send(Message::Ping(Vec::new().into())).await?;
                }

                _ = shutdown.recv() => return Ok(()),
            }
        }
    }
}

// ============================================================================
// Per-mint stream
// ============================================================================

/// Single `logsSubscribe` on one mint, polled with per-call timeouts.
pub struct MintLogStream {
    ws: WsStream,
    mint: String,
}

impl MintLogStream {
    pub async fn open(ws_url: &str, mint: &str, connect_timeout: Duration) -> Result<Self, SubscriptionError> {
        let mut ws = connect(ws_url, connect_timeout).await?;
        ws.send(Message::Text(subscribe_request(1, mint, Commitment::Processed).into()))
            .await?;
        Ok(Self {
            ws,
            mint: mint.to_string(),
        })
    }

    pub fn mint(&self) -> &str {
        &self.mint
    }

    /// Wait up to `wait` for the next notification that carries logs.
    ///
    /// `Ok(None)` on timeout; an error if the stream closed.
    pub async fn next_event(&mut self, wait: Duration) -> Result<Option<LogNotification>, SubscriptionError> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let msg = match timeout(remaining, self.ws.next()).await {
                Err(_) => return Ok(None),
                Ok(msg) => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => {
                    if let PubSubFrame::Notification { notification, .. } = parse_frame(&text)
                        && !notification.logs.is_empty()
                    {
                        return Ok(Some(notification));
                    }
                }
                Some(Ok(Message::Ping(data))) => self.ws.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None => return Err(SubscriptionError::StreamEnded),
                Some(Err(e)) => return Err(SubscriptionError::WebSocket(e)),
                _ => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
