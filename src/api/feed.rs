//! Real-time trade activity feed.
//!
//! Connects to the Polymarket real-time data service over WebSocket, issues a
//! single subscription for the trade-activity topic on connect, and forwards
//! every decoded [`TradeEvent`] into the monitor's channel. Reconnects with
//! exponential backoff when the connection drops; the feed only terminates
//! when the receiving side of the channel goes away.

use std::time::Duration;

use anyhow::{anyhow, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::models::TradeEvent;

use super::types::{FeedMessage, SubscribeRequest};

/// Polymarket real-time data service WebSocket URL.
pub const FEED_WS_URL: &str = "wss://ws-live-data.polymarket.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// WebSocket client for the trade-activity stream.
pub struct ActivityFeed {
    url: String,
    tx: mpsc::Sender<TradeEvent>,
}

impl ActivityFeed {
    pub fn new(url: String, tx: mpsc::Sender<TradeEvent>) -> Self {
        Self { url, tx }
    }

    /// Run the feed with reconnection until the event channel closes.
    pub async fn run(self) -> Result<()> {
        let mut policy = ExponentialBackoff {
            max_interval: MAX_RECONNECT_DELAY,
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            let mut subscribed = false;
            match self.session(&mut subscribed).await {
                Ok(()) => {
                    info!("Activity feed: channel closed, shutting down");
                    return Ok(());
                }
                Err(e) => {
                    if subscribed {
                        policy.reset();
                    }
                    let delay = policy.next_backoff().unwrap_or(MAX_RECONNECT_DELAY);
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Feed connection lost, reconnecting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Run a single WebSocket session. Returns Ok only when the event
    /// channel has closed (clean shutdown).
    async fn session(&self, subscribed: &mut bool) -> Result<()> {
        info!(url = %self.url, "Connecting to activity feed");

        let (ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| anyhow!("Feed connection timed out"))??;

        let (mut write, mut read) = ws.split();

        // Initial ping is required by the service before subscribing.
        write.send(Message::Text("ping".to_string())).await?;

        let request = serde_json::to_string(&SubscribeRequest::trade_activity())?;
        write.send(Message::Text(request)).await?;
        *subscribed = true;
        info!("Subscribed to trade activity");

        let mut ping_timer = interval(PING_INTERVAL);
        ping_timer.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = Self::parse_message(&text) {
                                if self.tx.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(anyhow!("Feed closed: {:?}", frame));
                        }
                        Some(Err(e)) => return Err(anyhow!("Feed error: {e}")),
                        None => return Err(anyhow!("Feed stream ended")),
                        _ => {}
                    }
                }
                _ = ping_timer.tick() => {
                    write.send(Message::Text("ping".to_string())).await?;
                }
                _ = self.tx.closed() => {
                    return Ok(());
                }
            }
        }
    }

    /// Decode one feed message into a trade event, ignoring everything that
    /// is not a trade-activity payload.
    fn parse_message(text: &str) -> Option<TradeEvent> {
        let msg: FeedMessage = serde_json::from_str(text).ok()?;

        if msg.topic != "activity" || msg.message_type != "trades" {
            debug!(topic = %msg.topic, "Ignoring feed message");
            return None;
        }

        msg.payload?.into_event()
    }
}
