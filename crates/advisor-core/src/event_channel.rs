//! `ResilientEventChannel` — spec section 4.10 / 4.11 (concurrency).
//!
//! Adapts a chunk-producing stream to a long-lived connection with
//! heartbeat keepalive, ordered content ids, client-disconnect detection,
//! and exactly one terminal frame. Defined independently of any transport;
//! `advisor-server` maps [`Frame`] onto SSE.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use uuid::Uuid;

/// One framed event. `id` is `Some` only for content frames; it is
/// strictly increasing starting at 1. Heartbeats, the connection frame,
/// and terminal frames carry `id: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub data: String,
    pub id: Option<u64>,
    pub retry_ms: Option<u64>,
}

impl Frame {
    fn connection() -> Self {
        Self {
            event: "connection".to_string(),
            data: "connected".to_string(),
            id: None,
            retry_ms: Some(3000),
        }
    }

    fn heartbeat() -> Self {
        Self {
            event: "ping".to_string(),
            data: "heartbeat".to_string(),
            id: None,
            retry_ms: None,
        }
    }

    fn done() -> Self {
        Self {
            event: "done".to_string(),
            data: "stream_complete".to_string(),
            id: None,
            retry_ms: None,
        }
    }

    fn error(message: &str) -> Self {
        let payload = serde_json::json!({
            "error": message,
            "recoverable": true,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        Self {
            event: "error".to_string(),
            data: payload.to_string(),
            id: None,
            retry_ms: None,
        }
    }
}

/// A content event emitted by the underlying producer, before the channel
/// assigns it a monotonic id.
#[derive(Debug, Clone)]
pub struct ProducerItem {
    pub event: String,
    pub data: String,
}

/// Result of a single producer poll, surfaced so one error frame can
/// precede termination without panicking the stream.
pub type ProducerResult = Result<ProducerItem, String>;

/// Signals client liveness; `advisor-server` flips this from a connection
/// drop or broken-pipe write.
#[derive(Clone, Default)]
pub struct DisconnectSignal(Arc<AtomicBool>);

impl DisconnectSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_disconnected(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a single channel run.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub heartbeat_interval: Duration,
    pub disconnect_poll_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            disconnect_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Drive `producer` to completion, interleaving heartbeats and polling
/// `disconnect` for client liveness, and emit exactly one terminal frame
/// (`done`, `error`, or none at all on a silent disconnect — spec section
/// 4.10 invariants).
pub fn run(
    mut producer: impl Stream<Item = ProducerResult> + Unpin + Send + 'static,
    disconnect: DisconnectSignal,
    config: ChannelConfig,
) -> impl Stream<Item = Frame> {
    async_stream::stream! {
        yield Frame::connection();

        let mut next_id: u64 = 1;
        let mut last_was_terminal = false;
        let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut disconnect_tick = tokio::time::interval(config.disconnect_poll_interval);

        loop {
            if disconnect.is_disconnected() {
                return;
            }

            tokio::select! {
                biased;

                _ = disconnect_tick.tick() => {
                    if disconnect.is_disconnected() {
                        return;
                    }
                }

                _ = heartbeat.tick() => {
                    yield Frame::heartbeat();
                }

                item = producer.next() => {
                    match item {
                        Some(Ok(content)) => {
                            last_was_terminal = matches!(content.event.as_str(), "done" | "error" | "cancelled");
                            yield Frame {
                                event: content.event,
                                data: content.data,
                                id: Some(next_id),
                                retry_ms: None,
                            };
                            next_id += 1;
                        }
                        Some(Err(message)) => {
                            yield Frame::error(&message);
                            return;
                        }
                        None => {
                            // The producer's own final item may already have been a
                            // terminal event (e.g. a content-level "done" chunk); don't
                            // double it up with our own auto-appended terminal frame.
                            if !last_was_terminal {
                                yield Frame::done();
                            }
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// A fresh monotonic correlation id for a stream run (not the content
/// frame id — used for logging/metrics correlation).
#[must_use]
pub fn new_stream_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration as StdDuration;

    fn content(event: &str, data: &str) -> ProducerResult {
        Ok(ProducerItem {
            event: event.to_string(),
            data: data.to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn content_ids_are_strictly_increasing_and_single_terminal() {
        let items = vec![content("token", "a"), content("token", "b"), content("token", "c")];
        let producer = stream::iter(items);
        let frames: Vec<Frame> = run(producer, DisconnectSignal::new(), ChannelConfig::default())
            .collect()
            .await;

        assert_eq!(frames[0].event, "connection");
        let content_ids: Vec<u64> = frames
            .iter()
            .filter_map(|f| f.id)
            .collect();
        assert_eq!(content_ids, vec![1, 2, 3]);

        let terminal_count = frames
            .iter()
            .filter(|f| matches!(f.event.as_str(), "done" | "error" | "cancelled"))
            .count();
        assert_eq!(terminal_count, 1);
        assert_eq!(frames.last().unwrap().event, "done");
    }

    #[tokio::test(start_paused = true)]
    async fn producer_error_emits_error_then_terminates() {
        let items: Vec<ProducerResult> = vec![content("token", "a"), Err("boom".to_string())];
        let producer = stream::iter(items);
        let frames: Vec<Frame> = run(producer, DisconnectSignal::new(), ChannelConfig::default())
            .collect()
            .await;
        assert_eq!(frames.last().unwrap().event, "error");
        let terminal_count = frames.iter().filter(|f| f.event == "error").count();
        assert_eq!(terminal_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_interleave_without_reordering_content() {
        let slow_producer = async_stream::stream! {
            yield content("token", "first");
            tokio::time::sleep(StdDuration::from_millis(500)).await;
            yield content("token", "second");
        };
        let config = ChannelConfig {
            heartbeat_interval: StdDuration::from_millis(100),
            disconnect_poll_interval: StdDuration::from_secs(60),
        };
        let frames: Vec<Frame> = run(Box::pin(slow_producer), DisconnectSignal::new(), config)
            .collect()
            .await;

        let ping_count = frames.iter().filter(|f| f.event == "ping").count();
        assert!(ping_count >= 3, "expected at least 3 heartbeats, got {ping_count}");

        let content_ids: Vec<u64> = frames.iter().filter_map(|f| f.id).collect();
        assert_eq!(content_ids, vec![1, 2]);
    }
}
