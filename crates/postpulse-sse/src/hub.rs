//! `EventHub`: single upstream SSE connection fanned out to many subscribers.
//!
//! [`EventHub::listen`] owns the connection: it reads the stream line by line,
//! broadcasts every `data: ` payload, and reconnects with linear backoff until the
//! reconnect budget runs out or [`EventHub::close`] is called.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use postpulse_core::policy::ReconnectPolicy;
use postpulse_core::HubError;

use crate::config::HubConfig;
use crate::frame::{event_payload, LineFramer};
use crate::registry::{Payload, Subscriber, SubscriberId, SubscriberRegistry};

/// Connection lifecycle of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    /// `listen` not started yet.
    Idle,
    /// Opening (or re-opening) the upstream request.
    Connecting,
    /// Reading events.
    Streaming,
    /// Stopped by `close`.
    Closed,
    /// Reconnect budget exhausted.
    Failed,
}

impl std::fmt::Display for HubState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Metrics snapshot for the hub.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubMetrics {
    pub events_received: u64,
    pub deliveries: u64,
    pub dropped_deliveries: u64,
    pub reconnections: u64,
    pub subscribers: usize,
}

#[derive(Default)]
struct Counters {
    events_received: AtomicU64,
    deliveries: AtomicU64,
    dropped_deliveries: AtomicU64,
    reconnections: AtomicU64,
}

/// Upstream SSE client and subscriber hub.
pub struct EventHub {
    config: HubConfig,
    http: reqwest::Client,
    policy: ReconnectPolicy,
    registry: SubscriberRegistry,
    stop_tx: watch::Sender<bool>,
    closed: AtomicBool,
    state: Mutex<HubState>,
    counters: Counters,
}

impl EventHub {
    /// Create a hub for `config.server_url`. Nothing connects until [`listen`](Self::listen).
    pub fn new(config: HubConfig) -> Result<Self, HubError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| HubError::Request(format!("can't build http client: {e}")))?;
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            policy: ReconnectPolicy::new(config.reconnect()),
            registry: SubscriberRegistry::new(config.subscriber_buffer),
            config,
            http,
            stop_tx,
            closed: AtomicBool::new(false),
            state: Mutex::new(HubState::Idle),
            counters: Counters::default(),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.server_url
    }

    pub fn state(&self) -> HubState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: HubState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Closed and Failed are final.
        if !matches!(*state, HubState::Closed | HubState::Failed) {
            *state = next;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> HubMetrics {
        HubMetrics {
            events_received: self.counters.events_received.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.counters.dropped_deliveries.load(Ordering::Relaxed),
            reconnections: self.counters.reconnections.load(Ordering::Relaxed),
            subscribers: self.registry.len(),
        }
    }

    /// Read the upstream feed until closed or the reconnect budget is spent.
    ///
    /// Blocks for the lifetime of the hub; spawn it on its own task. Returns `Ok(())`
    /// after [`close`](Self::close) and [`HubError::ReconnectionAttemptsExceeded`] when
    /// the hub gives up, in which case the process is expected to shut down.
    pub async fn listen(&self) -> Result<(), HubError> {
        let mut attempts = 0u32;

        loop {
            if self.is_closed() {
                info!(url = %self.config.server_url, "event hub stopped");
                return Ok(());
            }

            let mut connected_at = None;
            let outcome = tokio::select! {
                res = self.read_stream(&mut connected_at) => res,
                _ = self.stop_requested() => Ok(()),
            };

            if self.is_closed() {
                info!(url = %self.config.server_url, "event hub stopped");
                return Ok(());
            }

            let err = outcome.err().unwrap_or(HubError::StreamEnded);
            if !err.is_retryable() {
                error!(error = %err, url = %self.config.server_url, "unrecoverable SSE client error");
                self.set_state(HubState::Failed);
                return Err(err);
            }

            if connected_at.is_some_and(|since: Instant| self.policy.resets_after(since.elapsed())) {
                debug!(attempts, "connection was stable, reconnect budget restored");
                attempts = 0;
            }
            attempts += 1;

            let Some(backoff) = self.policy.next_delay(attempts) else {
                error!(attempts, error = %err, url = %self.config.server_url, "reconnection attempts exceeded");
                self.set_state(HubState::Failed);
                return Err(HubError::ReconnectionAttemptsExceeded);
            };

            self.counters.reconnections.fetch_add(1, Ordering::Relaxed);
            self.set_state(HubState::Connecting);
            warn!(
                attempt = attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "SSE stream error, attempting to reconnect"
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.stop_requested() => {}
            }
        }
    }

    // One connection: request, check status, frame the body. `Ok(())` means the
    // upstream ended the body.
    async fn read_stream(&self, connected_at: &mut Option<Instant>) -> Result<(), HubError> {
        self.set_state(HubState::Connecting);
        info!(url = %self.config.server_url, "connecting to SSE stream");

        let mut response = self
            .http
            .get(&self.config.server_url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| HubError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(HubError::InvalidStatusCode {
                expected: StatusCode::OK.as_u16(),
                got: status.as_u16(),
            });
        }

        *connected_at = Some(Instant::now());
        self.set_state(HubState::Streaming);
        info!(url = %self.config.server_url, "SSE stream connected");

        let mut framer = LineFramer::new(self.config.max_line_bytes);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HubError::Read(e.to_string()))?
        {
            framer.push(&chunk, |line| {
                if let Some(payload) = event_payload(line) {
                    self.broadcast(payload);
                }
            })?;
        }

        if framer.pending() > 0 {
            debug!(bytes = framer.pending(), "discarding unterminated trailing line");
        }
        Ok(())
    }

    async fn stop_requested(&self) {
        let mut stop = self.stop_tx.subscribe();
        loop {
            if *stop.borrow_and_update() {
                return;
            }
            if stop.changed().await.is_err() {
                return;
            }
        }
    }

    /// Offer one payload to every current subscriber. Dropped once the hub is closed.
    pub fn broadcast(&self, payload: &[u8]) {
        if self.is_closed() {
            return;
        }

        let payload: Payload = Arc::from(payload);
        let delivery = self.registry.broadcast(&payload);

        self.counters.events_received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .deliveries
            .fetch_add(delivery.delivered as u64, Ordering::Relaxed);
        if delivery.dropped > 0 {
            self.counters
                .dropped_deliveries
                .fetch_add(delivery.dropped as u64, Ordering::Relaxed);
            debug!(dropped = delivery.dropped, delivered = delivery.delivered, "slow subscribers missed an event");
        }
    }

    /// Register a subscriber. Pair every call with [`remove_subscriber`](Self::remove_subscriber).
    pub fn new_subscriber(&self) -> Result<Subscriber, HubError> {
        let subscriber = self.registry.register()?;
        debug!(subscriber = %subscriber.id, "subscriber registered");
        Ok(subscriber)
    }

    /// Unregister a subscriber and close its channel. No-op for unknown ids.
    pub fn remove_subscriber(&self, id: &SubscriberId) {
        if self.registry.remove(id) {
            debug!(subscriber = %id, "subscriber removed");
        }
    }

    /// Stop `listen` and close every subscriber channel. Later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_tx.send_replace(true);
        let open = self.registry.close_all();
        self.set_state(HubState::Closed);
        info!(subscribers = open, "event hub closed");
    }
}
