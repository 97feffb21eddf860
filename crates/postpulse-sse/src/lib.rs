//! postpulse-sse: Server-Sent-Events hub with auto-reconnect.
//!
//! # Features
//! - One upstream connection, re-established with linear backoff
//! - Non-blocking fan-out: a slow subscriber misses events instead of stalling the stream
//! - Subscribers come and go independently of the connection lifecycle
//! - Windowed collection of decoded posts for statistics requests
//!
//! ## Architecture
//! ```text
//! upstream (text/event-stream)
//!       │
//!       ▼
//! EventHub::listen ── LineFramer ── "data: " payloads
//!       │
//!       ▼
//! SubscriberRegistry::broadcast (try_send per subscriber)
//!       │            │            │
//!       ▼            ▼            ▼
//!   collector    collector    collector   ← one per in-flight request
//! ```

pub mod collector;
pub mod config;
pub mod frame;
pub mod hub;
pub mod registry;

pub use collector::WindowedCollector;
pub use config::HubConfig;
pub use hub::{EventHub, HubMetrics, HubState};
pub use registry::{Payload, Subscriber, SubscriberId, SubscriberRegistry};
