//! Error types for the hub, the collection window and the aggregator.

use thiserror::Error;

/// Errors raised by the event hub while streaming the upstream feed.
#[derive(Debug, Error)]
pub enum HubError {
    /// The upstream request could not be sent (connection refused, DNS, timeout…).
    #[error("can't do request: {0}")]
    Request(String),

    /// The upstream answered with something other than the expected status.
    #[error("invalid status code, want {expected} got {got}")]
    InvalidStatusCode { expected: u16, got: u16 },

    /// Reading the response body failed mid-stream.
    #[error("stream read error: {0}")]
    Read(String),

    /// The upstream closed the stream without being asked to.
    #[error("upstream closed the stream")]
    StreamEnded,

    /// Lifetime reconnection budget is spent. Fatal to the hub.
    #[error("reconnection attempts exceeded")]
    ReconnectionAttemptsExceeded,

    /// The OS random source failed while generating a subscriber id.
    #[error("can't generate random id: {0}")]
    SubscriberId(String),
}

impl HubError {
    /// Returns `true` if the hub may reconnect after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::InvalidStatusCode { .. } | Self::Read(_) | Self::StreamEnded
        )
    }

    /// Returns `true` if the hub gave up and the process should shut down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectionAttemptsExceeded)
    }
}

/// Errors decoding a single event payload into post statistics.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not JSON, not an object, or a field has the wrong type.
    #[error("can't unmarshal event: {0}")]
    Json(#[from] serde_json::Error),

    /// The event object carries more than one post.
    #[error("too many posts returned from stream")]
    TooManyPosts,

    /// The event object carries no post at all.
    #[error("empty event")]
    EmptyEvent,
}

/// Errors ending a collection window early.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("can't subscribe to sse server: {0}")]
    Subscribe(#[source] HubError),

    /// The hub closed the subscription before the window elapsed.
    #[error("subscriber channel is closed")]
    ClosedSubscriber,

    #[error("can't decode event: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors from a statistics request.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no posts available")]
    NoPostsAvailable,

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("can't read post stats: {0}")]
    Collect(#[from] CollectError),
}

impl AggregateError {
    /// Returns `true` for request-level validation failures (no data, bad dimension).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::NoPostsAvailable | Self::UnknownDimension(_))
    }
}
