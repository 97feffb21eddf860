//! postpulse-core: foundation types for PostPulse.
//!
//! # Overview
//!
//! PostPulse watches a live Server-Sent-Events feed of social-media post statistics and answers
//! "what happened in the next N seconds" questions. The core crate defines:
//!
//! - [`PostStats`] / [`decode_event`] - the event payload and its decoder
//! - [`Dimension`] - the counter a request averages
//! - [`aggregate()`] / [`PostsAggregation`] - the pure reduction over a window
//! - [`PostSource`] / [`AggregateService`] - the seam between collection and reduction
//! - [`policy`] module - reconnect backoff for the upstream connection
//! - [`error`] module - structured error types

pub mod aggregate;
pub mod error;
pub mod policy;
pub mod post;
pub mod source;

pub use aggregate::{aggregate, aggregate_by_name, PostsAggregation};
pub use error::{AggregateError, CollectError, DecodeError, HubError};
pub use post::{decode_event, Dimension, PostStats};
pub use source::{AggregateService, PostSource};
