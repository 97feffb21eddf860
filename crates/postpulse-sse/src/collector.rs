//! Time-boxed collection of decoded posts from the hub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep_until, Instant};

use postpulse_core::{decode_event, CollectError, PostSource, PostStats};

use crate::hub::EventHub;
use crate::registry::Subscriber;

// Deadline used when `now + window` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Collects posts for one window per call, each on its own temporary subscriber.
#[derive(Clone)]
pub struct WindowedCollector {
    hub: Arc<EventHub>,
}

impl WindowedCollector {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }

    /// Decode every event broadcast during `window`.
    ///
    /// Fails fast on the first malformed payload, and with
    /// [`CollectError::ClosedSubscriber`] if the hub shuts down mid-window.
    pub async fn collect_for(&self, window: Duration) -> Result<Vec<PostStats>, CollectError> {
        let subscriber = self.hub.new_subscriber().map_err(CollectError::Subscribe)?;
        let mut active = ActiveSubscription { hub: &self.hub, subscriber };

        let now = Instant::now();
        let deadline = sleep_until(now.checked_add(window).unwrap_or(now + FAR_FUTURE));
        tokio::pin!(deadline);

        let mut posts = Vec::new();
        loop {
            // An expired deadline wins over events still buffered.
            tokio::select! {
                biased;

                _ = &mut deadline => return Ok(posts),
                event = active.subscriber.receiver.recv() => {
                    let Some(payload) = event else {
                        return Err(CollectError::ClosedSubscriber);
                    };
                    let post = decode_event(&payload).map_err(|e| {
                        tracing::warn!(subscriber = %active.subscriber.id, error = %e, "malformed event, aborting window");
                        e
                    })?;
                    posts.push(post);
                }
            }
        }
    }
}

#[async_trait]
impl PostSource for WindowedCollector {
    async fn collect_for(&self, window: Duration) -> Result<Vec<PostStats>, CollectError> {
        WindowedCollector::collect_for(self, window).await
    }
}

// Removes the subscriber however the window ends, including cancellation and panics.
struct ActiveSubscription<'a> {
    hub: &'a EventHub,
    subscriber: Subscriber,
}

impl Drop for ActiveSubscription<'_> {
    fn drop(&mut self) {
        self.hub.remove_subscriber(&self.subscriber.id);
    }
}
