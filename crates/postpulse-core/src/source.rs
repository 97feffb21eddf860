//! The `PostSource` trait and the statistics service built on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::aggregate::{aggregate, PostsAggregation};
use crate::error::{AggregateError, CollectError};
use crate::post::{Dimension, PostStats};

/// Anything that can observe posts for a bounded window.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one source serves many concurrent requests.
#[async_trait]
pub trait PostSource: Send + Sync + 'static {
    /// Observe the feed for `window` and return every post seen, in arrival order.
    async fn collect_for(&self, window: Duration) -> Result<Vec<PostStats>, CollectError>;
}

#[async_trait]
impl<S: PostSource + ?Sized> PostSource for Arc<S> {
    async fn collect_for(&self, window: Duration) -> Result<Vec<PostStats>, CollectError> {
        (**self).collect_for(window).await
    }
}

/// Entry point for the request layer: collect for a duration, then reduce.
pub struct AggregateService<S> {
    source: S,
}

impl<S: PostSource> AggregateService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Collect for `window` and average `dimension` over what was seen.
    ///
    /// The dimension is validated first, so an unknown name never opens a window.
    pub async fn aggregate(&self, window: Duration, dimension: &str) -> Result<PostsAggregation, AggregateError> {
        let dimension: Dimension = dimension.parse()?;

        let posts = self.source.collect_for(window).await?;
        tracing::debug!(posts = posts.len(), window_ms = window.as_millis() as u64, %dimension, "window collected");

        let aggregation = aggregate(&posts, dimension)?;
        if let Some((dimension, average)) = aggregation.average() {
            tracing::debug!(total_posts = aggregation.total_posts, %dimension, average, "window aggregated");
        }
        Ok(aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::DecodeError;

    enum Behaviour {
        Posts,
        Empty,
        Fail,
    }

    struct MockSource {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn new(behaviour: Behaviour) -> Self {
            Self { behaviour, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PostSource for MockSource {
        async fn collect_for(&self, _window: Duration) -> Result<Vec<PostStats>, CollectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Posts => Ok(vec![
                    PostStats { likes: 1, comments: 2, favorites: 3, retweets: 4, timestamp: 5 },
                    PostStats { likes: 7, comments: 8, favorites: 9, retweets: 10, timestamp: 11 },
                ]),
                Behaviour::Empty => Ok(vec![]),
                Behaviour::Fail => Err(CollectError::Decode(DecodeError::EmptyEvent)),
            }
        }
    }

    #[tokio::test]
    async fn aggregates_collected_posts() {
        let service = AggregateService::new(MockSource::new(Behaviour::Posts));
        let agg = service.aggregate(Duration::from_secs(4), "favorites").await.unwrap();
        assert_eq!(agg.total_posts, 2);
        assert_eq!(agg.avg_favorites, Some(6));
        assert_eq!(agg.avg_likes, None);
    }

    #[tokio::test]
    async fn empty_window_is_an_error() {
        let service = AggregateService::new(MockSource::new(Behaviour::Empty));
        let err = service.aggregate(Duration::ZERO, "likes").await.unwrap_err();
        assert!(matches!(err, AggregateError::NoPostsAvailable));
    }

    #[tokio::test]
    async fn collection_error_propagates() {
        let service = AggregateService::new(MockSource::new(Behaviour::Fail));
        let err = service.aggregate(Duration::from_secs(1), "likes").await.unwrap_err();
        assert!(matches!(err, AggregateError::Collect(CollectError::Decode(_))));
    }

    #[tokio::test]
    async fn unknown_dimension_skips_collection() {
        let source = Arc::new(MockSource::new(Behaviour::Posts));
        let service = AggregateService::new(Arc::clone(&source));
        let err = service.aggregate(Duration::from_secs(1), "views").await.unwrap_err();
        assert!(matches!(err, AggregateError::UnknownDimension(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
