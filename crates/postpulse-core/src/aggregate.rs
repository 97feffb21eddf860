//! Reduction of a collected batch into summary statistics.

use serde::{Deserialize, Serialize};

use crate::error::AggregateError;
use crate::post::{Dimension, PostStats};

/// Summary of one collection window.
///
/// Exactly one of the `avg_*` fields is set, matching the requested dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostsAggregation {
    pub total_posts: usize,
    pub minimum_timestamp: i64,
    pub maximum_timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_likes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_comments: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_favorites: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_retweets: Option<i64>,
}

impl PostsAggregation {
    /// The populated average, whichever dimension it belongs to.
    pub fn average(&self) -> Option<(Dimension, i64)> {
        [
            (Dimension::Likes, self.avg_likes),
            (Dimension::Comments, self.avg_comments),
            (Dimension::Favorites, self.avg_favorites),
            (Dimension::Retweets, self.avg_retweets),
        ]
        .into_iter()
        .find_map(|(d, v)| v.map(|v| (d, v)))
    }
}

/// Count, timestamp bounds and the truncated mean of `dimension` over `batch`.
pub fn aggregate(batch: &[PostStats], dimension: Dimension) -> Result<PostsAggregation, AggregateError> {
    let (Some(minimum), Some(maximum)) = (
        batch.iter().map(|p| p.timestamp).min(),
        batch.iter().map(|p| p.timestamp).max(),
    ) else {
        return Err(AggregateError::NoPostsAvailable);
    };

    let mut aggregation = PostsAggregation {
        total_posts: batch.len(),
        minimum_timestamp: minimum,
        maximum_timestamp: maximum,
        avg_likes: None,
        avg_comments: None,
        avg_favorites: None,
        avg_retweets: None,
    };

    let average = Some(truncated_mean(batch, dimension));
    match dimension {
        Dimension::Likes => aggregation.avg_likes = average,
        Dimension::Comments => aggregation.avg_comments = average,
        Dimension::Favorites => aggregation.avg_favorites = average,
        Dimension::Retweets => aggregation.avg_retweets = average,
    }

    Ok(aggregation)
}

/// Same as [`aggregate`], with the dimension given by name.
pub fn aggregate_by_name(batch: &[PostStats], dimension: &str) -> Result<PostsAggregation, AggregateError> {
    if batch.is_empty() {
        return Err(AggregateError::NoPostsAvailable);
    }
    aggregate(batch, dimension.parse()?)
}

// Integer division, rounds toward zero. Caller guarantees a non-empty batch.
// Summed in i128: the mean of i64 values always fits back into i64.
fn truncated_mean(batch: &[PostStats], dimension: Dimension) -> i64 {
    let sum: i128 = batch.iter().map(|p| i128::from(p.get(dimension))).sum();
    (sum / batch.len() as i128) as i64
}
