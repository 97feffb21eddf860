//! Post statistics carried by the upstream feed, and the dimension a caller averages over.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AggregateError, DecodeError};

/// Engagement counters of one post, as observed in one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostStats {
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub favorites: i64,
    #[serde(default)]
    pub retweets: i64,
    /// Opaque to the aggregator beyond ordering and equality.
    pub timestamp: i64,
}

impl PostStats {
    /// Value of the counter selected by `dimension`.
    pub fn get(&self, dimension: Dimension) -> i64 {
        match dimension {
            Dimension::Likes => self.likes,
            Dimension::Comments => self.comments,
            Dimension::Favorites => self.favorites,
            Dimension::Retweets => self.retweets,
        }
    }
}

/// Decode one event payload of the form `{ "<kind>": { ...post fields } }`.
///
/// Exactly one top-level key is accepted; its name (the post kind) is ignored.
pub fn decode_event(payload: &[u8]) -> Result<PostStats, DecodeError> {
    let mut envelope: Map<String, Value> = serde_json::from_slice(payload)?;

    if envelope.len() > 1 {
        return Err(DecodeError::TooManyPosts);
    }

    let Some((_, post)) = envelope.iter_mut().next() else {
        return Err(DecodeError::EmptyEvent);
    };

    Ok(serde_json::from_value(post.take())?)
}

/// The counter a statistics request averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Likes,
    Comments,
    Favorites,
    Retweets,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Likes,
        Dimension::Comments,
        Dimension::Favorites,
        Dimension::Retweets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likes => "likes",
            Self::Comments => "comments",
            Self::Favorites => "favorites",
            Self::Retweets => "retweets",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "likes" => Ok(Self::Likes),
            "comments" => Ok(Self::Comments),
            "favorites" => Ok(Self::Favorites),
            "retweets" => Ok(Self::Retweets),
            other => Err(AggregateError::UnknownDimension(other.to_string())),
        }
    }
}
