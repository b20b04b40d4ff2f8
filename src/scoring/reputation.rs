// Reputation formula.
//
// Reputation is a weighted linear sum over a user's engagement counts,
// floored to an integer. It is always recomputed from the full counts, never
// incremented, so the same counts always produce the same value.

use serde::{Deserialize, Serialize};

use crate::db::models::EngagementCounts;

/// Per-signal weights for the reputation formula.
///
/// `reputation = floor(sum(count_i * weight_i))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationWeights {
    /// Per published post (default 10)
    pub post: f64,
    /// Per view on the user's posts (default 0.1)
    pub view: f64,
    /// Per like received (default 5)
    pub like: f64,
    /// Per bookmark received (default 8)
    pub save: f64,
    /// Per comment received (default 3)
    pub comment: f64,
    /// Per upvote received (default 10)
    pub upvote: f64,
    /// Per downvote received (default -5)
    pub downvote: f64,
    /// Per trending post (default 50)
    pub trending_post: f64,
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            post: 10.0,
            view: 0.1,
            like: 5.0,
            save: 8.0,
            comment: 3.0,
            upvote: 10.0,
            downvote: -5.0,
            trending_post: 50.0,
        }
    }
}

/// Lower bound applied after flooring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationFloor {
    /// Negative reputation is allowed
    #[default]
    None,
    /// Clamp at zero
    Zero,
}

impl ReputationFloor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationFloor::None => "none",
            ReputationFloor::Zero => "zero",
        }
    }
}

impl std::str::FromStr for ReputationFloor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ReputationFloor::None),
            "zero" => Ok(ReputationFloor::Zero),
            other => anyhow::bail!("Unknown reputation floor '{other}' (expected none|zero)"),
        }
    }
}

// Fractional weights (0.1 per view) can leave an exact integer total a hair
// below itself after summing; this keeps floor() from dropping a point.
const ROUNDING_SLACK: f64 = 1e-9;

/// Compute the weighted sum before flooring.
pub fn weighted_sum(counts: &EngagementCounts, weights: &ReputationWeights) -> f64 {
    counts.posts as f64 * weights.post
        + counts.views as f64 * weights.view
        + counts.likes as f64 * weights.like
        + counts.saves as f64 * weights.save
        + counts.comments as f64 * weights.comment
        + counts.upvotes as f64 * weights.upvote
        + counts.downvotes as f64 * weights.downvote
        + counts.trending_posts as f64 * weights.trending_post
}

/// Compute a user's reputation from their engagement counts.
pub fn compute_reputation(
    counts: &EngagementCounts,
    weights: &ReputationWeights,
    floor: ReputationFloor,
) -> i64 {
    let score = (weighted_sum(counts, weights) + ROUNDING_SLACK).floor() as i64;
    match floor {
        ReputationFloor::None => score,
        ReputationFloor::Zero => score.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_example() {
        let counts = EngagementCounts {
            posts: 2,
            views: 100,
            likes: 10,
            saves: 5,
            comments: 3,
            upvotes: 4,
            downvotes: 1,
            trending_posts: 0,
        };
        // 20 + 10 + 50 + 40 + 9 + 40 - 5 = 164
        let rep = compute_reputation(&counts, &ReputationWeights::default(), ReputationFloor::None);
        assert_eq!(rep, 164);
    }

    #[test]
    fn test_zero_counts_is_zero() {
        let rep = compute_reputation(
            &EngagementCounts::default(),
            &ReputationWeights::default(),
            ReputationFloor::None,
        );
        assert_eq!(rep, 0);
    }

    #[test]
    fn test_fractional_views_are_floored() {
        let counts = EngagementCounts {
            views: 19,
            ..Default::default()
        };
        // 1.9 -> 1
        let rep = compute_reputation(&counts, &ReputationWeights::default(), ReputationFloor::None);
        assert_eq!(rep, 1);
    }

    #[test]
    fn test_trending_weight() {
        let counts = EngagementCounts {
            posts: 1,
            trending_posts: 1,
            ..Default::default()
        };
        let rep = compute_reputation(&counts, &ReputationWeights::default(), ReputationFloor::None);
        assert_eq!(rep, 60);
    }

    #[test]
    fn test_negative_allowed_without_floor() {
        let counts = EngagementCounts {
            posts: 1,
            downvotes: 5,
            ..Default::default()
        };
        // 10 - 25 = -15
        let rep = compute_reputation(&counts, &ReputationWeights::default(), ReputationFloor::None);
        assert_eq!(rep, -15);
    }

    #[test]
    fn test_zero_floor_clamps() {
        let counts = EngagementCounts {
            posts: 1,
            downvotes: 5,
            ..Default::default()
        };
        let rep = compute_reputation(&counts, &ReputationWeights::default(), ReputationFloor::Zero);
        assert_eq!(rep, 0);
    }

    #[test]
    fn test_floor_parse() {
        assert_eq!("zero".parse::<ReputationFloor>().unwrap(), ReputationFloor::Zero);
        assert_eq!(" None ".parse::<ReputationFloor>().unwrap(), ReputationFloor::None);
        assert!("negative".parse::<ReputationFloor>().is_err());
    }
}
