// Data models: Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite or sqlx directly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::Notification;

/// A platform user. `reputation` is overwritten on every recompute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub reputation: i64,
    pub created_at: String,
}

/// A post as stored, without its engagement counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub published: bool,
    pub featured: bool,
    pub created_at: String,
}

/// A published post together with the counts the ranker sorts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEngagement {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    /// Number of vote records, regardless of direction
    pub votes: i64,
    pub comments: i64,
    /// Views, counted according to the configured `ViewCounting`
    pub views: i64,
}

/// Result of one transactional feature pass.
#[derive(Debug, Clone)]
pub struct FeaturePass {
    /// Posts featured by this pass, ranked
    pub featured: Vec<PostEngagement>,
    /// Posts that were featured before the pass (any publish state)
    pub previously_featured: Vec<Post>,
}

/// Aggregate engagement on one user's published posts.
///
/// This is the sole input of the reputation formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub posts: i64,
    pub views: i64,
    pub likes: i64,
    pub saves: i64,
    pub comments: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub trending_posts: i64,
}

/// A leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: i64,
    pub username: String,
    pub reputation: i64,
}

/// A stored notification, decoded back into its typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: i64,
    pub notification: Notification,
    pub read: bool,
    pub created_at: String,
}

/// Vote direction. Stored as +1 / -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_i64(&self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl std::fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How repeated views of one post by the same viewer are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewCounting {
    /// Every view row counts (the platform's historical behaviour)
    #[default]
    All,
    /// At most one view per viewer per post
    UniqueViewers,
}

impl ViewCounting {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewCounting::All => "all",
            ViewCounting::UniqueViewers => "unique",
        }
    }
}

impl std::str::FromStr for ViewCounting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ViewCounting::All),
            "unique" | "unique_viewers" => Ok(ViewCounting::UniqueViewers),
            other => anyhow::bail!("Unknown view counting mode '{other}' (expected all|unique)"),
        }
    }
}

/// Options for the per-user engagement aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountOptions {
    pub view_counting: ViewCounting,
    /// Trailing window, in days, for the trending-post check
    pub trending_window_days: i64,
    /// Views inside the window needed for a post to count as trending
    pub trending_min_views: i64,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self {
            view_counting: ViewCounting::All,
            trending_window_days: 7,
            trending_min_views: 100,
        }
    }
}

/// Longest accepted trending window, roughly a century.
pub const MAX_TRENDING_WINDOW_DAYS: i64 = 36_500;

impl CountOptions {
    /// Start of the trending window that ends at `now`.
    ///
    /// Errors instead of overflowing when the window reaches past the
    /// range chrono can represent.
    pub fn trending_cutoff(&self, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        Duration::try_days(self.trending_window_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Trending window of {} days is out of range",
                    self.trending_window_days
                )
            })
    }
}
