// Database trait: backend-agnostic async interface for all DB operations.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    CountOptions, EngagementCounts, FeaturePass, NotificationRecord, Post, PostEngagement, User,
    UserReputation, ViewCounting, VoteDirection,
};
use crate::notify::Notification;

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Users ---

    async fn insert_user(&self, username: &str) -> Result<i64>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    async fn list_user_ids(&self) -> Result<Vec<i64>>;

    /// Overwrite a user's reputation. Returns false if the user doesn't exist.
    async fn set_reputation(&self, user_id: i64, reputation: i64) -> Result<bool>;

    /// Users ordered by reputation descending.
    async fn get_leaderboard(&self, limit: u32) -> Result<Vec<UserReputation>>;

    // --- Posts and engagement records ---
    //
    // Written by the platform's user-facing actions; the jobs only read them.

    async fn insert_post(&self, author_id: i64, title: &str, published: bool) -> Result<i64>;

    async fn get_post(&self, post_id: i64) -> Result<Option<Post>>;

    async fn record_vote(&self, post_id: i64, voter_id: i64, direction: VoteDirection)
        -> Result<()>;

    async fn record_view(
        &self,
        post_id: i64,
        viewer_id: Option<i64>,
        viewed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn record_comment(&self, post_id: i64, author_id: i64, content: &str) -> Result<i64>;

    async fn record_like(&self, post_id: i64, user_id: i64) -> Result<()>;

    async fn record_bookmark(&self, post_id: i64, user_id: i64) -> Result<()>;

    async fn count_published_posts(&self) -> Result<i64>;

    // --- Ranking ---

    /// Transactionally reset the featured flag and feature the top `k`
    /// published posts by engagement.
    async fn feature_top_posts(&self, k: usize, counting: ViewCounting) -> Result<FeaturePass>;

    /// Currently featured published posts with counts, ranked.
    async fn get_featured_posts(&self, counting: ViewCounting) -> Result<Vec<PostEngagement>>;

    // --- Reputation inputs ---

    /// Aggregate engagement on a user's published posts; `None` for an
    /// unknown user.
    async fn get_user_engagement(
        &self,
        user_id: i64,
        options: &CountOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<EngagementCounts>>;

    // --- Notifications ---

    async fn insert_notification(&self, user_id: i64, notification: &Notification)
        -> Result<i64>;

    /// A user's notifications, newest first.
    async fn get_notifications(&self, user_id: i64, limit: u32)
        -> Result<Vec<NotificationRecord>>;

    // --- Job state ---

    /// Get a job state value by key (e.g., "last_feature_run_at").
    async fn get_job_state(&self, key: &str) -> Result<Option<String>>;

    /// Set a job state value (upsert).
    async fn set_job_state(&self, key: &str, value: &str) -> Result<()>;
}
