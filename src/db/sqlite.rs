// SqliteDatabase: rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// Holding the lock for a whole feature pass also serializes concurrent
// ranking runs within the process.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    CountOptions, EngagementCounts, FeaturePass, NotificationRecord, Post, PostEngagement, User,
    UserReputation, ViewCounting, VoteDirection,
};
use super::queries;
use super::traits::Database;
use crate::notify::Notification;
use crate::scoring::ranking;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn insert_user(&self, username: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::insert_user(&conn, username)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        queries::get_user(&conn, user_id)
    }

    async fn list_user_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().await;
        queries::list_user_ids(&conn)
    }

    async fn set_reputation(&self, user_id: i64, reputation: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::set_reputation(&conn, user_id, reputation)
    }

    async fn get_leaderboard(&self, limit: u32) -> Result<Vec<UserReputation>> {
        let conn = self.conn.lock().await;
        queries::get_leaderboard(&conn, limit)
    }

    async fn insert_post(&self, author_id: i64, title: &str, published: bool) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::insert_post(&conn, author_id, title, published)
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let conn = self.conn.lock().await;
        queries::get_post(&conn, post_id)
    }

    async fn record_vote(
        &self,
        post_id: i64,
        voter_id: i64,
        direction: VoteDirection,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::record_vote(&conn, post_id, voter_id, direction)
    }

    async fn record_view(
        &self,
        post_id: i64,
        viewer_id: Option<i64>,
        viewed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::record_view(&conn, post_id, viewer_id, viewed_at)
    }

    async fn record_comment(&self, post_id: i64, author_id: i64, content: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::record_comment(&conn, post_id, author_id, content)
    }

    async fn record_like(&self, post_id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::record_like(&conn, post_id, user_id)
    }

    async fn record_bookmark(&self, post_id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::record_bookmark(&conn, post_id, user_id)
    }

    async fn count_published_posts(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::count_published_posts(&conn)
    }

    async fn feature_top_posts(&self, k: usize, counting: ViewCounting) -> Result<FeaturePass> {
        let mut conn = self.conn.lock().await;
        queries::feature_top_posts(&mut conn, k, counting)
    }

    async fn get_featured_posts(&self, counting: ViewCounting) -> Result<Vec<PostEngagement>> {
        let conn = self.conn.lock().await;
        let mut posts = queries::get_post_engagement(&conn, counting, true)?;
        ranking::rank_posts(&mut posts);
        Ok(posts)
    }

    async fn get_user_engagement(
        &self,
        user_id: i64,
        options: &CountOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<EngagementCounts>> {
        let conn = self.conn.lock().await;
        queries::get_user_engagement(&conn, user_id, options, now)
    }

    async fn insert_notification(
        &self,
        user_id: i64,
        notification: &Notification,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::insert_notification(&conn, user_id, notification)
    }

    async fn get_notifications(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>> {
        let conn = self.conn.lock().await;
        queries::get_notifications(&conn, user_id, limit)
    }

    async fn get_job_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        queries::get_job_state(&conn, key)
    }

    async fn set_job_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::set_job_state(&conn, key, value)
    }
}
