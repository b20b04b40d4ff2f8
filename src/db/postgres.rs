// PgDatabase: PostgreSQL backend implementing the Database trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Key differences from SQLite:
// - TIMESTAMPTZ instead of TEXT for timestamps (rendered with to_char)
// - JSONB for notification payloads
// - $1/$2 parameter syntax (handled by sqlx)
// - GENERATED ALWAYS AS IDENTITY for auto-increment
// - the feature pass takes a transaction-scoped advisory lock, so runs from
//   separate processes serialize instead of interleaving their resets

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{
    CountOptions, EngagementCounts, FeaturePass, NotificationRecord, Post, PostEngagement, User,
    UserReputation, ViewCounting, VoteDirection,
};
use super::traits::Database;
use crate::notify::Notification;
use crate::scoring::ranking;

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

// 0x53504F544C474854 = ASCII "SPOTLGHT" as a big-endian i64.
const MIGRATION_LOCK_KEY: i64 = 0x53504F544C474854;
// 0x4645415455524544 = ASCII "FEATURED".
const FEATURE_LOCK_KEY: i64 = 0x4645415455524544;

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// Acquires a session-level advisory lock so that concurrent processes
    /// (e.g. two app instances starting together) don't race to apply the
    /// same migration. Session locks are bound to the backend session, so the
    /// lock and unlock run on one dedicated connection (`lock_conn`) while the
    /// migrations themselves use the pool. The unlock always runs, even if a
    /// migration fails.
    async fn run_migrations(&self) -> Result<()> {
        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [
                (
                    1,
                    include_str!("../../migrations/postgres/0001_initial.sql"),
                ),
                (
                    2,
                    include_str!("../../migrations/postgres/0002_reactions.sql"),
                ),
                (
                    3,
                    include_str!("../../migrations/postgres/0003_notifications.sql"),
                ),
            ];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // Each file records its own schema_version row, so the
                    // DDL and the version bump commit together.
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql)
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Migration v{version} failed"))?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        // Migration error takes priority over unlock error.
        migration_result?;
        unlock_result?;

        Ok(())
    }
}

/// Rows of `views` that count, per the view counting mode. `$2` is the
/// window start when `windowed`.
fn counted_views_sql(counting: ViewCounting, windowed: bool) -> String {
    let filter = if windowed { " WHERE viewed_at >= $2" } else { "" };
    match counting {
        ViewCounting::All => format!("SELECT post_id FROM views{filter}"),
        ViewCounting::UniqueViewers => format!(
            "SELECT DISTINCT post_id, COALESCE(viewer_id, -id) AS viewer FROM views{filter}"
        ),
    }
}

fn post_engagement_sql(counting: ViewCounting, featured_only: bool) -> String {
    let featured_filter = if featured_only { " AND p.featured" } else { "" };
    format!(
        "SELECT p.id, p.author_id, p.title,
                (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id),
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                COALESCE(vc.n, 0)
         FROM posts p
         LEFT JOIN (
             SELECT post_id, COUNT(*) AS n FROM ({views}) cv GROUP BY post_id
         ) vc ON vc.post_id = p.id
         WHERE p.published{featured_filter}
         ORDER BY p.id",
        views = counted_views_sql(counting, false),
    )
}

fn row_to_engagement(row: &PgRow) -> PostEngagement {
    PostEngagement {
        id: row.get(0),
        author_id: row.get(1),
        title: row.get(2),
        votes: row.get(3),
        comments: row.get(4),
        views: row.get(5),
    }
}

fn row_to_post(row: &PgRow) -> Post {
    Post {
        id: row.get(0),
        author_id: row.get(1),
        title: row.get(2),
        published: row.get(3),
        featured: row.get(4),
        created_at: row.get(5),
    }
}

const POST_COLUMNS: &str = "id, author_id, title, published, featured,
    to_char(created_at, 'YYYY-MM-DD HH24:MI:SS') AS created_at";

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn insert_user(&self, username: &str) -> Result<i64> {
        let row = sqlx_core::query::query(
            "INSERT INTO users (username) VALUES ($1) RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx_core::query::query(
            "SELECT id, username, reputation,
                    to_char(created_at, 'YYYY-MM-DD HH24:MI:SS') AS created_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            id: r.get(0),
            username: r.get(1),
            reputation: r.get(2),
            created_at: r.get(3),
        }))
    }

    async fn list_user_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx_core::query::query("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    async fn set_reputation(&self, user_id: i64, reputation: i64) -> Result<bool> {
        let result = sqlx_core::query::query("UPDATE users SET reputation = $2 WHERE id = $1")
            .bind(user_id)
            .bind(reputation)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_leaderboard(&self, limit: u32) -> Result<Vec<UserReputation>> {
        let rows = sqlx_core::query::query(
            "SELECT id, username, reputation FROM users
             ORDER BY reputation DESC, id ASC
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| UserReputation {
                user_id: r.get(0),
                username: r.get(1),
                reputation: r.get(2),
            })
            .collect())
    }

    async fn insert_post(&self, author_id: i64, title: &str, published: bool) -> Result<i64> {
        let row = sqlx_core::query::query(
            "INSERT INTO posts (author_id, title, published) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(author_id)
        .bind(title)
        .bind(published)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx_core::query::query(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_post))
    }

    async fn record_vote(
        &self,
        post_id: i64,
        voter_id: i64,
        direction: VoteDirection,
    ) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO votes (post_id, voter_id, direction, created_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT(post_id, voter_id) DO UPDATE SET direction = $3, created_at = NOW()",
        )
        .bind(post_id)
        .bind(voter_id)
        .bind(direction.as_i64() as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_view(
        &self,
        post_id: i64,
        viewer_id: Option<i64>,
        viewed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO views (post_id, viewer_id, viewed_at) VALUES ($1, $2, $3)",
        )
        .bind(post_id)
        .bind(viewer_id)
        .bind(viewed_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_comment(&self, post_id: i64, author_id: i64, content: &str) -> Result<i64> {
        let row = sqlx_core::query::query(
            "INSERT INTO comments (post_id, author_id, content) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn record_like(&self, post_id: i64, user_id: i64) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_bookmark(&self, post_id: i64, user_id: i64) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO bookmarks (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_published_posts(&self) -> Result<i64> {
        let row = sqlx_core::query::query("SELECT COUNT(*) FROM posts WHERE published")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn feature_top_posts(&self, k: usize, counting: ViewCounting) -> Result<FeaturePass> {
        let mut tx = self.pool.begin().await?;

        // Released automatically at commit/rollback.
        sqlx_core::query::query("SELECT pg_advisory_xact_lock($1)")
            .bind(FEATURE_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .context("Failed to acquire feature advisory lock")?;

        let previous_sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE featured ORDER BY id");
        let previously_featured: Vec<Post> = sqlx_core::query::query(&previous_sql)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(row_to_post)
            .collect();

        sqlx_core::query::query("UPDATE posts SET featured = FALSE WHERE featured")
            .execute(&mut *tx)
            .await?;

        let candidates_sql = post_engagement_sql(counting, false);
        let candidates: Vec<PostEngagement> = sqlx_core::query::query(&candidates_sql)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(row_to_engagement)
            .collect();

        let featured = ranking::select_featured(candidates, k);

        if !featured.is_empty() {
            let ids: Vec<i64> = featured.iter().map(|p| p.id).collect();
            sqlx_core::query::query("UPDATE posts SET featured = TRUE WHERE id = ANY($1)")
                .bind(ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(FeaturePass {
            featured,
            previously_featured,
        })
    }

    async fn get_featured_posts(&self, counting: ViewCounting) -> Result<Vec<PostEngagement>> {
        let sql = post_engagement_sql(counting, true);
        let mut posts: Vec<PostEngagement> = sqlx_core::query::query(&sql)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_engagement)
            .collect();
        ranking::rank_posts(&mut posts);
        Ok(posts)
    }

    async fn get_user_engagement(
        &self,
        user_id: i64,
        options: &CountOptions,
        now: DateTime<Utc>,
    ) -> Result<Option<EngagementCounts>> {
        // No row at all when the user doesn't exist
        let sql = format!(
            "SELECT
                (SELECT COUNT(*) FROM posts WHERE author_id = $1 AND published),
                (SELECT COUNT(*) FROM ({all_views}) cv
                    JOIN posts p ON p.id = cv.post_id
                    WHERE p.author_id = $1 AND p.published),
                (SELECT COUNT(*) FROM likes l JOIN posts p ON p.id = l.post_id
                    WHERE p.author_id = $1 AND p.published),
                (SELECT COUNT(*) FROM bookmarks b JOIN posts p ON p.id = b.post_id
                    WHERE p.author_id = $1 AND p.published),
                (SELECT COUNT(*) FROM comments c JOIN posts p ON p.id = c.post_id
                    WHERE p.author_id = $1 AND p.published),
                (SELECT COUNT(*) FROM votes v JOIN posts p ON p.id = v.post_id
                    WHERE p.author_id = $1 AND p.published AND v.direction = 1),
                (SELECT COUNT(*) FROM votes v JOIN posts p ON p.id = v.post_id
                    WHERE p.author_id = $1 AND p.published AND v.direction = -1),
                (SELECT COUNT(*) FROM (
                    SELECT cv.post_id FROM ({window_views}) cv
                    JOIN posts p ON p.id = cv.post_id
                    WHERE p.author_id = $1 AND p.published
                    GROUP BY cv.post_id
                    HAVING COUNT(*) >= $3
                ) trending)
             FROM users WHERE id = $1",
            all_views = counted_views_sql(options.view_counting, false),
            window_views = counted_views_sql(options.view_counting, true),
        );

        let cutoff = options.trending_cutoff(now)?;
        let row = sqlx_core::query::query(&sql)
            .bind(user_id)
            .bind(cutoff)
            .bind(options.trending_min_views)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(EngagementCounts {
            posts: row.get(0),
            views: row.get(1),
            likes: row.get(2),
            saves: row.get(3),
            comments: row.get(4),
            upvotes: row.get(5),
            downvotes: row.get(6),
            trending_posts: row.get(7),
        }))
    }

    async fn insert_notification(
        &self,
        user_id: i64,
        notification: &Notification,
    ) -> Result<i64> {
        let payload = serde_json::to_value(notification)?;
        let row = sqlx_core::query::query(
            "INSERT INTO notifications (user_id, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn get_notifications(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx_core::query::query(
            "SELECT id, user_id, payload, read,
                    to_char(created_at, 'YYYY-MM-DD HH24:MI:SS') AS created_at
             FROM notifications
             WHERE user_id = $1
             ORDER BY id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::new();
        for row in rows {
            let payload: serde_json::Value = row.get(2);
            records.push(NotificationRecord {
                id: row.get(0),
                user_id: row.get(1),
                notification: serde_json::from_value(payload)?,
                read: row.get(3),
                created_at: row.get(4),
            });
        }
        Ok(records)
    }

    async fn get_job_state(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx_core::query::query("SELECT value FROM job_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set_job_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO job_state (key, value, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT(key) DO UPDATE SET value = $2, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
