// Database queries: CRUD operations for all tables.
//
// Every SQLite interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{
    CountOptions, EngagementCounts, FeaturePass, NotificationRecord, Post, PostEngagement, User,
    UserReputation, ViewCounting, VoteDirection,
};
use crate::notify::Notification;
use crate::scoring::ranking;

/// Timestamp format shared with SQLite's `datetime('now')`, so stored values
/// compare correctly as strings.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The rows of `views` that count, per the view counting mode.
///
/// Anonymous views (no viewer) can't be attributed, so each one counts once
/// even in unique mode. When `windowed`, only views at or after `?2` count.
fn counted_views_sql(counting: ViewCounting, windowed: bool) -> String {
    let filter = if windowed { " WHERE viewed_at >= ?2" } else { "" };
    match counting {
        ViewCounting::All => format!("SELECT post_id FROM views{filter}"),
        ViewCounting::UniqueViewers => format!(
            "SELECT DISTINCT post_id, COALESCE(viewer_id, -id) AS viewer FROM views{filter}"
        ),
    }
}

// --- Users ---

/// Create a user and return its ID.
pub fn insert_user(conn: &Connection, username: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username) VALUES (?1)",
        params![username],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let mut stmt =
        conn.prepare("SELECT id, username, reputation, created_at FROM users WHERE id = ?1")?;
    let result = stmt
        .query_row(params![user_id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                reputation: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;
    Ok(result)
}

/// All user IDs, ascending.
pub fn list_user_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// Overwrite a user's reputation. Returns false if the user doesn't exist.
pub fn set_reputation(conn: &Connection, user_id: i64, reputation: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE users SET reputation = ?2 WHERE id = ?1",
        params![user_id, reputation],
    )?;
    Ok(updated > 0)
}

/// Users ordered by reputation, highest first.
pub fn get_leaderboard(conn: &Connection, limit: u32) -> Result<Vec<UserReputation>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, reputation FROM users
         ORDER BY reputation DESC, id ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(UserReputation {
            user_id: row.get(0)?,
            username: row.get(1)?,
            reputation: row.get(2)?,
        })
    })?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

// --- Posts and engagement records ---

/// Create a post and return its ID. New posts are never featured.
pub fn insert_post(conn: &Connection, author_id: i64, title: &str, published: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO posts (author_id, title, published) VALUES (?1, ?2, ?3)",
        params![author_id, title, published],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_post(conn: &Connection, post_id: i64) -> Result<Option<Post>> {
    let mut stmt = conn.prepare(
        "SELECT id, author_id, title, published, featured, created_at FROM posts WHERE id = ?1",
    )?;
    let result = stmt
        .query_row(params![post_id], |row| {
            Ok(Post {
                id: row.get(0)?,
                author_id: row.get(1)?,
                title: row.get(2)?,
                published: row.get(3)?,
                featured: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;
    Ok(result)
}

/// Record a vote (upsert: a voter re-voting replaces their direction).
pub fn record_vote(
    conn: &Connection,
    post_id: i64,
    voter_id: i64,
    direction: VoteDirection,
) -> Result<()> {
    conn.execute(
        "INSERT INTO votes (post_id, voter_id, direction, created_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(post_id, voter_id) DO UPDATE SET direction = ?3, created_at = datetime('now')",
        params![post_id, voter_id, direction.as_i64()],
    )?;
    Ok(())
}

/// Record a view. `viewed_at` defaults to now.
pub fn record_view(
    conn: &Connection,
    post_id: i64,
    viewer_id: Option<i64>,
    viewed_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let viewed_at = format_timestamp(viewed_at.unwrap_or_else(Utc::now));
    conn.execute(
        "INSERT INTO views (post_id, viewer_id, viewed_at) VALUES (?1, ?2, ?3)",
        params![post_id, viewer_id, viewed_at],
    )?;
    Ok(())
}

/// Record a comment and return its ID.
pub fn record_comment(conn: &Connection, post_id: i64, author_id: i64, content: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO comments (post_id, author_id, content) VALUES (?1, ?2, ?3)",
        params![post_id, author_id, content],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Record a like. Liking twice is a no-op.
pub fn record_like(conn: &Connection, post_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO likes (post_id, user_id) VALUES (?1, ?2)",
        params![post_id, user_id],
    )?;
    Ok(())
}

/// Record a bookmark. Saving twice is a no-op.
pub fn record_bookmark(conn: &Connection, post_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO bookmarks (post_id, user_id) VALUES (?1, ?2)",
        params![post_id, user_id],
    )?;
    Ok(())
}

pub fn count_published_posts(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE published = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// --- Ranking ---

/// Published posts with their vote/comment/view counts, in storage order
/// (ascending id). Pass `featured_only` to restrict to the featured set.
pub fn get_post_engagement(
    conn: &Connection,
    counting: ViewCounting,
    featured_only: bool,
) -> Result<Vec<PostEngagement>> {
    let featured_filter = if featured_only { " AND p.featured = 1" } else { "" };
    let sql = format!(
        "SELECT p.id, p.author_id, p.title,
                (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id),
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                COALESCE(vc.n, 0)
         FROM posts p
         LEFT JOIN (
             SELECT post_id, COUNT(*) AS n FROM ({views}) GROUP BY post_id
         ) vc ON vc.post_id = p.id
         WHERE p.published = 1{featured_filter}
         ORDER BY p.id",
        views = counted_views_sql(counting, false),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(PostEngagement {
            id: row.get(0)?,
            author_id: row.get(1)?,
            title: row.get(2)?,
            votes: row.get(3)?,
            comments: row.get(4)?,
            views: row.get(5)?,
        })
    })?;

    let mut posts = Vec::new();
    for row in rows {
        posts.push(row?);
    }
    Ok(posts)
}

/// Reset the featured flag everywhere, then feature the top `k` published
/// posts, in one transaction. Readers never see an empty set and a
/// failure leaves the previous set in place.
pub fn feature_top_posts(
    conn: &mut Connection,
    k: usize,
    counting: ViewCounting,
) -> Result<FeaturePass> {
    let tx = conn.transaction()?;

    let previously_featured = {
        let mut stmt = tx.prepare(
            "SELECT id, author_id, title, published, featured, created_at
             FROM posts WHERE featured = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Post {
                id: row.get(0)?,
                author_id: row.get(1)?,
                title: row.get(2)?,
                published: row.get(3)?,
                featured: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        posts
    };

    tx.execute("UPDATE posts SET featured = 0 WHERE featured = 1", [])?;

    let candidates = get_post_engagement(&tx, counting, false)?;
    let featured = ranking::select_featured(candidates, k);

    {
        let mut stmt = tx.prepare("UPDATE posts SET featured = 1 WHERE id = ?1")?;
        for post in &featured {
            stmt.execute(params![post.id])?;
        }
    }

    tx.commit()?;

    Ok(FeaturePass {
        featured,
        previously_featured,
    })
}

// --- Reputation inputs ---

/// Aggregate engagement on a user's published posts.
///
/// Returns `None` if the user doesn't exist. `now` anchors the trending
/// window so callers (and tests) control the clock.
pub fn get_user_engagement(
    conn: &Connection,
    user_id: i64,
    options: &CountOptions,
    now: DateTime<Utc>,
) -> Result<Option<EngagementCounts>> {
    // The posts count doubles as the existence check
    let posts: Option<i64> = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM posts WHERE author_id = ?1 AND published = 1)
             FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(posts) = posts else {
        return Ok(None);
    };

    let count = |sql: &str| -> Result<i64> {
        Ok(conn.query_row(sql, params![user_id], |row| row.get(0))?)
    };

    let views = count(&format!(
        "SELECT COUNT(*) FROM ({}) cv
         JOIN posts p ON p.id = cv.post_id
         WHERE p.author_id = ?1 AND p.published = 1",
        counted_views_sql(options.view_counting, false),
    ))?;

    let likes = count(
        "SELECT COUNT(*) FROM likes l JOIN posts p ON p.id = l.post_id
         WHERE p.author_id = ?1 AND p.published = 1",
    )?;

    let saves = count(
        "SELECT COUNT(*) FROM bookmarks b JOIN posts p ON p.id = b.post_id
         WHERE p.author_id = ?1 AND p.published = 1",
    )?;

    let comments = count(
        "SELECT COUNT(*) FROM comments c JOIN posts p ON p.id = c.post_id
         WHERE p.author_id = ?1 AND p.published = 1",
    )?;

    let upvotes = count(
        "SELECT COUNT(*) FROM votes v JOIN posts p ON p.id = v.post_id
         WHERE p.author_id = ?1 AND p.published = 1 AND v.direction = 1",
    )?;

    let downvotes = count(
        "SELECT COUNT(*) FROM votes v JOIN posts p ON p.id = v.post_id
         WHERE p.author_id = ?1 AND p.published = 1 AND v.direction = -1",
    )?;

    let cutoff = format_timestamp(options.trending_cutoff(now)?);
    let trending_posts: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM (
                 SELECT cv.post_id FROM ({}) cv
                 JOIN posts p ON p.id = cv.post_id
                 WHERE p.author_id = ?1 AND p.published = 1
                 GROUP BY cv.post_id
                 HAVING COUNT(*) >= ?3
             )",
            counted_views_sql(options.view_counting, true),
        ),
        params![user_id, cutoff, options.trending_min_views],
        |row| row.get(0),
    )?;

    Ok(Some(EngagementCounts {
        posts,
        views,
        likes,
        saves,
        comments,
        upvotes,
        downvotes,
        trending_posts,
    }))
}

// --- Notifications ---

pub fn insert_notification(
    conn: &Connection,
    user_id: i64,
    notification: &Notification,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO notifications (user_id, payload) VALUES (?1, ?2)",
        params![user_id, notification.to_json()?],
    )?;
    Ok(conn.last_insert_rowid())
}

/// A user's notifications, newest first.
pub fn get_notifications(
    conn: &Connection,
    user_id: i64,
    limit: u32,
) -> Result<Vec<NotificationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, payload, read, created_at FROM notifications
         WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, user_id, payload, read, created_at) = row?;
        records.push(NotificationRecord {
            id,
            user_id,
            notification: Notification::from_json(&payload)?,
            read,
            created_at,
        });
    }
    Ok(records)
}

// --- Job state ---

/// Get a job state value by key (e.g., "last_feature_run_at").
pub fn get_job_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM job_state WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Set a job state value (upsert).
pub fn set_job_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO job_state (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use chrono::Duration;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_vote_upsert_replaces_direction() {
        let conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        let voter = insert_user(&conn, "voter").unwrap();
        let post = insert_post(&conn, author, "p", true).unwrap();

        record_vote(&conn, post, voter, VoteDirection::Up).unwrap();
        record_vote(&conn, post, voter, VoteDirection::Down).unwrap();

        let counts = get_user_engagement(&conn, author, &CountOptions::default(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(counts.upvotes, 0);
        assert_eq!(counts.downvotes, 1);
    }

    #[test]
    fn test_unique_view_counting() {
        let conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        let reader = insert_user(&conn, "reader").unwrap();
        let post = insert_post(&conn, author, "p", true).unwrap();

        for _ in 0..3 {
            record_view(&conn, post, Some(reader), None).unwrap();
        }
        // Two anonymous views count separately in both modes
        record_view(&conn, post, None, None).unwrap();
        record_view(&conn, post, None, None).unwrap();

        let all = get_post_engagement(&conn, ViewCounting::All, false).unwrap();
        assert_eq!(all[0].views, 5);

        let unique = get_post_engagement(&conn, ViewCounting::UniqueViewers, false).unwrap();
        assert_eq!(unique[0].views, 3);
    }

    #[test]
    fn test_unpublished_posts_excluded_from_engagement() {
        let conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        let draft = insert_post(&conn, author, "draft", false).unwrap();
        record_like(&conn, draft, author).unwrap();

        assert!(get_post_engagement(&conn, ViewCounting::All, false)
            .unwrap()
            .is_empty());
        let counts = get_user_engagement(&conn, author, &CountOptions::default(), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(counts, EngagementCounts::default());
    }

    #[test]
    fn test_feature_pass_resets_previous_set() {
        let mut conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        let voter = insert_user(&conn, "voter").unwrap();
        let a = insert_post(&conn, author, "a", true).unwrap();
        let b = insert_post(&conn, author, "b", true).unwrap();

        record_vote(&conn, a, voter, VoteDirection::Up).unwrap();
        let first = feature_top_posts(&mut conn, 1, ViewCounting::All).unwrap();
        assert_eq!(first.featured[0].id, a);
        assert!(first.previously_featured.is_empty());

        record_vote(&conn, b, voter, VoteDirection::Up).unwrap();
        record_vote(&conn, b, author, VoteDirection::Up).unwrap();
        let second = feature_top_posts(&mut conn, 1, ViewCounting::All).unwrap();
        assert_eq!(second.featured[0].id, b);
        assert_eq!(second.previously_featured[0].id, a);

        assert!(!get_post(&conn, a).unwrap().unwrap().featured);
        assert!(get_post(&conn, b).unwrap().unwrap().featured);
    }

    #[test]
    fn test_trending_window() {
        let conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        let hot = insert_post(&conn, author, "hot", true).unwrap();
        let stale = insert_post(&conn, author, "stale", true).unwrap();
        let now = Utc::now();

        for _ in 0..3 {
            record_view(&conn, hot, None, Some(now - Duration::days(1))).unwrap();
            record_view(&conn, stale, None, Some(now - Duration::days(30))).unwrap();
        }

        let options = CountOptions {
            view_counting: ViewCounting::All,
            trending_window_days: 7,
            trending_min_views: 3,
        };
        let counts = get_user_engagement(&conn, author, &options, now)
            .unwrap()
            .unwrap();
        assert_eq!(counts.views, 6);
        assert_eq!(counts.trending_posts, 1);
    }

    #[test]
    fn test_failed_feature_pass_keeps_previous_set() {
        let mut conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        let voter = insert_user(&conn, "voter").unwrap();
        let a = insert_post(&conn, author, "a", true).unwrap();
        let b = insert_post(&conn, author, "b", true).unwrap();

        record_vote(&conn, a, voter, VoteDirection::Up).unwrap();
        feature_top_posts(&mut conn, 1, ViewCounting::All).unwrap();

        // b overtakes a, but flagging b fails after a's flag was reset
        record_vote(&conn, b, voter, VoteDirection::Up).unwrap();
        record_vote(&conn, b, author, VoteDirection::Up).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER refuse_feature BEFORE UPDATE OF featured ON posts
             WHEN NEW.featured = 1 AND NEW.id = {b}
             BEGIN SELECT RAISE(ABORT, 'refused'); END;"
        ))
        .unwrap();

        assert!(feature_top_posts(&mut conn, 1, ViewCounting::All).is_err());
        assert!(get_post(&conn, a).unwrap().unwrap().featured);
        assert!(!get_post(&conn, b).unwrap().unwrap().featured);
    }

    #[test]
    fn test_oversized_trending_window_errors() {
        let conn = test_conn();
        let author = insert_user(&conn, "author").unwrap();
        insert_post(&conn, author, "p", true).unwrap();

        let options = CountOptions {
            trending_window_days: 200_000_000,
            ..CountOptions::default()
        };
        let err = get_user_engagement(&conn, author, &options, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_unknown_user_engagement_is_none() {
        let conn = test_conn();
        let counts = get_user_engagement(&conn, 42, &CountOptions::default(), Utc::now()).unwrap();
        assert!(counts.is_none());
    }

    #[test]
    fn test_notifications_newest_first() {
        let conn = test_conn();
        let user = insert_user(&conn, "u").unwrap();
        insert_notification(&conn, user, &Notification::ReputationChanged { old: 0, new: 5 })
            .unwrap();
        insert_notification(&conn, user, &Notification::ReputationChanged { old: 5, new: 9 })
            .unwrap();

        let records = get_notifications(&conn, user, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].notification,
            Notification::ReputationChanged { old: 5, new: 9 }
        );
        assert!(!records[0].read);
    }

    #[test]
    fn test_job_state_upsert() {
        let conn = test_conn();
        assert_eq!(get_job_state(&conn, "k").unwrap(), None);
        set_job_state(&conn, "k", "1").unwrap();
        set_job_state(&conn, "k", "2").unwrap();
        assert_eq!(get_job_state(&conn, "k").unwrap(), Some("2".to_string()));
    }
}
