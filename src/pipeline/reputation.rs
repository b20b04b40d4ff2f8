// Reputation accumulator job: recompute users' reputation from scratch.
//
// A recompute aggregates the user's engagement counts, applies the weighted
// formula and overwrites the stored value. The batch run fans the count
// queries out with a bounded number in flight, then writes sequentially.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::models::CountOptions;
use crate::db::Database;
use crate::notify::Notification;
use crate::scoring::reputation::{compute_reputation, ReputationFloor, ReputationWeights};

pub const LAST_RUN_KEY: &str = "last_reputation_run_at";

/// Everything a recompute needs besides the database.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReputationSettings {
    pub weights: ReputationWeights,
    pub floor: ReputationFloor,
    pub counts: CountOptions,
}

impl From<&crate::config::Config> for ReputationSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            weights: config.weights,
            floor: config.reputation_floor,
            counts: config.count_options(),
        }
    }
}

/// Summary of a batch recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Users considered
    pub users: usize,
    /// Users whose stored reputation changed
    pub updated: usize,
    /// Users whose recompute failed
    pub failed: usize,
}

/// Error returned when the user id doesn't exist.
#[derive(Debug)]
pub struct UserNotFound(pub i64);

impl std::fmt::Display for UserNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "User {} not found", self.0)
    }
}

impl std::error::Error for UserNotFound {}

/// Recompute one user's reputation and persist it.
///
/// Fails with [`UserNotFound`] (downcastable from the anyhow error) for an
/// unknown user id.
pub async fn recompute_user(
    db: &dyn Database,
    user_id: i64,
    settings: &ReputationSettings,
) -> Result<i64> {
    recompute_user_at(db, user_id, settings, Utc::now()).await
}

/// Like [`recompute_user`], with the trending window anchored at `now`.
pub async fn recompute_user_at(
    db: &dyn Database,
    user_id: i64,
    settings: &ReputationSettings,
    now: DateTime<Utc>,
) -> Result<i64> {
    // The user row supplies the previous value; the counts query checks
    // existence within the same statement.
    let user = db.get_user(user_id).await?.ok_or(UserNotFound(user_id))?;
    let counts = db
        .get_user_engagement(user_id, &settings.counts, now)
        .await?
        .ok_or(UserNotFound(user_id))?;

    let reputation = compute_reputation(&counts, &settings.weights, settings.floor);
    store(db, user_id, user.reputation, reputation).await?;

    info!(
        user_id,
        old = user.reputation,
        new = reputation,
        posts = counts.posts,
        trending = counts.trending_posts,
        "Recomputed reputation"
    );
    Ok(reputation)
}

/// Overwrite the stored value and notify the user when it moved.
async fn store(db: &dyn Database, user_id: i64, old: i64, new: i64) -> Result<bool> {
    if !db.set_reputation(user_id, new).await? {
        return Err(UserNotFound(user_id).into());
    }
    if old == new {
        return Ok(false);
    }

    let notification = Notification::ReputationChanged { old, new };
    if let Err(e) = db.insert_notification(user_id, &notification).await {
        warn!(user_id, error = %e, "Failed to store notification, skipping");
    }
    Ok(true)
}

/// Recompute every user's reputation.
///
/// Up to `concurrency` count aggregations are in flight at once. A failure
/// for one user is logged and counted; the rest of the batch continues.
pub async fn recompute_all(
    db: &dyn Database,
    settings: &ReputationSettings,
    concurrency: usize,
) -> Result<BatchOutcome> {
    let user_ids = db.list_user_ids().await?;
    let now = Utc::now();

    let mut outcome = BatchOutcome {
        users: user_ids.len(),
        ..Default::default()
    };
    info!(users = outcome.users, concurrency, "Starting reputation batch");

    let pb = ProgressBar::new(user_ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar().template("  Reputation [{bar:30}] {pos}/{len} ({eta})")?,
    );

    let results: Vec<(i64, Result<Option<(i64, i64)>>)> =
        stream::iter(user_ids.into_iter().map(|user_id| async move {
            let result: Result<Option<(i64, i64)>> = async {
                let Some(user) = db.get_user(user_id).await? else {
                    return Ok(None);
                };
                let counts = db.get_user_engagement(user_id, &settings.counts, now).await?;
                Ok(counts.map(|c| {
                    (
                        user.reputation,
                        compute_reputation(&c, &settings.weights, settings.floor),
                    )
                }))
            }
            .await;
            (user_id, result)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    // Writes go out sequentially
    for (user_id, result) in results {
        match result {
            Ok(Some((old, new))) => match store(db, user_id, old, new).await {
                Ok(true) => outcome.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "Failed to store reputation, skipping");
                    outcome.failed += 1;
                }
            },
            // Deleted between listing and counting
            Ok(None) => {}
            Err(e) => {
                warn!(user_id, error = %e, "Failed to recompute reputation, skipping");
                outcome.failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    db.set_job_state(LAST_RUN_KEY, &Utc::now().to_rfc3339())
        .await?;

    info!(
        users = outcome.users,
        updated = outcome.updated,
        failed = outcome.failed,
        "Reputation batch complete"
    );
    Ok(outcome)
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::models::VoteDirection;
    use crate::db::open_sqlite_in_memory;

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let db = open_sqlite_in_memory().unwrap();
        let err = recompute_user(db.as_ref(), 42, &ReputationSettings::default())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<UserNotFound>().is_some());
    }

    #[tokio::test]
    async fn test_change_notifies_once() {
        let db = open_sqlite_in_memory().unwrap();
        let author = db.insert_user("author").await.unwrap();
        let voter = db.insert_user("voter").await.unwrap();
        let post = db.insert_post(author, "post", true).await.unwrap();
        db.record_vote(post, voter, VoteDirection::Up).await.unwrap();

        let settings = ReputationSettings::default();
        assert_eq!(recompute_user(db.as_ref(), author, &settings).await.unwrap(), 20);
        assert_eq!(recompute_user(db.as_ref(), author, &settings).await.unwrap(), 20);

        let notes = db.get_notifications(author, 10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(
            notes[0].notification,
            Notification::ReputationChanged { old: 0, new: 20 }
        );
    }

    #[tokio::test]
    async fn test_batch_counts_updates() {
        let db = open_sqlite_in_memory().unwrap();
        let author = db.insert_user("author").await.unwrap();
        db.insert_user("lurker").await.unwrap();
        db.insert_post(author, "post", true).await.unwrap();

        let outcome = recompute_all(db.as_ref(), &ReputationSettings::default(), 4)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            BatchOutcome {
                users: 2,
                updated: 1,
                failed: 0
            }
        );
        assert!(db.get_job_state(LAST_RUN_KEY).await.unwrap().is_some());
    }
}
