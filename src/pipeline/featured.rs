// Engagement ranker job: mark the top-k published posts as featured.
//
// The reset and the new featured set are written by one transactional
// `feature_top_posts` call. Everything after it (author notifications,
// job state) happens once the featured set is committed and cannot undo it.

use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::models::{Post, PostEngagement, ViewCounting};
use crate::db::Database;
use crate::notify::Notification;

pub const LAST_RUN_KEY: &str = "last_feature_run_at";
pub const LAST_COUNT_KEY: &str = "last_feature_count";

/// Outcome of one ranking run, as reported to the trigger caller.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureOutcome {
    /// Posts whose featured flag was set by this run
    pub updated_count: usize,
    pub posts: Vec<FeaturedPost>,
}

/// A featured post as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeaturedPost {
    pub id: i64,
    pub votes: i64,
    pub comments: i64,
    pub views: i64,
}

impl From<&PostEngagement> for FeaturedPost {
    fn from(post: &PostEngagement) -> Self {
        Self {
            id: post.id,
            votes: post.votes,
            comments: post.comments,
            views: post.views,
        }
    }
}

/// Run the ranker: feature the `k` most engaged published posts.
///
/// Zero published posts is not an error; the reset still applies and the
/// outcome reports zero updates.
pub async fn run(db: &dyn Database, k: usize, counting: ViewCounting) -> Result<FeatureOutcome> {
    info!(k, view_counting = counting.as_str(), "Starting feature pass");

    let pass = db.feature_top_posts(k, counting).await?;

    for post in &pass.featured {
        info!(
            post_id = post.id,
            votes = post.votes,
            comments = post.comments,
            views = post.views,
            "Featured post"
        );
    }

    notify_authors(db, &pass.featured, &pass.previously_featured).await;

    let now = Utc::now().to_rfc3339();
    db.set_job_state(LAST_RUN_KEY, &now).await?;
    db.set_job_state(LAST_COUNT_KEY, &pass.featured.len().to_string())
        .await?;

    let outcome = FeatureOutcome {
        updated_count: pass.featured.len(),
        posts: pass.featured.iter().map(FeaturedPost::from).collect(),
    };
    info!(updated = outcome.updated_count, "Feature pass complete");
    Ok(outcome)
}

/// Tell authors about posts entering and leaving the featured set.
///
/// Posts featured both before and after the run are left alone. Failures
/// are logged and skipped.
async fn notify_authors(
    db: &dyn Database,
    featured: &[PostEngagement],
    previously_featured: &[Post],
) {
    let before: HashSet<i64> = previously_featured.iter().map(|p| p.id).collect();
    let after: HashSet<i64> = featured.iter().map(|p| p.id).collect();

    let entered = featured
        .iter()
        .filter(|p| !before.contains(&p.id))
        .map(|p| {
            (
                p.author_id,
                Notification::PostFeatured {
                    post_id: p.id,
                    title: p.title.clone(),
                },
            )
        });
    let left = previously_featured
        .iter()
        .filter(|p| !after.contains(&p.id))
        .map(|p| {
            (
                p.author_id,
                Notification::PostUnfeatured {
                    post_id: p.id,
                    title: p.title.clone(),
                },
            )
        });

    for (user_id, notification) in entered.chain(left) {
        if let Err(e) = db.insert_notification(user_id, &notification).await {
            warn!(
                user_id,
                kind = notification.kind(),
                error = %e,
                "Failed to store notification, skipping"
            );
        }
    }
}
