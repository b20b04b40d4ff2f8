// System status display: shows DB stats and when each job last ran.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::db::models::ViewCounting;
use crate::db::Database;
use crate::pipeline::{featured, reputation};

/// Job bookkeeping, shared by `spotlight status` and `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub last_feature_run_at: Option<String>,
    pub last_feature_count: Option<i64>,
    pub last_reputation_run_at: Option<String>,
    pub published_posts: i64,
    pub featured_posts: usize,
}

impl JobStatus {
    pub async fn load(db: &dyn Database, counting: ViewCounting) -> Result<Self> {
        Ok(Self {
            last_feature_run_at: db.get_job_state(featured::LAST_RUN_KEY).await?,
            last_feature_count: db
                .get_job_state(featured::LAST_COUNT_KEY)
                .await?
                .and_then(|v| v.parse().ok()),
            last_reputation_run_at: db.get_job_state(reputation::LAST_RUN_KEY).await?,
            published_posts: db.count_published_posts().await?,
            featured_posts: db.get_featured_posts(counting).await?.len(),
        })
    }
}

/// Display system status to the terminal.
///
/// `db_display_path` is the SQLite file path, or a redacted connection URL
/// when `is_file` is false.
pub async fn show(
    db: &Arc<dyn Database>,
    db_display_path: &str,
    is_file: bool,
    counting: ViewCounting,
) -> Result<()> {
    if is_file {
        if !Path::new(db_display_path).exists() {
            println!("Database: not initialized");
            println!("\nRun `spotlight init` to set up the database.");
            return Ok(());
        }
        let file_size = std::fs::metadata(db_display_path)
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|_| "unknown".to_string());
        println!("Database: {} ({})", db_display_path, file_size);
    } else {
        println!("Database: {}", db_display_path);
    }

    let status = JobStatus::load(db.as_ref(), counting).await?;
    println!(
        "Posts: {} published, {} featured",
        status.published_posts, status.featured_posts
    );

    match (&status.last_feature_run_at, status.last_feature_count) {
        (Some(at), Some(count)) => println!("Last feature run: {} ({} featured)", at, count),
        (Some(at), None) => println!("Last feature run: {}", at),
        (None, _) => {
            println!("Last feature run: never");
            println!("  Run `spotlight feature` to pick featured posts");
        }
    }

    match &status.last_reputation_run_at {
        Some(at) => println!("Last reputation run: {}", at),
        None => {
            println!("Last reputation run: never");
            println!("  Run `spotlight reputation --all` to compute reputations");
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
