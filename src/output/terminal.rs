// Colored terminal output for featured posts, the leaderboard and
// notification lists.
//
// main.rs delegates all table formatting here.

use colored::Colorize;

use crate::db::models::{NotificationRecord, PostEngagement, UserReputation};
use crate::notify::Notification;
use crate::pipeline::featured::FeatureOutcome;
use crate::pipeline::reputation::BatchOutcome;

/// Display the currently featured posts, ranked.
pub fn display_featured(posts: &[PostEngagement]) {
    if posts.is_empty() {
        println!("No featured posts. Run `spotlight feature` to pick some.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Featured Posts ({}) ===", posts.len()).bold()
    );
    println!();

    println!(
        "  {:>4}  {:>6}  {:<40} {:>6} {:>8} {:>7}",
        "Rank".dimmed(),
        "Id".dimmed(),
        "Title".dimmed(),
        "Votes".dimmed(),
        "Comments".dimmed(),
        "Views".dimmed(),
    );
    println!("  {}", "-".repeat(80).dimmed());

    for (i, post) in posts.iter().enumerate() {
        println!(
            "  {:>4}. {:>6}  {:<40} {:>6} {:>8} {:>7}",
            i + 1,
            post.id,
            super::truncate_chars(&post.title, 37),
            post.votes,
            post.comments,
            post.views,
        );
    }
    println!();
}

/// Summarize a ranking run.
pub fn display_feature_outcome(outcome: &FeatureOutcome) {
    if outcome.updated_count == 0 {
        println!("{}", "No published posts; featured set cleared.".yellow());
        return;
    }
    println!(
        "{} {} post(s) featured:",
        "✓".green().bold(),
        outcome.updated_count
    );
    for post in &outcome.posts {
        println!(
            "  #{:<6} votes {:>4}  comments {:>4}  views {:>6}",
            post.id, post.votes, post.comments, post.views
        );
    }
}

/// Summarize a batch reputation run.
pub fn display_batch_outcome(outcome: &BatchOutcome) {
    println!(
        "{} Recomputed {} user(s): {} changed",
        "✓".green().bold(),
        outcome.users,
        outcome.updated
    );
    if outcome.failed > 0 {
        println!("  {} {} failed (see log)", "!".bright_red(), outcome.failed);
    }
}

/// Display users ranked by reputation.
pub fn display_leaderboard(users: &[UserReputation]) {
    if users.is_empty() {
        println!("No users yet.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Leaderboard ({} users) ===", users.len()).bold()
    );
    println!();

    println!(
        "  {:>4}  {:<32} {:>10}",
        "Rank".dimmed(),
        "User".dimmed(),
        "Reputation".dimmed(),
    );
    println!("  {}", "-".repeat(50).dimmed());

    for (i, user) in users.iter().enumerate() {
        println!(
            "  {:>4}. {:<32} {:>10}",
            i + 1,
            super::truncate_chars(&user.username, 29),
            colorize_reputation(user.reputation),
        );
    }
    println!();
}

/// Display a user's notifications, newest first.
pub fn display_notifications(records: &[NotificationRecord]) {
    if records.is_empty() {
        println!("No notifications.");
        return;
    }

    for record in records {
        let marker = if record.read {
            " ".normal()
        } else {
            "•".cyan().bold()
        };
        println!(
            "  {} {}  {}",
            marker,
            record.created_at.dimmed(),
            colorize_notification(&record.notification),
        );
    }
}

fn colorize_notification(notification: &Notification) -> colored::ColoredString {
    let message = notification.message();
    match notification {
        Notification::PostFeatured { .. } => message.green(),
        Notification::PostUnfeatured { .. } => message.yellow(),
        Notification::ReputationChanged { old, new } if new < old => message.red(),
        Notification::ReputationChanged { .. } => message.normal(),
    }
}

/// Colorize a reputation value: negative red, zero dimmed.
fn colorize_reputation(reputation: i64) -> colored::ColoredString {
    let text = reputation.to_string();
    match reputation {
        r if r < 0 => text.red(),
        0 => text.dimmed(),
        r if r >= 1000 => text.bold(),
        _ => text.normal(),
    }
}
