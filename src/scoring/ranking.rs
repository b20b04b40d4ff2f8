// Engagement ranking: the comparator behind featured posts.
//
// Posts are ordered lexicographically: votes desc, then comments desc, then
// views desc. There is no further tiebreak; the sort is stable, so posts
// with identical counts keep the order storage returned them in (ascending
// id for both backends).

use std::cmp::Ordering;

use crate::db::models::PostEngagement;

/// Default number of posts marked featured per run.
pub const DEFAULT_FEATURED_COUNT: usize = 3;

/// Compare two posts by engagement, greatest first.
pub fn engagement_order(a: &PostEngagement, b: &PostEngagement) -> Ordering {
    b.votes
        .cmp(&a.votes)
        .then_with(|| b.comments.cmp(&a.comments))
        .then_with(|| b.views.cmp(&a.views))
}

/// Sort posts in place, most engaged first.
pub fn rank_posts(posts: &mut [PostEngagement]) {
    posts.sort_by(engagement_order);
}

/// Rank `posts` and keep the first `k`.
///
/// Returns fewer than `k` posts when fewer exist, and an empty vec for
/// empty input or `k == 0`.
pub fn select_featured(mut posts: Vec<PostEngagement>, k: usize) -> Vec<PostEngagement> {
    rank_posts(&mut posts);
    posts.truncate(k);
    posts
}
