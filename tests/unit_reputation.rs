// Unit tests for the reputation formula.

use spotlight::db::models::EngagementCounts;
use spotlight::scoring::reputation::{
    compute_reputation, weighted_sum, ReputationFloor, ReputationWeights,
};

fn counts() -> EngagementCounts {
    EngagementCounts {
        posts: 2,
        views: 100,
        likes: 10,
        saves: 5,
        comments: 3,
        upvotes: 4,
        downvotes: 1,
        trending_posts: 0,
    }
}

#[test]
fn worked_example_scores_164() {
    let rep = compute_reputation(&counts(), &ReputationWeights::default(), ReputationFloor::None);
    assert_eq!(rep, 164);
}

#[test]
fn no_posts_scores_zero() {
    let rep = compute_reputation(
        &EngagementCounts::default(),
        &ReputationWeights::default(),
        ReputationFloor::None,
    );
    assert_eq!(rep, 0);
}

#[test]
fn trending_posts_add_fifty_each() {
    let mut c = counts();
    c.trending_posts = 2;
    let rep = compute_reputation(&c, &ReputationWeights::default(), ReputationFloor::None);
    assert_eq!(rep, 264);
}

#[test]
fn fractional_views_are_floored() {
    let c = EngagementCounts {
        views: 19,
        ..Default::default()
    };
    // 1.9 -> 1
    assert_eq!(
        compute_reputation(&c, &ReputationWeights::default(), ReputationFloor::None),
        1
    );
}

#[test]
fn exact_tenths_do_not_lose_a_point() {
    let c = EngagementCounts {
        views: 30,
        ..Default::default()
    };
    assert_eq!(
        compute_reputation(&c, &ReputationWeights::default(), ReputationFloor::None),
        3
    );
}

#[test]
fn negative_total_allowed_without_floor() {
    let c = EngagementCounts {
        posts: 1,
        downvotes: 5,
        ..Default::default()
    };
    let weights = ReputationWeights::default();
    assert_eq!(weighted_sum(&c, &weights), -15.0);
    assert_eq!(compute_reputation(&c, &weights, ReputationFloor::None), -15);
    assert_eq!(compute_reputation(&c, &weights, ReputationFloor::Zero), 0);
}

#[test]
fn same_counts_same_reputation() {
    let weights = ReputationWeights::default();
    let first = compute_reputation(&counts(), &weights, ReputationFloor::None);
    let second = compute_reputation(&counts(), &weights, ReputationFloor::None);
    assert_eq!(first, second);
}

#[test]
fn floor_parses_from_env_values() {
    assert_eq!("zero".parse::<ReputationFloor>().unwrap(), ReputationFloor::Zero);
    assert_eq!(" None ".parse::<ReputationFloor>().unwrap(), ReputationFloor::None);
    assert!("clamp".parse::<ReputationFloor>().is_err());
}
