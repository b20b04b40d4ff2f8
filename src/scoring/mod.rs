// Scoring: pure functions for engagement ranking and reputation.

pub mod ranking;
pub mod reputation;
