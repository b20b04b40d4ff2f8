// Batch jobs over the content graph. Each job reads engagement through the
// Database trait and writes only the fields it owns.

pub mod featured;
pub mod reputation;
