// Spotlight: engagement ranking and reputation for a content platform
//
// This is the library root. Each module corresponds to a major subsystem:
// storage, the pure scoring rules, the jobs built on them, and the
// surfaces (terminal output, HTTP triggers) that drive the jobs.

pub mod config;
pub mod db;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod scoring;
pub mod status;

#[cfg(feature = "web")]
pub mod web;
