// Notifications raised by the ranking and reputation jobs.
//
// Payloads are stored as JSON with a `type` tag, so adding a variant is a
// compile error everywhere a message is formatted until it's handled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// One of the user's posts entered the featured set.
    PostFeatured { post_id: i64, title: String },
    /// One of the user's posts left the featured set.
    PostUnfeatured { post_id: i64, title: String },
    /// A recompute changed the user's reputation.
    ReputationChanged { old: i64, new: i64 },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::PostFeatured { .. } => "post_featured",
            Notification::PostUnfeatured { .. } => "post_unfeatured",
            Notification::ReputationChanged { .. } => "reputation_changed",
        }
    }

    /// Human-readable message for the notification list.
    pub fn message(&self) -> String {
        match self {
            Notification::PostFeatured { title, .. } => {
                format!("Your post \"{title}\" is now featured")
            }
            Notification::PostUnfeatured { title, .. } => {
                format!("Your post \"{title}\" is no longer featured")
            }
            Notification::ReputationChanged { old, new } => {
                let delta = new - old;
                let sign = if delta >= 0 { "+" } else { "" };
                format!("Your reputation changed from {old} to {new} ({sign}{delta})")
            }
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
