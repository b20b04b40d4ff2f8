// Route handlers, one file per resource.

pub mod cron;
pub mod posts;
pub mod status;
pub mod users;
