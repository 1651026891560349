pub mod driver;
pub mod error;
pub mod event_log;
pub mod progress;
pub mod workflow;
