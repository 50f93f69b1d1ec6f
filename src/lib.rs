// Core modules
pub mod api;
pub mod broker;
pub mod config;
pub mod db;
pub mod execution;
pub mod llm;
pub mod models;
pub mod notify;
pub mod scheduler;

// Re-export commonly used types
pub use config::AppConfig;
pub use models::*;
pub use scheduler::{Scheduler, SchedulerSettings, Services};
