pub mod api;
pub mod cleanup;
pub mod config;
pub mod database;
pub mod flags;
pub mod health;
pub mod issue_tracker;
pub mod metrics;
pub mod router;
pub mod rules;
pub mod scan;
pub mod seed;
pub mod server;
pub mod state;
pub mod utils;
