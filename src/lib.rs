// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod macros;

pub mod alerts;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod supervisor;
pub mod tasks;
pub mod worker;

pub use error::{FeedError, Result};
