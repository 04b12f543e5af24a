//! `droidsync-core` — configuration and shared types for droidsync.
//!
//! The scheduler engine only ever sees an already-validated [`config::SyncConfig`];
//! every cron expression in it has been parsed into a [`cron::CronExpr`].

pub mod config;
pub mod cron;
pub mod error;

pub use config::SyncConfig;
pub use cron::CronExpr;
pub use error::{Result, SyncError};
