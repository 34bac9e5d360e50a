//! `moobot-cron`: persistent time-triggered jobs with at-most-once
//! one-shot delivery.
//!
//! # Overview
//!
//! Jobs live in one JSON document (`{version: 1, jobs: [...]}`), rewritten
//! whole via temp-file + rename on every change. The [`engine::CronEngine`]
//! scans the store on startup (overdue one-shots run sequentially,
//! mark-before-run), then polls once a second for due work.
//!
//! # Schedule variants
//!
//! | Variant     | Behaviour                                              |
//! |-------------|--------------------------------------------------------|
//! | `OneShot`   | Single fire at an absolute instant, removed after send |
//! | `Recurring` | Cron expression in an IANA timezone (or local)         |
//!
//! Recurring jobs carry no delivery mark; a tick missed while the process
//! is down is dropped by design; no catch-up storm.

pub mod engine;
pub mod error;
pub mod schedule;
pub mod store;
pub mod types;

pub use engine::{CronEngine, JobRunner};
pub use error::{CronError, Result};
pub use store::CronStore;
pub use types::{CronJob, Schedule};
