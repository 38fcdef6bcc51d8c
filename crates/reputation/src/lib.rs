//! Reputation scoring service library.
//!
//! Derives per-user summaries, multi-period leaderboards, and a global daily
//! analytics snapshot from an append-only reputation event log, tolerating
//! concurrent at-least-once event delivery.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
