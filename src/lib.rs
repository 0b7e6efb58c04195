//! Session-based funnel analytics for multi-step lead forms.
//!
//! Tracking calls append immutable events to an append-only log; per-form
//! funnel statistics are derived from that log and never edited by hand.

pub mod config;
pub mod demo;
pub mod error;
pub mod forms;
pub mod models;
pub mod projections;
pub mod service;
pub mod session;
pub mod store;

pub use error::{AnalyticsError, Result};
pub use service::AnalyticsService;
