//! Chat Tracker - token accounting and message statistics for chat hosts
//!
//! This library keeps a live estimate of how many prompt tokens the current
//! conversation costs, drawn from intercepted generation traffic and the
//! host's own tokenizer, and renders it against a user-set limit.

pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod host;
pub mod intercept;
pub mod observer;
pub mod stats;
pub mod storage;
pub mod tokens;
pub mod tracker;
pub mod ui;

pub use error::{Error, Result};
pub use tokens::{Provenance, TokenEstimate};
pub use tracker::Tracker;
