//! Asset Risk Predictor
//!
//! Trains failure classifiers from labelled sensor CSV uploads and scores
//! the latest reading of each asset into normal, warning or critical risk.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod state;

pub use error::{AppError, Result};
