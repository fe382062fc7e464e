//! Core domain types and logic.

pub mod config_validation;
pub mod error;
pub mod evolution;
pub mod frontier;
pub mod metrics;
pub mod optimizer;
pub mod pipeline;
pub mod price_history;
pub mod request;
pub mod return_model;
pub mod universe;
