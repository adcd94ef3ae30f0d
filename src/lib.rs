//! Learning-path analysis over LMS event logs.
//!
//! Loads a CSV export, keeps the tracked event types, counts activity per
//! student and ranks event types by their correlation with final scores.

pub mod analyzer;
pub mod chart;
pub mod demo;
pub mod error;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod scores;
