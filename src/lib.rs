pub mod aggregate;
pub mod analysis_export;
pub mod config;
pub mod error;
pub mod forest;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod state;
pub mod tables;
pub mod training;
pub mod win_prob;
