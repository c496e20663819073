//! AutoLabel - ML-assisted image labeling
//!
//! Projects own a fixed label set. Uploaded images are pre-labeled by a
//! zero-shot classifier, corrected by humans, and exported as datasets.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
