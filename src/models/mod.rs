//! Data models for AutoLabel.
//!
//! Types shared between the inference, labeling and API layers.

mod prediction;

pub use prediction::*;

use uuid::Uuid;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
