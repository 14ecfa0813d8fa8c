//! Shared types for the FlashMart sale server
//!
//! Common types used across crates: domain models (product, order, user),
//! broadcast event payloads, and small utility types.

pub mod event;
pub mod models;
pub mod types;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Event re-exports (for convenient access)
pub use event::{SaleEvent, Topic, TopicParseError};

// Model re-exports
pub use models::{Order, OrderStatus, Product, UserProfile};
