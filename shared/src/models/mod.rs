//! Data models
//!
//! Shared between the sale server and clients. All IDs are `String`
//! (catalog ids are seeded slugs, order ids are UUID v4).

pub mod order;
pub mod product;
pub mod user;

// Re-exports
pub use order::*;
pub use product::*;
pub use user::*;
