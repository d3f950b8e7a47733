//! HTTP handlers for entity routes.

pub mod entity;
pub use entity::*;
