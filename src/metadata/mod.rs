//! Route metadata derived from the resolved model: relationship combinations and route sets.

pub mod combination;
pub mod route;

pub use combination::{combinations, Combination};
pub use route::{RouteDescriptor, RouteKind, RouteMethod, RouterMetadata, MAX_RELATIONSHIPS};
