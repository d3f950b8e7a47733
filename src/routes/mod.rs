//! HTTP routers.

mod common;
mod entity;

pub use common::{common_routes, common_routes_with_ready, route_table};
pub use entity::{entity_router, entity_routes};
