//! Scaffold SDK: model-driven CRUD scaffolding.
//!
//! Entities are declared in a [`ModelRegistry`], resolved into a relationship graph, expanded into
//! per-entity route sets, then either emitted as source artifacts ([`codegen`]) or served directly
//! over PostgreSQL ([`entity_routes`]). The [`state_machine`] module adds a CRUD router whose
//! transition endpoints come from explicitly registered `(from, to)` edges.

pub mod auth;
pub mod case;
pub mod codegen;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod state_machine;
pub mod store;

pub use auth::{BearerToken, Guard, RouteToggle};
pub use codegen::{CodeGenerator, GenerationReport, GeneratorConfig};
pub use config::{load_registry, resolve, EntityDecl, FieldSpec, LinkDeclaration, ModelRegistry, ResolvedModel};
pub use error::{AppError, CodegenError, ConfigError};
pub use metadata::{RouteDescriptor, RouterMetadata};
pub use response::{success_many, success_one, TransitionOutcome};
pub use routes::{common_routes, common_routes_with_ready, entity_router, entity_routes};
pub use service::CrudService;
pub use state::AppState;
pub use state_machine::{Registrar, StateEnum, StateItemRouter, Transition};
pub use store::{ensure_database_exists, ensure_tables};
