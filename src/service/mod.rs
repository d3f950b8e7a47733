//! CrudService: generic CRUD using safe SQL builder.

mod crud;
mod validation;
pub(crate) use crud::page;
pub use crud::{CrudService, DEFAULT_LIMIT, MAX_LIMIT};
pub use validation::RequestValidator;
