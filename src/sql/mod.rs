//! Safe SQL builder: identifiers from declarations only, values as parameters.

mod builder;
pub mod ddl;
pub mod params;
pub use builder::*;
pub(crate) use builder::{qualified_table, quoted};
pub use ddl::{table_defs, TableDef};
pub use params::*;
