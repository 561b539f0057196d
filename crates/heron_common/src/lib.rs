//! Shared foundation for HeronDB: core identifiers, the schema model,
//! the datum/row codec, the error taxonomy, and engine configuration.

pub mod config;
pub mod datum;
pub mod error;
pub mod schema;
pub mod types;
