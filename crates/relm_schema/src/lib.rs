//! # relm_schema
//!
//! The declaration language for component kinds and system queries.
//!
//! A `.relm` file declares a package, enum types, component kinds (typed
//! fields with defaults) and systems (ordering group, offset and named
//! queries). [`Schema`] merges any number of files into one resolved set of
//! definitions that the runtime registers.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod value;

pub use ast::*;
pub use schema::{Schema, SchemaError};
pub use value::{default_value, validate_value};
