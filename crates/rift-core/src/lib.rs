//! Row model, changeset types, errors and ambient configuration shared by
//! every rift crate.

pub mod changeset;
pub mod config;
pub mod conflict;
pub mod error;
pub mod logging;
pub mod schema;
pub mod value;

pub use changeset::*;
pub use config::{Config, ConflictPolicy, TableFilter};
pub use conflict::*;
pub use error::{Error, ErrorKind, Result};
pub use logging::LogLevel;
pub use schema::*;
pub use value::*;
