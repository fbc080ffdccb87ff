//! sqlgate-core: the data model shared by the gateway crates.
//!
//! Nothing in here touches the network or a database. The server crate
//! turns these types into pooled queries.

pub mod error;
pub mod param;
pub mod request;
pub mod sanitize;

pub use error::{ParamError, Result, ValidationError, UNKNOWN_METHOD_MESSAGE};
pub use param::ParamValue;
pub use request::{Method, QueryRequest};
pub use sanitize::strip_semicolons;
