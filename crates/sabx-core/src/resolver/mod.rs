//! Connection resolution
//!
//! This module provides a single entry point for turning overrides, the
//! environment and the stored profiles into the endpoint and secret every
//! authenticated request needs.

mod connection_resolver;
mod error;

pub use connection_resolver::{
    ConnectionOverrides, ConnectionResolver, ResolvedConnection, ValueSource,
};
pub use error::{MissingField, ResolveError, ResolveResult};
