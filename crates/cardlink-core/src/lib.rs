//! Core types, the document-store contract, and the four request-path
//! components of cardlink: slug registry, identity linker, engagement
//! tracker, and analytics engine.
//!
//! No HTTP or database dependencies. Storage backends implement
//! [`store::ProfileStore`]; the HTTP layer drives the components.

pub mod account;
pub mod analytics;
pub mod engagement;
pub mod error;
pub mod event;
pub mod identity;
pub mod mapping;
pub mod slug;
pub mod store;
pub mod token;

pub use error::{Error, ErrorKind, Result};
