//! License controller library.
//!
//! This crate primarily ships a `license-controller` binary, but we expose
//! the passes as a library to enable integration testing against an
//! in-memory store.

pub mod cleanup;
pub mod config;
pub mod context;
pub mod error;
pub mod instances;
pub mod license;
pub mod notify;
pub mod password;
pub mod prober;
pub mod secrets;

pub use context::Context;
pub use error::{ControllerError, ControllerResult};
