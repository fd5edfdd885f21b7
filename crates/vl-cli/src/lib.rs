//! Voice log CLI library.
//!
//! This crate wires configuration, event sources and stores to the
//! reconciler in `vl-core`.

pub mod backend;
mod cli;
pub mod commands;
mod config;
pub mod source;

pub use cli::{Cli, Commands};
pub use config::{Backend, Config, ConfigError, CredentialSource};
