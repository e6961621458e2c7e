//! HTTP API module.
//!
//! This module provides the HTTP server, the response types and the log
//! broadcaster shared by the CLI and the server.

pub mod server;
pub mod types;
pub mod logs;

pub use server::start_server;
pub use types::*;
pub use logs::*;
