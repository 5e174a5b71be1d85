//! Ran, a simple static web server.
//!
//! This crate contains all the moving parts of Ran. The application itself,
//! via `main.rs` is only a very tiny frontend.

pub use self::config::{Config, Options};
pub use self::error::{ExitError, Failed};
pub use self::operation::Operation;

pub mod config;
pub mod error;
pub mod http;
pub mod log;
pub mod operation;
pub mod process;
pub mod utils;
