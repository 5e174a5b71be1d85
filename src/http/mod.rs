//! The HTTP server.
//!
//! The module provides all functionality of the static file server. The
//! function [`http_listener`] creates all necessary networking services
//! based on the configuration and returns a future that drives the server.
//!
//! [`http_listener`]: fn.http_listener.html

pub use self::listener::http_listener;
pub use self::log::{LayoutError, LogLayout};

mod auth;
mod compress;
mod context;
mod dispatch;
mod errors;
mod files;
mod listener;
mod listing;
mod log;
mod redirect;
mod request;
mod response;
