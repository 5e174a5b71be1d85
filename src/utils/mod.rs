//! Various useful things.

pub mod date;
pub mod fatal;
pub mod fmt;
pub mod net;
pub mod path;
pub mod pool;
pub mod sync;
pub mod tls;
