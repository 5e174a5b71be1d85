//! Utility functions related to networking.

use std::net::{IpAddr, SocketAddr, TcpListener as StdListener};
use log::error;
use crate::error::ExitError;


/// Binds a listening socket and prepares it for use with Tokio.
pub fn bind(addr: &SocketAddr) -> Result<StdListener, ExitError> {
    let listener = match StdListener::bind(addr) {
        Ok(listener) => listener,
        Err(err) => {
            error!("Fatal error listening on {}: {}", addr, err);
            return Err(ExitError::Generic);
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        error!("Fatal: error switching {} to nonblocking: {}", addr, err);
        return Err(ExitError::Generic);
    }
    Ok(listener)
}

/// Returns an authority string for the address and port.
///
/// IPv6 addresses are wrapped in brackets.
pub fn host_port(addr: IpAddr, port: u16) -> String {
    SocketAddr::new(addr, port).to_string()
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_host_port() {
        assert_eq!(
            host_port("127.0.0.1".parse().unwrap(), 8080), "127.0.0.1:8080"
        );
        assert_eq!(host_port("::1".parse().unwrap(), 443), "[::1]:443");
    }

    #[test]
    fn bind_ephemeral() {
        let sock = bind(&"127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(sock.local_addr().unwrap().port(), 0);
    }
}
