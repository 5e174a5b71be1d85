//! Redirecting plain HTTP requests to HTTPS.

use crate::utils::fmt::WriteOrPanic;
use super::request::Request;
use super::response::Response;


/// Returns a permanent redirect to the same resource via HTTPS.
///
/// The target keeps the host of the request but replaces its port with
/// `tls_port`, which is left out if it is the default port.
pub fn to_https(req: &Request, tls_port: u16) -> Response {
    let mut location = String::from("https://");
    location.push_str(strip_port(req.host()));
    if tls_port != 443 {
        write!(location, ":{}", tls_port);
    }
    location.push_str(req.path_and_query());
    Response::moved_permanently(&location)
}

/// Removes the port from a host value.
///
/// IPv6 addresses keep their brackets.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(pos) => &host[..=pos],
            None => host
        }
    }
    else {
        match host.rsplit_once(':') {
            Some((name, _)) => name,
            None => host
        }
    }
}


//============ Tests =========================================================
