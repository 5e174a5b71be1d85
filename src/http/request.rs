//! Request handling.

use std::net::SocketAddr;
use hyper::{Method, Uri};
use hyper::header::HeaderMap;
use hyper::http::request::Parts;


//------------ Request -------------------------------------------------------

/// An incoming request.
///
/// We never look at request bodies, so only the head is kept. Along with
/// it, we keep what we know about the connection the request arrived on.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    peer: SocketAddr,
    tls: bool,
}

impl Request {
    pub fn new(parts: Parts, peer: SocketAddr, tls: bool) -> Self {
        Request { parts, peer, tls }
    }

    /// Creates a request from a hyper request, dropping the body.
    pub fn from_hyper<B>(
        req: hyper::Request<B>, peer: SocketAddr, tls: bool
    ) -> Self {
        Self::new(req.into_parts().0, peer, tls)
    }

    /// Returns the method.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Returns whether the method is GET or HEAD.
    pub fn is_get_or_head(&self) -> bool {
        self.parts.method == Method::GET || self.parts.method == Method::HEAD
    }

    /// Returns whether the method is HEAD.
    pub fn is_head(&self) -> bool {
        self.parts.method == Method::HEAD
    }

    /// Returns the URI of the request.
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Returns the path and query exactly as requested.
    pub fn path_and_query(&self) -> &str {
        self.parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Returns the value of a header if it is present and visible ASCII.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns the host the request was sent to.
    ///
    /// This is the Host header or, for absolute request targets, the
    /// authority of the URI.
    pub fn host(&self) -> &str {
        self.header_str("Host")
            .or_else(|| self.parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// Returns the address of the client.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns whether the request arrived over TLS.
    pub fn is_tls(&self) -> bool {
        self.tls
    }
}


//============ Tests =========================================================

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Creates a request for tests.
    pub fn request(
        method: Method, target: &str, headers: &[(&str, &str)]
    ) -> Request {
        let mut builder = hyper::Request::builder().method(method).uri(target);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        Request::from_hyper(
            builder.body(()).unwrap(),
            "192.0.2.7:50000".parse().unwrap(),
            false
        )
    }

    #[test]
    fn accessors() {
        let req = request(
            Method::HEAD, "/a%20b/?x=1", &[("Host", "example.com:8080")]
        );
        assert!(req.is_get_or_head());
        assert!(req.is_head());
        assert_eq!(req.path_and_query(), "/a%20b/?x=1");
        assert_eq!(req.uri().path(), "/a%20b/");
        assert_eq!(req.host(), "example.com:8080");
        assert_eq!(req.header_str("host"), Some("example.com:8080"));
        assert_eq!(req.peer().port(), 50000);
        assert!(!req.is_tls());

        let req = request(Method::POST, "/", &[]);
        assert!(!req.is_get_or_head());
        assert_eq!(req.host(), "");
    }
}
