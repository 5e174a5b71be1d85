//! Building responses.

use std::io;
use std::borrow::Cow;
use std::path::Path;
use chrono::{DateTime, Utc};
use futures::stream::{Stream, TryStreamExt};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Frame};
use hyper::StatusCode;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::http::response::Builder;
use crate::utils::date::format_http_date;


//------------ ResponseBody --------------------------------------------------

/// The body type of all responses.
///
/// Bodies are boxed since they can be static, read from a file, or
/// compressed on the fly. Reading a file can fail midway, hence the error
/// type.
pub type ResponseBody = BoxBody<Bytes, io::Error>;


//------------ Response ------------------------------------------------------

#[derive(Debug)]
pub struct Response(hyper::Response<ResponseBody>);

impl Response {
    /// Returns a Temporary Redirect response to the given location.
    pub fn temporary_redirect(location: &str) -> Self {
        ResponseBuilder::new(StatusCode::TEMPORARY_REDIRECT)
            .location(location)
            .empty()
    }

    /// Returns a Moved Permanently response pointing to the given location.
    pub fn moved_permanently(location: &str) -> Self {
        ResponseBuilder::new(StatusCode::MOVED_PERMANENTLY)
            .content_type(ContentType::HTML)
            .location(location)
            .body(format!(
                "<a href=\"{}\">Moved Permanently</a>.\n",
                escape_html(location)
            ))
    }

    /// Returns a Not Modified response.
    pub fn not_modified(etag: &str, modified: DateTime<Utc>) -> Self {
        ResponseBuilder::new(
            StatusCode::NOT_MODIFIED
        ).etag(etag).last_modified(modified).empty()
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.0.status()
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        self.0.headers()
    }

    /// Returns a mutable reference to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.0.headers_mut()
    }

    /// Returns a reference to the body.
    pub fn body(&self) -> &ResponseBody {
        self.0.body()
    }

    /// Replaces the body with whatever `op` makes of it.
    pub fn map_body<F, B>(self, op: F) -> Self
    where
        F: FnOnce(ResponseBody) -> B,
        B: Body<Data = Bytes, Error = io::Error> + Send + Sync + 'static
    {
        Response(self.0.map(|body| op(body).boxed()))
    }

    /// Converts the response into a hyper response.
    pub fn into_hyper(self) -> hyper::Response<ResponseBody> {
        self.0
    }
}


//------------ ResponseBuilder ----------------------------------------------

#[derive(Debug)]
pub struct ResponseBuilder {
    builder: Builder,
}

impl ResponseBuilder {
    /// Creates a new builder with the given status.
    pub fn new(status: StatusCode) -> Self {
        ResponseBuilder {
            builder: Builder::new().status(status)
        }
    }

    /// Creates a new builder for a 200 OK response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Adds the content type header.
    pub fn content_type(self, content_type: ContentType) -> Self {
        self.header("Content-Type", content_type.as_str())
    }

    /// Adds the ETag header.
    pub fn etag(self, etag: &str) -> Self {
        self.header("ETag", etag)
    }

    /// Adds the Last-Modified header.
    pub fn last_modified(self, last_modified: DateTime<Utc>) -> Self {
        self.header("Last-Modified", &format_http_date(last_modified))
    }

    /// Adds the Location header.
    pub fn location(self, location: &str) -> Self {
        self.header("Location", location)
    }

    /// Adds an arbitrary header.
    ///
    /// Values that aren’t legal in a header are dropped.
    pub fn header(self, name: &'static str, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => ResponseBuilder {
                builder: self.builder.header(name, value)
            },
            Err(_) => self
        }
    }

    fn finalize<B>(self, body: B) -> Response
    where
        B: Body<Data = Bytes, Error = io::Error> + Send + Sync + 'static
    {
        Response(
            self.builder.body(
                body.boxed()
            ).expect("broken HTTP response builder")
        )
    }

    /// Finalizes the response by adding a body.
    pub fn body(self, body: impl Into<Bytes>) -> Response {
        self.finalize(
            Full::new(body.into()).map_err(|never| match never {})
        )
    }

    /// Finalies the response by adding an empty body.
    pub fn empty(self) -> Response {
        self.finalize(Empty::new().map_err(|never| match never {}))
    }

    /// Finalizes the response with a streaming body.
    pub fn stream<S>(self, body: S) -> Response
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + Sync + 'static
    {
        self.finalize(
            StreamBody::new(body.map_ok(Frame::data))
        )
    }
}


//------------ ContentType ---------------------------------------------------

/// The value of a Content-Type header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentType(Cow<'static, str>);

impl ContentType {
    pub const HTML: ContentType = ContentType(
        Cow::Borrowed("text/html; charset=utf-8")
    );
    pub const OCTET_STREAM: ContentType = ContentType(
        Cow::Borrowed("application/octet-stream")
    );

    /// Determines the content type from a file’s extension.
    ///
    /// Text types get an explicit UTF-8 charset. Returns `None` if the
    /// extension is unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let mime = mime_guess::from_path(path).first()?;
        if mime.type_() == mime_guess::mime::TEXT
            && mime.get_param(mime_guess::mime::CHARSET).is_none()
        {
            Some(ContentType(format!("{}; charset=utf-8", mime).into()))
        }
        else {
            Some(ContentType(mime.to_string().into()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}


//------------ Parsing Etags -------------------------------------------------

/// An iterator over the etags in an If-None-Match header value.
///
/// This does not handle the "*" value.
///
/// One caveat: The iterator stops when it encounters bad formatting which
/// makes this indistinguishable from reaching the end of a correctly
/// formatted value. As a consequence, we will 304 a request that has the
/// right tag followed by garbage.
pub struct EtagsIter<'a>(pub &'a str);

impl<'a> Iterator for EtagsIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip white space and check if we are done.
        self.0 = self.0.trim_start();
        if self.0.is_empty() {
            return None
        }

        // We either have to have a lone DQUOTE or one prefixed by W/
        let prefix_len = if self.0.starts_with('"') {
            1
        }
        else if self.0.starts_with("W/\"") {
            3
        }
        else {
            return None
        };

        // Find the end of the tag which is after the next DQUOTE.
        let end = match self.0[prefix_len..].find('"') {
            Some(index) => index + prefix_len + 1,
            None => return None
        };

        let res = &self.0[0..end];

        // Move past the second DQUOTE and any space.
        self.0 = self.0[end..].trim_start();

        // If we have a comma, skip over that and any space.
        if self.0.starts_with(',') {
            self.0 = self.0[1..].trim_start();
        }

        Some(res)
    }
}

/// Compares two etags using the weak comparison function.
pub fn weak_etag_eq(left: &str, right: &str) -> bool {
    left.trim_start_matches("W/") == right.trim_start_matches("W/")
}


//------------ Escaping ------------------------------------------------------

/// Escapes the characters that are special in HTML text and attributes.
pub fn escape_html(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => res.push_str("&amp;"),
            '<' => res.push_str("&lt;"),
            '>' => res.push_str("&gt;"),
            '"' => res.push_str("&#34;"),
            '\'' => res.push_str("&#39;"),
            _ => res.push(ch),
        }
    }
    res
}


//============ Tests =========================================================
