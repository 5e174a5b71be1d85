//! Compressing responses.

use std::io;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use flate2::Compression;
use flate2::write::GzEncoder;
use hyper::StatusCode;
use hyper::body::{Body, Bytes, Frame};
use hyper::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, HeaderValue, VARY,
};
use mime_guess::Mime;
use pin_project_lite::pin_project;
use super::request::Request;
use super::response::Response;


/// Responses smaller than this aren’t worth compressing.
const MIN_SIZE: u64 = 256;


//------------ gzip ----------------------------------------------------------

/// Compresses the response if that is possible and worthwhile.
pub fn gzip(req: &Request, mut response: Response) -> Response {
    if !is_compressible(&response) {
        return response
    }
    let headers = response.headers_mut();
    headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
    let accepted = req.headers().get_all(ACCEPT_ENCODING).iter().any(|value| {
        value.to_str().ok().and_then(|value| {
            accepts_encoding(value, "gzip")
        }).is_some()
    });
    if !accepted || is_small(&response) {
        return response
    }
    let headers = response.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.remove(ACCEPT_RANGES);
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    response.map_body(GzipBody::new)
}

/// Returns whether the response could be compressed at all.
fn is_compressible(response: &Response) -> bool {
    if matches!(
        response.status(),
        StatusCode::NO_CONTENT | StatusCode::PARTIAL_CONTENT
            | StatusCode::NOT_MODIFIED
    ) || response.status().is_informational() {
        return false
    }
    if response.headers().contains_key(CONTENT_ENCODING) {
        return false
    }
    response.headers().get(CONTENT_TYPE).and_then(|value| {
        value.to_str().ok()
    }).and_then(|value| {
        value.parse::<Mime>().ok()
    }).map(|mime| is_compressible_mime(&mime)).unwrap_or(false)
}

/// Returns whether the response body is known to be too small.
fn is_small(response: &Response) -> bool {
    let len = response.headers().get(CONTENT_LENGTH).and_then(|value| {
        value.to_str().ok()?.parse::<u64>().ok()
    }).or_else(|| response.body().size_hint().exact());
    matches!(len, Some(len) if len < MIN_SIZE)
}

/// Checks if a MIME type is text-based or a common web format.
fn is_compressible_mime(mime: &Mime) -> bool {
    let subtype = mime.subtype().as_str();
    match mime.type_().as_str() {
        "text" => true,
        "application" => {
            matches!(
                subtype,
                "json" | "javascript" | "x-javascript" | "xml" | "xhtml"
                | "rss" | "atom" | "x-www-form-urlencoded" | "wasm"
            ) || mime.suffix().is_some_and(|suffix| {
                suffix == "xml" || suffix == "json"
            })
        }
        "image" => subtype == "svg",
        _ => false
    }
}

/// Returns the quality value of an encoding in an Accept-Encoding value.
///
/// Returns `None` if the encoding is not acceptable.
fn accepts_encoding(accept_encoding: &str, name: &str) -> Option<f32> {
    let mut wildcard = None;
    for part in accept_encoding.split(',') {
        let mut items = part.split(';');
        let encoding = items.next().unwrap_or("").trim();
        let quality = items.find_map(|item| {
            item.trim().strip_prefix("q=")?.trim().parse::<f32>().ok()
        }).unwrap_or(1.);
        if encoding.eq_ignore_ascii_case(name) {
            return (quality > 0.).then_some(quality)
        }
        if encoding == "*" {
            wildcard = Some(quality)
        }
    }
    wildcard.filter(|quality| *quality > 0.)
}


//------------ GzipBody ------------------------------------------------------

pin_project! {
    /// A body that gzips another body on the fly.
    pub struct GzipBody<B> {
        #[pin]
        inner: B,

        // Taken when the inner body has ended.
        encoder: Option<GzEncoder<Vec<u8>>>,
    }
}

impl<B> GzipBody<B> {
    pub fn new(inner: B) -> Self {
        GzipBody {
            inner,
            encoder: Some(GzEncoder::new(Vec::new(), Compression::default())),
        }
    }
}

impl<B> Body for GzipBody<B>
where B: Body<Data = Bytes, Error = io::Error> {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        let mut this = self.project();
        loop {
            let encoder = match this.encoder.as_mut() {
                Some(encoder) => encoder,
                None => return Poll::Ready(None)
            };
            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // Trailers are dropped.
                    let data = match frame.into_data() {
                        Ok(data) => data,
                        Err(_) => continue
                    };
                    encoder.write_all(&data)?;
                    let out = std::mem::take(encoder.get_mut());
                    if !out.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(out.into()))))
                    }
                }
                Some(Err(err)) => {
                    this.encoder.take();
                    return Poll::Ready(Some(Err(err)))
                }
                None => {
                    let out = match this.encoder.take() {
                        Some(encoder) => encoder.finish()?,
                        None => return Poll::Ready(None)
                    };
                    return Poll::Ready(Some(Ok(Frame::data(out.into()))))
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.encoder.is_none()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;
    use flate2::read::GzDecoder;
    use http_body_util::BodyExt;
    use hyper::Method;
    use crate::http::request::test::request;
    use crate::http::response::{ContentType, ResponseBuilder};

    fn text(len: usize) -> String {
        "All work and no play makes Jack a dull boy. ".repeat(len / 44 + 1)
            [..len].to_string()
    }

    async fn body(response: Response) -> Vec<u8> {
        response.into_hyper().into_body().collect().await
            .unwrap().to_bytes().to_vec()
    }

    #[test]
    fn accept_encoding() {
        assert_eq!(accepts_encoding("gzip", "gzip"), Some(1.));
        assert_eq!(accepts_encoding("br, GZIP;q=0.5", "gzip"), Some(0.5));
        assert_eq!(accepts_encoding("gzip;q=0", "gzip"), None);
        assert_eq!(accepts_encoding("*;q=0.1", "gzip"), Some(0.1));
        assert_eq!(accepts_encoding("gzip;q=0, *", "gzip"), None);
        assert_eq!(accepts_encoding("br, deflate", "gzip"), None);
        assert_eq!(accepts_encoding("", "gzip"), None);
    }

    #[test]
    fn compressible_types() {
        let check = |s: &str| is_compressible_mime(&s.parse().unwrap());
        assert!(check("text/html; charset=utf-8"));
        assert!(check("application/json"));
        assert!(check("application/ld+json"));
        assert!(check("image/svg+xml"));
        assert!(!check("image/png"));
        assert!(!check("application/octet-stream"));
        assert!(!check("application/zip"));
    }

    #[tokio::test]
    async fn compresses_text() {
        let content = text(4000);
        let req = request(
            Method::GET, "/", &[("Accept-Encoding", "deflate, gzip")]
        );
        let response = gzip(
            &req,
            ResponseBuilder::ok()
                .content_type(ContentType::HTML)
                .header("Content-Length", "4000")
                .header("Accept-Ranges", "bytes")
                .body(content.clone())
        );
        assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
        assert_eq!(response.headers().get("vary").unwrap(), "Accept-Encoding");
        assert!(response.headers().get("content-length").is_none());
        assert!(response.headers().get("accept-ranges").is_none());
        let compressed = body(response).await;
        assert!(compressed.len() < 4000);
        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, content);
    }

    #[tokio::test]
    async fn leaves_others_alone() {
        let gzip_req = request(
            Method::GET, "/", &[("Accept-Encoding", "gzip")]
        );

        // Client doesn’t accept gzip.
        let response = gzip(
            &request(Method::GET, "/", &[]),
            ResponseBuilder::ok()
                .content_type(ContentType::HTML).body(text(4000))
        );
        assert!(response.headers().get("content-encoding").is_none());
        assert_eq!(response.headers().get("vary").unwrap(), "Accept-Encoding");
        assert_eq!(body(response).await.len(), 4000);

        // Too small.
        let response = gzip(
            &gzip_req,
            ResponseBuilder::ok()
                .content_type(ContentType::HTML).body(text(100))
        );
        assert!(response.headers().get("content-encoding").is_none());

        // Not compressible.
        let response = gzip(
            &gzip_req,
            ResponseBuilder::ok()
                .content_type(ContentType::OCTET_STREAM).body(text(4000))
        );
        assert!(response.headers().get("content-encoding").is_none());
        assert!(response.headers().get("vary").is_none());

        // Partial content.
        let response = gzip(
            &gzip_req,
            ResponseBuilder::new(StatusCode::PARTIAL_CONTENT)
                .content_type(ContentType::HTML).body(text(4000))
        );
        assert!(response.headers().get("content-encoding").is_none());
    }
}
