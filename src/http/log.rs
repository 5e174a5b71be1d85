//! The access log.
//!
//! Each request produces one line in the access log. What goes into the
//! line is determined by a [`LogLayout`]: a string of literal text with
//! embedded two character specifiers introduced by a percent sign.
//!
//! | Specifier | Meaning                                       |
//! |-----------|-----------------------------------------------|
//! | `%%`      | a percent sign                                |
//! | `%i`      | the request ID                                |
//! | `%s`      | the response status code                      |
//! | `%h`      | the Host header                               |
//! | `%a`      | the client IP, plus X-Real-Ip if present       |
//! | `%m`      | the request method                            |
//! | `%l`      | the request URL as received                   |
//! | `%r`      | the Referer header                            |
//! | `%u`      | the User-Agent header                         |
//! | `%n`      | the number of body bytes sent                 |
//! | `%t`      | the response time in milliseconds             |
//! | `%c`      | `gzip` if the response was compressed, else `none` |
//! | `%S`      | the scheme, `http` or `https`                 |
//!
//! The line is written once the response body has been sent completely or
//! was dropped by the connection. This happens in [`LoggedBody`].

use std::{error, fmt};
use std::fmt::Write;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};
use hyper::body::{Body, Bytes, Frame, SizeHint};
use log::info;
use pin_project_lite::pin_project;
use crate::config::Config;


//------------ Presets -------------------------------------------------------

/// The default layout.
const NORMAL: &str = "Access #%i: [Status: %s] [Host: %h] [IP: %a] \
    [Method: %m] [Scheme: %S] [URL: %l] [Referer: %r] [UA: %u] \
    [Size: %n] [Time: %t] [Compression: %c]";

/// A shorter layout without the labels.
const SHORT: &str = "Access #%i: [%s] [%h] [%a] [%m] [%S] [%l] [%r] [%u] \
    [%n] [%t] [%c]";

/// The minimal layout.
const MIN: &str = "Access #%i: [%s] [%a] [%m] [%l] [%n]";


//------------ Field ---------------------------------------------------------

/// A value from the access record that can appear in the log line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Field {
    RequestId,
    Status,
    Host,
    ClientIp,
    Method,
    Url,
    Referer,
    UserAgent,
    Size,
    Time,
    Compression,
    Scheme,
}

impl Field {
    /// Returns the field for a specifier character.
    fn from_char(ch: char) -> Option<Self> {
        match ch {
            'i' => Some(Field::RequestId),
            's' => Some(Field::Status),
            'h' => Some(Field::Host),
            'a' => Some(Field::ClientIp),
            'm' => Some(Field::Method),
            'l' => Some(Field::Url),
            'r' => Some(Field::Referer),
            'u' => Some(Field::UserAgent),
            'n' => Some(Field::Size),
            't' => Some(Field::Time),
            'c' => Some(Field::Compression),
            'S' => Some(Field::Scheme),
            _ => None
        }
    }

    /// Appends the field’s value for `record` to `target`.
    fn write(
        self, record: &AccessRecord, target: &mut String
    ) -> fmt::Result {
        match self {
            Field::RequestId => target.push_str(&record.request_id),
            Field::Status => write!(target, "{}", record.status)?,
            Field::Host => target.push_str(&record.host),
            Field::ClientIp => {
                write!(target, "{}", record.client_ip)?;
                if let Some(real_ip) = record.real_ip.as_ref() {
                    write!(target, " (X-REAL-IP: {})", real_ip)?;
                }
            }
            Field::Method => target.push_str(&record.method),
            Field::Url => target.push_str(&record.url),
            Field::Referer => target.push_str(&record.referer),
            Field::UserAgent => target.push_str(&record.user_agent),
            Field::Size => write!(target, "{}", record.size)?,
            Field::Time => {
                write!(
                    target, "{:.3}ms", record.elapsed.as_secs_f64() * 1000.
                )?;
            }
            Field::Compression => {
                target.push_str(if record.gzip { "gzip" } else { "none" })
            }
            Field::Scheme => {
                target.push_str(if record.tls { "https" } else { "http" })
            }
        }
        Ok(())
    }
}


//------------ LogItem -------------------------------------------------------

/// One element of a compiled layout.
#[derive(Clone, Debug, Eq, PartialEq)]
enum LogItem {
    Literal(String),
    Field(Field),
}


//------------ LogLayout -----------------------------------------------------

/// A compiled access log layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogLayout {
    items: Vec<LogItem>,
    source: String,
}

impl LogLayout {
    /// Creates a layout from a preset name or a layout string.
    ///
    /// The names `normal`, `short`, and `min` select one of the presets.
    /// Anything else is parsed as a layout.
    pub fn from_config(value: &str) -> Result<Self, LayoutError> {
        match value {
            "normal" => Self::parse(NORMAL),
            "short" => Self::parse(SHORT),
            "min" => Self::parse(MIN),
            value => Self::parse(value)
        }
    }

    /// Parses a layout string.
    pub fn parse(source: &str) -> Result<Self, LayoutError> {
        let mut items = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices();
        while let Some((pos, ch)) = chars.next() {
            if ch != '%' {
                literal.push(ch);
                continue
            }
            let field = match chars.next() {
                Some((_, '%')) => {
                    literal.push('%');
                    continue
                }
                Some((_, ch)) => match Field::from_char(ch) {
                    Some(field) => field,
                    None => {
                        return Err(LayoutError {
                            pos, kind: LayoutErrorKind::Unknown(ch)
                        })
                    }
                }
                None => {
                    return Err(LayoutError {
                        pos, kind: LayoutErrorKind::Dangling
                    })
                }
            };
            if !literal.is_empty() {
                items.push(LogItem::Literal(std::mem::take(&mut literal)));
            }
            items.push(LogItem::Field(field));
        }
        if !literal.is_empty() {
            items.push(LogItem::Literal(literal));
        }
        Ok(LogLayout { items, source: source.into() })
    }

    /// Renders the log line for a request.
    pub fn format(&self, record: &AccessRecord) -> String {
        let mut res = String::with_capacity(self.source.len() + 128);
        for item in &self.items {
            match *item {
                LogItem::Literal(ref s) => res.push_str(s),
                LogItem::Field(field) => {
                    // Writing to a string never fails.
                    let _ = field.write(record, &mut res);
                }
            }
        }
        res
    }
}

impl fmt::Display for LogLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.source)
    }
}


//------------ LayoutError ---------------------------------------------------

/// A log layout could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LayoutError {
    /// The byte position of the offending percent sign.
    pos: usize,
    kind: LayoutErrorKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LayoutErrorKind {
    Unknown(char),
    Dangling,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            LayoutErrorKind::Unknown(ch) => {
                write!(
                    f, "unknown specifier '%{}' at position {}", ch, self.pos
                )
            }
            LayoutErrorKind::Dangling => {
                write!(f, "dangling '%' at position {}", self.pos)
            }
        }
    }
}

impl error::Error for LayoutError { }


//------------ AccessRecord --------------------------------------------------

/// Everything the access log needs to know about a request.
#[derive(Clone, Debug)]
pub struct AccessRecord {
    pub request_id: String,
    pub status: u16,
    pub host: String,
    pub client_ip: IpAddr,
    pub real_ip: Option<String>,
    pub method: String,
    pub url: String,
    pub referer: String,
    pub user_agent: String,

    /// The number of body bytes sent.
    pub size: u64,

    /// The time from receiving the request until the body was done.
    pub elapsed: Duration,

    /// Whether the response body was gzip compressed.
    pub gzip: bool,

    /// Whether the request arrived over TLS.
    pub tls: bool,
}


//------------ PendingLog ----------------------------------------------------

/// An access log line waiting to be written.
///
/// The line is written when the value is dropped.
#[derive(Debug)]
struct PendingLog {
    config: Arc<Config>,
    record: AccessRecord,
    start: Instant,
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        self.record.elapsed = self.start.elapsed();
        info!("{}", self.config.log_layout.format(&self.record));
    }
}


//------------ LoggedBody ----------------------------------------------------

pin_project! {
    /// A response body that writes the access log line once it is done.
    ///
    /// The body counts the data bytes that pass through it. The line is
    /// written either when the inner body ends or fails, or when the body
    /// is dropped before that.
    pub struct LoggedBody<B> {
        #[pin]
        inner: B,
        pending: Option<PendingLog>,
    }
}

impl<B> LoggedBody<B> {
    pub fn new(
        inner: B, config: Arc<Config>, record: AccessRecord, start: Instant,
    ) -> Self {
        LoggedBody {
            inner,
            pending: Some(PendingLog { config, record, start })
        }
    }
}

impl<B: Body<Data = Bytes>> Body for LoggedBody<B> {
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let res = ready!(this.inner.poll_frame(cx));
        match res {
            Some(Ok(ref frame)) => {
                if let (Some(data), Some(pending)) = (
                    frame.data_ref(), this.pending.as_mut()
                ) {
                    pending.record.size += data.len() as u64;
                }
            }
            _ => {
                this.pending.take();
            }
        }
        Poll::Ready(res)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}


//============ Tests =========================================================
