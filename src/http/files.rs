//! Serving files.

use std::io;
use std::io::SeekFrom;
use std::path::Path;
use chrono::{DateTime, Utc};
use hyper::StatusCode;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use crate::config::Config;
use crate::utils::date::{parse_http_date, truncated_file_time};
use super::context::RequestContext;
use super::request::Request;
use super::response::{
    ContentType, EtagsIter, Response, ResponseBuilder, weak_etag_eq
};


//------------ serve ---------------------------------------------------------

/// Serves the file of the request context.
///
/// Returns an error if the file can’t be opened or turns out to be a
/// directory.
pub async fn serve(
    req: &Request, ctx: &RequestContext, config: &Config,
) -> Result<Response, io::Error> {
    let mut file = File::open(&ctx.abs_path).await?;
    let meta = file.metadata().await?;
    if meta.is_dir() {
        return Err(io::Error::other("Cannot serve content of a directory"))
    }
    let size = meta.len();

    let validators = if config.no_cache {
        None
    }
    else {
        meta.modified().ok().map(|modified| {
            let modified = truncated_file_time(modified);
            let etag = format!(
                "W/\"{:x}-{:x}\"", size, modified.timestamp().max(0)
            );
            (etag, modified)
        })
    };
    if let Some((ref etag, modified)) = validators {
        if is_not_modified(req, etag, modified) {
            return Ok(Response::not_modified(etag, modified))
        }
    }

    let mut res = ResponseBuilder::ok();
    let range = match req.header_str("Range") {
        Some(value) if if_range_matches(req, validators.as_ref()) => {
            parse_range(value, size)
        }
        _ => ByteRange::Full,
    };
    let (start, len) = match range {
        ByteRange::Full => (0, size),
        ByteRange::Part(start, end) => {
            res = ResponseBuilder::new(StatusCode::PARTIAL_CONTENT).header(
                "Content-Range", &format!("bytes {}-{}/{}", start, end, size)
            );
            (start, end - start + 1)
        }
        ByteRange::Unsatisfiable => {
            return Ok(
                ResponseBuilder::new(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header("Content-Range", &format!("bytes */{}", size))
                    .empty()
            )
        }
    };

    res = res
        .content_type(
            ContentType::from_path(&ctx.abs_path)
                .unwrap_or(ContentType::OCTET_STREAM)
        )
        .header("Accept-Ranges", "bytes")
        .header("Content-Length", &len.to_string());
    if let Some((ref etag, modified)) = validators {
        res = res.etag(etag).last_modified(modified);
    }
    if wants_download(req) {
        if let Some(value) = content_disposition(&ctx.abs_path) {
            res = res.header("Content-Disposition", &value);
        }
    }

    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    Ok(res.stream(ReaderStream::new(file.take(len))))
}

/// Checks the conditional request headers.
///
/// If-None-Match takes precedence over If-Modified-Since.
fn is_not_modified(
    req: &Request, etag: &str, modified: DateTime<Utc>
) -> bool {
    let mut has_none_match = false;
    for value in req.headers().get_all("If-None-Match").iter() {
        has_none_match = true;
        let value = match value.to_str() {
            Ok(value) => value.trim(),
            Err(_) => continue
        };
        if value == "*" || EtagsIter(value).any(|tag| weak_etag_eq(tag, etag)) {
            return true
        }
    }
    if has_none_match {
        return false
    }
    req.header_str("If-Modified-Since").and_then(parse_http_date).is_some_and(
        |since| modified <= since
    )
}

/// Checks whether an If-Range header allows using the Range header.
fn if_range_matches(
    req: &Request, validators: Option<&(String, DateTime<Utc>)>
) -> bool {
    let value = match req.header_str("If-Range") {
        Some(value) => value.trim(),
        None => return true
    };
    let (etag, modified) = match validators {
        Some(validators) => validators,
        None => return false
    };
    if value.starts_with('"') || value.starts_with("W/") {
        // Weak tags never match for If-Range.
        !etag.starts_with("W/") && value == etag
    }
    else {
        parse_http_date(value) == Some(*modified)
    }
}

/// Returns whether the query asks for a download.
fn wants_download(req: &Request) -> bool {
    req.uri().query().is_some_and(|query| {
        form_urlencoded::parse(query.as_bytes()).any(|(key, _)| {
            key == "download"
        })
    })
}

/// Returns the Content-Disposition value for downloading a file.
fn content_disposition(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let fallback: String = name.chars().map(|ch| {
        if ch.is_ascii_graphic() && ch != '"' && ch != '\\' || ch == ' ' {
            ch
        }
        else {
            '_'
        }
    }).collect();
    if fallback == name {
        Some(format!("attachment; filename=\"{}\"", name))
    }
    else {
        Some(format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback, utf8_percent_encode(&name, NON_ALPHANUMERIC)
        ))
    }
}


//------------ ByteRange -----------------------------------------------------

/// The outcome of looking at a Range header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ByteRange {
    /// Send the full file.
    Full,

    /// Send the bytes between the two positions, both inclusive.
    Part(u64, u64),

    /// The range lies outside the file.
    Unsatisfiable,
}

/// Parses the value of a Range header for a file of the given size.
///
/// Only a single range is supported. Anything we don’t understand results
/// in the full file being sent.
fn parse_range(value: &str, size: u64) -> ByteRange {
    let ranges = match value.trim().strip_prefix("bytes=") {
        Some(ranges) if !ranges.contains(',') => ranges,
        _ => return ByteRange::Full
    };
    let (first, last) = match ranges.split_once('-') {
        Some((first, last)) => (first.trim(), last.trim()),
        None => return ByteRange::Full
    };
    if first.is_empty() {
        let suffix = match last.parse::<u64>() {
            Ok(suffix) => suffix,
            Err(_) => return ByteRange::Full
        };
        if suffix == 0 || size == 0 {
            return ByteRange::Unsatisfiable
        }
        return ByteRange::Part(size.saturating_sub(suffix), size - 1)
    }
    let first = match first.parse::<u64>() {
        Ok(first) => first,
        Err(_) => return ByteRange::Full
    };
    let last = if last.is_empty() {
        None
    }
    else {
        match last.parse::<u64>() {
            Ok(last) if last >= first => Some(last),
            _ => return ByteRange::Full
        }
    };
    if first >= size {
        return ByteRange::Unsatisfiable
    }
    ByteRange::Part(first, last.unwrap_or(size - 1).min(size - 1))
}


//============ Tests =========================================================
