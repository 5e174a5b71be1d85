//! Lexical path handling.
//!
//! Nothing in here touches the file system. Paths are treated purely as
//! strings or sequences of components.

use std::path::{Component, Path, PathBuf};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};


//------------ URL Paths -----------------------------------------------------

/// The characters that need escaping in the path of a URL.
///
/// Everything but the unreserved characters and the sub-delimiters that are
/// allowed in a path segment are escaped.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-').remove(b'_').remove(b'.').remove(b'~')
    .remove(b'$').remove(b'&').remove(b'+').remove(b',')
    .remove(b'/').remove(b':').remove(b';').remove(b'=').remove(b'@');

/// Cleans a slash-separated path.
///
/// Repeated slashes are collapsed, `.` segments dropped and `..` segments
/// remove the segment before them. A `..` that would climb above the root of
/// a rooted path is dropped. Trailing slashes are removed except for the
/// root itself. An empty result becomes `"/"` for rooted paths and `"."`
/// otherwise.
pub fn clean_url_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => { }
            ".." => {
                match segments.last() {
                    Some(&"..") | None => {
                        if !rooted {
                            segments.push("..")
                        }
                    }
                    Some(_) => {
                        segments.pop();
                    }
                }
            }
            segment => segments.push(segment)
        }
    }
    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    }
    else if joined.is_empty() {
        String::from(".")
    }
    else {
        joined
    }
}

/// Percent-escapes a path for use in a URL.
pub fn escape_url_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPE).to_string()
}

/// Escapes a relative path for use as a link.
///
/// If the first segment contains a colon, the link would be mistaken for a
/// URL with a scheme, so it is prefixed with `./`.
pub fn escape_relative_link(path: &str) -> String {
    let escaped = escape_url_path(path);
    let first = path.split('/').next().unwrap_or("");
    if !path.starts_with('/') && first.contains(':') {
        format!("./{}", escaped)
    }
    else {
        escaped
    }
}


//------------ File System Paths ---------------------------------------------

/// Lexically normalizes a file system path.
///
/// Removes `.` components and lets `..` components eat the component before
/// them. A `..` directly below the root is dropped.
pub fn normalize(path: &Path) -> PathBuf {
    let mut res = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => { }
            Component::ParentDir => {
                match res.components().next_back() {
                    Some(Component::Normal(_)) => {
                        res.pop();
                    }
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => {
                    }
                    _ => res.push(".."),
                }
            }
            other => res.push(other.as_os_str()),
        }
    }
    if res.as_os_str().is_empty() {
        res.push(".")
    }
    res
}

/// Joins a clean URL path onto a directory.
///
/// The URL path’s segments are appended one by one so that it doesn’t
/// replace the base when it is rooted.
pub fn join_url_path(base: &Path, url_path: &str) -> PathBuf {
    let mut res = base.to_path_buf();
    for segment in url_path.split('/') {
        if !segment.is_empty() {
            res.push(segment)
        }
    }
    res
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clean_paths() {
        assert_eq!(clean_url_path("/"), "/");
        assert_eq!(clean_url_path(""), ".");
        assert_eq!(clean_url_path("//a///b/"), "/a/b");
        assert_eq!(clean_url_path("/a/./b/../c"), "/a/c");
        assert_eq!(clean_url_path("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(clean_url_path("/a/.."), "/");
        assert_eq!(clean_url_path("a/../../b"), "../b");
        assert_eq!(clean_url_path("/.hidden/x"), "/.hidden/x");
    }

    #[test]
    fn escape_paths() {
        assert_eq!(escape_url_path("/a b/c"), "/a%20b/c");
        assert_eq!(escape_url_path("/x?y#z"), "/x%3Fy%23z");
        assert_eq!(escape_url_path("/$&+,:;=@-_.~"), "/$&+,:;=@-_.~");
        assert_eq!(escape_url_path("/ü"), "/%C3%BC");
        assert_eq!(escape_url_path("/100%"), "/100%25");
    }

    #[test]
    fn relative_links() {
        assert_eq!(escape_relative_link("a:b.txt"), "./a:b.txt");
        assert_eq!(escape_relative_link("dir/"), "dir/");
        assert_eq!(escape_relative_link("my file"), "my%20file");
    }

    #[test]
    #[cfg(unix)]
    fn normalize_paths() {
        assert_eq!(normalize(Path::new("/srv/www/../x")), Path::new("/srv/x"));
        assert_eq!(normalize(Path::new("/srv/./www/")), Path::new("/srv/www"));
        assert_eq!(normalize(Path::new("/../..")), Path::new("/"));
        assert_eq!(normalize(Path::new("a/../../b")), Path::new("../b"));
        assert_eq!(
            join_url_path(Path::new("/srv"), "/a/b.html"),
            Path::new("/srv/a/b.html")
        );
        assert_eq!(join_url_path(Path::new("/srv"), "/"), Path::new("/srv"));
    }
}
