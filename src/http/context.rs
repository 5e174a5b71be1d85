//! Resolving request paths.
//!
//! Before a request can be answered, its path has to be turned into
//! something on disk. The [`RequestContext`] holds the result: the cleaned
//! path, the canonical URL the client should have asked for, and what we
//! found in the file system.

use std::{fmt, io};
use std::path::PathBuf;
use tokio::fs;
use crate::config::Config;
use crate::utils::path::{clean_url_path, escape_url_path, join_url_path};


//------------ RequestContext ------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestContext {
    /// The cleaned request path.
    ///
    /// This always starts with a slash. If the path is a directory with an
    /// index file, it also ends in one.
    pub clean_path: String,

    /// The canonical URL.
    ///
    /// This is the escaped clean path, with a trailing slash for
    /// directories, followed by the query if there was one. Requests for
    /// any other URL are redirected here.
    pub url: String,

    /// The file or directory to serve.
    pub abs_path: PathBuf,

    /// Whether there is something to serve.
    pub exists: bool,

    /// Whether `abs_path` is a directory to be listed.
    pub is_dir: bool,

    /// The path of the index file relative to the root.
    ///
    /// If this is present, `abs_path` points to the index file and `is_dir`
    /// is `false`.
    pub index_path: Option<String>,
}

impl RequestContext {
    /// Resolves a decoded request path.
    ///
    /// The `query` is the raw query string of the request. Errors other
    /// than missing files are returned.
    pub async fn resolve(
        config: &Config, path: &str, query: Option<&str>,
    ) -> Result<Self, io::Error> {
        let mut clean_path = if path.starts_with('/') {
            clean_url_path(path)
        }
        else {
            clean_url_path(&format!("/{}", path))
        };
        let mut abs_path = join_url_path(&config.root, &clean_path);

        let (mut exists, mut is_dir) = match fs::metadata(&abs_path).await {
            Ok(meta) => (true, meta.is_dir()),
            Err(err) if is_not_found(&err) => (false, false),
            Err(err) => return Err(err),
        };

        if !config.serve_all && clean_path.contains("/.") {
            exists = false;
            is_dir = false;
        }

        let mut index_path = None;
        if is_dir {
            for name in &config.index {
                let index = abs_path.join(name);
                match fs::metadata(&index).await {
                    Ok(meta) if meta.is_dir() => continue,
                    Ok(_) => { }
                    Err(err) if is_not_found(&err) => continue,
                    Err(err) => return Err(err),
                }
                is_dir = false;
                index_path = Some(clean_url_path(
                    &format!("{}/{}", clean_path, name)
                ));
                abs_path = index;
                if !clean_path.ends_with('/') {
                    clean_path.push('/');
                }
                break
            }
            if !config.list_dir && index_path.is_none() {
                exists = false;
            }
        }

        let mut url = clean_path.clone();
        if is_dir && !url.ends_with('/') {
            url.push('/');
        }
        let mut url = escape_url_path(&url);
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        Ok(RequestContext {
            clean_path, url, abs_path, exists, is_dir, index_path
        })
    }

    /// Returns the URL of the parent directory.
    ///
    /// The URL is escaped and always ends in a slash.
    pub fn parent(&self) -> String {
        let mut url = self.url.as_str();
        if url == "/" {
            return url.into()
        }
        if let Some(pos) = url.rfind('?') {
            if pos > 0 {
                url = &url[..pos];
            }
        }
        let url = url.strip_suffix('/').unwrap_or(url);
        match url.rfind('/') {
            Some(pos) if pos > 0 => url[..=pos].into(),
            _ => "/".into()
        }
    }
}

/// Returns whether an error means there is nothing at the path.
///
/// A path that runs through a regular file counts as missing, too.
fn is_not_found(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}


//--- Display

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "clean path: {}, url: {}, path: {}, exists: {}, dir: {}, \
             index: {}",
            self.clean_path, self.url, self.abs_path.display(), self.exists,
            self.is_dir, self.index_path.as_deref().unwrap_or("")
        )
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Options;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::create_dir_all(root.join("nested/index.html")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("my dir")).unwrap();
        std::fs::write(root.join("docs/index.htm"), "docs").unwrap();
        std::fs::write(root.join("nested/index.htm"), "nested").unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::write(root.join(".git/config"), "secret").unwrap();
        dir
    }

    fn config(dir: &tempfile::TempDir, edit: impl FnOnce(&mut Options)) -> Config {
        let mut options = Options::with_root(dir.path().into());
        edit(&mut options);
        options.validate().unwrap()
    }

    #[tokio::test]
    async fn plain_file() {
        let dir = site();
        let config = config(&dir, |_| { });
        let ctx = RequestContext::resolve(
            &config, "/a.txt", Some("x=1")
        ).await.unwrap();
        assert_eq!(ctx.clean_path, "/a.txt");
        assert_eq!(ctx.url, "/a.txt?x=1");
        assert!(ctx.exists);
        assert!(!ctx.is_dir);
        assert_eq!(ctx.abs_path, config.root.join("a.txt"));
        assert_eq!(ctx.index_path, None);
    }

    #[tokio::test]
    async fn uncleaned_paths() {
        let dir = site();
        let config = config(&dir, |_| { });
        let ctx = RequestContext::resolve(
            &config, "//docs/./../a.txt", None
        ).await.unwrap();
        assert_eq!(ctx.url, "/a.txt");
        let ctx = RequestContext::resolve(
            &config, "/../../../a.txt", Some("")
        ).await.unwrap();
        assert_eq!(ctx.url, "/a.txt");
        assert!(ctx.exists);
        let ctx = RequestContext::resolve(
            &config, "a.txt", None
        ).await.unwrap();
        assert_eq!(ctx.url, "/a.txt");
    }

    #[tokio::test]
    async fn index_files() {
        let dir = site();
        let config = config(&dir, |_| { });
        let ctx = RequestContext::resolve(&config, "/docs", None).await.unwrap();
        assert_eq!(ctx.clean_path, "/docs/");
        assert_eq!(ctx.url, "/docs/");
        assert!(ctx.exists);
        assert!(!ctx.is_dir);
        assert_eq!(ctx.index_path.as_deref(), Some("/docs/index.htm"));
        assert_eq!(ctx.abs_path, config.root.join("docs").join("index.htm"));

        // A directory named like the first index file is skipped.
        let ctx = RequestContext::resolve(
            &config, "/nested/", None
        ).await.unwrap();
        assert_eq!(ctx.index_path.as_deref(), Some("/nested/index.htm"));

        // The root has no index.
        let ctx = RequestContext::resolve(&config, "/", None).await.unwrap();
        assert!(!ctx.exists);
    }

    #[tokio::test]
    async fn directories_without_index() {
        let dir = site();
        let config = config(&dir, |_| { });
        let ctx = RequestContext::resolve(
            &config, "/empty", None
        ).await.unwrap();
        assert!(!ctx.exists);

        let config = self::config(&dir, |options| options.listdir = true);
        let ctx = RequestContext::resolve(
            &config, "/empty", None
        ).await.unwrap();
        assert!(ctx.exists);
        assert!(ctx.is_dir);
        assert_eq!(ctx.clean_path, "/empty");
        assert_eq!(ctx.url, "/empty/");
    }

    #[tokio::test]
    async fn hidden_paths() {
        let dir = site();
        let config = config(&dir, |options| options.listdir = true);
        let ctx = RequestContext::resolve(
            &config, "/.git/config", None
        ).await.unwrap();
        assert!(!ctx.exists);
        let ctx = RequestContext::resolve(
            &config, "/.git/", None
        ).await.unwrap();
        assert!(!ctx.exists);
        assert!(!ctx.is_dir);

        let config = self::config(&dir, |options| options.serve_all = true);
        let ctx = RequestContext::resolve(
            &config, "/.git/config", None
        ).await.unwrap();
        assert!(ctx.exists);
    }

    #[tokio::test]
    async fn missing_and_through_files() {
        let dir = site();
        let config = config(&dir, |_| { });
        let ctx = RequestContext::resolve(
            &config, "/nope.html", None
        ).await.unwrap();
        assert!(!ctx.exists);
        let ctx = RequestContext::resolve(
            &config, "/a.txt/more", None
        ).await.unwrap();
        assert!(!ctx.exists);
    }

    #[tokio::test]
    async fn escaped_urls() {
        let dir = site();
        let config = config(&dir, |options| options.listdir = true);
        let ctx = RequestContext::resolve(
            &config, "/my dir", Some("a=b%20c")
        ).await.unwrap();
        assert_eq!(ctx.url, "/my%20dir/?a=b%20c");
        assert_eq!(ctx.parent(), "/");
    }

    #[test]
    fn parents() {
        fn parent(url: &str) -> String {
            RequestContext {
                clean_path: String::new(),
                url: url.into(),
                abs_path: PathBuf::new(),
                exists: true,
                is_dir: true,
                index_path: None,
            }.parent()
        }

        assert_eq!(parent("/"), "/");
        assert_eq!(parent("/a/"), "/");
        assert_eq!(parent("/a/b/"), "/a/");
        assert_eq!(parent("/a/b/?x=1"), "/a/");
        assert_eq!(parent("/a%20b/c%3Fd/"), "/a%20b/");
    }
}
