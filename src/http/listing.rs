//! Directory listings.

use std::io;
use std::time::SystemTime;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use tokio::fs;
use crate::config::Config;
use crate::utils::date::format_listing_date;
use crate::utils::fmt::{HumanSize, WriteOrPanic};
use crate::utils::path::{clean_url_path, escape_relative_link, join_url_path};
use crate::utils::pool::BufferPool;
use super::context::RequestContext;
use super::response::{ContentType, Response, ResponseBuilder, escape_html};


//------------ Templates -----------------------------------------------------

const HEAD: &str = r#"<!DOCTYPE HTML>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="initial-scale=1,width=device-width">
<title>{title}</title>

<style type="text/css">

body {
    background-color:white;
    color: #333333;
}

table {
    border-collapse: collapse;
}

table tr:nth-child(1) {
    background-color: #f0f0f0;
}

table th, table td {
    padding: 8px 10px;
    border:1px #dddddd solid;
    font-size: 14px;
}

table a {
    text-decoration: none;
}

table tr:hover {
    border:1px red solid;
}

table tr > td:nth-child(2), table tr > td:nth-child(3) {
    font-size: 13px;
}

</style>

</head>

<body>
<h1>{title}</h1>
<table>
<tr><th>Name</th><th>Size</th><th>Modification time</th></tr>
"#;

const TAIL: &str = "</table>

</body>
</html>
";


//------------ Entry ---------------------------------------------------------

/// A row of the listing.
#[derive(Clone, Debug)]
struct Entry {
    /// The displayed name. Directories end in a slash.
    name: String,

    /// The escaped link target.
    link: String,

    /// The size or `None` for directories.
    size: Option<u64>,

    modified: Option<SystemTime>,
}


//------------ render --------------------------------------------------------

/// Renders the listing of the directory in `ctx`.
pub async fn render(
    ctx: &RequestContext, config: &Config, pool: &BufferPool,
) -> Result<Response, io::Error> {
    let mut entries = Vec::new();
    let mut dir = fs::read_dir(&ctx.abs_path).await?;
    while let Some(item) = dir.next_entry().await? {
        let meta = match fs::metadata(item.path()).await {
            Ok(meta) => meta,
            Err(_) => item.metadata().await?,
        };
        let mut name = item.file_name().to_string_lossy().into_owned();
        if !config.serve_all && name.starts_with('.') {
            continue
        }
        if config.is_error_file(
            &clean_url_path(&format!("{}/{}", ctx.clean_path, name))
        ) {
            continue
        }
        if meta.is_dir() {
            name.push('/');
        }
        entries.push(Entry {
            link: escape_relative_link(&name),
            size: if meta.is_dir() { None } else { Some(meta.len()) },
            modified: meta.modified().ok(),
            name,
        });
    }
    entries.sort_by(|left, right| left.name.cmp(&right.name));

    if ctx.clean_path != "/" {
        let parent = ctx.parent();
        let decoded = percent_decode_str(&parent).decode_utf8_lossy();
        let meta = fs::metadata(join_url_path(&config.root, &decoded)).await?;
        entries.insert(0, Entry {
            name: "[..]".into(),
            link: parent,
            size: None,
            modified: meta.modified().ok(),
        });
    }

    let title = escape_html(
        ctx.clean_path.trim_end_matches('/').rsplit('/').next()
            .filter(|base| !base.is_empty())
            .unwrap_or("/")
    );

    let mut buf = pool.get();
    buf.push_str(&HEAD.replace("{title}", &title));
    for entry in &entries {
        write!(
            buf,
            "    <tr>\n        <td><a href=\"{}\">{}</a></td>\n",
            escape_html(&entry.link), escape_html(&entry.name)
        );
        match entry.size {
            Some(size) => writeln!(buf, "        <td>{}</td>", HumanSize(size)),
            None => writeln!(buf, "        <td>-</td>"),
        }
        match entry.modified {
            Some(time) => writeln!(
                buf, "        <td>{}</td>", format_listing_date(time)
            ),
            None => writeln!(buf, "        <td></td>"),
        }
        buf.push_str("    </tr>\n");
    }
    buf.push_str(TAIL);

    Ok(
        ResponseBuilder::ok()
            .content_type(ContentType::HTML)
            .body(Bytes::copy_from_slice(buf.as_bytes()))
    )
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use http_body_util::BodyExt;
    use crate::config::Options;

    async fn listing(
        dir: &tempfile::TempDir, path: &str, edit: impl FnOnce(&mut Options)
    ) -> String {
        let mut options = Options::with_root(dir.path().into());
        options.listdir = true;
        edit(&mut options);
        let config = options.validate().unwrap();
        let pool = BufferPool::new(2);
        let ctx = RequestContext::resolve(&config, path, None).await.unwrap();
        assert!(ctx.is_dir);
        let response = render(&ctx, &config, &pool).await.unwrap();
        assert_eq!(pool.idle(), 1);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
        let bytes = response.into_hyper().into_body().collect().await
            .unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub/zdir")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("sub/b.txt"), vec![b'x'; 12_595]).unwrap();
        std::fs::write(root.join("sub/A.txt"), "tiny").unwrap();
        std::fs::write(root.join("sub/a:b.txt"), "colon").unwrap();
        std::fs::write(root.join("sub/<x>.txt"), "angle").unwrap();
        std::fs::write(root.join("sub/.profile"), "dot").unwrap();
        std::fs::write(root.join("404.html"), "missing").unwrap();
        std::fs::write(root.join("c.txt"), "c").unwrap();
        dir
    }

    #[tokio::test]
    async fn sub_directory() {
        let dir = site();
        let html = listing(&dir, "/sub/", |_| { }).await;
        assert!(html.contains("<title>sub</title>"));
        assert!(html.contains("<h1>sub</h1>"));

        let parent = html.find("<a href=\"/\">[..]</a>").unwrap();
        let upper = html.find(">A.txt<").unwrap();
        let colon = html.find("href=\"./a:b.txt\">a:b.txt<").unwrap();
        let large = html.find(">b.txt<").unwrap();
        let zdir = html.find("href=\"zdir/\">zdir/<").unwrap();
        assert!(parent < upper);
        assert!(upper < colon);
        assert!(colon < large);
        assert!(large < zdir);

        assert!(html.contains("href=\"%3Cx%3E.txt\">&lt;x&gt;.txt<"));
        assert!(html.contains("<td>12.3 KB</td>"));
        assert!(html.contains("<td>4 B</td>"));
        assert!(!html.contains(".profile"));
    }

    #[tokio::test]
    async fn root_directory() {
        let dir = site();
        let html = listing(&dir, "/", |options| {
            options.error_404 = Some("/404.html".into());
        }).await;
        assert!(html.contains("<title>/</title>"));
        assert!(!html.contains("[..]"));
        assert!(!html.contains("404.html"));
        assert!(!html.contains(".hidden"));
        assert!(html.contains("href=\"sub/\">sub/</a>"));
        assert!(html.contains("href=\"c.txt\">c.txt</a>"));
    }

    #[tokio::test]
    async fn serve_all_shows_hidden() {
        let dir = site();
        let html = listing(&dir, "/sub/", |options| {
            options.serve_all = true
        }).await;
        assert!(html.contains(">.profile<"));
    }
}
