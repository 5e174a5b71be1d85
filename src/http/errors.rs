//! Error responses.

use std::io;
use hyper::StatusCode;
use log::error;
use tokio::fs;
use crate::config::ErrorFile;
use super::response::{ContentType, Response, ResponseBuilder};


/// Returns a minimal HTML page for the given status.
pub fn generic(status: StatusCode) -> Response {
    let status_text = format!(
        "{} {}",
        status.as_u16(), status.canonical_reason().unwrap_or("Unknown")
    );
    ResponseBuilder::new(status)
        .content_type(ContentType::HTML)
        .body(format!(
            "<!DOCTYPE HTML><html><head><meta charset=\"utf-8\">\
             <title>{0}</title></head><body><h1>{0}</h1></body></html>\n",
            status_text
        ))
}

/// Returns a response with the content of a custom error file.
///
/// The content type is derived from the file’s extension, defaulting to
/// HTML.
pub async fn error_file(
    status: StatusCode, file: &ErrorFile,
) -> Result<Response, io::Error> {
    let content = fs::read(&file.abs).await?;
    Ok(
        ResponseBuilder::new(status)
            .content_type(
                ContentType::from_path(&file.abs)
                    .unwrap_or(ContentType::HTML)
            )
            .body(content)
    )
}

/// Returns a response with a custom error file if there is one.
///
/// Falls back to the generic page if there is no file or it can’t be read.
pub async fn custom_or_generic(
    status: StatusCode, file: Option<&ErrorFile>, request_id: &str,
) -> Response {
    let file = match file {
        Some(file) => file,
        None => return generic(status)
    };
    match error_file(status, file).await {
        Ok(response) => response,
        Err(err) => {
            error!(
                "#{}: Load {} file error: {}",
                request_id, status.as_u16(), err
            );
            generic(status)
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;
    use http_body_util::BodyExt;

    async fn body(response: Response) -> String {
        let bytes = response.into_hyper().into_body().collect().await
            .unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn generic_pages() {
        let response = generic(StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            body(response).await,
            "<!DOCTYPE HTML><html><head><meta charset=\"utf-8\">\
             <title>404 Not Found</title></head>\
             <body><h1>404 Not Found</h1></body></html>\n"
        );
        let response = generic(StatusCode::from_u16(599).unwrap());
        assert!(body(response).await.contains("<h1>599 Unknown</h1>"));
    }

    #[tokio::test]
    async fn custom_pages() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("404.txt");
        std::fs::write(&txt, "gone").unwrap();
        let file = ErrorFile { abs: txt, rel: "/404.txt".into() };
        let response = custom_or_generic(
            StatusCode::NOT_FOUND, Some(&file), "id"
        ).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body(response).await, "gone");

        let noext = dir.path().join("oops");
        std::fs::write(&noext, "<p>oops</p>").unwrap();
        let file = ErrorFile { abs: noext, rel: "/oops".into() };
        let response = error_file(
            StatusCode::UNAUTHORIZED, &file
        ).await.unwrap();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn missing_custom_page_falls_back() {
        let file = ErrorFile {
            abs: PathBuf::from("/nonexistent/404.html"),
            rel: "/404.html".into()
        };
        assert!(error_file(StatusCode::NOT_FOUND, &file).await.is_err());
        let response = custom_or_generic(
            StatusCode::NOT_FOUND, Some(&file), "id"
        ).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body(response).await.contains("<h1>404 Not Found</h1>"));
    }
}
