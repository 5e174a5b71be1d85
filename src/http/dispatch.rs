//! Rules on how to dispatch a request.
//!
//! Every request passes through the same layers. From the outside in:
//! the access log, the request ID, authentication, the method check,
//! compression, and finally the handler that maps the request path to a
//! file, a directory listing, a redirect, or an error page. Only responses
//! of that handler receive the cache, CORS, and secure context headers.

use std::sync::Arc;
use std::time::Instant;
use http_body_util::{BodyExt, Empty};
use hyper::{Method, StatusCode};
use hyper::header::{
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW,
    CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, EXPIRES, HeaderMap,
    HeaderName, HeaderValue, PRAGMA, REFERER, USER_AGENT,
};
use hyper::body::{Body, Bytes};
use log::{debug, error};
use percent_encoding::percent_decode_str;
use rand::Rng;
use rand::distributions::Alphanumeric;
use crate::config::Config;
use crate::utils::pool::BufferPool;
use super::{compress, errors, files, listing, redirect};
use super::auth::Authenticator;
use super::context::RequestContext;
use super::log::{AccessRecord, LoggedBody};
use super::request::Request;
use super::response::{Response, ResponseBuilder};


/// The methods we answer.
const ALLOWED_METHODS: &str = "GET, HEAD";

/// The methods announced to CORS preflight requests.
const CORS_METHODS: &str = "GET, HEAD, OPTIONS";

/// The length of a request ID.
const REQUEST_ID_LEN: usize = 12;


//------------ State ---------------------------------------------------------

/// Everything needed to answer requests.
///
/// There is one state for the whole process, shared by all listeners.
#[derive(Debug)]
pub struct State {
    config: Arc<Config>,
    pool: BufferPool,
    auth: Option<Authenticator>,
}

impl State {
    pub fn new(config: Arc<Config>) -> Self {
        State {
            auth: Authenticator::from_config(&config),
            pool: BufferPool::default(),
            config,
        }
    }

    /// Answers a request with the full pipeline.
    pub async fn handle_request(&self, req: Request) -> Response {
        let start = Instant::now();
        let request_id = request_id();
        let response = match self.authenticate(&req, &request_id).await {
            Some(response) => response,
            None => match self.check_method(&req) {
                Some(response) => response,
                None => {
                    let mut response = self.handle_path(
                        &req, &request_id
                    ).await;
                    self.add_policy_headers(response.headers_mut());
                    if self.config.gzip {
                        compress::gzip(&req, response)
                    }
                    else {
                        response
                    }
                }
            }
        };
        self.finish(&req, request_id, start, response)
    }

    /// Answers a request by redirecting it to HTTPS.
    pub fn redirect_request(&self, req: Request, tls_port: u16) -> Response {
        let start = Instant::now();
        let request_id = request_id();
        let response = redirect::to_https(&req, tls_port);
        self.finish(&req, request_id, start, response)
    }

    async fn authenticate(
        &self, req: &Request, request_id: &str
    ) -> Option<Response> {
        self.auth.as_ref()?.check(req, &self.config, request_id).await
    }

    /// Answers requests with methods other than GET and HEAD.
    fn check_method(&self, req: &Request) -> Option<Response> {
        if req.is_get_or_head() {
            return None
        }
        if *req.method() == Method::OPTIONS && self.config.cors {
            let mut response = ResponseBuilder::new(StatusCode::NO_CONTENT)
                .header("Allow", CORS_METHODS)
                .empty();
            add_cors_headers(response.headers_mut());
            return Some(response)
        }
        let mut response = errors::generic(StatusCode::METHOD_NOT_ALLOWED);
        response.headers_mut().insert(
            ALLOW, HeaderValue::from_static(ALLOWED_METHODS)
        );
        Some(response)
    }

    /// Maps the request path to a response.
    async fn handle_path(&self, req: &Request, request_id: &str) -> Response {
        debug!("#{}: r.URL: [{}]", request_id, req.path_and_query());

        let path = match percent_decode_str(req.uri().path()).decode_utf8() {
            Ok(path) => path,
            Err(_) => {
                debug!("#{}: Request path is not valid UTF-8.", request_id);
                return errors::generic(StatusCode::BAD_REQUEST)
            }
        };
        let ctx = match RequestContext::resolve(
            &self.config, &path, req.uri().query()
        ).await {
            Ok(ctx) => ctx,
            Err(err) => {
                error!("#{}: {}", request_id, err);
                return errors::generic(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        debug!("#{}: Context: [{}]", request_id, ctx);

        if ctx.url != req.path_and_query() {
            return Response::temporary_redirect(&ctx.url)
        }
        if !ctx.exists {
            return errors::custom_or_generic(
                StatusCode::NOT_FOUND, self.config.error_404.as_ref(),
                request_id
            ).await
        }

        // An index file is served as a regular file, so `is_dir` is only
        // true when listing is enabled.
        let res = if ctx.is_dir {
            listing::render(&ctx, &self.config, &self.pool).await
        }
        else {
            files::serve(req, &ctx, &self.config).await
        };
        match res {
            Ok(response) => response,
            Err(err) => {
                error!("#{}: {}", request_id, err);
                errors::generic(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Adds the headers for no-cache, CORS, and secure contexts.
    fn add_policy_headers(&self, headers: &mut HeaderMap) {
        if self.config.no_cache {
            headers.insert(
                CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate")
            );
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(EXPIRES, HeaderValue::from_static("0"));
        }
        if self.config.cors {
            add_cors_headers(headers);
        }
        if self.config.secure_context {
            headers.insert(
                HeaderName::from_static("cross-origin-opener-policy"),
                HeaderValue::from_static("same-origin")
            );
            headers.insert(
                HeaderName::from_static("cross-origin-embedder-policy"),
                HeaderValue::from_static("require-corp")
            );
        }
    }

    /// Adds the request ID and hooks up the access log.
    fn finish(
        &self,
        req: &Request,
        request_id: String,
        start: Instant,
        mut response: Response,
    ) -> Response {
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(
                HeaderName::from_static("x-request-id"), value
            );
        }

        if req.is_head() {
            if !response.headers().contains_key(CONTENT_LENGTH) {
                if let Some(len) = response.body().size_hint().exact() {
                    response.headers_mut().insert(CONTENT_LENGTH, len.into());
                }
            }
            response = response.map_body(|_| {
                Empty::<Bytes>::new().map_err(|never| match never {})
            });
        }

        debug!(
            "#{}: Response: {} {:?}",
            request_id, response.status(), response.headers()
        );

        let record = AccessRecord {
            status: response.status().as_u16(),
            host: req.host().into(),
            client_ip: req.peer().ip(),
            real_ip: req.header_str("X-Real-Ip").map(Into::into),
            method: req.method().as_str().into(),
            url: req.uri().to_string(),
            referer: header_string(req, REFERER),
            user_agent: header_string(req, USER_AGENT),
            size: 0,
            elapsed: Default::default(),
            gzip: response.headers().get(CONTENT_ENCODING).and_then(|value| {
                value.to_str().ok()
            }).is_some_and(|value| {
                value.to_ascii_lowercase().contains("gzip")
            }),
            tls: req.is_tls(),
            request_id,
        };
        let config = self.config.clone();
        response.map_body(move |body| {
            LoggedBody::new(body, config, record, start)
        })
    }
}

/// Returns the value of a header as a string for logging.
fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(CORS_METHODS)
    );
}

fn header_string(req: &Request, name: HeaderName) -> String {
    req.headers().get(name).map(|value| {
        String::from_utf8_lossy(value.as_bytes()).into_owned()
    }).unwrap_or_default()
}

/// Creates a new random request ID.
fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(char::from)
        .collect()
}


//============ Tests =========================================================
