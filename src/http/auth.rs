//! HTTP authentication.
//!
//! Both the Basic and Digest schemes are supported. In both cases the
//! password itself is never compared. Instead we derive a secret as the
//! MD5 hash of `username:realm:password`, which is what Digest needs
//! anyway, and compare against that.
//!
//! Digest authentication hands out nonces that are remembered in a bounded
//! cache. Each nonce can only be used with increasing nonce counts. Once a
//! nonce has fallen out of the cache, a client that uses it gets a fresh
//! challenge marked as stale so it can retry without asking the user.

use std::collections::HashMap;
use std::time::Duration;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hyper::StatusCode;
use hyper::header::WWW_AUTHENTICATE;
use log::debug;
use md5::{Digest, Md5};
use rand::Rng;
use crate::config::{Auth, AuthMethod, Config};
use crate::utils::path::clean_url_path;
use crate::utils::sync::Mutex;
use super::errors;
use super::request::Request;
use super::response::Response;


//------------ Constants -----------------------------------------------------

/// The realm used in challenges.
const REALM: &str = "Identity authentication";

/// The number of nonces the cache should hold.
const NONCE_CACHE_SIZE: usize = 2000;

/// How far the cache may grow beyond its size before it is purged.
const NONCE_CACHE_TOLERANCE: usize = 200;

/// The range of the delay after failed attempts in milliseconds.
const FAILURE_DELAY_MS: std::ops::Range<u64> = 300..2500;


//------------ Authenticator -------------------------------------------------

/// Checks the credentials of requests.
#[derive(Debug)]
pub struct Authenticator {
    auth: Auth,

    /// The derived secret, `MD5(username:realm:password)` in hex.
    secret: String,

    /// The opaque value for Digest challenges.
    opaque: String,

    /// The nonces we have handed out.
    nonces: Mutex<NonceCache>,
}

impl Authenticator {
    /// Creates an authenticator if the config asks for one.
    pub fn from_config(config: &Config) -> Option<Self> {
        config.auth.as_ref().map(|auth| Self::new(auth.clone()))
    }

    pub fn new(auth: Auth) -> Self {
        let secret = md5_hex(
            format!("{}:{}:{}", auth.username, REALM, auth.password)
        );
        Authenticator {
            auth,
            secret,
            opaque: random_hex(),
            nonces: Mutex::new(NonceCache::default()),
        }
    }

    /// Checks a request.
    ///
    /// Returns `None` if the request may proceed or the challenge response
    /// otherwise. If the request carried wrong credentials, the response is
    /// delayed by a random amount of time.
    pub async fn check(
        &self, req: &Request, config: &Config, request_id: &str
    ) -> Option<Response> {
        if !self.covers(req) {
            return None
        }
        let stale = match self.verify(req) {
            Verdict::Pass => return None,
            Verdict::Missing => false,
            Verdict::Stale => true,
            Verdict::Wrong => {
                debug!("#{}: Authentication failed.", request_id);
                let delay = rand::thread_rng().gen_range(FAILURE_DELAY_MS);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                false
            }
        };
        let mut response = errors::custom_or_generic(
            StatusCode::UNAUTHORIZED, config.error_401.as_ref(), request_id
        ).await;
        if let Ok(value) = self.challenge(stale).parse() {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        Some(response)
    }

    /// Returns whether the request’s path requires authentication.
    fn covers(&self, req: &Request) -> bool {
        if self.auth.paths.is_empty() {
            return true
        }
        let path = percent_encoding::percent_decode_str(
            req.uri().path()
        ).decode_utf8_lossy();
        let path = clean_url_path(&format!("/{}", path));
        self.auth.paths.iter().any(|scope| {
            let scope = scope.trim_end_matches('/');
            scope.is_empty()
                || path == scope
                || path.strip_prefix(scope).is_some_and(|rest| {
                    rest.starts_with('/')
                })
        })
    }

    /// Checks the credentials in a request.
    fn verify(&self, req: &Request) -> Verdict {
        let value = match req.header_str("Authorization") {
            Some(value) => value.trim(),
            None => return Verdict::Missing
        };
        let (scheme, params) = match value.split_once(' ') {
            Some((scheme, params)) => (scheme, params.trim()),
            None => return Verdict::Missing
        };
        match self.auth.method {
            AuthMethod::Basic if scheme.eq_ignore_ascii_case("basic") => {
                self.verify_basic(params)
            }
            AuthMethod::Digest if scheme.eq_ignore_ascii_case("digest") => {
                self.verify_digest(req, params)
            }
            _ => Verdict::Missing
        }
    }

    fn verify_basic(&self, params: &str) -> Verdict {
        let decoded = match BASE64.decode(params) {
            Ok(decoded) => decoded,
            Err(_) => return Verdict::Wrong
        };
        let decoded = match String::from_utf8(decoded) {
            Ok(decoded) => decoded,
            Err(_) => return Verdict::Wrong
        };
        match decoded.split_once(':') {
            Some((user, pass)) if self.secret_for(user).is_some_and(|secret| {
                secret == md5_hex(format!("{}:{}:{}", user, REALM, pass))
            }) => Verdict::Pass,
            _ => Verdict::Wrong
        }
    }

    fn verify_digest(&self, req: &Request, params: &str) -> Verdict {
        let params = match DigestParams::parse(params) {
            Some(params) => params,
            None => return Verdict::Wrong
        };
        let secret = match self.secret_for(params.username) {
            Some(secret) => secret,
            None => return Verdict::Wrong
        };
        if params.realm != REALM
            || params.uri != req.path_and_query()
            || params.qop != "auth"
            || params.opaque.is_some_and(|opaque| opaque != self.opaque)
        {
            return Verdict::Wrong
        }
        let nc = match u64::from_str_radix(params.nc, 16) {
            Ok(nc) => nc,
            Err(_) => return Verdict::Wrong
        };
        let ha2 = md5_hex(format!("{}:{}", req.method(), params.uri));
        let expected = md5_hex(format!(
            "{}:{}:{}:{}:{}:{}",
            secret, params.nonce, params.nc, params.cnonce, params.qop, ha2
        ));
        if expected != params.response {
            return Verdict::Wrong
        }
        match self.nonces.lock().use_nonce(params.nonce, nc) {
            NonceUse::Fresh => Verdict::Pass,
            NonceUse::Unknown => Verdict::Stale,
            NonceUse::Replayed => Verdict::Wrong,
        }
    }

    /// Returns the secret for a user name.
    ///
    /// Only the configured user has one.
    fn secret_for(&self, username: &str) -> Option<&str> {
        if username == self.auth.username {
            Some(&self.secret)
        }
        else {
            None
        }
    }

    /// Returns the value of the WWW-Authenticate header.
    fn challenge(&self, stale: bool) -> String {
        match self.auth.method {
            AuthMethod::Basic => format!("Basic realm=\"{}\"", REALM),
            AuthMethod::Digest => {
                let nonce = self.nonces.lock().issue();
                format!(
                    "Digest realm=\"{}\", nonce=\"{}\", opaque=\"{}\", \
                     algorithm=\"MD5\", qop=\"auth\"{}",
                    REALM, nonce, self.opaque,
                    if stale { ", stale=true" } else { "" }
                )
            }
        }
    }
}


//------------ Verdict -------------------------------------------------------

/// The outcome of checking credentials.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Verdict {
    /// The credentials are correct.
    Pass,

    /// There are no usable credentials.
    Missing,

    /// The credentials were correct for a nonce we have forgotten.
    Stale,

    /// The credentials are wrong.
    Wrong,
}


//------------ DigestParams --------------------------------------------------

/// The parameters of a Digest Authorization header.
#[derive(Clone, Debug, Default)]
struct DigestParams<'a> {
    username: &'a str,
    realm: &'a str,
    nonce: &'a str,
    uri: &'a str,
    response: &'a str,
    opaque: Option<&'a str>,
    qop: &'a str,
    nc: &'a str,
    cnonce: &'a str,
}

impl<'a> DigestParams<'a> {
    /// Parses the parameters.
    ///
    /// Returns `None` if the syntax is broken or a required parameter is
    /// missing. Quoted values with backslash escapes are not supported.
    fn parse(mut s: &'a str) -> Option<Self> {
        let mut res = DigestParams::default();
        let mut seen = 0u8;
        loop {
            s = s.trim_start_matches(|ch: char| ch == ',' || ch.is_whitespace());
            if s.is_empty() {
                break
            }
            let (key, rest) = s.split_once('=')?;
            let key = key.trim();
            let rest = rest.trim_start();
            let value = if let Some(rest) = rest.strip_prefix('"') {
                let end = rest.find('"')?;
                s = &rest[end + 1..];
                &rest[..end]
            }
            else {
                let end = rest.find(',').unwrap_or(rest.len());
                s = &rest[end..];
                rest[..end].trim()
            };
            let bit = match key.to_ascii_lowercase().as_str() {
                "username" => { res.username = value; 1 }
                "realm" => { res.realm = value; 2 }
                "nonce" => { res.nonce = value; 4 }
                "uri" => { res.uri = value; 8 }
                "response" => { res.response = value; 16 }
                "qop" => { res.qop = value; 32 }
                "nc" => { res.nc = value; 64 }
                "cnonce" => { res.cnonce = value; 128 }
                "opaque" => { res.opaque = Some(value); 0 }
                _ => 0
            };
            seen |= bit;
        }
        if seen == 0xFF {
            Some(res)
        }
        else {
            None
        }
    }
}


//------------ NonceCache ----------------------------------------------------

/// The nonces handed out to clients.
#[derive(Debug, Default)]
struct NonceCache {
    nonces: HashMap<String, NonceEntry>,

    /// A counter that increases with every access.
    clock: u64,
}

#[derive(Clone, Copy, Debug)]
struct NonceEntry {
    /// The highest nonce count seen so far.
    nc: u64,

    /// The clock value of the last access.
    last_seen: u64,
}

/// What happened when a nonce was used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum NonceUse {
    Fresh,
    Unknown,
    Replayed,
}

impl NonceCache {
    /// Creates and remembers a new nonce.
    fn issue(&mut self) -> String {
        let nonce = random_hex();
        self.clock += 1;
        self.nonces.insert(
            nonce.clone(), NonceEntry { nc: 0, last_seen: self.clock }
        );
        if self.nonces.len() > NONCE_CACHE_SIZE + NONCE_CACHE_TOLERANCE {
            self.purge();
        }
        nonce
    }

    /// Records the use of a nonce with the given nonce count.
    fn use_nonce(&mut self, nonce: &str, nc: u64) -> NonceUse {
        self.clock += 1;
        match self.nonces.get_mut(nonce) {
            Some(entry) => {
                if nc <= entry.nc {
                    NonceUse::Replayed
                }
                else {
                    entry.nc = nc;
                    entry.last_seen = self.clock;
                    NonceUse::Fresh
                }
            }
            None => NonceUse::Unknown
        }
    }

    /// Drops the least recently used nonces.
    ///
    /// Removes twice the tolerance so we don’t have to purge again right
    /// away.
    fn purge(&mut self) {
        let mut ages: Vec<_> = self.nonces.values().map(|entry| {
            entry.last_seen
        }).collect();
        ages.sort_unstable();
        let keep_from = ages[
            (2 * NONCE_CACHE_TOLERANCE).min(ages.len() - 1)
        ];
        self.nonces.retain(|_, entry| entry.last_seen >= keep_from);
    }
}


//------------ Helpers -------------------------------------------------------

fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Returns 16 random bytes in hex.
fn random_hex() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Instant;
    use hyper::Method;
    use crate::http::request::test::request;

    fn authenticator(method: AuthMethod, paths: &[&str]) -> Authenticator {
        Authenticator::new(Auth {
            username: "user".into(),
            password: "secret".into(),
            method,
            paths: paths.iter().map(ToString::to_string).collect(),
        })
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{}:{}", user, pass)))
    }

    /// Answers a Digest challenge the way a browser would.
    fn digest_answer(
        challenge: &str, uri: &str, pass: &str, nc: u32
    ) -> String {
        let params = challenge.strip_prefix("Digest ").unwrap();
        let value = |key: &str| {
            let start = params.find(&format!("{}=\"", key)).unwrap()
                + key.len() + 2;
            let len = params[start..].find('"').unwrap();
            params[start..start + len].to_string()
        };
        let nonce = value("nonce");
        let opaque = value("opaque");
        let nc = format!("{:08x}", nc);
        let ha1 = md5_hex(format!("user:{}:{}", REALM, pass));
        let ha2 = md5_hex(format!("GET:{}", uri));
        let response = md5_hex(format!(
            "{}:{}:{}:0a4f113b:auth:{}", ha1, nonce, nc, ha2
        ));
        format!(
            "Digest username=\"user\", realm=\"{}\", nonce=\"{}\", \
             uri=\"{}\", qop=auth, nc={}, cnonce=\"0a4f113b\", \
             response=\"{}\", opaque=\"{}\", algorithm=MD5",
            REALM, nonce, uri, nc, response, opaque
        )
    }

    #[test]
    fn basic_credentials() {
        let auth = authenticator(AuthMethod::Basic, &[]);
        let get = |value: &str| {
            auth.verify(&request(
                Method::GET, "/", &[("Authorization", value)]
            ))
        };
        assert_eq!(get(basic("user", "secret").as_str()), Verdict::Pass);
        assert_eq!(get(basic("user", "wrong").as_str()), Verdict::Wrong);
        assert_eq!(get(basic("other", "secret").as_str()), Verdict::Wrong);
        assert_eq!(get("Basic !!!"), Verdict::Wrong);
        assert_eq!(get("Bearer abc"), Verdict::Missing);
        assert_eq!(
            auth.verify(&request(Method::GET, "/", &[])), Verdict::Missing
        );
        assert_eq!(
            auth.challenge(false), "Basic realm=\"Identity authentication\""
        );
    }

    #[test]
    fn digest_credentials() {
        let auth = authenticator(AuthMethod::Digest, &[]);
        let challenge = auth.challenge(false);
        assert!(challenge.starts_with(
            "Digest realm=\"Identity authentication\", nonce=\""
        ));
        assert!(challenge.ends_with("algorithm=\"MD5\", qop=\"auth\""));

        let uri = "/private/a.txt?x=1";
        let get = |value: String| {
            auth.verify(&request(
                Method::GET, uri, &[("Authorization", value.as_str())]
            ))
        };
        assert_eq!(get(digest_answer(&challenge, uri, "secret", 1)), Verdict::Pass);
        assert_eq!(get(digest_answer(&challenge, uri, "secret", 2)), Verdict::Pass);

        // Replaying an old nonce count fails.
        assert_eq!(get(digest_answer(&challenge, uri, "secret", 2)), Verdict::Wrong);

        // Wrong password.
        assert_eq!(get(digest_answer(&challenge, uri, "nope", 3)), Verdict::Wrong);

        // Answer for a different URI.
        assert_eq!(
            get(digest_answer(&challenge, "/other", "secret", 4)),
            Verdict::Wrong
        );

        // A nonce we never issued.
        let forged = challenge.replace("nonce=\"", "nonce=\"ff");
        assert_eq!(get(digest_answer(&forged, uri, "secret", 1)), Verdict::Stale);
        assert!(auth.challenge(true).ends_with(", stale=true"));
    }

    #[test]
    fn digest_params() {
        let params = DigestParams::parse(
            "username=\"a, b\", realm=\"r\",nonce=\"n\", uri=\"/x?y=1,2\", \
             response=\"r\", qop=auth, nc=00000001, cnonce=\"c\""
        ).unwrap();
        assert_eq!(params.username, "a, b");
        assert_eq!(params.uri, "/x?y=1,2");
        assert_eq!(params.qop, "auth");
        assert_eq!(params.nc, "00000001");
        assert_eq!(params.opaque, None);
        assert!(DigestParams::parse("username=\"a\"").is_none());
        assert!(DigestParams::parse("username=\"a").is_none());
    }

    #[test]
    fn nonce_cache_is_bounded() {
        let mut cache = NonceCache::default();
        let first = cache.issue();
        for _ in 0..NONCE_CACHE_SIZE + NONCE_CACHE_TOLERANCE {
            cache.issue();
        }
        assert!(cache.nonces.len() <= NONCE_CACHE_SIZE);
        assert_eq!(cache.use_nonce(&first, 1), NonceUse::Unknown);
    }

    #[test]
    fn scoped_paths() {
        let auth = authenticator(AuthMethod::Basic, &["/private", "/admin/"]);
        let covers = |target: &str| {
            auth.covers(&request(Method::GET, target, &[]))
        };
        assert!(covers("/private"));
        assert!(covers("/private/a.txt"));
        assert!(covers("/admin/"));
        assert!(covers("/private/../private/x"));
        assert!(covers("/%70rivate/x"));
        assert!(!covers("/privateer"));
        assert!(!covers("/public/private"));
        assert!(!covers("/"));

        let auth = authenticator(AuthMethod::Basic, &["/"]);
        assert!(auth.covers(&request(Method::GET, "/anything", &[])));
        let auth = authenticator(AuthMethod::Basic, &[]);
        assert!(auth.covers(&request(Method::GET, "/anything", &[])));
    }

    #[tokio::test]
    async fn wrong_credentials_are_delayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = crate::config::Options::with_root(
            dir.path().into()
        );
        options.auth = Some("user:secret".into());
        let config = options.validate().unwrap();
        let auth = Authenticator::from_config(&config).unwrap();

        let start = Instant::now();
        let response = auth.check(
            &request(
                Method::GET, "/", &[("Authorization", basic("user", "x").as_str())]
            ),
            &config, "id"
        ).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("www-authenticate").unwrap(),
            "Basic realm=\"Identity authentication\""
        );

        let start = Instant::now();
        assert!(auth.check(
            &request(
                Method::GET, "/",
                &[("Authorization", basic("user", "secret").as_str())]
            ),
            &config, "id"
        ).await.is_none());
        assert!(start.elapsed() < Duration::from_millis(300));

        let start = Instant::now();
        let response = auth.check(
            &request(Method::GET, "/", &[]), &config, "id"
        ).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(300));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_users_are_delayed() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = crate::config::Options::with_root(
            dir.path().into()
        );
        options.auth = Some("user:secret".into());
        let config = options.validate().unwrap();
        let auth = Authenticator::from_config(&config).unwrap();

        let start = Instant::now();
        let response = auth.check(
            &request(
                Method::GET, "/",
                &[("Authorization", basic("other", "secret").as_str())]
            ),
            &config, "id"
        ).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        options.auth_method = "digest".into();
        let config = options.validate().unwrap();
        let auth = Authenticator::from_config(&config).unwrap();
        let answer = digest_answer(
            &auth.challenge(false), "/", "secret", 1
        ).replace("username=\"user\"", "username=\"other\"");

        let start = Instant::now();
        let response = auth.check(
            &request(Method::GET, "/", &[("Authorization", answer.as_str())]),
            &config, "id"
        ).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(
            response.headers().get("www-authenticate").unwrap()
                .to_str().unwrap().starts_with("Digest ")
        );
    }
}
