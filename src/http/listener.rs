//! The HTTP listener.

use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, TcpListener as StdListener};
use std::sync::Arc;
use std::time::Duration;
use futures::future::{pending, select_all};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use crate::config::{Config, TlsPolicy};
use crate::error::ExitError;
use crate::utils::{net, tls};
use super::dispatch::State;
use super::request::Request;


//------------ http_listener -------------------------------------------------

/// Returns a future for all HTTP server listeners.
///
/// All sockets are bound before the function returns. The future only
/// resolves if one of the listeners fails.
pub fn http_listener(
    config: Arc<Config>,
) -> Result<impl Future<Output = ()>, ExitError> {
    let acceptor = match config.tls.as_ref() {
        Some(tls) => Some(TlsAcceptor::from(Arc::new(
            tls::create_server_config(&tls.key, &tls.cert)?
        ))),
        None => None,
    };

    let mut listeners = Vec::new();
    for (addr, tls, mode) in listener_plan(&config) {
        listeners.push(Binding::bind(
            addr, if tls { acceptor.clone() } else { None }, mode
        )?);
    }

    log_startup(&config, &listeners);
    let state = Arc::new(State::new(config));
    Ok(_http_listener(state, listeners))
}

/// Returns the listeners to start for the configuration.
///
/// Each item contains the socket address, whether the listener speaks TLS,
/// and what it does with requests.
fn listener_plan(config: &Config) -> Vec<(SocketAddr, bool, Mode)> {
    let mut res = Vec::new();
    for addr in config.bind.iter().copied() {
        let http = SocketAddr::new(addr, config.port);
        match config.tls.as_ref() {
            Some(tls) => {
                match tls.policy {
                    TlsPolicy::Redirect => {
                        res.push((http, false, Mode::Redirect(tls.port)))
                    }
                    TlsPolicy::Both => res.push((http, false, Mode::Serve)),
                    TlsPolicy::Only => { }
                }
                res.push((SocketAddr::new(addr, tls.port), true, Mode::Serve));
            }
            None => res.push((http, false, Mode::Serve)),
        }
    }
    res
}

async fn _http_listener(state: Arc<State>, listeners: Vec<Binding>) {
    if listeners.is_empty() {
        pending::<()>().await;
    }
    else {
        let _ = select_all(
            listeners.into_iter().map(|binding| {
                tokio::spawn(single_http_listener(binding, state.clone()))
            })
        ).await;
    }
}

/// Logs what we are about to do.
fn log_startup(config: &Config, listeners: &[Binding]) {
    let mut msg = String::from("System: Ran is running on ");
    match config.tls.as_ref() {
        Some(tls) => match tls.policy {
            TlsPolicy::Redirect => {
                msg.push_str(&format!(
                    "HTTPS port {}, all traffic from HTTP port {} will \
                     redirect to HTTPS port",
                    tls.port, config.port
                ));
            }
            TlsPolicy::Both => {
                msg.push_str(&format!(
                    "HTTP port {} and HTTPS port {}", config.port, tls.port
                ));
            }
            TlsPolicy::Only => {
                msg.push_str(&format!("HTTPS port {}", tls.port));
            }
        }
        None => msg.push_str(&format!("HTTP port {}", config.port)),
    }
    if let Some(auth) = config.auth.as_ref() {
        msg.push_str(&format!(" with {} auth", auth.method));
    }
    info!("{}", msg);

    for binding in listeners {
        info!(
            "System: Listening on {}://{}",
            if binding.acceptor.is_some() { "https" } else { "http" },
            net::host_port(binding.addr.ip(), binding.addr.port())
        );
    }
}


//------------ Binding -------------------------------------------------------

/// What a listener does with its requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    /// Run the full request pipeline.
    Serve,

    /// Redirect everything to HTTPS on the given port.
    Redirect(u16),
}

/// A bound socket and how to treat its connections.
struct Binding {
    addr: SocketAddr,
    listener: StdListener,
    acceptor: Option<TlsAcceptor>,
    mode: Mode,
}

impl Binding {
    fn bind(
        addr: SocketAddr, acceptor: Option<TlsAcceptor>, mode: Mode,
    ) -> Result<Self, ExitError> {
        Ok(Binding {
            listener: net::bind(&addr)?,
            addr, acceptor, mode,
        })
    }
}


//------------ single_http_listener ------------------------------------------

/// Runs a single listener.
///
/// The future will never resolve unless an error happens that breaks the
/// listener, in which case it will print an error and resolve.
async fn single_http_listener(binding: Binding, state: Arc<State>) {
    let listener = match TcpListener::from_std(binding.listener) {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed on HTTP listener {}: {}", binding.addr, err);
            return
        }
    };
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(some) => some,
            Err(err) => {
                // Mostly running out of file descriptors. Give it a moment.
                error!("Failed to accept on {}: {}", binding.addr, err);
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue
            }
        };
        let state = state.clone();
        let mode = binding.mode;
        match binding.acceptor.clone() {
            Some(acceptor) => {
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(stream) => {
                            serve_connection(stream, peer, true, mode, state)
                                .await
                        }
                        Err(err) => {
                            debug!("TLS handshake with {} failed: {}", peer, err);
                        }
                    }
                });
            }
            None => {
                tokio::spawn(
                    serve_connection(stream, peer, false, mode, state)
                );
            }
        }
    }
}

/// Serves all requests arriving on a single connection.
async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    tls: bool,
    mode: Mode,
    state: Arc<State>,
)
where S: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    let service = service_fn(move |req: hyper::Request<Incoming>| {
        let state = state.clone();
        async move {
            let req = Request::from_hyper(req, peer, tls);
            let response = match mode {
                Mode::Serve => state.handle_request(req).await,
                Mode::Redirect(port) => state.redirect_request(req, port),
            };
            Ok::<_, Infallible>(response.into_hyper())
        }
    });
    if let Err(err) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!("Connection from {} ended with error: {}", peer, err);
    }
}


//============ Tests =========================================================
