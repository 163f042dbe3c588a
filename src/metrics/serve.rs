//! Pull endpoint serving a [`MetricsRegistry`] over HTTP

use crate::metrics::MetricsRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Method, Response, Server};

/// Binds `addr` and answers requests from a background thread
///
/// Routes:
/// - `GET /metrics`: Prometheus text exposition of `registry`
/// - `GET /`: index page
/// - anything else: 404
///
/// # Errors
///
/// Returns an error if `addr` cannot be bound, e.g. the port is already in use
pub fn bind(registry: MetricsRegistry, addr: SocketAddr) -> Result<ServeHandle, BindError> {
    let server = Server::http(addr).map_err(|source| BindError { addr, source })?;
    let server = Arc::new(server);
    let local_addr = server.server_addr().to_ip().unwrap_or(addr);

    let thread = {
        let server = Arc::clone(&server);
        std::thread::Builder::new()
            .name("metrics-endpoint".to_string())
            .spawn(move || serve_requests(&server, &registry))
            .map_err(|source| BindError {
                addr,
                source: Box::new(source),
            })?
    };

    tracing::info!(%local_addr, "serving metrics endpoint");
    Ok(ServeHandle {
        server,
        local_addr,
        thread: Some(thread),
    })
}

fn serve_requests(server: &Server, registry: &MetricsRegistry) {
    for request in server.incoming_requests() {
        let response = match (request.method(), request.url()) {
            (&Method::Get, "/metrics") => match registry.encode() {
                Ok(text) => {
                    with_content_type(Response::from_string(text), MetricsRegistry::CONTENT_TYPE)
                }
                Err(e) => {
                    tracing::error!("failed to encode metrics: {e}");
                    Response::from_string("Error encoding metrics").with_status_code(500)
                }
            },
            (&Method::Get, "/") => with_content_type(
                Response::from_string(include_str!("../index.html")),
                "text/html; charset=utf-8",
            ),
            _ => Response::from_string("Not Found").with_status_code(404),
        };
        if let Err(e) = request.respond(response) {
            tracing::debug!("failed to respond: {e}");
        }
    }
}

fn with_content_type<R: std::io::Read>(response: Response<R>, value: &str) -> Response<R> {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

/// Running pull endpoint, returned by [`bind`]
///
/// Dropping the handle leaves the endpoint running for the rest of the process.
pub struct ServeHandle {
    server: Arc<Server>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}
impl ServeHandle {
    /// Address the endpoint is listening on
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests and waits for the serving thread to exit
    pub fn shutdown(mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Pull endpoint could not be started
#[derive(Debug)]
pub struct BindError {
    addr: SocketAddr,
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}
impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}
impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { addr, source } = self;
        write!(f, "Failed to bind to {addr}: {source}")
    }
}
