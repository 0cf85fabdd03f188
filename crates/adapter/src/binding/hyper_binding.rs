//! Binding for hyper 1.x over tokio, routed with matchit.
//!
//! Handler chains are synchronous, so each request runs its chain on tokio's blocking pool and
//! the connection task only does I/O.

use super::{Endpoint, NativeBinding, Segment, decode_param, parse_path};
use crate::error::AdapterError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, error, info, warn};

/// Binding for [`HyperApp`]; routes are spelled in matchit's `{name}` syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperBinding;

/// One hyper request, fully read, and the response being built for it.
#[derive(Debug)]
pub struct HyperExchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: Vec<(String, String)>,
    remote_addr: Option<SocketAddr>,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Vec<u8>,
}

impl HyperExchange {
    /// Wraps a request whose body has been read in full.
    pub fn new(request: Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: Vec::new(),
            remote_addr,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
        }
    }

    /// The response built for this exchange.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(self.response_body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }
}

type MethodTable = HashMap<Method, Endpoint<HyperExchange>>;

/// Largest request body read before answering `413`, unless the app sets its own.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The route table routes are registered on before serving.
pub struct HyperApp {
    router: matchit::Router<usize>,
    paths: HashMap<String, usize>,
    tables: Vec<MethodTable>,
    body_limit: usize,
}

impl HyperApp {
    /// An empty route table with the default body limit.
    pub fn new() -> Self {
        Self { router: matchit::Router::new(), paths: HashMap::new(), tables: Vec::new(), body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Sets the largest request body, in bytes, the service reads.
    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// Registers a native endpoint on a path in matchit syntax.
    pub fn native_route(&mut self, method: Method, path: String, endpoint: Endpoint<HyperExchange>) -> Result<(), AdapterError> {
        let index = match self.paths.get(&path) {
            Some(index) => *index,
            None => {
                let index = self.tables.len();
                self.router.insert(path.clone(), index).map_err(|e| AdapterError::route_conflict(&path, e))?;
                self.tables.push(MethodTable::new());
                self.paths.insert(path.clone(), index);
                index
            }
        };

        let table = &mut self.tables[index];
        if table.contains_key(&method) {
            return Err(AdapterError::route_conflict(&path, format!("{method} already registered")));
        }
        table.insert(method, endpoint);
        Ok(())
    }

    /// Freezes the route table into a cloneable service.
    pub fn into_service(self) -> HyperService {
        HyperService {
            inner: Arc::new(ServiceInner { router: self.router, tables: self.tables, body_limit: self.body_limit }),
        }
    }
}

impl Default for HyperApp {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HyperApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths = self.paths.keys().collect::<Vec<_>>();
        paths.sort();
        f.debug_struct("HyperApp").field("paths", &paths).field("body_limit", &self.body_limit).finish()
    }
}

struct ServiceInner {
    router: matchit::Router<usize>,
    tables: Vec<MethodTable>,
    body_limit: usize,
}

/// A frozen route table serving hyper connections.
#[derive(Clone)]
pub struct HyperService {
    inner: Arc<ServiceInner>,
}

impl HyperService {
    /// Answers one request.
    ///
    /// Unknown paths answer `404`, known paths with another method `405`, bodies over the limit
    /// `413`, unreadable bodies `400`.
    pub async fn handle<B>(&self, request: Request<B>, remote_addr: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, self.inner.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(limit = self.inner.body_limit, path = parts.uri.path(), "request body too large");
                return status_response(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Err(e) => {
                warn!(cause = %e, "read request body error");
                return status_response(StatusCode::BAD_REQUEST);
            }
        };

        let (endpoint, params) = match self.inner.router.at(parts.uri.path()) {
            Ok(matched) => {
                let Some(endpoint) = self.inner.tables[*matched.value].get(&parts.method) else {
                    debug!(method = %parts.method, path = parts.uri.path(), "method not allowed");
                    return status_response(StatusCode::METHOD_NOT_ALLOWED);
                };
                let params = matched.params.iter().map(|(key, value)| (key.to_string(), decode_param(value))).collect();
                (Arc::clone(endpoint), params)
            }
            Err(e) => {
                debug!(method = %parts.method, path = parts.uri.path(), cause = %e, "no route");
                return status_response(StatusCode::NOT_FOUND);
            }
        };

        let mut exchange = HyperExchange::new(Request::from_parts(parts, body), remote_addr);
        exchange.params = params;

        let result = tokio::task::spawn_blocking(move || {
            (*endpoint)(&mut exchange);
            exchange
        })
        .await;

        match result {
            Ok(exchange) => exchange.into_response(),
            Err(e) => {
                error!(cause = %e, "request task failed");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Binds `address` and serves connections until the process exits.
    pub async fn serve<A: ToSocketAddrs>(self, address: A) -> Result<(), AdapterError> {
        let listener = TcpListener::bind(address).await?;
        info!(address = ?listener.local_addr().ok(), "start listening");
        self.serve_listener(listener).await;
        Ok(())
    }

    pub async fn serve_listener(self, listener: TcpListener) {
        loop {
            let (tcp_stream, remote_addr) = match listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let service = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(tcp_stream);
                let hyper_service = service_fn(move |request: Request<Incoming>| {
                    let service = service.clone();
                    async move { Ok::<_, Infallible>(service.handle(request, Some(remote_addr)).await) }
                });

                match http1::Builder::new().serve_connection(io, hyper_service).await {
                    Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }
}

impl fmt::Debug for HyperService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperService").field("paths", &self.inner.tables.len()).finish()
    }
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn escape_static(segment: &str) -> String {
    segment.replace('{', "{{").replace('}', "}}")
}

impl NativeBinding for HyperBinding {
    type App = HyperApp;
    type Exchange = HyperExchange;

    const NAME: &'static str = "hyper";

    fn native_path(path: &str) -> Result<String, AdapterError> {
        let segments = parse_path(path)?
            .into_iter()
            .map(|segment| match segment {
                Segment::Static(s) => escape_static(s),
                Segment::Param(name) => format!("{{{name}}}"),
                Segment::CatchAll(name) => format!("{{*{name}}}"),
            })
            .collect::<Vec<_>>();
        Ok(format!("/{}", segments.join("/")))
    }

    fn register(
        app: &mut HyperApp,
        method: Method,
        path: String,
        endpoint: Endpoint<HyperExchange>,
    ) -> Result<(), AdapterError> {
        app.native_route(method, path, endpoint)
    }

    fn method(exchange: &HyperExchange) -> &Method {
        &exchange.method
    }

    fn uri(exchange: &HyperExchange) -> &Uri {
        &exchange.uri
    }

    fn headers(exchange: &HyperExchange) -> &HeaderMap {
        &exchange.headers
    }

    fn body(exchange: &HyperExchange) -> Bytes {
        exchange.body.clone()
    }

    fn params(exchange: &HyperExchange) -> &[(String, String)] {
        &exchange.params
    }

    fn remote_addr(exchange: &HyperExchange) -> Option<SocketAddr> {
        exchange.remote_addr
    }

    fn set_status(exchange: &mut HyperExchange, status: StatusCode) {
        exchange.status = status;
    }

    fn insert_header(exchange: &mut HyperExchange, name: HeaderName, value: HeaderValue) {
        exchange.response_headers.insert(name, value);
    }

    fn append_header(exchange: &mut HyperExchange, name: HeaderName, value: HeaderValue) {
        exchange.response_headers.append(name, value);
    }

    fn write_body(exchange: &mut HyperExchange, bytes: &[u8]) {
        exchange.response_body.extend_from_slice(bytes);
    }
}
