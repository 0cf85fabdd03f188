//! An in-process HTTP library: routes are matched and dispatched without a socket.
//!
//! Routes use matchit 0.7, whose `:name` / `*name` syntax is the canonical one.
//!
//! Exchanges are pooled and recycled between requests, the way high-throughput libraries reuse
//! their request objects, so nothing a handler keeps may borrow from one.

use super::{Endpoint, NativeBinding, decode_param, parse_path};
use crate::error::AdapterError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

const MAX_POOLED: usize = 64;

/// Binding for [`MemoryApp`]. Its native route syntax is the canonical one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBinding;

/// One recyclable request/response pair.
#[derive(Debug)]
pub struct MemoryExchange {
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

impl MemoryExchange {
    /// An exchange for `request`, outside any pool.
    pub fn from_request(request: Request<Bytes>, remote_addr: Option<SocketAddr>) -> Self {
        let mut exchange = Self::empty();
        exchange.reset(request, remote_addr);
        exchange
    }

    fn empty() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Vec::new(),
            remote_addr: None,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
        }
    }

    /// Reuses this exchange for another request, dropping everything of the previous one.
    fn reset(&mut self, request: Request<Bytes>, remote_addr: Option<SocketAddr>) {
        let (parts, body) = request.into_parts();
        self.method = parts.method;
        self.uri = parts.uri;
        self.headers = parts.headers;
        self.body = body;
        self.params.clear();
        self.remote_addr = remote_addr;
        self.status = StatusCode::OK;
        self.response_headers.clear();
        self.response_body.clear();
    }

    /// The response status written so far.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers written so far.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// The response body written so far.
    pub fn response_body(&self) -> &[u8] {
        &self.response_body
    }

    /// Moves the response out, leaving an empty `200 OK` behind.
    pub fn take_response(&mut self) -> http::Response<Bytes> {
        let mut response = http::Response::new(Bytes::from(mem::take(&mut self.response_body)));
        *response.status_mut() = mem::replace(&mut self.status, StatusCode::OK);
        *response.headers_mut() = mem::take(&mut self.response_headers);
        response
    }
}

type MethodTable = HashMap<Method, Endpoint<MemoryExchange>>;

/// The in-process app: a route table plus a pool of recycled exchanges.
pub struct MemoryApp {
    router: matchit07::Router<usize>,
    paths: HashMap<String, usize>,
    tables: Vec<MethodTable>,
    pool: Mutex<Vec<MemoryExchange>>,
}

impl MemoryApp {
    /// An app with no routes and an empty pool.
    pub fn new() -> Self {
        Self { router: matchit07::Router::new(), paths: HashMap::new(), tables: Vec::new(), pool: Mutex::new(Vec::new()) }
    }

    /// Number of registered method and path pairs.
    pub fn route_count(&self) -> usize {
        self.tables.iter().map(HashMap::len).sum()
    }

    /// Number of idle exchanges waiting to be reused.
    pub fn pooled(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Registers a native endpoint on a path written in the canonical syntax.
    pub fn native_route(&mut self, method: Method, path: &str, endpoint: Endpoint<MemoryExchange>) -> Result<(), AdapterError> {
        let index = match self.paths.get(path) {
            Some(index) => *index,
            None => {
                parse_path(path)?;
                let index = self.tables.len();
                self.router.insert(path, index).map_err(|e| AdapterError::route_conflict(path, e))?;
                self.tables.push(MethodTable::new());
                self.paths.insert(path.to_string(), index);
                index
            }
        };

        let table = &mut self.tables[index];
        if table.contains_key(&method) {
            return Err(AdapterError::route_conflict(path, format!("{method} already registered")));
        }
        table.insert(method, endpoint);
        Ok(())
    }

    /// Routes one request with no peer address.
    pub fn dispatch(&self, request: Request<Bytes>) -> http::Response<Bytes> {
        self.dispatch_from(request, None)
    }

    /// Routes one request and runs its endpoint on a pooled exchange.
    ///
    /// Unknown paths answer `404`, known paths with another method `405`.
    pub fn dispatch_from(&self, request: Request<Bytes>, remote_addr: Option<SocketAddr>) -> http::Response<Bytes> {
        let (endpoint, params) = match self.router.at(request.uri().path()) {
            Ok(matched) => {
                let Some(endpoint) = self.tables[*matched.value].get(request.method()) else {
                    debug!(method = %request.method(), path = request.uri().path(), "method not allowed");
                    return status_response(StatusCode::METHOD_NOT_ALLOWED);
                };
                let params = matched.params.iter().map(|(key, value)| (key.to_string(), decode_param(value))).collect();
                (Arc::clone(endpoint), params)
            }
            Err(e) => {
                debug!(method = %request.method(), path = request.uri().path(), cause = %e, "no route");
                return status_response(StatusCode::NOT_FOUND);
            }
        };

        trace!(method = %request.method(), path = request.uri().path(), "dispatch");
        let mut exchange = self.checkout(request, remote_addr);
        exchange.params = params;
        (*endpoint)(&mut exchange);

        let response = exchange.take_response();
        self.checkin(exchange);
        response
    }

    fn checkout(&self, request: Request<Bytes>, remote_addr: Option<SocketAddr>) -> MemoryExchange {
        let recycled = self.pool.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match recycled {
            Some(mut exchange) => {
                exchange.reset(request, remote_addr);
                exchange
            }
            None => MemoryExchange::from_request(request, remote_addr),
        }
    }

    fn checkin(&self, exchange: MemoryExchange) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < MAX_POOLED {
            pool.push(exchange);
        }
    }
}

fn status_response(status: StatusCode) -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

impl Default for MemoryApp {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths = self.paths.keys().collect::<Vec<_>>();
        paths.sort();
        f.debug_struct("MemoryApp").field("paths", &paths).field("pooled", &self.pooled()).finish()
    }
}

impl NativeBinding for MemoryBinding {
    type App = MemoryApp;
    type Exchange = MemoryExchange;

    const NAME: &'static str = "memory";

    fn native_path(path: &str) -> Result<String, AdapterError> {
        parse_path(path)?;
        Ok(path.to_string())
    }

    fn register(
        app: &mut MemoryApp,
        method: Method,
        path: String,
        endpoint: Endpoint<MemoryExchange>,
    ) -> Result<(), AdapterError> {
        app.native_route(method, &path, endpoint)
    }

    fn method(exchange: &MemoryExchange) -> &Method {
        &exchange.method
    }

    fn uri(exchange: &MemoryExchange) -> &Uri {
        &exchange.uri
    }

    fn headers(exchange: &MemoryExchange) -> &HeaderMap {
        &exchange.headers
    }

    fn body(exchange: &MemoryExchange) -> Bytes {
        exchange.body.clone()
    }

    fn params(exchange: &MemoryExchange) -> &[(String, String)] {
        &exchange.params
    }

    fn remote_addr(exchange: &MemoryExchange) -> Option<SocketAddr> {
        exchange.remote_addr
    }

    fn set_status(exchange: &mut MemoryExchange, status: StatusCode) {
        exchange.status = status;
    }

    fn insert_header(exchange: &mut MemoryExchange, name: HeaderName, value: HeaderValue) {
        exchange.response_headers.insert(name, value);
    }

    fn append_header(exchange: &mut MemoryExchange, name: HeaderName, value: HeaderValue) {
        exchange.response_headers.append(name, value);
    }

    fn write_body(exchange: &mut MemoryExchange, bytes: &[u8]) {
        exchange.response_body.extend_from_slice(bytes);
    }
}
