//! The canonical request context handed to every handler.
//!
//! A [`Context`] is built by an adapter from one native request, owns copies of everything it
//! needs, and is dropped when the handler chain finishes. Nothing in it borrows from the native
//! request, so native objects that are pooled and recycled by their library can never leak past
//! the chain.

use crate::handler::HandlerChain;
use crate::service::UserModel;
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Header set by pjax clients asking for a page fragment instead of a full page.
pub const PJAX_HEADER: &str = "X-PJAX";

/// Query parameter selecting the display language, e.g. `__ga_lang=zh-CN`.
pub const LANG_PARAM: &str = "__ga_lang";

/// Multi-valued parameters, as found in query strings and url-encoded forms.
pub type Values = HashMap<String, Vec<String>>;

const ABORT_INDEX: usize = usize::MAX;

/// The response accumulated by a handler chain.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: Vec::new() }
    }
}

impl Response {
    /// The status code, `200 OK` until a handler sets another.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Response headers written so far.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The body buffer written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Appends to the body buffer.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Drops everything written so far, restoring a fresh `200 OK`.
    pub fn clear(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }

    /// Splits the response into status, headers and body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<u8>) {
        (self.status, self.headers, self.body)
    }

    /// Converts into an `http::Response`.
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(Bytes::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Per-request state: the request as seen by business logic, the response being built, and a
/// cursor into the route's handler chain.
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Values,
    form: Values,
    cookies: HashMap<String, String>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    extensions: Extensions,
    response: Response,
    handlers: HandlerChain,
    index: usize,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("query", &self.query)
            .field("form", &self.form)
            .field("remote_addr", &self.remote_addr)
            .field("response", &self.response)
            .field("handlers", &self.handlers.len())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a context from owned request parts, parsing query string, cookies and
    /// url-encoded form bodies up front.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let query = uri.query().map(parse_values).unwrap_or_default();
        let form = parse_form(&headers, &body);
        let cookies = parse_cookies(&headers);
        Self {
            method,
            uri,
            headers,
            query,
            form,
            cookies,
            body,
            remote_addr: None,
            extensions: Extensions::new(),
            response: Response::default(),
            handlers: Arc::new([]),
            index: 0,
        }
    }

    /// Sets the peer address of the connection.
    pub fn with_remote_addr(mut self, remote_addr: Option<SocketAddr>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    /// Sets the handler chain [`next`](Self::next) walks, starting from its first handler.
    pub fn with_handlers(mut self, handlers: HandlerChain) -> Self {
        self.handlers = handlers;
        self.index = 0;
        self
    }

    /// Merges path parameters captured by the native router into the query map.
    ///
    /// A path parameter replaces any query-string value with the same name.
    pub fn add_path_params<'a, I>(&mut self, params: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in params {
            self.query.insert(key.to_string(), vec![value.to_string()]);
        }
    }

    /// Runs the remaining handlers of the chain in order.
    ///
    /// Called by the adapter to start a request, and by middleware that needs to act after the
    /// rest of the chain has run.
    pub fn next(&mut self) {
        while self.index < self.handlers.len() {
            let handler = Arc::clone(&self.handlers[self.index]);
            self.index += 1;
            (*handler)(self);
        }
    }

    /// Stops the chain: no handler after the current one will run.
    pub fn abort(&mut self) {
        self.index = ABORT_INDEX;
    }

    /// Whether [`abort`](Self::abort) was called.
    pub fn is_aborted(&self) -> bool {
        self.index == ABORT_INDEX
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URI, as received.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The undecoded query string, empty when there is none.
    pub fn raw_query(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }

    /// First value of a query or path parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        first(&self.query, key)
    }

    /// Every value of a query or path parameter.
    pub fn query_values(&self, key: &str) -> &[String] {
        self.query.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// All query and path parameters.
    pub fn query_map(&self) -> &Values {
        &self.query
    }

    /// First value of an url-encoded form field.
    pub fn form_param(&self, key: &str) -> Option<&str> {
        first(&self.form, key)
    }

    /// All url-encoded form fields; empty for other content types.
    pub fn form(&self) -> &Values {
        &self.form
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The named request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// The raw request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Peer address of the connection, when the binding knows it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Best guess of the client address, honouring proxy headers first.
    pub fn client_ip(&self) -> String {
        client_ip(&self.headers, self.remote_addr)
    }

    /// The language requested through the `__ga_lang` query parameter.
    pub fn lang(&self) -> Option<&str> {
        self.query(LANG_PARAM).filter(|lang| !lang.is_empty())
    }

    /// Whether the client asked for a page fragment.
    pub fn is_pjax(&self) -> bool {
        is_pjax(&self.headers)
    }

    /// Whether the client accepts `application/json`.
    pub fn wants_json(&self) -> bool {
        wants_json(&self.headers)
    }

    /// Request-scoped values shared between handlers of the chain.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable request-scoped values.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The authenticated user, once the auth middleware has stored one.
    pub fn user(&self) -> Option<&UserModel> {
        self.extensions.get::<UserModel>()
    }

    /// Stores the authenticated user for the rest of the chain.
    pub fn set_user(&mut self, user: UserModel) {
        self.extensions.insert(user);
    }

    /// The response built so far.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response built so far.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Consumes the context, keeping only its response.
    pub fn into_response(self) -> Response {
        self.response
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.response.set_status(status);
    }

    /// Sets a response header, replacing previous values; invalid values are logged and skipped.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.response.headers_mut().insert(name, value);
            }
            Err(e) => warn!(header = %name, cause = %e, "ignore invalid response header value"),
        }
    }

    /// Sets the response `Content-Type`.
    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header(header::CONTENT_TYPE, content_type);
    }

    /// Appends bytes to the response body.
    ///
    /// Handlers write once per request; writing after another handler already wrote appends
    /// to the same body, which is the caller's responsibility.
    pub fn write(&mut self, body: &[u8]) {
        self.response.write(body);
    }

    /// Writes an HTML body with `status`.
    pub fn html(&mut self, status: StatusCode, body: &str) {
        self.set_status(status);
        self.set_content_type(mime::TEXT_HTML_UTF_8.as_ref());
        self.write(body.as_bytes());
    }

    /// Serializes `value` as a JSON body with `status`.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.set_status(status);
                self.set_content_type(mime::APPLICATION_JSON.as_ref());
                self.write(&body);
            }
            Err(e) => {
                error!(cause = %e, "serialize json response error");
                self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Answers `302 Found` pointing at `location`.
    pub fn redirect(&mut self, location: &str) {
        self.set_status(StatusCode::FOUND);
        self.set_header(header::LOCATION, location);
    }
}

fn first<'a>(values: &'a Values, key: &str) -> Option<&'a str> {
    values.get(key).and_then(|values| values.first()).map(String::as_str)
}

pub(crate) fn parse_values(raw: &str) -> Values {
    parse_pairs(serde_urlencoded::from_str::<Vec<(String, String)>>(raw))
}

pub(crate) fn parse_form(headers: &HeaderMap, body: &[u8]) -> Values {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.as_ref()));

    if !is_form || body.is_empty() {
        return Values::new();
    }

    parse_pairs(serde_urlencoded::from_bytes::<Vec<(String, String)>>(body))
}

fn parse_pairs(result: Result<Vec<(String, String)>, serde_urlencoded::de::Error>) -> Values {
    match result {
        Ok(pairs) => {
            let mut values = Values::new();
            for (key, value) in pairs {
                values.entry(key).or_default().push(value);
            }
            values
        }
        Err(e) => {
            debug!(cause = %e, "ignore malformed url-encoded values");
            Values::new()
        }
    }
}

/// Parses every `Cookie` header into name/value pairs; the first occurrence of a name wins.
pub(crate) fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"');
            cookies.entry(name.to_string()).or_insert_with(|| value.to_string());
        }
    }
    cookies
}

pub(crate) fn is_pjax(headers: &HeaderMap) -> bool {
    headers.get(PJAX_HEADER).and_then(|value| value.to_str().ok()).is_some_and(|value| value == "true")
}

pub(crate) fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(mime::APPLICATION_JSON.as_ref()))
}

pub(crate) fn client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers.get("x-real-ip").and_then(|value| value.to_str().ok()).map(str::trim);
    if let Some(ip) = real_ip.filter(|ip| !ip.is_empty()) {
        return ip.to_string();
    }

    remote_addr.map(|addr| addr.ip().to_string()).unwrap_or_default()
}
