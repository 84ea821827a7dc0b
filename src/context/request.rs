use {
    super::{AppContext, query},
    crate::{
        Application, Error, Params, QueryParser, Result,
        utils::{lock, split_path_query},
    },
    axum::{
        body::{Body, Bytes},
        extract::ConnectInfo,
    },
    http::{Extensions, HeaderMap, Method, Uri, Version, header},
    http_body_util::BodyExt,
    serde::de::DeserializeOwned,
    serde_json::{Map, Value},
    std::{
        fmt,
        net::{IpAddr, SocketAddr},
        sync::{Arc, Mutex},
    },
};

struct RequestState {
    method: Method,
    version: Version,
    uri: Uri,
    original_url: String,
    url: String,
    base_url: String,
    headers: HeaderMap,
    params: Params,
    route_path: Option<String>,
    remote_addr: Option<SocketAddr>,
    body: Option<Body>,
    extensions: Extensions,
    context: Option<AppContext>,
}

/// Handle to the incoming request.
///
/// `url` is relative to the mount point of the router currently running;
/// `base_url` holds the consumed prefix and `original_url` never changes.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Mutex<RequestState>>,
}

impl Request {
    pub fn from_http(req: http::Request<Body>) -> Self {
        let (parts, body) = req.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            inner: Arc::new(Mutex::new(RequestState {
                method: parts.method,
                version: parts.version,
                uri: parts.uri,
                original_url: url.clone(),
                url,
                base_url: String::new(),
                headers: parts.headers,
                params: Params::new(),
                route_path: None,
                remote_addr,
                body: Some(body),
                extensions: parts.extensions,
                context: None,
            })),
        }
    }

    pub fn method(&self) -> Method {
        lock(&self.inner).method.clone()
    }

    pub fn version(&self) -> Version {
        lock(&self.inner).version
    }

    /// Path and query, relative to the current mount point.
    pub fn url(&self) -> String {
        lock(&self.inner).url.clone()
    }

    /// Rewrites the url seen by the layers that run next.
    pub fn set_url(&self, url: impl Into<String>) {
        lock(&self.inner).url = url.into();
    }

    pub fn original_url(&self) -> String {
        lock(&self.inner).original_url.clone()
    }

    /// The prefix consumed by the routers the request went through, without a trailing `/`.
    pub fn base_url(&self) -> String {
        lock(&self.inner).base_url.clone()
    }

    pub(crate) fn set_base_url(&self, base_url: impl Into<String>) {
        lock(&self.inner).base_url = base_url.into();
    }

    /// The path part of [`url`](Request::url).
    pub fn path(&self) -> String {
        let state = lock(&self.inner);
        split_path_query(&state.url).0.to_string()
    }

    pub fn query_string(&self) -> Option<String> {
        let state = lock(&self.inner);
        split_path_query(&state.url).1.map(str::to_string)
    }

    /// The query string parsed by the dispatching application's `query parser` setting.
    pub fn query(&self) -> Value {
        let raw = self.query_string().unwrap_or_default();
        match self.context().query_parser {
            QueryParser::Disabled => Value::Object(Map::new()),
            QueryParser::Simple => query::parse_simple(&raw),
            QueryParser::Extended => query::parse_extended(&raw),
        }
    }

    /// A header as text. `Referer` and `Referrer` are interchangeable.
    pub fn header(&self, name: &str) -> Option<String> {
        let state = lock(&self.inner);
        let lookup = |name: &str| {
            state
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        match name.to_ascii_lowercase().as_str() {
            "referer" | "referrer" => lookup("referrer").or_else(|| lookup("referer")),
            other => lookup(other),
        }
    }

    pub fn headers(&self) -> HeaderMap {
        lock(&self.inner).headers.clone()
    }

    // =======================================================================
    // Route parameters
    // =======================================================================

    pub fn params(&self) -> Params {
        lock(&self.inner).params.clone()
    }

    pub(crate) fn set_params(&self, params: Params) {
        lock(&self.inner).params = params;
    }

    pub fn param(&self, name: &str) -> Option<String> {
        lock(&self.inner).params.get(name).map(str::to_string)
    }

    pub fn set_param(&self, name: &str, value: impl Into<String>) {
        lock(&self.inner).params.insert(name, Some(value.into()));
    }

    pub(crate) fn insert_param(&self, name: &str, value: Option<String>) {
        lock(&self.inner).params.insert(name, value);
    }

    /// Path of the route currently (or last) dispatching the request.
    pub fn route_path(&self) -> Option<String> {
        lock(&self.inner).route_path.clone()
    }

    pub(crate) fn set_route_path(&self, path: Option<String>) {
        lock(&self.inner).route_path = path;
    }

    // =======================================================================
    // Body and extensions
    // =======================================================================

    /// Takes the request body, leaving an empty one behind.
    pub fn take_body(&self) -> Body {
        lock(&self.inner).body.take().unwrap_or_else(Body::empty)
    }

    pub async fn bytes(&self) -> Result<Bytes> {
        let body = self.take_body();
        Ok(body.collect().await?.to_bytes())
    }

    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::invalid_input(format!("Request body is not valid UTF-8: {e}")))
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::invalid_input(format!("Request body is not valid JSON: {e}")))
    }

    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        lock(&self.inner).extensions.get::<T>().cloned()
    }

    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        lock(&self.inner).extensions.insert(value)
    }

    // =======================================================================
    // Application context
    // =======================================================================

    /// The application currently dispatching the request.
    pub fn app(&self) -> Option<Application> {
        lock(&self.inner).context.as_ref().and_then(|c| c.app.clone())
    }

    /// Settings of the dispatching application, or defaults outside of one.
    pub fn context(&self) -> AppContext {
        lock(&self.inner).context.clone().unwrap_or_default()
    }

    /// Installs `context`, returning the one it replaces.
    pub(crate) fn swap_context(&self, context: Option<AppContext>) -> Option<AppContext> {
        std::mem::replace(&mut lock(&self.inner).context, context)
    }

    // =======================================================================
    // Connection and proxies
    // =======================================================================

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner).remote_addr
    }

    /// Socket peer followed by the `X-Forwarded-For` hops, closest first.
    fn forwarded_chain(&self) -> Vec<String> {
        let socket = self
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();
        let mut chain = vec![socket];
        if let Some(forwarded) = self.header("x-forwarded-for") {
            chain.extend(
                forwarded
                    .split(',')
                    .rev()
                    .map(str::trim)
                    .filter(|hop| !hop.is_empty())
                    .map(str::to_string),
            );
        }
        chain
    }

    /// The forwarded chain cut after the first hop that is not a trusted proxy.
    fn trusted_chain(&self) -> Vec<String> {
        let trust = self.context().trust_proxy;
        let mut chain = self.forwarded_chain();
        if let Some(cut) = (0..chain.len() - 1).find(|&i| !trust.trusts(&chain[i], i)) {
            chain.truncate(cut + 1);
        }
        chain
    }

    /// Client address: the furthest hop reachable through trusted proxies.
    pub fn ip(&self) -> Option<String> {
        self.trusted_chain().pop().filter(|ip| !ip.is_empty())
    }

    /// Client and proxy addresses from `X-Forwarded-For` when the socket peer
    /// is trusted, client first.
    pub fn ips(&self) -> Vec<String> {
        let mut chain = self.trusted_chain();
        chain.remove(0);
        chain.reverse();
        chain
    }

    fn socket_trusted(&self) -> bool {
        let socket = self
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();
        self.context().trust_proxy.trusts(&socket, 0)
    }

    /// `http`, or the first `X-Forwarded-Proto` value behind a trusted proxy.
    pub fn protocol(&self) -> String {
        if !self.socket_trusted() {
            return "http".to_string();
        }
        match self.header("x-forwarded-proto") {
            Some(proto) => proto.split(',').next().unwrap_or_default().trim().to_string(),
            None => "http".to_string(),
        }
    }

    pub fn secure(&self) -> bool {
        self.protocol() == "https"
    }

    /// Host name without port, honouring `X-Forwarded-Host` behind a trusted proxy.
    pub fn hostname(&self) -> Option<String> {
        let forwarded = self
            .header("x-forwarded-host")
            .filter(|_| self.socket_trusted())
            .map(|host| host.split(',').next().unwrap_or_default().trim_end().to_string());
        let host = forwarded
            .or_else(|| self.header(header::HOST.as_str()))
            .or_else(|| lock(&self.inner).uri.host().map(str::to_string))?;
        if host.is_empty() {
            return None;
        }

        let offset = if host.starts_with('[') {
            host.find(']').map_or(0, |i| i + 1)
        } else {
            0
        };
        Some(match host[offset..].find(':') {
            Some(i) => host[..offset + i].to_string(),
            None => host,
        })
    }

    /// Subdomains in reverse order, minus the `subdomain offset` last labels.
    pub fn subdomains(&self) -> Vec<String> {
        let Some(hostname) = self.hostname() else {
            return Vec::new();
        };
        let offset = self.context().subdomain_offset;
        let labels: Vec<String> = if hostname.trim_matches(['[', ']']).parse::<IpAddr>().is_ok() {
            vec![hostname]
        } else {
            hostname.split('.').rev().map(str::to_string).collect()
        };
        labels.into_iter().skip(offset).collect()
    }

    /// True for requests sent with `X-Requested-With: XMLHttpRequest`.
    pub fn xhr(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("Request")
            .field("method", &state.method)
            .field("original_url", &state.original_url)
            .field("url", &state.url)
            .field("base_url", &state.base_url)
            .field("params", &state.params)
            .finish()
    }
}
