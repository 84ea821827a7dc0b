use {
    super::Request,
    crate::{
        Error, Result,
        utils::{encode_url, lock},
    },
    axum::body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    serde::Serialize,
    serde_json::{Map, Value, ser::PrettyFormatter},
    std::{
        fmt, mem,
        sync::{Arc, Mutex},
    },
};

struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    finished: bool,
    locals: Map<String, Value>,
}

/// Handle to the outgoing response.
///
/// Setters return `&Self` so they chain; the `send` family finishes the
/// response and can only succeed once.
///
/// ```rust
/// # use axum_relay::{Request, Response};
/// # use http::StatusCode;
/// # fn demo(res: Response) -> axum_relay::Result<()> {
/// res.status(StatusCode::CREATED)
///     .set_header("x-request-id", "abc")?
///     .json(&serde_json::json!({ "id": 7 }))
/// # }
/// ```
#[derive(Clone)]
pub struct Response {
    inner: Arc<Mutex<ResponseState>>,
    request: Request,
}

impl Response {
    pub fn new(req: &Request) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                finished: false,
                locals: Map::new(),
            })),
            request: req.clone(),
        }
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn status(&self, status: StatusCode) -> &Self {
        lock(&self.inner).status = status;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        lock(&self.inner).status
    }

    // =======================================================================
    // Headers
    // =======================================================================

    pub fn set_header(&self, name: &str, value: &str) -> Result<&Self> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        lock(&self.inner).headers.insert(name, value);
        Ok(self)
    }

    pub(crate) fn insert_header(&self, name: HeaderName, value: HeaderValue) -> &Self {
        lock(&self.inner).headers.insert(name, value);
        self
    }

    pub fn append_header(&self, name: &str, value: &str) -> Result<&Self> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        lock(&self.inner).headers.append(name, value);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        lock(&self.inner)
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn headers(&self) -> HeaderMap {
        lock(&self.inner).headers.clone()
    }

    pub fn remove_header(&self, name: &str) -> &Self {
        lock(&self.inner).headers.remove(name);
        self
    }

    /// Sets `Content-Type` from a MIME type or a short name such as `json` or `.html`.
    pub fn content_type(&self, ty: &str) -> Result<&Self> {
        let mime = if ty.contains('/') {
            ty.to_string()
        } else {
            mime_for(ty.trim_start_matches('.')).to_string()
        };
        self.set_header(header::CONTENT_TYPE.as_str(), &mime)
    }

    // =======================================================================
    // Locals
    // =======================================================================

    /// Variables passed to every view rendered for this response.
    pub fn locals(&self) -> Map<String, Value> {
        lock(&self.inner).locals.clone()
    }

    pub fn set_local(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        lock(&self.inner).locals.insert(key.into(), value.into());
        self
    }

    // =======================================================================
    // Sending
    // =======================================================================

    pub fn is_finished(&self) -> bool {
        lock(&self.inner).finished
    }

    /// The body sent so far; empty until the response is finished.
    pub fn body(&self) -> Bytes {
        lock(&self.inner).body.clone()
    }

    /// Sends a text body, `text/html` unless a content type was set.
    pub fn send(&self, body: impl Into<String>) -> Result<()> {
        let body = body.into();
        {
            let mut state = lock(&self.inner);
            let content_type = match state.headers.get(header::CONTENT_TYPE) {
                Some(ct) => with_utf8_charset(ct.to_str().unwrap_or_default()),
                None => "text/html; charset=utf-8".to_string(),
            };
            state
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::try_from(content_type)?);
        }
        self.finish(Bytes::from(body))
    }

    /// Sends a binary body, `application/octet-stream` unless a content type was set.
    pub fn send_bytes(&self, body: impl Into<Bytes>) -> Result<()> {
        lock(&self.inner)
            .headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/octet-stream"));
        self.finish(body.into())
    }

    /// Sends `value` as JSON, formatted per the `json spaces` and `json escape` settings.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = self.stringify(value)?;
        lock(&self.inner)
            .headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        self.send(body)
    }

    /// Sends `value` as JSON, wrapped in a call to the callback named by the
    /// query parameter configured as `jsonp callback name`.
    pub fn jsonp<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let mut body = self.stringify(value)?;
        let context = self.request.context();
        let callback = match self.request.query().get(&context.jsonp_callback) {
            Some(Value::Array(items)) => items.first().cloned(),
            other => other.cloned(),
        };

        if self.header(header::CONTENT_TYPE.as_str()).is_none() {
            self.set_header(header::X_CONTENT_TYPE_OPTIONS.as_str(), "nosniff")?;
            self.set_header(header::CONTENT_TYPE.as_str(), "application/json")?;
        }

        if let Some(Value::String(callback)) = callback
            && !callback.is_empty()
        {
            let callback: String = callback
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
                .collect();
            self.set_header(header::X_CONTENT_TYPE_OPTIONS.as_str(), "nosniff")?;
            self.set_header(header::CONTENT_TYPE.as_str(), "text/javascript")?;
            body = body.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");
            body = format!("/**/ typeof {callback} === 'function' && {callback}({body});");
        }
        self.send(body)
    }

    /// Sends the status with its reason phrase as a plain text body.
    pub fn send_status(&self, status: StatusCode) -> Result<()> {
        self.status(status).content_type("txt")?;
        let body = status
            .canonical_reason()
            .map_or_else(|| status.as_str().to_string(), str::to_string);
        self.send(body)
    }

    /// Redirects with `302 Found`. `back` redirects to the referrer, or `/`.
    pub fn redirect(&self, url: &str) -> Result<()> {
        self.redirect_with(StatusCode::FOUND, url)
    }

    pub fn redirect_with(&self, status: StatusCode, url: &str) -> Result<()> {
        let address = if url == "back" {
            self.request.header("referrer").unwrap_or_else(|| "/".to_string())
        } else {
            url.to_string()
        };
        let location = encode_url(&address);
        let reason = status.canonical_reason().unwrap_or_default();

        let accept = self.request.header(header::ACCEPT.as_str());
        let accepts = |ty: &str| accept.as_deref().is_none_or(|a| a.contains(ty));
        let body = if accept.as_deref().is_some_and(|a| a.contains("text/html")) {
            self.content_type("html")?;
            let escaped = escape_html(&location);
            format!("<p>{reason}. Redirecting to <a href=\"{escaped}\">{escaped}</a></p>")
        } else if accepts("text/plain") || accepts("*/*") || accepts("text/*") {
            self.content_type("txt")?;
            format!("{reason}. Redirecting to {location}")
        } else {
            String::new()
        };

        self.status(status)
            .set_header(header::LOCATION.as_str(), &location)?
            .append_header(header::VARY.as_str(), "Accept")?;
        self.send(body)
    }

    /// Renders the view `name` with the application's locals, this
    /// response's locals and `locals`, then sends the result as HTML.
    pub async fn render(&self, name: &str, locals: Map<String, Value>) -> Result<()> {
        let app = self.request.app().ok_or_else(|| {
            Error::view("Views can only be rendered while an application dispatches the request")
        })?;
        let mut merged = self.locals();
        merged.extend(locals);
        let html = app.render(name, merged).await?;
        self.send(html)
    }

    fn stringify<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let context = self.request.context();
        let json = match &context.json_spaces {
            Some(indent) => {
                let mut buf = Vec::new();
                let formatter = PrettyFormatter::with_indent(indent.as_bytes());
                let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
                value.serialize(&mut serializer)?;
                String::from_utf8(buf).map_err(|e| Error::internal(e.to_string()))?
            }
            None => serde_json::to_string(value)?,
        };
        Ok(if context.json_escape {
            json.replace('<', "\\u003c")
                .replace('>', "\\u003e")
                .replace('&', "\\u0026")
        } else {
            json
        })
    }

    /// Stores the final body, applying ETag, freshness and bodiless-status rules.
    fn finish(&self, body: Bytes) -> Result<()> {
        let etag_mode = self.request.context().etag;
        let method = self.request.method();
        let if_none_match = self.request.header(header::IF_NONE_MATCH.as_str());
        let cache_control = self.request.header(header::CACHE_CONTROL.as_str());

        let mut state = lock(&self.inner);
        if state.finished {
            return Err(Error::internal("Cannot send a response that has already been sent"));
        }

        state
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        if !state.headers.contains_key(header::ETAG)
            && let Some(tag) = etag_mode.generate(&body)
        {
            state.headers.insert(header::ETAG, HeaderValue::try_from(tag)?);
        }

        let etag = state
            .headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok());
        if is_fresh(&method, state.status, etag, if_none_match.as_deref(), cache_control.as_deref()) {
            state.status = StatusCode::NOT_MODIFIED;
        }

        let mut body = body;
        match state.status {
            StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED => {
                state.headers.remove(header::CONTENT_TYPE);
                state.headers.remove(header::CONTENT_LENGTH);
                state.headers.remove(header::TRANSFER_ENCODING);
                body = Bytes::new();
            }
            StatusCode::RESET_CONTENT => {
                state
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                state.headers.remove(header::TRANSFER_ENCODING);
                body = Bytes::new();
            }
            _ => {}
        }
        if method == Method::HEAD {
            body = Bytes::new();
        }

        state.body = body;
        state.finished = true;
        Ok(())
    }

    /// Moves the response out into an `http::Response`.
    pub(crate) fn take_http(&self) -> http::Response<Body> {
        let mut state = lock(&self.inner);
        let mut response = http::Response::new(Body::from(mem::take(&mut state.body)));
        *response.status_mut() = state.status;
        *response.headers_mut() = mem::take(&mut state.headers);
        response
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("Response")
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("finished", &state.finished)
            .finish()
    }
}

fn mime_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "txt" | "text" => "text/plain; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Replaces any `charset` parameter of `content_type` with `utf-8`.
fn with_utf8_charset(content_type: &str) -> String {
    let mut parts = content_type.split(';').map(str::trim);
    let essence = parts.next().unwrap_or_default();
    let mut rebuilt = String::from(essence);
    for param in parts.filter(|p| !p.is_empty() && !p.to_ascii_lowercase().starts_with("charset=")) {
        rebuilt.push_str("; ");
        rebuilt.push_str(param);
    }
    rebuilt.push_str("; charset=utf-8");
    rebuilt
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn is_fresh(
    method: &Method,
    status: StatusCode,
    etag: Option<&str>,
    if_none_match: Option<&str>,
    cache_control: Option<&str>,
) -> bool {
    if *method != Method::GET && *method != Method::HEAD {
        return false;
    }
    if !status.is_success() && status != StatusCode::NOT_MODIFIED {
        return false;
    }
    let Some(if_none_match) = if_none_match else {
        return false;
    };
    if cache_control.is_some_and(|cc| cc.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-cache"))) {
        return false;
    }
    if if_none_match.trim() == "*" {
        return true;
    }
    let Some(etag) = etag else {
        return false;
    };
    let strip = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let etag = strip(etag);
    if_none_match.split(',').any(|candidate| strip(candidate) == etag)
}
