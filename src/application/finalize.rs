use {
    super::Application,
    crate::{
        Error, ErrorKind, ErrorResponse, Next, Request, Response,
        utils::{encode_url, split_path_query},
    },
    axum::body::Body,
    http::{HeaderValue, StatusCode, header},
};

impl Application {
    /// Serves one request end to end.
    ///
    /// Requests nobody answered get a `404`; errors nobody handled get an
    /// error response built from the error's status and message.
    pub async fn handle(&self, request: http::Request<Body>) -> http::Response<Body> {
        let req = Request::from_http(request);
        let res = Response::new(&req);

        match self.dispatch(req.clone(), res.clone()).await {
            Ok(Next::Done) => {}
            Ok(_) if res.is_finished() => {}
            Ok(_) => self.not_found(&req, &res),
            Err(err) => self.unhandled(err, &req, &res),
        }
        res.take_http()
    }

    fn not_found(&self, req: &Request, res: &Response) {
        let original = req.original_url();
        let (path, _) = split_path_query(&original);
        let message = format!("Cannot {} {}", req.method(), encode_url(path));
        tracing::debug!(method = %req.method(), url = %original, "no handler matched");
        send_error(
            res,
            StatusCode::NOT_FOUND,
            ErrorResponse::new("NOT_FOUND", message),
        );
    }

    fn unhandled(&self, err: Error, req: &Request, res: &Response) {
        let env = self.env();
        if env != "test" {
            tracing::error!(
                error_code = err.error_code(),
                method = %req.method(),
                url = %req.original_url(),
                error = %err,
                "unhandled error"
            );
        }

        if res.is_finished() {
            return;
        }

        let status = error_status(&err, res);
        let message = if env == "production" {
            status.canonical_reason().unwrap_or("Error").to_string()
        } else {
            err.to_string()
        };
        send_error(res, status, ErrorResponse::new(err.error_code(), message));
    }
}

/// Status of an unhandled error: its explicit 4xx/5xx status, the status
/// implied by its kind, a 4xx/5xx already set on the response, else `500`.
fn error_status(err: &Error, res: &Response) -> StatusCode {
    let is_error = |s: &StatusCode| s.is_client_error() || s.is_server_error();
    if let Some(status) = err.status().filter(is_error) {
        return status;
    }
    match err.kind() {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => Some(res.status_code())
            .filter(is_error)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn send_error(res: &Response, status: StatusCode, body: ErrorResponse) {
    res.status(status)
        .remove_header(header::CONTENT_ENCODING.as_str())
        .remove_header(header::CONTENT_LANGUAGE.as_str())
        .remove_header(header::CONTENT_RANGE.as_str())
        .insert_header(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'"),
        )
        .insert_header(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        )
        .insert_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
    if let Err(err) = res.json(&body) {
        tracing::error!(error = %err, "failed to send error response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::request;
    use http::Method;

    #[test]
    fn explicit_status_wins() {
        let (_, res) = request(Method::GET, "/");
        let err = Error::handler("gone").with_status(StatusCode::GONE);
        assert_eq!(error_status(&err, &res), StatusCode::GONE);
    }

    #[test]
    fn non_error_status_is_ignored() {
        let (_, res) = request(Method::GET, "/");
        let err = Error::handler("moved").with_status(StatusCode::MOVED_PERMANENTLY);
        assert_eq!(error_status(&err, &res), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn kind_then_response_status() {
        let (_, res) = request(Method::GET, "/");
        assert_eq!(
            error_status(&Error::invalid_input("bad"), &res),
            StatusCode::BAD_REQUEST
        );
        res.status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            error_status(&Error::handler("x"), &res),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_response_headers() {
        let (_, res) = request(Method::GET, "/");
        res.set_header("content-encoding", "gzip").unwrap();
        send_error(&res, StatusCode::NOT_FOUND, ErrorResponse::new("NOT_FOUND", "nope"));
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert!(res.header("content-encoding").is_none());
        assert_eq!(
            res.header("content-security-policy").as_deref(),
            Some("default-src 'none'")
        );
        assert_eq!(res.header("x-content-type-options").as_deref(), Some("nosniff"));
        assert_eq!(
            res.body(),
            r#"{"error_code":"NOT_FOUND","message":"nope"}"#.as_bytes()
        );
    }
}
