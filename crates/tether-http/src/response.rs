//! The response family: header-only responses, full responses and error
//! responses share status, headers, url and `ok` through [`ResponseHead`].

use thiserror::Error;

use crate::body::ResponseBody;
use crate::error::TransportError;
use crate::headers::Headers;

/// Fields shared by every response shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    headers: Headers,
    status: u16,
    status_text: String,
    url: Option<String>,
    ok: bool,
}

impl ResponseHead {
    fn new(init: ResponseInit, default_status: u16, default_status_text: &str) -> Self {
        let status = init.status.unwrap_or(default_status);
        let status_text = match init.status_text {
            Some(text) if !text.is_empty() => text,
            _ => default_status_text.to_string(),
        };
        Self {
            headers: init.headers.unwrap_or_default().sealed(),
            status,
            status_text,
            url: init.url.filter(|u| !u.is_empty()),
            ok: is_success(status),
        }
    }

    fn updated(&self, update: ResponseUpdate) -> ResponseInit {
        ResponseInit {
            headers: Some(update.headers.unwrap_or_else(|| self.headers.clone())),
            status: Some(update.status.unwrap_or(self.status)),
            status_text: Some(update.status_text.unwrap_or_else(|| self.status_text.clone())),
            url: update.url.or_else(|| self.url.clone()),
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Whether the status is in `200..300`. Always false for error responses.
    pub fn ok(&self) -> bool {
        self.ok
    }
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Construction record for responses. Unset fields take the defaults of the
/// shape being built.
#[derive(Debug, Clone, Default)]
pub struct ResponseInit {
    pub headers: Option<Headers>,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub url: Option<String>,
}

impl ResponseInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Overrides for `clone_with`. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ResponseUpdate {
    pub headers: Option<Headers>,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub url: Option<String>,
    /// Only consulted by [`Response::clone_with`]; `Some(None)` clears the body.
    pub body: Option<Option<ResponseBody>>,
}

/// A response carrying only status and headers, emitted before the body
/// when progress is reported.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderResponse {
    head: ResponseHead,
}

impl HeaderResponse {
    pub fn new(init: ResponseInit) -> Self {
        Self {
            head: ResponseHead::new(init, 200, "OK"),
        }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn clone_with(&self, update: ResponseUpdate) -> Self {
        Self::new(self.head.updated(update))
    }
}

/// A full response with an optional decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    head: ResponseHead,
    body: Option<ResponseBody>,
}

impl Response {
    pub fn new(init: ResponseInit, body: Option<ResponseBody>) -> Self {
        Self {
            head: ResponseHead::new(init, 200, "OK"),
            body,
        }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    pub fn into_body(self) -> Option<ResponseBody> {
        self.body
    }

    pub fn clone_with(&self, update: ResponseUpdate) -> Self {
        let body = match update.body.clone() {
            Some(body) => body,
            None => self.body.clone(),
        };
        Self::new(self.head.updated(update), body)
    }
}

/// What went wrong behind an [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCause {
    /// The request never produced a response.
    Transport(TransportError),
    /// The server's error payload.
    Body(ResponseBody),
    /// A successful status whose body could not be decoded as JSON.
    Parse { error: String, text: String },
}

/// A failed request. `ok` is always false.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ErrorResponse {
    head: ResponseHead,
    error: Option<ErrorCause>,
    message: String,
}

impl From<TransportError> for ErrorCause {
    fn from(e: TransportError) -> Self {
        ErrorCause::Transport(e)
    }
}

impl From<ResponseBody> for ErrorCause {
    fn from(body: ResponseBody) -> Self {
        ErrorCause::Body(body)
    }
}

impl ErrorResponse {
    pub fn new(init: ResponseInit, error: Option<ErrorCause>) -> Self {
        let mut head = ResponseHead::new(init, 0, "Unknown Error");
        let url = head.url.as_deref().unwrap_or("(unknown url)");
        let message = if is_success(head.status) {
            format!("Http failure during parsing for {url}")
        } else {
            format!(
                "Http failure response for {url}: {} {}",
                head.status, head.status_text
            )
        };
        head.ok = false;
        Self {
            head,
            error,
            message,
        }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn error(&self) -> Option<&ErrorCause> {
        self.error.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn clone_with(&self, update: ResponseUpdate) -> Self {
        Self::new(self.head.updated(update), self.error.clone())
    }
}

/// Read access to the fields every response shape shares.
pub trait ResponseBase {
    fn response_head(&self) -> &ResponseHead;

    fn status(&self) -> u16 {
        self.response_head().status()
    }

    fn status_text(&self) -> &str {
        self.response_head().status_text()
    }

    fn headers(&self) -> &Headers {
        self.response_head().headers()
    }

    fn url(&self) -> Option<&str> {
        self.response_head().url()
    }

    fn ok(&self) -> bool {
        self.response_head().ok()
    }
}

impl ResponseBase for HeaderResponse {
    fn response_head(&self) -> &ResponseHead {
        &self.head
    }
}

impl ResponseBase for Response {
    fn response_head(&self) -> &ResponseHead {
        &self.head
    }
}

impl ResponseBase for ErrorResponse {
    fn response_head(&self) -> &ResponseHead {
        &self.head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_defaults() {
        let res = Response::new(ResponseInit::default(), None);
        assert_eq!(res.status(), 200);
        assert_eq!(res.status_text(), "OK");
        assert!(res.ok());
        assert!(res.url().is_none());
        assert!(res.headers().is_sealed());
    }

    #[test]
    fn ok_follows_status() {
        let res = HeaderResponse::new(ResponseInit::new().with_status(302));
        assert!(!res.ok());
        let res = HeaderResponse::new(ResponseInit::new().with_status(204));
        assert!(res.ok());
    }

    #[test]
    fn error_defaults() {
        let err = ErrorResponse::new(ResponseInit::default(), None);
        assert_eq!(err.status(), 0);
        assert_eq!(err.status_text(), "Unknown Error");
        assert!(!err.ok());
        assert_eq!(
            err.message(),
            "Http failure response for (unknown url): 0 Unknown Error"
        );
    }

    #[test]
    fn error_in_success_range_is_a_parse_failure() {
        let err = ErrorResponse::new(
            ResponseInit::new().with_status(250).with_url("/api"),
            None,
        );
        assert!(!err.ok());
        assert_eq!(err.message(), "Http failure during parsing for /api");
        assert_eq!(err.to_string(), err.message());
    }

    #[test]
    fn error_outside_success_range_names_status() {
        let err = ErrorResponse::new(
            ResponseInit::new()
                .with_status(404)
                .with_status_text("Not Found")
                .with_url("/api"),
            Some(ErrorCause::Body(ResponseBody::Text("missing".into()))),
        );
        assert_eq!(err.message(), "Http failure response for /api: 404 Not Found");
        assert_eq!(
            err.error(),
            Some(&ErrorCause::Body(ResponseBody::Text("missing".into())))
        );
    }

    #[test]
    fn clone_preserves_unspecified_fields() {
        let res = Response::new(
            ResponseInit::new().with_status(201).with_url("/a"),
            Some(ResponseBody::Json(json!([1]))),
        );
        let copy = res.clone_with(ResponseUpdate {
            status_text: Some("Created".into()),
            ..Default::default()
        });
        assert_eq!(copy.status(), 201);
        assert_eq!(copy.status_text(), "Created");
        assert_eq!(copy.url(), Some("/a"));
        assert_eq!(copy.body(), res.body());

        let cleared = res.clone_with(ResponseUpdate {
            body: Some(None),
            ..Default::default()
        });
        assert!(cleared.body().is_none());
    }

    #[test]
    fn clone_seals_headers() {
        let mut headers = Headers::new();
        headers.set("X-A", "1").unwrap();
        let res = HeaderResponse::new(ResponseInit::default());
        let copy = res.clone_with(ResponseUpdate {
            headers: Some(headers),
            ..Default::default()
        });
        assert!(copy.headers().is_sealed());
        assert_eq!(copy.headers().get("x-a"), Some("1"));
    }

    #[test]
    fn error_clone_recomputes_message() {
        let err = ErrorResponse::new(ResponseInit::new().with_status(500), None);
        let copy = err.clone_with(ResponseUpdate {
            status: Some(502),
            status_text: Some("Bad Gateway".into()),
            ..Default::default()
        });
        assert_eq!(
            copy.message(),
            "Http failure response for (unknown url): 502 Bad Gateway"
        );
        assert!(!copy.ok());
    }
}
