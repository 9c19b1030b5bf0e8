//! Requests captured by the testing backend, answered by hand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use tether_http::{
    Blob, ErrorCause, ErrorResponse, Event, Headers, HttpError, Observer, Request, Response,
    ResponseBody, ResponseInit, ResponseType,
};

use crate::error::TestingError;

/// A body handed to [`TestRequest::flush`], converted to the request's
/// response type before delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushBody {
    Null,
    Bytes(Bytes),
    Blob(Blob),
    Value(Value),
}

impl From<Bytes> for FlushBody {
    fn from(data: Bytes) -> Self {
        FlushBody::Bytes(data)
    }
}

impl From<Blob> for FlushBody {
    fn from(blob: Blob) -> Self {
        FlushBody::Blob(blob)
    }
}

impl From<Value> for FlushBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FlushBody::Null,
            other => FlushBody::Value(other),
        }
    }
}

impl From<&str> for FlushBody {
    fn from(text: &str) -> Self {
        FlushBody::Value(Value::String(text.to_string()))
    }
}

impl From<String> for FlushBody {
    fn from(text: String) -> Self {
        FlushBody::Value(Value::String(text))
    }
}

impl<T: Into<FlushBody>> From<Option<T>> for FlushBody {
    fn from(body: Option<T>) -> Self {
        body.map_or(FlushBody::Null, Into::into)
    }
}

/// Status and headers for [`TestRequest::flush`].
#[derive(Debug, Clone, Default)]
pub struct FlushOptions {
    pub headers: Option<Headers>,
    pub status: Option<u16>,
    pub status_text: Option<String>,
}

impl FlushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = Some(status);
        self.status_text = Some(status_text.into());
        self
    }

    /// Set only the status; flushing then fails unless text is given too.
    pub fn status_code(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }
}

/// Status and headers for [`TestRequest::error`]. Status defaults to 0.
pub type ErrorOptions = FlushOptions;

struct Inner {
    request: Request,
    observer: Observer,
    cancelled: AtomicBool,
}

/// A request captured by
/// [`HttpClientTestingBackend`](crate::HttpClientTestingBackend), waiting to
/// be answered.
#[derive(Clone)]
pub struct TestRequest {
    inner: Arc<Inner>,
}

impl TestRequest {
    pub(crate) fn new(request: Request, observer: Observer) -> Self {
        Self {
            inner: Arc::new(Inner {
                request,
                observer,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn mark_cancelled(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Whether the subscriber went away, either by cancelling or after the
    /// stream terminated.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Answer with `body`. A 2xx status delivers a `Response` and completes
    /// the stream; any other status fails it with an `ErrorResponse`.
    pub fn flush(&self, body: impl Into<FlushBody>, opts: FlushOptions) -> Result<(), TestingError> {
        if self.is_cancelled() {
            return Err(TestingError::FlushCancelled);
        }
        let body = convert_body(self.request().response_type(), body.into())?;
        let (status, status_text) = match opts.status {
            Some(status) => (status, opts.status_text.ok_or(TestingError::MissingStatusText)?),
            None if body.is_none() => (204, opts.status_text.unwrap_or_else(|| "No Content".into())),
            None => (200, opts.status_text.unwrap_or_else(|| "OK".into())),
        };
        let init = ResponseInit {
            headers: Some(opts.headers.unwrap_or_default()),
            status: Some(status),
            status_text: Some(status_text),
            url: Some(self.request().url().to_string()),
        };

        debug!(url = self.request().url(), status, "flushing test request");
        let observer = &self.inner.observer;
        if (200..300).contains(&status) {
            observer.next(Event::Response(Response::new(init, body)));
            observer.complete();
        } else {
            observer.error(HttpError::Response(ErrorResponse::new(
                init,
                body.map(ErrorCause::Body),
            )));
        }
        Ok(())
    }

    /// Fail the request with `cause`, as if the transport had.
    pub fn error(&self, cause: impl Into<ErrorCause>, opts: ErrorOptions) -> Result<(), TestingError> {
        if self.is_cancelled() {
            return Err(TestingError::ErrorCancelled);
        }
        if let Some(status) = opts.status
            && (200..300).contains(&status)
        {
            return Err(TestingError::SuccessfulStatus);
        }
        let status = opts.status.unwrap_or(0);
        debug!(url = self.request().url(), status, "failing test request");
        let init = ResponseInit {
            headers: Some(opts.headers.unwrap_or_default()),
            status: Some(status),
            status_text: Some(opts.status_text.unwrap_or_default()),
            url: Some(self.request().url().to_string()),
        };
        self.inner
            .observer
            .error(HttpError::Response(ErrorResponse::new(init, Some(cause.into()))));
        Ok(())
    }

    /// Deliver an arbitrary event without terminating the stream.
    pub fn event(&self, event: Event) -> Result<(), TestingError> {
        if self.is_cancelled() {
            return Err(TestingError::EventCancelled);
        }
        self.inner.observer.next(event);
        Ok(())
    }
}

impl std::fmt::Debug for TestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRequest")
            .field("method", &self.request().method())
            .field("url", &self.request().url())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ── Body conversion ─────────────────────────────────────────────────

fn convert_body(
    response_type: ResponseType,
    body: FlushBody,
) -> Result<Option<ResponseBody>, TestingError> {
    let converted = match (response_type, body) {
        (ResponseType::Json, FlushBody::Null) => ResponseBody::Json(Value::Null),
        (_, FlushBody::Null) => return Ok(None),

        (ResponseType::ArrayBuffer, FlushBody::Bytes(data)) => ResponseBody::ArrayBuffer(data),
        (ResponseType::ArrayBuffer, _) => return Err(unsupported("ArrayBuffer", "response type")),

        (ResponseType::Blob, FlushBody::Blob(blob)) => ResponseBody::Blob(blob),
        (ResponseType::Blob, FlushBody::Bytes(data)) => ResponseBody::Blob(Blob::new(data)),
        (ResponseType::Blob, _) => return Err(unsupported("Blob", "response type")),

        (ResponseType::Json, body) => ResponseBody::Json(to_json(body, "JSON")?),

        (ResponseType::Text, FlushBody::Value(Value::String(text))) => ResponseBody::Text(text),
        (ResponseType::Text, body) => ResponseBody::Text(to_json(body, "text")?.to_string()),
    };
    Ok(Some(converted))
}

fn to_json(body: FlushBody, target: &'static str) -> Result<Value, TestingError> {
    match body {
        FlushBody::Bytes(_) => Err(unsupported(target, "ArrayBuffers")),
        FlushBody::Blob(_) => Err(unsupported(target, "Blobs")),
        FlushBody::Value(Value::Bool(_)) => Err(unsupported(target, "response type")),
        FlushBody::Value(value) => Ok(value),
        FlushBody::Null => Ok(Value::Null),
    }
}

fn unsupported(target: &'static str, source_kind: &'static str) -> TestingError {
    TestingError::Conversion {
        target,
        source_kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_null_flushes_as_null_value() {
        assert_eq!(
            convert_body(ResponseType::Json, FlushBody::Null).unwrap(),
            Some(ResponseBody::Json(Value::Null))
        );
        assert_eq!(convert_body(ResponseType::Text, FlushBody::Null).unwrap(), None);
    }

    #[test]
    fn bytes_wrap_into_untyped_blob() {
        let body = convert_body(ResponseType::Blob, Bytes::from_static(b"ab").into()).unwrap();
        assert_eq!(body, Some(ResponseBody::Blob(Blob::new(Bytes::from_static(b"ab")))));
    }

    #[test]
    fn text_stringifies_json_values() {
        assert_eq!(
            convert_body(ResponseType::Text, json!({ "a": 1 }).into()).unwrap(),
            Some(ResponseBody::Text(r#"{"a":1}"#.to_string()))
        );
        assert_eq!(
            convert_body(ResponseType::Text, "plain".into()).unwrap(),
            Some(ResponseBody::Text("plain".to_string()))
        );
    }

    #[test]
    fn binary_bodies_reject_structured_types() {
        let err = convert_body(ResponseType::Json, Bytes::from_static(b"x").into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "automatic conversion to JSON is not supported for ArrayBuffers"
        );
        let err = convert_body(ResponseType::Text, Blob::new(Bytes::new()).into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "automatic conversion to text is not supported for Blobs"
        );
        assert!(convert_body(ResponseType::ArrayBuffer, "x".into()).is_err());
        assert!(convert_body(ResponseType::Json, json!(true).into()).is_err());
    }
}
