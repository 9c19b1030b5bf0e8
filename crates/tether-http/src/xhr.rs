//! Network backend over an XHR-like transport.
//!
//! The backend drives any [`Xhr`] implementation: it writes the request,
//! listens for load, error and progress signals and turns them into events.
//! With the `reqwest` feature, [`ReqwestXhrFactory`] provides a real
//! transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tracing::{debug, trace, warn};

use crate::body::{ResponseBody, ResponseType, SerializedBody};
use crate::config::XhrConfig;
use crate::error::{ConfigError, HttpError, TransportError};
use crate::event::{DownloadProgress, Event, Progress};
use crate::handler::Handler;
use crate::headers::Headers;
use crate::request::{JSONP_METHOD, Request};
use crate::response::{
    ErrorCause, ErrorResponse, HeaderResponse, Response, ResponseBase, ResponseInit, is_success,
};
use crate::stream::{EventStream, Observer, Teardown};

#[cfg(feature = "reqwest")]
mod reqwest_impl;

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{ReqwestXhr, ReqwestXhrFactory};

// ── Transport contract ──────────────────────────────────────────────

/// Identifies a registered listener for later removal.
pub type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XhrEventKind {
    Load,
    Error,
    DownloadProgress,
    UploadProgress,
}

/// Byte counts of a progress signal. `total` is `None` when the length is
/// not computable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSignal {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// What a transport reports to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum XhrSignal {
    Load,
    Error(TransportError),
    Progress(ProgressSignal),
}

pub type XhrListener = Arc<dyn Fn(&XhrSignal) + Send + Sync>;

/// One transport operation, modelled on `XMLHttpRequest`.
///
/// Implementations must not hold internal locks while invoking listeners:
/// listeners read status, headers and body back from the transport.
pub trait Xhr: Send + Sync {
    fn open(&self, method: &str, url: &str);
    fn set_with_credentials(&self, with_credentials: bool);
    fn set_request_header(&self, name: &str, value: &str);
    fn set_response_type(&self, response_type: ResponseType);
    fn send(&self, body: Option<SerializedBody>);
    fn abort(&self);

    fn status(&self) -> u16;
    fn status_text(&self) -> String;
    /// The body decoded per the response type, or `None` when the transport
    /// only offers text.
    fn response(&self) -> Option<ResponseBody>;
    fn response_text(&self) -> Option<String>;
    fn response_url(&self) -> Option<String>;
    /// Raw `Name: value` lines.
    fn all_response_headers(&self) -> String;
    fn response_header(&self, name: &str) -> Option<String>;

    fn add_listener(&self, kind: XhrEventKind, listener: XhrListener) -> ListenerId;
    fn remove_listener(&self, kind: XhrEventKind, id: ListenerId);

    /// Whether upload progress can be observed.
    fn has_upload(&self) -> bool {
        true
    }
}

/// Produces a fresh [`Xhr`] per request.
pub trait XhrFactory: Send + Sync {
    fn build(&self) -> Arc<dyn Xhr>;
}

// ── Backend ─────────────────────────────────────────────────────────

/// Terminal handler that performs requests over an [`XhrFactory`].
pub struct XhrBackend {
    factory: Arc<dyn XhrFactory>,
    config: Arc<XhrConfig>,
}

impl XhrBackend {
    pub fn new(factory: Arc<dyn XhrFactory>) -> Self {
        Self {
            factory,
            config: Arc::new(XhrConfig::default()),
        }
    }

    pub fn with_config(mut self, config: XhrConfig) -> Self {
        self.config = Arc::new(config);
        self
    }
}

impl Handler for XhrBackend {
    fn handle(&self, req: Request) -> Result<EventStream, HttpError> {
        if req.method() == JSONP_METHOD {
            return Err(ConfigError::JsonpNotInstalled.into());
        }
        let factory = self.factory.clone();
        let config = self.config.clone();
        Ok(EventStream::from_producer(move |observer| {
            start(factory.build(), req, config, observer)
        }))
    }
}

fn start(xhr: Arc<dyn Xhr>, req: Request, config: Arc<XhrConfig>, observer: Observer) -> Teardown {
    debug!(method = req.method(), url = req.url(), "dispatching request");

    xhr.open(req.method(), req.url());
    if req.with_credentials() {
        xhr.set_with_credentials(true);
    }

    req.headers()
        .for_each(|values, name| xhr.set_request_header(name, &values.join(",")));
    if !req.headers().has("Accept") {
        xhr.set_request_header("Accept", &config.default_accept);
    }
    if !req.headers().has("Content-Type")
        && let Some(content_type) = req.detect_content_type_header()
    {
        xhr.set_request_header("Content-Type", &content_type);
    }

    xhr.set_response_type(req.response_type());

    let body = req.serialize_body();
    let has_body = body.is_some();
    let report_progress = req.report_progress();

    let call = Arc::new(XhrCall {
        xhr: Arc::downgrade(&xhr),
        req,
        config,
        observer: observer.clone(),
        header: OnceLock::new(),
        sent_headers: AtomicBool::new(false),
        finished: AtomicBool::new(false),
    });

    let mut registrations = Vec::new();
    let listen = |kind: XhrEventKind, f: fn(&XhrCall, &dyn Xhr, &XhrSignal)| {
        let call = call.clone();
        let listener: XhrListener = Arc::new(move |signal: &XhrSignal| {
            if let Some(xhr) = call.xhr.upgrade() {
                f(&call, &*xhr, signal);
            }
        });
        (kind, xhr.add_listener(kind, listener))
    };

    registrations.push(listen(XhrEventKind::Load, XhrCall::on_load));
    registrations.push(listen(XhrEventKind::Error, XhrCall::on_error));
    if report_progress {
        registrations.push(listen(
            XhrEventKind::DownloadProgress,
            XhrCall::on_download_progress,
        ));
        if has_body && xhr.has_upload() {
            registrations.push(listen(XhrEventKind::UploadProgress, XhrCall::on_upload_progress));
        }
    }

    xhr.send(body);
    observer.next(Event::Sent);

    Box::new(move || {
        for (kind, id) in registrations {
            xhr.remove_listener(kind, id);
        }
        if !call.finished.load(Ordering::SeqCst) {
            debug!(url = call.req.url(), "aborting request");
            xhr.abort();
        }
    })
}

/// Per-request state shared by the listeners of one transport operation.
struct XhrCall {
    xhr: Weak<dyn Xhr>,
    req: Request,
    config: Arc<XhrConfig>,
    observer: Observer,
    header: OnceLock<HeaderResponse>,
    sent_headers: AtomicBool,
    finished: AtomicBool,
}

impl XhrCall {
    /// Status, headers and url of the response, extracted once per request.
    fn partial(&self, xhr: &dyn Xhr) -> &HeaderResponse {
        self.header.get_or_init(|| {
            let mut status = xhr.status();
            if self.config.quirks.remap_status_1223 && status == 1223 {
                status = 204;
            }
            let status_text = xhr.status_text();
            let status_text = if status_text.is_empty() {
                "OK".to_string()
            } else {
                status_text
            };
            let url = response_url(xhr).unwrap_or_else(|| self.req.url().to_string());
            HeaderResponse::new(ResponseInit {
                headers: Some(Headers::from_response_text(xhr.all_response_headers())),
                status: Some(status),
                status_text: Some(status_text),
                url: Some(url),
            })
        })
    }

    fn on_load(&self, xhr: &dyn Xhr, _signal: &XhrSignal) {
        let partial = self.partial(xhr);
        let mut status = partial.status();

        let mut body = None;
        if status != 204 {
            body = xhr
                .response()
                .or_else(|| xhr.response_text().map(ResponseBody::Text));
            if self.config.strip_xssi_prefix
                && let Some(ResponseBody::Text(text)) = &mut body
            {
                strip_xssi_prefix(text);
            }
        }

        if status == 0 && self.config.quirks.promote_status_zero {
            status = if body_received(body.as_ref()) { 200 } else { 0 };
        }

        let mut ok = is_success(status);
        let mut cause = None;
        let parse_json = self.req.response_type() == ResponseType::Json;
        body = match body {
            Some(ResponseBody::Text(text)) if ok && parse_json => match decode_json(&text) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(url = self.req.url(), status, error = %e, "response body is not valid JSON");
                    ok = false;
                    cause = Some(ErrorCause::Parse {
                        error: e.to_string(),
                        text,
                    });
                    None
                }
            },
            other => other,
        };

        self.finished.store(true, Ordering::SeqCst);
        let init = ResponseInit {
            headers: Some(partial.headers().clone()),
            status: Some(status),
            status_text: Some(partial.status_text().to_string()),
            url: partial.url().map(str::to_string),
        };

        if ok {
            debug!(url = self.req.url(), status, "request completed");
            self.observer.next(Event::Response(Response::new(init, body)));
            self.observer.complete();
        } else {
            debug!(url = self.req.url(), status, "request failed");
            let error = cause.or_else(|| body.map(ErrorCause::Body));
            self.observer
                .error(HttpError::Response(ErrorResponse::new(init, error)));
        }
    }

    fn on_error(&self, xhr: &dyn Xhr, signal: &XhrSignal) {
        let cause = match signal {
            XhrSignal::Error(e) => e.clone(),
            _ => TransportError::Network("transport error".to_string()),
        };
        debug!(url = self.req.url(), error = %cause, "transport failure");
        self.finished.store(true, Ordering::SeqCst);
        let res = ErrorResponse::new(
            ResponseInit {
                headers: None,
                status: Some(xhr.status()),
                status_text: Some(xhr.status_text()),
                url: Some(self.req.url().to_string()),
            },
            Some(ErrorCause::Transport(cause)),
        );
        self.observer.error(HttpError::Response(res));
    }

    fn on_download_progress(&self, xhr: &dyn Xhr, signal: &XhrSignal) {
        let XhrSignal::Progress(progress) = signal else {
            return;
        };
        if !self.sent_headers.swap(true, Ordering::SeqCst) {
            self.observer
                .next(Event::ResponseHeader(self.partial(xhr).clone()));
        }
        let partial_text = if self.req.response_type() == ResponseType::Text {
            xhr.response_text().filter(|text| !text.is_empty())
        } else {
            None
        };
        trace!(loaded = progress.loaded, total = ?progress.total, "download progress");
        self.observer.next(Event::DownloadProgress(DownloadProgress {
            loaded: progress.loaded,
            total: progress.total,
            partial_text,
        }));
    }

    fn on_upload_progress(&self, _xhr: &dyn Xhr, signal: &XhrSignal) {
        let XhrSignal::Progress(progress) = signal else {
            return;
        };
        trace!(loaded = progress.loaded, total = ?progress.total, "upload progress");
        self.observer.next(Event::UploadProgress(Progress {
            loaded: progress.loaded,
            total: progress.total,
        }));
    }
}

/// `responseURL`, falling back to an `X-Request-URL` response header.
fn response_url(xhr: &dyn Xhr) -> Option<String> {
    if let Some(url) = xhr.response_url().filter(|u| !u.is_empty()) {
        return Some(url);
    }
    let raw = xhr.all_response_headers();
    if raw.lines().any(|line| line.starts_with("X-Request-URL:")) {
        return xhr.response_header("X-Request-URL");
    }
    None
}

/// Remove a leading `)]}'` guard, optionally followed by `,`, then a newline.
pub fn strip_xssi_prefix(text: &mut String) {
    let Some(rest) = text.strip_prefix(")]}'") else {
        return;
    };
    let rest = rest.strip_prefix(',').unwrap_or(rest);
    if let Some(rest) = rest.strip_prefix('\n') {
        *text = rest.to_string();
    }
}

fn body_received(body: Option<&ResponseBody>) -> bool {
    match body {
        None => false,
        Some(ResponseBody::Text(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

fn decode_json(text: &str) -> Result<Option<ResponseBody>, serde_json::Error> {
    Ok(Some(ResponseBody::Json(serde_json::from_str(text)?)))
}
