//! JSONP backend: requests made by injecting a script that calls back into
//! a registered function.
//!
//! There is no status code. A request succeeds when the callback ran by the
//! time the script finished loading.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::body::{ResponseBody, ResponseType};
use crate::config::JsonpConfig;
use crate::error::{ConfigError, HttpError, TransportError};
use crate::event::Event;
use crate::handler::{Handler, Interceptor, SharedHandler};
use crate::request::{JSONP_METHOD, Request};
use crate::response::{ErrorCause, ErrorResponse, Response, ResponseInit};
use crate::stream::{EventStream, Observer, Teardown};

pub const JSONP_STATUS_TEXT: &str = "JSONP Error";

// ── Callback namespace ──────────────────────────────────────────────

pub type JsonpCallback = Box<dyn FnOnce(Value) + Send>;

/// Callback-name counter and the registry scripts call into.
///
/// Names are unique per context, so backends that must not collide share
/// one context, usually [`JsonpContext::shared`].
#[derive(Default)]
pub struct JsonpContext {
    counter: AtomicU64,
    callbacks: Mutex<HashMap<String, JsonpCallback>>,
}

impl JsonpContext {
    /// An ad hoc context, independent of every other.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide context.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<JsonpContext>> = OnceLock::new();
        SHARED.get_or_init(JsonpContext::new).clone()
    }

    pub fn next_callback(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    pub fn register(&self, name: &str, callback: JsonpCallback) {
        self.callbacks
            .lock()
            .expect("callbacks lock")
            .insert(name.to_string(), callback);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.callbacks
            .lock()
            .expect("callbacks lock")
            .remove(name)
            .is_some()
    }

    /// Run and unregister the callback `name`. False if none was registered.
    pub fn invoke(&self, name: &str, payload: Value) -> bool {
        let callback = self.callbacks.lock().expect("callbacks lock").remove(name);
        match callback {
            Some(callback) => {
                callback(payload);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks
            .lock()
            .expect("callbacks lock")
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().expect("callbacks lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Document contract ───────────────────────────────────────────────

pub type ScriptListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptEventKind {
    Load,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSignal {
    Load,
    Error(String),
}

pub type ScriptListener = Arc<dyn Fn(&ScriptSignal) + Send + Sync>;

/// A script element that loads its source once attached.
pub trait ScriptElement: Send + Sync {
    fn set_src(&self, url: &str);
    fn add_listener(&self, kind: ScriptEventKind, listener: ScriptListener) -> ScriptListenerId;
    fn remove_listener(&self, kind: ScriptEventKind, id: ScriptListenerId);
    /// Detach from the document if attached.
    fn remove(&self);
}

/// Creates and attaches script elements.
pub trait Document: Send + Sync {
    fn create_script(&self) -> Arc<dyn ScriptElement>;
    fn append_to_body(&self, script: &Arc<dyn ScriptElement>);
}

// ── Backend ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonpState {
    Idle,
    Sent,
    Finished,
    Errored,
    Cancelled,
}

/// Terminal handler for `JSONP` requests.
pub struct JsonpBackend {
    document: Arc<dyn Document>,
    context: Arc<JsonpContext>,
    config: JsonpConfig,
    placeholder: Regex,
}

impl JsonpBackend {
    pub fn new(document: Arc<dyn Document>, context: Arc<JsonpContext>) -> Self {
        Self::build(document, context, JsonpConfig::default())
    }

    pub fn with_config(self, config: JsonpConfig) -> Self {
        Self::build(self.document, self.context, config)
    }

    fn build(document: Arc<dyn Document>, context: Arc<JsonpContext>, config: JsonpConfig) -> Self {
        let pattern = format!("={}(&|$)", regex::escape(&config.placeholder));
        let placeholder = Regex::new(&pattern).expect("escaped placeholder is a valid pattern");
        Self {
            document,
            context,
            config,
            placeholder,
        }
    }

    pub fn context(&self) -> &Arc<JsonpContext> {
        &self.context
    }

    /// Substitute `callback` for the first placeholder, keeping a trailing `&`.
    pub fn rewrite_url(&self, url: &str, callback: &str) -> String {
        self.placeholder
            .replace(url, format!("={callback}${{1}}").as_str())
            .into_owned()
    }
}

impl Handler for JsonpBackend {
    fn handle(&self, req: Request) -> Result<EventStream, HttpError> {
        if req.method() != JSONP_METHOD {
            return Err(ConfigError::WrongMethod.into());
        }
        if req.response_type() != ResponseType::Json {
            return Err(ConfigError::WrongResponseType.into());
        }

        let callback = self.context.next_callback(&self.config.callback_prefix);
        let url = self.rewrite_url(req.url(), &callback);
        let document = self.document.clone();
        let context = self.context.clone();
        Ok(EventStream::from_producer(move |observer| {
            start(document, context, callback, url, observer)
        }))
    }
}

fn start(
    document: Arc<dyn Document>,
    context: Arc<JsonpContext>,
    callback: String,
    url: String,
    observer: Observer,
) -> Teardown {
    let script = document.create_script();
    script.set_src(&url);

    let call = Arc::new(JsonpCall {
        script: Arc::downgrade(&script),
        context: context.clone(),
        callback: callback.clone(),
        url,
        observer: observer.clone(),
        inner: Mutex::new(CallState {
            state: JsonpState::Idle,
            payload: None,
        }),
    });

    let on_callback = call.clone();
    context.register(
        &callback,
        Box::new(move |payload| on_callback.on_callback(payload)),
    );

    let on_load = call.clone();
    let load_id = script.add_listener(
        ScriptEventKind::Load,
        Arc::new(move |_: &ScriptSignal| on_load.on_load()),
    );
    let on_error = call.clone();
    let error_id = script.add_listener(
        ScriptEventKind::Error,
        Arc::new(move |signal: &ScriptSignal| on_error.on_error(signal)),
    );

    debug!(callback = %callback, url = %call.url, "injecting JSONP script");
    document.append_to_body(&script);
    call.set_state(JsonpState::Sent);
    observer.next(Event::Sent);

    Box::new(move || {
        call.cancel();
        script.remove_listener(ScriptEventKind::Load, load_id);
        script.remove_listener(ScriptEventKind::Error, error_id);
        call.cleanup();
    })
}

struct CallState {
    state: JsonpState,
    payload: Option<Value>,
}

struct JsonpCall {
    script: Weak<dyn ScriptElement>,
    context: Arc<JsonpContext>,
    callback: String,
    url: String,
    observer: Observer,
    inner: Mutex<CallState>,
}

impl JsonpCall {
    fn set_state(&self, state: JsonpState) {
        self.inner.lock().expect("jsonp state lock").state = state;
    }

    fn cleanup(&self) {
        if let Some(script) = self.script.upgrade() {
            script.remove();
        }
        self.context.remove(&self.callback);
    }

    fn cancel(&self) {
        let mut inner = self.inner.lock().expect("jsonp state lock");
        if matches!(inner.state, JsonpState::Idle | JsonpState::Sent) {
            debug!(callback = %self.callback, "JSONP request cancelled");
            inner.state = JsonpState::Cancelled;
        }
    }

    fn on_callback(&self, payload: Value) {
        let mut inner = self.inner.lock().expect("jsonp state lock");
        if inner.state != JsonpState::Sent {
            warn!(callback = %self.callback, state = ?inner.state, "discarding JSONP payload");
            return;
        }
        inner.payload = Some(payload);
        inner.state = JsonpState::Finished;
    }

    fn on_load(&self) {
        let payload = {
            let mut inner = self.inner.lock().expect("jsonp state lock");
            match inner.state {
                JsonpState::Finished => Ok(inner.payload.take()),
                JsonpState::Idle | JsonpState::Sent => {
                    inner.state = JsonpState::Errored;
                    Err(TransportError::NoCallback)
                }
                JsonpState::Errored | JsonpState::Cancelled => return,
            }
        };
        self.cleanup();

        match payload {
            Ok(payload) => {
                debug!(callback = %self.callback, "JSONP request completed");
                let body = payload.filter(|v| !v.is_null()).map(ResponseBody::Json);
                let res = Response::new(
                    ResponseInit::new()
                        .with_status(200)
                        .with_status_text("OK")
                        .with_url(self.url.clone()),
                    body,
                );
                self.observer.next(Event::Response(res));
                self.observer.complete();
            }
            Err(cause) => {
                debug!(callback = %self.callback, "JSONP script loaded without calling back");
                self.fail(cause);
            }
        }
    }

    fn on_error(&self, signal: &ScriptSignal) {
        {
            let mut inner = self.inner.lock().expect("jsonp state lock");
            if matches!(inner.state, JsonpState::Errored | JsonpState::Cancelled) {
                return;
            }
            inner.state = JsonpState::Errored;
        }
        self.cleanup();
        let message = match signal {
            ScriptSignal::Error(message) => message.clone(),
            ScriptSignal::Load => "script error".to_string(),
        };
        debug!(callback = %self.callback, error = %message, "JSONP script failed to load");
        self.fail(TransportError::ScriptLoad(message));
    }

    fn fail(&self, cause: TransportError) {
        let res = ErrorResponse::new(
            ResponseInit::new()
                .with_status(0)
                .with_status_text(JSONP_STATUS_TEXT)
                .with_url(self.url.clone()),
            Some(ErrorCause::Transport(cause)),
        );
        self.observer.error(HttpError::Response(res));
    }
}

// ── Interceptor ─────────────────────────────────────────────────────

/// Routes `JSONP` requests to a [`JsonpBackend`] and passes the rest on.
pub struct JsonpInterceptor {
    backend: Arc<JsonpBackend>,
}

impl JsonpInterceptor {
    pub fn new(backend: Arc<JsonpBackend>) -> Self {
        Self { backend }
    }
}

impl Interceptor for JsonpInterceptor {
    fn intercept(&self, req: Request, next: &SharedHandler) -> Result<EventStream, HttpError> {
        if req.method() == JSONP_METHOD {
            return self.backend.handle(req);
        }
        next.handle(req)
    }
}
