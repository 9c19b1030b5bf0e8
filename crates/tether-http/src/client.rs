//! The client façade.
//!
//! [`HttpClient`] builds requests from convenience call shapes and returns a
//! [`Call`]: a deferred computation that runs the whole handler chain again
//! for every [`Subscription`] taken from it, then projects the event stream
//! down to what the caller asked to observe.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tracing::debug;

use crate::body::{Body, ResponseBody, ResponseType};
use crate::config::ClientConfig;
use crate::error::{ConfigError, HttpError};
use crate::event::Event;
use crate::handler::{SharedHandler, SharedInterceptor, intercepting_handler};
use crate::headers::Headers;
use crate::jsonp::{Document, JsonpBackend, JsonpContext, JsonpInterceptor};
use crate::params::UrlParams;
use crate::request::{JSONP_METHOD, Request, RequestInit, append_params};
use crate::response::Response;
use crate::stream::EventStream;
use crate::xhr::{XhrBackend, XhrFactory};

/// What a caller wants to see of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Observe {
    #[default]
    Body,
    Response,
    Events,
}

/// One item of a subscription taken with [`Call::observe`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Body(Option<ResponseBody>),
    Response(Response),
    Event(Event),
}

/// Options for [`HttpClient::request`] and the verb helpers.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Option<Headers>,
    pub params: Option<UrlParams>,
    pub body: Option<Body>,
    pub observe: Observe,
    pub response_type: ResponseType,
    pub report_progress: bool,
    pub with_credentials: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn params(mut self, params: UrlParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Append one query parameter.
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(UrlParams::new)
            .append(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn observe(mut self, observe: Observe) -> Self {
        self.observe = observe;
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn report_progress(mut self, report: bool) -> Self {
        self.report_progress = report;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Issues requests through a handler chain.
#[derive(Clone)]
pub struct HttpClient {
    handler: SharedHandler,
    jsonp_placeholder: String,
}

impl HttpClient {
    /// A client over an already assembled handler chain.
    pub fn new(handler: SharedHandler) -> Self {
        Self {
            handler,
            jsonp_placeholder: ClientConfig::default().jsonp.placeholder,
        }
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// A pre-built request. Subscriptions observe raw events unless told
    /// otherwise.
    pub fn send(&self, request: Request) -> Call {
        Call {
            handler: self.handler.clone(),
            request,
            observe: Observe::Events,
        }
    }

    /// Build a request from `method`, `url` and `options`.
    pub fn request(&self, method: &str, url: &str, options: RequestOptions) -> Call {
        let url = match &options.params {
            Some(params) => append_params(url, params),
            None => url.to_string(),
        };
        let init = RequestInit {
            headers: options.headers,
            report_progress: options.report_progress,
            with_credentials: options.with_credentials,
            response_type: options.response_type,
        };
        Call {
            handler: self.handler.clone(),
            request: Request::with_body(method, url, options.body, init),
            observe: options.observe,
        }
    }

    pub fn get(&self, url: &str, options: RequestOptions) -> Call {
        self.request("GET", url, options)
    }

    pub fn head(&self, url: &str, options: RequestOptions) -> Call {
        self.request("HEAD", url, options)
    }

    pub fn delete(&self, url: &str, options: RequestOptions) -> Call {
        self.request("DELETE", url, options)
    }

    pub fn options(&self, url: &str, options: RequestOptions) -> Call {
        self.request("OPTIONS", url, options)
    }

    pub fn post(&self, url: &str, body: impl Into<Option<Body>>, options: RequestOptions) -> Call {
        self.request("POST", url, with_body(options, body))
    }

    pub fn put(&self, url: &str, body: impl Into<Option<Body>>, options: RequestOptions) -> Call {
        self.request("PUT", url, with_body(options, body))
    }

    pub fn patch(&self, url: &str, body: impl Into<Option<Body>>, options: RequestOptions) -> Call {
        self.request("PATCH", url, with_body(options, body))
    }

    /// A JSONP request; `callback_param` names the query parameter the
    /// server reads the callback name from.
    pub fn jsonp(&self, url: &str, callback_param: &str) -> Call {
        let options = RequestOptions::new()
            .param(callback_param, self.jsonp_placeholder.clone())
            .response_type(ResponseType::Json);
        self.request(JSONP_METHOD, url, options)
    }
}

fn with_body(mut options: RequestOptions, body: impl Into<Option<Body>>) -> RequestOptions {
    options.body = body.into();
    options
}

/// Assembles an [`HttpClient`] from a backend, interceptors and config.
#[derive(Default)]
pub struct ClientBuilder {
    backend: Option<SharedHandler>,
    xhr: Option<Arc<dyn XhrFactory>>,
    interceptors: Vec<SharedInterceptor>,
    jsonp: Option<(Arc<dyn Document>, Arc<JsonpContext>)>,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Use `backend` as the terminal handler.
    pub fn backend(mut self, backend: SharedHandler) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use an [`XhrBackend`] over `factory`, configured from `[xhr]`.
    pub fn xhr(mut self, factory: Arc<dyn XhrFactory>) -> Self {
        self.xhr = Some(factory);
        self
    }

    /// Add an interceptor. Interceptors run in the order they are added.
    pub fn interceptor(mut self, interceptor: SharedInterceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Route JSONP requests to scripts injected into `document`, with
    /// callbacks registered in the process-wide context.
    pub fn jsonp(self, document: Arc<dyn Document>) -> Self {
        self.jsonp_with_context(document, JsonpContext::shared())
    }

    pub fn jsonp_with_context(mut self, document: Arc<dyn Document>, context: Arc<JsonpContext>) -> Self {
        self.jsonp = Some((document, context));
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<HttpClient, ConfigError> {
        let backend = match (self.backend, self.xhr) {
            (Some(backend), _) => backend,
            (None, Some(factory)) => {
                Arc::new(XhrBackend::new(factory).with_config(self.config.xhr.clone())) as SharedHandler
            }
            (None, None) => return Err(ConfigError::MissingBackend),
        };

        let mut interceptors = self.interceptors;
        if let Some((document, context)) = self.jsonp {
            let jsonp = JsonpBackend::new(document, context).with_config(self.config.jsonp.clone());
            interceptors.push(Arc::new(JsonpInterceptor::new(Arc::new(jsonp))));
        }

        Ok(HttpClient {
            handler: intercepting_handler(backend, interceptors),
            jsonp_placeholder: self.config.jsonp.placeholder,
        })
    }
}

// ── Calls and subscriptions ─────────────────────────────────────────

/// A request bound to a handler chain. Nothing happens until a
/// subscription taken from it is polled; every subscription runs the whole
/// chain again.
#[derive(Clone)]
pub struct Call {
    handler: SharedHandler,
    request: Request,
    observe: Observe,
}

impl Call {
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Every event, in order.
    pub fn events(&self) -> Subscription<Event> {
        self.subscription(Some)
    }

    /// Only the final response.
    pub fn responses(&self) -> Subscription<Response> {
        self.subscription(Event::into_response)
    }

    /// Only the body of the final response. For `arraybuffer`, `blob` and
    /// `text` the body must have the matching shape.
    pub fn body(&self) -> Subscription<Option<ResponseBody>> {
        let response_type = self.request.response_type();
        Subscription::new(
            self.handler.clone(),
            self.request.clone(),
            Box::new(move |event: Event| Some(body_of(event.into_response()?, response_type))),
        )
    }

    /// Observe as `observe` says.
    pub fn observe(&self, observe: Observe) -> Subscription<Observed> {
        let response_type = self.request.response_type();
        let project: Projection<Observed> = match observe {
            Observe::Events => Box::new(|event: Event| Some(Ok(Observed::Event(event)))),
            Observe::Response => Box::new(|event: Event| {
                event.into_response().map(|res| Ok(Observed::Response(res)))
            }),
            Observe::Body => Box::new(move |event: Event| {
                let res = event.into_response()?;
                Some(body_of(res, response_type).map(Observed::Body))
            }),
        };
        Subscription::new(self.handler.clone(), self.request.clone(), project)
    }

    /// Observe as the call was declared.
    pub fn subscribe(&self) -> Subscription<Observed> {
        self.observe(self.observe)
    }

    fn subscription<T: 'static>(&self, f: fn(Event) -> Option<T>) -> Subscription<T> {
        Subscription::new(
            self.handler.clone(),
            self.request.clone(),
            Box::new(move |event: Event| f(event).map(Ok)),
        )
    }
}

fn body_of(res: Response, response_type: ResponseType) -> Result<Option<ResponseBody>, HttpError> {
    let body = res.into_body();
    match &body {
        Some(b) if !b.matches(response_type) => Err(HttpError::UnexpectedBody {
            expected: response_type,
        }),
        _ => Ok(body),
    }
}

type Projection<T> = Box<dyn FnMut(Event) -> Option<Result<T, HttpError>> + Send>;

enum SubscriptionState {
    Pending {
        handler: SharedHandler,
        request: Request,
    },
    Running(EventStream),
    Done,
}

/// A live (or not yet started) run of a [`Call`].
///
/// The chain runs on first poll. A configuration error raised by the chain
/// arrives as the only item. Dropping or cancelling the subscription
/// cancels the underlying request.
pub struct Subscription<T> {
    state: SubscriptionState,
    project: Projection<T>,
}

impl<T> Subscription<T> {
    fn new(handler: SharedHandler, request: Request, project: Projection<T>) -> Self {
        Self {
            state: SubscriptionState::Pending { handler, request },
            project,
        }
    }

    /// Stop the request. No further items are delivered.
    pub fn cancel(&mut self) {
        if matches!(self.state, SubscriptionState::Running(_)) {
            debug!("subscription cancelled");
        }
        self.state = SubscriptionState::Done;
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, SubscriptionState::Done)
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, HttpError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                SubscriptionState::Done => return Poll::Ready(None),
                SubscriptionState::Pending { handler, request } => {
                    debug!(method = request.method(), url = request.url(), "running handler chain");
                    match handler.handle(request.clone()) {
                        Ok(stream) => this.state = SubscriptionState::Running(stream),
                        Err(e) => {
                            this.state = SubscriptionState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                }
                SubscriptionState::Running(stream) => match Pin::new(stream).poll_next(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        this.state = SubscriptionState::Done;
                        return Poll::Ready(None);
                    }
                    Poll::Ready(Some(Err(e))) => {
                        this.state = SubscriptionState::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Ready(Some(Ok(event))) => match (this.project)(event) {
                        None => continue,
                        Some(Ok(item)) => return Poll::Ready(Some(Ok(item))),
                        Some(Err(e)) => {
                            this.state = SubscriptionState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                    },
                },
            }
        }
    }
}
