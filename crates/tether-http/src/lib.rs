//! Tether HTTP client.
//!
//! Requests are immutable values. A call runs them through an ordered
//! chain of [`Interceptor`]s to a terminal backend and hands the caller a
//! cold, cancellable stream of typed [`Event`]s.
//!
//! # Pipeline
//!
//! ```text
//! HttpClient ─► Interceptor 1 ─► … ─► Interceptor N ─► backend
//!                                                      ├─ XhrBackend   (Xhr transport)
//!                                                      └─ JsonpBackend (script injection)
//! ```
//!
//! Nothing is sent until a [`Subscription`] is first polled, and every
//! subscription runs the chain again. Dropping a subscription tears the
//! transport down.
//!
//! # Error channels
//!
//! Programmer mistakes ([`ConfigError`]) are returned synchronously by
//! [`Handler::handle`]. Transport, protocol and decode failures arrive as
//! an [`ErrorResponse`] on the stream's error channel.

pub mod body;
pub mod client;
pub mod config;
mod error;
pub mod event;
pub mod handler;
pub mod headers;
pub mod jsonp;
pub mod params;
pub mod request;
pub mod response;
pub mod stream;
pub mod xhr;

pub use body::{Blob, Body, FormData, ResponseBody, ResponseType};
pub use client::{Call, ClientBuilder, HttpClient, Observe, Observed, RequestOptions, Subscription};
pub use config::ClientConfig;
pub use error::{ConfigError, HeaderError, HttpError, TransportError};
pub use event::{DownloadProgress, Event, EventType, Progress};
pub use handler::{
    Handler, Interceptor, SharedHandler, SharedInterceptor, handler_fn, intercepting_handler,
    interceptor_fn,
};
pub use headers::Headers;
pub use jsonp::{Document, JsonpBackend, JsonpContext, JsonpInterceptor, ScriptElement};
pub use params::{QueryEncoder, UrlParams};
pub use request::{Request, RequestInit, RequestUpdate};
pub use response::{
    ErrorCause, ErrorResponse, HeaderResponse, Response, ResponseBase, ResponseHead, ResponseInit,
    ResponseUpdate,
};
pub use stream::{EventStream, Observer, Teardown};
pub use xhr::{Xhr, XhrBackend, XhrFactory};
#[cfg(feature = "reqwest")]
pub use xhr::{ReqwestXhr, ReqwestXhrFactory};
