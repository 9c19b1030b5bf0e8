//! A backend that never touches the network: requests are queued until a
//! test finds and answers them.

use std::sync::{Arc, Mutex};

use tracing::debug;

use tether_http::{Event, EventStream, Handler, HttpClient, HttpError, Request};

use crate::error::TestingError;
use crate::request::TestRequest;

/// Selects open requests.
#[derive(Clone)]
pub enum RequestMatch {
    /// Exact url.
    Url(String),
    /// Method (compared upper-case) and url; absent parts match anything.
    Method {
        method: Option<String>,
        url: Option<String>,
    },
    Predicate(Arc<dyn Fn(&Request) -> bool + Send + Sync>),
}

impl RequestMatch {
    pub fn method(method: &str, url: &str) -> Self {
        RequestMatch::Method {
            method: Some(method.to_string()),
            url: Some(url.to_string()),
        }
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        RequestMatch::Predicate(Arc::new(f))
    }

    fn matches(&self, req: &Request) -> bool {
        match self {
            RequestMatch::Url(url) => req.url() == url,
            RequestMatch::Method { method, url } => {
                method
                    .as_ref()
                    .is_none_or(|m| req.method() == m.to_ascii_uppercase())
                    && url.as_ref().is_none_or(|u| req.url() == u)
            }
            RequestMatch::Predicate(f) => f(req),
        }
    }
}

impl From<&str> for RequestMatch {
    fn from(url: &str) -> Self {
        RequestMatch::Url(url.to_string())
    }
}

impl From<String> for RequestMatch {
    fn from(url: String) -> Self {
        RequestMatch::Url(url)
    }
}

impl std::fmt::Debug for RequestMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMatch::Url(url) => f.debug_tuple("Url").field(url).finish(),
            RequestMatch::Method { method, url } => f
                .debug_struct("Method")
                .field("method", method)
                .field("url", url)
                .finish(),
            RequestMatch::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Ignore open requests whose subscriber has gone away.
    pub ignore_cancelled: bool,
}

/// Terminal handler that records every subscription as a [`TestRequest`],
/// and the controller used to find and answer them.
#[derive(Default)]
pub struct HttpClientTestingBackend {
    open: Arc<Mutex<Vec<TestRequest>>>,
}

impl HttpClientTestingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every open request matching `matcher`.
    pub fn match_requests(&self, matcher: impl Into<RequestMatch>) -> Vec<TestRequest> {
        let matcher = matcher.into();
        let mut open = self.open.lock().expect("open requests lock");
        let (matched, rest): (Vec<_>, Vec<_>) = open
            .drain(..)
            .partition(|test_req| matcher.matches(test_req.request()));
        *open = rest;
        matched
    }

    /// The single open request matching `matcher`.
    pub fn expect_one(&self, matcher: impl Into<RequestMatch>) -> Result<TestRequest, TestingError> {
        let mut matches = self.match_requests(matcher);
        match matches.len() {
            0 => Err(TestingError::ExpectedOneFoundNone),
            1 => Ok(matches.remove(0)),
            n => Err(TestingError::ExpectedOneFoundMany(n)),
        }
    }

    pub fn expect_none(&self, matcher: impl Into<RequestMatch>) -> Result<(), TestingError> {
        match self.match_requests(matcher).len() {
            0 => Ok(()),
            n => Err(TestingError::ExpectedNone(n)),
        }
    }

    /// Fail if any request is still open.
    pub fn verify(&self, opts: VerifyOptions) -> Result<(), TestingError> {
        let open = self.open.lock().expect("open requests lock");
        let remaining: Vec<&TestRequest> = open
            .iter()
            .filter(|test_req| !(opts.ignore_cancelled && test_req.is_cancelled()))
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }
        let urls = remaining
            .iter()
            .map(|test_req| test_req.request().url().split('?').next().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ");
        Err(TestingError::OpenRequests {
            count: remaining.len(),
            urls,
        })
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().expect("open requests lock").len()
    }
}

impl Handler for HttpClientTestingBackend {
    fn handle(&self, req: Request) -> Result<EventStream, HttpError> {
        let open = self.open.clone();
        Ok(EventStream::from_producer(move |observer| {
            debug!(method = req.method(), url = req.url(), "request queued for test");
            let test_req = TestRequest::new(req, observer.clone());
            open.lock().expect("open requests lock").push(test_req.clone());
            observer.next(Event::Sent);
            Box::new(move || test_req.mark_cancelled())
        }))
    }
}

/// A client wired straight to a fresh testing backend.
pub fn testing_client() -> (HttpClient, Arc<HttpClientTestingBackend>) {
    let backend = Arc::new(HttpClientTestingBackend::new());
    (HttpClient::new(backend.clone()), backend)
}
