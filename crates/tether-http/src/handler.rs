//! Handlers, interceptors and the chain that links them.
//!
//! A backend is a [`Handler`] that performs I/O. Interceptors wrap the
//! handler after them: [`intercepting_handler`] folds a list of
//! interceptors over a backend so the first interceptor is outermost.

use std::sync::Arc;

use tracing::debug;

use crate::error::HttpError;
use crate::request::Request;
use crate::stream::EventStream;

/// Turns a request into a cold event stream.
///
/// `Err` is reserved for configuration errors detected synchronously;
/// everything else is delivered through the stream.
pub trait Handler: Send + Sync {
    fn handle(&self, req: Request) -> Result<EventStream, HttpError>;
}

/// Shared, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Sees every request before the handler after it, and the resulting stream
/// after. Call `next.handle` to continue, or return a stream of your own.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, req: Request, next: &SharedHandler) -> Result<EventStream, HttpError>;
}

pub type SharedInterceptor = Arc<dyn Interceptor>;

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, req: Request) -> Result<EventStream, HttpError> {
        (**self).handle(req)
    }
}

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(Request) -> Result<EventStream, HttpError> + Send + Sync,
{
    fn handle(&self, req: Request) -> Result<EventStream, HttpError> {
        (self.0)(req)
    }
}

/// A handler from a closure.
pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(Request) -> Result<EventStream, HttpError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

struct FnInterceptor<F>(F);

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(Request, &SharedHandler) -> Result<EventStream, HttpError> + Send + Sync,
{
    fn intercept(&self, req: Request, next: &SharedHandler) -> Result<EventStream, HttpError> {
        (self.0)(req, next)
    }
}

/// An interceptor from a closure.
pub fn interceptor_fn<F>(f: F) -> SharedInterceptor
where
    F: Fn(Request, &SharedHandler) -> Result<EventStream, HttpError> + Send + Sync + 'static,
{
    Arc::new(FnInterceptor(f))
}

/// One link of the chain: an interceptor and the handler it delegates to.
pub struct InterceptorHandler {
    next: SharedHandler,
    interceptor: SharedInterceptor,
}

impl InterceptorHandler {
    pub fn new(next: SharedHandler, interceptor: SharedInterceptor) -> Self {
        Self { next, interceptor }
    }
}

impl Handler for InterceptorHandler {
    fn handle(&self, req: Request) -> Result<EventStream, HttpError> {
        self.interceptor.intercept(req, &self.next)
    }
}

/// Build the chain once. With no interceptors this is `backend` itself.
pub fn intercepting_handler(
    backend: SharedHandler,
    interceptors: impl IntoIterator<Item = SharedInterceptor, IntoIter: DoubleEndedIterator>,
) -> SharedHandler {
    let mut links = 0usize;
    let chain = interceptors.into_iter().rev().fold(backend, |next, interceptor| {
        links += 1;
        Arc::new(InterceptorHandler::new(next, interceptor)) as SharedHandler
    });
    debug!(interceptors = links, "built handler chain");
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures_util::StreamExt;

    use crate::event::Event;
    use crate::request::RequestUpdate;

    fn echo_backend(seen: Arc<Mutex<Vec<String>>>) -> SharedHandler {
        handler_fn(move |req| {
            seen.lock().expect("seen lock").push(format!("backend {}", req.url()));
            Ok(EventStream::from_items([Ok(Event::Sent)]))
        })
    }

    fn tagging(name: &'static str, seen: Arc<Mutex<Vec<String>>>) -> SharedInterceptor {
        interceptor_fn(move |req, next| {
            seen.lock().expect("seen lock").push(name.to_string());
            let req = req.clone_with(RequestUpdate::new().url(format!("{}/{name}", req.url())));
            next.handle(req)
        })
    }

    #[tokio::test]
    async fn first_interceptor_is_outermost() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = intercepting_handler(
            echo_backend(seen.clone()),
            vec![tagging("a", seen.clone()), tagging("b", seen.clone())],
        );

        let events: Vec<_> = chain.handle(Request::get("/x")).unwrap().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a".to_string(), "b".to_string(), "backend /x/a/b".to_string()]
        );
    }

    #[tokio::test]
    async fn every_handle_reruns_interceptors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = intercepting_handler(echo_backend(seen.clone()), vec![tagging("a", seen.clone())]);

        let req = Request::get("/x");
        chain.handle(req.clone()).unwrap();
        chain.handle(req).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_chain_is_the_backend() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = intercepting_handler(echo_backend(seen.clone()), Vec::new());
        chain.handle(Request::get("/x")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["backend /x".to_string()]);
    }

    #[tokio::test]
    async fn interceptor_can_short_circuit() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cached = interceptor_fn(|_req, _next| {
            Ok(EventStream::from_items([Ok(Event::User(serde_json::json!("cached")))]))
        });
        let chain = intercepting_handler(echo_backend(seen.clone()), vec![cached]);

        let events: Vec<_> = chain.handle(Request::get("/x")).unwrap().collect().await;
        assert!(matches!(events[0], Ok(Event::User(_))));
        assert!(seen.lock().unwrap().is_empty());
    }
}
