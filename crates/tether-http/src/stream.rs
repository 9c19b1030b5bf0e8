//! Cold, cancellable event streams.
//!
//! An [`EventStream`] does no work until it is first polled. Producers are
//! callback driven: they receive an [`Observer`] to push events into and
//! return a [`Teardown`] that detaches whatever they registered. Dropping a
//! stream before it terminates runs the teardown synchronously and closes
//! the observer, so late platform callbacks become no-ops.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::HttpError;
use crate::event::Event;

/// Cleanup run when a stream terminates or is cancelled.
pub type Teardown = Box<dyn FnOnce() + Send>;

type Producer = Box<dyn FnOnce(Observer) -> Teardown + Send>;

pub type BoxEventStream = Pin<Box<dyn Stream<Item = Result<Event, HttpError>> + Send>>;

/// A teardown that does nothing.
pub fn noop_teardown() -> Teardown {
    Box::new(|| {})
}

enum Signal {
    Next(Event),
    Error(HttpError),
    Complete,
}

/// Push side of an [`EventStream`].
///
/// After `error` or `complete`, or once the stream has been dropped, every
/// further notification is ignored.
#[derive(Clone)]
pub struct Observer {
    tx: mpsc::UnboundedSender<Signal>,
    closed: Arc<AtomicBool>,
}

impl Observer {
    pub fn next(&self, event: Event) {
        if self.is_closed() {
            trace!(kind = ?event.kind(), "dropping event for closed stream");
            return;
        }
        let _ = self.tx.send(Signal::Next(event));
    }

    pub fn error(&self, err: impl Into<HttpError>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Signal::Error(err.into()));
    }

    pub fn complete(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Signal::Complete);
    }

    /// True once the stream has terminated or been cancelled.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

enum ProducerState {
    Pending(Producer),
    Running {
        rx: mpsc::UnboundedReceiver<Signal>,
        closed: Arc<AtomicBool>,
        teardown: Option<Teardown>,
    },
    Done,
}

struct ProducerStream {
    state: ProducerState,
}

impl ProducerStream {
    fn finish(&mut self) {
        if let ProducerState::Running {
            closed, teardown, ..
        } = &mut self.state
        {
            closed.store(true, Ordering::SeqCst);
            if let Some(teardown) = teardown.take() {
                teardown();
            }
        }
        self.state = ProducerState::Done;
    }
}

impl Stream for ProducerStream {
    type Item = Result<Event, HttpError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if matches!(this.state, ProducerState::Pending(_)) {
            let ProducerState::Pending(producer) =
                std::mem::replace(&mut this.state, ProducerState::Done)
            else {
                unreachable!("state checked above");
            };
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let observer = Observer {
                tx,
                closed: closed.clone(),
            };
            let teardown = producer(observer);
            this.state = ProducerState::Running {
                rx,
                closed,
                teardown: Some(teardown),
            };
        }

        let ProducerState::Running { rx, .. } = &mut this.state else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Signal::Next(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Signal::Error(err))) => {
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            // Complete, or every observer was dropped without a terminal signal.
            Poll::Ready(Some(Signal::Complete)) | Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for ProducerStream {
    fn drop(&mut self) {
        if let ProducerState::Running { closed, .. } = &self.state
            && !closed.load(Ordering::SeqCst)
        {
            trace!("event stream cancelled before completion");
        }
        self.finish();
    }
}

/// A cold stream of request events ending in a `Response` or an error.
pub struct EventStream {
    inner: BoxEventStream,
}

impl EventStream {
    /// A stream that calls `producer` on first poll.
    pub fn from_producer<F>(producer: F) -> Self
    where
        F: FnOnce(Observer) -> Teardown + Send + 'static,
    {
        Self {
            inner: Box::pin(ProducerStream {
                state: ProducerState::Pending(Box::new(producer)),
            }),
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Event, HttpError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream that yields `items` and ends.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<Event, HttpError>>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(futures_util::stream::iter(items))
    }

    /// A stream that fails immediately with `err`.
    pub fn failed(err: impl Into<HttpError>) -> Self {
        Self::from_items([Err(err.into())])
    }

    /// Transform each event; an `Err` from `f` is delivered as the stream's error.
    pub fn map_events<F>(self, mut f: F) -> Self
    where
        F: FnMut(Event) -> Result<Event, HttpError> + Send + 'static,
    {
        Self::from_stream(self.inner.map(move |item| item.and_then(&mut f)))
    }

    /// Run `f` on every item without changing it.
    pub fn inspect<F>(self, mut f: F) -> Self
    where
        F: FnMut(&Result<Event, HttpError>) + Send + 'static,
    {
        Self::from_stream(self.inner.inspect(move |item| f(item)))
    }

    pub fn into_inner(self) -> BoxEventStream {
        self.inner
    }
}

impl Stream for EventStream {
    type Item = Result<Event, HttpError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
