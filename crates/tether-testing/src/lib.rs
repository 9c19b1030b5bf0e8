//! Test support for `tether-http`.
//!
//! [`HttpClientTestingBackend`] stands in for the network: every
//! subscription is queued as a [`TestRequest`] that the test finds with
//! [`expect_one`](HttpClientTestingBackend::expect_one) and answers with
//! [`flush`](TestRequest::flush), [`error`](TestRequest::error) or
//! [`event`](TestRequest::event). [`MockXhrFactory`] and [`MockDocument`]
//! replace the platform collaborators when the real backends are under
//! test.
//!
//! ```ignore
//! let (client, backend) = testing_client();
//! let mut body = client.get("/api/items", RequestOptions::new()).body();
//! // poll `body` once so the request is issued, then:
//! backend.expect_one("/api/items")?.flush(json!([1, 2, 3]), FlushOptions::new())?;
//! backend.verify(VerifyOptions::default())?;
//! ```

mod backend;
mod document;
mod error;
mod request;
mod xhr;

pub use backend::{HttpClientTestingBackend, RequestMatch, VerifyOptions, testing_client};
pub use document::{MockDocument, MockScript};
pub use error::TestingError;
pub use request::{ErrorOptions, FlushBody, FlushOptions, TestRequest};
pub use xhr::{MockXhr, MockXhrFactory};
