//! Events emitted over the lifetime of a single request attempt.

use serde::Serialize;

use crate::response::{HeaderResponse, Response};

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Sent,
    UploadProgress,
    ResponseHeader,
    DownloadProgress,
    Response,
    User,
}

/// Upload progress. `total` is absent when it cannot be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Download progress, with a snapshot of the text received so far for
/// `text` responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
    pub partial_text: Option<String>,
}

/// One item of a request's event stream.
///
/// A stream yields at most one `Sent` first, then progress and at most one
/// `ResponseHeader` when progress was requested, and ends with exactly one
/// terminal item: a `Response` or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Sent,
    UploadProgress(Progress),
    ResponseHeader(HeaderResponse),
    DownloadProgress(DownloadProgress),
    Response(Response),
    /// Custom events injected by interceptors.
    User(serde_json::Value),
}

impl Event {
    pub fn kind(&self) -> EventType {
        match self {
            Event::Sent => EventType::Sent,
            Event::UploadProgress(_) => EventType::UploadProgress,
            Event::ResponseHeader(_) => EventType::ResponseHeader,
            Event::DownloadProgress(_) => EventType::DownloadProgress,
            Event::Response(_) => EventType::Response,
            Event::User(_) => EventType::User,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Event::Response(res) => Some(res),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Event::Response(res) => Some(res),
            _ => None,
        }
    }
}

impl From<Response> for Event {
    fn from(res: Response) -> Self {
        Event::Response(res)
    }
}

impl From<HeaderResponse> for Event {
    fn from(res: HeaderResponse) -> Self {
        Event::ResponseHeader(res)
    }
}
