//! Error types for the Tether HTTP client.
//!
//! Failures fall into two channels. Configuration errors are programmer
//! mistakes and are returned synchronously from `handle`. Everything else
//! reaches the subscriber as the error item of an event stream.

use thiserror::Error;

use crate::body::ResponseType;
use crate::response::ErrorResponse;

/// Errors raised by the header container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("headers have been sealed and cannot be mutated")]
    Sealed,
}

/// Programmer errors detected at call time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("JSONP requests must use the JSONP request method")]
    WrongMethod,

    #[error("JSONP requests must use the json response type")]
    WrongResponseType,

    #[error("attempted to send a JSONP request without the JSONP interceptor installed")]
    JsonpNotInstalled,

    #[error("no backend configured")]
    MissingBackend,

    #[error("unknown response type: {0}")]
    InvalidResponseType(String),

    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// The underlying cause of a transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// DNS failure, timeout, connection reset, offline, ...
    #[error("network error: {0}")]
    Network(String),

    #[error("request aborted")]
    Aborted,

    /// The injected JSONP script failed to load or evaluate.
    #[error("script load failed: {0}")]
    ScriptLoad(String),

    #[error("JSONP injected script did not invoke callback")]
    NoCallback,
}

/// Everything a subscriber can observe on the error channel.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// Transport, protocol or decode failure, carried as an error response.
    #[error(transparent)]
    Response(#[from] ErrorResponse),

    /// A configuration error raised while a deferred call ran the chain.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The body-observe projection found a body of the wrong shape.
    #[error("response is not {}", expected_shape(.expected))]
    UnexpectedBody { expected: ResponseType },
}

impl HttpError {
    /// The error response, if this failure carries one.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            HttpError::Response(res) => Some(res),
            _ => None,
        }
    }
}

impl From<HeaderError> for HttpError {
    fn from(e: HeaderError) -> Self {
        HttpError::Config(ConfigError::Header(e))
    }
}

fn expected_shape(expected: &ResponseType) -> &'static str {
    match expected {
        ResponseType::ArrayBuffer => "an ArrayBuffer",
        ResponseType::Blob => "a Blob",
        ResponseType::Text => "a string",
        ResponseType::Json => "JSON",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_message() {
        assert_eq!(
            HeaderError::Sealed.to_string(),
            "headers have been sealed and cannot be mutated"
        );
    }

    #[test]
    fn unexpected_body_names_the_shape() {
        let err = HttpError::UnexpectedBody {
            expected: ResponseType::ArrayBuffer,
        };
        assert_eq!(err.to_string(), "response is not an ArrayBuffer");

        let err = HttpError::UnexpectedBody {
            expected: ResponseType::Text,
        };
        assert_eq!(err.to_string(), "response is not a string");
    }

    #[test]
    fn header_error_converts_to_config() {
        let err: HttpError = HeaderError::Sealed.into();
        assert!(matches!(err, HttpError::Config(ConfigError::Header(_))));
        assert!(err.response().is_none());
    }
}
