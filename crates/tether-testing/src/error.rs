use thiserror::Error;

/// Misuse of the testing controller or a [`TestRequest`](crate::TestRequest).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestingError {
    #[error("cannot flush a cancelled request")]
    FlushCancelled,

    #[error("cannot return an error for a cancelled request")]
    ErrorCancelled,

    #[error("cannot send events to a cancelled request")]
    EventCancelled,

    #[error("automatic conversion to {target} is not supported for {source_kind}")]
    Conversion {
        target: &'static str,
        source_kind: &'static str,
    },

    #[error("status text is required when setting a custom status")]
    MissingStatusText,

    #[error("error() called with a successful status")]
    SuccessfulStatus,

    #[error("expected one matching request, found {0} requests")]
    ExpectedOneFoundMany(usize),

    #[error("expected one matching request, found none")]
    ExpectedOneFoundNone,

    #[error("expected zero matching requests, found {0}")]
    ExpectedNone(usize),

    #[error("expected no open requests, found {count}: {urls}")]
    OpenRequests { count: usize, urls: String },
}
