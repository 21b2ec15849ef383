use thiserror::Error;

/// Errors a single chat turn can surface. All of these are recoverable from
/// the user's point of view: the conversation stays intact and the turn may
/// simply be resubmitted.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("too many requests, please wait a moment and try again")]
    RateLimited,

    #[error("the assistant service is temporarily unavailable")]
    ServiceUnavailable,

    #[error("connection to the assistant failed: {0}")]
    ConnectionFailed(String),

    /// The pending line buffer grew past its cap without ever yielding a
    /// parseable frame. Upstream is sending garbage, not a split frame.
    #[error("assistant stream is corrupt: pending buffer limit exceeded")]
    StreamCorrupted,
}
