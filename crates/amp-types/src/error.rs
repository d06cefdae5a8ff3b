use thiserror::Error;

/// The error taxonomy shared by the loop, promise, and iterator layers.
///
/// Variants fall into two families: programming errors that a caller is
/// expected to return synchronously (double-settle, overlapped advance, ...)
/// and runtime errors that surface through the loop's error funnel or an
/// iterator's terminal state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmpError {
    /// A constructor or watcher call was given an argument it cannot accept,
    /// e.g. building a `Success` from a value that is itself a promise.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `enable`/`reference`/`unreference` referenced a watcher id that does
    /// not exist, or that existed but was already cancelled.
    #[error("invalid watcher id")]
    InvalidWatcher,

    /// The requested watcher kind is not available on this platform or
    /// driver (e.g. signal watching where signals are unsupported).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A second `resolve`/`fail` was attempted on an already-settled
    /// deferred.
    #[error("promise already settled")]
    AlreadySettled,

    /// `complete`/`fail` was called twice on a producer, or `emit` was
    /// called after completion. Carries a rendered detail string so that,
    /// with `AMP_DEBUG` set, the backtrace captured at the first
    /// `complete()` can be surfaced here.
    #[error("{0}")]
    AlreadyComplete(String),

    /// `advance()` was called while a previous call's promise is still
    /// pending.
    #[error("advance() called while a previous advance is still pending")]
    OverlappedAdvance,

    /// `current()` was called on an iterator that has already finished.
    #[error("iterator has completed")]
    Completed,

    /// `current()` was called before any `advance()` has settled.
    #[error("no value is ready; call advance() first")]
    NotReady,

    /// The producer observed that its consumer handle has been dropped.
    #[error("consumer was disposed")]
    Disposed,

    /// A loop accessor passthrough was invoked with no driver installed.
    #[error("no driver installed")]
    NoDriver,

    /// An in-flight `emit_promise` adoption was still waiting when the
    /// iterator was independently completed or failed out from under it.
    #[error("iterator was completed before the promise result could be emitted")]
    InterruptedByCompletion,
}

impl AmpError {
    /// Builds `AlreadyComplete`, optionally folding in a rendered
    /// backtrace captured at the first `complete()` call.
    pub fn already_complete(backtrace_detail: Option<String>) -> Self {
        match backtrace_detail {
            Some(detail) => AmpError::AlreadyComplete(format!("iterator already complete\n{detail}")),
            None => AmpError::AlreadyComplete("iterator already complete".to_string()),
        }
    }
}
