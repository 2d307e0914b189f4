//! # Errors
//!
//! Named error conditions surfaced by the dispatcher, the input subsystem and the task
//! supervisor. Section code and the binary work in `anyhow::Result` and wrap these.

use thiserror::Error;

/// Failures while resolving or running a route.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The route has no section id.
    #[error("route has no section id")]
    MissingHandler,

    /// The route has no method name.
    #[error("route for section '{0}' has no method")]
    MissingMethod(String),

    #[error("section '{0}' not found")]
    HandlerNotFound(String),

    #[error("method '{method}' not found in section '{section}'")]
    MethodNotFound { section: String, method: String },

    /// The section definition could not be loaded.
    #[error("failed to load section '{section}': {reason}")]
    LoadFailed { section: String, reason: String },

    #[error("session for user '{0}' not found")]
    SessionNotFound(String),

    /// `install` or `activate` failed; the method was not run.
    #[error("{hook} hook of section '{section}' failed: {reason}")]
    Hook {
        section: String,
        hook: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Failures while matching inbound events to routes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("malformed action payload '{0}'")]
    MalformedAction(String),

    #[error("invalid callback pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("no route bound for {0}")]
    Unbound(String),
}

/// Outcomes of an awaited input request other than a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The user pressed the cancel button.
    #[error("input cancelled by user")]
    Cancelled,

    /// A newer input request replaced this one.
    #[error("input request superseded by a newer request")]
    Superseded,

    /// The user session was evicted while waiting.
    #[error("session expired while waiting for input")]
    SessionExpired,

    /// The value failed a validation rule with a descriptive reason.
    #[error("{0}")]
    Rejected(String),
}

/// Terminal failures of a background job.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The job observed its cancellation signal and stopped.
    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}
