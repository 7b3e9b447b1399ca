//! Inference client adapter.
//!
//! The enrichment loop only sees [`Enricher`]: it turns a title/author pair
//! into a fixed set of derived fields, retrying transient failures and
//! malformed replies. The completion backend behind it is a
//! [`CompletionService`], either an HTTP chat-completions endpoint or a
//! local command that reads the prompt on stdin.

pub mod adapter;
pub mod command;
pub mod http;
pub mod prompt;
pub mod response;

pub use adapter::{Enricher, EnrichmentOutcome, RetryPolicy};
pub use command::CommandService;
pub use http::ChatCompletionService;
pub use prompt::Prompt;

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Timeouts, rate limits, server-side failures. Worth retrying.
    Transient,
    /// Authentication or request errors. The run cannot proceed.
    Permanent,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} service error: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ServiceErrorKind::Transient
    }
}

/// "Given a prompt, return a text completion."
pub trait CompletionService {
    fn complete(&self, prompt: &Prompt) -> Result<String, ServiceError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
