//! Error types and error handling strategy.
//!
//! The engine itself never manufactures failures: the only condition it
//! originates is the `Cancelled` sentinel handed to a consumer pulling from
//! a subscription that already terminated. Everything else surfaces from
//! user-supplied callbacks (`ErrorKind::User`) and propagates through the
//! engine unchanged. Protocol misuse (pulling with no value available,
//! emitting outside a step context) is not part of this surface; it is a
//! documented panic.

use core::fmt;
use std::rc::Rc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The subscription was cancelled or its process terminated; cooperative
    /// and expected.
    Cancelled,
    /// A user-supplied callback failed.
    User,
}

/// The error type returned from pulls and transfers.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Rc<dyn std::error::Error>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Creates the cancellation sentinel.
    #[must_use]
    pub const fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    /// Creates a user error with context text.
    #[must_use]
    pub fn user(ctx: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(ctx)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns the context text, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + 'static) -> Self {
        self.source = Some(Rc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Cancelled => write!(f, "cancelled")?,
            ErrorKind::User => write!(f, "user error")?,
        }
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = core::result::Result<T, Error>;
