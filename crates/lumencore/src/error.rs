//! Typed failures, covering configuration, resource loading, and invariant
//! violations.
//!
//! Four of the five kinds described below surface as [`RenderError`]
//! variants; the fifth (transient I/O during a persistent-cache safe-save)
//! is reported as a `bool` return from [`crate::dlsc::persist`] rather than
//! an error, because the session is meant to continue past it (see that
//! module for the retained-previous-file behavior).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A bad property, unknown type tag, reference to an undefined name,
    /// cyclic texture graph, out-of-range integer, or conflicting flag
    /// combination. Raised while building a `Scene` or `RenderConfig`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// File not found, decode failure, or unsupported channel/storage
    /// combination, raised while loading an image map or mesh buffer.
    #[error("resource error loading {resource}: {reason}")]
    Resource { resource: String, reason: String },

    /// A violated invariant: negative pixel counts, NaN in a computed
    /// luminance, a buffer-size mismatch, or a wrong-typed output accessor.
    /// These indicate a bug in the caller or in this crate; recoverable
    /// call sites still surface them as errors rather than panicking so a
    /// host application can log and abort gracefully.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
