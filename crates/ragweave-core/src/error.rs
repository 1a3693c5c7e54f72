//! Error taxonomy shared by every ragweave component.
//!
//! Each pipeline stage surfaces the first failure it sees. Stages add
//! context with [`Error::context`], which prefixes the message but keeps
//! the variant, so callers can still branch on [`Error::kind`].

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A file, document, node, relationship or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file exists but has no content.
    #[error("empty: {0}")]
    Empty(String),

    /// Empty query or text, unknown role, out-of-range pagination.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A unique key (file path, node id) is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Embedding provider, language model or store failure.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// A loader or provider that is not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Coarse classification of an [`Error`], used for HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Empty,
    InvalidInput,
    Conflict,
    Upstream,
    Unsupported,
}

impl Error {
    /// Wrap any displayable failure from an external service or store.
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Error::Upstream(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Empty(_) => ErrorKind::Empty,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Prefix the message with `ctx` without changing the variant.
    ///
    /// ```rust
    /// use ragweave_core::{Error, ErrorKind};
    ///
    /// let err = Error::Upstream("connection reset".into()).context("generate embeddings");
    /// assert_eq!(err.kind(), ErrorKind::Upstream);
    /// assert_eq!(err.to_string(), "upstream failure: generate embeddings: connection reset");
    /// ```
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::NotFound(m) => Error::NotFound(format!("{ctx}: {m}")),
            Error::Empty(m) => Error::Empty(format!("{ctx}: {m}")),
            Error::InvalidInput(m) => Error::InvalidInput(format!("{ctx}: {m}")),
            Error::Conflict(m) => Error::Conflict(format!("{ctx}: {m}")),
            Error::Upstream(m) => Error::Upstream(format!("{ctx}: {m}")),
            Error::Unsupported(m) => Error::Unsupported(format!("{ctx}: {m}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Upstream(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let err = Error::NotFound("doc-1".into()).context("load document");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("load document: doc-1"));
    }

    #[test]
    fn test_context_chains() {
        let err = Error::Conflict("path".into())
            .context("register")
            .context("upload");
        assert_eq!(err.to_string(), "conflict: upload: register: path");
    }
}
