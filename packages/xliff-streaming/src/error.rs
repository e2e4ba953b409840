//! Error types for the XLIFF extractor.
//!
//! Every failure aborts the current extraction. Each variant carries the
//! 1-based line of the offending element, and [`XliffError::kind`] /
//! [`XliffError::code`] give callers a stable discriminator so they never
//! have to match on message text.

use strum::{AsRefStr, Display, IntoStaticStr};
use thiserror::Error;

/// Main error type for the extractor library.
#[derive(Debug, Error)]
pub enum XliffError {
    /// The document (or an isolated unit subtree) is not well-formed XML.
    #[error("Malformed XML at line {line}: {message}")]
    MalformedXml { line: usize, message: String },

    /// An entity would need recursive or exponential expansion.
    #[error("Entity expansion rejected at line {line}: {message} (possible entity reference loop or billion laughs attack)")]
    EntityExpansion { line: usize, message: String },

    /// A unit references an external entity, which is never resolved.
    #[error("Invalid trans-unit XML at line {line}: reference to external entity '&{entity};' (external entities are blocked)")]
    ExternalEntityBlocked { line: usize, entity: String },

    /// A unit element has no `id` attribute, or it is empty.
    #[error("Missing required \"id\" attribute in trans-unit at line {line}")]
    MissingId { line: usize },

    /// The content holder has no non-empty `<source>` text.
    #[error("Missing required <source> element in unit \"{id}\" at line {line}")]
    MissingSource { id: String, line: usize },
}

/// Machine-checkable discriminator for [`XliffError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, IntoStaticStr)]
pub enum ErrorKind {
    #[strum(serialize = "MalformedXmlError")]
    MalformedXml,
    #[strum(serialize = "EntityExpansionError")]
    EntityExpansion,
    #[strum(serialize = "ExternalEntityBlockedError")]
    ExternalEntityBlocked,
    #[strum(serialize = "MissingIdError")]
    MissingId,
    #[strum(serialize = "MissingSourceError")]
    MissingSource,
}

impl ErrorKind {
    /// Stable numeric code for this kind.
    pub const fn code(self) -> u32 {
        match self {
            ErrorKind::MalformedXml => 1_700_000_001,
            ErrorKind::EntityExpansion => 1_700_000_002,
            ErrorKind::ExternalEntityBlocked => 1_700_000_003,
            ErrorKind::MissingId => 1_700_000_004,
            ErrorKind::MissingSource => 1_700_000_005,
        }
    }
}

impl XliffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XliffError::MalformedXml { .. } => ErrorKind::MalformedXml,
            XliffError::EntityExpansion { .. } => ErrorKind::EntityExpansion,
            XliffError::ExternalEntityBlocked { .. } => ErrorKind::ExternalEntityBlocked,
            XliffError::MissingId { .. } => ErrorKind::MissingId,
            XliffError::MissingSource { .. } => ErrorKind::MissingSource,
        }
    }

    /// Shorthand for `self.kind().code()`.
    pub fn code(&self) -> u32 {
        self.kind().code()
    }

    /// Line of the offending element. Zero is reserved for "unknown".
    pub fn line(&self) -> Option<usize> {
        let line = match self {
            XliffError::MalformedXml { line, .. }
            | XliffError::EntityExpansion { line, .. }
            | XliffError::ExternalEntityBlocked { line, .. }
            | XliffError::MissingId { line }
            | XliffError::MissingSource { line, .. } => *line,
        };
        (line > 0).then_some(line)
    }

    pub(crate) fn malformed(line: usize, message: impl std::fmt::Display) -> Self {
        XliffError::MalformedXml {
            line,
            message: message.to_string(),
        }
    }

    pub(crate) fn expansion(line: usize, message: impl std::fmt::Display) -> Self {
        XliffError::EntityExpansion {
            line,
            message: message.to_string(),
        }
    }
}

/// Result type alias for extractor operations.
pub type Result<T> = std::result::Result<T, XliffError>;
