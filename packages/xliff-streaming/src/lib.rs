//! Streaming XLIFF extractor - pull translation units out of XLIFF documents
//! of any size in bounded memory.
//!
//! The document is tokenized once, forward-only. Each `<trans-unit>` (XLIFF
//! 1.0/1.2) or `<unit>` (XLIFF 2.0) is cut out of the input as a raw slice and
//! re-parsed on its own, so only one small unit tree is alive at a time.
//!
//! # Example
//!
//! ```
//! use xliff_streaming::{extract, ErrorKind};
//!
//! let xml = r#"<xliff xmlns="urn:oasis:names:tc:xliff:document:2.0" version="2.0">
//!   <file id="f"><unit id="hello"><segment><source>Hello</source></segment></unit></file>
//! </xliff>"#;
//!
//! for unit in extract(xml) {
//!     let unit = unit.unwrap();
//!     assert_eq!(unit.id, "hello");
//!     assert_eq!(unit.target, None);
//! }
//!
//! let err = extract("<xliff><trans-unit><source>x</source></trans-unit></xliff>")
//!     .next()
//!     .unwrap()
//!     .unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::MissingId);
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Namespace constants and parser limits
//! - [`types`]: Unit records and the XLIFF version enum
//! - [`error`]: Error types and Result alias
//! - [`dtd`]: DOCTYPE inspection and the entity policy shared by both passes
//! - [`scanner`]: Forward-only token scan that cuts out unit subtrees
//! - [`unit`]: Per-unit re-parse and field extraction
//! - [`xml`]: XML utilities
//! - [`parser`]: Parser trait, streaming parser and the lazy unit sequence
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod dtd;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod types;
pub mod unit;
pub mod xml;

// Re-export main functions
pub use parser::{extract, extract_all};

// Re-export commonly used items
pub use config::ParserConfig;
pub use error::{ErrorKind, Result, XliffError};
pub use parser::{TransUnits, XliffParser, XliffStreamingParser};
pub use types::{UnitRecord, XliffVersion};
