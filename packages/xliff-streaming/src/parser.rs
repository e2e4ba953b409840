//! Streaming extraction entry points.
//!
//! [`XliffStreamingParser`] holds only its configuration. Every call to
//! [`XliffStreamingParser::parse_trans_units`] builds a fresh [`TransUnits`]
//! cursor that owns its own scanner and entity policy, so independent calls
//! never share state.

use std::iter::FusedIterator;

use crate::config::ParserConfig;
use crate::dtd::EntityPolicy;
use crate::error::Result;
use crate::scanner::UnitScanner;
use crate::types::UnitRecord;
use crate::unit::materialize;

/// A strategy for turning XLIFF text into a lazy sequence of units.
pub trait XliffParser: Send + Sync {
    /// The sequence produced by one parsing session.
    type Units<'a>: Iterator<Item = Result<UnitRecord>>;

    /// Start a parsing session over `xml`.
    ///
    /// Nothing is parsed until the returned sequence is pulled.
    fn parse_trans_units<'a>(&self, xml: &'a str) -> Self::Units<'a>;
}

/// Forward-only XLIFF parser: tokenizes the document once and re-parses each
/// unit in isolation.
///
/// # Examples
/// ```
/// use xliff_streaming::XliffStreamingParser;
///
/// let xml = r#"<xliff><file><body>
///   <trans-unit id="k"><source>Hello</source><target>Hallo</target></trans-unit>
/// </body></file></xliff>"#;
///
/// let parser = XliffStreamingParser::new();
/// let units: Vec<_> = parser.parse_trans_units(xml).collect::<Result<_, _>>().unwrap();
/// assert_eq!(units[0].id, "k");
/// assert_eq!(units[0].target.as_deref(), Some("Hallo"));
/// assert_eq!(units[0].line, 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct XliffStreamingParser {
    config: ParserConfig,
}

impl XliffStreamingParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse_trans_units<'a>(&self, xml: &'a str) -> TransUnits<'a> {
        TransUnits::new(xml, self.config.clone())
    }
}

impl XliffParser for XliffStreamingParser {
    type Units<'a> = TransUnits<'a>;

    fn parse_trans_units<'a>(&self, xml: &'a str) -> TransUnits<'a> {
        XliffStreamingParser::parse_trans_units(self, xml)
    }
}

/// Lazy sequence of units from one document.
///
/// Yields records in document order. After the first error the sequence is
/// exhausted; records already yielded stay valid.
pub struct TransUnits<'a> {
    scanner: UnitScanner<'a>,
    policy: EntityPolicy,
    emitted: usize,
    done: bool,
}

impl<'a> TransUnits<'a> {
    fn new(xml: &'a str, config: ParserConfig) -> Self {
        tracing::debug!(bytes = xml.len(), "Starting XLIFF document");
        Self {
            scanner: UnitScanner::new(xml),
            policy: EntityPolicy::new(config),
            emitted: 0,
            done: false,
        }
    }

    /// Produce the next record, `Ok(None)` at the end of the document.
    pub fn try_next(&mut self) -> Result<Option<UnitRecord>> {
        if self.done {
            return Ok(None);
        }

        let result = self.advance();
        match &result {
            Ok(Some(_)) => self.emitted += 1,
            Ok(None) => {
                self.done = true;
                tracing::debug!(units = self.emitted, "Finished XLIFF document");
            }
            Err(e) => {
                self.done = true;
                tracing::debug!(
                    units = self.emitted,
                    code = e.code(),
                    "Aborted XLIFF document: {e}"
                );
            }
        }
        result
    }

    /// Number of records produced so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn advance(&mut self) -> Result<Option<UnitRecord>> {
        let Some(raw) = self.scanner.next_unit(&mut self.policy)? else {
            return Ok(None);
        };
        tracing::trace!(
            line = raw.line,
            version = raw.version.as_str(),
            element = raw.tag.as_str(),
            "Found unit"
        );
        materialize(&raw, &self.policy).map(Some)
    }
}

impl Iterator for TransUnits<'_> {
    type Item = Result<UnitRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

impl FusedIterator for TransUnits<'_> {}

/// Stream units from `xml` with the default limits.
pub fn extract(xml: &str) -> TransUnits<'_> {
    XliffStreamingParser::new().parse_trans_units(xml)
}

/// Extract every unit, or nothing if any part of the document fails.
pub fn extract_all(xml: &str) -> Result<Vec<UnitRecord>> {
    extract(xml).collect()
}
