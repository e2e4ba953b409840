//! Forward-only cursor over the XML token stream.
//!
//! The scanner never builds a tree. It keeps one namespace frame per open
//! element and a running line counter, and stops at each unit-boundary
//! element in a supported XLIFF namespace, returning the raw source slice of
//! that element's subtree.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::dtd::EntityPolicy;
use crate::error::{Result, XliffError};
use crate::types::{UnitTag, XliffVersion};

/// A unit-boundary element, captured exactly as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit<'a> {
    /// Serialized subtree, from `<` of the opening tag to `>` of the closing tag.
    pub xml: &'a str,
    /// 1-based line of the opening tag.
    pub line: usize,
    pub version: XliffVersion,
    pub tag: UnitTag,
    /// Namespace declarations in scope at the unit, rendered as attributes
    /// (` xmlns="..." xmlns:p="..."`).
    pub namespaces: String,
}

/// `xmlns` / `xmlns:prefix` declaration on an open element.
#[derive(Debug, Clone)]
struct Binding {
    prefix: Option<String>,
    /// Attribute value as written, still escaped.
    value: String,
}

/// Byte offset to line number, advancing monotonically.
#[derive(Debug)]
struct LineTracker<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
}

impl<'a> LineTracker<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, pos: usize) -> usize {
        let pos = pos.min(self.bytes.len());
        if pos < self.offset {
            self.offset = 0;
            self.line = 1;
        }
        self.line += memchr::memchr_iter(b'\n', &self.bytes[self.offset..pos]).count();
        self.offset = pos;
        self.line
    }
}

/// Cursor state for one parsing session.
pub struct UnitScanner<'a> {
    input: &'a str,
    reader: NsReader<&'a [u8]>,
    lines: LineTracker<'a>,
    scopes: Vec<Vec<Binding>>,
    seen_root: bool,
    root_closed: bool,
}

impl<'a> UnitScanner<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut reader = NsReader::from_str(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = false;
        config.check_end_names = true;

        Self {
            input,
            reader,
            lines: LineTracker::new(input.as_bytes()),
            scopes: Vec::new(),
            seen_root: false,
            root_closed: false,
        }
    }

    /// Advance to the next unit-boundary element.
    ///
    /// Returns `Ok(None)` at the end of a well-formed document. A DOCTYPE met
    /// on the way is handed to `policy` before any unit after it is returned.
    pub fn next_unit(&mut self, policy: &mut EntityPolicy) -> Result<Option<RawUnit<'a>>> {
        loop {
            let offset = self.position();
            let (version, event) = match self.reader.read_resolved_event() {
                Ok((resolved, event)) => (resolve_version(&resolved), event),
                Err(e) => return Err(self.tokenizer_error(e)),
            };

            match event {
                Event::DocType(doctype) => {
                    let line = self.lines.line_at(offset);
                    if self.seen_root {
                        return Err(XliffError::malformed(line, "DOCTYPE after root element"));
                    }
                    let content = std::str::from_utf8(&doctype)
                        .map_err(|e| XliffError::malformed(line, e))?;
                    policy.admit_doctype(content, line)?;
                }
                Event::Start(start) => {
                    let line = self.lines.line_at(offset);
                    self.open_element(line)?;
                    if let Some((tag, version)) = unit_boundary(&start, version, line) {
                        let namespaces = self.namespace_declarations();
                        self.reader
                            .read_to_end(start.name())
                            .map_err(|e| self.tokenizer_error(e))?;
                        return Ok(Some(self.capture(offset, line, version, tag, namespaces)));
                    }
                    self.scopes.push(collect_bindings(&start, policy, line)?);
                }
                Event::Empty(start) => {
                    let line = self.lines.line_at(offset);
                    self.open_element(line)?;
                    if let Some((tag, version)) = unit_boundary(&start, version, line) {
                        let namespaces = self.namespace_declarations();
                        return Ok(Some(self.capture(offset, line, version, tag, namespaces)));
                    }
                    collect_bindings(&start, policy, line)?;
                    self.close_if_root();
                }
                Event::Text(text) => {
                    let line = self.lines.line_at(offset);
                    self.check_text(&text, policy, line)?;
                }
                Event::CData(_) if !self.inside_root() => {
                    let line = self.lines.line_at(offset);
                    return Err(XliffError::malformed(line, "CDATA outside the root element"));
                }
                Event::End(_) => {
                    self.scopes.pop();
                    self.close_if_root();
                }
                Event::Eof => return self.finish().map(|()| None),
                _ => {}
            }
        }
    }

    fn position(&self) -> usize {
        usize::try_from(self.reader.buffer_position()).unwrap_or(self.input.len())
    }

    fn capture(
        &mut self,
        offset: usize,
        line: usize,
        version: XliffVersion,
        tag: UnitTag,
        namespaces: String,
    ) -> RawUnit<'a> {
        let end = self.position();
        self.close_if_root();
        RawUnit {
            xml: &self.input[offset..end],
            line,
            version,
            tag,
            namespaces,
        }
    }

    fn open_element(&mut self, line: usize) -> Result<()> {
        if self.root_closed {
            return Err(XliffError::malformed(
                line,
                "content after the root element (multiple root elements)",
            ));
        }
        self.seen_root = true;
        Ok(())
    }

    fn inside_root(&self) -> bool {
        self.seen_root && !self.root_closed
    }

    /// Character data between units: only whitespace outside the root, and
    /// every reference resolvable inside it.
    fn check_text(&self, text: &BytesText<'_>, policy: &EntityPolicy, line: usize) -> Result<()> {
        if !self.inside_root() {
            if text.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
                return Ok(());
            }
            return Err(XliffError::malformed(line, "text outside the root element"));
        }
        let raw = std::str::from_utf8(text).map_err(|e| XliffError::malformed(line, e))?;
        policy.check_escaped(raw, line)
    }

    fn close_if_root(&mut self) {
        if self.scopes.is_empty() {
            self.root_closed = true;
        }
    }

    fn finish(&mut self) -> Result<()> {
        let line = self.lines.line_at(self.input.len());
        if !self.scopes.is_empty() {
            return Err(XliffError::malformed(
                line,
                format!(
                    "unexpected end of document: {} unclosed element(s)",
                    self.scopes.len()
                ),
            ));
        }
        if !self.seen_root {
            return Err(XliffError::malformed(line, "document has no root element"));
        }
        Ok(())
    }

    fn tokenizer_error(&mut self, err: quick_xml::Error) -> XliffError {
        let pos = usize::try_from(self.reader.error_position()).unwrap_or(self.input.len());
        XliffError::malformed(self.lines.line_at(pos), err)
    }

    /// In-scope bindings, innermost wins, rendered as attributes.
    fn namespace_declarations(&self) -> String {
        let mut in_scope: Vec<&Binding> = Vec::new();
        for binding in self.scopes.iter().flatten() {
            in_scope.retain(|b| b.prefix != binding.prefix);
            in_scope.push(binding);
        }

        let mut rendered = String::new();
        for binding in in_scope.into_iter().filter(|b| !b.value.is_empty()) {
            let quote = if binding.value.contains('"') { '\'' } else { '"' };
            match &binding.prefix {
                Some(prefix) => rendered.push_str(&format!(" xmlns:{prefix}={quote}")),
                None => rendered.push_str(&format!(" xmlns={quote}")),
            }
            rendered.push_str(&binding.value);
            rendered.push(quote);
        }
        rendered
    }
}

fn resolve_version(resolved: &ResolveResult<'_>) -> Option<XliffVersion> {
    match resolved {
        ResolveResult::Unbound => Some(XliffVersion::V1_0),
        ResolveResult::Bound(Namespace(uri)) => XliffVersion::from_namespace_bytes(Some(*uri)),
        ResolveResult::Unknown(_) => None,
    }
}

/// Recognize a unit-boundary element: right local name and a supported namespace.
fn unit_boundary(
    start: &BytesStart<'_>,
    version: Option<XliffVersion>,
    line: usize,
) -> Option<(UnitTag, XliffVersion)> {
    let tag = UnitTag::from_local_name(start.local_name().as_ref())?;
    match version {
        Some(version) => Some((tag, version)),
        None => {
            tracing::debug!(
                line,
                element = %String::from_utf8_lossy(start.name().as_ref()),
                "Skipping unit element outside the XLIFF namespaces"
            );
            None
        }
    }
}

/// Validate every attribute of an element outside a unit and return its
/// namespace declarations.
fn collect_bindings(
    start: &BytesStart<'_>,
    policy: &EntityPolicy,
    line: usize,
) -> Result<Vec<Binding>> {
    let mut bindings = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XliffError::malformed(line, e))?;
        let value = std::str::from_utf8(&attr.value).map_err(|e| XliffError::malformed(line, e))?;
        if value.contains('<') {
            return Err(XliffError::malformed(
                line,
                format!(
                    "'<' in value of attribute {}",
                    String::from_utf8_lossy(attr.key.as_ref())
                ),
            ));
        }
        policy.check_escaped(value, line)?;

        let key = attr.key.as_ref();
        let prefix = if key == b"xmlns" {
            None
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            Some(String::from_utf8_lossy(prefix).into_owned())
        } else {
            continue;
        };
        bindings.push(Binding {
            prefix,
            value: value.to_string(),
        });
    }
    Ok(bindings)
}
