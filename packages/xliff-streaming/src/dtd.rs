//! DOCTYPE inspection and the entity policy shared by both parse passes.
//!
//! The outer scan hands the DOCTYPE to [`EntityPolicy::admit_doctype`], which
//! records which entities are internal and which are external, and measures
//! every internal entity without expanding it. The per-unit re-parse then goes
//! through the same policy: [`EntityPolicy::check_fragment`] vets the unit's
//! entity references, and the roxmltree options and DOCTYPE prolog come from
//! [`EntityPolicy::parsing_options`] and [`EntityPolicy::prolog_for`].
//!
//! External entities are never dereferenced. Their system and public
//! literals are parsed only so they can be skipped.

use std::collections::{HashMap, HashSet};

use roxmltree::ParsingOptions;

use crate::config::ParserConfig;
use crate::error::{Result, XliffError};

/// Entity names every XML parser knows without a declaration.
const PREDEFINED_ENTITIES: [&str; 5] = ["lt", "gt", "amp", "apos", "quot"];

/// Upper bound for the UTF-8 size of one character reference.
const CHAR_REF_BYTES: usize = 4;

/// An internal general entity, as declared.
#[derive(Debug, Clone)]
pub struct InternalEntity {
    /// Literal value as written in the DTD, references unexpanded.
    pub value: String,
    /// Quote character the literal was delimited with.
    pub quote: char,
}

/// What a full expansion of an entity would cost, computed without expanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expansion {
    pub bytes: usize,
    pub substitutions: usize,
    pub depth: usize,
}

/// General entities declared in a DOCTYPE internal subset.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    /// Declaration order, used when the prolog is rebuilt.
    order: Vec<String>,
    internal: HashMap<String, InternalEntity>,
    external: HashSet<String>,
    has_external_subset: bool,
}

impl EntityTable {
    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }

    pub fn internal(&self, name: &str) -> Option<&InternalEntity> {
        self.internal.get(name)
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.external.contains(name)
    }

    /// Whether the DOCTYPE named an external DTD subset (never fetched).
    pub fn has_external_subset(&self) -> bool {
        self.has_external_subset
    }

    /// First declaration wins.
    fn declare_internal(&mut self, name: &str, entity: InternalEntity) {
        if self.is_declared(name) {
            return;
        }
        self.order.push(name.to_string());
        self.internal.insert(name.to_string(), entity);
    }

    fn declare_external(&mut self, name: &str) {
        if self.is_declared(name) {
            return;
        }
        self.external.insert(name.to_string());
    }

    fn is_declared(&self, name: &str) -> bool {
        PREDEFINED_ENTITIES.contains(&name)
            || self.internal.contains_key(name)
            || self.external.contains(name)
    }
}

/// Parse the content of a `<!DOCTYPE ...>` declaration.
///
/// `content` is everything between `<!DOCTYPE` and the closing `>`.
pub fn parse_doctype(content: &str, line: usize) -> Result<EntityTable> {
    let mut table = EntityTable::default();

    let Some(open) = find_unquoted(content, b'[') else {
        table.has_external_subset = declares_external_id(content);
        return Ok(table);
    };
    table.has_external_subset = declares_external_id(&content[..open]);

    let close = content
        .rfind(']')
        .filter(|close| *close > open)
        .ok_or_else(|| XliffError::malformed(line, "unterminated DOCTYPE internal subset"))?;

    let mut cursor = Cursor::new(&content[open + 1..close], line);
    while cursor.skip_whitespace() {
        if cursor.eat("<!--") {
            cursor.skip_past("-->", "unterminated comment in DTD")?;
        } else if cursor.eat("<?") {
            cursor.skip_past("?>", "unterminated processing instruction in DTD")?;
        } else if cursor.eat("<!ENTITY") {
            parse_entity_decl(&mut cursor, &mut table)?;
        } else if cursor.eat("<!") {
            cursor.skip_declaration()?;
        } else if cursor.eat("%") {
            // Parameter entity reference: never expanded, never fetched.
            cursor.read_name()?;
            cursor.expect(";")?;
        } else {
            return Err(cursor.error("unexpected content in DTD internal subset"));
        }
    }

    Ok(table)
}

fn parse_entity_decl(cursor: &mut Cursor<'_>, table: &mut EntityTable) -> Result<()> {
    cursor.require_whitespace()?;
    let parameter = cursor.eat("%");
    if parameter {
        cursor.require_whitespace()?;
    }
    let name = cursor.read_name()?;
    cursor.require_whitespace()?;

    if let Some((value, quote)) = cursor.try_read_quoted()? {
        cursor.skip_declaration()?;
        if !parameter {
            table.declare_internal(
                name,
                InternalEntity {
                    value: value.to_string(),
                    quote,
                },
            );
        }
        return Ok(());
    }

    if cursor.eat("SYSTEM") {
        cursor.require_whitespace()?;
        cursor.read_quoted()?;
    } else if cursor.eat("PUBLIC") {
        cursor.require_whitespace()?;
        cursor.read_quoted()?;
        cursor.require_whitespace()?;
        cursor.read_quoted()?;
    } else {
        return Err(cursor.error("expected entity value, SYSTEM or PUBLIC"));
    }
    cursor.skip_declaration()?;

    if !parameter {
        tracing::warn!(
            entity = name,
            "External entity declared in DOCTYPE; it will never be resolved"
        );
        table.declare_external(name);
    }
    Ok(())
}

/// Entity restrictions applied to the outer scan and to every unit re-parse.
#[derive(Debug, Clone, Default)]
pub struct EntityPolicy {
    config: ParserConfig,
    entities: EntityTable,
    measured: HashMap<String, Measured>,
    admitted: bool,
}

#[derive(Debug, Clone, Default)]
struct Measured {
    expansion: Expansion,
    /// First external entity reached while expanding, if any.
    external: Option<String>,
}

impl EntityPolicy {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Vet a DOCTYPE seen by the outer scan.
    ///
    /// Rejects entity cycles and any internal entity whose expansion would
    /// exceed the configured limits, before anything is expanded.
    pub fn admit_doctype(&mut self, content: &str, line: usize) -> Result<()> {
        if self.admitted {
            return Err(XliffError::malformed(line, "duplicate DOCTYPE declaration"));
        }
        self.admitted = true;

        let entities = parse_doctype(content, line)?;
        if entities.has_external_subset() {
            tracing::debug!(line, "Ignoring external DTD subset");
        }

        let mut measured = HashMap::new();
        for name in &entities.order {
            let mut visiting = Vec::new();
            self.measure(&entities, name, &mut measured, &mut visiting, line)?;
        }

        self.entities = entities;
        self.measured = measured;
        Ok(())
    }

    fn measure(
        &self,
        entities: &EntityTable,
        name: &str,
        measured: &mut HashMap<String, Measured>,
        visiting: &mut Vec<String>,
        line: usize,
    ) -> Result<Measured> {
        if let Some(done) = measured.get(name) {
            return Ok(done.clone());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(XliffError::expansion(
                line,
                format!("entity '&{name};' references itself"),
            ));
        }
        let Some(entity) = entities.internal(name) else {
            return Ok(Measured::default());
        };

        visiting.push(name.to_string());
        let mut result = Measured::default();
        let mut literal_bytes = entity.value.len();

        for reference in entity_references(&entity.value) {
            literal_bytes = literal_bytes.saturating_sub(reference.token_len());
            match reference {
                Reference::Char(_) => {
                    result.expansion.bytes = result.expansion.bytes.saturating_add(CHAR_REF_BYTES);
                }
                Reference::Named(child) if PREDEFINED_ENTITIES.contains(&child) => {
                    result.expansion.bytes = result.expansion.bytes.saturating_add(1);
                }
                Reference::Named(child) if entities.is_external(child) => {
                    result.expansion.substitutions = result.expansion.substitutions.saturating_add(1);
                    result.external.get_or_insert_with(|| child.to_string());
                }
                Reference::Named(child) => {
                    let inner = self.measure(entities, child, measured, visiting, line)?;
                    let e = &mut result.expansion;
                    e.bytes = e.bytes.saturating_add(inner.expansion.bytes);
                    e.substitutions = e
                        .substitutions
                        .saturating_add(1)
                        .saturating_add(inner.expansion.substitutions);
                    e.depth = e.depth.max(inner.expansion.depth.saturating_add(1));
                    if result.external.is_none() {
                        result.external = inner.external;
                    }
                }
            }
        }
        visiting.pop();

        result.expansion.bytes = result.expansion.bytes.saturating_add(literal_bytes);
        self.enforce_limits(&format!("entity '&{name};'"), result.expansion, line)?;

        measured.insert(name.to_string(), result.clone());
        Ok(result)
    }

    fn enforce_limits(&self, subject: &str, expansion: Expansion, line: usize) -> Result<()> {
        let config = &self.config;
        if expansion.depth > config.max_entity_depth {
            return Err(XliffError::expansion(
                line,
                format!(
                    "{subject} nests entity references {} levels deep (limit {})",
                    expansion.depth, config.max_entity_depth
                ),
            ));
        }
        if expansion.substitutions > config.max_entity_substitutions {
            return Err(XliffError::expansion(
                line,
                format!(
                    "{subject} needs {} entity substitutions (limit {})",
                    expansion.substitutions, config.max_entity_substitutions
                ),
            ));
        }
        if expansion.bytes > config.max_entity_expansion {
            return Err(XliffError::expansion(
                line,
                format!(
                    "{subject} expands to {} bytes (limit {})",
                    expansion.bytes, config.max_entity_expansion
                ),
            ));
        }
        Ok(())
    }

    /// Vet the entity references of one isolated unit before it is re-parsed.
    ///
    /// Text inside CDATA sections and comments is scanned too; a false match
    /// there fails the unit rather than letting a reference through.
    pub fn check_fragment(&self, fragment: &str, line: usize) -> Result<()> {
        if self.entities.is_empty() {
            return Ok(());
        }

        let mut total = Expansion::default();
        for reference in entity_references(fragment) {
            let Reference::Named(name) = reference else {
                continue;
            };
            if self.entities.is_external(name) {
                return Err(XliffError::ExternalEntityBlocked {
                    line,
                    entity: name.to_string(),
                });
            }
            let Some(measured) = self.measured.get(name) else {
                continue;
            };
            if let Some(external) = &measured.external {
                return Err(XliffError::ExternalEntityBlocked {
                    line,
                    entity: external.clone(),
                });
            }
            total.bytes = total.bytes.saturating_add(measured.expansion.bytes);
            total.substitutions = total
                .substitutions
                .saturating_add(1)
                .saturating_add(measured.expansion.substitutions);
            total.depth = total.depth.max(measured.expansion.depth);
            self.enforce_limits("unit entity references", total, line)?;
        }
        Ok(())
    }

    /// Check escaped text or an attribute value met by the outer scan.
    ///
    /// References go through the same budget as a unit; every reference must
    /// also resolve to a predefined or declared internal entity.
    pub fn check_escaped(&self, raw: &str, line: usize) -> Result<()> {
        self.check_fragment(raw, line)?;
        quick_xml::escape::unescape_with(raw, |name| {
            let known =
                PREDEFINED_ENTITIES.contains(&name) || self.entities.internal(name).is_some();
            known.then_some("")
        })
        .map_err(|e| XliffError::malformed(line, e))?;
        Ok(())
    }

    /// DOCTYPE prolog for one unit re-parse.
    ///
    /// Declares only the internal entities `fragment` references, directly or
    /// through other entities. Empty when the fragment needs none.
    pub fn prolog_for(&self, fragment: &str) -> String {
        let mut needed: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = named_references(fragment).collect();
        while let Some(name) = pending.pop() {
            let Some(entity) = self.entities.internal(name) else {
                continue;
            };
            if needed.insert(name) {
                pending.extend(named_references(&entity.value));
            }
        }
        build_prolog(&self.entities, &needed)
    }

    /// roxmltree options for a unit re-parse preceded by `prolog`.
    ///
    /// A DTD is only accepted when this policy produced one itself.
    pub fn parsing_options(&self, prolog: &str) -> ParsingOptions<'_> {
        let mut options = ParsingOptions::default();
        options.allow_dtd = !prolog.is_empty();
        options.nodes_limit = self.config.nodes_limit;
        options
    }

    /// Translate a roxmltree failure on a unit fragment into an extractor error.
    pub fn map_parse_error(&self, err: roxmltree::Error, line: usize) -> XliffError {
        match err {
            roxmltree::Error::EntityReferenceLoop(_) => {
                XliffError::expansion(line, "entity reference loop in unit subtree")
            }
            roxmltree::Error::UnknownEntityReference(ref name, _)
                if self.entities.is_external(name) =>
            {
                XliffError::ExternalEntityBlocked {
                    line,
                    entity: name.to_string(),
                }
            }
            other => XliffError::malformed(line, format!("invalid unit subtree: {other}")),
        }
    }
}

fn build_prolog(entities: &EntityTable, needed: &HashSet<&str>) -> String {
    if needed.is_empty() {
        return String::new();
    }
    let mut prolog = String::from("<!DOCTYPE xliff-fragment [\n");
    for name in entities.order.iter().filter(|n| needed.contains(n.as_str())) {
        if let Some(entity) = entities.internal(name) {
            prolog.push_str(&format!(
                "<!ENTITY {name} {q}{value}{q}>\n",
                q = entity.quote,
                value = entity.value
            ));
        }
    }
    prolog.push_str("]>\n");
    prolog
}

/// An entity or character reference found in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// `&name;`
    Named(&'a str),
    /// `&#...;`, the part between `&` and `;`.
    Char(&'a str),
}

impl Reference<'_> {
    /// Length of the reference as written, `&` and `;` included.
    fn token_len(&self) -> usize {
        match self {
            Reference::Named(body) | Reference::Char(body) => body.len() + 2,
        }
    }
}

fn named_references(text: &str) -> impl Iterator<Item = &str> {
    entity_references(text).filter_map(|reference| match reference {
        Reference::Named(name) => Some(name),
        Reference::Char(_) => None,
    })
}

/// Find the well-formed entity and character references in `text`.
///
/// A stray `&` without a following name and `;` is skipped; the XML parser
/// reports it.
pub fn entity_references(text: &str) -> impl Iterator<Item = Reference<'_>> {
    let bytes = text.as_bytes();
    memchr::memchr_iter(b'&', bytes).filter_map(move |amp| {
        let rest = &text[amp + 1..];
        let end = rest.find(';')?;
        let body = &rest[..end];
        if let Some(number) = body.strip_prefix('#') {
            let valid = match number.strip_prefix('x') {
                Some(hex) => !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()),
                None => !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()),
            };
            return valid.then_some(Reference::Char(body));
        }
        is_name(body).then_some(Reference::Named(body))
    })
}

fn is_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(first) if is_name_start_byte(first) => bytes.all(is_name_byte),
        _ => false,
    }
}

#[inline]
fn is_name_start_byte(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

#[inline]
fn is_name_byte(b: u8) -> bool {
    is_name_start_byte(b) || matches!(b, b'0'..=b'9' | b'-' | b'.')
}

fn find_unquoted(s: &str, needle: u8) -> Option<usize> {
    let mut quote = None;
    for (i, b) in s.bytes().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == needle => return Some(i),
            None => {}
        }
    }
    None
}

fn declares_external_id(head: &str) -> bool {
    head.split_ascii_whitespace()
        .any(|word| word == "SYSTEM" || word == "PUBLIC")
}

/// Byte cursor over a DTD internal subset.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, line: usize) -> Self {
        Self { src, pos: 0, line }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Skip whitespace; returns `false` at the end of input.
    fn skip_whitespace(&mut self) -> bool {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start_matches(is_xml_whitespace).len();
        self.pos < self.src.len()
    }

    fn require_whitespace(&mut self) -> Result<()> {
        let before = self.pos;
        self.skip_whitespace();
        if self.pos == before {
            return Err(self.error("expected whitespace"));
        }
        Ok(())
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{token}'")))
        }
    }

    fn skip_past(&mut self, token: &str, message: &str) -> Result<()> {
        match self.rest().find(token) {
            Some(at) => {
                self.pos += at + token.len();
                Ok(())
            }
            None => Err(self.error(message)),
        }
    }

    fn read_name(&mut self) -> Result<&'a str> {
        let rest = self.rest();
        let len = rest
            .bytes()
            .take_while(|b| is_name_byte(*b))
            .count();
        let name = &rest[..len];
        if !is_name(name) {
            return Err(self.error("expected a name"));
        }
        self.pos += len;
        Ok(name)
    }

    fn try_read_quoted(&mut self) -> Result<Option<(&'a str, char)>> {
        match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => {
                let body = &self.rest()[1..];
                let end = body
                    .find(q)
                    .ok_or_else(|| self.error("unterminated quoted literal"))?;
                self.pos += end + 2;
                Ok(Some((&body[..end], q)))
            }
            _ => Ok(None),
        }
    }

    fn read_quoted(&mut self) -> Result<&'a str> {
        self.try_read_quoted()?
            .map(|(value, _)| value)
            .ok_or_else(|| self.error("expected quoted literal"))
    }

    /// Skip to just past the `>` that ends the current declaration.
    fn skip_declaration(&mut self) -> Result<()> {
        match find_unquoted(self.rest(), b'>') {
            Some(at) => {
                self.pos += at + 1;
                Ok(())
            }
            None => Err(self.error("unterminated markup declaration")),
        }
    }

    fn error(&self, message: &str) -> XliffError {
        let line = self.line + self.src[..self.pos].matches('\n').count();
        XliffError::malformed(line, format!("invalid DOCTYPE: {message}"))
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}
