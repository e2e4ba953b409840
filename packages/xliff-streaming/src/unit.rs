//! Per-unit re-parse and field extraction.
//!
//! Each captured unit slice is parsed on its own into a small roxmltree
//! document. The tree lives only for the duration of [`materialize`].

use roxmltree::{Document, Node};

use crate::config::{SEGMENT_TAG, SOURCE_TAG, TARGET_TAG};
use crate::dtd::EntityPolicy;
use crate::error::{Result, XliffError};
use crate::scanner::RawUnit;
use crate::types::UnitRecord;
use crate::xml::{element_children, find_child, text_content};

/// Synthetic root wrapped around every unit slice.
const FRAGMENT_ROOT: &str = "xliff-fragment";

/// Turn a captured unit into a [`UnitRecord`].
///
/// The slice is checked against `policy` before the re-parse, and the
/// re-parse itself runs with the same limits.
pub fn materialize(raw: &RawUnit<'_>, policy: &EntityPolicy) -> Result<UnitRecord> {
    let body = format!(
        "<{root}{namespaces}>{unit}</{root}>",
        root = FRAGMENT_ROOT,
        namespaces = raw.namespaces,
        unit = raw.xml,
    );
    // The in-scope namespace values are spliced in too, so they share the budget.
    policy.check_fragment(&body, raw.line)?;

    let prolog = policy.prolog_for(&body);
    let options = policy.parsing_options(&prolog);
    let fragment = if prolog.is_empty() { body } else { prolog + &body };
    let doc = Document::parse_with_options(&fragment, options)
        .map_err(|e| policy.map_parse_error(e, raw.line))?;

    let unit = element_children(doc.root_element())
        .next()
        .ok_or_else(|| XliffError::malformed(raw.line, "unit subtree has no element"))?;

    extract_fields(unit, raw.line)
}

/// Read id, source and target from a parsed unit element.
fn extract_fields(unit: Node<'_, '_>, line: usize) -> Result<UnitRecord> {
    let id = match unit.attribute("id") {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(XliffError::MissingId { line }),
    };

    let namespace = unit.tag_name().namespace();
    let holder = find_child(unit, namespace, SEGMENT_TAG).unwrap_or(unit);

    let source = find_child(holder, namespace, SOURCE_TAG)
        .map(text_content)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| XliffError::MissingSource {
            id: id.clone(),
            line,
        })?;

    let target = find_child(holder, namespace, TARGET_TAG).map(text_content);

    tracing::trace!(line, id = %id, has_target = target.is_some(), "Materialized unit");

    Ok(UnitRecord {
        id,
        source,
        target,
        line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;
    use crate::error::ErrorKind;
    use crate::types::{UnitTag, XliffVersion};
    use pretty_assertions::assert_eq;

    fn raw<'a>(xml: &'a str, namespaces: &str) -> RawUnit<'a> {
        RawUnit {
            xml,
            line: 5,
            version: XliffVersion::V1_0,
            tag: UnitTag::TransUnit,
            namespaces: namespaces.to_string(),
        }
    }

    fn policy() -> EntityPolicy {
        EntityPolicy::new(ParserConfig::default())
    }

    #[test]
    fn test_materialize_basic_unit() {
        let unit = raw(
            r#"<trans-unit id="greeting"><source>Hello</source><target>Hallo</target></trans-unit>"#,
            "",
        );
        let record = materialize(&unit, &policy()).unwrap();
        assert_eq!(
            record,
            UnitRecord {
                id: "greeting".to_string(),
                source: "Hello".to_string(),
                target: Some("Hallo".to_string()),
                line: 5,
            }
        );
    }

    #[test]
    fn test_materialize_keeps_whitespace() {
        let unit = raw(
            "<trans-unit id=\"ws\"><source>  padded\n text  </source><target> </target></trans-unit>",
            "",
        );
        let record = materialize(&unit, &policy()).unwrap();
        assert_eq!(record.source, "  padded\n text  ");
        assert_eq!(record.target.as_deref(), Some(" "));
    }

    #[test]
    fn test_absent_and_empty_target_differ() {
        let absent = raw(r#"<trans-unit id="a"><source>x</source></trans-unit>"#, "");
        let empty = raw(r#"<trans-unit id="b"><source>x</source><target/></trans-unit>"#, "");
        assert_eq!(materialize(&absent, &policy()).unwrap().target, None);
        assert_eq!(
            materialize(&empty, &policy()).unwrap().target,
            Some(String::new())
        );
    }

    #[test]
    fn test_segment_is_content_holder() {
        let unit = raw(
            r#"<unit id="u1"><notes><note>n</note></notes><segment><source>Src</source><target>Tgt</target></segment><segment><source>second</source></segment></unit>"#,
            r#" xmlns="urn:oasis:names:tc:xliff:document:2.0""#,
        );
        let record = materialize(&unit, &policy()).unwrap();
        assert_eq!(record.source, "Src");
        assert_eq!(record.target.as_deref(), Some("Tgt"));
    }

    #[test]
    fn test_unit_without_segment_reads_directly() {
        let unit = raw(
            r#"<unit id="flat"><source>direct</source></unit>"#,
            r#" xmlns="urn:oasis:names:tc:xliff:document:2.0""#,
        );
        assert_eq!(materialize(&unit, &policy()).unwrap().source, "direct");
    }

    #[test]
    fn test_prefixed_unit_resolves_through_wrapper() {
        let unit = raw(
            r#"<x:trans-unit id="p"><x:source>Prefixed</x:source><source>wrong</source></x:trans-unit>"#,
            r#" xmlns:x="urn:oasis:names:tc:xliff:document:1.2""#,
        );
        assert_eq!(materialize(&unit, &policy()).unwrap().source, "Prefixed");
    }

    #[test]
    fn test_inline_markup_contributes_text() {
        let unit = raw(
            r#"<trans-unit id="m"><source>Click <g id="1">here</g> &amp; <![CDATA[<b>]]></source></trans-unit>"#,
            "",
        );
        assert_eq!(materialize(&unit, &policy()).unwrap().source, "Click here & <b>");
    }

    #[test]
    fn test_missing_id() {
        let unit = raw("<trans-unit><source>x</source></trans-unit>", "");
        let err = materialize(&unit, &policy()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingId);
        assert_eq!(err.line(), Some(5));

        let empty = raw(r#"<trans-unit id=""><source>x</source></trans-unit>"#, "");
        assert_eq!(
            materialize(&empty, &policy()).unwrap_err().kind(),
            ErrorKind::MissingId
        );
    }

    #[test]
    fn test_missing_or_empty_source() {
        for xml in [
            r#"<trans-unit id="s"><target>x</target></trans-unit>"#,
            r#"<trans-unit id="s"><source></source></trans-unit>"#,
            r#"<trans-unit id="s"/>"#,
        ] {
            let err = materialize(&raw(xml, ""), &policy()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingSource, "{xml}");
        }
    }

    #[test]
    fn test_source_in_foreign_namespace_not_used() {
        let unit = raw(
            r#"<trans-unit id="f" xmlns:o="urn:other"><o:source>foreign</o:source></trans-unit>"#,
            "",
        );
        assert_eq!(
            materialize(&unit, &policy()).unwrap_err().kind(),
            ErrorKind::MissingSource
        );
    }

    #[test]
    fn test_undeclared_entity_is_malformed() {
        let unit = raw(r#"<trans-unit id="e"><source>&nope;</source></trans-unit>"#, "");
        assert_eq!(
            materialize(&unit, &policy()).unwrap_err().kind(),
            ErrorKind::MalformedXml
        );
    }

    #[test]
    fn test_internal_entity_expands_through_prolog() {
        let mut policy = policy();
        policy
            .admit_doctype(r#"xliff [<!ENTITY brand "Acme">]"#, 1)
            .unwrap();
        let unit = raw(r#"<trans-unit id="b"><source>&brand; Inc</source></trans-unit>"#, "");
        assert_eq!(materialize(&unit, &policy).unwrap().source, "Acme Inc");
    }

    #[test]
    fn test_external_entity_blocked() {
        let mut policy = policy();
        policy
            .admit_doctype(r#"xliff [<!ENTITY xxe SYSTEM "file:///etc/passwd">]"#, 1)
            .unwrap();
        let unit = raw(r#"<trans-unit id="x"><source>&xxe;</source></trans-unit>"#, "");
        let err = materialize(&unit, &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalEntityBlocked);
        assert_eq!(err.line(), Some(5));
    }

    #[test]
    fn test_namespace_values_share_entity_budget() {
        let mut policy =
            EntityPolicy::new(ParserConfig::default().with_max_entity_substitutions(2));
        policy
            .admit_doctype(r#"xliff [<!ENTITY a "x">]"#, 1)
            .unwrap();
        let unit = raw(
            r#"<trans-unit id="n"><source>plain</source></trans-unit>"#,
            r#" xmlns:p="urn:&a;&a;&a;""#,
        );
        let err = materialize(&unit, &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntityExpansion);
        assert_eq!(err.line(), Some(5));
    }
}
