//! Helpers for navigating a parsed unit subtree.
//!
//! Lookups match on local name *and* namespace, so a `<source>` from a
//! foreign vocabulary never stands in for the XLIFF one.

use roxmltree::Node;

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xliff_streaming::xml::get_tag_name;
///
/// let xml = r#"<x:unit xmlns:x="urn:example"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "unit");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Check whether `node` is an element with the given namespace and local name.
///
/// `None` matches only elements without a namespace.
pub fn has_tag(node: Node<'_, '_>, namespace: Option<&str>, tag: &str) -> bool {
    node.is_element() && get_tag_name(node) == tag && node.tag_name().namespace() == namespace
}

/// Find the first child element with the given namespace and local name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xliff_streaming::xml::find_child;
///
/// let xml = r#"<unit xmlns="urn:a" xmlns:b="urn:b"><b:source/><source>x</source></unit>"#;
/// let doc = Document::parse(xml).unwrap();
/// let unit = doc.root_element();
///
/// let source = find_child(unit, Some("urn:a"), "source").unwrap();
/// assert_eq!(source.text(), Some("x"));
/// assert!(find_child(unit, None, "source").is_none());
/// ```
pub fn find_child<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: Option<&str>,
    tag: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| has_tag(*child, namespace, tag))
}

/// Concatenate every descendant text node, in document order.
///
/// Whitespace is kept exactly as written; markup inside the element
/// contributes its text only.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xliff_streaming::xml::text_content;
///
/// let doc = Document::parse("<source> Hello <g id=\"1\">big</g> world </source>").unwrap();
/// assert_eq!(text_content(doc.root_element()), " Hello big world ");
/// ```
pub fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Get all element children of a node.
pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}
