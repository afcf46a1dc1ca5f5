//! Text and CDATA merging during a build, and how merged nodes serialize.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use xmlom::{Document, NodeId, NodeKind};

/// Parses `xml` and returns the document with the root element's only child.
fn only_child(xml: &str) -> (Document, NodeId) {
    let doc = Document::parse_str(xml).unwrap();
    let root = doc.root_element();
    assert_eq!(doc.child_count(root), 1, "expected one child in {xml}");
    let child = doc.child(root, 0).unwrap();
    assert!(matches!(doc.kind(child), NodeKind::Text { .. }));
    (doc, child)
}

#[test]
fn test_adjacent_cdata_sections_merge() {
    let (doc, text) = only_child("<a><![CDATA[x]]><![CDATA[y]]></a>");
    assert_eq!(doc.value(text), "xy");
    assert!(doc.is_cdata(text));
}

#[test]
fn test_child1_keeps_cdata() {
    let (doc, text) = only_child("<child1><![CDATA[<&>]]></child1>");
    assert_eq!(doc.value(text), "<&>");
    assert_eq!(doc.to_xml(text), "<![CDATA[<&>]]>");
}

#[test]
fn test_child2_surrounding_whitespace() {
    let (doc, text) = only_child("<child2> <![CDATA[<&>]]> </child2>");
    assert_eq!(doc.value(text), " <&> ");
}

#[test]
fn test_child3_trailing_whitespace() {
    let (doc, text) = only_child("<child3><![CDATA[<&>]]> </child3>");
    assert_eq!(doc.value(text), "<&> ");
    assert!(doc.is_cdata(text));
}

#[test]
fn test_child4_two_sections_around_space() {
    let (doc, text) = only_child("<child4><![CDATA[<&>]]> <![CDATA[<&>]]></child4>");
    assert_eq!(doc.value(text), "<&> <&>");
}

#[test]
fn test_child5_terminator_forces_escaping() {
    let (doc, text) = only_child("<child5><![CDATA[<&>]]>]]&gt;<![CDATA[<&>]]></child5>");
    assert_eq!(doc.value(text), "<&>]]><&>");
    assert_eq!(doc.to_xml(text), "&lt;&amp;&gt;]]&gt;&lt;&amp;&gt;");
}

#[test]
fn test_set_value_with_terminator_escapes() {
    let (mut doc, text) = only_child("<a><![CDATA[ok]]></a>");
    doc.set_value(text, "A]]>A").unwrap();
    assert!(doc.is_cdata(text));
    assert_eq!(doc.to_xml(text), "A]]&gt;A");
}

#[test]
fn test_markup_splits_text_runs() {
    let doc = Document::parse_str("<a><![CDATA[x]]><!--c--><![CDATA[y]]>z</a>").unwrap();
    let root = doc.root_element();
    assert_eq!(doc.child_count(root), 3);
    let first = doc.child(root, 0).unwrap();
    let last = doc.child(root, 2).unwrap();
    assert_eq!(doc.value(first), "x");
    assert_eq!(doc.value(last), "yz");
    assert!(doc.is_cdata(last));
}

#[test]
fn test_empty_cdata_section_creates_no_node() {
    let doc = Document::parse_str("<a><![CDATA[]]></a>").unwrap();
    assert_eq!(doc.child_count(doc.root_element()), 0);
}

#[test]
fn test_merged_cdata_round_trips() {
    let doc = Document::parse_str("<a><![CDATA[<&>]]> <![CDATA[<&>]]></a>").unwrap();
    let reparsed = Document::parse_str(&doc.to_xml(doc.root_element())).unwrap();
    assert_eq!(reparsed, doc);
}
