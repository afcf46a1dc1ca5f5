//! Custom node factories: filtering, replacing and multiplying nodes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use xmlom::builder::{Builder, NodeFactory};
use xmlom::{AttributeType, Document, ErrorKind, NodeId, NodeKind, Nodes, XmlError};

fn build(factory: &mut dyn NodeFactory, xml: &str) -> Result<Document, XmlError> {
    Builder::with_factory(factory).build_str(xml)
}

/// Drops comments and processing instructions everywhere.
struct Minimal;

impl NodeFactory for Minimal {
    fn make_comment(&mut self, _doc: &mut Document, _data: &str) -> Result<Nodes, XmlError> {
        Ok(Nodes::new())
    }

    fn make_processing_instruction(
        &mut self,
        _doc: &mut Document,
        _target: &str,
        _data: &str,
    ) -> Result<Nodes, XmlError> {
        Ok(Nodes::new())
    }
}

#[test]
fn test_filtering_factory() {
    let doc = build(&mut Minimal, "<?a?><!--b--><root>x<!--c-->y<?d?></root><!--e-->").unwrap();
    assert_eq!(doc.child_count(doc.root()), 1);
    let root = doc.root_element();
    // Filtered markup still separates text runs.
    assert_eq!(doc.child_count(root), 2);
    assert_eq!(doc.to_xml(root), "<root>xy</root>");
}

/// Upper-cases element names and counts what it saw.
#[derive(Default)]
struct Renaming {
    started: usize,
    finished: usize,
}

impl NodeFactory for Renaming {
    fn start_making_element(
        &mut self,
        doc: &mut Document,
        name: &str,
        namespace: &str,
    ) -> Result<Option<NodeId>, XmlError> {
        self.started += 1;
        doc.new_element_ns(&name.to_uppercase(), namespace).map(Some)
    }

    fn finish_making_element(
        &mut self,
        _doc: &mut Document,
        element: NodeId,
    ) -> Result<Nodes, XmlError> {
        self.finished += 1;
        Ok(Nodes::one(element))
    }
}

#[test]
fn test_replacing_elements() {
    let mut factory = Renaming::default();
    let doc = build(&mut factory, "<root><a/><b><c/></b></root>").unwrap();
    assert_eq!(doc.to_xml(doc.root_element()), "<ROOT><A/><B><C/></B></ROOT>");
    assert_eq!(factory.started, 4);
    assert_eq!(factory.finished, 4);
}

/// Writes every text run twice.
struct Doubling;

impl NodeFactory for Doubling {
    fn make_text(&mut self, doc: &mut Document, text: &str) -> Result<Nodes, XmlError> {
        Ok(Nodes::from(vec![doc.new_text(text), doc.new_text(text)]))
    }
}

#[test]
fn test_multiplying_text() {
    let doc = build(&mut Doubling, "<root>ab<![CDATA[<c>]]></root>").unwrap();
    let root = doc.root_element();
    assert_eq!(doc.child_count(root), 2);
    assert_eq!(doc.value(root), "ab<c>ab<c>");
}

/// Removes `<secret>` subtrees and unwraps `<span>` tags.
struct Pruning;

impl NodeFactory for Pruning {
    fn start_making_element(
        &mut self,
        doc: &mut Document,
        name: &str,
        namespace: &str,
    ) -> Result<Option<NodeId>, XmlError> {
        if name == "span" {
            return Ok(None);
        }
        doc.new_element_ns(name, namespace).map(Some)
    }

    fn finish_making_element(
        &mut self,
        doc: &mut Document,
        element: NodeId,
    ) -> Result<Nodes, XmlError> {
        if doc.local_name(element) == Some("secret") {
            return Ok(Nodes::new());
        }
        Ok(Nodes::one(element))
    }
}

#[test]
fn test_pruning_and_unwrapping() {
    let doc = build(
        &mut Pruning,
        "<p>one <span class='x'>two <b>three</b></span><secret>hidden<i/></secret> four</p>",
    )
    .unwrap();
    let root = doc.root_element();
    assert_eq!(doc.to_xml(root), "<p>one two <b>three</b> four</p>");
}

/// Surrounds the root element with comments.
struct Framing;

impl NodeFactory for Framing {
    fn finish_making_element(
        &mut self,
        doc: &mut Document,
        element: NodeId,
    ) -> Result<Nodes, XmlError> {
        if doc.local_name(element) != Some("root") {
            return Ok(Nodes::one(element));
        }
        let before = doc.new_comment("before")?;
        let after = doc.new_comment("after")?;
        Ok(Nodes::from(vec![before, element, after]))
    }
}

#[test]
fn test_root_replacement_with_siblings() {
    let doc = build(&mut Framing, "<!--first--><root><child/></root>").unwrap();
    assert_eq!(
        doc.to_xml(doc.root()),
        "<!--first-->\n<!--before-->\n<root><child/></root>\n<!--after-->"
    );
}

/// Replaces the root element with nothing.
struct Vanishing;

impl NodeFactory for Vanishing {
    fn finish_making_element(
        &mut self,
        _doc: &mut Document,
        _element: NodeId,
    ) -> Result<Nodes, XmlError> {
        Ok(Nodes::new())
    }
}

#[test]
fn test_root_must_survive() {
    let err = build(&mut Vanishing, "<root/>").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parsing);
}

/// Turns attributes into child elements.
struct AttributesAsElements;

impl NodeFactory for AttributesAsElements {
    fn make_attribute(
        &mut self,
        doc: &mut Document,
        name: &str,
        _namespace: &str,
        value: &str,
        _attribute_type: AttributeType,
    ) -> Result<Nodes, XmlError> {
        let element = doc.new_element(name)?;
        let text = doc.new_text(value);
        doc.append_child(element, text)?;
        Ok(Nodes::one(element))
    }
}

#[test]
fn test_attribute_hook_may_return_children() {
    let doc = build(&mut AttributesAsElements, "<root a='1' b='2'>x</root>").unwrap();
    let root = doc.root_element();
    assert_eq!(doc.attribute_count(root), 0);
    assert_eq!(doc.to_xml(root), "<root><a>1</a><b>2</b>x</root>");
}

/// Rejects any comment mentioning "forbidden".
struct Strict;

impl NodeFactory for Strict {
    fn make_comment(&mut self, doc: &mut Document, data: &str) -> Result<Nodes, XmlError> {
        if data.contains("forbidden") {
            return Err(XmlError::new(ErrorKind::IllegalData, "forbidden comment"));
        }
        doc.new_comment(data).map(Nodes::one)
    }
}

#[test]
fn test_factory_error_becomes_cause() {
    let err = build(&mut Strict, "<root>\n<!-- forbidden --></root>").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parsing);
    assert_eq!(err.line(), Some(2));
    let cause = err.cause().expect("factory error kept as cause");
    assert_eq!(cause.to_string(), "forbidden comment");
}

/// Builds into a document it created itself, and records the finish call.
struct Prepared {
    finished: bool,
}

impl NodeFactory for Prepared {
    fn start_making_document(&mut self) -> Result<Document, XmlError> {
        let mut doc = Document::placeholder();
        doc.set_base_uri(Some("memory:prepared"));
        Ok(doc)
    }

    fn finish_making_document(&mut self, doc: &mut Document) -> Result<(), XmlError> {
        self.finished = true;
        let note = doc.new_comment(" built ")?;
        let document = doc.root();
        doc.append_child(document, note)
    }
}

#[test]
fn test_document_hooks() {
    let mut factory = Prepared { finished: false };
    let doc = build(&mut factory, "<root/>").unwrap();
    assert!(factory.finished);
    assert_eq!(doc.base_uri(), Some("memory:prepared"));
    let last = doc.child(doc.root(), 1).unwrap();
    assert!(matches!(doc.kind(last), NodeKind::Comment { .. }));
}

/// Drops whitespace-only text runs.
struct TrimWhitespace;

impl NodeFactory for TrimWhitespace {
    fn make_text(&mut self, doc: &mut Document, text: &str) -> Result<Nodes, XmlError> {
        if text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')) {
            return Ok(Nodes::new());
        }
        Ok(Nodes::one(doc.new_text(text)))
    }
}

#[test]
fn test_whitespace_policy_belongs_to_factory() {
    let doc = build(&mut TrimWhitespace, "<a> <b/> </a>").unwrap();
    let a = doc.root_element();
    assert_eq!(doc.child_count(a), 1);
    assert!(matches!(doc.kind(doc.child(a, 0).unwrap()), NodeKind::Element { .. }));

    let doc = build(&mut TrimWhitespace, "<a> x </a>").unwrap();
    assert_eq!(doc.value(doc.root_element()), " x ");

    // The default factory keeps whitespace verbatim.
    let doc = Document::parse_str("<a> <b/> </a>").unwrap();
    assert_eq!(doc.child_count(doc.root_element()), 3);
}

/// Points every doctype at a local copy of its DTD.
struct LocalDtd;

impl NodeFactory for LocalDtd {
    fn make_doc_type(
        &mut self,
        doc: &mut Document,
        root_name: &str,
        _public_id: Option<&str>,
        _system_id: Option<&str>,
    ) -> Result<Nodes, XmlError> {
        doc.new_doc_type(root_name, None, Some("local.dtd"))
            .map(Nodes::one)
    }
}

#[test]
fn test_replaced_doc_type_keeps_internal_subset() {
    let doc = build(
        &mut LocalDtd,
        "<!DOCTYPE r PUBLIC '-//X//EN' 'http://example.com/r.dtd' [<!ENTITY e 'v'>]><r>&e;</r>",
    )
    .unwrap();
    let dt = doc.doc_type().expect("replacement doctype attached");
    match doc.kind(dt) {
        NodeKind::DocType {
            public_id,
            system_id,
            internal_subset,
            ..
        } => {
            assert_eq!(public_id.as_deref(), None);
            assert_eq!(system_id.as_deref(), Some("local.dtd"));
            assert_eq!(internal_subset.as_deref(), Some("<!ENTITY e 'v'>"));
        }
        other => panic!("expected a doctype, got {other:?}"),
    }
    assert_eq!(doc.value(doc.root_element()), "v");
}

/// Drops the doctype but keeps a note of it.
struct NoDocType;

impl NodeFactory for NoDocType {
    fn make_doc_type(
        &mut self,
        doc: &mut Document,
        root_name: &str,
        _public_id: Option<&str>,
        _system_id: Option<&str>,
    ) -> Result<Nodes, XmlError> {
        let note = doc.new_comment(&format!(" doctype {root_name} removed "))?;
        Ok(Nodes::one(note))
    }
}

#[test]
fn test_dropped_doc_type_still_declares_entities() {
    let doc = build(&mut NoDocType, "<!DOCTYPE r [<!ENTITY e 'v'>]><r>&e;</r>").unwrap();
    assert_eq!(doc.doc_type(), None);
    assert_eq!(
        doc.to_xml(doc.root()),
        "<!-- doctype r removed -->\n<r>v</r>"
    );
}
