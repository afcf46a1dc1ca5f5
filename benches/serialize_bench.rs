#![allow(clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use xmlom::builder::{Builder, NodeFactory};
use xmlom::serial::{serialize_to_vec, SerializeOptions};
use xmlom::{Document, Nodes, XmlError};

// ---------------------------------------------------------------------------
// Document generators
// ---------------------------------------------------------------------------

/// A catalog of `count` books with attributes, text, CDATA and comments.
fn make_catalog_xml(count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<catalog>\n");
    for i in 0..count {
        let _ = writeln!(
            xml,
            "  <book id=\"bk{i}\" lang=\"en\"><title>Title {i} &amp; more</title>\
             <!-- entry {i} --><notes><![CDATA[<b>{i}</b>]]> and text</notes>\
             <price>{}.99</price></book>",
            10 + i
        );
    }
    xml.push_str("</catalog>\n");
    xml
}

/// Elements spread over several namespaces.
fn make_namespace_xml() -> String {
    let mut xml = String::from("<r:root xmlns:r=\"urn:root\" xmlns:a=\"urn:a\">");
    for i in 0..200 {
        let _ = write!(
            xml,
            "<a:item a:n=\"{i}\"><plain xmlns=\"urn:default\">{i}</plain></a:item>"
        );
    }
    xml.push_str("</r:root>");
    xml
}

/// A document full of characters outside ASCII.
fn make_unicode_xml() -> String {
    let mut xml = String::from("<root>");
    for _ in 0..500 {
        xml.push_str("<p title=\"caf\u{e9}\">\u{4E2D}\u{6587} \u{20AC}5 \u{1F600}</p>");
    }
    xml.push_str("</root>");
    xml
}

// ---------------------------------------------------------------------------
// Building benchmarks
// ---------------------------------------------------------------------------

fn bench_build_catalog(c: &mut Criterion) {
    let xml = make_catalog_xml(1000);
    c.bench_function("build_catalog", |b| {
        b.iter(|| Document::parse_str(black_box(&xml)));
    });
}

/// A factory that drops comments, to measure hook overhead.
struct NoComments;

impl NodeFactory for NoComments {
    fn make_comment(&mut self, _doc: &mut Document, _data: &str) -> Result<Nodes, XmlError> {
        Ok(Nodes::new())
    }
}

fn bench_build_with_factory(c: &mut Criterion) {
    let xml = make_catalog_xml(1000);
    c.bench_function("build_with_factory", |b| {
        b.iter(|| {
            let mut factory = NoComments;
            Builder::with_factory(&mut factory).build_str(black_box(&xml))
        });
    });
}

// ---------------------------------------------------------------------------
// Serialization benchmarks
// ---------------------------------------------------------------------------

fn bench_serialize_utf8(c: &mut Criterion) {
    let doc = Document::parse_str(&make_catalog_xml(1000)).expect("failed to parse catalog");
    let options = SerializeOptions::default();
    c.bench_function("serialize_utf8", |b| {
        b.iter(|| serialize_to_vec(black_box(&doc), &options));
    });
}

fn bench_serialize_indented(c: &mut Criterion) {
    let doc = Document::parse_str(&make_catalog_xml(1000)).expect("failed to parse catalog");
    let options = SerializeOptions::default().indent(2).max_line_length(72);
    c.bench_function("serialize_indented", |b| {
        b.iter(|| serialize_to_vec(black_box(&doc), &options));
    });
}

fn bench_serialize_namespaces(c: &mut Criterion) {
    let doc = Document::parse_str(&make_namespace_xml()).expect("failed to parse namespaces");
    let options = SerializeOptions::default();
    c.bench_function("serialize_namespaces", |b| {
        b.iter(|| serialize_to_vec(black_box(&doc), &options));
    });
}

fn bench_serialize_ascii_fallback(c: &mut Criterion) {
    let doc = Document::parse_str(&make_unicode_xml()).expect("failed to parse unicode");
    let options = SerializeOptions::default().encoding("US-ASCII");
    c.bench_function("serialize_ascii_fallback", |b| {
        b.iter(|| serialize_to_vec(black_box(&doc), &options));
    });
}

fn bench_serialize_utf16(c: &mut Criterion) {
    let doc = Document::parse_str(&make_unicode_xml()).expect("failed to parse unicode");
    let options = SerializeOptions::default().encoding("UTF-16");
    c.bench_function("serialize_utf16", |b| {
        b.iter(|| serialize_to_vec(black_box(&doc), &options));
    });
}

// ---------------------------------------------------------------------------
// Roundtrip benchmark: build -> serialize -> build
// ---------------------------------------------------------------------------

fn bench_roundtrip(c: &mut Criterion) {
    let xml = make_catalog_xml(100);
    let options = SerializeOptions::default();
    c.bench_function("roundtrip", |b| {
        b.iter(|| {
            let doc = Document::parse_str(black_box(&xml)).expect("parse failed");
            let bytes = serialize_to_vec(&doc, &options).expect("serialize failed");
            let doc2 = Document::parse_bytes(&bytes).expect("re-parse failed");
            black_box(doc2);
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(building, bench_build_catalog, bench_build_with_factory);

criterion_group!(
    serialization,
    bench_serialize_utf8,
    bench_serialize_indented,
    bench_serialize_namespaces,
    bench_serialize_ascii_fallback,
    bench_serialize_utf16,
);

criterion_group!(roundtrip, bench_roundtrip);

criterion_main!(building, serialization, roundtrip);
