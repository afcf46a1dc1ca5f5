//! Property tests over comment data, leaf access and serialization.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use xmlom::serial::{serialize_to_vec, SerializeOptions};
use xmlom::{Document, ErrorKind};

/// Comment text without carriage returns, double hyphens or edge hyphens.
fn comment_text() -> impl Strategy<Value = String> {
    proptest::collection::vec("[^\r\\-]{1,8}", 0..5).prop_map(|parts| parts.join("-"))
}

fn content_text() -> impl Strategy<Value = String> {
    "[\t\r\n a-z<>&\"'\u{e9}\u{20AC}\u{1F600}\\]]{0,40}"
}

fn encoding() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("UTF-8"),
        Just("UTF-16"),
        Just("US-ASCII"),
        Just("ISO-8859-1"),
    ]
}

proptest! {
    #[test]
    fn comment_value_round_trips(text in comment_text()) {
        let mut doc = Document::new("root").unwrap();
        let comment = doc.new_comment(&text).unwrap();
        prop_assert_eq!(doc.value(comment), text);
    }

    #[test]
    fn leaf_child_access_fails(index in any::<usize>(), text in content_text()) {
        let mut doc = Document::new("root").unwrap();
        let leaf = doc.new_text(&text);
        prop_assert_eq!(doc.child_count(leaf), 0);
        prop_assert_eq!(doc.child(leaf, index).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn serialized_documents_reparse_equal(
        text in content_text().prop_filter("text nodes are not empty", |t| !t.is_empty()),
        value in content_text(),
        cdata in any::<bool>(),
        encoding in encoding(),
    ) {
        let mut doc = Document::new("root").unwrap();
        let root = doc.root_element();
        let node = if cdata { doc.new_cdata(&text) } else { doc.new_text(&text) };
        doc.append_child(root, node).unwrap();
        let attr = doc.new_attribute("value", &value).unwrap();
        doc.add_attribute(root, attr).unwrap();

        let options = SerializeOptions::default().encoding(encoding);
        let bytes = serialize_to_vec(&doc, &options).unwrap();
        let reparsed = Document::parse_bytes(&bytes).unwrap();
        prop_assert_eq!(reparsed, doc);
    }
}
