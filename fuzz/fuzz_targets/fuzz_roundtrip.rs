#![no_main]
use libfuzzer_sys::fuzz_target;
use xmlom::serial::{serialize_to_vec, SerializeOptions};
use xmlom::Document;

fuzz_target!(|data: &[u8]| {
    // Build -> serialize -> build must never panic, and whatever builds once
    // must build again into an equal document.
    if let Ok(doc) = Document::parse_bytes(data) {
        for encoding in ["UTF-8", "US-ASCII"] {
            let options = SerializeOptions::default().encoding(encoding);
            if let Ok(bytes) = serialize_to_vec(&doc, &options) {
                let again = Document::parse_bytes(&bytes).expect("serialized output must build");
                assert!(again == doc, "round trip changed the document");
            }
        }
    }
});
