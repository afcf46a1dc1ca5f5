//! Qualified name handling.
//!
//! A qualified name has the form `prefix:local` or just `local`. Elements and
//! attributes store the two parts separately; these helpers convert between
//! the stored parts and the lexical form used in markup.
//!
//! See <https://www.w3.org/TR/xml-names/#NT-QName>

/// Splits a qualified name at its first colon.
///
/// Returns `(Some(prefix), local)` if the name contains a colon,
/// or `(None, local)` if it does not.
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Joins a prefix and a local name into lexical form.
#[must_use]
pub fn join_qname(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}:{local}"),
        _ => local.to_string(),
    }
}
