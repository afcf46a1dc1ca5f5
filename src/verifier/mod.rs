//! Content validators.
//!
//! Pure checks for the grammars the tree model enforces before any value is
//! stored: XML names (XML 1.0 §2.3), namespace-qualified names (Namespaces in
//! XML 1.0 §3), comment data (§2.5), processing instructions (§2.6), public
//! identifiers, and surrogate pairing in UTF-16 input.
//!
//! Each check returns `Ok(())` or an [`XmlError`] whose kind identifies the
//! rule that was broken.

use crate::error::{ErrorKind, XmlError};
use crate::util::qname::split_qname;

/// The namespace URI permanently bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The namespace URI of namespace declarations themselves.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

// -------------------------------------------------------------------------
// Character classes
// -------------------------------------------------------------------------

/// Returns `true` if `c` is a valid `NameStartChar` per XML 1.0 §2.3 `[4]`.
pub(crate) fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// Returns `true` if `c` is a valid `NameChar` per XML 1.0 §2.3 `[4a]`.
pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// Returns `true` for the four XML whitespace characters.
pub(crate) fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Returns `true` if `c` can be written as XML, literally or as a character
/// reference. Other C0 controls are written as references and read back.
pub(crate) fn is_serializable_char(c: char) -> bool {
    !matches!(c, '\0' | '\u{FFFE}' | '\u{FFFF}')
}

/// `PubidChar ::= #x20 | #xD | #xA | [a-zA-Z0-9] | [-'()+,./:=?;!*#@$_%]`
fn is_pubid_char(c: char) -> bool {
    matches!(c,
        ' ' | '\r' | '\n' |
        'a'..='z' | 'A'..='Z' | '0'..='9' |
        '-' | '\'' | '(' | ')' | '+' | ',' | '.' | '/' | ':' |
        '=' | '?' | ';' | '!' | '*' | '#' | '@' | '$' | '_' | '%'
    )
}

// -------------------------------------------------------------------------
// Names
// -------------------------------------------------------------------------

/// Checks that `name` matches the XML `Name` production.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalName`] error for an empty name, a bad first
/// character, or a bad subsequent character.
pub fn check_name(name: &str) -> Result<(), XmlError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(XmlError::illegal_name("XML names cannot be empty", name));
    };
    if !is_name_start_char(first) {
        return Err(XmlError::illegal_name(
            format!("XML names cannot start with the character {first:?}"),
            name,
        ));
    }
    if let Some(bad) = chars.find(|&c| !is_name_char(c)) {
        return Err(XmlError::illegal_name(
            format!("XML names cannot contain the character {bad:?}"),
            name,
        ));
    }
    Ok(())
}

/// Checks that `name` matches the `NCName` production (a `Name` with no colon).
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalName`] error if the name is not an `NCName`.
pub fn check_ncname(name: &str) -> Result<(), XmlError> {
    if name.contains(':') {
        return Err(XmlError::illegal_name(
            "NCNames cannot contain colons",
            name,
        ));
    }
    check_name(name)
}

/// Checks that `name` is a `QName`: an `NCName`, or two `NCName`s joined by a
/// single colon.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalName`] error otherwise.
pub fn check_qname(name: &str) -> Result<(), XmlError> {
    match split_qname(name) {
        (Some(prefix), local) => {
            if prefix.is_empty() || local.is_empty() {
                return Err(XmlError::illegal_name(
                    "qualified names cannot have an empty prefix or local part",
                    name,
                ));
            }
            check_ncname(prefix).map_err(|_| {
                XmlError::illegal_name(format!("{prefix:?} is not a legal prefix"), name)
            })?;
            check_ncname(local)
        }
        (None, local) => check_ncname(local),
    }
}

// -------------------------------------------------------------------------
// Character data
// -------------------------------------------------------------------------

/// Checks text content.
///
/// A Rust string cannot hold an unpaired surrogate, and every other
/// character is escaped by the serializer, so all strings are accepted.
/// UTF-16 input is checked by [`check_utf16`].
///
/// # Errors
///
/// Never fails; the signature matches the other checks.
pub fn check_text(_text: &str) -> Result<(), XmlError> {
    Ok(())
}

fn check_no_carriage_return(data: &str, what: &str) -> Result<(), XmlError> {
    if data.contains('\r') {
        return Err(XmlError::illegal_data(
            format!("{what} cannot contain carriage returns"),
            data,
        ));
    }
    Ok(())
}

/// Checks comment data.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalData`] error if the data contains a
/// carriage return or `--`, or starts or ends with `-`.
pub fn check_comment_data(data: &str) -> Result<(), XmlError> {
    check_no_carriage_return(data, "comment data")?;
    if data.contains("--") {
        return Err(XmlError::illegal_data(
            "comment data cannot contain a double hyphen (--)",
            data,
        ));
    }
    if data.starts_with('-') {
        return Err(XmlError::illegal_data(
            "comment data cannot start with a hyphen",
            data,
        ));
    }
    if data.ends_with('-') {
        return Err(XmlError::illegal_data(
            "comment data cannot end with a hyphen",
            data,
        ));
    }
    Ok(())
}

/// Checks a processing-instruction target.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalTarget`] error if the target is empty, is not
/// an `NCName`, or is `xml` in any case.
pub fn check_pi_target(target: &str) -> Result<(), XmlError> {
    if target.is_empty() {
        return Err(XmlError::illegal_target(
            "processing instruction targets cannot be empty",
            target,
        ));
    }
    if target.eq_ignore_ascii_case("xml") {
        return Err(XmlError::illegal_target(
            format!("{target:?} is reserved for the XML declaration"),
            target,
        ));
    }
    check_ncname(target).map_err(|e| {
        XmlError::illegal_target(
            format!("processing instruction target: {}", e.message()),
            target,
        )
    })
}

/// Checks processing-instruction data.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalData`] error if the data contains `?>` or a
/// carriage return, or starts with whitespace (which would merge into the
/// separator between target and data when reparsed).
pub fn check_pi_data(data: &str) -> Result<(), XmlError> {
    check_no_carriage_return(data, "processing instruction data")?;
    if data.contains("?>") {
        return Err(XmlError::illegal_data(
            "processing instruction data cannot contain \"?>\"",
            data,
        ));
    }
    if data.starts_with(is_xml_space) {
        return Err(XmlError::illegal_data(
            "processing instruction data cannot start with white space",
            data,
        ));
    }
    Ok(())
}

/// Checks a doctype public identifier.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalData`] error if a character is not a
/// `PubidChar`.
pub fn check_public_id(id: &str) -> Result<(), XmlError> {
    if let Some(bad) = id.chars().find(|&c| !is_pubid_char(c)) {
        return Err(XmlError::illegal_data(
            format!("public identifiers cannot contain {bad:?}"),
            id,
        ));
    }
    Ok(())
}

/// Checks a doctype system identifier.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalData`] error if the identifier contains both
/// kinds of quote, since it could not be delimited.
pub fn check_system_id(id: &str) -> Result<(), XmlError> {
    if id.contains('"') && id.contains('\'') {
        return Err(XmlError::illegal_data(
            "system identifiers cannot contain both single and double quotes",
            id,
        ));
    }
    Ok(())
}

// -------------------------------------------------------------------------
// Namespaces
// -------------------------------------------------------------------------

/// Checks that `prefix` may be bound to `uri`.
///
/// # Errors
///
/// Returns an [`ErrorKind::Namespace`] error when `xml` is bound to anything but
/// [`XML_NAMESPACE`], when another prefix is bound to it, when `xmlns` is used
/// as a prefix, or when a non-empty prefix is bound to the empty URI.
pub fn check_namespace_binding(prefix: &str, uri: &str) -> Result<(), XmlError> {
    if prefix == "xmlns" || uri == XMLNS_NAMESPACE {
        return Err(XmlError::new(
            ErrorKind::Namespace,
            "the xmlns prefix and namespace cannot be bound",
        )
        .with_data(prefix));
    }
    if prefix == "xml" {
        if uri != XML_NAMESPACE {
            return Err(XmlError::new(
                ErrorKind::Namespace,
                format!("the xml prefix must be bound to {XML_NAMESPACE}"),
            )
            .with_data(uri));
        }
        return Ok(());
    }
    if uri == XML_NAMESPACE {
        return Err(XmlError::new(
            ErrorKind::Namespace,
            format!("only the xml prefix may be bound to {XML_NAMESPACE}"),
        )
        .with_data(prefix));
    }
    if !prefix.is_empty() && uri.is_empty() {
        return Err(XmlError::new(
            ErrorKind::Namespace,
            format!("prefix {prefix:?} must have a namespace URI"),
        )
        .with_data(prefix));
    }
    Ok(())
}

// -------------------------------------------------------------------------
// UTF-16
// -------------------------------------------------------------------------

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Checks that every surrogate half in `units` is correctly paired.
///
/// # Errors
///
/// Returns an [`ErrorKind::IllegalData`] error naming the first pairing failure:
/// a high half followed by another high half, a high half at the end, or a
/// low half without a preceding high half.
pub fn check_utf16(units: &[u16]) -> Result<(), XmlError> {
    let mut i = 0;
    while i < units.len() {
        let unit = units[i];
        if is_high_surrogate(unit) {
            match units.get(i + 1) {
                Some(&next) if is_low_surrogate(next) => i += 2,
                Some(&next) if is_high_surrogate(next) => {
                    return Err(surrogate_error(
                        format!("two high surrogates in a row at index {i}"),
                        units,
                    ));
                }
                _ => {
                    return Err(surrogate_error(
                        format!("unpaired high surrogate at index {i}"),
                        units,
                    ));
                }
            }
        } else if is_low_surrogate(unit) {
            return Err(surrogate_error(
                format!("low surrogate without preceding high surrogate at index {i}"),
                units,
            ));
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn surrogate_error(message: String, units: &[u16]) -> XmlError {
    XmlError::illegal_data(message, &String::from_utf16_lossy(units))
}

/// Decodes UTF-16 input after checking its surrogate pairing.
///
/// # Errors
///
/// Returns the [`check_utf16`] error for unpaired surrogates.
///
/// # Examples
///
/// ```
/// use xmlom::verifier::decode_utf16;
///
/// assert_eq!(decode_utf16(&[0x61, 0xD834, 0xDD1E]).unwrap(), "a\u{1D11E}");
/// assert!(decode_utf16(&[0xDD1E, 0xD834]).is_err());
/// ```
pub fn decode_utf16(units: &[u16]) -> Result<String, XmlError> {
    check_utf16(units)?;
    Ok(String::from_utf16_lossy(units))
}
