//! Character encodings for input and output.
//!
//! Input: BOM sniffing and XML declaration encoding detection per XML 1.0
//! Section 4.3.3 and Appendix F, bridging to `encoding_rs` for conversion to
//! UTF-8.
//!
//! Output: [`Charset`] answers whether a character is representable in the
//! target encoding, so the serializer can fall back to character references,
//! and encodes the finished text.
//!
//! # Encoding Detection Strategy
//!
//! 1. Check for a Byte Order Mark (BOM) at the start of the input, or for the
//!    byte pattern of `<?` in UTF-16 without one.
//! 2. If found, use the indicated encoding and skip the BOM bytes.
//! 3. Otherwise default to UTF-8.
//! 4. After the initial decode, inspect the XML declaration's `encoding=`
//!    attribute to confirm or override the detected encoding.

use crate::error::{ErrorKind, XmlError};

fn encoding_error(message: impl Into<String>) -> XmlError {
    XmlError::new(ErrorKind::Encoding, message)
}

// -------------------------------------------------------------------------
// Input
// -------------------------------------------------------------------------

/// Detects the encoding of an XML byte stream from its first bytes.
///
/// Returns a tuple of (encoding name, number of BOM bytes to skip).
///
/// - `EF BB BF`    -> UTF-8, skip 3
/// - `FE FF`       -> UTF-16BE, skip 2
/// - `FF FE`       -> UTF-16LE, skip 2
/// - `00 3C 00 3F` -> UTF-16BE without BOM
/// - `3C 00 3F 00` -> UTF-16LE without BOM
/// - otherwise     -> UTF-8
///
/// # Examples
///
/// ```
/// use xmlom::encoding::detect_encoding;
///
/// assert_eq!(detect_encoding(b"\xEF\xBB\xBFhello"), ("UTF-8", 3));
/// assert_eq!(detect_encoding(b"<root/>"), ("UTF-8", 0));
/// ```
#[must_use]
pub fn detect_encoding(bytes: &[u8]) -> (&'static str, usize) {
    match bytes {
        [0xEF, 0xBB, 0xBF, ..] => ("UTF-8", 3),
        [0xFE, 0xFF, ..] => ("UTF-16BE", 2),
        [0xFF, 0xFE, ..] => ("UTF-16LE", 2),
        [0x00, 0x3C, 0x00, 0x3F, ..] => ("UTF-16BE", 0),
        [0x3C, 0x00, 0x3F, 0x00, ..] => ("UTF-16LE", 0),
        _ => ("UTF-8", 0),
    }
}

/// Transcodes a byte slice from the named encoding into a UTF-8 `String`.
///
/// # Errors
///
/// Returns an [`ErrorKind::Encoding`] error if the encoding name is not
/// recognized or if the input contains malformed byte sequences.
///
/// # Examples
///
/// ```
/// use xmlom::encoding::transcode;
///
/// assert_eq!(transcode(b"caf\xE9", "ISO-8859-1").unwrap(), "caf\u{e9}");
/// ```
pub fn transcode(bytes: &[u8], encoding_name: &str) -> Result<String, XmlError> {
    let encoding = encoding_rs::Encoding::for_label(encoding_name.as_bytes())
        .ok_or_else(|| encoding_error(format!("unsupported encoding: {encoding_name}")))?;

    let (result, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(encoding_error(format!(
            "malformed byte sequence for encoding {encoding_name}"
        )));
    }
    Ok(result.into_owned())
}

/// Extracts the `encoding` pseudo-attribute from an XML declaration at the
/// start of `text`.
fn extract_xml_decl_encoding(text: &str) -> Option<String> {
    if !text.starts_with("<?xml") {
        return None;
    }
    let decl = &text[..text.find("?>")?];
    let after = decl[decl.find("encoding")? + "encoding".len()..].trim_start();
    let after = after.strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|&q| q == '"' || q == '\'')?;
    let value = &after[1..];
    Some(value[..value.find(quote)?].to_string())
}

/// Same as [`extract_xml_decl_encoding`], on raw bytes read as ASCII. Used
/// when the input is not valid UTF-8 and has no BOM.
fn extract_encoding_from_ascii_bytes(bytes: &[u8]) -> Option<String> {
    let scan = &bytes[..bytes.len().min(200)];
    if !scan.starts_with(b"<?xml") {
        return None;
    }
    let end = scan.windows(2).position(|w| w == b"?>")?;
    let ascii: String = scan[..end]
        .iter()
        .take_while(|b| b.is_ascii())
        .map(|&b| char::from(b))
        .collect();
    extract_xml_decl_encoding(&format!("{ascii}?>"))
}

/// Decodes raw XML bytes into a UTF-8 string, detecting the encoding.
///
/// # Errors
///
/// Returns an [`ErrorKind::Encoding`] error if the bytes are malformed for
/// the detected encoding or the declared encoding is unsupported.
///
/// # Examples
///
/// ```
/// use xmlom::encoding::decode_to_utf8;
///
/// let text = decode_to_utf8(b"<?xml version=\"1.0\"?><root/>").unwrap();
/// assert!(text.ends_with("<root/>"));
/// ```
pub fn decode_to_utf8(bytes: &[u8]) -> Result<String, XmlError> {
    let (detected, skip) = detect_encoding(bytes);
    let content = &bytes[skip..];

    if detected == "UTF-8" {
        if let Ok(s) = std::str::from_utf8(content) {
            if let Some(declared) = extract_xml_decl_encoding(s) {
                if !is_utf8_label(&declared.to_ascii_uppercase()) {
                    log::debug!("re-decoding input as declared encoding {declared}");
                    return transcode(content, &declared);
                }
            }
            return Ok(s.to_string());
        }
        if let Some(declared) = extract_encoding_from_ascii_bytes(content) {
            log::debug!("input is not UTF-8; decoding as declared encoding {declared}");
            return transcode(content, &declared);
        }
        return Err(encoding_error("input is not valid UTF-8"));
    }

    let initial = transcode(content, detected)?;
    if let Some(declared) = extract_xml_decl_encoding(&initial) {
        let declared_upper = declared.to_ascii_uppercase();
        // "UTF-16" agrees with either byte order; the BOM decides.
        let agrees = declared_upper == detected
            || (declared_upper == "UTF-16" && detected.starts_with("UTF-16"));
        if !agrees {
            return transcode(content, &declared);
        }
    }
    Ok(initial)
}

fn is_utf8_label(label: &str) -> bool {
    matches!(label, "UTF-8" | "UTF8")
}

// -------------------------------------------------------------------------
// Output
// -------------------------------------------------------------------------

/// An output character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8, without BOM.
    Utf8,
    /// UTF-16 in the given byte order, optionally preceded by a BOM.
    Utf16 {
        /// Big-endian when `true`.
        big_endian: bool,
        /// Whether to write a byte order mark.
        bom: bool,
    },
    /// US-ASCII: code points below 0x80.
    Ascii,
    /// ISO-8859-1, restricted to code points that read back unchanged.
    Latin1,
    /// Any other encoding `encoding_rs` can encode into.
    Legacy(&'static encoding_rs::Encoding),
}

impl Charset {
    /// Looks up an output charset by name, case-insensitively.
    ///
    /// `UTF-16` means big-endian with a byte order mark; `UTF-16BE` and
    /// `UTF-16LE` are written without one.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Encoding`] error for an unknown name or an
    /// encoding that cannot be written.
    pub fn for_name(name: &str) -> Result<Self, XmlError> {
        let upper = name.trim().to_ascii_uppercase();
        let charset = match upper.as_str() {
            "UTF-8" | "UTF8" => Self::Utf8,
            "UTF-16" => Self::Utf16 {
                big_endian: true,
                bom: true,
            },
            "UTF-16BE" => Self::Utf16 {
                big_endian: true,
                bom: false,
            },
            "UTF-16LE" => Self::Utf16 {
                big_endian: false,
                bom: false,
            },
            "US-ASCII" | "ASCII" | "ANSI_X3.4-1968" => Self::Ascii,
            "ISO-8859-1" | "ISO_8859-1" | "LATIN1" | "L1" => Self::Latin1,
            _ => {
                let encoding = encoding_rs::Encoding::for_label(upper.as_bytes())
                    .ok_or_else(|| encoding_error(format!("unsupported encoding: {name}")))?;
                if encoding == encoding_rs::UTF_8 {
                    Self::Utf8
                } else if encoding.output_encoding() != encoding {
                    return Err(encoding_error(format!("{name} cannot be used for output")));
                } else {
                    Self::Legacy(encoding)
                }
            }
        };
        Ok(charset)
    }

    /// Returns `true` if `c` can be written literally in this charset.
    #[must_use]
    pub fn can_encode(self, c: char) -> bool {
        match self {
            Self::Utf8 | Self::Utf16 { .. } => true,
            Self::Ascii => c.is_ascii(),
            // Readers decode this label as windows-1252, where 0x80-0x9F differ.
            Self::Latin1 => (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)),
            Self::Legacy(encoding) => {
                let mut buf = [0u8; 4];
                let (_, _, had_errors) = encoding.encode(c.encode_utf8(&mut buf));
                !had_errors
            }
        }
    }

    /// Encodes `text`. Characters the charset cannot represent must already
    /// have been replaced by the caller.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::UnavailableCharacter`] error if `text` still
    /// contains an unrepresentable character.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, XmlError> {
        if let Some(c) = text.chars().find(|&c| !self.can_encode(c)) {
            return Err(XmlError::new(
                ErrorKind::UnavailableCharacter,
                format!("U+{:04X} is not available in the output encoding", c as u32),
            ));
        }
        let bytes = match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16 { big_endian, bom } => {
                let mut out = Vec::with_capacity(text.len() * 2 + 2);
                let units = bom.then_some(0xFEFF).into_iter().chain(text.encode_utf16());
                for unit in units {
                    if big_endian {
                        out.extend_from_slice(&unit.to_be_bytes());
                    } else {
                        out.extend_from_slice(&unit.to_le_bytes());
                    }
                }
                out
            }
            Self::Ascii | Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Self::Legacy(encoding) => encoding.encode(text).0.into_owned(),
        };
        Ok(bytes)
    }
}
