//! Error types and diagnostics.
//!
//! Every failure in this crate is an [`XmlError`]: a value carrying an
//! [`ErrorKind`], a human-readable message, the offending data when there is
//! one, an optional source [`Position`], and an optional cause.
//!
//! The cause can be attached after construction with
//! [`XmlError::init_cause`], but only once. The slot moves from unset to set
//! on the first call (even when that call passes `None`) and never changes
//! again.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A shareable error value usable as a cause.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// The category of an [`XmlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Character data (comment, PI data, text, attribute value) is not allowed.
    IllegalData,
    /// A processing-instruction target is not a legal, unreserved `NCName`.
    IllegalTarget,
    /// An element, attribute or doctype name does not match the name grammar.
    IllegalName,
    /// A namespace prefix or URI is illegal or conflicts with another binding.
    Namespace,
    /// The node already has a parent.
    MultipleParents,
    /// The node cannot be added at this position (wrong kind of child or parent).
    IllegalAdd,
    /// The operation would make a node its own ancestor.
    Cycle,
    /// The node is not a child of the given parent.
    NoSuchChild,
    /// The operation would leave a document without a root element, or
    /// otherwise produce a structure that cannot be serialized as XML.
    Wellformedness,
    /// An index is outside `[0, count)`.
    IndexOutOfBounds,
    /// The input markup is malformed.
    Parsing,
    /// Canonicalization of a document failed.
    Canonicalization,
    /// A character cannot be represented in the output encoding.
    UnavailableCharacter,
    /// An encoding is unknown or input bytes are malformed for it.
    Encoding,
    /// Reading from or writing to an I/O stream failed.
    Io,
}

impl ErrorKind {
    /// Returns `true` for the kinds raised when a structure or value would
    /// violate the rules of the tree model.
    #[must_use]
    pub fn is_validity(self) -> bool {
        matches!(
            self,
            Self::IllegalData
                | Self::IllegalTarget
                | Self::IllegalName
                | Self::Namespace
                | Self::MultipleParents
                | Self::IllegalAdd
                | Self::Cycle
                | Self::NoSuchChild
                | Self::Wellformedness
        )
    }

    fn description(self) -> &'static str {
        match self {
            Self::IllegalData => "illegal character data",
            Self::IllegalTarget => "illegal processing instruction target",
            Self::IllegalName => "illegal name",
            Self::Namespace => "namespace conflict",
            Self::MultipleParents => "node already has a parent",
            Self::IllegalAdd => "illegal add",
            Self::Cycle => "cycle in tree",
            Self::NoSuchChild => "no such child",
            Self::Wellformedness => "document would not be well-formed",
            Self::IndexOutOfBounds => "index out of bounds",
            Self::Parsing => "parsing error",
            Self::Canonicalization => "canonicalization error",
            Self::UnavailableCharacter => "character unavailable in output encoding",
            Self::Encoding => "encoding error",
            Self::Io => "I/O error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Where in a source document an error was detected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Position {
    /// 1-based line number, if known.
    pub line: Option<u32>,
    /// 1-based column number (in characters), if known.
    pub column: Option<u32>,
    /// The URI of the document, if known.
    pub uri: Option<String>,
}

impl Position {
    /// Computes the line and column of a byte offset into `source`.
    ///
    /// Offsets past the end are clamped; an offset inside a multi-byte
    /// character is rounded down to the character boundary.
    #[must_use]
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let mut end = offset.min(source.len());
        while !source.is_char_boundary(end) {
            end -= 1;
        }
        let before = &source[..end];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        Self {
            line: u32::try_from(line).ok(),
            column: u32::try_from(column).ok(),
            uri: None,
        }
    }

    /// Sets the URI of this position.
    #[must_use]
    pub fn with_uri(mut self, uri: Option<&str>) -> Self {
        self.uri = uri.map(str::to_string);
        self
    }
}

/// Error returned by [`XmlError::init_cause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CauseError {
    /// The cause has already been initialized (with a value or with `None`).
    #[error("cause has already been initialized")]
    AlreadySet,
    /// An error cannot be its own cause.
    #[error("an error cannot be its own cause")]
    SelfCausation,
}

/// The error type of every fallible operation in this crate.
#[derive(Debug, Clone)]
pub struct XmlError {
    kind: ErrorKind,
    message: String,
    data: Option<String>,
    position: Option<Position>,
    cause: OnceLock<Option<Cause>>,
}

impl XmlError {
    /// Creates an error of the given kind.
    ///
    /// An empty message is replaced by the kind's description so that every
    /// error renders something meaningful.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = kind.description().to_string();
        }
        Self {
            kind,
            message,
            data: None,
            position: None,
            cause: OnceLock::new(),
        }
    }

    pub(crate) fn illegal_data(message: impl Into<String>, data: &str) -> Self {
        Self::new(ErrorKind::IllegalData, message).with_data(data)
    }

    pub(crate) fn illegal_name(message: impl Into<String>, name: &str) -> Self {
        Self::new(ErrorKind::IllegalName, message).with_data(name)
    }

    pub(crate) fn illegal_target(message: impl Into<String>, target: &str) -> Self {
        Self::new(ErrorKind::IllegalTarget, message).with_data(target)
    }

    pub(crate) fn illegal_add(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalAdd, message)
    }

    pub(crate) fn index_out_of_bounds(index: usize, count: usize) -> Self {
        Self::new(
            ErrorKind::IndexOutOfBounds,
            format!("index {index} is out of bounds for {count} item(s)"),
        )
    }

    /// Creates a parsing error at the given position.
    pub fn parsing(message: impl Into<String>, position: Position) -> Self {
        Self::new(ErrorKind::Parsing, message).with_position(position)
    }

    /// Creates the error a canonicalization engine reports when it cannot
    /// produce canonical output for a document.
    pub fn canonicalization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canonicalization, message)
    }

    pub(crate) fn io(err: std::io::Error) -> Self {
        let error = Self::new(ErrorKind::Io, err.to_string());
        let _ = error.init_cause(Some(Arc::new(err)));
        error
    }

    /// Attaches the offending data (a name, target, or character data).
    #[must_use]
    pub fn with_data(mut self, data: &str) -> Self {
        self.data = Some(data.to_string());
        self
    }

    /// Attaches a source position.
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message. Never empty.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the data that was rejected, if any.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Returns the source position, if known.
    #[must_use]
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Returns the 1-based line number, if known.
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        self.position.as_ref().and_then(|p| p.line)
    }

    /// Returns the 1-based column number, if known.
    #[must_use]
    pub fn column(&self) -> Option<u32> {
        self.position.as_ref().and_then(|p| p.column)
    }

    /// Returns the URI of the source document, if known.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.position.as_ref().and_then(|p| p.uri.as_deref())
    }

    /// Returns the cause, if one was set.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.get().and_then(Option::as_ref)
    }

    /// Returns `true` once [`init_cause`](Self::init_cause) has succeeded.
    #[must_use]
    pub fn is_cause_initialized(&self) -> bool {
        self.cause.get().is_some()
    }

    /// Sets the cause of this error.
    ///
    /// # Errors
    ///
    /// Returns [`CauseError::SelfCausation`] if `cause` is this very error,
    /// whatever the state of the slot. Otherwise returns
    /// [`CauseError::AlreadySet`] if a previous call succeeded, including one
    /// that passed `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use xmlom::error::{CauseError, ErrorKind, XmlError};
    ///
    /// let err = XmlError::new(ErrorKind::Parsing, "bad input");
    /// let io = std::io::Error::new(std::io::ErrorKind::Other, "pipe closed");
    /// assert!(err.init_cause(Some(Arc::new(io))).is_ok());
    /// assert_eq!(err.init_cause(None), Err(CauseError::AlreadySet));
    /// ```
    pub fn init_cause(&self, cause: Option<Cause>) -> Result<(), CauseError> {
        if let Some(c) = &cause {
            if std::ptr::addr_eq(Arc::as_ptr(c), self as *const Self) {
                return Err(CauseError::SelfCausation);
            }
        }
        self.cause.set(cause).map_err(|_| CauseError::AlreadySet)
    }

    /// Wraps this error as the cause of a parsing error at `position`.
    ///
    /// Parsing errors pass through unchanged apart from gaining a position
    /// when they lack one.
    pub(crate) fn into_parsing(self, position: Position) -> Self {
        if self.kind == ErrorKind::Parsing {
            if self.position.is_none() {
                return self.with_position(position);
            }
            return self;
        }
        let wrapped = Self::parsing(self.message.clone(), position);
        let _ = wrapped.init_cause(Some(Arc::new(self)));
        wrapped
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(position) = &self.position {
            if let (Some(line), Some(column)) = (position.line, position.column) {
                write!(f, " at line {line}, column {column}")?;
            }
            if let Some(uri) = &position.uri {
                write!(f, " in {uri}")?;
            }
        }
        Ok(())
    }
}

impl StdError for XmlError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

/// Two errors are equal when kind, message, data and position match; causes
/// are not compared.
impl PartialEq for XmlError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.data == other.data
            && self.position == other.position
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_without_position() {
        let err = XmlError::new(ErrorKind::IllegalData, "comment contains --");
        assert_eq!(err.to_string(), "comment contains --");
    }

    #[test]
    fn test_display_with_position_and_uri() {
        let position = Position {
            line: Some(3),
            column: Some(14),
            uri: Some("file:///doc.xml".to_string()),
        };
        let err = XmlError::parsing("unexpected end of input", position);
        assert_eq!(
            err.to_string(),
            "unexpected end of input at line 3, column 14 in file:///doc.xml"
        );
    }

    #[test]
    fn test_display_needs_both_line_and_column() {
        let position = Position {
            line: Some(3),
            column: None,
            uri: None,
        };
        let err = XmlError::parsing("oops", position);
        assert_eq!(err.to_string(), "oops");
    }

    #[test]
    fn test_empty_message_replaced() {
        let err = XmlError::new(ErrorKind::Cycle, "");
        assert_eq!(err.message(), "cycle in tree");
    }

    #[test]
    fn test_position_from_offset() {
        let source = "<a>\n  <b>\u{e9}x</b>";
        let pos = Position::from_offset(source, source.find('x').unwrap());
        assert_eq!(pos.line, Some(2));
        assert_eq!(pos.column, Some(7));
    }

    #[test]
    fn test_position_from_offset_past_end() {
        let pos = Position::from_offset("ab", 99);
        assert_eq!(pos.line, Some(1));
        assert_eq!(pos.column, Some(3));
    }

    #[test]
    fn test_init_cause_once() {
        let err = XmlError::new(ErrorKind::Parsing, "outer");
        let inner: Cause = Arc::new(XmlError::new(ErrorKind::IllegalData, "inner"));
        assert!(!err.is_cause_initialized());
        err.init_cause(Some(inner)).unwrap();
        assert!(err.is_cause_initialized());
        assert_eq!(err.cause().unwrap().to_string(), "inner");

        let again: Cause = Arc::new(XmlError::new(ErrorKind::IllegalData, "again"));
        assert_eq!(err.init_cause(Some(again)), Err(CauseError::AlreadySet));
        assert_eq!(err.init_cause(None), Err(CauseError::AlreadySet));
        assert_eq!(err.cause().unwrap().to_string(), "inner");
    }

    #[test]
    fn test_init_cause_none_is_final() {
        let err = XmlError::new(ErrorKind::Parsing, "outer");
        err.init_cause(None).unwrap();
        assert!(err.is_cause_initialized());
        assert!(err.cause().is_none());
        let inner: Cause = Arc::new(XmlError::new(ErrorKind::IllegalData, "inner"));
        assert_eq!(err.init_cause(Some(inner)), Err(CauseError::AlreadySet));
    }

    #[test]
    fn test_init_cause_self_rejected_in_both_states() {
        let shared = Arc::new(XmlError::new(ErrorKind::Parsing, "me"));
        let as_cause: Cause = shared.clone();
        assert_eq!(
            shared.init_cause(Some(as_cause.clone())),
            Err(CauseError::SelfCausation)
        );
        assert!(!shared.is_cause_initialized());

        shared.init_cause(None).unwrap();
        assert_eq!(
            shared.init_cause(Some(as_cause)),
            Err(CauseError::SelfCausation)
        );
    }

    #[test]
    fn test_source_exposes_cause() {
        let err = XmlError::new(ErrorKind::Parsing, "outer");
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        err.init_cause(Some(Arc::new(io))).unwrap();
        assert_eq!(err.source().unwrap().to_string(), "closed");
    }

    #[test]
    fn test_into_parsing_wraps_cause() {
        let inner = XmlError::illegal_data("bad", "x--y");
        let pos = Position::from_offset("abc", 1).with_uri(Some("urn:test"));
        let outer = inner.into_parsing(pos);
        assert_eq!(outer.kind(), ErrorKind::Parsing);
        assert_eq!(outer.uri(), Some("urn:test"));
        assert_eq!(outer.cause().unwrap().to_string(), "bad");
        assert!(outer.is_cause_initialized());
    }

    #[test]
    fn test_validity_family() {
        assert!(ErrorKind::IllegalTarget.is_validity());
        assert!(ErrorKind::MultipleParents.is_validity());
        assert!(!ErrorKind::Parsing.is_validity());
        assert!(!ErrorKind::IndexOutOfBounds.is_validity());
    }

    #[test]
    fn test_canonicalization_error() {
        let err = XmlError::canonicalization("relative namespace URI");
        assert_eq!(err.kind(), ErrorKind::Canonicalization);
        assert_eq!(err.to_string(), "relative namespace URI");
    }

    #[test]
    fn test_is_error_trait() {
        let err = XmlError::new(ErrorKind::Io, "test");
        let _: &dyn std::error::Error = &err;
    }
}
