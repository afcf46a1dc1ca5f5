//! Building documents from XML input.
//!
//! The [`Builder`] reads markup events from the `quick-xml` tokenizer and
//! turns them into a [`Document`] through a [`NodeFactory`]. On the way it
//! normalizes line endings and attribute whitespace, resolves namespace
//! prefixes, expands entity references, and merges adjacent character data
//! and CDATA sections into single text nodes.
//!
//! # Text merging
//!
//! Character data is buffered until the next piece of markup (a tag,
//! comment, processing instruction, doctype, or the end of input). Plain
//! text and CDATA sections in the same run end up in one text node. The node
//! prefers CDATA output when the run started with a CDATA section; plain text
//! added later does not clear the preference.
//!
//! # Examples
//!
//! ```
//! use xmlom::builder::Builder;
//!
//! let doc = Builder::new()
//!     .build_str("<a><![CDATA[x]]><![CDATA[y]]></a>")
//!     .unwrap();
//! let a = doc.root_element();
//! assert_eq!(doc.child_count(a), 1);
//! assert_eq!(doc.value(a), "xy");
//! ```

mod factory;
mod pipe;

pub use factory::{DefaultFactory, NodeFactory};
pub use pipe::{pipe, PipeReader, PipeWriter};

use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::io::Read;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::encoding;
use crate::error::{ErrorKind, Position, XmlError};
use crate::tree::{AttributeType, Document, NodeId, NodeKind, Nodes};
use crate::util::qname::split_qname;
use crate::verifier::{self, is_xml_space, XML_NAMESPACE};

/// Default maximum element nesting depth.
const DEFAULT_MAX_DEPTH: usize = 256;

/// Options for building a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderOptions {
    /// The URI the input was loaded from. Stored as the document's base URI
    /// and reported in error positions.
    pub base_uri: Option<String>,
    /// Maximum element nesting depth (default: 256).
    pub max_depth: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            base_uri: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BuilderOptions {
    /// Sets the base URI.
    #[must_use]
    pub fn base_uri(mut self, uri: &str) -> Self {
        self.base_uri = Some(uri.to_string());
        self
    }

    /// Sets the maximum element nesting depth.
    #[must_use]
    pub fn max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }
}

/// Builds documents from strings, bytes, or readers.
///
/// Without a factory the builder uses [`DefaultFactory`]. Any error aborts
/// the build; it is reported as an [`ErrorKind::Parsing`](crate::error::ErrorKind::Parsing)
/// error with a position, and errors raised by the factory or by tree
/// operations become its cause.
pub struct Builder<'f> {
    factory: Option<&'f mut dyn NodeFactory>,
    options: BuilderOptions,
}

impl Builder<'static> {
    /// Creates a builder using the default factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factory: None,
            options: BuilderOptions::default(),
        }
    }
}

impl Default for Builder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'f> Builder<'f> {
    /// Creates a builder that creates nodes through `factory`.
    pub fn with_factory(factory: &'f mut dyn NodeFactory) -> Self {
        Self {
            factory: Some(factory),
            options: BuilderOptions::default(),
        }
    }

    /// Replaces the build options.
    #[must_use]
    pub fn options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds a document from a string.
    ///
    /// # Errors
    ///
    /// Returns a parsing error if the input is not well-formed, namespace
    /// well-formed, or if the factory fails.
    pub fn build_str(&mut self, input: &str) -> Result<Document, XmlError> {
        let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
        log::debug!("building document from {} bytes of text", input.len());
        let mut default = DefaultFactory;
        let factory: &mut dyn NodeFactory = match self.factory.as_deref_mut() {
            Some(factory) => factory,
            None => &mut default,
        };
        let doc = TreeBuilder::new(factory, input, &self.options)?.run()?;
        log::debug!("built document with {} nodes", doc.node_count());
        Ok(doc)
    }

    /// Builds a document from bytes, detecting the encoding from a byte order
    /// mark or the XML declaration.
    ///
    /// # Errors
    ///
    /// Returns a parsing error, caused by the encoding error, if the bytes
    /// cannot be decoded, and otherwise the [`build_str`](Self::build_str)
    /// errors.
    pub fn build_bytes(&mut self, input: &[u8]) -> Result<Document, XmlError> {
        let text = encoding::decode_to_utf8(input)
            .map_err(|err| err.into_parsing(self.input_position()))?;
        self.build_str(&text)
    }

    /// Builds a document from a reader, such as a [`PipeReader`] fed by
    /// another thread. The reader is consumed to its end before parsing.
    ///
    /// # Errors
    ///
    /// Returns a parsing error whose cause is the I/O error if reading fails,
    /// and otherwise the [`build_bytes`](Self::build_bytes) errors.
    pub fn build_reader(&mut self, mut reader: impl Read) -> Result<Document, XmlError> {
        let mut bytes = Vec::new();
        if let Err(err) = reader.read_to_end(&mut bytes) {
            log::debug!("input stream failed after {} bytes: {err}", bytes.len());
            let error = XmlError::parsing(
                format!("failed to read input: {err}"),
                self.input_position(),
            );
            let _ = error.init_cause(Some(Arc::new(err)));
            return Err(error);
        }
        self.build_bytes(&bytes)
    }

    fn input_position(&self) -> Position {
        Position::default().with_uri(self.options.base_uri.as_deref())
    }
}

impl Document {
    /// Parses a document from a string with the default factory.
    ///
    /// # Errors
    ///
    /// See [`Builder::build_str`].
    ///
    /// # Examples
    ///
    /// ```
    /// use xmlom::Document;
    ///
    /// let doc = Document::parse_str("<root a='1'/>").unwrap();
    /// assert_eq!(doc.attribute_value(doc.root_element(), "a"), Some("1"));
    /// ```
    pub fn parse_str(input: &str) -> Result<Self, XmlError> {
        Builder::new().build_str(input)
    }

    /// Parses a document from bytes with the default factory.
    ///
    /// # Errors
    ///
    /// See [`Builder::build_bytes`].
    pub fn parse_bytes(input: &[u8]) -> Result<Self, XmlError> {
        Builder::new().build_bytes(input)
    }
}

// ---------------------------------------------------------------------------
// Tree construction
// ---------------------------------------------------------------------------

/// Character data waiting for the next piece of markup.
struct PendingText {
    content: String,
    cdata: bool,
}

/// An open element. `element` is `None` when the factory dropped the tags.
struct Frame {
    element: Option<NodeId>,
}

struct TreeBuilder<'a, 's> {
    factory: &'a mut dyn NodeFactory,
    source: &'s str,
    base_uri: Option<&'a str>,
    max_depth: usize,
    doc: Document,
    stack: Vec<Frame>,
    /// Namespace declarations of each open start tag, innermost last.
    scopes: Vec<Vec<(String, String)>>,
    pending: Option<PendingText>,
    /// Internal general entities declared in the doctype.
    entities: HashMap<String, String>,
    root_done: bool,
    offset: usize,
}

impl<'a, 's> TreeBuilder<'a, 's> {
    fn new(
        factory: &'a mut dyn NodeFactory,
        source: &'s str,
        options: &'a BuilderOptions,
    ) -> Result<Self, XmlError> {
        let base_uri = options.base_uri.as_deref();
        let mut doc = factory
            .start_making_document()
            .map_err(|err| err.into_parsing(Position::default().with_uri(base_uri)))?;
        if base_uri.is_some() {
            doc.set_base_uri(base_uri);
        }
        Ok(Self {
            factory,
            source,
            base_uri,
            max_depth: options.max_depth,
            doc,
            stack: Vec::new(),
            scopes: Vec::new(),
            pending: None,
            entities: HashMap::new(),
            root_done: false,
            offset: 0,
        })
    }

    fn run(mut self) -> Result<Document, XmlError> {
        let mut reader = Reader::from_str(self.source);
        reader.config_mut().check_comments = true;
        loop {
            self.offset = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    self.offset = usize::try_from(reader.error_position()).unwrap_or(usize::MAX);
                    return Err(self.caused_by(err));
                }
            };
            let at_end = matches!(event, Event::Eof);
            self.handle(event)
                .map_err(|err| err.into_parsing(self.position()))?;
            if at_end {
                break;
            }
        }
        Ok(self.doc)
    }

    fn handle(&mut self, event: Event<'_>) -> Result<(), XmlError> {
        match event {
            Event::Text(e) => {
                let text = self.unescape(&normalize_eol(as_str(&e)?))?.into_owned();
                self.push_text(&text, false);
            }
            Event::CData(e) => {
                let text = normalize_eol(as_str(&e)?).into_owned();
                self.push_text(&text, true);
            }
            Event::Start(e) => {
                self.flush_text()?;
                self.start_element(&e)?;
            }
            Event::Empty(e) => {
                self.flush_text()?;
                self.start_element(&e)?;
                self.end_element()?;
            }
            Event::End(_) => {
                self.flush_text()?;
                self.end_element()?;
            }
            Event::Comment(e) => {
                self.flush_text()?;
                let data = normalize_eol(as_str(&e)?);
                let nodes = self.factory.make_comment(&mut self.doc, &data)?;
                self.attach_all(nodes)?;
            }
            Event::PI(e) => {
                self.flush_text()?;
                let raw = normalize_eol(as_str(&e)?);
                let (target, data) = split_pi(&raw);
                let nodes = self
                    .factory
                    .make_processing_instruction(&mut self.doc, target, data)?;
                self.attach_all(nodes)?;
            }
            Event::DocType(e) => {
                self.flush_text()?;
                self.doc_type(&normalize_eol(as_str(&e)?))?;
            }
            Event::Decl(_) => self.flush_text()?,
            Event::Eof => {
                self.flush_text()?;
                self.finish()?;
            }
        }
        Ok(())
    }

    // --- Errors ---

    fn position(&self) -> Position {
        Position::from_offset(self.source, self.offset).with_uri(self.base_uri)
    }

    fn error(&self, message: impl Into<String>) -> XmlError {
        XmlError::parsing(message, self.position())
    }

    /// A parsing error at the current position caused by `err`.
    fn caused_by(&self, err: impl StdError + Send + Sync + 'static) -> XmlError {
        let error = self.error(err.to_string());
        let _ = error.init_cause(Some(Arc::new(err)));
        error
    }

    // --- Character data ---

    fn push_text(&mut self, text: &str, cdata: bool) {
        match &mut self.pending {
            None => {
                self.pending = Some(PendingText {
                    content: text.to_string(),
                    cdata,
                });
            }
            Some(pending) => {
                if cdata && pending.content.is_empty() {
                    pending.cdata = true;
                }
                pending.content.push_str(text);
            }
        }
    }

    fn flush_text(&mut self) -> Result<(), XmlError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if pending.content.is_empty() {
            return Ok(());
        }
        if self.stack.is_empty() {
            if !pending.cdata && pending.content.chars().all(is_xml_space) {
                return Ok(());
            }
            return Err(self.error("character data is not allowed outside the root element"));
        }
        log::trace!(
            "flushing {} bytes of {} text",
            pending.content.len(),
            if pending.cdata { "CDATA" } else { "plain" }
        );
        let nodes = if pending.cdata {
            self.factory
                .make_cdata_section(&mut self.doc, &pending.content)?
        } else {
            self.factory.make_text(&mut self.doc, &pending.content)?
        };
        self.attach_all(nodes)
    }

    fn unescape<'t>(&self, raw: &'t str) -> Result<Cow<'t, str>, XmlError> {
        quick_xml::escape::unescape_with(raw, |name| {
            predefined_entity(name).or_else(|| self.entities.get(name).map(String::as_str))
        })
        .map_err(|err| self.caused_by(err))
    }

    /// Normalizes an attribute value: line endings, then literal whitespace
    /// to spaces, then references.
    fn attribute_value(&self, raw: &str) -> Result<String, XmlError> {
        let normalized: String = normalize_eol(raw)
            .chars()
            .map(|c| if c == '\t' || c == '\n' { ' ' } else { c })
            .collect();
        Ok(self.unescape(&normalized)?.into_owned())
    }

    // --- Placement ---

    fn current_parent(&self) -> Option<NodeId> {
        self.stack.iter().rev().find_map(|frame| frame.element)
    }

    fn attach(&mut self, node: NodeId) -> Result<(), XmlError> {
        if let Some(parent) = self.current_parent() {
            return self.doc.append_child(parent, node);
        }
        let document = self.doc.root();
        if self.root_done {
            self.doc.append_child(document, node)
        } else {
            let index = self
                .doc
                .index_of(document, self.doc.root_element())
                .unwrap_or(0);
            self.doc.insert_child(document, node, index)
        }
    }

    fn attach_all(&mut self, nodes: Nodes) -> Result<(), XmlError> {
        for node in nodes {
            self.attach(node)?;
        }
        Ok(())
    }

    // --- Elements ---

    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn resolve(&self, prefix: Option<&str>, attribute: bool) -> Result<String, XmlError> {
        match prefix {
            Some("xml") => Ok(XML_NAMESPACE.to_string()),
            Some(p) => self
                .lookup(p)
                .map(str::to_string)
                .ok_or_else(|| self.error(format!("namespace prefix {p:?} is not bound"))),
            None if attribute => Ok(String::new()),
            None => Ok(self.lookup("").unwrap_or("").to_string()),
        }
    }

    fn start_element(&mut self, e: &BytesStart<'_>) -> Result<(), XmlError> {
        if self.stack.len() >= self.max_depth {
            return Err(self.error(format!(
                "maximum nesting depth of {} exceeded",
                self.max_depth
            )));
        }
        if self.stack.is_empty() && self.root_done {
            return Err(self.error("only one root element is allowed"));
        }
        let qname = as_str(e.name().as_ref())?.to_string();

        let mut declarations = Vec::new();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.caused_by(err))?;
            let key = as_str(attr.key.as_ref())?;
            let value = self.attribute_value(as_str(&attr.value)?)?;
            if key == "xmlns" {
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                verifier::check_ncname(prefix)?;
                declarations.push((prefix.to_string(), value));
            } else {
                attributes.push((key.to_string(), value));
            }
        }
        for (prefix, uri) in &declarations {
            verifier::check_namespace_binding(prefix, uri)?;
        }
        self.scopes.push(declarations.clone());

        let namespace = self.resolve(split_qname(&qname).0, false)?;
        let element = self
            .factory
            .start_making_element(&mut self.doc, &qname, &namespace)?;
        match element {
            Some(el) => {
                for (prefix, uri) in &declarations {
                    if prefix != "xml" {
                        self.doc.add_namespace_declaration(el, prefix, uri)?;
                    }
                }
            }
            None if self.stack.is_empty() => {
                return Err(self.error("the factory must create the root element"));
            }
            None => log::trace!("factory dropped the tags of <{qname}>"),
        }

        let mut seen: Vec<(String, String)> = Vec::with_capacity(attributes.len());
        for (name, value) in attributes {
            let (prefix, local) = split_qname(&name);
            let attr_namespace = self.resolve(prefix, true)?;
            if seen
                .iter()
                .any(|(l, n)| l == local && *n == attr_namespace)
            {
                return Err(self.error(format!(
                    "attribute {local:?} in namespace {attr_namespace:?} is specified twice"
                )));
            }
            seen.push((local.to_string(), attr_namespace.clone()));
            let nodes = self.factory.make_attribute(
                &mut self.doc,
                &name,
                &attr_namespace,
                &value,
                AttributeType::Undeclared,
            )?;
            for node in nodes {
                let is_attribute = matches!(self.doc.kind(node), NodeKind::Attribute { .. });
                match element {
                    Some(el) if is_attribute => {
                        self.doc.add_attribute(el, node)?;
                    }
                    Some(el) => self.doc.append_child(el, node)?,
                    None if is_attribute => {}
                    None => self.attach(node)?,
                }
            }
        }

        self.stack.push(Frame { element });
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), XmlError> {
        let Some(frame) = self.stack.pop() else {
            return Err(self.error("end tag without a matching start tag"));
        };
        self.scopes.pop();
        let Some(element) = frame.element else {
            return Ok(());
        };
        let nodes = self.factory.finish_making_element(&mut self.doc, element)?;
        if nodes.as_slice() != [element] {
            log::trace!("factory replaced an element with {} node(s)", nodes.len());
        }
        if self.stack.is_empty() {
            return self.install_root(&nodes);
        }
        self.attach_all(nodes)
    }

    /// Puts the finished root element, and whatever the factory placed
    /// around it, into the document.
    fn install_root(&mut self, nodes: &Nodes) -> Result<(), XmlError> {
        let elements: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(self.doc.kind(*n), NodeKind::Element { .. }))
            .map(|(i, _)| i)
            .collect();
        let &[split] = elements.as_slice() else {
            return Err(self.error(format!(
                "the root element must be replaced by exactly one element, not {}",
                elements.len()
            )));
        };
        let root = nodes.get(split)?;
        self.doc.set_root_element(root)?;
        let document = self.doc.root();
        for (i, node) in nodes.iter().enumerate() {
            if i < split {
                let index = self.doc.index_of(document, root).unwrap_or(0);
                self.doc.insert_child(document, node, index)?;
            } else if i > split {
                self.doc.append_child(document, node)?;
            }
        }
        self.root_done = true;
        Ok(())
    }

    // --- Prolog ---

    fn doc_type(&mut self, raw: &str) -> Result<(), XmlError> {
        if !self.stack.is_empty() || self.root_done {
            return Err(self.error("the document type declaration must precede the root element"));
        }
        let decl =
            parse_doc_type(raw).ok_or_else(|| self.error("malformed document type declaration"))?;
        if let Some(subset) = &decl.internal_subset {
            let entities = internal_entities(subset)
                .and_then(|declared| resolve_entities(&declared))
                .map_err(|message| self.error(message))?;
            self.entities = entities;
        }
        let nodes = self.factory.make_doc_type(
            &mut self.doc,
            &decl.root_name,
            decl.public_id.as_deref(),
            decl.system_id.as_deref(),
        )?;
        for node in nodes {
            if matches!(self.doc.kind(node), NodeKind::DocType { .. }) {
                self.doc
                    .set_internal_subset(node, decl.internal_subset.as_deref());
            }
            self.attach(node)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), XmlError> {
        if let Some(frame) = self.stack.last() {
            let name = frame
                .element
                .and_then(|el| self.doc.qualified_name(el))
                .unwrap_or_default();
            return Err(self.error(format!("unexpected end of input: <{name}> is not closed")));
        }
        if !self.root_done {
            return Err(self.error("the document has no root element"));
        }
        self.factory.finish_making_document(&mut self.doc)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn as_str(bytes: &[u8]) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes)
        .map_err(|err| XmlError::new(ErrorKind::Parsing, format!("invalid UTF-8: {err}")))
}

/// Replaces `\r\n` and lone `\r` with `\n`.
fn normalize_eol(s: &str) -> Cow<'_, str> {
    if s.contains('\r') {
        Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(s)
    }
}

fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Splits the inside of `<?...?>` into target and data.
fn split_pi(raw: &str) -> (&str, &str) {
    let end = raw.find(is_xml_space).unwrap_or(raw.len());
    let (target, rest) = raw.split_at(end);
    (target, rest.trim_start_matches(is_xml_space))
}

/// The parts of a `<!DOCTYPE ...>` declaration.
#[derive(Debug, PartialEq, Eq)]
struct DocTypeDecl {
    root_name: String,
    public_id: Option<String>,
    system_id: Option<String>,
    internal_subset: Option<String>,
}

/// Splits a leading quoted literal off `s`.
fn quoted(s: &str) -> Option<(&str, &str)> {
    let quote = s.chars().next().filter(|&q| q == '"' || q == '\'')?;
    let body = &s[1..];
    let end = body.find(quote)?;
    Some((&body[..end], &body[end + 1..]))
}

fn parse_doc_type(raw: &str) -> Option<DocTypeDecl> {
    let s = raw.trim_start_matches(is_xml_space);
    let name_end = s
        .find(|c: char| is_xml_space(c) || c == '[')
        .unwrap_or(s.len());
    let (root_name, mut rest) = s.split_at(name_end);
    if root_name.is_empty() {
        return None;
    }
    rest = rest.trim_start_matches(is_xml_space);

    let (mut public_id, mut system_id) = (None, None);
    if let Some(after) = rest.strip_prefix("PUBLIC") {
        let (public, after) = quoted(after.trim_start_matches(is_xml_space))?;
        let (system, after) = quoted(after.trim_start_matches(is_xml_space))?;
        public_id = Some(public.to_string());
        system_id = Some(system.to_string());
        rest = after;
    } else if let Some(after) = rest.strip_prefix("SYSTEM") {
        let (system, after) = quoted(after.trim_start_matches(is_xml_space))?;
        system_id = Some(system.to_string());
        rest = after;
    }
    rest = rest.trim_start_matches(is_xml_space);

    let mut internal_subset = None;
    if let Some(after) = rest.strip_prefix('[') {
        let end = after.rfind(']')?;
        internal_subset = Some(after[..end].to_string());
        rest = &after[end + 1..];
    }
    if !rest.trim_matches(is_xml_space).is_empty() {
        return None;
    }
    Some(DocTypeDecl {
        root_name: root_name.to_string(),
        public_id,
        system_id,
        internal_subset,
    })
}

/// Upper bound on the replacement text of one entity after expansion.
const MAX_ENTITY_EXPANSION: usize = 1 << 20;

/// Decodes the digits of a `&#...;` or `&#x...;` reference.
fn char_reference(digits: &str) -> Result<char, String> {
    let code = match digits.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse::<u32>(),
    }
    .map_err(|_| format!("malformed character reference &#{digits};"))?;
    char::from_u32(code)
        .filter(|&c| verifier::is_serializable_char(c))
        .ok_or_else(|| format!("character reference &#{digits}; is not a legal XML character"))
}

/// Replaces the character references in an entity's literal value. Entity
/// references are kept for [`resolve_entities`].
fn expand_char_references(value: &str) -> Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("&#") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find(';')
            .ok_or_else(|| format!("unterminated character reference in {value:?}"))?;
        out.push(char_reference(&after[..end])?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Collects the internal general entities with literal values, character
/// references already replaced. The first declaration of a name wins;
/// parameter and external entities, comments and processing instructions
/// are skipped.
fn internal_entities(subset: &str) -> Result<HashMap<String, String>, String> {
    let mut entities = HashMap::new();
    let mut rest = subset;
    while let Some(start) = rest.find('<') {
        rest = &rest[start..];
        if let Some(comment) = rest.strip_prefix("<!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }
        if let Some(pi) = rest.strip_prefix("<?") {
            rest = pi.find("?>").map_or("", |end| &pi[end + 2..]);
            continue;
        }
        let Some(decl) = rest.strip_prefix("<!ENTITY") else {
            rest = &rest[1..];
            continue;
        };
        rest = decl.trim_start_matches(is_xml_space);
        if rest.starts_with('%') {
            continue;
        }
        let name_end = rest.find(is_xml_space).unwrap_or(rest.len());
        let (name, after) = rest.split_at(name_end);
        rest = after;
        if let Some((value, after)) = quoted(after.trim_start_matches(is_xml_space)) {
            rest = after;
            if !entities.contains_key(name) {
                entities.insert(name.to_string(), expand_char_references(value)?);
            }
        }
    }
    Ok(entities)
}

/// Expands the entity references inside every declared value, so each
/// entity maps to its final text.
fn resolve_entities(declared: &HashMap<String, String>) -> Result<HashMap<String, String>, String> {
    let mut resolved = HashMap::with_capacity(declared.len());
    for name in declared.keys() {
        resolve_entity(name, declared, &mut resolved, &mut Vec::new())?;
    }
    Ok(resolved)
}

fn resolve_entity(
    name: &str,
    declared: &HashMap<String, String>,
    resolved: &mut HashMap<String, String>,
    open: &mut Vec<String>,
) -> Result<String, String> {
    if let Some(text) = resolved.get(name) {
        return Ok(text.clone());
    }
    if open.iter().any(|n| n == name) {
        return Err(format!("entity {name:?} refers to itself"));
    }
    let value = declared
        .get(name)
        .ok_or_else(|| format!("entity {name:?} is not declared"))?;
    open.push(name.to_string());
    let mut out = String::with_capacity(value.len());
    let mut rest = value.as_str();
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(';')
            .ok_or_else(|| format!("unterminated reference in entity {name:?}"))?;
        let reference = &after[..end];
        if let Some(digits) = reference.strip_prefix('#') {
            out.push(char_reference(digits)?);
        } else if let Some(text) = predefined_entity(reference) {
            out.push_str(text);
        } else {
            out.push_str(&resolve_entity(reference, declared, resolved, open)?);
        }
        if out.len() > MAX_ENTITY_EXPANSION {
            return Err(format!("entity {name:?} expands beyond {MAX_ENTITY_EXPANSION} bytes"));
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    open.pop();
    resolved.insert(name.to_string(), out.clone());
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Document {
        Document::parse_str(input).unwrap()
    }

    fn parse_err(input: &str) -> XmlError {
        Document::parse_str(input).unwrap_err()
    }

    #[test]
    fn test_simple_tree() {
        let doc = parse("<root><a x='1'>text</a><b/></root>");
        let root = doc.root_element();
        assert_eq!(doc.local_name(root), Some("root"));
        assert_eq!(doc.child_count(root), 2);
        let a = doc.child(root, 0).unwrap();
        assert_eq!(doc.attribute_value(a, "x"), Some("1"));
        assert_eq!(doc.value(a), "text");
        let b = doc.child(root, 1).unwrap();
        assert_eq!(doc.child_count(b), 0);
    }

    #[test]
    fn test_prolog_and_epilog() {
        let doc = parse("<?xml version='1.0'?>\n<!--before--><?pi data?>\n<root/>\n<!--after-->\n");
        let document = doc.root();
        let kinds: Vec<&str> = doc
            .children(document)
            .map(|c| doc.kind(c).type_name())
            .collect();
        assert_eq!(
            kinds,
            vec!["comment", "processing instruction", "element", "comment"]
        );
    }

    #[test]
    fn test_cdata_runs_merge() {
        let doc = parse("<a><![CDATA[x]]><![CDATA[y]]></a>");
        let a = doc.root_element();
        assert_eq!(doc.child_count(a), 1);
        let text = doc.child(a, 0).unwrap();
        assert!(doc.is_cdata(text));
        assert_eq!(doc.value(text), "xy");
    }

    #[test]
    fn test_plain_text_first_is_not_cdata() {
        let doc = parse("<a> <![CDATA[<&>]]> </a>");
        let text = doc.child(doc.root_element(), 0).unwrap();
        assert!(!doc.is_cdata(text));
        assert_eq!(doc.value(text), " <&> ");
    }

    #[test]
    fn test_line_endings_normalized() {
        let doc = parse("<a t='x\r\ny\tz'>1\r\n2\r3<![CDATA[\r\n]]></a>");
        let a = doc.root_element();
        assert_eq!(doc.value(a), "1\n2\n3\n");
        assert_eq!(doc.attribute_value(a, "t"), Some("x y z"));
    }

    #[test]
    fn test_character_references_survive_normalization() {
        let doc = parse("<a t='x&#10;y&#9;z&#13;'>a&#13;b</a>");
        let a = doc.root_element();
        assert_eq!(doc.attribute_value(a, "t"), Some("x\ny\tz\r"));
        assert_eq!(doc.value(a), "a\rb");
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = parse(
            "<r xmlns='urn:d' xmlns:p='urn:p'><p:c p:a='1' b='2'/><e xmlns=''/></r>",
        );
        let r = doc.root_element();
        assert_eq!(doc.namespace_uri(r), Some("urn:d"));
        assert_eq!(
            doc.namespace_declarations(r),
            &[("p".to_string(), "urn:p".to_string())]
        );
        let c = doc.child(r, 0).unwrap();
        assert_eq!(doc.namespace_uri(c), Some("urn:p"));
        assert!(doc.attribute(c, "a", "urn:p").is_some());
        assert!(doc.attribute(c, "b", "").is_some());
        let e = doc.child(r, 1).unwrap();
        assert_eq!(doc.namespace_uri(e), Some(""));
        assert_eq!(doc.attribute_count(r), 0);
    }

    #[test]
    fn test_unbound_prefix() {
        let err = parse_err("<p:root/>");
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert!(err.message().contains("not bound"));
    }

    #[test]
    fn test_duplicate_expanded_attribute() {
        let err = parse_err("<r xmlns:a='urn:x' xmlns:b='urn:x' a:n='1' b:n='2'/>");
        assert_eq!(err.kind(), ErrorKind::Parsing);
    }

    #[test]
    fn test_root_rules() {
        assert_eq!(parse_err("").kind(), ErrorKind::Parsing);
        assert_eq!(parse_err("<!-- only -->").kind(), ErrorKind::Parsing);
        assert_eq!(parse_err("<a/><b/>").kind(), ErrorKind::Parsing);
        assert_eq!(parse_err("text<a/>").kind(), ErrorKind::Parsing);
        assert_eq!(parse_err("<a>").kind(), ErrorKind::Parsing);
    }

    #[test]
    fn test_invalid_name_is_wrapped() {
        let err = parse_err("<root><1bad/></root>");
        assert_eq!(err.kind(), ErrorKind::Parsing);
        let cause = err.cause().unwrap();
        let inner = cause.downcast_ref::<XmlError>().unwrap();
        assert_eq!(inner.kind(), ErrorKind::IllegalName);
    }

    #[test]
    fn test_error_position() {
        let err = Builder::new()
            .options(BuilderOptions::default().base_uri("file:///t.xml"))
            .build_str("<root>\n  <p:x/>\n</root>")
            .unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.uri(), Some("file:///t.xml"));
    }

    #[test]
    fn test_base_uri_stored() {
        let doc = Builder::new()
            .options(BuilderOptions::default().base_uri("urn:doc"))
            .build_str("<r/>")
            .unwrap();
        assert_eq!(doc.base_uri(), Some("urn:doc"));
    }

    #[test]
    fn test_max_depth() {
        let input = "<a>".repeat(5) + &"</a>".repeat(5);
        let err = Builder::new()
            .options(BuilderOptions::default().max_depth(4))
            .build_str(&input)
            .unwrap_err();
        assert!(err.message().contains("depth"));
        assert!(Builder::new()
            .options(BuilderOptions::default().max_depth(5))
            .build_str(&input)
            .is_ok());
    }

    #[test]
    fn test_doc_type_with_internal_entities() {
        let doc = parse(
            "<!DOCTYPE r PUBLIC '-//X//EN' 'r.dtd' [\n<!ENTITY who 'world'>\n]><r>hello &who;</r>",
        );
        let dt = doc.doc_type().unwrap();
        match doc.kind(dt) {
            NodeKind::DocType {
                root_name,
                public_id,
                system_id,
                internal_subset,
            } => {
                assert_eq!(root_name, "r");
                assert_eq!(public_id.as_deref(), Some("-//X//EN"));
                assert_eq!(system_id.as_deref(), Some("r.dtd"));
                assert_eq!(internal_subset.as_deref(), Some("\n<!ENTITY who 'world'>\n"));
            }
            other => panic!("expected doctype, got {other:?}"),
        }
        assert_eq!(doc.value(doc.root_element()), "hello world");
    }

    #[test]
    fn test_entity_values_expand_references() {
        let doc = parse(
            "<!DOCTYPE r [\n<!ENTITY lt2 '&#60;'>\n<!ENTITY both '&lt2;&#x3E;&amp;'>\n\
             <!ENTITY outer 'a &inner; c'>\n<!ENTITY inner 'b'>\n]>\
             <r a='&both;'>&lt2;|&both;|&outer;</r>",
        );
        let root = doc.root_element();
        assert_eq!(doc.value(root), "<|<>&|a b c");
        assert_eq!(doc.attribute_value(root, "a"), Some("<>&"));
    }

    #[test]
    fn test_recursive_entities_rejected() {
        let err = parse_err("<!DOCTYPE r [<!ENTITY a '&b;'><!ENTITY b '&a;'>]><r>&a;</r>");
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert!(err.message().contains("refers to itself"));

        let err = parse_err("<!DOCTYPE r [<!ENTITY a '&#0;'>]><r/>");
        assert_eq!(err.kind(), ErrorKind::Parsing);
    }

    #[test]
    fn test_entity_expansion_limit() {
        let mut subset = String::from("<!ENTITY e0 'xxxxxxxxxxxxxxxx'>");
        for i in 1..8 {
            let p = i - 1;
            subset.push_str(&format!(
                "<!ENTITY e{i} '&e{p};&e{p};&e{p};&e{p};&e{p};&e{p};&e{p};&e{p};'>"
            ));
        }
        let err = parse_err(&format!("<!DOCTYPE r [{subset}]><r>&e7;</r>"));
        assert!(err.message().contains("expands beyond"));
    }

    #[test]
    fn test_entities_in_comments_and_pis_ignored() {
        let entities = internal_entities(
            "<!-- <!ENTITY fake 'no'> --><?pi <!ENTITY alsofake 'no'>?>\
             <!ENTITY real '<!ENTITY inside \"x\">'>",
        )
        .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities["real"], "<!ENTITY inside \"x\">");
        assert_eq!(
            parse_err("<!DOCTYPE r [<!-- <!ENTITY fake 'no'> -->]><r>&fake;</r>").kind(),
            ErrorKind::Parsing
        );
    }

    #[test]
    fn test_unknown_entity() {
        assert_eq!(parse_err("<r>&nope;</r>").kind(), ErrorKind::Parsing);
    }

    #[test]
    fn test_parse_doc_type_forms() {
        assert_eq!(
            parse_doc_type(" html").unwrap().root_name,
            "html".to_string()
        );
        let system = parse_doc_type(" a SYSTEM \"a.dtd\"").unwrap();
        assert_eq!(system.system_id.as_deref(), Some("a.dtd"));
        assert_eq!(system.public_id, None);
        assert!(parse_doc_type(" a PUBLIC 'p'").is_none());
        assert!(parse_doc_type("").is_none());
    }

    #[test]
    fn test_split_pi() {
        assert_eq!(split_pi("target  some data "), ("target", "some data "));
        assert_eq!(split_pi("bare"), ("bare", ""));
    }

    #[test]
    fn test_build_bytes_latin1() {
        let mut bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?>".to_vec();
        bytes.extend_from_slice(b"<r>caf\xE9</r>");
        let doc = Document::parse_bytes(&bytes).unwrap();
        assert_eq!(doc.value(doc.root_element()), "caf\u{e9}");
    }

    #[test]
    fn test_build_bytes_bad_encoding() {
        let err = Document::parse_bytes(&[b'<', 0x80, 0x81]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parsing);
        let cause = err.cause().unwrap().downcast_ref::<XmlError>().unwrap();
        assert_eq!(cause.kind(), ErrorKind::Encoding);
    }
}
