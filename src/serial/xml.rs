//! XML serializer.
//!
//! Writes a `Document` as XML text in a chosen output encoding. Escaping is
//! chosen so that building the output again yields an equal document:
//! carriage returns and attribute whitespace become character references,
//! and characters the output encoding lacks become hexadecimal character
//! references where markup allows it.

use std::fmt::Write as _;
use std::io::Write;

use crate::encoding::Charset;
use crate::error::{ErrorKind, XmlError};
use crate::tree::{Document, NodeId, NodeKind};
use crate::util::qname::join_qname;
use crate::verifier::{is_serializable_char, is_xml_space, XML_NAMESPACE};

/// The line separator of serialized documents.
pub const LINE_SEPARATOR: &str = "\r\n";

/// Options controlling XML serialization output.
///
/// # Examples
///
/// ```
/// use xmlom::Document;
/// use xmlom::serial::{serialize_to_vec, SerializeOptions};
///
/// let doc = Document::parse_str("<root><child>caf\u{e9}</child></root>").unwrap();
/// let options = SerializeOptions::default().encoding("US-ASCII").indent(2);
/// let xml = serialize_to_vec(&doc, &options).unwrap();
/// assert_eq!(
///     String::from_utf8(xml).unwrap(),
///     "<?xml version=\"1.0\" encoding=\"US-ASCII\"?>\r\n\
///      <root>\r\n  <child>caf&#xE9;</child>\r\n</root>\r\n"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// The output encoding name, written into the XML declaration.
    /// Defaults to `UTF-8`.
    pub encoding: String,
    /// Spaces per nesting level for element-only content, or `None` (the
    /// default) to keep the tree's own whitespace.
    pub indent: Option<usize>,
    /// Preferred maximum line length. Lines are only broken between
    /// attributes, so longer lines still occur. `None` (the default) means
    /// unbounded.
    pub max_line_length: Option<usize>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            encoding: "UTF-8".to_string(),
            indent: None,
            max_line_length: None,
        }
    }
}

impl SerializeOptions {
    /// Sets the output encoding.
    #[must_use]
    pub fn encoding(mut self, name: &str) -> Self {
        self.encoding = name.to_string();
        self
    }

    /// Enables indentation with `spaces` spaces per level.
    ///
    /// Only elements whose children are elements, comments, processing
    /// instructions and whitespace are indented; their whitespace-only text
    /// is replaced by the indentation. Mixed content is written unchanged.
    #[must_use]
    pub fn indent(mut self, spaces: usize) -> Self {
        self.indent = Some(spaces);
        self
    }

    /// Sets the preferred maximum line length.
    #[must_use]
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = Some(max);
        self
    }
}

/// Writes documents to a byte sink.
pub struct Serializer<W: Write> {
    sink: W,
    options: SerializeOptions,
}

impl<W: Write> Serializer<W> {
    /// Creates a serializer writing to `sink`.
    pub fn new(sink: W, options: SerializeOptions) -> Self {
        Self { sink, options }
    }

    /// Writes `doc`: the XML declaration, then every child of the document
    /// node, each followed by a line separator.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Encoding`] if the configured encoding is unknown.
    /// - [`ErrorKind::UnavailableCharacter`] if a name, comment, processing
    ///   instruction or doctype contains a character the encoding lacks, or
    ///   if any content holds U+0000, U+FFFE or U+FFFF, which XML cannot
    ///   represent at all.
    /// - [`ErrorKind::Io`] if the sink fails.
    pub fn write(&mut self, doc: &Document) -> Result<(), XmlError> {
        let charset = Charset::for_name(&self.options.encoding)?;
        let mut writer = XmlWriter::new(charset, LINE_SEPARATOR, &self.options);
        writer.strict = true;
        writer.raw("<?xml version=\"1.0\" encoding=\"");
        writer.raw(&self.options.encoding);
        writer.raw("\"?>");
        writer.newline();
        for child in doc.children(doc.root()) {
            writer.node(doc, child, 0)?;
            writer.newline();
        }
        let bytes = charset.encode(&writer.out)?;
        log::debug!(
            "serialized {} nodes to {} bytes of {}",
            doc.node_count(),
            bytes.len(),
            self.options.encoding
        );
        self.sink.write_all(&bytes).map_err(XmlError::io)?;
        self.sink.flush().map_err(XmlError::io)
    }

    /// Returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Serializes a document into a byte vector.
///
/// # Errors
///
/// See [`Serializer::write`].
pub fn serialize_to_vec(doc: &Document, options: &SerializeOptions) -> Result<Vec<u8>, XmlError> {
    let mut serializer = Serializer::new(Vec::new(), options.clone());
    serializer.write(doc)?;
    Ok(serializer.into_inner())
}

/// Returns the XML form of a single node, without an XML declaration.
///
/// Line feeds stay line feeds, namespace declarations a subtree needs are
/// written on it, and an attribute is written as `name="value"`. The
/// document node yields its children separated by line feeds. Characters
/// XML cannot represent are written as character references here rather
/// than rejected, so the result is for display and may not parse.
///
/// # Examples
///
/// ```
/// use xmlom::Document;
/// use xmlom::serial::to_xml;
///
/// let doc = Document::parse_str("<a><![CDATA[<&>]]></a>").unwrap();
/// let text = doc.child(doc.root_element(), 0).unwrap();
/// assert_eq!(to_xml(&doc, text), "<![CDATA[<&>]]>");
/// ```
#[must_use]
pub fn to_xml(doc: &Document, id: NodeId) -> String {
    let options = SerializeOptions::default();
    let mut writer = XmlWriter::new(Charset::Utf8, "\n", &options);
    let result = match doc.kind(id) {
        NodeKind::Document => {
            let mut result = Ok(());
            for (i, child) in doc.children(id).enumerate() {
                if i > 0 {
                    writer.newline();
                }
                result = result.and_then(|()| writer.node(doc, child, 0));
            }
            result
        }
        NodeKind::Attribute { .. } => writer.attribute(doc, id),
        _ => writer.node(doc, id, 0),
    };
    // UTF-8 has every character and lenient mode rejects none.
    debug_assert!(result.is_ok());
    writer.out
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct XmlWriter {
    out: String,
    charset: Charset,
    newline: &'static str,
    indent: Option<usize>,
    max_line_length: Option<usize>,
    column: usize,
    /// Reject characters outside XML instead of writing references to them.
    strict: bool,
    /// Namespace bindings written on each open element, innermost last.
    scopes: Vec<Vec<(String, String)>>,
}

impl XmlWriter {
    fn new(charset: Charset, newline: &'static str, options: &SerializeOptions) -> Self {
        Self {
            out: String::new(),
            charset,
            newline,
            indent: options.indent,
            max_line_length: options.max_line_length,
            column: 0,
            strict: false,
            scopes: Vec::new(),
        }
    }

    /// Appends text that contains no line feeds.
    fn raw(&mut self, s: &str) {
        self.out.push_str(s);
        self.column += s.chars().count();
    }

    fn newline(&mut self) {
        self.out.push_str(self.newline);
        self.column = 0;
    }

    fn spaces(&mut self, count: usize) {
        for _ in 0..count {
            self.out.push(' ');
        }
        self.column += count;
    }

    /// Appends markup content that cannot use character references: every
    /// character must be available, and line feeds become the separator.
    fn literal(&mut self, s: &str, what: &str) -> Result<(), XmlError> {
        if let Some(c) = s
            .chars()
            .find(|&c| !self.charset.can_encode(c) || (self.strict && !is_serializable_char(c)))
        {
            return Err(XmlError::new(
                ErrorKind::UnavailableCharacter,
                format!(
                    "U+{:04X} in {what} is not available in the output encoding",
                    c as u32
                ),
            )
            .with_data(s));
        }
        for (i, line) in s.split('\n').enumerate() {
            if i > 0 {
                self.newline();
            }
            self.raw(line);
        }
        Ok(())
    }

    fn check_char(&self, c: char, what: &str, data: &str) -> Result<(), XmlError> {
        if self.strict && !is_serializable_char(c) {
            return Err(XmlError::new(
                ErrorKind::UnavailableCharacter,
                format!("U+{:04X} in {what} cannot be represented in XML", c as u32),
            )
            .with_data(data));
        }
        Ok(())
    }

    fn char_ref(&mut self, c: char) {
        let start = self.out.len();
        let _ = write!(self.out, "&#x{:02X};", c as u32);
        self.column += self.out.len() - start;
    }

    // --- Nodes ---

    fn node(&mut self, doc: &Document, id: NodeId, depth: usize) -> Result<(), XmlError> {
        match doc.kind(id) {
            NodeKind::Element { .. } => self.element(doc, id, depth),
            NodeKind::Text { content, cdata } => {
                if *cdata && self.cdata_allowed(content) {
                    self.raw("<![CDATA[");
                    self.literal(content, "a CDATA section")?;
                    self.raw("]]>");
                } else {
                    self.escaped_text(content)?;
                }
                Ok(())
            }
            NodeKind::Comment { content } => {
                self.raw("<!--");
                self.literal(content, "a comment")?;
                self.raw("-->");
                Ok(())
            }
            NodeKind::ProcessingInstruction { target, data } => {
                self.raw("<?");
                self.literal(target, "a processing instruction target")?;
                if !data.is_empty() {
                    self.raw(" ");
                    self.literal(data, "processing instruction data")?;
                }
                self.raw("?>");
                Ok(())
            }
            NodeKind::DocType {
                root_name,
                public_id,
                system_id,
                internal_subset,
            } => {
                self.raw("<!DOCTYPE ");
                self.literal(root_name, "a doctype name")?;
                if let Some(public_id) = public_id {
                    self.raw(" PUBLIC \"");
                    self.literal(public_id, "a public identifier")?;
                    self.raw("\"");
                } else if system_id.is_some() {
                    self.raw(" SYSTEM");
                }
                if let Some(system_id) = system_id {
                    let quote = if system_id.contains('"') { "'" } else { "\"" };
                    self.raw(" ");
                    self.raw(quote);
                    self.literal(system_id, "a system identifier")?;
                    self.raw(quote);
                }
                if let Some(subset) = internal_subset {
                    self.raw(" [");
                    self.literal(subset, "an internal subset")?;
                    self.raw("]");
                }
                self.raw(">");
                Ok(())
            }
            NodeKind::Attribute { .. } | NodeKind::Document => Ok(()),
        }
    }

    /// CDATA output is used only when it reads back unchanged.
    fn cdata_allowed(&self, content: &str) -> bool {
        !content.contains("]]>")
            && content.chars().all(|c| {
                self.charset.can_encode(c)
                    && is_serializable_char(c)
                    && (c == '\t' || c == '\n' || c >= ' ')
            })
    }

    fn escaped_text(&mut self, content: &str) -> Result<(), XmlError> {
        for c in content.chars() {
            self.check_char(c, "text", content)?;
            match c {
                '&' => self.raw("&amp;"),
                '<' => self.raw("&lt;"),
                '>' => self.raw("&gt;"),
                '\n' => self.newline(),
                '\t' => self.raw("\t"),
                c if c < ' ' => self.char_ref(c),
                c if !self.charset.can_encode(c) => self.char_ref(c),
                c => {
                    self.out.push(c);
                    self.column += 1;
                }
            }
        }
        Ok(())
    }

    fn escape_attribute(&self, value: &str) -> Result<String, XmlError> {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            self.check_char(c, "an attribute value", value)?;
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                '"' => escaped.push_str("&quot;"),
                c if c < ' ' || !self.charset.can_encode(c) => {
                    let _ = write!(escaped, "&#x{:02X};", c as u32);
                }
                c => escaped.push(c),
            }
        }
        Ok(escaped)
    }

    // --- Elements ---

    fn lookup(&self, pending: &[(String, String)], prefix: &str) -> String {
        if prefix == "xml" {
            return XML_NAMESPACE.to_string();
        }
        pending
            .iter()
            .chain(self.scopes.iter().rev().flatten())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
            .unwrap_or_default()
    }

    /// Writes ` name="value"`, breaking the line first if it would grow past
    /// the maximum length.
    fn attribute_text(&mut self, name: &str, value: &str) -> Result<(), XmlError> {
        let escaped = self.escape_attribute(value)?;
        let width = 1 + name.chars().count() + 2 + escaped.chars().count() + 1;
        match self.max_line_length {
            Some(max) if self.column + width > max && self.column > 0 => self.newline(),
            _ => self.raw(" "),
        }
        self.literal(name, "an attribute name")?;
        self.raw("=\"");
        self.raw(&escaped);
        self.raw("\"");
        Ok(())
    }

    fn attribute(&mut self, doc: &Document, id: NodeId) -> Result<(), XmlError> {
        if let NodeKind::Attribute {
            local_name,
            prefix,
            value,
            ..
        } = doc.kind(id)
        {
            let name = join_qname(prefix.as_deref(), local_name);
            self.literal(&name, "an attribute name")?;
            self.raw("=\"");
            let escaped = self.escape_attribute(value)?;
            self.raw(&escaped);
            self.raw("\"");
        }
        Ok(())
    }

    /// The namespace bindings `element` needs that are not yet in scope.
    fn needed_declarations(&self, doc: &Document, element: NodeId) -> Vec<(String, String)> {
        let mut pending: Vec<(String, String)> = Vec::new();
        let need = |pending: &mut Vec<(String, String)>, prefix: &str, uri: &str| {
            if prefix != "xml" && self.lookup(pending, prefix) != uri {
                pending.push((prefix.to_string(), uri.to_string()));
            }
        };
        if let NodeKind::Element {
            prefix,
            namespace,
            attributes,
            namespace_declarations,
            ..
        } = doc.kind(element)
        {
            need(&mut pending, prefix.as_deref().unwrap_or(""), namespace.as_str());
            for &a in attributes {
                if let NodeKind::Attribute {
                    prefix: Some(p),
                    namespace,
                    ..
                } = doc.kind(a)
                {
                    need(&mut pending, p.as_str(), namespace.as_str());
                }
            }
            for (p, uri) in namespace_declarations {
                need(&mut pending, p.as_str(), uri.as_str());
            }
        }
        pending
    }

    fn element(&mut self, doc: &Document, id: NodeId, depth: usize) -> Result<(), XmlError> {
        let NodeKind::Element {
            local_name,
            prefix,
            attributes,
            ..
        } = doc.kind(id)
        else {
            return Ok(());
        };
        let qname = join_qname(prefix.as_deref(), local_name);
        self.raw("<");
        self.literal(&qname, "an element name")?;

        let declarations = self.needed_declarations(doc, id);
        for (p, uri) in &declarations {
            let name = if p.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{p}")
            };
            self.attribute_text(&name, uri)?;
        }
        self.scopes.push(declarations);
        for &a in attributes {
            if let NodeKind::Attribute {
                local_name,
                prefix,
                value,
                ..
            } = doc.kind(a)
            {
                self.attribute_text(&join_qname(prefix.as_deref(), local_name), value)?;
            }
        }

        if doc.child_count(id) == 0 {
            self.raw("/>");
            self.scopes.pop();
            return Ok(());
        }
        self.raw(">");
        match self.indent {
            Some(step) if is_element_only(doc, id) && !space_preserved(doc, id) => {
                for child in doc.children(id) {
                    if is_whitespace_text(doc, child) {
                        continue;
                    }
                    self.newline();
                    self.spaces(step * (depth + 1));
                    self.node(doc, child, depth + 1)?;
                }
                self.newline();
                self.spaces(step * depth);
            }
            _ => {
                for child in doc.children(id) {
                    self.node(doc, child, depth + 1)?;
                }
            }
        }
        self.raw("</");
        self.raw(&qname);
        self.raw(">");
        self.scopes.pop();
        Ok(())
    }
}

fn is_whitespace_text(doc: &Document, id: NodeId) -> bool {
    matches!(doc.kind(id), NodeKind::Text { content, .. }
        if content.chars().all(is_xml_space))
}

/// Returns `true` if the nearest `xml:space` on the element or its ancestors
/// is `preserve`.
fn space_preserved(doc: &Document, id: NodeId) -> bool {
    for element in doc.ancestors(id) {
        if !matches!(doc.kind(element), NodeKind::Element { .. }) {
            continue;
        }
        if let Some(attr) = doc.attribute(element, "space", XML_NAMESPACE) {
            match doc.value(attr).as_str() {
                "preserve" => return true,
                "default" => return false,
                _ => {}
            }
        }
    }
    false
}

/// Returns `true` if the element has element children and otherwise only
/// whitespace text, comments and processing instructions, so indentation
/// cannot change its meaning.
fn is_element_only(doc: &Document, id: NodeId) -> bool {
    let mut has_element_child = false;
    for child in doc.children(id) {
        match doc.kind(child) {
            NodeKind::Element { .. } => has_element_child = true,
            NodeKind::Text { .. } if !is_whitespace_text(doc, child) => return false,
            _ => {}
        }
    }
    has_element_child
}
