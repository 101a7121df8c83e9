//! XML 1.0 parser producing the flat document array.
//!
//! A hand-rolled recursive descent parser that builds a [`Document`]
//! directly in its flat, depth-first form: `Start` nodes, their attribute
//! nodes, their children, and a closing `End` sentinel are appended in
//! document order, so subtree extents (`end`) fall out of the append
//! positions with no post-pass.
//!
//! The parser is strict and non-validating: the first well-formedness
//! violation aborts with a [`ParseError`]; DOCTYPE declarations are
//! skipped without interpretation (only the five built-in entities and
//! character references are expanded). Input must be UTF-8.
//!
//! Namespace declarations (`xmlns`, `xmlns:p`) are resolved at parse time
//! and are not materialized as attribute nodes; elements and attributes
//! carry their resolved (URI, local name) pair. Referencing an undeclared
//! prefix is a parse error.

use crate::error::{ParseError, SourceLocation};
use crate::tree::{Document, NodeData, NodeKind, QName};

/// Maximum element nesting depth, guarding against stack-shaped input
/// exhausting memory through the open-element stack.
const MAX_DEPTH: usize = 256;

/// The namespace URI permanently bound to the `xml` prefix.
pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Parses an XML string into a [`Document`].
///
/// A leading UTF-8 BOM is tolerated and skipped.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not well-formed.
pub fn parse_str(input: &str) -> Result<Document, ParseError> {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    XmlParser::new(input).parse()
}

/// Parses XML from raw bytes.
///
/// # Errors
///
/// Returns [`ParseError`] if the bytes are not valid UTF-8 or the
/// document is not well-formed.
pub fn parse_bytes(input: &[u8]) -> Result<Document, ParseError> {
    match std::str::from_utf8(input) {
        Ok(s) => parse_str(s),
        Err(e) => Err(ParseError {
            message: format!("input is not valid UTF-8: {e}"),
            location: SourceLocation {
                line: 1,
                column: 1,
                byte_offset: e.valid_up_to(),
            },
        }),
    }
}

/// Splits a qualified name into optional prefix and local part.
///
/// `"foo:bar"` → `(Some("foo"), "bar")`; `"bar"` → `(None, "bar")`.
fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.find(':') {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}

/// Returns `true` if the byte may start a name.
///
/// Multi-byte UTF-8 sequences are accepted wholesale; precise Unicode
/// name classes are not enforced.
fn is_name_start_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

/// Returns `true` if the byte may continue a name. The colon is included
/// so qualified names are read in one piece and split afterwards.
fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':') || b >= 0x80
}

/// An element on the open-element stack.
struct OpenElement {
    /// Arena index of the element's `Start` node.
    id: usize,
    /// The tag name as written, for matching the closing tag.
    raw_name: String,
}

/// Prefix bindings in scope, as a flat stack with per-element frames.
struct NamespaceScope {
    bindings: Vec<(String, String)>,
    frames: Vec<usize>,
}

impl NamespaceScope {
    fn new() -> Self {
        Self {
            bindings: vec![("xml".to_string(), XML_NAMESPACE.to_string())],
            frames: Vec::new(),
        }
    }

    fn push_frame(&mut self) {
        self.frames.push(self.bindings.len());
    }

    fn pop_frame(&mut self) {
        if let Some(mark) = self.frames.pop() {
            self.bindings.truncate(mark);
        }
    }

    fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.push((prefix.to_string(), uri.to_string()));
    }

    /// Most recent binding for `prefix`, or `None` if undeclared.
    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// The default namespace URI, empty when none is in scope.
    fn default_uri(&self) -> &str {
        self.lookup("").unwrap_or("")
    }
}

/// The core parser state machine.
struct XmlParser<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    nodes: Vec<NodeData>,
    open: Vec<OpenElement>,
    ns: NamespaceScope,
}

impl<'a> XmlParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            nodes: Vec::with_capacity(64),
            open: Vec::new(),
            ns: NamespaceScope::new(),
        }
    }

    fn parse(mut self) -> Result<Document, ParseError> {
        // Index 0: the synthetic document root.
        self.nodes.push(NodeData {
            kind: NodeKind::Start,
            name: QName::default(),
            text: String::new(),
            pos: 0,
            end: 0,
            up: None,
            down: Vec::new(),
        });
        self.open.push(OpenElement {
            id: 0,
            raw_name: String::new(),
        });

        // The XML declaration must sit at the very start of the input.
        if self.looking_at(b"<?xml")
            && matches!(self.peek_at(5), Some(b' ' | b'\t' | b'\r' | b'\n'))
        {
            self.parse_xml_declaration()?;
        }

        let mut seen_root = false;
        loop {
            let at_top = self.open.len() == 1;
            if at_top {
                self.skip_whitespace();
            }
            if self.at_end() {
                break;
            }

            if self.looking_at(b"<!--") {
                self.parse_comment()?;
            } else if self.looking_at(b"<![CDATA[") {
                if at_top {
                    return Err(self.fatal("CDATA section outside of root element"));
                }
                self.parse_cdata()?;
            } else if self.looking_at(b"<!DOCTYPE") {
                if seen_root {
                    return Err(self.fatal("misplaced DOCTYPE declaration"));
                }
                self.skip_doctype()?;
            } else if self.looking_at(b"<!") {
                return Err(self.fatal("unexpected markup declaration"));
            } else if self.looking_at(b"</") {
                self.parse_end_tag()?;
            } else if self.looking_at(b"<?") {
                self.parse_pi()?;
            } else if self.peek() == Some(b'<') {
                if at_top {
                    if seen_root {
                        return Err(self.fatal("content after document element"));
                    }
                    seen_root = true;
                }
                self.parse_element()?;
            } else {
                if at_top {
                    return Err(self.fatal("character data outside of root element"));
                }
                self.parse_text()?;
            }
        }

        if self.open.len() > 1 {
            let name = self.open.last().map_or("", |e| e.raw_name.as_str());
            return Err(self.fatal(format!("unexpected end of input: unclosed element '{name}'")));
        }
        if !seen_root {
            return Err(self.fatal("missing root element"));
        }

        // Close the document root with its own End sentinel.
        let end_pos = self.nodes.len();
        self.nodes.push(NodeData {
            kind: NodeKind::End,
            name: QName::default(),
            text: String::new(),
            pos: end_pos,
            end: end_pos + 1,
            up: None,
            down: Vec::new(),
        });
        self.nodes[0].end = end_pos + 1;

        Ok(Document::from_nodes(self.nodes))
    }

    // --- XML declaration ---

    fn parse_xml_declaration(&mut self) -> Result<(), ParseError> {
        self.advance(5); // <?xml
        let mut first = true;
        loop {
            let had_ws = self.skip_whitespace();
            if self.looking_at(b"?>") {
                self.advance(2);
                return Ok(());
            }
            if self.at_end() {
                return Err(self.fatal("unterminated XML declaration"));
            }
            if !had_ws {
                return Err(self.fatal("expected whitespace in XML declaration"));
            }
            let name = self.parse_name()?.to_string();
            self.skip_whitespace();
            self.expect(b'=', "expected '=' in XML declaration")?;
            self.skip_whitespace();
            let value = self.parse_quoted()?;
            match name.as_str() {
                "version" if first => {
                    if value != "1.0" && value != "1.1" {
                        return Err(self.fatal(format!("unsupported XML version '{value}'")));
                    }
                }
                "version" => {
                    return Err(self.fatal("version must come first in XML declaration"));
                }
                "encoding" => {
                    let lower = value.to_ascii_lowercase();
                    if lower != "utf-8" && lower != "us-ascii" && lower != "ascii" {
                        return Err(self.fatal(format!("unsupported encoding '{value}'")));
                    }
                }
                "standalone" => {
                    if value != "yes" && value != "no" {
                        return Err(self.fatal("standalone must be 'yes' or 'no'"));
                    }
                }
                _ if first => {
                    return Err(self.fatal("XML declaration must begin with version"));
                }
                _ => {
                    return Err(self.fatal(format!(
                        "unexpected attribute '{name}' in XML declaration"
                    )));
                }
            }
            first = false;
        }
    }

    // --- Elements ---

    fn parse_element(&mut self) -> Result<(), ParseError> {
        if self.open.len() >= MAX_DEPTH {
            return Err(self.fatal("maximum element nesting depth exceeded"));
        }
        self.advance(1); // '<'
        let raw_name = self.parse_name()?.to_string();

        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            let had_ws = self.skip_whitespace();
            match self.peek() {
                Some(b'>' | b'/') => break,
                None => return Err(self.fatal("unexpected end of input in start tag")),
                Some(_) => {
                    if !had_ws {
                        return Err(self.fatal("expected whitespace before attribute"));
                    }
                    let attr_name = self.parse_name()?.to_string();
                    self.skip_whitespace();
                    self.expect(b'=', "expected '=' after attribute name")?;
                    self.skip_whitespace();
                    let value = self.parse_attr_value()?;
                    if attrs.iter().any(|(n, _)| *n == attr_name) {
                        return Err(self.fatal(format!("duplicate attribute '{attr_name}'")));
                    }
                    attrs.push((attr_name, value));
                }
            }
        }
        let self_closing = if self.peek() == Some(b'/') {
            self.advance(1);
            true
        } else {
            false
        };
        self.expect(b'>', "expected '>' to close start tag")?;

        // Namespace declarations on this element scope the element itself.
        self.ns.push_frame();
        let mut plain: Vec<(String, String)> = Vec::new();
        for (name, value) in attrs {
            if name == "xmlns" {
                self.ns.bind("", &value);
            } else if let Some(local) = name.strip_prefix("xmlns:") {
                if local.is_empty() {
                    return Err(self.fatal("empty prefix in namespace declaration"));
                }
                self.ns.bind(local, &value);
            } else {
                plain.push((name, value));
            }
        }

        let (prefix, local) = split_name(&raw_name);
        let space = match prefix {
            None => self.ns.default_uri().to_string(),
            Some(p) => self.resolve_prefix(p)?,
        };

        let id = self.nodes.len();
        let parent = self.open.last().map_or(0, |e| e.id);
        self.nodes.push(NodeData {
            kind: NodeKind::Start,
            name: QName::new(space, local),
            text: String::new(),
            pos: id,
            end: 0,
            up: Some(parent),
            down: Vec::new(),
        });
        self.nodes[parent].down.push(id);

        // Unprefixed attributes are in no namespace; the default namespace
        // does not apply to attribute names.
        for (name, value) in plain {
            let (prefix, local) = split_name(&name);
            let space = match prefix {
                None => String::new(),
                Some(p) => self.resolve_prefix(p)?,
            };
            let apos = self.nodes.len();
            self.nodes.push(NodeData {
                kind: NodeKind::Attr,
                name: QName::new(space, local),
                text: value,
                pos: apos,
                end: apos + 1,
                up: Some(id),
                down: Vec::new(),
            });
        }

        if self_closing {
            self.close_element(id);
            self.ns.pop_frame();
        } else {
            self.open.push(OpenElement { id, raw_name });
        }
        Ok(())
    }

    fn parse_end_tag(&mut self) -> Result<(), ParseError> {
        self.advance(2); // </
        let raw_name = self.parse_name()?.to_string();
        self.skip_whitespace();
        self.expect(b'>', "expected '>' in closing tag")?;

        if self.open.len() <= 1 {
            return Err(self.fatal(format!("unexpected closing tag '</{raw_name}>'")));
        }
        let Some(top) = self.open.last() else {
            return Err(self.fatal("unexpected closing tag"));
        };
        if top.raw_name != raw_name {
            return Err(self.fatal(format!(
                "mismatched closing tag: expected '</{}>', found '</{raw_name}>'",
                top.raw_name
            )));
        }
        if let Some(elem) = self.open.pop() {
            self.close_element(elem.id);
        }
        self.ns.pop_frame();
        Ok(())
    }

    /// Appends the `End` sentinel for an element and records its extent.
    fn close_element(&mut self, id: usize) {
        let end_pos = self.nodes.len();
        let up = self.nodes[id].up;
        self.nodes.push(NodeData {
            kind: NodeKind::End,
            name: QName::default(),
            text: String::new(),
            pos: end_pos,
            end: end_pos + 1,
            up,
            down: Vec::new(),
        });
        self.nodes[id].end = end_pos + 1;
    }

    fn resolve_prefix(&self, prefix: &str) -> Result<String, ParseError> {
        match self.ns.lookup(prefix) {
            Some(uri) => Ok(uri.to_string()),
            None => Err(self.fatal(format!("unknown namespace prefix '{prefix}'"))),
        }
    }

    // --- Leaf content ---

    fn parse_text(&mut self) -> Result<(), ParseError> {
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some(b'<') => break,
                Some(b'&') => {
                    let expanded = self.parse_entity()?;
                    text.push_str(&expanded);
                }
                Some(b']') => {
                    if self.looking_at(b"]]>") {
                        return Err(self.fatal("']]>' not allowed in character data"));
                    }
                    text.push(']');
                    self.advance(1);
                }
                Some(b'\r') => {
                    // Newline normalization per XML 1.0 §2.11.
                    self.advance(1);
                    if self.peek() == Some(b'\n') {
                        self.advance(1);
                    }
                    text.push('\n');
                }
                Some(_) => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if matches!(b, b'<' | b'&' | b']' | b'\r') {
                            break;
                        }
                        self.advance(1);
                    }
                    text.push_str(self.slice_str(start));
                }
            }
        }
        if !text.is_empty() {
            self.push_leaf(NodeKind::Text, QName::default(), text);
        }
        Ok(())
    }

    fn parse_cdata(&mut self) -> Result<(), ParseError> {
        self.advance(9); // <![CDATA[
        let start = self.pos;
        while !self.at_end() && !self.looking_at(b"]]>") {
            self.advance(1);
        }
        if self.at_end() {
            return Err(self.fatal("unterminated CDATA section"));
        }
        let content = self.slice_str(start).replace("\r\n", "\n").replace('\r', "\n");
        self.advance(3); // ]]>
        self.push_leaf(NodeKind::Text, QName::default(), content);
        Ok(())
    }

    fn parse_comment(&mut self) -> Result<(), ParseError> {
        self.advance(4); // <!--
        let start = self.pos;
        while !self.at_end() && !self.looking_at(b"-->") {
            if self.looking_at(b"--") {
                return Err(self.fatal("'--' not allowed in comment"));
            }
            self.advance(1);
        }
        if self.at_end() {
            return Err(self.fatal("unterminated comment"));
        }
        let content = self.slice_str(start).to_string();
        self.advance(3); // -->
        self.push_leaf(NodeKind::Comment, QName::default(), content);
        Ok(())
    }

    fn parse_pi(&mut self) -> Result<(), ParseError> {
        self.advance(2); // <?
        let target = self.parse_name()?.to_string();
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.fatal("reserved processing instruction target 'xml'"));
        }
        self.skip_whitespace();
        let start = self.pos;
        while !self.at_end() && !self.looking_at(b"?>") {
            self.advance(1);
        }
        if self.at_end() {
            return Err(self.fatal("unterminated processing instruction"));
        }
        let data = self.slice_str(start).to_string();
        self.advance(2); // ?>
        self.push_leaf(NodeKind::ProcInst, QName::local(target), data);
        Ok(())
    }

    /// Appends a childless node under the innermost open element.
    fn push_leaf(&mut self, kind: NodeKind, name: QName, text: String) {
        let id = self.nodes.len();
        let parent = self.open.last().map_or(0, |e| e.id);
        self.nodes.push(NodeData {
            kind,
            name,
            text,
            pos: id,
            end: id + 1,
            up: Some(parent),
            down: Vec::new(),
        });
        self.nodes[parent].down.push(id);
    }

    fn skip_doctype(&mut self) -> Result<(), ParseError> {
        self.advance(9); // <!DOCTYPE
        // Scan to the matching '>', tracking internal-subset brackets and
        // skipping quoted strings so brackets inside identifiers and
        // entity values are not misread.
        let mut depth = 0u32;
        loop {
            match self.peek() {
                None => return Err(self.fatal("unterminated DOCTYPE declaration")),
                Some(q @ (b'"' | b'\'')) => {
                    self.advance(1);
                    while !self.at_end() && self.peek() != Some(q) {
                        self.advance(1);
                    }
                    if self.at_end() {
                        return Err(self.fatal("unterminated literal in DOCTYPE declaration"));
                    }
                    self.advance(1);
                }
                Some(b'[') => {
                    depth += 1;
                    self.advance(1);
                }
                Some(b']') => {
                    depth = depth.saturating_sub(1);
                    self.advance(1);
                }
                Some(b'>') if depth == 0 => {
                    self.advance(1);
                    return Ok(());
                }
                Some(_) => self.advance(1),
            }
        }
    }

    // --- Entity and character references ---

    fn parse_entity(&mut self) -> Result<String, ParseError> {
        self.advance(1); // '&'
        if self.peek() == Some(b'#') {
            self.advance(1);
            let radix = if self.peek() == Some(b'x') {
                self.advance(1);
                16
            } else {
                10
            };
            let start = self.pos;
            while self.peek().is_some_and(|b| (b as char).is_digit(radix)) {
                self.advance(1);
            }
            if self.pos == start || self.peek() != Some(b';') {
                return Err(self.fatal("invalid character reference"));
            }
            let digits = self.slice_str(start);
            let code = u32::from_str_radix(digits, radix)
                .ok()
                .and_then(char::from_u32);
            let Some(c) = code else {
                return Err(self.fatal("invalid character reference"));
            };
            self.advance(1); // ';'
            return Ok(c.to_string());
        }

        let start = self.pos;
        while self.peek().is_some_and(is_name_byte) {
            self.advance(1);
        }
        if self.peek() != Some(b';') {
            return Err(self.fatal("unterminated entity reference"));
        }
        let name = self.slice_str(start);
        let expanded = match name {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "apos" => "'",
            "quot" => "\"",
            _ => return Err(self.fatal(format!("unknown entity '&{name};'"))),
        };
        self.advance(1); // ';'
        Ok(expanded.to_string())
    }

    // --- Attribute and quoted values ---

    fn parse_attr_value(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fatal("expected quoted attribute value")),
        };
        self.advance(1);
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.fatal("unterminated attribute value")),
                Some(q) if q == quote => {
                    self.advance(1);
                    return Ok(value);
                }
                Some(b'<') => return Err(self.fatal("'<' not allowed in attribute value")),
                Some(b'&') => {
                    let expanded = self.parse_entity()?;
                    value.push_str(&expanded);
                }
                Some(b'\r') => {
                    // Attribute-value normalization per XML 1.0 §3.3.3.
                    self.advance(1);
                    if self.peek() == Some(b'\n') {
                        self.advance(1);
                    }
                    value.push(' ');
                }
                Some(b'\n' | b'\t') => {
                    self.advance(1);
                    value.push(' ');
                }
                Some(_) => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if b == quote || matches!(b, b'<' | b'&' | b'\r' | b'\n' | b'\t') {
                            break;
                        }
                        self.advance(1);
                    }
                    value.push_str(self.slice_str(start));
                }
            }
        }
    }

    /// Reads a quoted value with no entity expansion (XML declaration).
    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fatal("expected quoted value")),
        };
        self.advance(1);
        let start = self.pos;
        while !self.at_end() && self.peek() != Some(quote) {
            self.advance(1);
        }
        if self.at_end() {
            return Err(self.fatal("unterminated quoted value"));
        }
        let value = self.slice_str(start).to_string();
        self.advance(1);
        Ok(value)
    }

    // --- Input primitives ---

    fn parse_name(&mut self) -> Result<&'a str, ParseError> {
        if !self.peek().is_some_and(is_name_start_byte) {
            return Err(self.fatal("invalid name"));
        }
        let start = self.pos;
        while self.peek().is_some_and(is_name_byte) {
            self.advance(1);
        }
        Ok(self.slice_str(start))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn looking_at(&self, prefix: &[u8]) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(&b) = self.input.get(self.pos) {
                self.pos += 1;
                if b == b'\n' {
                    self.line += 1;
                    self.line_start = self.pos;
                }
            }
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.advance(1);
        }
        self.pos > start
    }

    fn expect(&mut self, b: u8, message: &str) -> Result<(), ParseError> {
        if self.peek() == Some(b) {
            self.advance(1);
            Ok(())
        } else {
            Err(self.fatal(message))
        }
    }

    /// Returns the input between `start` and the current position.
    ///
    /// Name and text scans only stop at ASCII boundaries, so the slice is
    /// always valid UTF-8.
    fn slice_str(&self, start: usize) -> &'a str {
        std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("")
    }

    fn fatal(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: SourceLocation {
                line: self.line,
                column: u32::try_from(self.pos - self.line_start + 1).unwrap_or(u32::MAX),
                byte_offset: self.pos,
            },
        }
    }
}
