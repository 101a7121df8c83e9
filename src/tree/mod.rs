//! Flat, arena-based XML document model.
//!
//! A [`Document`] owns every node of one parsed document in a single
//! contiguous `Vec<NodeData>`, ordered depth-first. Navigation links
//! (`up`, `down`) and subtree extents (`end`) are plain indices into that
//! array, never pointers, so the tree's back-edges cost nothing to
//! represent and the whole document is freed by dropping the `Document`.
//!
//! # Layout invariants
//!
//! - For any node `n`, all of its descendants (and attributes) occupy the
//!   half-open index range `[n.pos + 1, n.end)`.
//! - Attributes of an element immediately follow its `Start` node, before
//!   any child node, and never appear in `down`.
//! - Every `Start` node has exactly one matching `End` sentinel;
//!   `end` is the sentinel's index plus one. Other kinds have
//!   `end == pos + 1`.
//! - Index 0 is the synthetic document root: a nameless `Start` node with
//!   no parent whose children are the top-level element, comments, and
//!   processing instructions.
//!
//! The query engine in [`crate::path`] consumes this model exclusively
//! through cheap [`Node`] views; it never walks the raw arena itself.

mod node;

pub use node::{NodeKind, QName};

use crate::error::ParseError;

/// Storage for a single node in the flat document array.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    /// What kind of node this is.
    pub(crate) kind: NodeKind,
    /// Resolved (namespace URI, local name). For PIs the local name is the
    /// target; for text, comments, and end sentinels it is empty.
    pub(crate) name: QName,
    /// Attribute value, text content, comment text, or PI data.
    pub(crate) text: String,
    /// This node's own index in the array.
    pub(crate) pos: usize,
    /// One past the last index of this node's subtree.
    pub(crate) end: usize,
    /// Index of the parent `Start` node, or `None` for the document root.
    pub(crate) up: Option<usize>,
    /// Indices of child nodes in document order. Attributes are excluded.
    pub(crate) down: Vec<usize>,
}

/// A parsed XML document as a flat, depth-first array of nodes.
///
/// Build one with [`Document::parse_str`] or [`Document::parse_bytes`],
/// then query it via [`crate::Path`].
///
/// # Examples
///
/// ```
/// use flatpath::Document;
///
/// let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
/// let root = doc.root();
/// assert_eq!(root.string_value(), "Hello");
/// ```
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    pub(crate) fn from_nodes(nodes: Vec<NodeData>) -> Self {
        Self { nodes }
    }

    /// Parses an XML string into a `Document`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the input is not well-formed XML.
    ///
    /// # Examples
    ///
    /// ```
    /// use flatpath::Document;
    ///
    /// let doc = Document::parse_str("<root><child/></root>").unwrap();
    /// ```
    pub fn parse_str(input: &str) -> Result<Self, ParseError> {
        crate::parser::parse_str(input)
    }

    /// Parses XML from raw bytes.
    ///
    /// The input must be UTF-8 (a leading BOM is tolerated and skipped).
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the bytes are not valid UTF-8 or the
    /// document is not well-formed.
    pub fn parse_bytes(input: &[u8]) -> Result<Self, ParseError> {
        crate::parser::parse_bytes(input)
    }

    /// Returns the synthetic document root node.
    ///
    /// The root is a nameless element whose children are the top-level
    /// element plus any top-level comments and processing instructions.
    /// It is the natural context node for absolute queries.
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        Node { doc: self, id: 0 }
    }

    /// Returns the node at the given document-order position.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is not a valid index into the document.
    #[must_use]
    pub fn node_at(&self, pos: usize) -> Node<'_> {
        assert!(pos < self.nodes.len(), "node position out of range");
        Node { doc: self, id: pos }
    }

    /// Returns the total number of nodes, including attributes and end
    /// sentinels.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn data(&self, id: usize) -> &NodeData {
        &self.nodes[id]
    }
}

/// A cheap, copyable view of one node in a [`Document`].
///
/// A `Node` borrows the document; it is `Copy` and never outlives the
/// arena it points into. Two `Node`s are equal when they denote the same
/// position in the same document.
#[derive(Clone, Copy)]
pub struct Node<'d> {
    doc: &'d Document,
    id: usize,
}

impl<'d> Node<'d> {
    /// The kind of this node.
    #[must_use]
    pub fn kind(self) -> NodeKind {
        self.data().kind
    }

    /// The qualified name of this node.
    #[must_use]
    pub fn name(self) -> &'d QName {
        &self.data().name
    }

    /// The local part of this node's name (the target, for a PI).
    #[must_use]
    pub fn local_name(self) -> &'d str {
        &self.data().name.local
    }

    /// The resolved namespace URI, or `""` when in no namespace.
    #[must_use]
    pub fn namespace_uri(self) -> &'d str {
        &self.data().name.space
    }

    /// This node's index in document order.
    #[must_use]
    pub fn pos(self) -> usize {
        self.id
    }

    /// The parent node, or `None` for the document root.
    #[must_use]
    pub fn parent(self) -> Option<Node<'d>> {
        self.data().up.map(|id| Node { doc: self.doc, id })
    }

    /// The child nodes in document order. Attributes are not children.
    pub fn children(self) -> impl Iterator<Item = Node<'d>> + 'd {
        let doc = self.doc;
        self.data().down.iter().map(move |&id| Node { doc, id })
    }

    /// The attribute nodes of an element, in source order.
    ///
    /// Empty for non-element nodes.
    pub fn attributes(self) -> impl Iterator<Item = Node<'d>> + 'd {
        let doc = self.doc;
        let first = self.id + 1;
        let end = self.data().end;
        (first..end)
            .take_while(move |&id| doc.nodes[id].kind == NodeKind::Attr)
            .map(move |id| Node { doc, id })
    }

    /// The raw text of this node: the attribute value, text content,
    /// comment text, or PI data. Empty for elements and end sentinels.
    #[must_use]
    pub fn text(self) -> &'d str {
        &self.data().text
    }

    /// The string value of this node.
    ///
    /// For an element this is the concatenation of all descendant text
    /// nodes; for attributes, text, comments, and PIs it is the node's
    /// own text.
    #[must_use]
    pub fn string_value(self) -> String {
        match self.kind() {
            NodeKind::Start => {
                let mut out = String::new();
                for id in self.id + 1..self.data().end {
                    let data = self.doc.data(id);
                    if data.kind == NodeKind::Text {
                        out.push_str(&data.text);
                    }
                }
                out
            }
            NodeKind::End => String::new(),
            _ => self.data().text.clone(),
        }
    }

    /// The string value as a freshly allocated byte vector.
    #[must_use]
    pub fn bytes_value(self) -> Vec<u8> {
        self.string_value().into_bytes()
    }

    /// Compares this node's string value against a literal without
    /// materializing the element case: descendant text chunks are matched
    /// prefix-wise against the literal.
    pub(crate) fn equals(self, literal: &str) -> bool {
        match self.kind() {
            NodeKind::Start => {
                let mut rest = literal.as_bytes();
                for id in self.id + 1..self.data().end {
                    let data = self.doc.data(id);
                    if data.kind != NodeKind::Text {
                        continue;
                    }
                    let chunk = data.text.as_bytes();
                    if rest.len() < chunk.len() || &rest[..chunk.len()] != chunk {
                        return false;
                    }
                    rest = &rest[chunk.len()..];
                }
                rest.is_empty()
            }
            NodeKind::End => false,
            _ => self.data().text == literal,
        }
    }

    pub(crate) fn doc(self) -> &'d Document {
        self.doc
    }

    pub(crate) fn end(self) -> usize {
        self.data().end
    }

    pub(crate) fn down(self) -> &'d [usize] {
        &self.data().down
    }

    fn data(self) -> &'d NodeData {
        &self.doc.nodes[self.id]
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("pos", &self.id)
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_layout_invariants() {
        let doc = Document::parse_str(r#"<r a="1"><x/>mid<y>deep</y></r>"#).unwrap();
        let nodes = &doc.nodes;

        // Depth-first order with contiguous subtrees.
        for data in nodes {
            assert!(data.pos < data.end);
            assert!(data.end <= nodes.len());
            for &child in &data.down {
                assert!(child > data.pos && child < data.end);
                assert_eq!(nodes[child].up, Some(data.pos));
                assert_ne!(nodes[child].kind, NodeKind::Attr);
            }
        }

        // Exactly one End per Start, and attrs carry no End of their own.
        let starts = nodes.iter().filter(|n| n.kind == NodeKind::Start).count();
        let ends = nodes.iter().filter(|n| n.kind == NodeKind::End).count();
        assert_eq!(starts, ends);
        for data in nodes.iter().filter(|n| n.kind == NodeKind::Attr) {
            assert_eq!(data.end, data.pos + 1);
        }
    }

    #[test]
    fn test_attributes_contiguous_after_start() {
        let doc = Document::parse_str(r#"<r a="1" b="2"><c d="3"/></r>"#).unwrap();
        let r = doc.root().children().next().unwrap();
        assert_eq!(r.local_name(), "r");
        let attrs: Vec<_> = r.attributes().map(|a| a.local_name().to_string()).collect();
        assert_eq!(attrs, ["a", "b"]);
        // Attribute nodes start right after the element's own position.
        assert_eq!(r.attributes().next().unwrap().pos(), r.pos() + 1);
    }

    #[test]
    fn test_string_value_concatenates_descendant_text() {
        let doc = Document::parse_str("<r>one<x>two</x><!--no-->three</r>").unwrap();
        let r = doc.root().children().next().unwrap();
        assert_eq!(r.string_value(), "onetwothree");
    }

    #[test]
    fn test_equals_chunked() {
        let doc = Document::parse_str("<r>ab<x>cd</x>ef</r>").unwrap();
        let r = doc.root().children().next().unwrap();
        assert!(r.equals("abcdef"));
        assert!(!r.equals("abcde"));
        assert!(!r.equals("abcdefg"));
        assert!(!r.equals(""));
    }

    #[test]
    fn test_equals_on_leaf_kinds() {
        let doc = Document::parse_str(r#"<r a="v"><!--c--><?pi data?>t</r>"#).unwrap();
        let r = doc.root().children().next().unwrap();
        let attr = r.attributes().next().unwrap();
        assert!(attr.equals("v"));
        let kids: Vec<_> = r.children().collect();
        assert!(kids[0].equals("c"));
        assert!(kids[1].equals("data"));
        assert!(kids[2].equals("t"));
    }

    #[test]
    fn test_root_is_nameless_start() {
        let doc = Document::parse_str("<only/>").unwrap();
        let root = doc.root();
        assert_eq!(root.kind(), NodeKind::Start);
        assert_eq!(root.local_name(), "");
        assert!(root.parent().is_none());
        assert_eq!(root.pos(), 0);
    }

    #[test]
    fn test_node_equality() {
        let doc = Document::parse_str("<r/>").unwrap();
        assert_eq!(doc.root(), doc.root());
        assert_ne!(doc.root(), doc.root().children().next().unwrap());
    }

    #[test]
    #[should_panic(expected = "node position out of range")]
    fn test_node_at_out_of_range_panics() {
        let doc = Document::parse_str("<r/>").unwrap();
        let _ = doc.node_at(doc.node_count());
    }
}
