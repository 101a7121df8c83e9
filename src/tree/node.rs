//! Node kind and name types for the flat document model.
//!
//! Unlike a payload-carrying node enum, the flat model keeps the kind as a
//! plain tag: the per-node payload (name, text) lives in `NodeData` so that
//! every arena slot has the same shape and axis walks can scan the array
//! without matching on variants.

use std::fmt;

/// The kind of a node in the flat document array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An element start node, e.g. `<div ...>`.
    Start,
    /// An element close sentinel delimiting the extent of a `Start` node.
    ///
    /// `End` nodes exist in the array only so that `[pos + 1, end)` spans
    /// exactly the descendants of a `Start` node. They are never selected
    /// by a query.
    End,
    /// An attribute node. Attributes immediately follow their element's
    /// `Start` node in the array and do not appear among its children.
    Attr,
    /// A text node (character data, including CDATA sections).
    Text,
    /// A comment node.
    Comment,
    /// A processing instruction node.
    ProcInst,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "element",
            Self::End => "element-end",
            Self::Attr => "attribute",
            Self::Text => "text",
            Self::Comment => "comment",
            Self::ProcInst => "processing-instruction",
        };
        f.write_str(s)
    }
}

/// A namespace-qualified name: a resolved namespace URI plus a local name.
///
/// For processing instructions the local name holds the PI target; for
/// text, comment, and end nodes both parts are empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QName {
    /// The resolved namespace URI, or empty when the name is in no namespace.
    pub space: String,
    /// The local part of the name.
    pub local: String,
}

impl QName {
    /// Creates a name in no namespace.
    #[must_use]
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            space: String::new(),
            local: local.into(),
        }
    }

    /// Creates a namespace-qualified name.
    #[must_use]
    pub fn new(space: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.space.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.space, self.local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_display() {
        assert_eq!(NodeKind::Start.to_string(), "element");
        assert_eq!(NodeKind::Attr.to_string(), "attribute");
        assert_eq!(NodeKind::ProcInst.to_string(), "processing-instruction");
    }

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::local("div").to_string(), "div");
        assert_eq!(
            QName::new("http://www.w3.org/2000/svg", "rect").to_string(),
            "{http://www.w3.org/2000/svg}rect"
        );
    }

    #[test]
    fn test_qname_default_is_empty() {
        let name = QName::default();
        assert!(name.space.is_empty());
        assert!(name.local.is_empty());
    }
}
