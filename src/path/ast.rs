//! Compiled form of a path expression.
//!
//! A compiled path is a sequence of [`Step`]s. Each step carries an
//! [`Axis`], a name test, an optional node-kind test, and an optional
//! predicate expression ([`Pred`]). Predicates may embed whole sub-paths,
//! compiled alongside the outer path and evaluated against a nested
//! context by the engine in [`super::eval`].

use crate::tree::{Node, NodeKind};

use super::Path;

/// The direction a step traverses relative to its context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The context node itself.
    Self_,
    /// The immediate parent.
    Parent,
    /// Strict ancestors, nearest first.
    Ancestor,
    /// The context node, then strict ancestors.
    AncestorOrSelf,
    /// Direct children in document order.
    Child,
    /// Strict descendants in document order.
    Descendant,
    /// The context node and its descendants in document order.
    DescendantOrSelf,
    /// Everything after the context node's subtree in document order.
    Following,
    /// Later siblings in document order.
    FollowingSibling,
    /// Everything before the context node in reverse document order,
    /// excluding ancestors.
    Preceding,
    /// Earlier siblings in reverse document order.
    PrecedingSibling,
    /// The attributes of the context node.
    Attribute,
}

impl Axis {
    /// The axis name as written in path syntax.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Self_ => "self",
            Self::Parent => "parent",
            Self::Ancestor => "ancestor",
            Self::AncestorOrSelf => "ancestor-or-self",
            Self::Child => "child",
            Self::Descendant => "descendant",
            Self::DescendantOrSelf => "descendant-or-self",
            Self::Following => "following",
            Self::FollowingSibling => "following-sibling",
            Self::Preceding => "preceding",
            Self::PrecedingSibling => "preceding-sibling",
            Self::Attribute => "attribute",
        }
    }

    /// Parses an axis name as it appears before `::`.
    ///
    /// Returns `None` for anything that is not a supported axis.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "self" => Some(Self::Self_),
            "parent" => Some(Self::Parent),
            "ancestor" => Some(Self::Ancestor),
            "ancestor-or-self" => Some(Self::AncestorOrSelf),
            "child" => Some(Self::Child),
            "descendant" => Some(Self::Descendant),
            "descendant-or-self" => Some(Self::DescendantOrSelf),
            "following" => Some(Self::Following),
            "following-sibling" => Some(Self::FollowingSibling),
            "preceding" => Some(Self::Preceding),
            "preceding-sibling" => Some(Self::PrecedingSibling),
            "attribute" => Some(Self::Attribute),
            _ => None,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compiled step of a path.
#[derive(Debug, Clone)]
pub struct Step {
    /// When set, enumeration jumps to the document root before walking
    /// the axis (the step was preceded by an initial `/`).
    pub root: bool,
    /// The traversal direction.
    pub axis: Axis,
    /// The namespace prefix as written, empty when absent.
    pub prefix: String,
    /// The namespace URI the prefix resolved to at compile time.
    pub space: String,
    /// The local name test; `"*"` accepts any name.
    pub name: String,
    /// The node-kind test; `None` accepts any kind.
    pub kind: Option<NodeKind>,
    /// Optional predicate filtering traversal hits.
    pub pred: Option<Pred>,
}

impl Step {
    /// The name-and-kind test applied to every raw traversal candidate.
    ///
    /// `End` sentinels never match; hits that fail this test do not
    /// advance the predicate position counter.
    #[must_use]
    pub(crate) fn matches(&self, node: Node<'_>) -> bool {
        node.kind() != NodeKind::End
            && self.kind.map_or(true, |k| k == node.kind())
            && (self.name == "*"
                || (node.local_name() == self.name && node.namespace_uri() == self.space))
    }
}

/// A compiled predicate expression.
///
/// Predicates are evaluated against a traversal hit and its 1-based
/// position on the current axis.
#[derive(Debug, Clone)]
pub enum Pred {
    /// `[n]` — true when the traversal position equals `n`.
    Position(usize),
    /// A constant truth value.
    Boolean(bool),
    /// `[path]` — true when the sub-path matches at least one node.
    Exists(Path),
    /// `[path = 'literal']` — true when some match of the sub-path has a
    /// string value equal to the literal.
    Equals(Path, String),
    /// Short-circuit conjunction.
    And(Vec<Pred>),
    /// Short-circuit disjunction.
    Or(Vec<Pred>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_roundtrip() {
        let axes = [
            Axis::Self_,
            Axis::Parent,
            Axis::Ancestor,
            Axis::AncestorOrSelf,
            Axis::Child,
            Axis::Descendant,
            Axis::DescendantOrSelf,
            Axis::Following,
            Axis::FollowingSibling,
            Axis::Preceding,
            Axis::PrecedingSibling,
            Axis::Attribute,
        ];
        for axis in axes {
            assert_eq!(Axis::from_name(axis.as_str()), Some(axis));
        }
    }

    #[test]
    fn test_axis_from_name_invalid() {
        assert_eq!(Axis::from_name("namespace"), None);
        assert_eq!(Axis::from_name("children"), None);
        assert_eq!(Axis::from_name(""), None);
    }

    #[test]
    fn test_axis_display() {
        assert_eq!(Axis::DescendantOrSelf.to_string(), "descendant-or-self");
        assert_eq!(Axis::PrecedingSibling.to_string(), "preceding-sibling");
    }
}
