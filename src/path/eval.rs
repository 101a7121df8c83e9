//! Step state machine and iterator pump.
//!
//! Evaluation composes one [`StepState`] per compiled step into a lazy
//! depth-first product: a single integer `tip` points at the deepest
//! initialized state, advancing it on demand and re-seeding deeper states
//! from each fresh hit. The iterative shape (rather than recursion) is
//! what lets [`Iter`] suspend after every yielded node and resume exactly
//! where it left off, allocating nothing per call.
//!
//! Each state carries two axis cursors, `idx` and `aux`, whose meaning is
//! per-axis: flat-array walks keep the scan position in `idx` and the
//! range limit in `aux`; the preceding axis tracks the nearest unvisited
//! ancestor in `aux` to exclude ancestors from its backward scan; sibling
//! axes use `aux` to remember that the context has been located among its
//! parent's children.

use crate::tree::{Node, NodeKind};

use super::ast::{Axis, Pred, Step};
use super::Path;

/// Per-iteration enumeration state for one compiled step.
pub(crate) struct StepState<'p, 'd> {
    step: &'p Step,
    /// The context node after `init`, then the node most recently yielded.
    /// `None` once the axis is exhausted.
    node: Option<Node<'d>>,
    /// 1-based count of name-and-kind matches on this traversal, fed to
    /// position predicates.
    pos: usize,
    idx: usize,
    aux: usize,
}

impl<'p, 'd> StepState<'p, 'd> {
    fn new(step: &'p Step) -> Self {
        Self {
            step,
            node: None,
            pos: 0,
            idx: 0,
            aux: 0,
        }
    }

    /// Resets the state to enumerate from a fresh context node.
    fn init(&mut self, context: Node<'d>) {
        self.node = Some(context);
        self.pos = 0;
        self.idx = 0;
        self.aux = 0;
    }

    /// Advances to the next hit whose predicate accepts it.
    fn next(&mut self) -> bool {
        while let Some(node) = self.raw_next() {
            self.pos += 1;
            match &self.step.pred {
                None => return true,
                Some(pred) if pred.eval(node, self.pos) => return true,
                Some(_) => {}
            }
        }
        false
    }

    /// Advances the axis walk to the next name-and-kind match, or `None`
    /// when the axis is exhausted.
    #[allow(clippy::too_many_lines)]
    fn raw_next(&mut self) -> Option<Node<'d>> {
        let mut node = self.node?;

        if self.step.root && self.idx == 0 {
            while let Some(up) = node.parent() {
                node = up;
            }
            self.node = Some(node);
        }

        let doc = node.doc();
        match self.step.axis {
            Axis::Self_ => {
                if self.idx == 0 {
                    self.idx = 1;
                    if self.step.matches(node) {
                        return Some(node);
                    }
                }
            }

            Axis::Parent => {
                if self.idx == 0 {
                    self.idx = 1;
                    if let Some(up) = node.parent() {
                        if self.step.matches(up) {
                            self.node = Some(up);
                            return Some(up);
                        }
                    }
                }
            }

            Axis::Ancestor | Axis::AncestorOrSelf => {
                if self.idx == 0 && self.step.axis == Axis::AncestorOrSelf {
                    self.idx += 1;
                    if self.step.matches(node) {
                        return Some(node);
                    }
                }
                let mut current = node;
                while let Some(up) = current.parent() {
                    current = up;
                    self.idx += 1;
                    if self.step.matches(current) {
                        self.node = Some(current);
                        return Some(current);
                    }
                }
            }

            Axis::Child => {
                // After the first yield the state node is the child, so
                // later calls walk its parent's child list.
                let parent = if self.idx == 0 { Some(node) } else { node.parent() };
                if let Some(parent) = parent {
                    let down = parent.down();
                    while self.idx < down.len() {
                        let candidate = doc.node_at(down[self.idx]);
                        self.idx += 1;
                        if self.step.matches(candidate) {
                            self.node = Some(candidate);
                            return Some(candidate);
                        }
                    }
                }
            }

            Axis::Descendant | Axis::DescendantOrSelf => {
                if self.idx == 0 {
                    self.idx = node.pos();
                    self.aux = node.end();
                    if self.step.axis == Axis::Descendant {
                        self.idx += 1;
                    }
                }
                while self.idx < self.aux {
                    let candidate = doc.node_at(self.idx);
                    self.idx += 1;
                    if candidate.kind() == NodeKind::Attr {
                        continue;
                    }
                    if self.step.matches(candidate) {
                        self.node = Some(candidate);
                        return Some(candidate);
                    }
                }
            }

            Axis::Following => {
                if self.idx == 0 {
                    self.idx = node.end();
                }
                while self.idx < doc.node_count() {
                    let candidate = doc.node_at(self.idx);
                    self.idx += 1;
                    if candidate.kind() == NodeKind::Attr {
                        continue;
                    }
                    if self.step.matches(candidate) {
                        self.node = Some(candidate);
                        return Some(candidate);
                    }
                }
            }

            Axis::FollowingSibling => {
                if let Some(parent) = node.parent() {
                    let down = parent.down();
                    if self.idx == 0 {
                        // Locate the context among its siblings first.
                        while self.idx < down.len() {
                            let id = down[self.idx];
                            self.idx += 1;
                            if id == node.pos() {
                                break;
                            }
                        }
                    }
                    while self.idx < down.len() {
                        let candidate = doc.node_at(down[self.idx]);
                        self.idx += 1;
                        if self.step.matches(candidate) {
                            self.node = Some(candidate);
                            return Some(candidate);
                        }
                    }
                }
            }

            Axis::Preceding => {
                if self.idx == 0 {
                    // aux tracks the nearest not-yet-passed ancestor so the
                    // backward scan can step over ancestors.
                    self.aux = node.pos();
                    self.idx = node.pos();
                }
                while self.idx > 0 {
                    self.idx -= 1;
                    let candidate = doc.node_at(self.idx);
                    if candidate.kind() == NodeKind::Attr {
                        continue;
                    }
                    if doc.data(self.aux).up == Some(self.idx) {
                        self.aux = self.idx;
                        continue;
                    }
                    if self.step.matches(candidate) {
                        self.node = Some(candidate);
                        return Some(candidate);
                    }
                }
            }

            Axis::PrecedingSibling => {
                if let Some(parent) = node.parent() {
                    let down = parent.down();
                    if self.aux == 0 {
                        self.aux = 1;
                        self.idx = down
                            .iter()
                            .position(|&id| id == node.pos())
                            .unwrap_or(0);
                    }
                    while self.idx > 0 {
                        self.idx -= 1;
                        let candidate = doc.node_at(down[self.idx]);
                        if self.step.matches(candidate) {
                            self.node = Some(candidate);
                            return Some(candidate);
                        }
                    }
                }
            }

            Axis::Attribute => {
                if self.idx == 0 {
                    self.idx = node.pos() + 1;
                    self.aux = node.end();
                }
                while self.idx < self.aux {
                    let candidate = doc.node_at(self.idx);
                    self.idx += 1;
                    if candidate.kind() != NodeKind::Attr {
                        break;
                    }
                    if self.step.matches(candidate) {
                        self.node = Some(candidate);
                        return Some(candidate);
                    }
                }
            }
        }

        self.node = None;
        None
    }
}

/// A lazy iterator over the nodes a [`Path`] selects from a context node.
///
/// Obtained from [`Path::iter`]. Yields each matching node at most once,
/// tracking visited document positions in a per-iterator bitmap, so
/// overlapping axis products never produce duplicates.
///
/// The underlying document must not be mutated while an `Iter` is live;
/// the iterator holds shared borrows of both the path and the document,
/// so the borrow checker enforces this.
pub struct Iter<'p, 'd> {
    states: Vec<StepState<'p, 'd>>,
    seen: Vec<bool>,
}

impl<'p, 'd> Iter<'p, 'd> {
    pub(crate) fn new(path: &'p Path, context: Node<'d>) -> Self {
        let mut states: Vec<_> = path.steps().iter().map(StepState::new).collect();
        if let Some(first) = states.first_mut() {
            first.init(context);
        }
        Self {
            states,
            seen: vec![false; context.doc().node_count()],
        }
    }

    /// Advances to the next selected node; `true` when one is available
    /// via [`Iter::node`].
    fn advance(&mut self) -> bool {
        let mut tip = self.states.len() - 1;
        'outer: loop {
            while !self.states[tip].next() {
                if tip == 0 {
                    return false;
                }
                tip -= 1;
            }
            while tip < self.states.len() - 1 {
                tip += 1;
                let Some(context) = self.states[tip - 1].node else {
                    return false;
                };
                self.states[tip].init(context);
                if !self.states[tip].next() {
                    tip -= 1;
                    continue 'outer;
                }
            }
            let Some(node) = self.states[tip].node else {
                return false;
            };
            if self.seen[node.pos()] {
                continue 'outer;
            }
            self.seen[node.pos()] = true;
            return true;
        }
    }

    /// The node the last successful advance stopped on.
    ///
    /// # Panics
    ///
    /// Panics if called before the iterator has yielded a node, or after
    /// it has been exhausted. Both indicate a caller bug.
    #[must_use]
    pub fn node(&self) -> Node<'d> {
        let Some(state) = self.states.last() else {
            unreachable!("a compiled path always has at least one step");
        };
        assert!(state.pos != 0, "Iter::node called before any node was yielded");
        match state.node {
            Some(node) => node,
            None => panic!("Iter::node called after iteration ended"),
        }
    }
}

impl<'d> Iterator for Iter<'_, 'd> {
    type Item = Node<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            self.states.last().and_then(|state| state.node)
        } else {
            None
        }
    }
}

impl Pred {
    /// Evaluates this predicate against a traversal hit and its 1-based
    /// position on the current axis.
    ///
    /// Sub-path operands spin up fresh nested iterators against the hit
    /// as context; their visited-set is independent of any outer
    /// iteration.
    pub(crate) fn eval(&self, node: Node<'_>, pos: usize) -> bool {
        match self {
            Pred::Position(n) => *n == pos,
            Pred::Boolean(value) => *value,
            Pred::Exists(path) => path.exists(node),
            Pred::Equals(path, literal) => path.iter(node).any(|n| n.equals(literal)),
            Pred::And(vals) => vals.iter().all(|p| p.eval(node, pos)),
            Pred::Or(vals) => vals.iter().any(|p| p.eval(node, pos)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::path::compile;
    use crate::tree::{Document, NodeKind};

    fn names(doc: &Document, path: &str) -> Vec<String> {
        compile(path)
            .unwrap()
            .iter(doc.root())
            .map(|n| n.local_name().to_string())
            .collect()
    }

    #[test]
    fn test_self_axis() {
        let doc = Document::parse_str("<a><b/></a>").unwrap();
        let a = doc.root().children().next().unwrap();
        let p = compile("self::a").unwrap();
        let hits: Vec<_> = p.iter(a).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0], a);
        assert!(!compile("self::b").unwrap().exists(a));
    }

    #[test]
    fn test_parent_and_ancestor_axes() {
        let doc = Document::parse_str("<a><b><c/></b></a>").unwrap();
        let p = compile("/a/b/c/..").unwrap();
        let hits: Vec<_> = p.iter(doc.root()).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["b"]);

        // Nearest-first ancestor order; the nameless document root is an
        // ancestor too.
        let p = compile("/a/b/c/ancestor::*").unwrap();
        let hits: Vec<_> = p.iter(doc.root()).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["b", "a", ""]);

        let p = compile("/a/b/c/ancestor-or-self::*").unwrap();
        let hits: Vec<_> = p.iter(doc.root()).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["c", "b", "a", ""]);
    }

    #[test]
    fn test_child_skips_attributes() {
        let doc = Document::parse_str(r#"<a x="1"><b/></a>"#).unwrap();
        assert_eq!(names(&doc, "/a/node()"), ["b"]);
    }

    #[test]
    fn test_descendant_document_order() {
        let doc = Document::parse_str("<a><b><c/></b><d/></a>").unwrap();
        assert_eq!(names(&doc, "/a/descendant::*"), ["b", "c", "d"]);
        assert_eq!(names(&doc, "/a/descendant-or-self::*"), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_following_axis_starts_after_subtree() {
        let doc = Document::parse_str("<r><a><b/></a><c><d/></c></r>").unwrap();
        let b = compile("//b").unwrap().iter(doc.root()).next().unwrap();
        let p = compile("following::*").unwrap();
        let hits: Vec<_> = p.iter(b).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["c", "d"]);
    }

    #[test]
    fn test_sibling_axes() {
        let doc = Document::parse_str("<r><a/><b/><c/><d/></r>").unwrap();
        let c = compile("//c").unwrap().iter(doc.root()).next().unwrap();

        let p = compile("following-sibling::*").unwrap();
        let hits: Vec<_> = p.iter(c).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["d"]);

        // Reverse sibling order, context excluded.
        let p = compile("preceding-sibling::*").unwrap();
        let hits: Vec<_> = p.iter(c).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["b", "a"]);
    }

    #[test]
    fn test_preceding_sibling_at_root_is_empty() {
        let doc = Document::parse_str("<r/>").unwrap();
        let p = compile("preceding-sibling::*").unwrap();
        assert!(!p.exists(doc.root()));
        let p = compile("following-sibling::*").unwrap();
        assert!(!p.exists(doc.root()));
    }

    #[test]
    fn test_preceding_excludes_ancestors() {
        let doc = Document::parse_str("<r><a><b/></a><c/></r>").unwrap();
        let c = compile("//c").unwrap().iter(doc.root()).next().unwrap();
        let p = compile("preceding::*").unwrap();
        let hits: Vec<_> = p.iter(c).map(|n| n.local_name().to_string()).collect();
        // b and a in reverse document order; r (an ancestor) is skipped.
        assert_eq!(hits, ["b", "a"]);
    }

    #[test]
    fn test_attribute_axis() {
        let doc = Document::parse_str(r#"<r a="1" b="2"><x c="3"/></r>"#).unwrap();
        let r = doc.root().children().next().unwrap();
        let p = compile("@*").unwrap();
        let hits: Vec<_> = p.iter(r).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["a", "b"]);

        let p = compile("@b").unwrap();
        let hits: Vec<_> = p.iter(r).map(|n| n.text().to_string()).collect();
        assert_eq!(hits, ["2"]);
    }

    #[test]
    fn test_position_counts_only_matches() {
        // The text nodes between the elements must not advance the
        // position counter for b elements.
        let doc = Document::parse_str("<r>x<b i=\"1\"/>y<b i=\"2\"/>z<b i=\"3\"/></r>").unwrap();
        let p = compile("/r/b[2]").unwrap();
        let hits: Vec<_> = p
            .iter(doc.root())
            .map(|n| n.attributes().next().unwrap().text().to_string())
            .collect();
        assert_eq!(hits, ["2"]);
    }

    #[test]
    fn test_position_resets_per_context() {
        let doc = Document::parse_str("<r><g><b>1</b><b>2</b></g><g><b>3</b><b>4</b></g></r>")
            .unwrap();
        let p = compile("/r/g/b[2]").unwrap();
        let hits: Vec<_> = p.iter(doc.root()).map(|n| n.string_value()).collect();
        assert_eq!(hits, ["2", "4"]);
    }

    #[test]
    fn test_deduplication() {
        // Both ancestor chains reach the same nodes; each may be yielded
        // only once.
        let doc = Document::parse_str("<r><a><b/><c/></a></r>").unwrap();
        let p = compile("//*/ancestor::*").unwrap();
        let hits: Vec<_> = p.iter(doc.root()).map(|n| n.local_name().to_string()).collect();
        assert_eq!(hits, ["", "r", "a"]);
    }

    #[test]
    fn test_predicate_subpath_has_own_seen_set() {
        // The equality predicate iterates `b` under each `a` context;
        // outer dedup state must not leak into those nested runs.
        let doc = Document::parse_str("<r><a><b>x</b></a><a><b>x</b></a></r>").unwrap();
        let p = compile("/r/a[b=\"x\"]").unwrap();
        assert_eq!(p.iter(doc.root()).count(), 2);
    }

    #[test]
    fn test_kind_tests_select_kinds() {
        let doc = Document::parse_str("<r>t<!--c--><?p d?></r>").unwrap();
        let r = doc.root().children().next().unwrap();
        let kinds = |path: &str| -> Vec<NodeKind> {
            compile(path).unwrap().iter(r).map(|n| n.kind()).collect()
        };
        assert_eq!(kinds("text()"), [NodeKind::Text]);
        assert_eq!(kinds("comment()"), [NodeKind::Comment]);
        assert_eq!(kinds("processing-instruction()"), [NodeKind::ProcInst]);
        assert_eq!(
            kinds("node()"),
            [NodeKind::Text, NodeKind::Comment, NodeKind::ProcInst]
        );
    }

    #[test]
    fn test_pi_target_filter() {
        let doc = Document::parse_str("<r><?one a?><?two b?></r>").unwrap();
        let r = doc.root().children().next().unwrap();
        let p = compile("processing-instruction('two')").unwrap();
        let hits: Vec<_> = p.iter(r).map(|n| n.text().to_string()).collect();
        assert_eq!(hits, ["b"]);
    }

    #[test]
    fn test_iterator_is_fused_after_exhaustion() {
        let doc = Document::parse_str("<r><a/></r>").unwrap();
        let p = compile("/r/a").unwrap();
        let mut iter = p.iter(doc.root());
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    #[should_panic(expected = "before any node was yielded")]
    fn test_node_before_next_panics() {
        let doc = Document::parse_str("<r/>").unwrap();
        let p = compile("/r").unwrap();
        let iter = p.iter(doc.root());
        let _ = iter.node();
    }

    #[test]
    #[should_panic(expected = "after iteration ended")]
    fn test_node_after_exhaustion_panics() {
        let doc = Document::parse_str("<r/>").unwrap();
        let p = compile("/r").unwrap();
        let mut iter = p.iter(doc.root());
        while iter.next().is_some() {}
        let _ = iter.node();
    }

    #[test]
    fn test_boolean_literal_predicate() {
        use crate::path::ast::Pred;
        let doc = Document::parse_str("<r/>").unwrap();
        assert!(Pred::Boolean(true).eval(doc.root(), 1));
        assert!(!Pred::Boolean(false).eval(doc.root(), 1));
    }
}
