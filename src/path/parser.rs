//! Recursive-descent path compiler.
//!
//! Compiles a textual path expression into a [`Path`] in a single
//! left-to-right pass over bytes, with no separate token stream: each
//! grammar decision peeks at most a byte or two ahead. Predicate
//! sub-paths re-enter the same step parser, so the whole expression is
//! compiled in one pass and namespace prefixes are resolved eagerly
//! against the caller's table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::parser::XML_NAMESPACE;
use crate::tree::NodeKind;

use super::ast::{Axis, Pred, Step};
use super::lexer::Cursor;
use super::{CompileError, Path};

/// Compiles `path` against a prefix table, applying the default bindings:
/// the empty prefix maps to the empty URI unless bound by the caller, and
/// `xml` is always rebound to the XML namespace.
pub(crate) fn compile(
    path: &str,
    namespaces: &HashMap<String, String>,
) -> Result<Path, CompileError> {
    let mut compiler = Compiler {
        path,
        cursor: Cursor::new(path),
    };
    if path.is_empty() {
        return Err(compiler.error("empty path"));
    }
    let mut ns = namespaces.clone();
    ns.entry(String::new()).or_default();
    ns.insert("xml".to_string(), XML_NAMESPACE.to_string());
    let ns = Arc::new(ns);
    compiler.parse_path(&ns)
}

struct Compiler<'a> {
    path: &'a str,
    cursor: Cursor<'a>,
}

impl Compiler<'_> {
    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError {
            path: self.path.to_string(),
            offset: self.cursor.offset(),
            message: message.into(),
        }
    }

    /// Parses a path: one or more steps separated by `/`. Re-entered for
    /// predicate sub-paths, which begin at a non-zero offset and stop at
    /// the first byte that cannot continue a step.
    fn parse_path(&mut self, ns: &Arc<HashMap<String, String>>) -> Result<Path, CompileError> {
        let mut steps = Vec::new();
        let start = self.cursor.offset();
        loop {
            let mut step = Step {
                root: false,
                axis: Axis::Child,
                prefix: String::new(),
                space: String::new(),
                name: String::new(),
                kind: None,
                pred: None,
            };

            if self.cursor.offset() == 0 && self.cursor.skip_byte(b'/') {
                step.root = true;
                if self.path.len() == 1 {
                    // A lone "/" selects from the document root with a
                    // wildcard name.
                    step.name = "*".to_string();
                }
            }
            if self.cursor.peek_byte(b'/') {
                // "//" — the second slash is left for the step separator;
                // this step becomes a synthetic descendant-or-self::*.
                step.axis = Axis::DescendantOrSelf;
                step.name = "*".to_string();
            } else if self.cursor.skip_byte(b'@') {
                let mark = self.cursor.offset();
                if !self.cursor.skip_name() {
                    return Err(self.error("missing name after @"));
                }
                step.axis = Axis::Attribute;
                let (prefix, name) = extract_prefix(self.cursor.slice(mark));
                step.prefix = prefix.to_string();
                step.name = name.to_string();
                step.kind = Some(NodeKind::Attr);
            } else {
                let mark = self.cursor.offset();
                if self.cursor.skip_name() {
                    step.name = self.cursor.slice(mark).to_string();
                }
                if step.name.is_empty() {
                    return Err(self.error("missing name"));
                } else if step.name == "*" {
                    step.kind = Some(NodeKind::Start);
                } else if step.name == "." {
                    step.axis = Axis::Self_;
                    step.name = "*".to_string();
                } else if step.name == ".." {
                    step.axis = Axis::Parent;
                    step.name = "*".to_string();
                } else {
                    if self.cursor.skip_byte(b':') {
                        if !self.cursor.skip_byte(b':') {
                            return Err(self.error("missing ':'"));
                        }
                        let Some(axis) = Axis::from_name(&step.name) else {
                            return Err(
                                self.error(format!("unsupported axis: {:?}", step.name))
                            );
                        };
                        if axis == Axis::Attribute {
                            step.kind = Some(NodeKind::Attr);
                        }
                        step.axis = axis;

                        let mark = self.cursor.offset();
                        if !self.cursor.skip_name() {
                            return Err(self.error("missing name"));
                        }
                        step.name = self.cursor.slice(mark).to_string();
                    }
                    if self.cursor.skip_byte(b'(') {
                        let conflict = step.kind.is_some();
                        match step.name.as_str() {
                            "node" => {} // any kind
                            "text" => step.kind = Some(NodeKind::Text),
                            "comment" => step.kind = Some(NodeKind::Comment),
                            "processing-instruction" => step.kind = Some(NodeKind::ProcInst),
                            other => {
                                return Err(
                                    self.error(format!("unsupported expression: {other}()"))
                                );
                            }
                        }
                        if conflict {
                            return Err(self.error(format!(
                                "{}() cannot succeed on axis {:?}",
                                step.name,
                                step.axis.as_str()
                            )));
                        }

                        match self.cursor.parse_literal() {
                            Ok(None) => step.name = "*".to_string(),
                            Ok(Some(literal)) => {
                                if step.kind == Some(NodeKind::ProcInst) {
                                    // The literal is the PI target.
                                    step.name = literal.to_string();
                                } else {
                                    return Err(self.error(format!(
                                        "{}() has no arguments",
                                        step.name
                                    )));
                                }
                            }
                            Err(msg) => return Err(self.error(msg)),
                        }
                        if !self.cursor.skip_byte(b')') {
                            return Err(self.error("missing )"));
                        }
                    } else if step.name == "*" && step.kind.is_none() {
                        step.kind = Some(NodeKind::Start);
                    }
                }
                let (prefix, name) = extract_prefix(&step.name);
                let (prefix, name) = (prefix.to_string(), name.to_string());
                step.prefix = prefix;
                step.name = name;
            }
            step.space = ns.get(&step.prefix).cloned().unwrap_or_default();

            if self.cursor.skip_byte(b'[') {
                step.pred = Some(self.parse_expr(ns)?);
                if !self.cursor.skip_byte(b']') {
                    return Err(self.error("expected ']'"));
                }
            }
            steps.push(step);

            if !self.cursor.skip_byte(b'/') {
                if (start == 0 || start == self.cursor.offset()) && !self.cursor.at_end() {
                    let b = self.cursor.current_byte().unwrap_or(0);
                    return Err(self.error(format!("unexpected {:?}", char::from(b))));
                }
                return Ok(Path {
                    path: self.cursor.slice(start).to_string(),
                    steps,
                    namespaces: Arc::clone(ns),
                });
            }
        }
    }

    fn parse_expr(&mut self, ns: &Arc<HashMap<String, String>>) -> Result<Pred, CompileError> {
        self.parse_or_expr(ns)
    }

    fn parse_or_expr(&mut self, ns: &Arc<HashMap<String, String>>) -> Result<Pred, CompileError> {
        self.cursor.skip_spaces();
        let lval = self.parse_and_expr(ns)?;
        let mut vals = vec![lval];
        loop {
            self.cursor.skip_spaces();
            let mark = self.cursor.offset();
            // The keyword must be framed by whitespace on both sides.
            if !self.cursor.skip_string("or") || !self.cursor.skip_spaces() {
                self.cursor.set_offset(mark);
                return Ok(collapse(vals, Pred::Or));
            }
            vals.push(self.parse_and_expr(ns)?);
        }
    }

    fn parse_and_expr(&mut self, ns: &Arc<HashMap<String, String>>) -> Result<Pred, CompileError> {
        self.cursor.skip_spaces();
        let lval = self.parse_leaf(ns)?;
        let mut vals = vec![lval];
        loop {
            self.cursor.skip_spaces();
            let mark = self.cursor.offset();
            if !self.cursor.skip_string("and") || !self.cursor.skip_spaces() {
                self.cursor.set_offset(mark);
                return Ok(collapse(vals, Pred::And));
            }
            vals.push(self.parse_leaf(ns)?);
        }
    }

    fn parse_leaf(&mut self, ns: &Arc<HashMap<String, String>>) -> Result<Pred, CompileError> {
        if let Some(value) = self.cursor.parse_int() {
            if value == 0 {
                return Err(self.error("positions start at 1"));
            }
            return Ok(Pred::Position(value));
        }

        let path = self.parse_path(ns)?;
        // A leading '-' parses as a name byte, so a negative position
        // arrives here disguised as a sub-path. Reject it outright rather
        // than letting it select nothing.
        if path.as_str().starts_with('-') && path.as_str().parse::<i64>().is_ok() {
            return Err(self.error("positions must be positive"));
        }

        if self.cursor.skip_byte(b'=') {
            match self.cursor.parse_literal() {
                Ok(Some(literal)) => Ok(Pred::Equals(path, literal.to_string())),
                Ok(None) => Err(self.error("expected a literal string")),
                Err(msg) => Err(self.error(msg)),
            }
        } else {
            Ok(Pred::Exists(path))
        }
    }
}

/// Collapses a single-operand conjunction/disjunction to its operand.
fn collapse(mut vals: Vec<Pred>, wrap: fn(Vec<Pred>) -> Pred) -> Pred {
    if vals.len() == 1 {
        vals.remove(0)
    } else {
        wrap(vals)
    }
}

/// Splits `prefix:local` at the first colon. A missing or trailing colon
/// means no prefix, and the name is kept whole.
fn extract_prefix(full: &str) -> (&str, &str) {
    match full.find(':') {
        Some(i) if i + 1 < full.len() => (&full[..i], &full[i + 1..]),
        _ => ("", full),
    }
}
