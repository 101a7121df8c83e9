//! # flatpath
//!
//! An XPath-subset query engine over a flat, depth-first XML document
//! model. Documents are parsed into a single contiguous node array with
//! index-based navigation links; path expressions compile into immutable,
//! shareable [`Path`] values whose evaluation is a lazy, allocation-free
//! walk over that array.
//!
//! ## Quick Start
//!
//! ```
//! use flatpath::{compile, Document};
//!
//! let doc = Document::parse_str(
//!     r#"<library><book id="1"><title>Dune</title></book></library>"#,
//! ).unwrap();
//! let title = compile("/library/book/title").unwrap();
//! assert_eq!(title.string_value(doc.root()), Some("Dune".to_string()));
//! ```

pub mod error;
pub mod parser;
pub mod path;
pub mod tree;

// Re-export primary types at the crate root for convenience.
pub use error::ParseError;
pub use path::{compile, compile_ns, CompileError, Iter, Path};
pub use tree::{Document, Node, NodeKind, QName};
