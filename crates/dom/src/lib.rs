//! Document tree core
//!
//! Arena-backed node trees with cached element collections, CSS selector
//! queries, shadow roots and HTML parsing/serialization.
//!
//! ## Core Design
//!
//! ```text
//! markup → MarkupParser → DomArena (owned, NodeId = u32) → Document
//!                                                            ↓
//!                    ElementCollection / StyleSheetList (cached per generation)
//!                    Query<SelectorEngine>  ·  MarkupFormatter
//! ```
//!
//! Every node belongs to exactly one document arena. Structural mutations bump
//! the arena generation; cached views older than the current generation are
//! rebuilt on their next access.

pub mod arena;
pub mod collection;
pub mod document;
pub mod error;
pub mod parser;
pub mod query;
pub mod selector;
pub mod serializer;
pub mod shadow;
pub mod types;
pub mod utils;

pub use arena::DomArena;
pub use collection::ElementCollection;
pub use document::Document;
pub use error::{DomError, Result};
pub use parser::{Html5everParser, MarkupParser};
pub use query::Query;
pub use selector::{CssSelectorEngine, SelectorEngine, SelectorError};
pub use serializer::{
    HtmlFormatter, JsonFormatter, MarkupFormatter, OutlineFormatter, SerializerConfig,
};
pub use shadow::{ShadowRoot, StyleSheet, StyleSheetList, StyleSheetSource};
pub use types::*;
pub use url::Url;
