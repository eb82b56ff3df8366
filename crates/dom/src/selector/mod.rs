//! CSS selectors behind `query_selector` and friends.
//!
//! Parsing and matching come from the `selectors` crate; [`ArenaElement`]
//! exposes arena nodes to it. Everything the crate understands without
//! element state works, including `:nth-child()` and `:not()`.
//! State pseudo-classes (`:hover`, `:checked`, ...) and pseudo-elements are
//! rejected at parse time.
//!
//! The query layer only talks to [`SelectorEngine`]; swapping the engine
//! never touches traversal code.

mod element;

pub use element::ArenaElement;

use crate::arena::DomArena;
use crate::types::NodeId;
use cssparser::{CowRcStr, ParseError, ParseErrorKind, ParserInput, SourceLocation, ToCss};
use selectors::matching::{
    matches_selector, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode,
    NeedsSelectorFlags, QuirksMode,
};
use selectors::parser::{ParseRelative, SelectorList, SelectorParseErrorKind};
use selectors::NthIndexCache;
use thiserror::Error;

/// Selector parsing and matching, as seen by the query layer
pub trait SelectorEngine {
    type Selector;
    type Error: std::error::Error + Send + Sync + 'static;

    fn parse(&self, selector: &str) -> Result<Self::Selector, Self::Error>;

    fn matches(&self, arena: &DomArena, element: NodeId, selector: &Self::Selector) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("invalid selector at {line}:{column}: {reason}")]
    Invalid { line: u32, column: u32, reason: String },

    #[error("unsupported pseudo-class or pseudo-element ':{0}'")]
    UnsupportedPseudoClass(String),
}

impl<'i> From<ParseError<'i, SelectorParseErrorKind<'i>>> for SelectorError {
    fn from(err: ParseError<'i, SelectorParseErrorKind<'i>>) -> Self {
        match err.kind {
            ParseErrorKind::Custom(SelectorParseErrorKind::UnsupportedPseudoClassOrElement(
                name,
            )) => SelectorError::UnsupportedPseudoClass(name.to_string()),
            kind => SelectorError::Invalid {
                line: err.location.line,
                column: err.location.column,
                reason: format!("{:?}", kind),
            },
        }
    }
}

/// Identifiers, local names and attribute values in parsed selectors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CssString(pub String);

impl From<&str> for CssString {
    fn from(s: &str) -> Self {
        CssString(s.to_string())
    }
}

impl AsRef<str> for CssString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for CssString {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssString {
    fn to_css<W>(&self, dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        cssparser::serialize_identifier(&self.0, dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorImpl;

impl selectors::SelectorImpl for SelectorImpl {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssString;
    type Identifier = CssString;
    type LocalName = CssString;
    type NamespacePrefix = CssString;
    type NamespaceUrl = ();
    type BorrowedLocalName = str;
    type BorrowedNamespaceUrl = ();
    type NonTSPseudoClass = NonTSPseudoClass;
    type PseudoElement = PseudoElement;
}

/// No state pseudo-classes are supported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonTSPseudoClass {}

impl selectors::parser::NonTSPseudoClass for NonTSPseudoClass {
    type Impl = SelectorImpl;

    fn is_active_or_hover(&self) -> bool {
        match *self {}
    }

    fn is_user_action_state(&self) -> bool {
        match *self {}
    }
}

impl ToCss for NonTSPseudoClass {
    fn to_css<W>(&self, _dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        match *self {}
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoElement {}

impl selectors::parser::PseudoElement for PseudoElement {
    type Impl = SelectorImpl;
}

impl ToCss for PseudoElement {
    fn to_css<W>(&self, _dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        match *self {}
    }
}

struct SelectorParser;

impl<'i> selectors::parser::Parser<'i> for SelectorParser {
    type Impl = SelectorImpl;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_non_ts_pseudo_class(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<NonTSPseudoClass, ParseError<'i, Self::Error>> {
        Err(location.new_custom_error(SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name)))
    }

    fn parse_pseudo_element(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoElement, ParseError<'i, Self::Error>> {
        Err(location.new_custom_error(SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name)))
    }

    fn parse_non_ts_functional_pseudo_class<'t>(
        &self,
        name: CowRcStr<'i>,
        parser: &mut cssparser::Parser<'i, 't>,
    ) -> Result<NonTSPseudoClass, ParseError<'i, Self::Error>> {
        Err(parser.new_custom_error(SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name)))
    }

    fn default_namespace(&self) -> Option<()> {
        None
    }

    fn namespace_for_prefix(&self, _prefix: &CssString) -> Option<()> {
        None
    }
}

/// Built-in engine
#[derive(Debug, Clone, Copy, Default)]
pub struct CssSelectorEngine;

impl SelectorEngine for CssSelectorEngine {
    type Selector = SelectorList<SelectorImpl>;
    type Error = SelectorError;

    fn parse(&self, selector: &str) -> Result<Self::Selector, SelectorError> {
        if selector.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        let mut input = ParserInput::new(selector);
        let mut parser = cssparser::Parser::new(&mut input);
        SelectorList::parse(&SelectorParser, &mut parser, ParseRelative::No)
            .map_err(SelectorError::from)
    }

    fn matches(&self, arena: &DomArena, element: NodeId, selector: &Self::Selector) -> bool {
        let Some(element) = ArenaElement::new(arena, element) else {
            return false;
        };

        let mut nth_index_cache = NthIndexCache::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut nth_index_cache,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            IgnoreNthChildForInvalidation::No,
        );

        selector
            .0
            .iter()
            .any(|selector| matches_selector(selector, 0, None, &element, &mut context))
    }
}
