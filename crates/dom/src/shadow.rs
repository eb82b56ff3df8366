//! Shadow roots and the style sheets they own
//!
//! A `ShadowRoot` is a handle: the fragment node, its host and its mode. The
//! nodes live in the host's document, so every operation takes the document
//! explicitly. Host and mode are copied out of the arena at attach time and
//! never change afterwards.

use crate::arena::DomArena;
use crate::collection::{ElementCollection, Materialized};
use crate::document::Document;
use crate::error::Result;
use crate::query::Query;
use crate::selector::SelectorError;
use crate::serializer::MarkupFormatter;
use crate::types::{DomNode, NodeId, ShadowRootMode};
use crate::utils;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowRoot {
    node: NodeId,
    host: NodeId,
    mode: ShadowRootMode,
}

impl ShadowRoot {
    pub(crate) fn from_node(node: &DomNode) -> Option<Self> {
        Some(Self {
            node: node.node_id(),
            host: node.host_id()?,
            mode: node.shadow_root_mode()?,
        })
    }

    /// The fragment node backing this shadow root
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn mode(&self) -> ShadowRootMode {
        self.mode
    }

    pub fn style_sheets(&self, doc: &Document) -> Arc<StyleSheetList> {
        doc.style_sheets(self.node)
    }

    /// Element children
    pub fn children(&self, doc: &Document) -> Arc<ElementCollection> {
        doc.elements(self.node, false)
    }

    /// Every element in the shadow tree, document order
    pub fn elements(&self, doc: &Document) -> Arc<ElementCollection> {
        doc.elements(self.node, true)
    }

    pub fn child_element_count(&self, doc: &Document) -> usize {
        self.children(doc).len()
    }

    pub fn first_element_child(&self, doc: &Document) -> Option<NodeId> {
        self.children(doc).first()
    }

    pub fn last_element_child(&self, doc: &Document) -> Option<NodeId> {
        self.children(doc).last()
    }

    pub fn prepend(&self, doc: &mut Document, nodes: &[NodeId]) -> Result<()> {
        doc.prepend_children(self.node, nodes)
    }

    pub fn append(&self, doc: &mut Document, nodes: &[NodeId]) -> Result<()> {
        doc.append_children(self.node, nodes)
    }

    pub fn replace_all(
        &self,
        doc: &mut Document,
        node: Option<NodeId>,
        suppress_events: bool,
    ) -> Result<()> {
        doc.replace_all(self.node, node, suppress_events)
    }

    pub fn text_content(&self, doc: &Document) -> String {
        utils::collect_text(doc.arena(), self.node)
    }

    /// Replace the children with one text node; `None` or `""` clears them
    pub fn set_text_content(&self, doc: &mut Document, text: Option<&str>) -> Result<()> {
        doc.set_text_content(self.node, text)
    }

    pub fn inner_html(&self, doc: &Document) -> Result<String> {
        doc.inner_html(self.node)
    }

    /// Parse `markup` in the context of the host element and replace the children
    pub fn set_inner_html(&self, doc: &mut Document, markup: &str) -> Result<()> {
        doc.set_inner_html(self.node, markup)
    }

    pub fn to_markup(&self, doc: &Document, formatter: &dyn MarkupFormatter) -> Result<String> {
        doc.to_markup(self.node, formatter)
    }

    /// Copies are plain fragments, never shadow roots
    pub fn clone_node(&self, doc: &mut Document, deep: bool) -> Result<NodeId> {
        doc.clone_node(self.node, deep)
    }

    pub fn query<'a>(&self, doc: &'a Document) -> Query<'a> {
        doc.query(self.node)
    }

    pub fn query_selector(
        &self,
        doc: &Document,
        selector: &str,
    ) -> std::result::Result<Option<NodeId>, SelectorError> {
        self.query(doc).query_selector(selector)
    }

    pub fn query_selector_all(
        &self,
        doc: &Document,
        selector: &str,
    ) -> std::result::Result<Vec<NodeId>, SelectorError> {
        self.query(doc).query_selector_all(selector)
    }

    pub fn get_elements_by_class_name(&self, doc: &Document, class_names: &str) -> Vec<NodeId> {
        self.query(doc).get_elements_by_class_name(class_names)
    }

    pub fn get_elements_by_tag_name(&self, doc: &Document, name: &str) -> Vec<NodeId> {
        self.query(doc).get_elements_by_tag_name(name)
    }

    pub fn get_elements_by_tag_name_ns(
        &self,
        doc: &Document,
        namespace: Option<&str>,
        local_name: &str,
    ) -> Vec<NodeId> {
        self.query(doc).get_elements_by_tag_name_ns(namespace, local_name)
    }

    pub fn get_element_by_id(&self, doc: &Document, id: &str) -> Option<NodeId> {
        self.query(doc).get_element_by_id(id)
    }
}

/// Where a style sheet's text comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleSheetSource {
    /// `<style>` contents
    Inline(String),
    /// `<link rel="stylesheet">` target, resolved against the document base
    Linked(Url),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleSheet {
    pub owner: NodeId,
    pub source: StyleSheetSource,
    pub media: Option<String>,
    pub title: Option<String>,
}

/// Read-only list of the sheets declared in a subtree, document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheetList {
    generation: u64,
    sheets: Vec<StyleSheet>,
}

impl StyleSheetList {
    pub(crate) fn collect(arena: &DomArena, root: NodeId, base: &Url) -> Self {
        let mut sheets = Vec::new();

        for node in arena.descendants(root) {
            let source = if node.is_html("style") {
                StyleSheetSource::Inline(utils::collect_text(arena, node.node_id()))
            } else if node.is_html("link") && is_stylesheet_link(node) {
                let href = node.attr("href").unwrap_or("");
                match base.join(href) {
                    Ok(url) => StyleSheetSource::Linked(url),
                    Err(e) => {
                        tracing::debug!("Skipping stylesheet link {:?}: {}", href, e);
                        continue;
                    }
                }
            } else {
                continue;
            };

            sheets.push(StyleSheet {
                owner: node.node_id(),
                source,
                media: node.attr("media").map(String::from),
                title: node.attr("title").map(String::from),
            });
        }

        Self {
            generation: arena.generation(),
            sheets,
        }
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StyleSheet> {
        self.sheets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleSheet> {
        self.sheets.iter()
    }
}

impl Materialized for StyleSheetList {
    fn generation(&self) -> u64 {
        self.generation
    }
}

fn is_stylesheet_link(node: &DomNode) -> bool {
    let has_href = node.attr("href").is_some_and(|href| !href.is_empty());
    let rel = node.attr("rel").unwrap_or("");
    has_href
        && rel
            .split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::HtmlFormatter;

    fn doc_with_host() -> (Document, ShadowRoot) {
        let url = Url::parse("https://example.com/app/").unwrap();
        let mut doc = Document::parse("", url).unwrap();
        let host = doc.create_element("my-widget");
        let body = doc.body().unwrap();
        doc.append_children(body, &[host]).unwrap();
        let shadow = doc.attach_shadow(host, ShadowRootMode::Closed).unwrap();
        (doc, shadow)
    }

    #[test]
    fn test_handle_reports_host_and_mode() {
        let (doc, shadow) = doc_with_host();
        assert_eq!(doc.shadow_root(shadow.host()), Some(shadow));
        assert_eq!(shadow.mode(), ShadowRootMode::Closed);
        assert!(doc.node(shadow.node_id()).unwrap().is_shadow_root());
    }

    #[test]
    fn test_inner_html_uses_host_context() {
        let (mut doc, shadow) = doc_with_host();
        shadow
            .set_inner_html(&mut doc, "<p>a</p><p>b</p>")
            .unwrap();

        assert_eq!(shadow.child_element_count(&doc), 2);
        assert_eq!(shadow.inner_html(&doc).unwrap(), "<p>a</p><p>b</p>");
        assert_eq!(
            shadow.to_markup(&doc, &HtmlFormatter).unwrap(),
            "<p>a</p><p>b</p>"
        );
        assert_eq!(shadow.text_content(&doc), "ab");
    }

    #[test]
    fn test_style_sheets() {
        let (mut doc, shadow) = doc_with_host();
        shadow
            .set_inner_html(
                &mut doc,
                r#"<style media="print">p { color: red }</style>
                   <link rel="Preload stylesheet" href="theme.css" title="Theme">
                   <link rel="icon" href="icon.png">"#,
            )
            .unwrap();

        let sheets = shadow.style_sheets(&doc);
        assert_eq!(sheets.len(), 2);

        let inline = sheets.get(0).unwrap();
        assert_eq!(inline.source, StyleSheetSource::Inline("p { color: red }".into()));
        assert_eq!(inline.media.as_deref(), Some("print"));

        let linked = sheets.get(1).unwrap();
        assert_eq!(
            linked.source,
            StyleSheetSource::Linked(Url::parse("https://example.com/app/theme.css").unwrap())
        );
        assert_eq!(linked.title.as_deref(), Some("Theme"));

        assert!(Arc::ptr_eq(&sheets, &shadow.style_sheets(&doc)));
    }

    #[test]
    fn test_query_surface() {
        let (mut doc, shadow) = doc_with_host();
        shadow
            .set_inner_html(
                &mut doc,
                r#"<ul id="list"><li class="x">1</li><li class="x y">2</li></ul>"#,
            )
            .unwrap();

        let list = shadow.get_element_by_id(&doc, "list").unwrap();
        assert_eq!(shadow.first_element_child(&doc), Some(list));
        assert_eq!(shadow.get_elements_by_tag_name(&doc, "LI").len(), 2);
        assert_eq!(shadow.get_elements_by_class_name(&doc, "y").len(), 1);
        assert_eq!(shadow.query_selector_all(&doc, "#list > .x").unwrap().len(), 2);
        assert_eq!(shadow.elements(&doc).len(), 3);
        let items = shadow.query_selector_all(&doc, "li").unwrap();
        assert_eq!(shadow.query_selector(&doc, "li:nth-child(2)").unwrap(), Some(items[1]));
        assert!(shadow.query_selector(&doc, "li:hover").is_err());
    }
}
