//! Document - owner of a node arena and the views cached over it
//!
//! Reads take `&Document`, anything that changes the tree takes
//! `&mut Document`. Cached views (element collections, style sheet lists)
//! live in concurrent maps so a shared `Arc<Document>` can serve them from
//! several tasks.

use crate::arena::DomArena;
use crate::collection::{ElementCollection, ViewCache};
use crate::error::{DomError, Result};
use crate::parser::{Html5everParser, MarkupParser};
use crate::query::Query;
use crate::selector::SelectorEngine;
use crate::serializer::{HtmlFormatter, MarkupFormatter};
use crate::shadow::{ShadowRoot, StyleSheetList};
use crate::types::*;
use crate::utils;
use std::fmt;
use std::sync::Arc;
use url::Url;

pub struct Document {
    id: DocumentId,
    url: Url,
    content_type: String,
    character_set: String,
    arena: DomArena,
    root: NodeId,
    parser: Arc<dyn MarkupParser>,
    collections: ViewCache<(NodeId, bool), ElementCollection>,
    style_sheets: ViewCache<NodeId, StyleSheetList>,
}

impl Document {
    /// Empty document (a document node and nothing else)
    pub fn new(url: Url) -> Self {
        Self::with_parser(url, Arc::new(Html5everParser))
    }

    pub fn with_parser(url: Url, parser: Arc<dyn MarkupParser>) -> Self {
        let id = DocumentId::new();
        let mut arena = DomArena::new(id);
        let root = arena.create_document_node();
        Self::assemble(id, url, arena, root, parser)
    }

    /// Parse an HTML document
    pub fn parse(markup: &str, url: Url) -> Result<Self> {
        Self::parse_with(markup, url, Arc::new(Html5everParser))
    }

    pub fn parse_with(markup: &str, url: Url, parser: Arc<dyn MarkupParser>) -> Result<Self> {
        let id = DocumentId::new();
        let mut arena = DomArena::with_capacity(id, markup.len() / 16 + 16);
        let root = parser.parse_document(markup, &mut arena)?;
        Ok(Self::assemble(id, url, arena, root, parser))
    }

    fn assemble(
        id: DocumentId,
        url: Url,
        arena: DomArena,
        root: NodeId,
        parser: Arc<dyn MarkupParser>,
    ) -> Self {
        Self {
            id,
            url,
            content_type: "text/html".to_string(),
            character_set: "UTF-8".to_string(),
            arena,
            root,
            parser,
            collections: ViewCache::new(),
            style_sheets: ViewCache::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_character_set(mut self, character_set: impl Into<String>) -> Self {
        self.character_set = character_set.into();
        self
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Address the document was loaded from
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn character_set(&self) -> &str {
        &self.character_set
    }

    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    /// Direct arena access. Structural changes made here still invalidate
    /// the cached views; attribute edits do not.
    pub fn arena_mut(&mut self) -> &mut DomArena {
        &mut self.arena
    }

    /// The document node
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Result<&DomNode> {
        self.arena.get(id)
    }

    pub fn create_element(&mut self, local_name: &str) -> NodeId {
        self.arena.create_element(local_name)
    }

    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        self.arena.create_text(data)
    }

    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.arena.get_mut(node)?.set_attr(name, value);
        // Style sheet entries read href, rel, media and title
        self.style_sheets.clear();
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<Option<String>> {
        let removed = self.arena.get_mut(node)?.remove_attr(name);
        self.style_sheets.clear();
        Ok(removed)
    }

    /// First element child of the document node
    pub fn document_element(&self) -> Option<NodeId> {
        self.elements(self.root, false).first()
    }

    pub fn head(&self) -> Option<NodeId> {
        self.html_child(|node| node.is_html("head"))
    }

    pub fn body(&self) -> Option<NodeId> {
        self.html_child(|node| node.is_html("body") || node.is_html("frameset"))
    }

    fn html_child(&self, predicate: impl Fn(&DomNode) -> bool) -> Option<NodeId> {
        let html = self.document_element()?;
        if !self.arena.get(html).ok()?.is_html("html") {
            return None;
        }
        self.arena
            .children(html)
            .ok()?
            .into_iter()
            .find(|node| predicate(node))
            .map(|node| node.node_id())
    }

    /// Text of the first `<title>`, whitespace collapsed
    pub fn title(&self) -> String {
        self.arena
            .descendants(self.root)
            .find(|node| node.is_html("title"))
            .map(|node| {
                let text = utils::collect_text(&self.arena, node.node_id());
                utils::strip_and_collapse_whitespace(&text)
            })
            .unwrap_or_default()
    }

    /// First `<base href>` resolved against the document address, else the address
    pub fn base_url(&self) -> Url {
        self.arena
            .descendants(self.root)
            .find(|node| node.is_html("base") && node.attr("href").is_some())
            .and_then(|node| self.url.join(node.attr("href").unwrap_or("")).ok())
            .unwrap_or_else(|| self.url.clone())
    }

    /// Resolve a (possibly relative) reference against the base URL
    pub fn resolve_url(&self, reference: &str) -> Option<Url> {
        self.base_url().join(reference.trim()).ok()
    }

    /// Cached element view under `root`: children, or all descendants when `deep`
    pub fn elements(&self, root: NodeId, deep: bool) -> Arc<ElementCollection> {
        self.collections
            .get_or_build((root, deep), self.arena.generation(), || {
                ElementCollection::materialize(&self.arena, root, deep)
            })
    }

    /// Cached style sheet list of the subtree under `root`
    pub fn style_sheets(&self, root: NodeId) -> Arc<StyleSheetList> {
        self.style_sheets
            .get_or_build(root, self.arena.generation(), || {
                StyleSheetList::collect(&self.arena, root, &self.base_url())
            })
    }

    /// Drop every cached view; the next access recomputes
    pub fn invalidate_collections(&self) {
        self.collections.clear();
        self.style_sheets.clear();
    }

    pub fn query(&self, root: NodeId) -> Query<'_> {
        Query::new(&self.arena, root)
    }

    pub fn query_with<E: SelectorEngine>(&self, root: NodeId, engine: E) -> Query<'_, E> {
        Query::with_engine(&self.arena, root, engine)
    }

    pub fn append_children(&mut self, parent: NodeId, nodes: &[NodeId]) -> Result<()> {
        self.arena.append_children(parent, nodes)
    }

    pub fn prepend_children(&mut self, parent: NodeId, nodes: &[NodeId]) -> Result<()> {
        self.arena.prepend_children(parent, nodes)
    }

    pub fn replace_all(
        &mut self,
        parent: NodeId,
        node: Option<NodeId>,
        suppress_events: bool,
    ) -> Result<()> {
        self.arena.replace_all(parent, node, suppress_events)
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.arena.remove_child(parent, child)
    }

    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> Result<NodeId> {
        self.arena.clone_node(node, deep)
    }

    /// Character data for text-like nodes, concatenated descendant text otherwise
    pub fn text_content(&self, node: NodeId) -> Result<String> {
        let target = self.arena.get(node)?;
        Ok(match target.node_type() {
            NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction => {
                target.node_value.clone()
            }
            _ => utils::collect_text(&self.arena, node),
        })
    }

    /// Containers: replace the children with one text node, or clear them when
    /// `text` is empty or absent. Text-like nodes: replace their data.
    pub fn set_text_content(&mut self, node: NodeId, text: Option<&str>) -> Result<()> {
        let text = text.unwrap_or("");

        match self.arena.get(node)?.node_type() {
            NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction => {
                self.arena.get_mut(node)?.node_value = text.to_string();
                Ok(())
            }
            NodeType::DocumentType => Ok(()),
            _ if text.is_empty() => self.arena.replace_all(node, None, false),
            _ => {
                let text_node = self.arena.create_text(text);
                self.arena.replace_all(node, Some(text_node), false)
            }
        }
    }

    /// Children of `node` serialized as HTML
    pub fn inner_html(&self, node: NodeId) -> Result<String> {
        self.to_markup(node, &HtmlFormatter)
    }

    /// Parse `markup` as the contents of `node` and replace its children.
    /// Shadow roots parse in the context of their host.
    pub fn set_inner_html(&mut self, node: NodeId, markup: &str) -> Result<()> {
        let target = self.arena.get(node)?;
        let context_id = match target.host_id() {
            Some(host) => host,
            None => node,
        };
        let context = self.arena.get(context_id)?;
        if !context.is_element() {
            return Err(DomError::InvalidNodeType {
                expected: NodeType::Element.to_string(),
                actual: target.node_type().to_string(),
            });
        }
        let context_name = context.node_name.clone();

        let fragment = self
            .parser
            .parse_fragment(markup, &context_name, &mut self.arena)?;
        self.arena.replace_all(node, Some(fragment), false)
    }

    /// Children of `node` serialized by `formatter`
    pub fn to_markup(&self, node: NodeId, formatter: &dyn MarkupFormatter) -> Result<String> {
        let children = self.arena.get(node)?.children_ids();
        formatter.format(&self.arena, children)
    }

    pub fn attach_shadow(&mut self, host: NodeId, mode: ShadowRootMode) -> Result<ShadowRoot> {
        let root = self.arena.attach_shadow(host, mode)?;
        ShadowRoot::from_node(self.arena.get(root)?)
            .ok_or_else(|| DomError::InvalidState(format!("node {} is not a shadow root", root)))
    }

    /// Shadow root hosted by `host`, whatever its mode
    pub fn shadow_root(&self, host: NodeId) -> Option<ShadowRoot> {
        let root = self.arena.get(host).ok()?.shadow_root_id()?;
        ShadowRoot::from_node(self.arena.get(root).ok()?)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .field("content_type", &self.content_type)
            .field("character_set", &self.character_set)
            .field("nodes", &self.arena.len())
            .field("generation", &self.arena.generation())
            .field("cached_collections", &self.collections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_document_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Document>();
    }

    #[test]
    fn test_parse_exposes_structure() {
        let doc = Document::parse(
            "<html><head><title>  Hello\n World </title></head><body><p>x</p></body></html>",
            url("https://a.test/dir/page.html"),
        )
        .unwrap();

        let html = doc.document_element().unwrap();
        assert!(doc.node(html).unwrap().is_html("html"));
        assert!(doc.node(doc.head().unwrap()).unwrap().is_html("head"));
        assert!(doc.node(doc.body().unwrap()).unwrap().is_html("body"));
        assert_eq!(doc.title(), "Hello World");
        assert_eq!(doc.node(doc.root()).unwrap().node_type(), NodeType::Document);
        assert_eq!(doc.node(html).unwrap().owner_document(), doc.id());
    }

    #[test]
    fn test_empty_document_has_no_element() {
        let doc = Document::new(url("about:blank"));
        assert_eq!(doc.document_element(), None);
        assert_eq!(doc.body(), None);
        assert_eq!(doc.title(), "");
    }

    #[test]
    fn test_base_url_and_resolution() {
        let doc = Document::parse("<p>no base</p>", url("https://a.test/dir/page.html")).unwrap();
        assert_eq!(doc.base_url(), url("https://a.test/dir/page.html"));
        assert_eq!(doc.resolve_url("img.png"), Some(url("https://a.test/dir/img.png")));

        let doc = Document::parse(
            r#"<head><base href="/static/"></head>"#,
            url("https://a.test/dir/page.html"),
        )
        .unwrap();
        assert_eq!(doc.resolve_url("img.png"), Some(url("https://a.test/static/img.png")));
    }

    #[test]
    fn test_collection_cache_identity_and_invalidation() {
        let mut doc = Document::parse("<ul><li>1</li></ul>", url("https://a.test/")).unwrap();
        let body = doc.body().unwrap();

        let first = doc.elements(body, true);
        let again = doc.elements(body, true);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.len(), 2);

        // A different deep flag is a different cell
        assert!(!Arc::ptr_eq(&first, &doc.elements(body, false)));

        doc.invalidate_collections();
        let reset = doc.elements(body, true);
        assert!(!Arc::ptr_eq(&first, &reset));
        assert_eq!(*first, *reset);

        let li = doc.create_element("li");
        let ul = reset.first().unwrap();
        doc.append_children(ul, &[li]).unwrap();
        let rebuilt = doc.elements(body, true);
        assert!(!Arc::ptr_eq(&reset, &rebuilt));
        assert_eq!(rebuilt.len(), 3);
    }

    #[test]
    fn test_text_content_rules() {
        let mut doc = Document::parse("<div><b>a</b>b</div>", url("https://a.test/")).unwrap();
        let div = doc.query(doc.root()).query_selector("div").unwrap().unwrap();
        assert_eq!(doc.text_content(div).unwrap(), "ab");

        doc.set_text_content(div, Some("plain <text>")).unwrap();
        let children = doc.node(div).unwrap().children_ids().to_vec();
        assert_eq!(children.len(), 1);
        assert!(doc.node(children[0]).unwrap().is_text());
        assert_eq!(doc.inner_html(div).unwrap(), "plain &lt;text&gt;");

        doc.set_text_content(div, Some("")).unwrap();
        assert!(doc.node(div).unwrap().children_ids().is_empty());

        doc.set_text_content(div, Some("again")).unwrap();
        doc.set_text_content(div, None).unwrap();
        assert!(doc.node(div).unwrap().children_ids().is_empty());
    }

    #[test]
    fn test_set_inner_html_replaces_children() {
        let mut doc = Document::parse("<table></table>", url("https://a.test/")).unwrap();
        let body = doc.body().unwrap();
        doc.set_inner_html(body, "<p>one</p><p>two</p>").unwrap();
        assert_eq!(doc.elements(body, false).len(), 2);
        assert_eq!(doc.inner_html(body).unwrap(), "<p>one</p><p>two</p>");

        let text = doc.create_text("t");
        assert!(matches!(
            doc.set_inner_html(text, "<p>x</p>"),
            Err(DomError::InvalidNodeType { .. })
        ));
    }

    #[test]
    fn test_attribute_edits_refresh_style_sheets() {
        let mut doc = Document::parse(
            r#"<link rel="stylesheet" href="a.css">"#,
            url("https://a.test/"),
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(doc.style_sheets(root).len(), 1);

        let link = doc.query(root).query_selector("link").unwrap().unwrap();
        doc.set_attribute(link, "rel", "icon").unwrap();
        assert!(doc.style_sheets(root).is_empty());
    }
}
