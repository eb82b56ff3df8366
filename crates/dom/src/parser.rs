//! Markup parsing boundary
//!
//! Tokenization and tree construction are delegated to html5ever. The parsed
//! `RcDom` is copied into the document arena and dropped right away, so no
//! reference-counted nodes escape this module.

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::{NodeId, HTML_NAMESPACE};
use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Turns markup into nodes of a given arena
pub trait MarkupParser: Send + Sync {
    /// Parse a complete document. Returns the new document node, which is also
    /// made the arena root.
    fn parse_document(&self, markup: &str, arena: &mut DomArena) -> Result<NodeId>;

    /// Parse `markup` as the contents of a `context` element. Returns a
    /// detached fragment holding the parsed nodes.
    fn parse_fragment(&self, markup: &str, context: &str, arena: &mut DomArena) -> Result<NodeId>;
}

/// HTML5 parser backed by html5ever
#[derive(Debug, Clone, Copy, Default)]
pub struct Html5everParser;

impl MarkupParser for Html5everParser {
    fn parse_document(&self, markup: &str, arena: &mut DomArena) -> Result<NodeId> {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(markup);
        if !dom.errors.is_empty() {
            tracing::debug!("Recovered from {} markup errors", dom.errors.len());
        }

        let document = arena.create_document_node();
        arena.set_root(document)?;
        copy_children(&dom.document, document, arena)?;
        Ok(document)
    }

    fn parse_fragment(&self, markup: &str, context: &str, arena: &mut DomArena) -> Result<NodeId> {
        let context_name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(context.to_ascii_lowercase()),
        );
        let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context_name, Vec::new())
            .one(markup);
        if !dom.errors.is_empty() {
            tracing::debug!(
                "Recovered from {} markup errors in <{}> fragment",
                dom.errors.len(),
                context
            );
        }

        let fragment = arena.create_fragment();
        // html5ever wraps fragment output in a synthetic <html> element
        let wrapper = dom.document.children.borrow().first().cloned();
        if let Some(wrapper) = wrapper {
            copy_children(&wrapper, fragment, arena)?;
        }
        Ok(fragment)
    }
}

/// Copy the children of `source` below `parent`, depth first without recursion
fn copy_children(source: &Handle, parent: NodeId, arena: &mut DomArena) -> Result<()> {
    let mut stack: Vec<(Handle, NodeId)> = source
        .children
        .borrow()
        .iter()
        .rev()
        .map(|child| (child.clone(), parent))
        .collect();

    while let Some((handle, parent)) = stack.pop() {
        let id = match &handle.data {
            NodeData::Document => continue,
            NodeData::Doctype { name, .. } => arena.create_doctype(name.to_string()),
            NodeData::Text { contents } => arena.create_text(contents.borrow().to_string()),
            NodeData::Comment { contents } => arena.create_comment(contents.to_string()),
            NodeData::ProcessingInstruction { target, contents } => {
                arena.create_processing_instruction(target.to_string(), contents.to_string())
            }
            NodeData::Element { name, attrs, .. } => {
                let namespace = name.ns.to_string();
                let id = arena.create_element_ns(Some(&namespace), &name.local);
                let node = arena.get_mut(id)?;
                for attr in attrs.borrow().iter() {
                    let attr_name = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                        None => attr.name.local.to_string(),
                    };
                    node.set_attr(attr_name, attr.value.to_string());
                }
                id
            }
        };

        arena.attach_child(parent, id);
        let mut children: Vec<Handle> = handle.children.borrow().iter().cloned().collect();
        // <template> contents live in a separate fragment; keep them as the
        // template element's children so serialization writes them back
        if let NodeData::Element {
            template_contents, ..
        } = &handle.data
        {
            if let Some(contents) = template_contents.borrow().as_ref() {
                children.extend(contents.children.borrow().iter().cloned());
            }
        }
        stack.extend(children.into_iter().rev().map(|child| (child, id)));
    }
    Ok(())
}
