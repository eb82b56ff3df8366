//! Frame elements and their load pipeline
//!
//! A [`FrameElement`] is an `<iframe>` or `<frame>` seen from the loading side:
//! it knows its owner document, its resource loader, and its `src`/`srcdoc`.
//! [`FrameRequestProcessor`] prefers inline `srcdoc` markup and falls back to
//! fetching `src`. A [`Frame`] bundles the element with its processor.

use crate::context::{BrowsingContext, ContextConfig};
use crate::error::{FrameLoadError, LoadError};
use crate::events::{EventBus, LoadEvent};
use crate::loader::{ResourceLoader, ResourceRequest};
use crate::processor::{
    ContentSource, LoadCore, LoadOutcome, ProcessRequest, ProcessorState, RequestProcessor,
};
use async_trait::async_trait;
use dom::{Document, DomError, NodeId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::{broadcast, watch};
use url::Url;

/// What the frame pipeline needs from its element
pub trait FrameHost: Send + Sync {
    /// Document the element belongs to, if it is still alive
    fn owner_document(&self) -> Option<Arc<Document>>;

    fn resource_loader(&self) -> Option<Arc<dyn ResourceLoader>>;

    /// Inline markup available without a fetch
    fn static_content(&self) -> Option<String>;
}

pub struct FrameRequestProcessor {
    host: Arc<dyn FrameHost>,
    core: LoadCore,
}

impl FrameRequestProcessor {
    /// `None` when the host has no owner document or no resource loader
    pub fn create(host: Arc<dyn FrameHost>, config: ContextConfig) -> Option<Self> {
        host.owner_document()?;
        let loader = host.resource_loader()?;
        Some(Self {
            host,
            core: LoadCore::new(loader, config),
        })
    }

    pub fn context(&self) -> &BrowsingContext {
        self.core.context()
    }

    fn decide(&self, mut request: ResourceRequest) -> Result<ContentSource, FrameLoadError> {
        let owner = self
            .host
            .owner_document()
            .ok_or(FrameLoadError::Unavailable)?;

        match self.host.static_content() {
            Some(markup) => Ok(ContentSource::Static {
                markup,
                base: owner.url().clone(),
            }),
            None => {
                if request.referer.is_none() {
                    request.referer = Some(owner.url().clone());
                }
                Ok(ContentSource::Network(request))
            }
        }
    }
}

#[async_trait]
impl ProcessRequest for FrameRequestProcessor {
    async fn process(&self, request: ResourceRequest) -> Result<LoadOutcome, FrameLoadError> {
        let source = self.decide(request)?;
        self.core.run(source).await
    }

    fn cancel(&self) {
        self.core.cancel()
    }

    fn state(&self) -> ProcessorState {
        self.core.state()
    }

    fn last_loaded_document(&self) -> Option<Arc<Document>> {
        self.core.context().active_document()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Arc<Document>>> {
        self.core.context().subscribe()
    }

    fn events(&self) -> &EventBus {
        self.core.events()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    IFrame,
    Frame,
}

impl FrameKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case("iframe") {
            Some(FrameKind::IFrame)
        } else if tag.eq_ignore_ascii_case("frame") {
            Some(FrameKind::Frame)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct FrameAttributes {
    src: Option<String>,
    srcdoc: Option<String>,
}

/// Frame-capable element
pub struct FrameElement {
    kind: FrameKind,
    owner: Weak<Document>,
    loader: Option<Arc<dyn ResourceLoader>>,
    attributes: RwLock<FrameAttributes>,
}

impl FrameElement {
    pub fn new(
        kind: FrameKind,
        owner: &Arc<Document>,
        loader: Option<Arc<dyn ResourceLoader>>,
    ) -> Self {
        Self {
            kind,
            owner: Arc::downgrade(owner),
            loader,
            attributes: RwLock::new(FrameAttributes::default()),
        }
    }

    /// Frame element for an `<iframe>` or `<frame>` node of `owner`
    pub fn from_node(
        owner: &Arc<Document>,
        node: NodeId,
        loader: Option<Arc<dyn ResourceLoader>>,
    ) -> dom::Result<Self> {
        let dom_node = owner.node(node)?;
        let kind = dom_node
            .tag_name()
            .and_then(FrameKind::from_tag)
            .ok_or_else(|| DomError::InvalidNodeType {
                expected: "iframe or frame".to_string(),
                actual: dom_node.node_name.clone(),
            })?;

        let element = Self::new(kind, owner, loader);
        element.set_src(dom_node.attr("src"));
        element.set_srcdoc(dom_node.attr("srcdoc"));
        Ok(element)
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn src(&self) -> Option<String> {
        self.read().src.clone()
    }

    pub fn srcdoc(&self) -> Option<String> {
        self.read().srcdoc.clone()
    }

    pub fn set_src(&self, src: Option<&str>) {
        self.write().src = src.map(String::from);
    }

    pub fn set_srcdoc(&self, srcdoc: Option<&str>) {
        self.write().srcdoc = srcdoc.map(String::from);
    }

    /// `src` resolved against the owner's base URL, `about:blank` when
    /// missing, empty or unresolvable
    pub fn src_url(&self) -> Result<Url, url::ParseError> {
        let resolved = self.owner.upgrade().and_then(|owner| {
            let src = self.src()?;
            let src = src.trim();
            if src.is_empty() {
                return None;
            }
            owner.resolve_url(src)
        });
        resolved.map_or_else(|| Url::parse("about:blank"), Ok)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, FrameAttributes> {
        self.attributes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FrameAttributes> {
        self.attributes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameHost for FrameElement {
    fn owner_document(&self) -> Option<Arc<Document>> {
        self.owner.upgrade()
    }

    fn resource_loader(&self) -> Option<Arc<dyn ResourceLoader>> {
        self.loader.clone()
    }

    /// Only iframes carry `srcdoc`
    fn static_content(&self) -> Option<String> {
        match self.kind {
            FrameKind::IFrame => self.srcdoc(),
            FrameKind::Frame => None,
        }
    }
}

/// Frame element plus its load pipeline
pub struct Frame {
    element: Arc<FrameElement>,
    processor: Option<RequestProcessor>,
}

impl Frame {
    pub fn new(element: FrameElement, config: ContextConfig) -> Self {
        let element = Arc::new(element);
        let host: Arc<dyn FrameHost> = element.clone();
        let processor = FrameRequestProcessor::create(host, config).map(RequestProcessor::Frame);
        if processor.is_none() {
            tracing::debug!("Frame has no owner document or loader; loading disabled");
        }
        Self { element, processor }
    }

    pub fn element(&self) -> &FrameElement {
        &self.element
    }

    pub fn processor(&self) -> Option<&RequestProcessor> {
        self.processor.as_ref()
    }

    /// Load `srcdoc`, or `src` when there is none
    pub async fn load(&self) -> Result<LoadOutcome, FrameLoadError> {
        let processor = self.processor.as_ref().ok_or(FrameLoadError::Unavailable)?;
        let url = self.element.src_url().map_err(LoadError::from)?;
        processor.process(ResourceRequest::new(url)).await
    }

    /// Last published document of the nested browsing context
    pub fn content_document(&self) -> Option<Arc<Document>> {
        self.processor
            .as_ref()
            .and_then(|processor| processor.last_loaded_document())
    }

    pub fn events(&self) -> Option<broadcast::Receiver<LoadEvent>> {
        self.processor
            .as_ref()
            .map(|processor| processor.events().subscribe())
    }
}
