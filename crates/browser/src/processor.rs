//! Request processors
//!
//! A processor turns a request into a published document in two steps:
//! decide where the markup comes from, then open it in the processor's own
//! browsing context. [`RequestProcessor`] is the closed set of variants; the
//! shared open/publish logic lives in [`LoadCore`].
//!
//! Every `process` call takes a new generation and cancels the token of the
//! load before it. Only the latest, non-cancelled generation may publish.

use crate::context::{BrowsingContext, ContextConfig};
use crate::error::{FrameLoadError, LoadError};
use crate::events::{EventBus, LoadEvent, SourceKind};
use crate::frame::FrameRequestProcessor;
use crate::loader::{ResourceLoader, ResourceRequest};
use async_trait::async_trait;
use dom::Document;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pipeline state of the most recent load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Idle,
    ContentDecided,
    Opening,
    Published,
    Failed,
    Superseded,
}

/// Where the markup for a load comes from
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// Inline markup, resolved against `base`
    Static { markup: String, base: Url },
    /// Fetched through the resource loader
    Network(ResourceRequest),
}

impl ContentSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ContentSource::Static { .. } => SourceKind::Static,
            ContentSource::Network(_) => SourceKind::Network,
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            ContentSource::Static { base, .. } => base,
            ContentSource::Network(request) => &request.url,
        }
    }
}

/// How a load that did not fail ended
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Published(Arc<Document>),
    /// A newer load started, or the load was cancelled, before publication
    Superseded,
}

impl LoadOutcome {
    pub fn document(&self) -> Option<&Arc<Document>> {
        match self {
            LoadOutcome::Published(document) => Some(document),
            LoadOutcome::Superseded => None,
        }
    }
}

#[async_trait]
pub trait ProcessRequest: Send + Sync {
    /// Run one load to completion
    async fn process(&self, request: ResourceRequest) -> Result<LoadOutcome, FrameLoadError>;

    /// Cancel the in-flight load, if any, without starting another
    fn cancel(&self);

    fn state(&self) -> ProcessorState;

    /// Last published document, `None` before the first successful load
    fn last_loaded_document(&self) -> Option<Arc<Document>>;

    fn subscribe(&self) -> watch::Receiver<Option<Arc<Document>>>;

    fn events(&self) -> &EventBus;
}

/// Processor variants, selected once at construction
pub enum RequestProcessor {
    /// Frame element: inline content first, then the network
    Frame(FrameRequestProcessor),
    /// Top-level navigation: network only
    Document(DocumentRequestProcessor),
}

impl RequestProcessor {
    fn as_dyn(&self) -> &dyn ProcessRequest {
        match self {
            RequestProcessor::Frame(processor) => processor,
            RequestProcessor::Document(processor) => processor,
        }
    }
}

#[async_trait]
impl ProcessRequest for RequestProcessor {
    async fn process(&self, request: ResourceRequest) -> Result<LoadOutcome, FrameLoadError> {
        self.as_dyn().process(request).await
    }

    fn cancel(&self) {
        self.as_dyn().cancel()
    }

    fn state(&self) -> ProcessorState {
        self.as_dyn().state()
    }

    fn last_loaded_document(&self) -> Option<Arc<Document>> {
        self.as_dyn().last_loaded_document()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Arc<Document>>> {
        self.as_dyn().subscribe()
    }

    fn events(&self) -> &EventBus {
        self.as_dyn().events()
    }
}

/// Navigation processor for a top-level browsing context
pub struct DocumentRequestProcessor {
    core: LoadCore,
}

impl DocumentRequestProcessor {
    pub fn new(loader: Arc<dyn ResourceLoader>, config: ContextConfig) -> Self {
        Self {
            core: LoadCore::new(loader, config),
        }
    }

    pub fn context(&self) -> &BrowsingContext {
        self.core.context()
    }
}

#[async_trait]
impl ProcessRequest for DocumentRequestProcessor {
    async fn process(&self, request: ResourceRequest) -> Result<LoadOutcome, FrameLoadError> {
        self.core.run(ContentSource::Network(request)).await
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

struct Current {
    generation: u64,
    token: CancellationToken,
    state: ProcessorState,
}

/// Open/publish logic shared by every processor variant
pub(crate) struct LoadCore {
    context: BrowsingContext,
    loader: Arc<dyn ResourceLoader>,
    events: EventBus,
    current: Mutex<Current>,
}

impl LoadCore {
    pub(crate) fn new(loader: Arc<dyn ResourceLoader>, config: ContextConfig) -> Self {
        Self {
            context: BrowsingContext::new(config),
            loader,
            events: EventBus::new(),
            current: Mutex::new(Current {
                generation: 0,
                token: CancellationToken::new(),
                state: ProcessorState::Idle,
            }),
        }
    }

    pub(crate) fn context(&self) -> &BrowsingContext {
        &self.context
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn state(&self) -> ProcessorState {
        self.lock().state
    }

    pub(crate) fn cancel(&self) {
        self.lock().token.cancel();
    }

    pub(crate) async fn run(&self, source: ContentSource) -> Result<LoadOutcome, FrameLoadError> {
        let (generation, token) = self.begin();
        let context = self.context.id();
        let url = source.url().clone();

        tracing::debug!("Load {} of context {} started: {}", generation, context, url);
        self.events.publish(LoadEvent::Started {
            context,
            generation,
            url: url.clone(),
        });

        self.set_state(generation, ProcessorState::ContentDecided);
        self.events.publish(LoadEvent::ContentDecided {
            context,
            generation,
            source: source.kind(),
        });

        match self.open(generation, source, &token).await {
            Ok(document) => Ok(self.publish(generation, &token, url, document)),
            Err(_) if self.is_stale(generation, &token) => Ok(self.superseded(generation)),
            Err(err) => {
                tracing::warn!("Load {} of {} failed: {}", generation, url, err);
                self.set_state(generation, ProcessorState::Failed);
                self.events.publish(LoadEvent::Failed {
                    context,
                    generation,
                    url,
                    error: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut current = self.lock();
        current.token.cancel();
        current.generation += 1;
        current.token = CancellationToken::new();
        current.state = ProcessorState::Idle;
        (current.generation, current.token.clone())
    }

    fn is_stale(&self, generation: u64, token: &CancellationToken) -> bool {
        token.is_cancelled() || self.lock().generation != generation
    }

    fn set_state(&self, generation: u64, state: ProcessorState) {
        let mut current = self.lock();
        if current.generation == generation {
            current.state = state;
        }
    }

    async fn open(
        &self,
        generation: u64,
        source: ContentSource,
        token: &CancellationToken,
    ) -> Result<Document, LoadError> {
        match source {
            ContentSource::Static { markup, base } => {
                self.set_state(generation, ProcessorState::Opening);
                self.context.open_markup(&markup, base, token.clone()).await
            }
            ContentSource::Network(request) => {
                let response = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(LoadError::Cancelled),
                    response = self.loader.fetch(request) => response?,
                };
                self.set_state(generation, ProcessorState::Opening);
                self.context.open_response(response, token.clone()).await
            }
        }
    }

    /// Generation check and publication happen under one lock, so a load
    /// started concurrently cannot be overwritten by an older one.
    fn publish(
        &self,
        generation: u64,
        token: &CancellationToken,
        url: Url,
        document: Document,
    ) -> LoadOutcome {
        let mut current = self.lock();
        if token.is_cancelled() || current.generation != generation {
            drop(current);
            return self.superseded(generation);
        }

        let document = Arc::new(document);
        self.context.publish(Arc::clone(&document));
        current.state = ProcessorState::Published;
        drop(current);

        tracing::debug!("Load {} published {}", generation, url);
        self.events.publish(LoadEvent::Published {
            context: self.context.id(),
            generation,
            url,
        });
        LoadOutcome::Published(document)
    }

    fn superseded(&self, generation: u64) -> LoadOutcome {
        tracing::debug!("Load {} superseded", generation);
        self.set_state(generation, ProcessorState::Superseded);
        self.events.publish(LoadEvent::Superseded {
            context: self.context.id(),
            generation,
        });
        LoadOutcome::Superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::loader::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct StaticLoader {
        body: &'static str,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ResourceLoader for StaticLoader {
        async fn fetch(&self, request: ResourceRequest) -> Result<Response> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Response::from_bytes(request.url, 200, "text/html", self.body))
        }
    }

    struct StalledLoader {
        release: Notify,
    }

    #[async_trait]
    impl ResourceLoader for StalledLoader {
        async fn fetch(&self, request: ResourceRequest) -> Result<Response> {
            self.release.notified().await;
            Ok(Response::from_bytes(request.url, 200, "text/html", "<p>late</p>"))
        }
    }

    fn request(s: &str) -> ResourceRequest {
        ResourceRequest::new(Url::parse(s).unwrap())
    }

    #[tokio::test]
    async fn test_document_processor_publishes() {
        let loader = Arc::new(StaticLoader {
            body: "<title>Home</title>",
            fetches: AtomicUsize::new(0),
        });
        let processor = RequestProcessor::Document(DocumentRequestProcessor::new(
            loader.clone(),
            ContextConfig::default(),
        ));
        assert_eq!(processor.state(), ProcessorState::Idle);
        assert!(processor.last_loaded_document().is_none());

        let mut events = processor.events().subscribe();
        let outcome = processor.process(request("https://a.test/")).await.unwrap();

        let published = processor.last_loaded_document().unwrap();
        assert!(Arc::ptr_eq(outcome.document().unwrap(), &published));
        assert_eq!(published.title(), "Home");
        assert_eq!(processor.state(), ProcessorState::Published);
        assert_eq!(loader.fetches.load(Ordering::SeqCst), 1);

        assert!(matches!(events.recv().await, Ok(LoadEvent::Started { .. })));
        assert!(matches!(
            events.recv().await,
            Ok(LoadEvent::ContentDecided {
                source: SourceKind::Network,
                ..
            })
        ));
        assert!(matches!(
            events.recv().await,
            Ok(LoadEvent::Published { generation: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_ends_load_superseded() {
        let processor = Arc::new(DocumentRequestProcessor::new(
            Arc::new(StalledLoader {
                release: Notify::new(),
            }),
            ContextConfig::default(),
        ));

        let task = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move { processor.process(request("https://a.test/")).await }
        });
        while processor.state() != ProcessorState::ContentDecided {
            tokio::task::yield_now().await;
        }

        processor.cancel();
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, LoadOutcome::Superseded));
        assert_eq!(processor.state(), ProcessorState::Superseded);
        assert!(processor.last_loaded_document().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_status_fails_without_publishing() {
        struct NoContent;

        #[async_trait]
        impl ResourceLoader for NoContent {
            async fn fetch(&self, request: ResourceRequest) -> Result<Response> {
                Ok(Response::from_bytes(request.url, 204, "text/html", ""))
            }
        }

        let processor = DocumentRequestProcessor::new(Arc::new(NoContent), ContextConfig::default());
        let err = processor
            .process(request("https://a.test/empty"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FrameLoadError::Load(LoadError::Status { status: 204, .. })
        ));
        assert_eq!(processor.state(), ProcessorState::Failed);
        assert!(processor.last_loaded_document().is_none());
    }
}
