//! Nested document loading
//!
//! Turns inline markup or a streamed network response into a fully parsed
//! child document for frame-like elements.
//!
//! # Architecture
//!
//! ```text
//! Frame ─ FrameElement (FrameHost: owner, loader, srcdoc)
//!   └─ RequestProcessor::{Frame, Document}   (ProcessRequest)
//!        └─ LoadCore: decide source → fetch (ResourceLoader) → open
//!             └─ BrowsingContext: decode, parse off-thread, publish Arc<Document>
//! ```
//!
//! 1. **One writer**: only the latest, non-cancelled load publishes
//! 2. **Whole documents**: readers see the previous document or the new one, never a partial one
//! 3. **Explicit outcomes**: failures are returned and broadcast as `LoadEvent::Failed`

pub mod context;
pub mod error;
pub mod events;
pub mod frame;
pub mod loader;
pub mod processor;

pub use context::{BrowsingContext, ContextConfig};
pub use error::{FrameLoadError, LoadError, Result};
pub use events::{EventBus, LoadEvent, SourceKind};
pub use frame::{Frame, FrameElement, FrameHost, FrameKind, FrameRequestProcessor};
pub use loader::{ByteStream, HttpLoader, LoaderConfig, ResourceLoader, ResourceRequest, Response};
pub use processor::{
    ContentSource, DocumentRequestProcessor, LoadOutcome, ProcessRequest, ProcessorState,
    RequestProcessor,
};
