//! Nested browsing context
//!
//! Owned by exactly one pipeline for its whole life. Each `open_*` call
//! builds a brand-new `Document`; publishing it as the context's active
//! document is a single `watch` replace, so readers see either the previous
//! document or the complete new one.

use crate::error::{LoadError, Result};
use crate::loader::{ByteStream, Response};
use dom::{Document, DomError, Html5everParser, MarkupParser};
use encoding_rs::{Encoding, UTF_8};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// Browsing context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Bodies larger than this fail with `LoadError::BodyTooLarge`
    pub max_document_bytes: usize,
    /// Encoding label used when neither a BOM nor a charset is present
    pub fallback_encoding: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 16 * 1024 * 1024,
            fallback_encoding: "utf-8".to_string(),
        }
    }
}

pub struct BrowsingContext {
    id: Uuid,
    config: ContextConfig,
    parser: Arc<dyn MarkupParser>,
    document: watch::Sender<Option<Arc<Document>>>,
}

impl BrowsingContext {
    pub fn new(config: ContextConfig) -> Self {
        Self::with_parser(config, Arc::new(Html5everParser))
    }

    pub fn with_parser(config: ContextConfig, parser: Arc<dyn MarkupParser>) -> Self {
        let (document, _) = watch::channel(None);
        Self {
            id: Uuid::now_v7(),
            config,
            parser,
            document,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Last published document, `None` before the first successful load
    pub fn active_document(&self) -> Option<Arc<Document>> {
        self.document.borrow().clone()
    }

    /// Receiver that wakes on every publication
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Document>>> {
        self.document.subscribe()
    }

    pub(crate) fn publish(&self, document: Arc<Document>) {
        self.document.send_replace(Some(document));
    }

    /// Build a document from a streamed response
    pub async fn open_response(
        &self,
        response: Response,
        cancel: CancellationToken,
    ) -> Result<Document> {
        // No Content responses leave the current document in place
        if matches!(response.status, 204 | 205) {
            return Err(LoadError::Status {
                status: response.status,
                url: response.url,
            });
        }

        let url = response.url.clone();
        let content_type = response
            .content_type()
            .unwrap_or_else(|| "text/html".to_string());
        let charset = response.charset().map(String::from);

        let body = self.read_body(response.into_body(), &cancel).await?;
        let (markup, encoding) = self.decode(&body, charset.as_deref());
        tracing::debug!(
            "Read {} bytes from {} as {} ({})",
            body.len(),
            url,
            encoding.name(),
            content_type
        );

        let document = if is_markup_type(&content_type) {
            self.build(markup, url, &cancel).await?
        } else {
            self.build_text(markup, url, &cancel).await?
        };
        Ok(document
            .with_content_type(content_type)
            .with_character_set(encoding.name()))
    }

    /// Build a document from inline markup; relative references resolve
    /// against `base`
    pub async fn open_markup(
        &self,
        markup: &str,
        base: Url,
        cancel: CancellationToken,
    ) -> Result<Document> {
        self.build(markup.to_string(), base, &cancel).await
    }

    async fn read_body(&self, mut body: ByteStream, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let limit = self.config.max_document_bytes;
        let mut buffer = Vec::new();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LoadError::Cancelled),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            if buffer.len() + chunk.len() > limit {
                return Err(LoadError::BodyTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }

    /// BOM first, then the declared charset, then the configured fallback
    fn decode(&self, body: &[u8], charset: Option<&str>) -> (String, &'static Encoding) {
        let fallback = Encoding::for_label(self.config.fallback_encoding.as_bytes()).unwrap_or(UTF_8);
        let declared = charset
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(fallback);

        let (text, used, had_errors) = declared.decode(body);
        if had_errors {
            tracing::warn!("Malformed {} input replaced with U+FFFD", used.name());
        }
        (text.into_owned(), used)
    }

    async fn build(&self, markup: String, url: Url, cancel: &CancellationToken) -> Result<Document> {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let parser = Arc::clone(&self.parser);
        let document =
            tokio::task::spawn_blocking(move || Document::parse_with(&markup, url, parser)).await??;

        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        Ok(document)
    }

    /// Text document: the body holds a single `<pre>` with the decoded text
    async fn build_text(&self, text: String, url: Url, cancel: &CancellationToken) -> Result<Document> {
        let mut document = self.build(String::new(), url, cancel).await?;
        let body = document
            .body()
            .ok_or_else(|| DomError::InvalidState("empty document has no body".to_string()))?;

        let pre = document.create_element("pre");
        let content = document.create_text(text);
        document.append_children(pre, &[content])?;
        document.append_children(body, &[pre])?;
        Ok(document)
    }
}

/// Content types handed to the markup parser; everything else is shown as text
fn is_markup_type(content_type: &str) -> bool {
    matches!(content_type, "text/html" | "application/xhtml+xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn chunked(url: Url, headers: Vec<(String, String)>, chunks: Vec<&'static [u8]>) -> Response {
        let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c)))).boxed();
        Response::new(url, 200, headers, body)
    }

    #[tokio::test]
    async fn test_open_markup_sets_address() {
        let context = BrowsingContext::new(ContextConfig::default());
        let doc = context
            .open_markup("<p>Hi</p>", url("https://a/"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(doc.url(), &url("https://a/"));
        assert_eq!(doc.query(doc.root()).get_elements_by_tag_name("p").len(), 1);
        assert_eq!(doc.resolve_url("x.png"), Some(url("https://a/x.png")));
    }

    #[tokio::test]
    async fn test_open_response_decodes_declared_charset() {
        let context = BrowsingContext::new(ContextConfig::default());
        let response = chunked(
            url("https://a.test/latin"),
            vec![(
                "content-type".to_string(),
                "text/html; charset=windows-1252".to_string(),
            )],
            vec![b"<p>caf", b"\xe9</p>"],
        );

        let doc = context
            .open_response(response, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(doc.character_set(), "windows-1252");
        assert_eq!(doc.content_type(), "text/html");
        assert_eq!(doc.text_content(doc.body().unwrap()).unwrap(), "café");
    }

    #[tokio::test]
    async fn test_plain_text_is_not_parsed_as_markup() {
        let context = BrowsingContext::new(ContextConfig::default());
        let response = Response::from_bytes(
            url("file:///tmp/notes.txt"),
            200,
            "text/plain",
            "<b>not bold</b> & done",
        );

        let doc = context
            .open_response(response, CancellationToken::new())
            .await
            .unwrap();
        let query = doc.query(doc.root());
        assert!(query.get_elements_by_tag_name("b").is_empty());
        let pre = query.query_selector("body > pre").unwrap().unwrap();
        assert_eq!(doc.text_content(pre).unwrap(), "<b>not bold</b> & done");
        assert_eq!(doc.content_type(), "text/plain");
    }

    #[tokio::test]
    async fn test_bom_overrides_declared_charset() {
        let context = BrowsingContext::new(ContextConfig::default());
        let response = chunked(
            url("https://a.test/"),
            vec![(
                "content-type".to_string(),
                "text/html; charset=windows-1252".to_string(),
            )],
            vec![b"\xef\xbb\xbf<p>\xc3\xa9</p>"],
        );

        let doc = context
            .open_response(response, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(doc.character_set(), "UTF-8");
        assert_eq!(doc.text_content(doc.body().unwrap()).unwrap(), "é");
    }

    #[tokio::test]
    async fn test_body_limit_and_no_content() {
        let context = BrowsingContext::new(ContextConfig {
            max_document_bytes: 8,
            ..ContextConfig::default()
        });
        let response = chunked(url("https://a.test/"), Vec::new(), vec![b"<p>", b"too long"]);
        let err = context
            .open_response(response, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::BodyTooLarge { limit: 8 }));

        let empty = Response::from_bytes(url("https://a.test/"), 204, "text/html", Bytes::new());
        let err = context
            .open_response(empty, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Status { status: 204, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_open() {
        let context = BrowsingContext::new(ContextConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = context
            .open_markup("<p>x</p>", url("https://a/"), token)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled));
        assert!(context.active_document().is_none());
    }
}
