//! Inline frame example - load an iframe's srcdoc and print the child document

use browser::{ContextConfig, Frame, FrameElement, HttpLoader, LoadOutcome, ResourceLoader};
use dom::{Document, OutlineFormatter, Url};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let markup = r#"<h1>Owner</h1>
        <iframe id="preview" src="/fallback.html"
                srcdoc="<p class=intro>Hello from <a href=docs/>srcdoc</a></p>"></iframe>"#;
    let owner = Arc::new(Document::parse(markup, Url::parse("https://example.com/")?)?);

    let iframe = owner
        .query(owner.root())
        .get_element_by_id("preview")
        .ok_or("iframe not found")?;

    let loader: Arc<dyn ResourceLoader> = Arc::new(HttpLoader::new()?);
    let frame = Frame::new(
        FrameElement::from_node(&owner, iframe, Some(loader))?,
        ContextConfig::default(),
    );

    let mut events = frame.events().ok_or("frame cannot load")?;
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("Event: {:?}", event);
        }
    });

    match frame.load().await? {
        LoadOutcome::Published(child) => {
            println!("Child document at {}", child.url());
            println!("{}", child.to_markup(child.root(), &OutlineFormatter::new())?);

            if let Some(link) = child.query(child.root()).query_selector("a[href]")? {
                let href = child.node(link)?.attr("href").unwrap_or_default();
                println!("Link resolves to {:?}", child.resolve_url(href));
            }
        }
        LoadOutcome::Superseded => println!("Load superseded"),
    }

    Ok(())
}
