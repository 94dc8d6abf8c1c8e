//! Example: Read a publication from a relay, section by section
//!
//! Sections are only requested when the traversal reaches them.
//!
//! Run with:
//! cargo run --example read_publication -p publication_tree -- <30040:pubkey:dtag> [relay]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use publication_tree::{
    AddressFilter, EventAddress, EventFetcher, FetchError, PublicationEvent, PublicationTree,
    TraversalMode,
};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const DEFAULT_RELAY: &str = "wss://thecitadel.nostr1.com";

/// Opens a short-lived subscription per address
struct RelayFetcher {
    url: String,
    timeout: Duration,
    subs: AtomicUsize,
}

impl RelayFetcher {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
            subs: AtomicUsize::new(0),
        }
    }

    async fn query(&self, filter: &AddressFilter) -> Result<Option<PublicationEvent>, FetchError> {
        let relay_err = |e: tokio_tungstenite::tungstenite::Error| FetchError::Relay(e.to_string());

        let (ws, _) = connect_async(self.url.as_str()).await.map_err(relay_err)?;
        let (mut write, mut read) = ws.split();

        let sub_id = format!("pubtree-{}", self.subs.fetch_add(1, Ordering::Relaxed));
        let req = json!(["REQ", sub_id, filter]);
        write
            .send(Message::Text(req.to_string()))
            .await
            .map_err(relay_err)?;

        let mut newest: Option<PublicationEvent> = None;
        while let Some(msg) = read.next().await {
            let text = match msg.map_err(relay_err)? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let parsed: Value = serde_json::from_str(&text)?;
            let Some(arr) = parsed.as_array() else {
                continue;
            };

            match arr.first().and_then(Value::as_str) {
                Some("EVENT") => {
                    let Some(raw) = arr.get(2) else { continue };
                    let event: PublicationEvent = serde_json::from_value(raw.clone())?;
                    if !filter.matches(&event) {
                        debug!("Relay sent non-matching event {}", event.id);
                        continue;
                    }
                    if newest.as_ref().map_or(true, |n| event.created_at > n.created_at) {
                        newest = Some(event);
                    }
                }
                Some("EOSE") => break,
                Some("NOTICE") => warn!("Relay notice: {}", arr.get(1).unwrap_or(&serde_json::Value::Null)),
                _ => {}
            }
        }

        let close = json!(["CLOSE", sub_id]);
        if let Err(e) = write.send(Message::Text(close.to_string())).await {
            debug!("Failed to close subscription {}: {}", sub_id, e);
        }

        Ok(newest)
    }
}

impl EventFetcher for RelayFetcher {
    fn fetch_event<'a>(
        &'a self,
        filter: &'a AddressFilter,
    ) -> BoxFuture<'a, Result<Option<PublicationEvent>, FetchError>> {
        async move {
            tokio::time::timeout(self.timeout, self.query(filter))
                .await
                .unwrap_or(Err(FetchError::Timeout))
        }
        .boxed()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("publication_tree=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        eprintln!("usage: read_publication <30040:pubkey:dtag> [relay]");
        std::process::exit(2);
    };
    let address: EventAddress = address.parse()?;
    let relay = args.next().unwrap_or_else(|| DEFAULT_RELAY.to_string());

    let fetcher = Arc::new(RelayFetcher::new(relay.as_str()));
    info!("Fetching root {} from {}", address, relay);

    let Some(root) = fetcher
        .fetch_event(&AddressFilter::for_address(&address))
        .await?
    else {
        eprintln!("{} not found on {}", address, relay);
        std::process::exit(1);
    };

    println!("# {}\n", root.title().unwrap_or("(untitled)"));
    let mut tree = PublicationTree::new(root, fetcher)?;

    let mut sections = 0;
    loop {
        let step = tree.next(TraversalMode::Leaves).await;
        if step.done {
            break;
        }

        sections += 1;
        match step.value {
            Some(section) => {
                println!("## {}", section.title().unwrap_or("(untitled)"));
                let preview: String = section.content.chars().take(200).collect();
                println!("{}\n", preview);
            }
            None => println!("## [section unavailable]\n"),
        }
    }

    info!(
        "Read {} sections ({} resolved, {} unavailable)",
        sections,
        tree.resolved_count(),
        tree.error_count()
    );
    Ok(())
}
