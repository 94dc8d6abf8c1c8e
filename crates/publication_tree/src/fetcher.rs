//! Network fetch boundary
//!
//! The tree never talks to relays itself. It hands an [`AddressFilter`] to an
//! [`EventFetcher`] and gets back zero or one event. Connection handling,
//! relay selection and retries belong to the implementor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::address::EventAddress;
use crate::event::PublicationEvent;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("relay error: {0}")]
    Relay(String),

    #[error("fetch timed out")]
    Timeout,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A NIP-01 filter narrowed to replaceable-event addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressFilter {
    pub kinds: Vec<u32>,
    pub authors: Vec<String>,
    #[serde(rename = "#d")]
    pub dtags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl AddressFilter {
    /// Filter matching exactly one address
    pub fn for_address(address: &EventAddress) -> Self {
        Self {
            kinds: vec![address.kind],
            authors: vec![address.pubkey_hex()],
            dtags: vec![address.dtag.clone()],
            limit: Some(1),
        }
    }

    /// Whether an event satisfies every clause of the filter
    pub fn matches(&self, event: &PublicationEvent) -> bool {
        self.kinds.contains(&event.kind)
            && self.authors.iter().any(|a| a == &event.pubkey)
            && event
                .dtag()
                .is_some_and(|d| self.dtags.iter().any(|f| f == d))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Resolves a filter to at most one event
pub trait EventFetcher: Send + Sync + 'static {
    fn fetch_event<'a>(
        &'a self,
        filter: &'a AddressFilter,
    ) -> BoxFuture<'a, Result<Option<PublicationEvent>, FetchError>>;
}

/// Fetcher backed by an in-process map. Counts requests so callers can
/// observe memoization.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    events: RwLock<HashMap<EventAddress, PublicationEvent>>,
    requests: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = PublicationEvent>) -> Self {
        let fetcher = Self::new();
        for event in events {
            fetcher.insert(event);
        }
        fetcher
    }

    /// Store an event under its own address. Events without a valid
    /// address are ignored.
    pub fn insert(&self, event: PublicationEvent) -> bool {
        let Ok(address) = event.address() else {
            return false;
        };
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address, event);
        true
    }

    pub fn remove(&self, address: &EventAddress) -> Option<PublicationEvent> {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address)
    }

    /// Number of fetches served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn lookup(&self, filter: &AddressFilter) -> Option<PublicationEvent> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        events
            .values()
            .filter(|event| filter.matches(event))
            .max_by_key(|event| event.created_at)
            .cloned()
    }
}

impl EventFetcher for MemoryFetcher {
    fn fetch_event<'a>(
        &'a self,
        filter: &'a AddressFilter,
    ) -> BoxFuture<'a, Result<Option<PublicationEvent>, FetchError>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        trace!("memory fetch {}", filter.to_json());
        future::ready(Ok(self.lookup(filter))).boxed()
    }
}
