//! Publication events
//!
//! The content units of a publication are ordinary Nostr events. Only a few
//! tags matter to the tree: `d` (local identifier), `a` (child references, in
//! reading order) and `title`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::address::{AddressError, EventAddress};
use crate::constants::{is_index_kind, CHILD_TAG, DTAG, TITLE_TAG};

/// A Nostr event as delivered by a relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicationEvent {
    /// 32-bytes hex sha256 of the serialized event data
    pub id: String,
    /// 32-bytes hex-encoded public key of the event creator
    pub pubkey: String,
    /// unix timestamp in seconds
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Not checked by the tree
    #[serde(default)]
    pub sig: String,
}

impl PublicationEvent {
    /// Build an unsigned event. The id is computed from the NIP-01
    /// serialization so it matches what a relay would report.
    pub fn new(
        kind: u32,
        pubkey: [u8; 32],
        created_at: u64,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
    ) -> Self {
        let mut event = Self {
            id: String::new(),
            pubkey: hex::encode(pubkey),
            created_at,
            kind,
            tags,
            content: content.into(),
            sig: String::new(),
        };
        event.id = event.compute_id();
        event
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Append a tag, recomputing the id
    pub fn with_tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self.id = self.compute_id();
        self
    }

    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }

    /// First value of the first tag named `name`
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.len() >= 2 && tag[0] == name)
            .map(|tag| tag[1].as_str())
    }

    pub fn dtag(&self) -> Option<&str> {
        self.tag_value(DTAG)
    }

    pub fn title(&self) -> Option<&str> {
        self.tag_value(TITLE_TAG)
    }

    /// The address this event is stored under
    pub fn address(&self) -> Result<EventAddress, AddressError> {
        let dtag = self.dtag().ok_or(AddressError::MissingDTag)?;
        EventAddress::from_parts(self.kind, &self.pubkey, dtag)
    }

    /// Raw `a` tag values in declaration order
    pub fn child_refs(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|tag| tag.len() >= 2 && tag[0] == CHILD_TAG)
            .map(|tag| tag[1].as_str())
    }

    /// Parsed child addresses in declaration order. Malformed references
    /// are dropped.
    pub fn child_addresses(&self) -> Vec<EventAddress> {
        self.child_refs()
            .filter_map(|value| match EventAddress::parse(value) {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!("Failed to parse a-tag '{}' in event {}: {}", value, self.id, e);
                    None
                }
            })
            .collect()
    }

    /// An index event with at least one child reference
    pub fn is_container(&self) -> bool {
        is_index_kind(self.kind)
            && self
                .child_refs()
                .any(|value| EventAddress::parse(value).is_ok())
    }
}

impl std::str::FromStr for PublicationEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{KIND_PUBLICATION_CONTENT, KIND_PUBLICATION_INDEX};

    fn index_with_children(children: &[&str]) -> PublicationEvent {
        let mut event = PublicationEvent::new(
            KIND_PUBLICATION_INDEX,
            [0xaa; 32],
            1,
            vec![vec!["d".into(), "book".into()]],
            "",
        );
        for child in children {
            event = event.with_tag(["a", *child]);
        }
        event
    }

    #[test]
    fn test_parse_relay_json() {
        let json = r#"{
            "id": "00",
            "pubkey": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "created_at": 1700000000,
            "kind": 30041,
            "tags": [["d", "intro"], ["title", "Introduction"]],
            "content": "Hello",
            "sig": "ff"
        }"#;
        let event = PublicationEvent::from_json(json).unwrap();

        assert_eq!(event.kind, KIND_PUBLICATION_CONTENT);
        assert_eq!(event.dtag(), Some("intro"));
        assert_eq!(event.title(), Some("Introduction"));
        assert_eq!(event.address().unwrap().to_string(), format!("30041:{}:intro", "a".repeat(64)));
        assert!(!event.is_container());
    }

    #[test]
    fn test_child_addresses_keep_order_and_skip_garbage() {
        let first = format!("30041:{}:one", "b".repeat(64));
        let second = format!("30041:{}:two", "b".repeat(64));
        let event = index_with_children(&[&first, "not-an-address", &second]);

        let children: Vec<String> = event
            .child_addresses()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(children, vec![first, second]);
        assert!(event.is_container());
    }

    #[test]
    fn test_index_without_children_is_not_container() {
        assert!(!index_with_children(&[]).is_container());
    }

    #[test]
    fn test_missing_dtag() {
        let event = PublicationEvent::new(KIND_PUBLICATION_CONTENT, [1; 32], 0, vec![], "x");
        assert_eq!(event.address(), Err(AddressError::MissingDTag));
    }

    #[test]
    fn test_id_tracks_tags() {
        let event = PublicationEvent::new(KIND_PUBLICATION_CONTENT, [1; 32], 0, vec![], "x");
        let tagged = event.clone().with_tag(["d", "x"]);
        assert_eq!(event.id.len(), 64);
        assert_ne!(event.id, tagged.id);
        assert_eq!(tagged.id, tagged.compute_id());
    }
}
