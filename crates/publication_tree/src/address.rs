//! Composite event addresses
//!
//! Every node in a publication is keyed by its NIP-33 address,
//! `kind:pubkey:d-tag`. The same string appears in `a` tags of index events,
//! so parsing here is the only gate between wire data and the node store.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::is_index_kind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address '{0}': expected kind:pubkey:dtag")]
    InvalidFormat(String),

    #[error("invalid kind: {0}")]
    InvalidKind(String),

    #[error("invalid pubkey: {0}")]
    InvalidPubkey(String),

    #[error("missing d-tag")]
    MissingDTag,
}

/// Address of a replaceable publication event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventAddress {
    pub kind: u32,
    pub pubkey: [u8; 32],
    pub dtag: String,
}

impl EventAddress {
    pub fn new(kind: u32, pubkey: [u8; 32], dtag: impl Into<String>) -> Self {
        Self {
            kind,
            pubkey,
            dtag: dtag.into(),
        }
    }

    /// Parse an `a` tag value. The d-tag is everything after the second
    /// colon, so it may contain colons itself.
    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let mut parts = value.splitn(3, ':');
        let (Some(kind), Some(pubkey_hex), Some(dtag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AddressError::InvalidFormat(value.to_string()));
        };

        let kind = kind
            .parse::<u32>()
            .map_err(|_| AddressError::InvalidKind(kind.to_string()))?;

        Ok(Self {
            kind,
            pubkey: parse_pubkey(pubkey_hex)?,
            dtag: non_empty_dtag(dtag)?,
        })
    }

    /// Build an address from the decomposed fields of an event
    pub fn from_parts(kind: u32, pubkey_hex: &str, dtag: &str) -> Result<Self, AddressError> {
        Ok(Self {
            kind,
            pubkey: parse_pubkey(pubkey_hex)?,
            dtag: non_empty_dtag(dtag)?,
        })
    }

    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.pubkey)
    }

    /// Whether the address names an index event. The referenced event still
    /// needs at least one child to become a branch.
    pub fn is_index(&self) -> bool {
        is_index_kind(self.kind)
    }
}

fn parse_pubkey(pubkey_hex: &str) -> Result<[u8; 32], AddressError> {
    if pubkey_hex.len() != 64 {
        return Err(AddressError::InvalidPubkey(pubkey_hex.to_string()));
    }

    let mut pubkey = [0u8; 32];
    hex::decode_to_slice(pubkey_hex, &mut pubkey)
        .map_err(|_| AddressError::InvalidPubkey(pubkey_hex.to_string()))?;
    Ok(pubkey)
}

fn non_empty_dtag(dtag: &str) -> Result<String, AddressError> {
    if dtag.is_empty() {
        return Err(AddressError::MissingDTag);
    }
    Ok(dtag.to_string())
}

impl fmt::Display for EventAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey_hex(), self.dtag)
    }
}

impl FromStr for EventAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for EventAddress {
    type Error = AddressError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}
