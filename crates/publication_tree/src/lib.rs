//! NKBIP-01 Publication Tree
//!
//! This crate provides a lazily-resolved tree over Nostr curated publications
//! (kinds 30040 and 30041) as defined in NKBIP-01. Only the root event has to
//! be known up front; every section it references is fetched the first time a
//! traversal or lookup reaches it.
//!
//! An index (kind `30040`) is a branch when it references at least one
//! child. Sections of kind `30041`, `30818` or `30023`, indices without
//! children and addresses that could not be fetched are leaves. Leaves that
//! failed to fetch surface during traversal as steps without a value.
//!
//! # Example
//!
//! ```ignore
//! use publication_tree::{PublicationTree, TraversalMode};
//!
//! let mut tree = PublicationTree::new(root_event, Arc::new(fetcher))?;
//!
//! loop {
//!     let step = tree.next(TraversalMode::Leaves).await;
//!     if step.done {
//!         break;
//!     }
//!     match step.value {
//!         Some(section) => println!("{}", section.content),
//!         None => println!("[unavailable]"),
//!     }
//! }
//! ```

pub mod address;
pub mod config;
pub mod constants;
pub mod cursor;
mod error;
pub mod event;
pub mod fetcher;
pub mod lazy;
pub mod node;
pub mod observer;
pub mod store;
pub mod traversal;
pub mod tree;

pub use address::{AddressError, EventAddress};
pub use config::TreeConfig;
pub use constants::*;
pub use cursor::TreeCursor;
pub use error::{Error, Result};
pub use event::PublicationEvent;
pub use fetcher::{AddressFilter, EventFetcher, FetchError, MemoryFetcher};
pub use lazy::Lazy;
pub use node::{NodeStatus, NodeType, PublicationTreeNode};
pub use observer::{ObserverList, Observers, Subscription};
pub use store::NodeStore;
pub use traversal::{Direction, TraversalMode, TraversalStep, TreeWalker};
pub use tree::PublicationTree;
