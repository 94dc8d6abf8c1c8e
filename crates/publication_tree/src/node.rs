//! Materialized tree nodes
//!
//! A node is what the tree knows about an address once its fetch has
//! settled. Nodes live in the [`NodeStore`](crate::store::NodeStore) arena
//! and refer to each other by address only.

use crate::address::EventAddress;
use crate::event::PublicationEvent;

/// Shape of a node, decided once from its event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// An index event that declares at least one child
    Branch,
    /// Anything else, including indices without children and failed fetches
    Leaf,
}

impl NodeType {
    /// Classify an event by the container rule
    pub fn of(event: &PublicationEvent) -> Self {
        if event.is_container() {
            NodeType::Branch
        } else {
            NodeType::Leaf
        }
    }
}

/// Resolution status of a materialized node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Fetched (or supplied) and stored
    Resolved,
    /// The network had no event for this address. Terminal.
    Error,
}

#[derive(Debug, Clone)]
pub struct PublicationTreeNode {
    pub node_type: NodeType,

    pub status: NodeStatus,

    pub address: EventAddress,

    /// Address of the owning node (None for root)
    pub parent: Option<EventAddress>,

    /// Child cells in a-tag order. Each address is a key into the store and
    /// may still be deferred.
    pub children: Vec<EventAddress>,

    /// `title` tag of the event, if any
    pub title: Option<String>,

    /// Position within parent
    pub order: usize,
}

impl PublicationTreeNode {
    /// Create a resolved node for an event
    pub fn resolved(
        event: &PublicationEvent,
        address: EventAddress,
        parent: Option<EventAddress>,
        order: usize,
    ) -> Self {
        Self {
            node_type: NodeType::of(event),
            status: NodeStatus::Resolved,
            address,
            parent,
            children: Vec::new(),
            title: event.title().map(String::from),
            order,
        }
    }

    /// Create the placeholder left behind by a failed fetch
    pub fn error(address: EventAddress, parent: Option<EventAddress>, order: usize) -> Self {
        Self {
            node_type: NodeType::Leaf,
            status: NodeStatus::Error,
            address,
            parent,
            children: Vec::new(),
            title: None,
            order,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.node_type == NodeType::Leaf
    }

    pub fn is_branch(&self) -> bool {
        self.node_type == NodeType::Branch
    }

    pub fn is_resolved(&self) -> bool {
        self.status == NodeStatus::Resolved
    }

    pub fn is_error(&self) -> bool {
        self.status == NodeStatus::Error
    }

    /// Index of `address` among this node's children
    pub fn child_position(&self, address: &EventAddress) -> Option<usize> {
        self.children.iter().position(|child| child == address)
    }

    /// Title for display, or the d-tag when the event has none
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.address.dtag)
    }
}
