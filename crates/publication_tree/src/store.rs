//! Node and event storage for a publication tree
//!
//! The store is the single owner of every node. An address is either
//! *materialized* (a [`PublicationTreeNode`] exists) or *deferred* (only a
//! memoized fetch cell and the parent it was registered under are known).

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use crate::address::EventAddress;
use crate::event::PublicationEvent;
use crate::lazy::Lazy;
use crate::node::{NodeStatus, PublicationTreeNode};

/// Result of a child fetch. `None` means the network had nothing.
pub type Fetched = Option<Arc<PublicationEvent>>;

/// A registered child that has not been forced yet
#[derive(Debug, Clone)]
pub struct DeferredNode {
    pub parent: EventAddress,
    pub order: usize,
    pub cell: Lazy<Fetched>,
}

#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: HashMap<EventAddress, PublicationTreeNode>,
    deferred: HashMap<EventAddress, DeferredNode>,
    events: HashMap<EventAddress, Arc<PublicationEvent>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the address is registered at all
    pub fn contains(&self, address: &EventAddress) -> bool {
        self.nodes.contains_key(address) || self.deferred.contains_key(address)
    }

    pub fn is_materialized(&self, address: &EventAddress) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn is_deferred(&self, address: &EventAddress) -> bool {
        self.deferred.contains_key(address)
    }

    pub fn node(&self, address: &EventAddress) -> Option<&PublicationTreeNode> {
        self.nodes.get(address)
    }

    pub fn event(&self, address: &EventAddress) -> Option<&Arc<PublicationEvent>> {
        self.events.get(address)
    }

    pub fn deferred(&self, address: &EventAddress) -> Option<&DeferredNode> {
        self.deferred.get(address)
    }

    /// Number of registered addresses, materialized or not
    pub fn len(&self) -> usize {
        self.nodes.len() + self.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolved_count(&self) -> usize {
        self.count_status(NodeStatus::Resolved)
    }

    pub fn error_count(&self) -> usize {
        self.count_status(NodeStatus::Error)
    }

    pub fn pending_count(&self) -> usize {
        self.deferred.len()
    }

    /// Deferred addresses, ordered so output is stable between calls
    pub fn pending_addresses(&self) -> Vec<&EventAddress> {
        let mut pending: Vec<_> = self.deferred.keys().collect();
        pending.sort();
        pending
    }

    /// Store a materialized node together with its event. Error nodes must
    /// pass `None`.
    pub fn insert(&mut self, node: PublicationTreeNode, event: Fetched) {
        debug_assert_eq!(node.is_resolved(), event.is_some());
        if let Some(event) = event {
            self.events.insert(node.address.clone(), event);
        }
        self.deferred.remove(&node.address);
        self.nodes.insert(node.address.clone(), node);
    }

    /// Replace the stored event of a resolved node (last fetched wins)
    pub fn replace_event(&mut self, address: &EventAddress, event: Arc<PublicationEvent>) -> bool {
        match self.nodes.get(address) {
            Some(node) if node.is_resolved() => {
                self.events.insert(address.clone(), event);
                true
            }
            _ => false,
        }
    }

    pub fn insert_deferred(&mut self, address: EventAddress, deferred: DeferredNode) {
        self.deferred.insert(address, deferred);
    }

    pub fn take_deferred(&mut self, address: &EventAddress) -> Option<DeferredNode> {
        self.deferred.remove(address)
    }

    /// Append `child` to the children of a materialized `parent`, returning
    /// its position
    pub fn attach_child(&mut self, parent: &EventAddress, child: EventAddress) -> Option<usize> {
        let parent = self.nodes.get_mut(parent)?;
        parent.children.push(child);
        Some(parent.children.len() - 1)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PublicationTreeNode> {
        self.nodes.values()
    }

    fn count_status(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }
}

impl Index<&EventAddress> for NodeStore {
    type Output = PublicationTreeNode;

    /// Panics if the address is not materialized
    fn index(&self, address: &EventAddress) -> &Self::Output {
        &self.nodes[address]
    }
}
