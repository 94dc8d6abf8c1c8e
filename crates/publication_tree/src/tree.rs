//! Publication Tree data structure
//!
//! A tree structure for navigating NKBIP-01 publications. Only the root is
//! known up front; every other node is registered as a deferred cell when its
//! parent resolves and is fetched the first time something walks into it.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, trace, warn};

use crate::address::EventAddress;
use crate::config::TreeConfig;
use crate::constants::is_content_kind;
use crate::error::{Error, Result};
use crate::event::PublicationEvent;
use crate::fetcher::{AddressFilter, EventFetcher};
use crate::lazy::Lazy;
use crate::node::{NodeType, PublicationTreeNode};
use crate::observer::{Observers, Subscription};
use crate::store::{DeferredNode, Fetched, NodeStore};
use crate::traversal::{TraversalMode, TraversalStep, TreeWalker};

/// A lazily materialized NKBIP-01 publication
///
/// All mutation goes through `&mut self`, so a tree is walked by one caller
/// at a time. Independent positions can be kept with [`TreeWalker`] or
/// [`TreeCursor`](crate::TreeCursor) values.
pub struct PublicationTree<F: EventFetcher> {
    root: EventAddress,
    root_event: Arc<PublicationEvent>,
    store: NodeStore,
    fetcher: Arc<F>,
    config: TreeConfig,
    observers: Observers,
    bookmark: Option<EventAddress>,
    walker: TreeWalker,
}

impl<F: EventFetcher> PublicationTree<F> {
    /// Create a new publication tree from a root event
    pub fn new(root_event: PublicationEvent, fetcher: Arc<F>) -> Result<Self> {
        Self::with_config(root_event, fetcher, TreeConfig::default())
    }

    /// Create a tree with explicit tunables
    pub fn with_config(
        root_event: PublicationEvent,
        fetcher: Arc<F>,
        config: TreeConfig,
    ) -> Result<Self> {
        let root = root_event.address()?;
        let root_event = Arc::new(root_event);

        let mut tree = Self {
            root: root.clone(),
            root_event: Arc::clone(&root_event),
            store: NodeStore::new(),
            fetcher,
            config,
            observers: Observers::default(),
            bookmark: None,
            walker: TreeWalker::new(),
        };

        let node = PublicationTreeNode::resolved(&root_event, root.clone(), None, 0);
        let is_branch = node.is_branch();
        tree.store.insert(node, Some(Arc::clone(&root_event)));
        if is_branch {
            tree.register_children(&root, &root_event);
        }

        info!(
            "Publication tree for {} created with {} pending sections",
            root,
            tree.store.pending_count()
        );
        Ok(tree)
    }

    // --- Accessors ---

    /// Get the root address
    pub fn root_address(&self) -> &EventAddress {
        &self.root
    }

    /// Get the root node
    pub fn root(&self) -> &PublicationTreeNode {
        &self.store[&self.root]
    }

    /// The root event. Supplied by the caller, so always resolved.
    pub fn root_event(&self) -> Arc<PublicationEvent> {
        Arc::clone(&self.root_event)
    }

    /// A materialized node
    pub fn node(&self, address: &EventAddress) -> Option<&PublicationTreeNode> {
        self.store.node(address)
    }

    /// A cached event, without fetching
    pub fn event(&self, address: &EventAddress) -> Option<&Arc<PublicationEvent>> {
        self.store.event(address)
    }

    /// Get the underlying node store
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Get the tree configuration
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Get the fetcher shared with every deferred cell
    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    /// Registered addresses, materialized or deferred
    pub fn node_count(&self) -> usize {
        self.store.len()
    }

    /// Get the number of nodes holding an event
    pub fn resolved_count(&self) -> usize {
        self.store.resolved_count()
    }

    /// Get the number of addresses that could not be fetched
    pub fn error_count(&self) -> usize {
        self.store.error_count()
    }

    /// Get the number of registered addresses not fetched yet
    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    /// Get the addresses not fetched yet, sorted
    pub fn pending_addresses(&self) -> Vec<&EventAddress> {
        self.store.pending_addresses()
    }

    /// Depth of a materialized node (root is 0)
    pub fn depth(&self, address: &EventAddress) -> Option<usize> {
        let mut node = self.store.node(address)?;
        let mut depth = 0;
        while let Some(parent) = &node.parent {
            node = self.store.node(parent)?;
            depth += 1;
        }
        Some(depth)
    }

    // --- Mutators ---

    /// Add a fully fetched event under an already resolved parent
    ///
    /// An address that is already materialized keeps its place in the tree;
    /// only its stored event is replaced. A deferred address is resolved in
    /// place with the supplied event. Never fetches.
    pub fn add_event(
        &mut self,
        event: PublicationEvent,
        parent_event: &PublicationEvent,
    ) -> Result<()> {
        let parent = parent_event.address()?;
        let address = event.address()?;
        self.require_parent(&parent)?;

        let event = Arc::new(event);
        if self.store.is_materialized(&address) {
            if !self.store.replace_event(&address, event) {
                debug!("Ignoring event for failed address {}", address);
            }
            return Ok(());
        }

        let deferred = self.store.take_deferred(&address);
        let was_deferred = deferred.is_some();
        let (parent, order) = match deferred {
            Some(deferred) => (deferred.parent, deferred.order),
            None => {
                let order = self
                    .store
                    .attach_child(&parent, address.clone())
                    .ok_or_else(|| Error::ParentNotFound(parent.clone()))?;
                (parent, order)
            }
        };

        let node = PublicationTreeNode::resolved(&event, address.clone(), Some(parent), order);
        let is_branch = node.is_branch();
        self.store.insert(node, Some(Arc::clone(&event)));
        if is_branch {
            self.register_children(&address, &event);
        }

        if was_deferred {
            debug!("Resolved {} from a supplied event", address);
            self.observers.node_resolved.notify(&address);
        } else {
            debug!("Added {} to publication {}", address, self.root);
            self.observers.node_added.notify(&address);
        }
        Ok(())
    }

    /// Register a child by address only. It is fetched on first access.
    pub fn add_event_by_address(
        &mut self,
        address: EventAddress,
        parent_event: &PublicationEvent,
    ) -> Result<()> {
        let parent = parent_event.address()?;
        self.require_parent(&parent)?;
        self.register_deferred(address, &parent);
        Ok(())
    }

    /// Materialize a node, fetching it if it is still deferred. Returns
    /// false only for addresses the tree has never registered.
    pub async fn force_node(&mut self, address: &EventAddress) -> bool {
        if self.store.is_materialized(address) {
            return true;
        }

        let Some(cell) = self.store.deferred(address).map(|d| d.cell.clone()) else {
            return false;
        };

        let fetched = cell.value().await;
        self.resolve_node(address, fetched);
        true
    }

    /// Force every deferred address in `addresses`, fetching concurrently
    pub async fn force_all(&mut self, addresses: &[EventAddress]) {
        let cells: Vec<(EventAddress, Lazy<Fetched>)> = addresses
            .iter()
            .filter_map(|a| self.store.deferred(a).map(|d| (a.clone(), d.cell.clone())))
            .collect();

        let fetched = join_all(cells.iter().map(|(_, cell)| cell.value())).await;

        for ((address, _), fetched) in cells.iter().zip(fetched) {
            self.resolve_node(address, fetched);
        }
    }

    /// Prefetch pending nodes in batches until nothing within `max_depth`
    /// is left. Returns the number of nodes forced.
    pub async fn expand(&mut self, max_depth: Option<usize>) -> usize {
        let mut forced = 0;

        loop {
            let batch: Vec<EventAddress> = self
                .store
                .pending_addresses()
                .into_iter()
                .filter(|a| {
                    max_depth.map_or(true, |max| self.pending_depth(a).is_some_and(|d| d <= max))
                })
                .take(self.config.prefetch_batch.max(1))
                .cloned()
                .collect();

            if batch.is_empty() {
                break;
            }

            forced += batch.len();
            self.force_all(&batch).await;
        }

        info!(
            "Expanded {}: {} forced, {} resolved, {} failed, {} pending",
            self.root,
            forced,
            self.store.resolved_count(),
            self.store.error_count(),
            self.store.pending_count()
        );
        forced
    }

    // --- Retrieval ---

    /// Get the event at `address`, expanding the tree to find it if needed
    pub async fn get_event(&mut self, address: &EventAddress) -> Option<Arc<PublicationEvent>> {
        if let Some(event) = self.store.event(address) {
            return Some(Arc::clone(event));
        }

        if self.store.contains(address) {
            self.force_node(address).await;
            return self.store.event(address).cloned();
        }

        self.depth_first_retrieve(Some(address)).await
    }

    /// The first resolved leaf in reading order
    pub async fn first_leaf_event(&mut self) -> Option<Arc<PublicationEvent>> {
        self.depth_first_retrieve(None).await
    }

    /// Search from the root, depth first, for `target` (or the first
    /// resolved leaf when no target is given), resolving nodes on the way.
    pub async fn depth_first_retrieve(
        &mut self,
        target: Option<&EventAddress>,
    ) -> Option<Arc<PublicationEvent>> {
        let found = self.retrieve(target).await?;
        self.store.event(&found).cloned()
    }

    pub(crate) async fn retrieve(&mut self, target: Option<&EventAddress>) -> Option<EventAddress> {
        let mut stack = vec![self.root.clone()];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) || !self.force_node(&current).await {
                continue;
            }

            let Some(node) = self.store.node(&current) else {
                continue;
            };

            if target == Some(&current) {
                return node.is_resolved().then_some(current);
            }

            if node.is_error() {
                continue;
            }

            match node.node_type {
                NodeType::Leaf if target.is_none() => return Some(current),
                NodeType::Leaf => continue,
                NodeType::Branch => {}
            }

            if let Some(event) = self.store.event(&current).cloned() {
                self.register_children(&current, &event);
            }

            if let Some(node) = self.store.node(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
        }

        trace!("depth-first retrieve for {:?} found nothing", target.map(ToString::to_string));
        None
    }

    /// Addresses of a node's children, fetching each of them
    pub async fn get_child_addresses(&mut self, address: &EventAddress) -> Result<Vec<EventAddress>> {
        if !self.force_node(address).await {
            return Err(Error::NodeNotFound(address.clone()));
        }

        let children = self
            .store
            .node(address)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        self.force_all(&children).await;
        Ok(children)
    }

    /// Events from the root down to `address`, root first. An error node
    /// has no event, so its path ends at its parent.
    pub async fn get_hierarchy(&mut self, address: &EventAddress) -> Result<Vec<Arc<PublicationEvent>>> {
        if !self.force_node(address).await {
            return Err(Error::NodeNotFound(address.clone()));
        }

        let mut path = Vec::new();
        let mut current = Some(address.clone());
        while let Some(addr) = current {
            let node = self
                .store
                .node(&addr)
                .ok_or_else(|| Error::NodeNotFound(addr.clone()))?;
            if let Some(event) = self.store.event(&addr) {
                path.push(Arc::clone(event));
            }
            current = node.parent.clone();
        }

        path.reverse();
        Ok(path)
    }

    /// Materialized leaves in reading order. Deferred subtrees are skipped,
    /// nothing is fetched.
    pub fn loaded_leaves(&self) -> impl Iterator<Item = &PublicationTreeNode> {
        LeafIterator::new(self)
    }

    // --- Traversal ---

    /// Advance the tree's own walker forwards
    pub async fn next(&mut self, mode: TraversalMode) -> TraversalStep {
        let mut walker = std::mem::take(&mut self.walker);
        let step = walker.next(self, mode).await;
        self.walker = walker;
        step
    }

    /// Advance the tree's own walker backwards
    pub async fn previous(&mut self, mode: TraversalMode) -> TraversalStep {
        let mut walker = std::mem::take(&mut self.walker);
        let step = walker.previous(self, mode).await;
        self.walker = walker;
        step
    }

    /// Current position of the tree's own walker
    pub fn position(&self) -> Option<&EventAddress> {
        self.walker.position()
    }

    /// Forget the walker position; the next step starts over from the
    /// bookmark
    pub fn reset_traversal(&mut self) {
        self.walker.reset();
    }

    // --- Bookmark & observers ---

    /// Get the stored resume point
    pub fn bookmark(&self) -> Option<&EventAddress> {
        self.bookmark.as_ref()
    }

    /// Store the resume point and move the walker there. The following
    /// `next`/`previous` yields the bookmarked node itself.
    pub async fn set_bookmark(&mut self, address: EventAddress) -> bool {
        self.bookmark = Some(address.clone());

        let mut walker = std::mem::take(&mut self.walker);
        let moved = walker.seat(self, &address).await;
        self.walker = walker;

        if moved {
            debug!("Bookmark moved to {}", address);
            self.observers.bookmark_moved.notify(&address);
        } else {
            warn!("Bookmark {} is not reachable in {}", address, self.root);
        }
        moved
    }

    /// Forget the resume point. The walker keeps its position.
    pub fn clear_bookmark(&mut self) {
        self.bookmark = None;
    }

    /// Addresses registered under a parent, deferred or supplied directly
    pub fn subscribe_node_added(&mut self) -> Subscription {
        self.observers.node_added.subscribe()
    }

    /// Deferred addresses that received their event
    pub fn subscribe_node_resolved(&mut self) -> Subscription {
        self.observers.node_resolved.subscribe()
    }

    /// Successful bookmark moves
    pub fn subscribe_bookmark_moved(&mut self) -> Subscription {
        self.observers.bookmark_moved.subscribe()
    }

    // --- Private helpers ---

    /// The parent must already be resolved. Deferred parents are not forced,
    /// so a rejected mutation leaves the store untouched.
    fn require_parent(&self, parent: &EventAddress) -> Result<()> {
        match self.store.event(parent) {
            Some(_) => Ok(()),
            None => Err(Error::ParentNotFound(parent.clone())),
        }
    }

    /// Turn a forced cell into a node. Fetch failures end up here as
    /// error leaves.
    fn resolve_node(&mut self, address: &EventAddress, fetched: Fetched) {
        let Some(deferred) = self.store.take_deferred(address) else {
            return;
        };
        let parent = Some(deferred.parent);

        let Some(event) = fetched else {
            debug!("Marking {} as unavailable", address);
            let node = PublicationTreeNode::error(address.clone(), parent, deferred.order);
            self.store.insert(node, None);
            return;
        };

        let node = PublicationTreeNode::resolved(&event, address.clone(), parent, deferred.order);
        let is_branch = node.is_branch();
        debug!("Resolved {} ({:?})", address, node.node_type);
        self.store.insert(node, Some(Arc::clone(&event)));
        if is_branch {
            self.register_children(address, &event);
        }
        self.observers.node_resolved.notify(address);
    }

    /// Register the declared children of a branch as deferred cells
    fn register_children(&mut self, parent: &EventAddress, event: &PublicationEvent) {
        let depth = self.depth(parent).unwrap_or(0);
        if !self.config.allows_children_at(depth) {
            debug!("Not expanding {} at depth {}", parent, depth);
            return;
        }

        for child in event.child_addresses() {
            if !child.is_index() && !is_content_kind(child.kind) {
                debug!("{} references {} of unexpected kind", parent, child);
            }
            self.register_deferred(child, parent);
        }
    }

    /// First writer wins: an address already in the store keeps its parent
    fn register_deferred(&mut self, address: EventAddress, parent: &EventAddress) -> bool {
        if self.store.contains(&address) {
            trace!("{} already registered, not attaching under {}", address, parent);
            return false;
        }

        let Some(order) = self.store.attach_child(parent, address.clone()) else {
            return false;
        };

        let cell = self.fetch_cell(&address);
        self.store.insert_deferred(
            address.clone(),
            DeferredNode {
                parent: parent.clone(),
                order,
                cell,
            },
        );
        self.observers.node_added.notify(&address);
        true
    }

    fn fetch_cell(&self, address: &EventAddress) -> Lazy<Fetched> {
        let fetcher = Arc::clone(&self.fetcher);
        let address = address.clone();
        Lazy::new(move || fetch_absorbing(Arc::clone(&fetcher), address.clone()))
    }

    fn pending_depth(&self, address: &EventAddress) -> Option<usize> {
        let deferred = self.store.deferred(address)?;
        self.depth(&deferred.parent).map(|d| d + 1)
    }
}

/// Fetch one address. Every failure becomes `None`.
async fn fetch_absorbing<F: EventFetcher>(fetcher: Arc<F>, address: EventAddress) -> Fetched {
    let filter = AddressFilter::for_address(&address);
    trace!("Fetching {}", filter.to_json());

    match fetcher.fetch_event(&filter).await {
        Ok(Some(event)) => match event.address() {
            Ok(found) if found == address => Some(Arc::new(event)),
            _ => {
                warn!("Fetched event {} does not match {}", event.id, address);
                None
            }
        },
        Ok(None) => {
            warn!("No event found for {}", address);
            None
        }
        Err(e) => {
            warn!("Failed to fetch {}: {}", address, e);
            None
        }
    }
}

/// Iterator over materialized leaf nodes in reading order (depth-first)
struct LeafIterator<'a, F: EventFetcher> {
    tree: &'a PublicationTree<F>,
    stack: Vec<&'a EventAddress>,
}

impl<'a, F: EventFetcher> LeafIterator<'a, F> {
    fn new(tree: &'a PublicationTree<F>) -> Self {
        Self {
            tree,
            stack: vec![&tree.root],
        }
    }
}

impl<'a, F: EventFetcher> Iterator for LeafIterator<'a, F> {
    type Item = &'a PublicationTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(address) = self.stack.pop() {
            let Some(node) = self.tree.store.node(address) else {
                continue;
            };

            match node.node_type {
                NodeType::Leaf => return Some(node),
                // Branch node: push children in reverse order
                NodeType::Branch => self.stack.extend(node.children.iter().rev()),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{KIND_PUBLICATION_CONTENT, KIND_PUBLICATION_INDEX};
    use crate::fetcher::MemoryFetcher;

    const PK: [u8; 32] = [0xaa; 32];

    fn section(dtag: &str) -> PublicationEvent {
        PublicationEvent::new(
            KIND_PUBLICATION_CONTENT,
            PK,
            0,
            vec![vec!["d".into(), dtag.into()]],
            dtag.to_string(),
        )
    }

    fn index(dtag: &str, children: &[&PublicationEvent]) -> PublicationEvent {
        let mut tags = vec![vec!["d".to_string(), dtag.to_string()]];
        for child in children {
            tags.push(vec!["a".into(), child.address().unwrap().to_string()]);
        }
        PublicationEvent::new(KIND_PUBLICATION_INDEX, PK, 0, tags, "")
    }

    #[tokio::test]
    async fn test_root_registers_children_deferred() {
        let (a, b) = (section("a"), section("b"));
        let root = index("root", &[&a, &b]);
        let fetcher = Arc::new(MemoryFetcher::with_events([a, b]));
        let tree = PublicationTree::new(root, Arc::clone(&fetcher)).unwrap();

        assert!(tree.root().is_branch());
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.pending_count(), 2);
        assert_eq!(tree.resolved_count(), 1);
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn test_depth_and_loaded_leaves() {
        let (c, d, b) = (section("c"), section("d"), section("b"));
        let a = index("a", &[&c, &d]);
        let root = index("root", &[&a, &b]);
        let fetcher = Arc::new(MemoryFetcher::with_events([a.clone(), b, c.clone(), d]));
        let mut tree = PublicationTree::new(root, fetcher).unwrap();

        assert_eq!(tree.loaded_leaves().count(), 0);

        let c_addr = c.address().unwrap();
        tree.get_event(&c_addr).await.unwrap();
        assert_eq!(tree.depth(&c_addr), Some(2));
        assert_eq!(tree.depth(&a.address().unwrap()), Some(1));
        assert_eq!(tree.depth(tree.root_address()), Some(0));

        let loaded: Vec<&str> = tree.loaded_leaves().map(|n| n.address.dtag.as_str()).collect();
        assert_eq!(loaded, vec!["c"]);

        assert_eq!(tree.expand(None).await, 2);
        let loaded: Vec<&str> = tree.loaded_leaves().map(|n| n.address.dtag.as_str()).collect();
        assert_eq!(loaded, vec!["c", "d", "b"]);
    }

    #[tokio::test]
    async fn test_max_depth_stops_registration() {
        let c = section("c");
        let a = index("a", &[&c]);
        let root = index("root", &[&a]);
        let fetcher = Arc::new(MemoryFetcher::with_events([a.clone(), c]));
        let mut tree =
            PublicationTree::with_config(root, fetcher, TreeConfig::new().max_depth(1)).unwrap();

        tree.expand(None).await;

        let a_node = tree.node(&a.address().unwrap()).unwrap();
        assert!(a_node.is_branch());
        assert!(a_node.children.is_empty());
        assert_eq!(tree.node_count(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_fetch_is_error() {
        struct WrongFetcher(PublicationEvent);

        impl EventFetcher for WrongFetcher {
            fn fetch_event<'a>(
                &'a self,
                _filter: &'a AddressFilter,
            ) -> futures_util::future::BoxFuture<'a, std::result::Result<Option<PublicationEvent>, crate::FetchError>>
            {
                Box::pin(futures_util::future::ready(Ok(Some(self.0.clone()))))
            }
        }

        let a = section("a");
        let root = index("root", &[&a]);
        let mut tree = PublicationTree::new(root, Arc::new(WrongFetcher(section("other")))).unwrap();

        assert!(tree.get_event(&a.address().unwrap()).await.is_none());
        assert_eq!(tree.error_count(), 1);
    }

    #[tokio::test]
    async fn test_add_event_replaces_content_in_place() {
        let a = section("a");
        let root = index("root", &[&a]);
        let fetcher = Arc::new(MemoryFetcher::with_events([a.clone()]));
        let mut tree = PublicationTree::new(root.clone(), fetcher).unwrap();
        let a_addr = a.address().unwrap();
        tree.force_node(&a_addr).await;

        let newer = PublicationEvent::new(
            KIND_PUBLICATION_CONTENT,
            PK,
            10,
            vec![vec!["d".into(), "a".into()]],
            "revised",
        );
        tree.add_event(newer, &root).unwrap();

        assert_eq!(tree.event(&a_addr).unwrap().content, "revised");
        assert_eq!(tree.root().children, vec![a_addr]);
    }
}
