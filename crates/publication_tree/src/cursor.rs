//! Navigation cursor
//!
//! A cursor is a position in a tree, nothing more. Every move borrows the
//! tree mutably because walking into a deferred child fetches it. Failed
//! moves leave the position unchanged.

use tracing::trace;

use crate::address::EventAddress;
use crate::fetcher::EventFetcher;
use crate::node::NodeType;
use crate::traversal::Direction;
use crate::tree::PublicationTree;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeCursor {
    target: Option<EventAddress>,
}

impl TreeCursor {
    /// Create an unseated cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current position
    pub fn target(&self) -> Option<&EventAddress> {
        self.target.as_ref()
    }

    pub fn is_seated(&self) -> bool {
        self.target.is_some()
    }

    /// Unseat the cursor
    pub fn reset(&mut self) {
        self.target = None;
    }

    /// Seat the cursor at `address`, or at the first resolved leaf when no
    /// address is given. Unknown addresses are searched for from the root.
    pub async fn try_move_to<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        address: Option<&EventAddress>,
    ) -> bool {
        let found = match address {
            Some(address) => {
                if !tree.force_node(address).await {
                    tree.get_event(address).await;
                }
                tree.node(address).map(|_| address.clone())
            }
            None => tree.retrieve(None).await,
        };

        match found {
            Some(target) => {
                trace!("cursor seated at {}", target);
                self.target = Some(target);
                true
            }
            None => false,
        }
    }

    /// Move to the first child, fetching it if needed
    pub async fn try_move_to_first_child<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
    ) -> bool {
        self.try_move_to_child(tree, Direction::Forward).await
    }

    /// Move to the last child, fetching it if needed
    pub async fn try_move_to_last_child<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
    ) -> bool {
        self.try_move_to_child(tree, Direction::Backward).await
    }

    pub async fn try_move_to_next_sibling<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
    ) -> bool {
        self.try_move_to_sibling(tree, Direction::Forward).await
    }

    pub async fn try_move_to_previous_sibling<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
    ) -> bool {
        self.try_move_to_sibling(tree, Direction::Backward).await
    }

    /// First child when walking forwards, last child when walking backwards
    pub async fn try_move_to_child<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        direction: Direction,
    ) -> bool {
        let Some(node) = self.target.as_ref().and_then(|t| tree.node(t)) else {
            return false;
        };

        match node.node_type {
            NodeType::Leaf => return false,
            NodeType::Branch => {}
        }

        let child = match direction {
            Direction::Forward => node.children.first(),
            Direction::Backward => node.children.last(),
        };
        let Some(child) = child.cloned() else {
            return false;
        };

        self.seat_forced(tree, child).await
    }

    /// Step one position along the parent's children
    pub async fn try_move_to_sibling<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        direction: Direction,
    ) -> bool {
        let Some(target) = self.target.as_ref() else {
            return false;
        };
        let Some(parent) = tree.node(target).and_then(|n| n.parent.as_ref()) else {
            return false;
        };
        let Some(siblings) = tree.node(parent).map(|p| &p.children) else {
            return false;
        };
        let Some(index) = siblings.iter().position(|s| s == target) else {
            return false;
        };

        let sibling = match direction {
            Direction::Forward => siblings.get(index + 1),
            Direction::Backward => index.checked_sub(1).and_then(|i| siblings.get(i)),
        };
        let Some(sibling) = sibling.cloned() else {
            return false;
        };

        self.seat_forced(tree, sibling).await
    }

    /// Move to the parent; fails at the root
    pub fn try_move_to_parent<F: EventFetcher>(&mut self, tree: &PublicationTree<F>) -> bool {
        let parent = self
            .target
            .as_ref()
            .and_then(|t| tree.node(t))
            .and_then(|n| n.parent.clone());

        match parent {
            Some(parent) => {
                self.target = Some(parent);
                true
            }
            None => false,
        }
    }

    async fn seat_forced<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        address: EventAddress,
    ) -> bool {
        if !tree.force_node(&address).await {
            return false;
        }
        self.target = Some(address);
        true
    }
}
