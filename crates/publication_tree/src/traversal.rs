//! Traversal engine
//!
//! [`TreeWalker`] turns cursor moves into a restartable sequence of events.
//! Two modes are supported:
//!
//! - [`TraversalMode::Leaves`]: content sections only, in reading order
//! - [`TraversalMode::All`]: every node, pre-order
//!
//! Both run forwards or backwards. A step may fetch; a step that lands on an
//! address the network could not produce yields `done: false` with no value,
//! which callers should treat as "skip".

use std::sync::Arc;

use tracing::{debug, trace};

use crate::address::EventAddress;
use crate::cursor::TreeCursor;
use crate::event::PublicationEvent;
use crate::fetcher::EventFetcher;
use crate::node::NodeType;
use crate::tree::PublicationTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    Leaves,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// One item of a traversal
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalStep {
    pub done: bool,
    pub value: Option<Arc<PublicationEvent>>,
}

impl TraversalStep {
    fn yielded(value: Option<Arc<PublicationEvent>>) -> Self {
        Self { done: false, value }
    }

    fn finished(value: Option<Arc<PublicationEvent>>) -> Self {
        Self { done: true, value }
    }

    /// An unavailable node: keep going
    pub fn is_skip(&self) -> bool {
        !self.done && self.value.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum WalkState {
    /// Nothing yielded yet; the first step seats at the bookmark
    #[default]
    Unseated,
    /// Positioned but the position itself has not been yielded
    Seated,
    Walking,
}

/// A traversal position over one tree, independent of the tree's own walker
#[derive(Debug, Clone, Default)]
pub struct TreeWalker {
    cursor: TreeCursor,
    state: WalkState,
}

impl TreeWalker {
    /// Create an unseated walker
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> &TreeCursor {
        &self.cursor
    }

    /// Address of the last yielded node
    pub fn position(&self) -> Option<&EventAddress> {
        self.cursor.target()
    }

    /// Forget the position; the next step seats again
    pub fn reset(&mut self) {
        self.cursor.reset();
        self.state = WalkState::Unseated;
    }

    /// Move to `address`; the next step yields it without advancing
    pub async fn seat<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        address: &EventAddress,
    ) -> bool {
        if !self.cursor.try_move_to(tree, Some(address)).await {
            return false;
        }
        self.state = WalkState::Seated;
        true
    }

    /// Yield the next node in reading order
    pub async fn next<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        mode: TraversalMode,
    ) -> TraversalStep {
        self.step(tree, mode, Direction::Forward).await
    }

    /// Yield the previous node in reading order
    pub async fn previous<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        mode: TraversalMode,
    ) -> TraversalStep {
        self.step(tree, mode, Direction::Backward).await
    }

    /// Advance one step in `direction`
    pub async fn step<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        mode: TraversalMode,
        direction: Direction,
    ) -> TraversalStep {
        match self.state {
            WalkState::Unseated => {
                let exact = self.seat_initial(tree).await;
                self.state = WalkState::Walking;
                if !exact && mode == TraversalMode::Leaves && self.on_branch(tree) {
                    return self.advance_leaves(tree, direction).await;
                }
                self.current(tree)
            }
            WalkState::Seated => {
                self.state = WalkState::Walking;
                self.current(tree)
            }
            WalkState::Walking => match mode {
                TraversalMode::Leaves => self.advance_leaves(tree, direction).await,
                TraversalMode::All => self.advance_all(tree, direction).await,
            },
        }
    }

    /// Bookmark if reachable, else the first resolved leaf, else wherever a
    /// leftmost descent from the root ends. Returns false only in the last
    /// case, where the position may be a failed leaf or a childless branch.
    async fn seat_initial<F: EventFetcher>(&mut self, tree: &mut PublicationTree<F>) -> bool {
        if let Some(bookmark) = tree.bookmark().cloned() {
            if self.cursor.try_move_to(tree, Some(&bookmark)).await {
                return true;
            }
            debug!("Bookmark {} unreachable, starting from first leaf", bookmark);
        }

        if self.cursor.try_move_to(tree, None).await {
            return true;
        }

        let root = tree.root_address().clone();
        self.cursor.try_move_to(tree, Some(&root)).await;
        while self.cursor.try_move_to_first_child(tree).await {}
        false
    }

    async fn advance_leaves<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        direction: Direction,
    ) -> TraversalStep {
        let origin = self.cursor.clone();

        loop {
            if self.cursor.try_move_to_sibling(tree, direction).await {
                while self.cursor.try_move_to_child(tree, direction).await {}
                // An index whose children all live elsewhere in the tree, or
                // were cut off by max_depth, is not a section
                if self.on_branch(tree) {
                    continue;
                }
                return self.current(tree);
            }

            if !self.cursor.try_move_to_parent(tree) {
                trace!("leaf traversal exhausted ({:?})", direction);
                self.cursor = origin;
                return TraversalStep::finished(None);
            }
        }
    }

    async fn advance_all<F: EventFetcher>(
        &mut self,
        tree: &mut PublicationTree<F>,
        direction: Direction,
    ) -> TraversalStep {
        let origin = self.cursor.clone();

        if self.cursor.try_move_to_child(tree, direction).await {
            return self.current(tree);
        }

        loop {
            if self.cursor.try_move_to_sibling(tree, direction).await {
                return self.current(tree);
            }

            if !self.cursor.try_move_to_parent(tree) {
                trace!("pre-order traversal exhausted ({:?})", direction);
                self.cursor = origin;
                return TraversalStep::finished(Some(tree.root_event()));
            }
        }
    }

    fn on_branch<F: EventFetcher>(&self, tree: &PublicationTree<F>) -> bool {
        self.cursor
            .target()
            .and_then(|t| tree.node(t))
            .is_some_and(|n| n.node_type == NodeType::Branch)
    }

    fn current<F: EventFetcher>(&self, tree: &PublicationTree<F>) -> TraversalStep {
        let value = self.cursor.target().and_then(|t| tree.event(t)).cloned();
        TraversalStep::yielded(value)
    }
}
