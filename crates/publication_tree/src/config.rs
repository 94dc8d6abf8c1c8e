//! Tree configuration

/// Tunables for a [`PublicationTree`](crate::PublicationTree)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Deepest level whose children are registered (root is 0). Children of
    /// nodes at this depth are ignored. `None` means unbounded.
    pub max_depth: Option<usize>,

    /// Maximum number of cells forced concurrently by
    /// [`expand`](crate::PublicationTree::expand)
    pub prefetch_batch: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            prefetch_batch: 25,
        }
    }
}

impl TreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set prefetch batch size. Zero is treated as one.
    pub fn prefetch_batch(mut self, size: usize) -> Self {
        self.prefetch_batch = size.max(1);
        self
    }

    /// Whether children of a node at `depth` should be registered
    pub fn allows_children_at(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth < max)
    }
}
