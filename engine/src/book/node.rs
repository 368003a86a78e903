//! A single position in the opening-book DAG, and the negamax/expansion-cost
//! bookkeeping that keeps every node's backed-up score current as leaves are
//! extended.
//!
//! Nodes are reference-counted and doubly linked: a node owns its children
//! (`Rc<RefCell<BookNode>>`) and holds weak references to its parents, so
//! the DAG (it's a DAG, not a tree — transpositions mean several parents can
//! share a child) can be torn down without manual cycle-breaking.
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use chess::movegen::moves::Move;

use crate::evaluate::Score;

/// Sentinel expansion cost for a node currently out for search: excluded
/// from cost minimization until its result lands.
pub const IGNORE: i32 = i32::MAX;

pub type NodeRef = Rc<std::cell::RefCell<BookNode>>;
pub type WeakNodeRef = Weak<std::cell::RefCell<BookNode>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookNodeState {
    /// Referenced (we know its hash, from a parent's child edge or a file
    /// record) but its own search data hasn't been loaded/computed yet.
    Empty,
    /// Loaded from a book file; search data is real but cost/negamax figures
    /// derived from descendants haven't been recomputed since load.
    Deserialized,
    /// Fully live: cost and negamax figures are current.
    Initialized,
}

/// Tunable weights the builder's expansion-cost policy is biased by.
#[derive(Debug, Clone, Copy)]
pub struct BookWeights {
    pub book_depth_cost: i32,
    pub own_path_error_cost: i32,
    pub other_path_error_cost: i32,
}

impl Default for BookWeights {
    fn default() -> Self {
        Self {
            book_depth_cost: 1,
            own_path_error_cost: 5,
            other_path_error_cost: 1,
        }
    }
}

#[derive(Debug)]
pub struct BookNode {
    pub hash_key: u64,

    /// Shortest distance from the book root, in plies. Updated whenever a
    /// new (shorter) parent path is discovered.
    pub depth: i32,

    /// The move the engine would play here if it fell out of the book at
    /// this node (populated once this node itself has been searched).
    pub best_non_book_move: Option<Move>,
    pub search_score: Score,
    pub search_time_ms: u32,

    /// `max(search_score, max over children of -child.negamax_score)`.
    pub negamax_score: i32,

    pub path_error_white: i32,
    pub path_error_black: i32,

    /// Move (packed 16-bit) -> child node, owning.
    pub children: BTreeMap<u16, NodeRef>,
    /// Move (packed 16-bit) -> parent node, weak (a child may be reachable
    /// by the same move from more than one parent only if the parents
    /// themselves transpose, which doesn't happen in practice, but distinct
    /// moves from distinct parents both commonly reach the same child).
    pub parents: Vec<(u16, WeakNodeRef)>,

    pub state: BookNodeState,

    /// True while a search for this node's own position is in flight.
    pub pending: bool,
}

impl BookNode {
    pub fn new(hash_key: u64) -> NodeRef {
        Rc::new(std::cell::RefCell::new(Self {
            hash_key,
            // Sentinel "not yet reached by any parent"; the book root is
            // the only node whose depth is set directly to 0.
            depth: i32::MAX,
            best_non_book_move: None,
            search_score: 0,
            search_time_ms: 0,
            negamax_score: 0,
            path_error_white: 0,
            path_error_black: 0,
            children: BTreeMap::new(),
            parents: Vec::new(),
            state: BookNodeState::Empty,
            pending: false,
        }))
    }

    /// `negamax_score = max(search_score, max over non-pending children of
    /// -child.negamax_score)`. A pending child's `negamax_score` is a stale
    /// default (it hasn't been searched yet), so it's excluded the same way
    /// `expansion_cost` excludes pending nodes from minimization.
    pub fn recompute_negamax(&mut self) {
        let mut best = self.search_score as i32;
        for child in self.children.values() {
            let child = child.borrow();
            if child.pending {
                continue;
            }
            best = best.max(-child.negamax_score);
        }
        self.negamax_score = best;
    }

    /// Expansion cost from `white`'s perspective: a pending node is removed
    /// from minimization entirely; otherwise the cost rewards depth (a
    /// shallower leaf is cheaper to extend) and penalizes the path errors
    /// accrued by either side having had to deviate from the book's
    /// preferred move to reach this node.
    pub fn expansion_cost(&self, white: bool, weights: &BookWeights) -> i32 {
        if self.pending {
            return IGNORE;
        }

        let own = if white { self.path_error_white } else { self.path_error_black };
        let other = if white { self.path_error_black } else { self.path_error_white };

        own + other + self.depth.saturating_mul(weights.book_depth_cost)
    }

    pub fn add_parent(&mut self, mv: u16, parent: WeakNodeRef) {
        self.parents.push((mv, parent));
    }

    pub fn add_child(&mut self, mv: u16, child: NodeRef) {
        self.children.insert(mv, child);
    }
}

/// Link `child` as the node reached from `parent` by `mv`, updating
/// `child.depth` if this path is shorter than any previously known one.
pub fn add_edge(parent: &NodeRef, mv: u16, child: &NodeRef) {
    parent.borrow_mut().add_child(mv, child.clone());
    child.borrow_mut().add_parent(mv, Rc::downgrade(parent));

    let parent_depth = parent.borrow().depth;
    let mut c = child.borrow_mut();
    if parent_depth != i32::MAX {
        c.depth = c.depth.min(parent_depth + 1);
    }
}

/// Recompute `node`'s negamax score and its children's path-error figures
/// (relative to their best sibling), then propagate the same recomputation
/// up through every parent, since a changed negamax score here changes the
/// `-child.negamax_score` term each parent folds in.
///
/// Called bottom-up after a leaf search result lands, starting from the
/// node that was just searched.
pub fn propagate(node: &NodeRef, weights: &BookWeights) {
    node.borrow_mut().recompute_negamax();

    let (children, mover_is_white): (Vec<(u16, NodeRef)>, bool) = {
        let n = node.borrow();
        (
            n.children.iter().map(|(&mv, c)| (mv, c.clone())).collect(),
            n.depth % 2 == 0,
        )
    };

    if !children.is_empty() {
        let scored: Vec<(u16, i32, NodeRef)> = children
            .into_iter()
            .map(|(mv, c)| {
                let score = -c.borrow().negamax_score;
                (mv, score, c)
            })
            .collect();

        let best_score = scored.iter().map(|(_, s, _)| *s).max().unwrap_or(0);

        for (_, score, child) in &scored {
            let delta = (best_score - score).max(0) * weights.book_depth_cost.max(1);
            let mut c = child.borrow_mut();
            if mover_is_white {
                c.path_error_white = weights.own_path_error_cost * delta;
                c.path_error_black = weights.other_path_error_cost * delta;
            } else {
                c.path_error_black = weights.own_path_error_cost * delta;
                c.path_error_white = weights.other_path_error_cost * delta;
            }
        }
    }

    let parents: Vec<NodeRef> = node
        .borrow()
        .parents
        .iter()
        .filter_map(|(_, weak)| weak.upgrade())
        .collect();

    for parent in parents {
        propagate(&parent, weights);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negamax_prefers_the_best_child() {
        let root = BookNode::new(1);
        root.borrow_mut().depth = 0;
        let a = BookNode::new(2);
        let b = BookNode::new(3);
        a.borrow_mut().search_score = -50;
        b.borrow_mut().search_score = 30;

        add_edge(&root, 0x1, &a);
        add_edge(&root, 0x2, &b);

        propagate(&a, &BookWeights::default());
        propagate(&b, &BookWeights::default());

        assert_eq!(root.borrow().negamax_score, 50);
        assert_eq!(a.borrow().depth, 1);
        assert_eq!(b.borrow().depth, 1);
    }

    #[test]
    fn pending_node_reports_ignore_cost() {
        let node = BookNode::new(7);
        node.borrow_mut().pending = true;
        assert_eq!(node.borrow().expansion_cost(true, &BookWeights::default()), IGNORE);
    }

    #[test]
    fn path_error_penalizes_non_best_sibling() {
        let root = BookNode::new(1);
        root.borrow_mut().depth = 0;
        let best = BookNode::new(2);
        let worse = BookNode::new(3);
        best.borrow_mut().search_score = 80;
        worse.borrow_mut().search_score = -20;

        add_edge(&root, 0x1, &best);
        add_edge(&root, 0x2, &worse);

        propagate(&best, &BookWeights::default());
        propagate(&worse, &BookWeights::default());

        assert_eq!(best.borrow().path_error_white, 0);
        assert!(worse.borrow().path_error_white > 0);
    }
}
