//! The opening-book builder: repeatedly picks the cheapest leaf to extend,
//! searches it, and folds the result back into the DAG.
//!
//! One iteration at a time — a builder run is driven from a single thread
//! that owns a [`crate::search::SearchRunner`] of its own (searches launched
//! by the builder don't go through the worker tree; extending the book is an
//! offline maintenance task, not something that competes with the engine's
//! own search for the shared transposition table while a game is in
//! progress).
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chess::board::Board;

use super::node::NodeRef;
use super::store::Book;
use crate::position::Position;
use crate::search::{NodeCounter, SearchRunner};
use crate::time_control::TimeController;
use crate::transpositions::TTable;
use crate::zobrist::ZHash;
use uci::time_control::TimeControl;

/// Shared abort flag a caller can use to cancel an in-flight extension
/// immediately (`abortExtendBook`), as opposed to [`BookBuilder::request_stop`]
/// which only stops *scheduling new* extensions.
#[derive(Clone, Default)]
pub struct BuilderHandle {
    abort: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl BuilderHandle {
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Drives the select-cheapest-leaf / search / fold-back loop described in
/// the opening-book core design.
pub struct BookBuilder<'a> {
    book: &'a Book,
    tt: &'a TTable,
    computation_time: Duration,
    threads: usize,
    handle: BuilderHandle,
}

impl<'a> BookBuilder<'a> {
    pub fn new(book: &'a Book, tt: &'a TTable, computation_time: Duration, threads: usize) -> Self {
        Self { book, tt, computation_time, threads, handle: BuilderHandle::default() }
    }

    pub fn handle(&self) -> BuilderHandle {
        self.handle.clone()
    }

    /// Run until `request_stop`/`abort` is observed or no expandable leaf
    /// remains, extending the book one node per iteration. `focus_hash`, if
    /// set, restricts selection to descendants of that position (so a caller
    /// can deepen a specific opening line rather than the whole tree).
    pub fn run(&mut self, focus_hash: Option<u64>) {
        loop {
            if self.handle.stop.load(Ordering::SeqCst) {
                break;
            }

            let Some(leaf) = self.select_cheapest_leaf(focus_hash) else {
                break;
            };

            if self.handle.abort.load(Ordering::SeqCst) {
                break;
            }

            self.extend(&leaf);
        }
    }

    /// Run exactly one iteration (used by `book build --once` and tests);
    /// returns whether a leaf was actually extended.
    pub fn step(&mut self, focus_hash: Option<u64>) -> bool {
        if self.handle.abort.load(Ordering::SeqCst) || self.handle.stop.load(Ordering::SeqCst) {
            return false;
        }

        let Some(leaf) = self.select_cheapest_leaf(focus_hash) else {
            return false;
        };

        self.extend(&leaf);
        true
    }

    /// Select the node of least expansion cost reachable from the root
    /// (restricted to descendants of `focus_hash`, if given), from the
    /// perspective of the side to move there. Pending nodes advertise
    /// [`super::node::IGNORE`] and are never selected.
    fn select_cheapest_leaf(&self, focus_hash: Option<u64>) -> Option<(NodeRef, Board)> {
        let (focus_node, focus_board) = match focus_hash.and_then(|h| self.book.lookup(h)) {
            Some(node) => {
                let board = replay_to(&node);
                (node, board)
            }
            None => (self.book.root(), Board::default()),
        };

        let mut best: Option<(i32, NodeRef, Board)> = None;
        let mut stack = vec![(focus_node, focus_board)];

        while let Some((node, board)) = stack.pop() {
            let white = board.current.is_white();
            let cost = node.borrow().expansion_cost(white, &self.book.weights);

            if cost < best.as_ref().map(|(c, ..)| *c).unwrap_or(i32::MAX) {
                best = Some((cost, node.clone(), board));
            }

            let children: Vec<(u16, NodeRef)> =
                node.borrow().children.iter().map(|(&mv, c)| (mv, c.clone())).collect();

            for (mv_bits, child) in children {
                let mv = chess::movegen::moves::Move::from_bits(mv_bits);
                stack.push((child, board.play_move(mv)));
            }
        }

        best.map(|(cost, node, board)| {
            debug_assert_ne!(cost, super::node::IGNORE);
            (node, board)
        })
    }

    /// Search `leaf`'s position at the configured time/thread budget, fold
    /// the result into the book, and recompute negamax/expansion costs
    /// bottom-up. One `thread::scope`d runner per configured thread, all
    /// sharing `self.tt`, with thread 0's result taken as authoritative.
    fn extend(&mut self, leaf: &(NodeRef, Board)) {
        let (node, board) = leaf;
        node.borrow_mut().pending = true;

        let position = Position::new(*board);
        let started = Instant::now();
        let stop_source: Arc<dyn crate::time_control::ShouldStop> =
            Arc::new(AbortSource(self.handle.abort.clone()));

        let node_counters: Vec<AtomicU32> =
            (0..self.threads.max(1)).map(|_| AtomicU32::new(0)).collect();
        let mut runners: Vec<SearchRunner> = node_counters
            .iter()
            .enumerate()
            .map(|(id, counter)| SearchRunner::new(id, self.tt, NodeCounter::new(counter)))
            .collect();

        let report = std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for runner in runners.iter_mut().skip(1) {
                let pos = position.clone();
                let (tc, _handle) = TimeController::new(
                    TimeControl::FixedTime(self.computation_time),
                    pos.side_to_move(),
                );
                let tc = tc.with_stop_source(stop_source.clone());
                handles.push(scope.spawn(move || runner.search::<false>(pos, tc)));
            }

            let (tc, _handle) = TimeController::new(
                TimeControl::FixedTime(self.computation_time),
                position.side_to_move(),
            );
            let tc = tc.with_stop_source(stop_source.clone());
            let report = runners[0].search::<false>(position, tc);

            for handle in handles {
                let _ = handle.join();
            }

            report
        });

        let elapsed_ms = started.elapsed().as_millis() as u32;
        let best_move = report.pv.first().copied();

        if let Some(mv) = best_move {
            let next_board = board.play_move(mv);
            let next_hash = ZHash::from(&next_board).0;
            let already_child = node.borrow().children.contains_key(&mv.bits());

            if !already_child {
                self.book.link_child(node, mv, next_hash);
            }
        }

        self.book.set_search_result(node, best_move, report.score, elapsed_ms);
    }
}

/// Recover the `Board` at `node` by following parent edges back to the
/// book root (which has none) and replaying the collected moves forward
/// from the standard starting position. A node can have more than one
/// parent edge (transpositions); any one parent chain reaches a position
/// with the same hash, so the first is as good as any other.
fn replay_to(node: &NodeRef) -> Board {
    let mut moves_from_root = Vec::new();
    let mut current = node.clone();

    while let Some((mv, parent)) = current
        .borrow()
        .parents
        .first()
        .and_then(|(mv, weak)| weak.upgrade().map(|p| (*mv, p)))
    {
        moves_from_root.push(mv);
        current = parent;
    }

    let mut board = Board::default();
    for mv_bits in moves_from_root.into_iter().rev() {
        board = board.play_move(chess::movegen::moves::Move::from_bits(mv_bits));
    }
    board
}

struct AbortSource(Arc<AtomicBool>);

impl crate::time_control::ShouldStop for AbortSource {
    fn should_stop(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_handle_abort_is_observed_by_its_stop_source() {
        let handle = BuilderHandle::default();
        let source = AbortSource(handle.abort.clone());
        assert!(!crate::time_control::ShouldStop::should_stop(&source));
        handle.abort();
        assert!(crate::time_control::ShouldStop::should_stop(&source));
    }

    #[test]
    fn step_extends_the_root_when_book_is_fresh() {
        let book = Book::new();
        let tt = TTable::with_capacity(1);
        let mut builder = BookBuilder::new(&book, &tt, Duration::from_millis(5), 1);

        let extended = builder.step(None);

        assert!(extended);
        assert_eq!(book.len(), 2, "root should have gained exactly one child");
    }
}
