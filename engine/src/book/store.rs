//! Opening-book persistence and the in-memory DAG it loads into.
//!
//! On disk, a book is a 128-byte header followed by a packed sequence of
//! 16-byte records, one per searched position, in arbitrary order. Parent
//! and child links aren't stored — the loader rebuilds the DAG by replaying
//! legal moves from the standard starting position and matching the
//! resulting hash against the record set, the same way `TTable::extract_pv`
//! replays the legal-move list rather than trusting a stored chain.
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::RwLock;

use anyhow::{bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use chess::board::Board;
use chess::movegen::moves::Move;

use super::node::{add_edge, propagate, BookNode, BookNodeState, BookWeights, NodeRef};
use crate::evaluate::Score;
use crate::zobrist::ZHash;

const MAGIC: [u8; 8] = *b"TXLBOOK\0";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 128;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawRecord {
    hash_key: u64,
    best_move: u16,
    search_score: i16,
    search_time_ms: u32,
}

/// The opening-book DAG: one root (the standard starting position), a
/// hash-indexed lookup table for O(1) access during the builder loop, and
/// the expansion-cost weights it's currently biased by.
///
/// Reader/writer access is a single `RwLock` over the lookup table, per the
/// concurrency note that the book is guarded at that granularity rather than
/// per-node: mutations (`add_child`, `set_search_result`) take the write
/// side, queries (`tree_data`, `best_pv`) take the read side.
pub struct Book {
    root: NodeRef,
    by_hash: RwLock<HashMap<u64, NodeRef>>,
    pub weights: BookWeights,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    pub fn new() -> Self {
        let root_hash = ZHash::from(&Board::default()).0;
        let root = BookNode::new(root_hash);
        root.borrow_mut().depth = 0;
        root.borrow_mut().state = BookNodeState::Initialized;

        let mut by_hash = HashMap::new();
        by_hash.insert(root_hash, root.clone());

        Self { root, by_hash: RwLock::new(by_hash), weights: BookWeights::default() }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    pub fn lookup(&self, hash_key: u64) -> Option<NodeRef> {
        self.by_hash.read().unwrap().get(&hash_key).cloned()
    }

    fn get_or_create(&self, hash_key: u64) -> NodeRef {
        self.by_hash
            .write()
            .unwrap()
            .entry(hash_key)
            .or_insert_with(|| BookNode::new(hash_key))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_hash.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add (or fetch the existing) child reached by `mv` from `parent`.
    pub fn link_child(&self, parent: &NodeRef, mv: Move, child_hash: u64) -> NodeRef {
        let child = self.get_or_create(child_hash);
        add_edge(parent, mv.bits(), &child);
        child
    }

    /// Record a finished search at `node`: mark it no longer pending, set
    /// its own score/move/time, and propagate negamax/path-error figures to
    /// every ancestor.
    pub fn set_search_result(&self, node: &NodeRef, best_move: Option<Move>, score: Score, time_ms: u32) {
        {
            let mut n = node.borrow_mut();
            n.pending = false;
            n.best_non_book_move = best_move;
            n.search_score = score;
            n.search_time_ms = time_ms;
            n.state = BookNodeState::Initialized;
        }
        propagate(node, &self.weights);
    }

    /// The book's preferred move at `hash_key`, if any: the child reached by
    /// the best-scoring edge from the side to move's perspective, falling
    /// back to the node's own last-searched non-book move when it hasn't
    /// been expanded yet. Used by `OwnBook` to decide whether a `go` can be
    /// answered straight out of the book.
    pub fn best_move(&self, hash_key: u64) -> Option<Move> {
        let node = self.lookup(hash_key)?;
        let n = node.borrow();

        n.children
            .iter()
            .max_by_key(|(_, child)| -child.borrow().negamax_score)
            .map(|(&mv, _)| Move::from_bits(mv))
            .or(n.best_non_book_move)
    }

    /// Walk the DAG depth-first (by move, deterministic) and collect every
    /// node reachable from the root, for `book move`/`book info` reporting.
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.by_hash.read().unwrap().values().cloned().collect()
    }

    /// Read a book file and rebuild its DAG.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening book file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).context("reading book header")?;
        if header[..8] != MAGIC {
            bail!("{}: not a book file (bad magic)", path.display());
        }
        let version = u32::from_le_bytes(header[8..12].try_into().unwrap());
        if version != VERSION {
            bail!("{}: unsupported book file version {version}", path.display());
        }

        let mut records = HashMap::new();
        let mut buf = [0u8; std::mem::size_of::<RawRecord>()];
        loop {
            match reader.read_exact(&mut buf) {
                Ok(()) => {
                    let record: RawRecord = *bytemuck::from_bytes(&buf);
                    records.insert(record.hash_key, record);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context("reading book record"),
            }
        }

        let book = Self::new();
        let mut visited = HashSet::new();
        rebuild_links(&book, &book.root.clone(), Board::default(), &records, &mut visited);

        Ok(book)
    }

    /// Write every node in the DAG out as a flat, order-independent record
    /// sequence.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating book file {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let mut header = [0u8; HEADER_SIZE];
        header[..8].copy_from_slice(&MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        writer.write_all(&header).context("writing book header")?;

        for node in self.by_hash.read().unwrap().values() {
            let n = node.borrow();
            let record = RawRecord {
                hash_key: n.hash_key,
                best_move: n.best_non_book_move.map(Move::bits).unwrap_or(0),
                search_score: n.search_score.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
                search_time_ms: n.search_time_ms,
            };
            writer.write_all(bytemuck::bytes_of(&record)).context("writing book record")?;
        }

        writer.flush().context("flushing book file")?;
        Ok(())
    }

    /// Merge every record of `other` into `self`, keeping whichever side's
    /// search ran longer at positions both books have. Used by `book merge`.
    pub fn merge(&self, other: &Book) {
        for node in other.nodes() {
            let n = node.borrow();
            let existing = self.lookup(n.hash_key);
            let should_overwrite = match &existing {
                Some(e) => e.borrow().search_time_ms < n.search_time_ms,
                None => true,
            };

            if should_overwrite {
                let target = self.get_or_create(n.hash_key);
                let mut t = target.borrow_mut();
                t.best_non_book_move = n.best_non_book_move;
                t.search_score = n.search_score;
                t.search_time_ms = n.search_time_ms;
                t.state = BookNodeState::Deserialized;
            }
        }

        let mut visited = HashSet::new();
        let records: HashMap<u64, RawRecord> = self
            .by_hash
            .read()
            .unwrap()
            .values()
            .map(|n| {
                let n = n.borrow();
                (
                    n.hash_key,
                    RawRecord {
                        hash_key: n.hash_key,
                        best_move: n.best_non_book_move.map(Move::bits).unwrap_or(0),
                        search_score: n.search_score as i16,
                        search_time_ms: n.search_time_ms,
                    },
                )
            })
            .collect();
        rebuild_links(self, &self.root.clone(), Board::default(), &records, &mut visited);
    }
}

/// Replay legal moves from `board` (whose book node is `node`), linking in
/// any child whose resulting hash matches a loaded record, and recurse.
/// `visited` prevents re-walking a transposition we've already expanded.
fn rebuild_links(
    book: &Book,
    node: &NodeRef,
    board: Board,
    records: &HashMap<u64, RawRecord>,
    visited: &mut HashSet<u64>,
) {
    let hash_key = node.borrow().hash_key;
    if !visited.insert(hash_key) {
        return;
    }

    for mv in board.legal_moves::<true>() {
        let next_board = board.play_move(mv);
        let next_hash = ZHash::from(&next_board).0;

        if let Some(record) = records.get(&next_hash) {
            let child = book.link_child(node, mv, next_hash);
            {
                let mut c = child.borrow_mut();
                if c.state == BookNodeState::Empty {
                    c.best_non_book_move =
                        (record.best_move != 0).then(|| Move::from_bits(record.best_move));
                    c.search_score = i32::from(record.search_score);
                    c.search_time_ms = record.search_time_ms;
                    c.state = BookNodeState::Deserialized;
                }
            }
            rebuild_links(book, &child, next_board, records, visited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_book_has_only_the_root() {
        let book = Book::new();
        assert_eq!(book.len(), 1);
        assert_eq!(book.root().borrow().depth, 0);
    }

    #[test]
    fn linking_a_child_updates_its_depth() {
        let book = Book::new();
        let root = book.root();
        let mv = Board::default().legal_moves::<true>()[0];
        let next_board = Board::default().play_move(mv);
        let child = book.link_child(&root, mv, ZHash::from(&next_board).0);
        assert_eq!(child.borrow().depth, 1);
    }

    #[test]
    fn set_search_result_clears_pending_and_updates_negamax() {
        let book = Book::new();
        let root = book.root();
        let mv = Board::default().legal_moves::<true>()[0];
        let next_board = Board::default().play_move(mv);
        let child = book.link_child(&root, mv, ZHash::from(&next_board).0);
        child.borrow_mut().pending = true;

        book.set_search_result(&child, Some(mv), -25, 1000);

        assert!(!child.borrow().pending);
        assert_eq!(root.borrow().negamax_score, 25);
    }

    #[test]
    fn best_move_picks_the_highest_scoring_child() {
        let book = Book::new();
        let root = book.root();
        let moves = Board::default().legal_moves::<true>();
        let worse = moves[0];
        let better = moves[1];

        let worse_child = book.link_child(&root, worse, ZHash::from(&Board::default().play_move(worse)).0);
        let better_child = book.link_child(&root, better, ZHash::from(&Board::default().play_move(better)).0);
        worse_child.borrow_mut().negamax_score = 40;
        better_child.borrow_mut().negamax_score = -10;

        assert_eq!(book.best_move(root.borrow().hash_key), Some(better));
    }
}
