use arrayvec::ArrayVec;
use chess::board::Board;
use chess::movegen::moves::Move;
use chess::square::Square;
use history::Butterfly;
use history::HistoryIndex;
use history::HistoryScore;
use killers::Killers;

use crate::search::params::MAX_DEPTH;

pub mod history;
pub mod killers;
pub mod pv;

/// All the move-ordering memory that persists across a single search: the
/// quiet-move history table, killer moves, the countermove table, and the
/// node-count table used to bias time allocation toward the best root move.
///
/// Cleared (or rebuilt) whenever a new search starts from scratch, the way
/// the transposition table is aged rather than cleared.
#[derive(Debug)]
pub struct History {
    pub main_hist: Butterfly<HistoryScore>,
    pub countermoves: Butterfly<Option<Move>>,
    pub killers: [Killers; MAX_DEPTH],
    pub indices: ArrayVec<HistoryIndex, MAX_DEPTH>,
    node_counts: [[u32; Square::COUNT]; Square::COUNT],
}

impl History {
    pub fn boxed() -> Box<Self> {
        #![allow(clippy::cast_ptr_alignment)]
        // SAFETY: every field is a plain array of integers/Options-over-u16,
        // so an all-zero bit pattern is a valid (empty) `History`.
        unsafe {
            let layout = std::alloc::Layout::new::<Self>();
            let ptr = std::alloc::alloc_zeroed(layout);
            if ptr.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            Box::from_raw(ptr.cast())
        }
    }

    // Ply-indexed move stack, used to look up the countermove slot.
    pub fn push_mv(&mut self, mv: Move, board: &Board) {
        self.indices.push(HistoryIndex::new(board, mv));
    }

    pub fn push_null_mv(&mut self) {
        self.indices.push(HistoryIndex::default());
    }

    pub fn pop_mv(&mut self) {
        self.indices.pop();
    }

    /// Reward the quiet move that caused the cutoff, and penalize the quiet
    /// moves that were tried (and failed) before it, at the given ply.
    pub fn update_quiet(
        &mut self,
        board: &Board,
        best: Move,
        tried: &[Move],
        depth: usize,
        ply: usize,
    ) {
        let bonus = HistoryScore::bonus(depth);

        self.main_hist[HistoryIndex::new(board, best)] += bonus;

        for &mv in tried {
            if mv != best {
                self.main_hist[HistoryIndex::new(board, mv)] -= bonus;
            }
        }

        self.killers[ply].add(best);
        self.add_countermove(best);
    }

    pub fn get_hist_score(&self, mv: Move, board: &Board) -> i32 {
        i32::from(self.main_hist[HistoryIndex::new(board, mv)])
    }

    // Countermove table: indexed by the move played at the previous ply.
    pub fn add_countermove(&mut self, mv: Move) {
        if let Some(&oneply) = self.indices.last() {
            self.countermoves[oneply] = Some(mv);
        }
    }

    pub fn get_countermove(&self) -> Option<Move> {
        self.indices.last().and_then(|&idx| self.countermoves[idx])
    }

    pub fn clear_all_killers(&mut self) {
        self.killers = [Killers::default(); MAX_DEPTH];
    }

    // Node counter, used to weight "best move changed/stable" time checks.
    pub fn add_nodes(&mut self, mv: Move, nodes: u32) {
        self.node_counts[mv.src() as usize][mv.tgt() as usize] += nodes;
    }

    pub fn get_nodes(&self, mv: Move) -> u32 {
        self.node_counts[mv.src() as usize][mv.tgt() as usize]
    }

    pub fn clear_nodes(&mut self) {
        self.node_counts = [[0; Square::COUNT]; Square::COUNT];
    }
}
