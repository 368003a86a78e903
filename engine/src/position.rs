//! A `Position` wraps a [`Board`] together with the incrementally
//! maintained hashes and repetition history the search core needs but the
//! move-generation collaborator doesn't own.

use arrayvec::ArrayVec;
use chess::board::Board;
use chess::movegen::moves::BareMove;
use chess::movegen::moves::Move;
use chess::piece::Color;

use crate::zobrist::ZHash;

/// How many previous positions we keep around for repetition detection.
/// Plenty for any game that reaches the engine (50-move rule caps relevant
/// history at 100 plies; we keep a little more headroom for the in-search
/// extension of the list).
pub const MAX_HISTORY: usize = 128;

#[derive(Debug, Clone)]
pub struct Position {
    pub board: Board,

    /// Full Zobrist hash of the position (pieces + side + castling + ep).
    pub hash: ZHash,

    /// Hash used for repetition/book indexing: like `hash`, but without the
    /// en-passant file mixed in once it can no longer be legally captured,
    /// so "the same position reached differently" still compares equal.
    pub book_hash: ZHash,

    /// Positions (by `hash`) since the last irreversible move (capture,
    /// pawn move, loss of castling rights). Used for repetition detection.
    /// Cleared whenever an irreversible move is made, since no repetition
    /// can span one.
    pub history: ArrayVec<ZHash, MAX_HISTORY>,
}

impl Position {
    pub fn new(board: Board) -> Self {
        let hash = ZHash::from(&board);

        Self {
            board,
            hash,
            book_hash: book_hash_of(&board, hash),
            history: ArrayVec::new(),
        }
    }

    /// Play a move, returning the resulting position with hashes and
    /// history updated incrementally.
    pub fn play_move(&self, mv: Move) -> Position {
        let irreversible = mv.is_capture()
            || self.board.get_at(mv.src()).is_some_and(|p| p.is_pawn());

        let next_board = self.board.play_move(mv);
        let next_hash = ZHash::from(&next_board);

        let mut history = if irreversible {
            ArrayVec::new()
        } else {
            self.history.clone()
        };

        // `history` holds hashes _prior_ to the position they precede, so
        // push the position we're leaving, not the one we're entering.
        if !irreversible {
            // ArrayVec has a fixed capacity; if a (pathological) game
            // exceeds it, just drop the oldest entries. Losing very old
            // repetition candidates is safe: they can't matter once 50
            // reversible moves have passed anyway.
            if history.is_full() {
                history.remove(0);
            }
            history.push(self.hash);
        }

        Position {
            book_hash: book_hash_of(&next_board, next_hash),
            board: next_board,
            hash: next_hash,
            history,
        }
    }

    /// Resolve an un-annotated `BareMove` (as parsed off a UCI `position ...
    /// moves ...` line) against the current legal-move list and play it.
    /// Panics if it doesn't correspond to a legal move, matching the
    /// contract of `setPosition`'s move-list replay: the UCI front only ever
    /// feeds moves taken from its own prior `position`/`go` exchange.
    pub fn play_bare_move(&self, bare: BareMove) -> Position {
        let mv = self.board.find_move(bare).expect("not a legal move");
        self.play_move(mv)
    }

    /// Play a null move (side to move passes). Used by null-move pruning.
    /// Never irreversible in the repetition sense, and never itself a
    /// repeatable position (it always changes en-passant/side state).
    pub fn play_null_move(&self) -> Position {
        let mut next_board = self.board;
        next_board.current = !next_board.current;
        next_board.en_passant = None;

        let next_hash = ZHash::from(&next_board);

        Position {
            book_hash: book_hash_of(&next_board, next_hash),
            board: next_board,
            hash: next_hash,
            history: self.history.clone(),
        }
    }

    /// Whether the current position has occurred at least once before in
    /// `history` (i.e., this occurrence would be the second). Used for the
    /// "twofold inside the search tree is as good as a claimable draw"
    /// heuristic, since a genuine threefold claim additionally needs the
    /// pre-search game history (see [`Self::is_repetition_with_root`]).
    pub fn is_repetition(&self) -> bool {
        self.history.iter().any(|&h| h == self.hash)
    }

    /// Count occurrences of the current hash in `root_history` (the game's
    /// move list up to the start of search) plus `self.history` (moves
    /// played during search). A count >= 2 means the *current* occurrence
    /// is at least the third, i.e. a threefold repetition.
    pub fn repetition_count(&self, root_history: &[ZHash]) -> usize {
        root_history.iter().filter(|&&h| h == self.hash).count()
            + self.history.iter().filter(|&&h| h == self.hash).count()
    }

    pub fn side_to_move(&self) -> Color {
        self.board.current
    }

    /// A cheap, approximate hash of the position after `mv`, used only to
    /// prefetch the transposition-table bucket before the (more expensive)
    /// exact `play_move` is computed. Ignores castling-rights changes,
    /// which don't affect which cache line we'll want.
    pub fn approx_hash_after(&self, mv: Move) -> ZHash {
        let mut hash = self.hash;
        hash.toggle_side();

        if let Some(piece) = self.board.get_at(mv.src()) {
            hash.toggle_piece(piece, mv.src());
            hash.toggle_piece(piece, mv.tgt());
        }

        if let Some(captured) = self.board.get_at(mv.tgt()) {
            hash.toggle_piece(captured, mv.tgt());
        }

        hash
    }
}

/// Normalize `hash` (the full Zobrist key, which always mixes in the
/// en-passant file whenever `board.en_passant` is set) for book indexing: if
/// the en-passant square can't actually be captured to, its file is dead
/// weight that would otherwise make two transpositions of "the same
/// position, one reached via a double push the other via a single push"
/// compare unequal. Untoggle the ep key in that case.
fn book_hash_of(board: &Board, hash: ZHash) -> ZHash {
    match board.en_passant {
        Some(ep) if !ep_capture_is_legal(board) => {
            let mut h = hash;
            h.toggle_ep(ep.file() as usize);
            h
        }
        _ => hash,
    }
}

/// Whether some legal move from `board` is an en-passant capture. Only
/// called when `board.en_passant.is_some()`, i.e. right after a double pawn
/// push, so the full legal-move generation this relies on is rare rather
/// than on the hot per-node path.
fn ep_capture_is_legal(board: &Board) -> bool {
    board.legal_moves::<false>().iter().any(|mv| mv.is_en_passant())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARTPOS: &str =
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn hash_changes_after_move() {
        let board: Board = STARTPOS.parse().unwrap();
        let pos = Position::new(board);
        let mv = pos.board.legal_moves::<true>()[0];
        let next = pos.play_move(mv);
        assert_ne!(pos.hash, next.hash);
    }

    #[test]
    fn no_repetition_from_fresh_position() {
        let board: Board = STARTPOS.parse().unwrap();
        let pos = Position::new(board);
        assert!(!pos.is_repetition());
    }

    #[test]
    fn repeated_knight_shuffle_is_detected() {
        let board: Board = STARTPOS.parse().unwrap();
        let mut pos = Position::new(board);
        let start_hash = pos.hash;

        for mv_str in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let mv = pos
                .board
                .legal_moves::<true>()
                .into_iter()
                .find(|m| m.to_string() == mv_str)
                .expect("move should be legal");
            pos = pos.play_move(mv);
        }

        assert_eq!(pos.hash, start_hash);
        assert!(pos.is_repetition());
    }

    #[test]
    fn book_hash_ignores_a_dead_en_passant_file() {
        let with_ep: Board =
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".parse().unwrap();
        let without_ep: Board =
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".parse().unwrap();

        // No black pawn sits on d4 or f4, so the recorded ep square can
        // never actually be captured to: the raw hash still disagrees...
        assert_ne!(ZHash::from(&with_ep), ZHash::from(&without_ep));

        // ...but the book hash, which is meant to recognize these as the
        // same position, should agree.
        let with_ep_pos = Position::new(with_ep);
        let without_ep_pos = Position::new(without_ep);
        assert_eq!(with_ep_pos.book_hash, without_ep_pos.book_hash);
    }

    #[test]
    fn book_hash_keeps_a_capturable_en_passant_file() {
        let board: Board =
            "rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3".parse().unwrap();
        let pos = Position::new(board);

        // White's pawn on e5 can actually take on d6, so the ep file is
        // live information and should survive into the book hash.
        assert_eq!(pos.book_hash, pos.hash);
    }
}
