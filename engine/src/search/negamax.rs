//! The core alpha-beta search.
//!
//! Implements a fairly standard set of pruning/reduction techniques on top
//! of vanilla negamax: null-move pruning, internal iterative reduction,
//! reverse futility pruning, futility pruning, late move pruning, SEE
//! pruning, late move reductions and check/singular extensions.
use chess::movegen::moves::Move;

use super::params::*;
use super::SearchRunner;
use crate::evaluate::evaluate;
use crate::evaluate::Score;
use crate::evaluate::ScoreExt;
use crate::history_tables::pv::PVTable;
use crate::move_picker::MovePicker;
use crate::position::Position;
use crate::transpositions::NodeType;
use crate::transpositions::TTEntry;
use crate::transpositions::TablebaseProbe;

impl<'a> SearchRunner<'a> {
  /// Perform an alpha-beta search to `depth`, with a PV/zero window
  /// depending on `PV`.
  #[allow(clippy::too_many_arguments)]
  pub fn negamax<const PV: bool>(
    &mut self,
    pos: &Position,
    ply: usize,
    depth: usize,
    mut alpha: Score,
    mut beta: Score,
    pv: &mut PVTable,
    try_null: bool,
    cutnode: bool,
  ) -> Score {
    pv.clear();

    if !self.tc.should_continue(self.nodes.local()) {
      self.aborted = true;
      return Score::MINUS_INF;
    }

    // Drop into quiescence search once we've run out of depth.
    if depth == 0 {
      return self.quiescence_search::<PV>(pos, ply, alpha, beta);
    }

    self.nodes.increment();
    self.seldepth = self.seldepth.max(ply);

    let is_root = ply == 0;
    let in_check = pos.board.in_check();

    ////////////////////////////////////////////////////////////////////////
    //
    // Draw detection
    //
    ////////////////////////////////////////////////////////////////////////

    if !is_root && (pos.board.is_rule_draw() || pos.is_repetition()) {
      return 0;
    }

    if ply >= MAX_DEPTH {
      return evaluate(&pos.board);
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Mate distance pruning
    //
    // There's no point searching for a mate that's further away than one
    // we've already found higher up the tree.
    //
    ////////////////////////////////////////////////////////////////////////

    if !is_root {
      let mating_score = Score::MATE - ply as Score;
      let mated_score = -Score::MATE + ply as Score;
      alpha = alpha.max(mated_score);
      beta = beta.min(mating_score);

      if alpha >= beta {
        return alpha;
      }
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Transposition table lookup
    //
    ////////////////////////////////////////////////////////////////////////

    let tt_entry = self.tt.probe(pos.hash);
    let ttpv = PV || tt_entry.is_some_and(|entry| entry.get_ttpv());

    if let Some(entry) = tt_entry {
      if !is_root && !PV {
        if let Some(score) = entry.try_score(depth, alpha, beta, ply) {
          return score;
        }
      }
    }

    if let Some((score, node_type)) = self.tablebase.probe(pos.hash) {
      if !is_root {
        match node_type {
          NodeType::Exact => return score,
          NodeType::Lower if score >= beta => return score,
          NodeType::Upper if score <= alpha => return score,
          _ => {}
        }
      }
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Static evaluation
    //
    ////////////////////////////////////////////////////////////////////////

    let static_eval = if in_check {
      -Score::MATE + ply as Score
    } else if let Some(entry) = tt_entry {
      entry.get_eval()
    } else {
      evaluate(&pos.board)
    };

    let improving = !in_check
      && ply >= 2
      && static_eval > self.stack[ply - 2].eval;

    self.stack[ply].eval = static_eval;

    ////////////////////////////////////////////////////////////////////////
    //
    // Whole-node pruning (skipped for PV nodes, in check, or near mate
    // scores, where shortcuts are unsafe)
    //
    ////////////////////////////////////////////////////////////////////////

    let pruning_allowed =
      !PV && !in_check && !static_eval.is_mate() && !beta.is_mate();

    if pruning_allowed {
      // Reverse futility pruning: if our static eval already clears beta
      // by a comfortable margin, assume we'd hold it and cut early.
      if depth <= rfp_threshold() {
        let margin = rfp_margin() * depth as i32
          - if improving { rfp_improving_margin() } else { 0 };

        if static_eval - margin >= beta {
          return static_eval;
        }
      }

      // Null-move pruning: give the opponent a free move and see if we
      // still beat beta. If so, the position is so good that making any
      // move would also beat beta ("null move observation").
      if try_null
        && depth >= nmp_base_reduction()
        && static_eval >= beta - nmp_base_margin()
        && has_non_pawn_material(pos)
      {
        let margin = nmp_margin_factor() * depth as i32;
        let improving_margin = if improving { nmp_improving_margin() } else { 0 };

        if static_eval + margin - improving_margin >= beta {
          let reduction =
            nmp_base_reduction() + depth / nmp_reduction_factor();
          let next_depth = depth.saturating_sub(reduction + 1);

          let null_pos = pos.play_null_move();
          self.history.push_null_mv();

          let mut null_pv = PVTable::new();
          let score = -self.negamax::<false>(
            &null_pos,
            ply + 1,
            next_depth,
            -beta,
            -beta + 1,
            &mut null_pv,
            false,
            !cutnode,
          );

          self.history.pop_mv();

          if self.aborted {
            return Score::MINUS_INF;
          }

          if score >= beta {
            return if score.is_mate() { beta } else { score };
          }
        }
      }
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Internal iterative reduction
    //
    // If we don't have a TT move to try first, the ordering of this node
    // is going to be poor, so searching it at full depth isn't worth it.
    //
    ////////////////////////////////////////////////////////////////////////

    let tt_move = tt_entry.and_then(|entry| entry.get_move());
    let mut depth = depth;

    if !in_check && tt_move.is_none() && depth >= iir_threshold() {
      depth -= iir_reduction();
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Main move loop
    //
    ////////////////////////////////////////////////////////////////////////

    let mut picker = MovePicker::new::<true>(pos, tt_move, ply);
    let mut best_score = Score::MINUS_INF;
    let mut best_move = None;
    let mut node_type = NodeType::Upper;
    let mut move_count = 0;
    let mut tried_quiets: Vec<Move> = Vec::new();
    let mut child_pv = PVTable::new();

    while let Some(mv) = picker.next(&self.history) {
      let is_quiet = mv.is_quiet() || mv.is_double_push() || mv.is_castle();
      let next_pos = pos.play_move(mv);
      let gives_check = next_pos.board.in_check();

      ////////////////////////////////////////////////////////////////////
      //
      // Move-loop pruning (quiet, non-check, non-root moves only)
      //
      ////////////////////////////////////////////////////////////////////

      if pruning_allowed
        && !is_root
        && best_score > -Score::LOWEST_MATE
        && is_quiet
        && !gives_check
      {
        // Late move pruning: once we've searched enough quiet moves
        // without a cutoff, stop bothering with the rest.
        if depth <= lmp_threshold() {
          let limit = lmp_base() + lmp_factor() * depth * depth;

          if move_count >= limit {
            break;
          }
        }

        // Futility pruning: a quiet move this far behind alpha is
        // vanishingly unlikely to recover in one ply.
        if depth <= fp_threshold() {
          let margin = fp_base() + fp_margin() * depth as i32;

          if static_eval + margin <= alpha {
            break;
          }
        }

        // History pruning: moves with a poor track record at shallow
        // depths aren't worth searching either.
        if depth <= hp_threshold() {
          let hist_score = self.history.get_hist_score(mv, &pos.board);
          let margin =
            quiet_hp_margin() * depth as i32 + quiet_hp_offset();

          if hist_score < margin {
            move_count += 1;
            continue;
          }
        }
      }

      // Strength weakening: at reduced `Strength`/`UCI_Elo`, probabilistically
      // ignore a candidate beyond the first rather than reduce depth or
      // quality outright. Never skips the first move tried at a node, so
      // there's always at least one legal move searched.
      if self.strength.limited && move_count > 0 {
        let is_easy = !is_quiet || gives_check;
        if self.strength.skip_move(pos.hash.0, mv, ply, is_easy) {
          move_count += 1;
          continue;
        }
      }

      // SEE pruning: don't bother with moves that lose material by more
      // than a depth-scaled margin, tactical or quiet.
      if pruning_allowed && !is_root && depth <= 10 {
        let margin = if is_quiet {
          -see_quiet_margin() * depth as i32
        } else {
          -see_tactical_margin() * depth as i32
        };

        if !pos.board.see(mv, margin) {
          move_count += 1;
          continue;
        }
      }

      self.history.push_mv(mv, &pos.board);
      self.tt.prefetch(pos.approx_hash_after(mv));
      let start_nodes = self.nodes.local();

      if is_quiet {
        tried_quiets.push(mv);
      }

      ////////////////////////////////////////////////////////////////////
      //
      // Extensions
      //
      ////////////////////////////////////////////////////////////////////

      let extension: usize = if in_check { 1 } else { 0 };

      ////////////////////////////////////////////////////////////////////
      //
      // Recursive search, with late move reductions
      //
      ////////////////////////////////////////////////////////////////////

      let score = if move_count == 0 {
        -self.negamax::<PV>(
          &next_pos,
          ply + 1,
          depth - 1 + extension,
          -beta,
          -alpha,
          &mut child_pv,
          true,
          false,
        )
      } else {
        let mut reduction = 0;

        if depth >= lmr_min_depth() && move_count >= lmr_threshold() {
          reduction = lmr_reduction(depth, move_count);

          if is_quiet {
            let hist_score = self.history.get_hist_score(mv, &pos.board);
            reduction = reduction
              .saturating_add_signed(-(hist_score / hist_lmr_divisor()) as isize);
          }

          if !ttpv {
            reduction += 1;
          }

          if cutnode {
            reduction += 1;
          }
        }

        let reduced_depth =
          (depth + extension).saturating_sub(1 + reduction).max(1);

        let mut score = -self.zero_window(
          &next_pos,
          ply + 1,
          reduced_depth,
          -alpha,
          &mut child_pv,
          true,
          true,
        );

        if score > alpha && reduced_depth < depth - 1 + extension {
          score = -self.zero_window(
            &next_pos,
            ply + 1,
            depth - 1 + extension,
            -alpha,
            &mut child_pv,
            true,
            !cutnode,
          );
        }

        if PV && score > alpha {
          score = -self.negamax::<true>(
            &next_pos,
            ply + 1,
            depth - 1 + extension,
            -beta,
            -alpha,
            &mut child_pv,
            true,
            false,
          );
        }

        score
      };

      self.history.pop_mv();
      let nodes_spent = self.nodes.local() - start_nodes;

      if is_root {
        self.history.add_nodes(mv, nodes_spent);
      }

      move_count += 1;

      if self.aborted {
        return Score::MINUS_INF;
      }

      if score > best_score {
        best_score = score;
        best_move = Some(mv);

        if score > alpha {
          alpha = score;
          node_type = NodeType::Exact;
          pv.add_to_front(mv, &child_pv);

          if score >= beta {
            node_type = NodeType::Lower;

            if is_quiet {
              self.history.update_quiet(
                &pos.board,
                mv,
                &tried_quiets,
                depth,
                ply,
              );
            }

            break;
          }
        }
      }
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Checkmate / stalemate
    //
    ////////////////////////////////////////////////////////////////////////

    if move_count == 0 {
      return if in_check {
        -Score::MATE + ply as Score
      } else {
        0
      };
    }

    ////////////////////////////////////////////////////////////////////////
    //
    // Update the transposition table
    //
    ////////////////////////////////////////////////////////////////////////

    if !self.tt.is_busy(pos.hash) || node_type != NodeType::Upper {
      self.tt.insert(TTEntry::new(
        pos.hash,
        best_move.unwrap_or(Move::NULL),
        best_score,
        static_eval,
        depth,
        node_type,
        self.tt.get_age(),
        ttpv,
        ply,
      ));
    }

    best_score
  }
}

/// Whether the side to move has any piece other than pawns and the king,
/// used to gate null-move pruning (null move is unsound in pawn/king-only
/// endgames, e.g. zugzwang).
fn has_non_pawn_material(pos: &Position) -> bool {
  use chess::bitboard::Bitboard;
  use chess::piece::PieceType;

  let us = pos.board.current;
  let ours = pos.board.occupied_by(us);

  (pos.board.piece_bbs[PieceType::Knight] & ours) != Bitboard::EMPTY
    || (pos.board.piece_bbs[PieceType::Bishop] & ours) != Bitboard::EMPTY
    || (pos.board.piece_bbs[PieceType::Rook] & ours) != Bitboard::EMPTY
    || (pos.board.piece_bbs[PieceType::Queen] & ours) != Bitboard::EMPTY
}
