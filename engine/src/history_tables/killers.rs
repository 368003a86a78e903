//! Killer moves: quiet moves that caused a beta cutoff at a given ply,
//! remembered so sibling nodes at the same ply try them early even before
//! consulting the (coarser) history tables.
use chess::movegen::moves::Move;

/// Two killer slots per ply, most-recent first. A new killer evicts the
/// older slot, so the table always reflects the two most recent cutoffs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Killers {
    moves: [Option<Move>; 2],
}

impl Default for Killers {
    fn default() -> Self {
        Self { moves: [None, None] }
    }
}

impl Killers {
    pub fn add(&mut self, mv: Move) {
        if self.moves[0] == Some(mv) {
            return;
        }

        self.moves[1] = self.moves[0];
        self.moves[0] = Some(mv);
    }

    pub fn moves(&self) -> [Option<Move>; 2] {
        self.moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::square::Square;
    use chess::movegen::moves::MoveType;

    #[test]
    fn most_recent_killer_is_first() {
        let mut killers = Killers::default();
        let a = Move::new(Square::E2, Square::E4, MoveType::Quiet);
        let b = Move::new(Square::D2, Square::D4, MoveType::Quiet);

        killers.add(a);
        killers.add(b);

        assert_eq!(killers.moves()[0], Some(b));
        assert_eq!(killers.moves()[1], Some(a));
    }

    #[test]
    fn readding_the_same_killer_is_a_no_op() {
        let mut killers = Killers::default();
        let a = Move::new(Square::E2, Square::E4, MoveType::Quiet);

        killers.add(a);
        killers.add(a);

        assert_eq!(killers.moves()[0], Some(a));
        assert_eq!(killers.moves()[1], None);
    }
}
