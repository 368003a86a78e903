use std::fmt::Display;
use std::io;
use std::io::Write;
use std::sync::atomic::AtomicU32;

use anyhow::anyhow;
use chess::bitboard::Bitboard;
use chess::board::Board;
use chess::piece::Piece;
use chess::square::Square;
use colored::*;
use engine::position::Position;
use engine::search::{NodeCounter, SearchRunner};
use engine::time_control::TimeController;
use engine::transpositions::TTable;
use uci::time_control::TimeControl;

struct Game {
    board: Board,
    highlights: Bitboard,
}

impl Game {
    fn play_turn(&mut self) -> anyhow::Result<()> {
        println!("{self}");

        let selected_square = get_instruction("Move which piece?\n > ")?;
        self.try_select(selected_square)?;

        let legal_moves = self.board.legal_moves::<true>();

        let mut highlights = Bitboard::from(selected_square);
        highlights |= legal_moves
            .iter()
            .filter(|mv| mv.src() == selected_square)
            .map(|mv| Bitboard::from(mv.tgt()))
            .collect();

        self.highlights = highlights;

        println!("{self}");

        let to = get_instruction(&format!(
            "Move where to?\n {} > ",
            selected_square.to_string().bright_blue()
        ))?;

        self.highlights = Bitboard::EMPTY;

        let mv = legal_moves
            .into_iter()
            .filter(|mv| mv.src() == selected_square)
            .find(|mv| mv.tgt() == to.into())
            .ok_or(anyhow!("Not a legal move!"))?;

        self.board = self.board.play_move(mv);

        Ok(())
    }

    fn try_select(&self, square: Square) -> anyhow::Result<Piece> {
        let selected = self
            .board
            .get_at(square)
            .ok_or(anyhow!("No piece on square {:?}", square))?;

        if selected.color() != self.board.current {
            Err(anyhow!("Selected piece belongs to the other player"))?;
        }

        Ok(selected)
    }
}

impl Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", "  a b c d e f g h \n".bright_blue())?;

        for rank in (0..8).rev() {
            write!(f, "{}", (rank + 1).to_string().bright_blue())?;
            write!(f, " ")?;

            for file in 0..8 {
                let current_square = Square::ALL[rank * 8 + file];

                let character = self
                    .board
                    .get_at(current_square)
                    .map(|piece| format!("{piece}"))
                    .unwrap_or(".".to_string());

                if self.highlights.is_empty() || self.highlights.contains(current_square) {
                    write!(f, "{}", character)?;
                } else {
                    write!(f, "{}", character.bright_black())?;
                }

                write!(f, " ")?;
            }
            write!(f, "{}", (rank + 1).to_string().bright_blue())?;
            write!(f, "\n")?;
        }
        write!(f, "{}", "  a b c d e f g h \n".bright_blue())?;

        Ok(())
    }
}

/// Play an interactive game against the engine from the terminal: the human
/// moves pieces by picking a source then a target square, the engine
/// answers with a fixed-depth search on its turn.
pub fn run_play(fen: &str, depth: usize) -> anyhow::Result<()> {
    let human = fen
        .parse::<Board>()
        .map_err(|_| anyhow!("Invalid FEN: {fen}"))?
        .current;

    let mut game = Game {
        board: fen.parse()?,
        highlights: Bitboard::EMPTY,
    };

    let tt = TTable::with_capacity(64);
    let node_count = AtomicU32::new(0);

    loop {
        println!("FEN: {}", game.board.to_fen());

        if game.board.legal_moves::<true>().is_empty() {
            println!("{}", "No legal moves. Game over.".bright_yellow());
            break;
        }

        if game.board.current == human {
            if let Err(error) = game.play_turn() {
                eprintln!("[{}]: {error}", "Error".red());
            }
        } else {
            println!("{game}");
            println!("{}", "Engine is thinking...".bright_black());

            let side = game.board.current;
            let position = Position::new(game.board);
            let nodes = NodeCounter::new(&node_count);
            let mut runner = SearchRunner::new(0, &tt, nodes);
            let (tc, _handle) = TimeController::new(TimeControl::Depth(depth), side);
            let report = runner.search::<false>(position, tc);

            let Some(&best) = report.pv.first() else {
                println!("{}", "Engine has no move to play.".red());
                break;
            };

            println!("Engine plays {}", best.to_string().bright_cyan());
            game.board = game.board.play_move(best);
        }
    }

    Ok(())
}

fn get_instruction(prompt: &str) -> anyhow::Result<Square> {
    let mut input = String::default();

    print!("{prompt}");
    io::stdout().flush().unwrap();
    io::stdin().read_line(&mut input).unwrap();

    input
        .trim()
        .parse::<Square>()
        .map_err(|_| anyhow!("Invalid square {}", input.trim()))
}
