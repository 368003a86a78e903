use clap::Subcommand;

use self::bench::run_bench;
use self::book::BookCommand;
use self::perft::run_perft;
use self::play::run_play;

pub mod bench;
pub mod book;
pub mod divide;
pub mod perft;
pub mod play;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Play an interactive game against the engine from the terminal.
    Play {
        /// Start from a FEN string
        #[arg(short, long, default_value = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")]
        fen: String,

        /// The depth the engine searches to for its own moves
        #[arg(short, long, value_name = "DEPTH", default_value = "6")]
        depth: usize,
    },

    /// Run a fixed-depth search benchmark over a set of positions.
    Bench {
        /// Set the search depth
        #[arg(short, long, value_name = "DEPTH", default_value = "10")]
        depth: usize,

        /// A single FEN string to benchmark, instead of the built-in suite
        #[arg(short, long, value_name = "FEN")]
        fen: Option<String>,
    },

    /// Count leaf nodes at increasing depths (move generation correctness).
    Perft {
        /// The desired search depth, in ply (half-turns)
        #[arg(short, long, default_value = "5")]
        depth: usize,

        /// A single FEN to run, instead of the built-in perft suite
        #[arg(short, long)]
        fen: Option<String>,

        /// Run the full built-in perft suite and diff against known counts
        #[arg(long)]
        all: bool,
    },

    /// Break perft down by root move, for debugging move generation.
    Divide {
        #[arg(short, long, default_value = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")]
        fen: String,

        #[arg(short, long, default_value = "4")]
        depth: usize,
    },

    /// Build, merge or inspect an opening book.
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },
}

impl Command {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            Command::Play { fen, depth } => run_play(&fen, depth)?,
            Command::Bench { depth, fen } => run_bench(depth, fen),
            Command::Perft { depth, fen, all } => run_perft(depth, fen, all)?,
            Command::Divide { fen, depth } => divide::run_divide(fen, depth)?,
            Command::Book { command } => command.run()?,
        };

        Ok(())
    }
}
