use std::path::PathBuf;

use chess::board::Board;
use clap::Parser;
use engine::book::Book;
use engine::uci::Engine;

use crate::cli::Command;

mod cli;

const DEFAULT_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A somewhat UCI compliant chess engine that could probably beat you.
///
/// With no subcommand, runs the UCI protocol loop over stdin/stdout. Use a
/// subcommand for benchmarking, perft testing, book building, or playing an
/// interactive terminal game instead.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Opening book file to consult (only used by the UCI loop).
    #[arg(short, long)]
    book: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(command) => command.run(),
        None => {
            let board: Board = DEFAULT_FEN.parse().expect("default FEN is well-formed");
            let book = cli
                .book
                .map(|path| Book::load(&path))
                .transpose()?;

            Engine::new(board).with_book(book).run()
        }
    }
}
