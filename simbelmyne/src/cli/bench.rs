use std::sync::atomic::AtomicU32;

use colored::Colorize;
use engine::position::Position;
use engine::search::{NodeCounter, SearchRunner};
use engine::time_control::TimeController;
use engine::transpositions::TTable;
use uci::time_control::TimeControl;

const BENCH_POSITIONS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
];

pub fn run_bench(depth: usize, fen: Option<String>) {
    match fen {
        Some(fen) => run_single(&fen, depth),
        None => {
            for fen in BENCH_POSITIONS {
                run_single(fen, depth);
            }
        }
    }
}

pub fn run_single(fen: &str, depth: usize) {
    let board = fen.parse().unwrap();
    let position = Position::new(board);
    let tt = TTable::with_capacity(64);
    let node_count = AtomicU32::new(0);
    let nodes = NodeCounter::new(&node_count);
    let mut runner = SearchRunner::new(0, &tt, nodes);

    let (tc, _handle) = TimeController::new(TimeControl::Depth(depth), position.side_to_move());
    let report = runner.search::<false>(position, tc);

    println!("{:17} {}", "FEN:".green(), fen);
    println!("{:17} {}", "Depth:".green(), depth);
    println!();

    let best_move = report.pv.first().map(|mv| mv.to_string()).unwrap_or_default();
    println!("{:17} {}", "Best move:".bright_cyan(), best_move);
    println!("{:17} {}", "Score:".bright_cyan(), report.score);
    println!("{:17} {}", "Nodes searched:".blue(), report.nodes);

    let time_spent = report.duration.as_millis().max(1);
    println!("{:17} {}ms", "Duration:".red(), time_spent);

    let knps = report.nodes as u128 / time_spent;
    println!("{:17} {}knps", "knps:".red(), knps);

    println!("{:17} {}‰", "TT fill:".purple(), report.hashfull);
    println!();
}
