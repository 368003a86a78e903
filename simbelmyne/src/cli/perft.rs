use anyhow::*;
use chess::board::Board;
use colored::*;
use std::time::Instant;

/// Well-known perft positions and their expected leaf counts at depths
/// 1, 2, 3, ... (https://www.chessprogramming.org/Perft_Results).
const PERFT_SUITE: &[(&str, &[u64])] = &[
    (
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        &[20, 400, 8_902, 197_281, 4_865_609],
    ),
    (
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        &[48, 2_039, 97_862, 4_085_603],
    ),
    ("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", &[14, 191, 2_812, 43_238, 674_624]),
    (
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        &[6, 264, 9_467, 422_333],
    ),
    (
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        &[44, 1_486, 62_379, 2_103_487],
    ),
    (
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        &[46, 2_079, 89_890, 3_894_594],
    ),
];

pub struct PerftResult {
    pub nodes: u64,
    pub duration: u128,
}

impl PerftResult {
    /// Return nodes per second in units of Meganodes (1m nodes) per second
    pub fn mega_nps(&self) -> f64 {
        if self.duration > 0 {
            self.nodes as f64 / self.duration as f64
        } else {
            0f64
        }
    }

    /// Return the run duration in milliseconds
    pub fn millis(&self) -> u128 {
        self.duration / 1000
    }
}

pub fn perform_perft<const BULK: bool>(board: Board, depth: usize) -> PerftResult {
    let start = Instant::now();
    let nodes = board.perft(depth);
    let duration = start.elapsed();

    PerftResult {
        nodes,
        duration: duration.as_micros(),
    }
}

const BULK: bool = true;

pub fn run_perft(depth: usize, fen: Option<String>, all: bool) -> anyhow::Result<()> {
    if all {
        run_suite();
    } else if let Some(fen) = fen {
        run_fen(fen, depth)?;
    } else {
        run_fen(PERFT_SUITE[0].0.to_string(), depth)?;
    }

    Ok(())
}

fn run_suite() {
    for (fen, expected) in PERFT_SUITE {
        let board: Board = fen.parse().unwrap();

        print!("{:<90} ", fen.blue());

        for (i, &expected) in expected.iter().enumerate() {
            let found = board.perft(i + 1);
            if found == expected {
                print!("{} ", found.to_string().green());
            } else {
                print!("{} ", format!("{found} (expected {expected})").red());
            }
        }

        println!();
    }
}

fn run_fen(fen: String, depth: usize) -> anyhow::Result<()> {
    let board: Board = fen.parse().unwrap();

    println!("{}: {}", "FEN".green(), fen.italic());
    println!("{}:\n\n{board}\n\n", "Board".green());

    for depth in 0..=depth {
        let result = perform_perft::<BULK>(board, depth);

        print!("Depth {}: ", depth.to_string().blue());
        print!("found {:>12} ", result.nodes.to_string().green());
        print!("in {:5}ms ({:.3}Mnps)", result.millis(), result.mega_nps());

        println!();
    }
    println!("\n");

    Ok(())
}
