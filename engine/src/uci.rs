//! The UCI engine front: the seam between a text-protocol dispatcher (kept
//! external, per the non-goal list) and the worker tree/root search.
//!
//! [`Engine`] owns the position, the shared transposition table, the
//! worker-tree root, and the options registry. The root's own
//! [`SearchRunner`] doesn't run on the stdin-reading thread: it lives on a
//! dedicated [`RootSearchThread`], fed over an `mpsc` channel, the same way
//! the teacher's own UCI loop hands a search off to a `SearchThread` rather
//! than blocking its protocol loop on it (see [`RootSearchThread`]) — a
//! `stop`/`quit`/`ponderhit` arriving while a search is in flight has to be
//! read and acted on immediately, not queued up behind `go infinite`.
//! `Hash`/`Threads`/`Clear Hash` tear down and rebuild the table and the
//! worker tree rather than resizing in place: both are shared via a
//! `&'static` reference handed to every worker thread for its whole
//! lifetime, so a resize is a new allocation plus a fresh tree rather than a
//! mutation of the old one.
use std::io::{stdout, Write};
use std::sync::atomic::AtomicU32;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use chess::board::Board;

use uci::client::UciClientMessage;
use uci::engine::{IdType, UciEngineMessage};
use uci::options::UciOption;
use uci::time_control::TimeControl;

use crate::book::Book;
use crate::communicator::{Command, Communicator, InProcessCommunicator, JobId};
use crate::evaluate::{Score, ScoreExt};
use crate::options::Parameters;
use crate::position::Position;
use crate::search::params::{DEFAULT_TT_SIZE, MAX_DEPTH};
use crate::search::strength::Strength;
use crate::search::SearchRunner;
use crate::time_control::{TimeControlHandle, TimeController};
use crate::transpositions::TTable;
use crate::worker::{create_workers, WorkerHandle};

const NAME: &str = "Simbelmyne";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Names that get intercepted by the engine front itself rather than just
/// landing in the registry: they require tearing down shared, `'static`
/// state (the table, the worker tree) that no `Parameters` callback can
/// reach without an exclusive `&mut Engine`.
const HASH: &str = "Hash";
const CLEAR_HASH: &str = "Clear Hash";
const THREADS: &str = "Threads";
const LIMIT_STRENGTH: &str = "LimitStrength";
const STRENGTH: &str = "Strength";
const UCI_ELO: &str = "UCI_Elo";
const MAX_NPS: &str = "MaxNPS";

/// The UCI-facing engine: owns the position, the shared table and worker
/// tree, and the options registry, and turns parsed [`UciClientMessage`]s
/// into worker-tree commands and [`UciEngineMessage`] output lines.
pub struct Engine {
    position: Position,
    debug: bool,
    params: Parameters,
    book: Option<Book>,

    tt: &'static TTable,
    tt_size_mb: usize,
    num_threads: usize,
    requested_threads: usize,
    workers: Vec<WorkerHandle>,
    root_inbox: Arc<InProcessCommunicator>,
    search_thread: RootSearchThread,
    tc_handle: Option<TimeControlHandle>,
    next_job_id: JobId,
    strength: Strength,
    search_seed: u64,
}

impl Engine {
    pub fn new(board: Board) -> Self {
        let tt: &'static TTable = Box::leak(Box::new(TTable::with_capacity(DEFAULT_TT_SIZE)));
        let root_nodes: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));
        let root_inbox = Arc::new(InProcessCommunicator::new());

        // Nothing to drain for yet, but spawn the collector up front so a
        // `ReportResult`/`ReportStats` from a worker never piles up
        // unconsumed in `root_inbox` once threads exist.
        spawn_stats_collector(root_inbox.clone());

        let seed = fresh_seed();

        Self {
            position: Position::new(board),
            debug: false,
            params: default_params(tt),
            book: None,
            tt,
            tt_size_mb: DEFAULT_TT_SIZE,
            num_threads: 1,
            requested_threads: 1,
            workers: Vec::new(),
            root_inbox,
            search_thread: RootSearchThread::new(SearchRunner::new(
                0,
                tt,
                crate::search::NodeCounter::new(root_nodes),
            )),
            tc_handle: None,
            next_job_id: 0,
            strength: Strength::from_options(false, 1000, 2850, seed),
            search_seed: seed,
        }
    }

    /// Attach (or detach, with `None`) an opening book consulted by `OwnBook`.
    pub fn with_book(mut self, book: Option<Book>) -> Self {
        self.book = book;
        self
    }

    /// Read UCI commands from stdin until `quit`, writing responses to
    /// stdout. Malformed lines are reported and otherwise ignored, same as
    /// the rest of the UCI protocol's lack of an error channel.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let stdin = std::io::stdin();

        for line in stdin.lines() {
            let line = line?;

            match line.trim().parse::<UciClientMessage>() {
                Ok(msg) => {
                    if matches!(msg, UciClientMessage::Quit) {
                        break;
                    }
                    self.receive(msg);
                }
                Err(err) => println!("{err}: {line}"),
            }

            stdout().flush()?;
        }

        Ok(())
    }

    /// Dispatch one parsed client message.
    pub fn receive(&mut self, msg: UciClientMessage) {
        use UciClientMessage::*;

        match msg {
            Uci => self.handshake(),

            Debug(flag) => self.debug = flag,

            IsReady => println!("{}", UciEngineMessage::ReadyOk),

            SetOption(name, value) => self.set_option(&name, &value),

            UciNewGame => self.new_game(),

            Position(board, moves) => {
                let mut position = Position::new(board);
                for mv in moves {
                    position = position.play_bare_move(mv);
                }
                self.position = position;
            }

            Go(tc) => self.go(tc),

            Stop => self.stop(),

            // Handled in `run`'s loop before reaching here.
            Quit => {}
        }
    }

    fn handshake(&self) {
        println!("{}", UciEngineMessage::Id(IdType::Name(format!("{NAME} {VERSION}"))));
        println!("{}", UciEngineMessage::Id(IdType::Author(AUTHOR.to_string())));

        for option in self.params.uci_options() {
            println!("{}", UciEngineMessage::UciOption(option));
        }

        println!("{}", UciEngineMessage::UciOk);
    }

    fn set_option(&mut self, name: &str, value: &str) {
        self.params.set(name, value);

        match name {
            HASH => {
                let mb = self.params.get_spin(HASH).unwrap_or(self.tt_size_mb as i32);
                self.resize_tt(mb as usize);
            }
            CLEAR_HASH => self.resize_tt(self.tt_size_mb),
            THREADS => {
                let n = self.params.get_spin(THREADS).unwrap_or(self.requested_threads as i32);
                self.requested_threads = n.max(1) as usize;
                self.apply_thread_count();
            }
            LIMIT_STRENGTH | STRENGTH | UCI_ELO => self.recompute_strength(),
            _ => {}
        }
    }

    fn resize_tt(&mut self, mb: usize) {
        self.tt_size_mb = mb;
        let tt: &'static TTable = Box::leak(Box::new(TTable::with_capacity(mb)));
        let root_nodes: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));

        self.tt = tt;
        let runner = SearchRunner::new(0, tt, crate::search::NodeCounter::new(root_nodes));
        self.search_thread.replace_runner(runner);
        self.workers = create_workers(self.num_threads.saturating_sub(1), tt, self.root_inbox.clone());
    }

    /// Rebuild the worker tree for `requested_threads`, except when strength
    /// is limited: weakened play keeps only a single thread once
    /// `LimitStrength` or `Strength < 1000` is in effect, regardless of what
    /// `Threads` asks for.
    fn apply_thread_count(&mut self) {
        self.num_threads = if self.strength.limited { 1 } else { self.requested_threads };
        self.workers = create_workers(self.num_threads.saturating_sub(1), self.tt, self.root_inbox.clone());
    }

    fn recompute_strength(&mut self) {
        let limit_strength = self.params.get_check(LIMIT_STRENGTH).unwrap_or(false);
        let strength = self.params.get_spin(STRENGTH).unwrap_or(1000);
        let elo = self.params.get_spin(UCI_ELO).unwrap_or(2850);

        self.strength = Strength::from_options(limit_strength, strength, elo, self.search_seed);
        self.apply_thread_count();
    }

    fn new_game(&mut self) {
        self.position = Position::new(Board::default());
        self.tc_handle = None;
        self.search_seed = fresh_seed();
        self.strength = Strength { seed: self.search_seed, ..self.strength };
        self.resize_tt(self.tt_size_mb);
    }

    fn stop(&mut self) {
        if let Some(handle) = &self.tc_handle {
            handle.stop();
        }
        for worker in &self.workers {
            worker.comm.enqueue(Command::StopSearch);
        }
    }

    fn go(&mut self, tc: TimeControl) {
        if self.params.get_check("OwnBook").unwrap_or(false) {
            if let Some(book) = &self.book {
                if let Some(mv) = book.best_move(self.position.book_hash.0) {
                    println!("{}", UciEngineMessage::BestMove(mv));
                    return;
                }
            }
        }

        self.tt.increment_age();

        let root_history: Vec<_> = self.position.history.iter().copied().collect();
        for worker in &self.workers {
            worker.comm.enqueue(Command::InitSearch {
                position: Box::new(self.position.clone()),
                root_history: root_history.clone(),
                clear_history: false,
            });
        }

        self.next_job_id += 1;
        for worker in &self.workers {
            worker.comm.enqueue(Command::StartSearch {
                job_id: self.next_job_id,
                alpha: -Score::MATE,
                beta: Score::MATE,
                depth: MAX_DEPTH,
            });
        }

        let max_nps = self.params.get_spin(MAX_NPS).unwrap_or(0).max(0) as u32;
        let (controller, handle) = TimeController::new(tc, self.position.side_to_move());
        let controller = controller.with_max_nps(self.strength.max_nps(max_nps));
        self.tc_handle = Some(handle);

        // Hand the actual search off to the dedicated root thread and return
        // immediately: `run`'s stdin loop keeps reading lines (`stop`,
        // `quit`, a future `ponderhit`) while the search is in flight. `stop`
        // reaches it through `handle` above (a thread-safe atomic flag the
        // search polls on every checkup), not through this channel.
        let worker_comms: Vec<Arc<InProcessCommunicator>> =
            self.workers.iter().map(|w| w.comm.clone()).collect();
        self.search_thread.search(self.position.clone(), controller, self.strength, worker_comms);
    }
}

/// Runs the root's own [`SearchRunner`] on a dedicated thread, fed over an
/// `mpsc` channel, so the stdin-reading thread never blocks on a search (in
/// particular `go infinite`, which only ever terminates via `stop`). Modeled
/// directly on the teacher's own `SearchThread`/`SearchCommand` pair: a
/// persistent thread owns the mutable search state, and every command that
/// doesn't need a reply is a fire-and-forget `send`.
struct RootSearchThread {
    tx: mpsc::Sender<RootCommand>,
}

enum RootCommand {
    /// Run one root search to completion, then forward `StopSearch` to the
    /// helper workers (their Lazy-SMP siblings have nothing left to search
    /// for) and print the chosen move.
    Search {
        position: Position,
        tc: TimeController,
        strength: Strength,
        worker_comms: Vec<Arc<InProcessCommunicator>>,
    },
    /// Swap in a freshly built runner after a `Hash`/`Clear Hash` resize.
    ReplaceRunner(SearchRunner<'static>),
}

impl RootSearchThread {
    fn new(root_runner: SearchRunner<'static>) -> Self {
        let (tx, rx) = mpsc::channel::<RootCommand>();

        thread::spawn(move || {
            let mut root_runner = root_runner;

            for cmd in rx.iter() {
                match cmd {
                    RootCommand::ReplaceRunner(runner) => root_runner = runner,

                    RootCommand::Search { position, tc, strength, worker_comms } => {
                        root_runner.strength = strength;
                        let report = root_runner.search::<true>(position, tc);

                        for comm in &worker_comms {
                            comm.enqueue(Command::StopSearch);
                        }

                        match report.pv.first() {
                            Some(&mv) => println!("{}", UciEngineMessage::BestMove(mv)),
                            // No legal root move: the UCI layer's
                            // conventional way of saying so, rather than a
                            // move the position can't produce.
                            None => println!("bestmove 0000"),
                        }
                        let _ = stdout().flush();
                    }
                }
            }
        });

        Self { tx }
    }

    fn search(
        &self,
        position: Position,
        tc: TimeController,
        strength: Strength,
        worker_comms: Vec<Arc<InProcessCommunicator>>,
    ) {
        let _ = self.tx.send(RootCommand::Search { position, tc, strength, worker_comms });
    }

    fn replace_runner(&self, runner: SearchRunner<'static>) {
        let _ = self.tx.send(RootCommand::ReplaceRunner(runner));
    }
}

/// Declare every slot in the `Configuration` surface. `Hash`, `Clear Hash`,
/// `Threads`, `Contempt`, and the strength-weakening quartet
/// (`LimitStrength`/`Strength`/`UCI_Elo`/`MaxNPS`, via [`recompute_strength`])
/// have real side effects wired up; the rest round-trip through
/// `setoption`/`uci` without the search core consulting them yet (`MultiPV`
/// in particular — see the design ledger).
///
/// [`recompute_strength`]: Engine::recompute_strength
fn default_params(tt: &'static TTable) -> Parameters {
    let mut params = Parameters::new();

    params.declare_spin(HASH, DEFAULT_TT_SIZE as i32, 1, 1 << 16);
    params.declare_button(CLEAR_HASH, || {});
    params.declare_spin(THREADS, 1, 1, 512);
    params.declare_check("Ponder", false);
    params.declare_check("UCI_AnalyseMode", false);
    params.declare_spin("MultiPV", 1, 1, 218);
    params.declare_spin("MinProbeDepth", 0, 0, 100);
    params.declare_spin("Strength", 1000, 0, 1000);
    params.declare_check("LimitStrength", false);
    params.declare_spin("UCI_Elo", 2850, 500, 2850);
    params.declare_spin("MaxNPS", 0, 0, i32::MAX);
    params.declare_check("OwnBook", false);
    params.declare_spin_on_change("Contempt", 0, -1000, 1000, move |v| tt.set_contempt(v as i16));
    params.declare_spin("AnalyzeContempt", 0, -1000, 1000);
    params.declare_check("AutoContempt", false);
    params.declare_string("Opponent", "");
    params.declare_string("ContemptFile", "");
    params.declare_check("AnalysisAgeHash", false);

    #[cfg(feature = "spsa")]
    {
        use crate::search::params::SPSA_UCI_OPTIONS;
        for option in SPSA_UCI_OPTIONS {
            let UciOption { name, option_type } = option;
            match option_type {
                uci::options::OptionType::Spin { min, max, default } => {
                    params.declare_spin(name, default, min, max);
                }
                _ => {}
            }
        }
    }

    params
}

/// Drain `root_inbox` for the lifetime of the engine so a worker's
/// `ReportResult`/`ReportStats` never accumulates unconsumed: only the
/// root's own search (run on [`RootSearchThread`]) produces the reported
/// best move, so nothing downstream needs these beyond keeping the queue
/// from growing.
fn spawn_stats_collector(root_inbox: Arc<InProcessCommunicator>) {
    std::thread::spawn(move || loop {
        root_inbox.wait_and_drain();
    });
}

/// A fresh seed for the strength-weakening skip-move function, rolled on
/// construction and on every `ucinewgame` so weakened play isn't predictable
/// from one game to the next.
fn fresh_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9e3779b97f4a7c15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_prints_uciok_and_every_declared_option() {
        let engine = Engine::new(Board::default());
        // `handshake` only prints; this just asserts construction and the
        // registry population succeed without panicking.
        assert!(!engine.params.uci_options().is_empty());
    }

    #[test]
    fn set_option_clamps_hash_and_rebuilds_the_table() {
        let mut engine = Engine::new(Board::default());
        engine.set_option(HASH, "9999999");
        assert_eq!(engine.tt_size_mb, 1 << 16);
    }

    #[test]
    fn limit_strength_pins_the_thread_count_regardless_of_threads_option() {
        let mut engine = Engine::new(Board::default());
        engine.set_option(THREADS, "4");
        assert_eq!(engine.num_threads, 4);

        engine.set_option(LIMIT_STRENGTH, "true");
        assert_eq!(engine.num_threads, 1, "limited strength forces single-threaded search");
        assert!(engine.strength.limited);

        engine.set_option(LIMIT_STRENGTH, "false");
        assert_eq!(engine.num_threads, 4, "lifting the limit restores the requested thread count");
    }

    #[test]
    fn go_infinite_returns_immediately_instead_of_blocking_the_caller() {
        use std::time::{Duration, Instant};

        let mut engine = Engine::new(Board::default());

        let start = Instant::now();
        engine.receive(UciClientMessage::Go(TimeControl::Infinite));
        let dispatch_time = start.elapsed();

        // `go infinite` only ever ends via `stop`; if `receive` ran the
        // search on this thread, this assertion would simply never get a
        // chance to run.
        assert!(
            dispatch_time < Duration::from_millis(500),
            "go() must hand the search off to a background thread rather than block the caller, took {dispatch_time:?}"
        );

        // Still responsive to `stop` right after, same as the stdin loop
        // would be while a search is in flight.
        engine.receive(UciClientMessage::Stop);
    }

    #[test]
    fn own_book_short_circuits_search_when_a_move_is_known() {
        let mut engine = Engine::new(Board::default());
        engine.set_option("OwnBook", "true");

        let book = Book::new();
        let root = book.root();
        let mv = Board::default().legal_moves::<true>()[0];
        let next = Board::default().play_move(mv);
        book.link_child(&root, mv, crate::zobrist::ZHash::from(&next).0);

        engine.book = Some(book);
        // `go` prints directly to stdout; just confirm the book lookup
        // path itself resolves to the linked move.
        let chosen = engine.book.as_ref().unwrap().best_move(engine.position.book_hash.0);
        assert_eq!(chosen, Some(mv));
    }
}
