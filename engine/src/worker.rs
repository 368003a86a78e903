//! The worker tree: a bounded-fan-out hierarchy of OS threads that share one
//! transposition table, coordinated over [`crate::communicator`].
//!
//! The root of the tree is the engine front itself (see [`crate::uci`]),
//! which drives its own [`crate::search::SearchRunner`] synchronously rather
//! than through a communicator — there's no parent above it to coalesce
//! commands for. Everything below the root is a [`WorkerHandle`]: an OS
//! thread running [`run_worker`], reachable only through its communicator.
//!
//! Every worker runs its own complete iterative-deepening search (a Lazy-SMP
//! sibling of the root's, seeded from the same position) rather than a
//! single depth-bounded call dispatched per `START_SEARCH`: the root's
//! [`crate::search::SearchRunner::search`] already owns the aspiration-window
//! and time-allocation logic end to end, and re-deriving that externally per
//! command would just duplicate it. A worker's own report is relayed upward
//! purely for bookkeeping; only the root's result is used to choose a move,
//! the same way the helper threads spawned per iteration in simbelmyne's own
//! UCI loop never influence the reported best move themselves.
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::thread;

use chess::board::Board;
use uci::time_control::TimeControl;

use crate::communicator::{Command, Communicator, InProcessCommunicator, JobId, JobStopSource};
use crate::history_tables::History;
use crate::position::Position;
use crate::search::{NodeCounter, SearchRunner};
use crate::time_control::TimeController;
use crate::transpositions::TTable;

/// Maximum number of direct children any worker (including the root) may
/// spawn. Keeps the tree shallow: with four children per node, a thousand
/// helper threads are still only five levels deep.
pub const MAX_CHILDREN: usize = 4;

/// A handle the parent keeps for one child subtree: the communicator used to
/// reach it, and the join handle for the thread at its root.
pub struct WorkerHandle {
    pub comm: Arc<InProcessCommunicator>,
    join: Option<thread::JoinHandle<()>>,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.join.take() {
            self.comm.enqueue(Command::Quit);
            let _ = handle.join();
        }
    }
}

/// Build a worker tree of `num_threads` helper workers beneath the root,
/// fanning out with at most [`MAX_CHILDREN`] children per node. `root_inbox`
/// is the communicator the engine front itself drains for `ReportResult`,
/// `ReportStats`, `StopAck` and `QuitAck` bubbling up from these workers.
///
/// Returns the direct children of the root: forwarding a command to every
/// entry reaches the whole tree, since each worker in turn forwards to its
/// own children.
pub fn create_workers(
    num_threads: usize,
    tt: &'static TTable,
    root_inbox: Arc<InProcessCommunicator>,
) -> Vec<WorkerHandle> {
    split_evenly(num_threads, MAX_CHILDREN)
        .into_iter()
        .enumerate()
        .filter(|(_, n)| *n > 0)
        .map(|(i, n)| spawn_worker(i + 1, n, tt, root_inbox.clone()))
        .collect()
}

/// Divide `total` into at most `buckets` parts, as evenly as possible.
fn split_evenly(total: usize, buckets: usize) -> Vec<usize> {
    let mut parts = vec![total / buckets; buckets];
    for part in parts.iter_mut().take(total % buckets) {
        *part += 1;
    }
    parts
}

/// Spawn one worker owning `subtree_threads` OS threads: one for itself, the
/// rest split recursively among its own children.
fn spawn_worker(
    id: usize,
    subtree_threads: usize,
    tt: &'static TTable,
    parent: Arc<InProcessCommunicator>,
) -> WorkerHandle {
    let comm = Arc::new(InProcessCommunicator::new());
    let thread_comm = comm.clone();

    let children_threads = split_evenly(subtree_threads.saturating_sub(1), MAX_CHILDREN);

    let join = thread::spawn(move || {
        let children: Vec<WorkerHandle> = children_threads
            .into_iter()
            .enumerate()
            .filter(|(_, n)| *n > 0)
            .map(|(i, n)| spawn_worker(id * MAX_CHILDREN + i + 1, n, tt, thread_comm.clone()))
            .collect();

        run_worker(id, thread_comm, parent, children, tt);
    });

    WorkerHandle { comm, join: Some(join) }
}

/// Apply (or no-op, outside the `spsa` build) a `SET_PARAM` command.
fn apply_set_param(name: &str, value: i32) {
    #[cfg(feature = "spsa")]
    crate::search::params::set_param(name, value);
    #[cfg(not(feature = "spsa"))]
    let _ = (name, value);
}

/// Per-worker main loop: drain commands from `comm`, forward structural
/// commands down to `children`, run a local sibling search when a job is
/// pending and still current, and relay reports/acks up to `parent`.
fn run_worker(
    id: usize,
    comm: Arc<InProcessCommunicator>,
    parent: Arc<InProcessCommunicator>,
    children: Vec<WorkerHandle>,
    tt: &'static TTable,
) {
    let node_counter = AtomicU32::new(0);
    let mut runner = SearchRunner::new(id, tt, NodeCounter::new(&node_counter));
    let mut position = Position::new(Board::default());
    let mut pending: Option<(JobId, usize)> = None;
    let mut quitting = false;

    'outer: loop {
        for cmd in comm.wait_and_drain() {
            match cmd {
                Command::InitSearch { position: pos, root_history: rh, clear_history } => {
                    for child in &children {
                        child.comm.enqueue(Command::InitSearch {
                            position: pos.clone(),
                            root_history: rh.clone(),
                            clear_history,
                        });
                    }
                    position = *pos;
                    if clear_history {
                        runner.history = History::boxed();
                    }
                }

                Command::StartSearch { job_id, alpha, beta, depth } => {
                    for child in &children {
                        child.comm.enqueue(Command::StartSearch { job_id, alpha, beta, depth });
                    }
                    pending = Some((job_id, depth));
                }

                Command::StopSearch => {
                    comm.arm_stop_ack(children.len());
                    for child in &children {
                        child.comm.enqueue(Command::StopSearch);
                    }
                    // If nothing's actually running right now, we've already
                    // drained; otherwise the in-flight `runner.search` call
                    // below unwinds on its own (via `JobStopSource`) and acks
                    // once it returns.
                    if pending.is_none() {
                        comm.self_drained_stop();
                        if comm.has_stop_ack() {
                            parent.enqueue(Command::StopAck);
                        }
                    }
                }

                Command::SetParam { name, value } => {
                    for child in &children {
                        child.comm.enqueue(Command::SetParam { name: name.clone(), value });
                    }
                    apply_set_param(&name, value);
                }

                Command::Quit => {
                    comm.arm_quit_ack(children.len());
                    for child in &children {
                        child.comm.enqueue(Command::Quit);
                    }
                    quitting = true;
                    if children.is_empty() {
                        comm.self_drained_quit();
                        parent.enqueue(Command::QuitAck);
                        break 'outer;
                    }
                }

                // These only ever arrive here from one of our own children;
                // relay upward unchanged (REPORT_STATS is re-coalesced by
                // the parent's own `enqueue`).
                Command::ReportResult { .. } | Command::ReportStats { .. } => {
                    parent.enqueue(cmd);
                }

                Command::StopAck => {
                    if comm.child_stop_ack() {
                        parent.enqueue(Command::StopAck);
                    }
                }

                Command::QuitAck => {
                    if comm.child_quit_ack() {
                        parent.enqueue(Command::QuitAck);
                        if quitting {
                            break 'outer;
                        }
                    }
                }

                // Thread counts are fixed at tree-construction time; forward
                // so descendants stay informed, nothing to apply locally.
                Command::AssignThreads { .. } => {}
            }
        }

        let Some((job_id, depth)) = pending.take() else {
            continue;
        };

        if comm.should_stop(job_id) {
            continue;
        }

        let stop_source = Arc::new(JobStopSource::new(comm.clone(), job_id));
        let (tc, _handle) = TimeController::new(TimeControl::Depth(depth.max(1)), position.side_to_move());
        let tc = tc.with_stop_source(stop_source);

        let report = runner.search::<false>(position.clone(), tc);

        comm.self_drained_stop();
        if comm.has_stop_ack() {
            parent.enqueue(Command::StopAck);
        }

        if !comm.should_stop(job_id) {
            parent.enqueue(Command::ReportResult {
                job_id,
                score: report.score,
                best_move: report.pv.first().copied(),
            });
        }

        comm.add_nodes(i64::from(report.nodes));
        let (nodes, tb_hits) = comm.take_stats();
        parent.enqueue(Command::ReportStats { nodes, tb_hits });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::InProcessCommunicator;
    use crate::transpositions::TTable;
    use std::time::Duration;

    #[test]
    fn split_evenly_distributes_remainder_to_first_buckets() {
        assert_eq!(split_evenly(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(split_evenly(4, 4), vec![1, 1, 1, 1]);
        assert_eq!(split_evenly(0, 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn worker_tree_runs_a_job_and_reports_a_result() {
        let tt: &'static TTable = Box::leak(Box::new(TTable::with_capacity(1)));
        let root_inbox = Arc::new(InProcessCommunicator::new());
        let workers = create_workers(2, tt, root_inbox.clone());
        assert!(!workers.is_empty());

        let pos = Position::new(Board::default());
        for w in &workers {
            w.comm.enqueue(Command::InitSearch {
                position: Box::new(pos.clone()),
                root_history: Vec::new(),
                clear_history: true,
            });
            w.comm.enqueue(Command::StartSearch { job_id: 1, alpha: -30_000, beta: 30_000, depth: 2 });
        }

        let mut saw_result = false;
        for _ in 0..200 {
            std::thread::sleep(Duration::from_millis(10));
            let drained = root_inbox.wait_and_drain();
            if drained.iter().any(|c| matches!(c, Command::ReportResult { .. })) {
                saw_result = true;
                break;
            }
        }
        assert!(saw_result, "expected at least one worker to report a result");
    }
}
