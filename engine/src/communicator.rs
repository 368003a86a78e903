//! The command/ack protocol a worker thread uses to talk to its parent and
//! its children.
//!
//! Every worker in the tree (see [`crate::worker`]) owns one
//! [`InProcessCommunicator`]. Parents enqueue commands into a child's
//! communicator (`INIT_SEARCH`, `START_SEARCH`, `STOP_SEARCH`, `SET_PARAM`,
//! `QUIT`); children enqueue reports into their parent's (`REPORT_RESULT`,
//! `REPORT_STATS`, `STOP_ACK`, `QUIT_ACK`). Delivery is FIFO per link; two
//! unrelated links may reorder relative to each other.
//!
//! [`Communicator`] is a trait so an out-of-process transport can be dropped
//! in later without touching [`crate::worker`] — cluster transport below
//! this abstraction is out of scope here, so [`InProcessCommunicator`] (a
//! mutex-guarded queue plus a condvar "notifier") is the only implementation
//! shipped.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use chess::movegen::moves::Move;

use crate::evaluate::Score;
use crate::position::Position;
use crate::time_control::ShouldStop;
use crate::zobrist::ZHash;

pub type JobId = u64;

/// One of the logical messages exchanged between a worker and its parent or
/// children. See spec table in the worker-coordination design doc: payloads
/// mirror it field for field.
#[derive(Debug, Clone)]
pub enum Command {
    /// parent -> child: new root position to search from.
    InitSearch {
        position: Box<Position>,
        root_history: Vec<ZHash>,
        clear_history: bool,
    },

    /// parent -> child: start (or restart) a search job.
    StartSearch {
        job_id: JobId,
        alpha: Score,
        beta: Score,
        depth: usize,
    },

    /// parent -> child: stop the current job cooperatively.
    StopSearch,

    /// parent -> child: apply a tunable/option change.
    SetParam { name: String, value: i32 },

    /// parent -> child: shut the subtree down for good.
    Quit,

    /// child -> parent: final score for a (possibly stale) job.
    ReportResult {
        job_id: JobId,
        score: Score,
        best_move: Option<Move>,
    },

    /// child -> parent: accumulated node/tablebase-hit counters.
    ReportStats { nodes: i64, tb_hits: i64 },

    /// child -> parent: this subtree has finished draining STOP_SEARCH.
    StopAck,

    /// child -> parent: this subtree has finished draining QUIT.
    QuitAck,

    /// parent -> child: how many OS threads this subtree owns, and how that
    /// count is further split among this child's own children.
    AssignThreads { here: usize, per_child: Vec<usize> },
}

impl Command {
    fn is_start_or_stop_or_result(&self) -> bool {
        matches!(
            self,
            Command::StartSearch { .. } | Command::StopSearch | Command::ReportResult { .. }
        )
    }
}

/// Shared behavior any communicator implementation must provide. Only
/// [`InProcessCommunicator`] is implemented here; a transport-backed
/// implementation (serializing `Command` into a bounded byte buffer and
/// dropping oversize `SetParam`s) would satisfy the same trait.
pub trait Communicator: Send + Sync {
    /// Enqueue a command, coalescing it with whatever's already queued.
    fn enqueue(&self, cmd: Command);

    /// Block until at least one command is queued, then return every
    /// command currently queued (in FIFO order), atomically with respect to
    /// concurrent enqueues.
    fn wait_and_drain(&self) -> Vec<Command>;

    /// Non-blocking: true if STOP_SEARCH/QUIT have been observed for the
    /// given job (or the job has since moved on).
    fn should_stop(&self, job_id: JobId) -> bool;

    /// The job id most recently started on this communicator.
    fn current_job(&self) -> JobId;

    fn add_nodes(&self, n: i64);
    fn add_tb_hits(&self, n: i64);
    fn take_stats(&self) -> (i64, i64);

    /// Arm STOP_ACK bookkeeping: this node expects `num_children` child acks
    /// before it may forward its own ack upward.
    fn arm_stop_ack(&self, num_children: usize);
    /// Record that our own search loop has drained for the stopped job.
    fn self_drained_stop(&self);
    /// Record an inbound STOP_ACK from a child. Returns true if every child
    /// and self have now acked (`hasStopAck`).
    fn child_stop_ack(&self) -> bool;
    fn has_stop_ack(&self) -> bool;

    fn arm_quit_ack(&self, num_children: usize);
    fn self_drained_quit(&self);
    fn child_quit_ack(&self) -> bool;
    fn has_quit_ack(&self) -> bool;
}

/// In-process communicator: a mutex-guarded FIFO queue plus a condvar used
/// as the "notifier" a worker blocks on while idle.
pub struct InProcessCommunicator {
    queue: Mutex<VecDeque<Command>>,
    notify: Condvar,

    /// Fast-path state, readable without taking the queue lock, so a busy
    /// search thread can poll `should_stop` roughly every hundred nodes
    /// without contending with whoever's pushing commands.
    job_id: AtomicU64,
    terminate: AtomicBool,

    nodes_searched: AtomicI64,
    tb_hits: AtomicI64,

    stop_ack_wait_children: AtomicI64,
    stop_ack_wait_self: AtomicBool,
    quit_ack_wait_children: AtomicI64,
    quit_ack_wait_self: AtomicBool,
}

impl Default for InProcessCommunicator {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessCommunicator {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Condvar::new(),
            job_id: AtomicU64::new(0),
            terminate: AtomicBool::new(false),
            nodes_searched: AtomicI64::new(0),
            tb_hits: AtomicI64::new(0),
            stop_ack_wait_children: AtomicI64::new(0),
            stop_ack_wait_self: AtomicBool::new(false),
            quit_ack_wait_children: AtomicI64::new(0),
            quit_ack_wait_self: AtomicBool::new(false),
        }
    }
}

impl Communicator for InProcessCommunicator {
    fn enqueue(&self, cmd: Command) {
        // Fast-path state is updated unconditionally, even though the
        // matching command also goes on the queue, so a busy search thread
        // observes STOP_SEARCH/START_SEARCH without waiting for the queue
        // lock or for the worker loop to drain.
        match &cmd {
            Command::StartSearch { job_id, .. } => {
                self.job_id.store(*job_id, Ordering::SeqCst);
                self.terminate.store(false, Ordering::SeqCst);
            }
            Command::StopSearch => self.terminate.store(true, Ordering::SeqCst),
            Command::Quit => self.terminate.store(true, Ordering::SeqCst),
            _ => {}
        }

        let mut queue = self.queue.lock().unwrap();

        match &cmd {
            // "Before enqueuing START_SEARCH or STOP_SEARCH, coalesce by
            // removing any pending START_SEARCH/STOP_SEARCH/REPORT_RESULT
            // already in the queue." A newer start/stop always supersedes
            // whatever the subtree hadn't gotten to yet.
            Command::StartSearch { .. } | Command::StopSearch => {
                queue.retain(|c| !c.is_start_or_stop_or_result());
                queue.push_back(cmd);
            }

            // REPORT_STATS is coalesced by folding the new counters into
            // whichever REPORT_STATS is already queued, rather than piling
            // up redundant reports.
            Command::ReportStats { nodes, tb_hits } => {
                if let Some(Command::ReportStats {
                    nodes: existing_n,
                    tb_hits: existing_t,
                }) = queue.iter_mut().find(|c| matches!(c, Command::ReportStats { .. }))
                {
                    *existing_n += nodes;
                    *existing_t += tb_hits;
                } else {
                    queue.push_back(cmd);
                }
            }

            _ => queue.push_back(cmd),
        }

        self.notify.notify_all();
    }

    fn wait_and_drain(&self) -> Vec<Command> {
        let mut queue = self.queue.lock().unwrap();
        while queue.is_empty() {
            queue = self.notify.wait(queue).unwrap();
        }
        queue.drain(..).collect()
    }

    fn should_stop(&self, job_id: JobId) -> bool {
        self.terminate.load(Ordering::SeqCst) || self.job_id.load(Ordering::SeqCst) != job_id
    }

    fn current_job(&self) -> JobId {
        self.job_id.load(Ordering::SeqCst)
    }

    fn add_nodes(&self, n: i64) {
        self.nodes_searched.fetch_add(n, Ordering::Relaxed);
    }

    fn add_tb_hits(&self, n: i64) {
        self.tb_hits.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the accumulated counters and zero them, so a parent forwarding
    /// its own REPORT_STATS upward never double-counts a child's work.
    fn take_stats(&self) -> (i64, i64) {
        (
            self.nodes_searched.swap(0, Ordering::Relaxed),
            self.tb_hits.swap(0, Ordering::Relaxed),
        )
    }

    fn arm_stop_ack(&self, num_children: usize) {
        self.stop_ack_wait_children
            .store(num_children as i64, Ordering::SeqCst);
        self.stop_ack_wait_self.store(true, Ordering::SeqCst);
    }

    fn self_drained_stop(&self) {
        self.stop_ack_wait_self.store(false, Ordering::SeqCst);
    }

    fn child_stop_ack(&self) -> bool {
        self.stop_ack_wait_children.fetch_sub(1, Ordering::SeqCst);
        self.has_stop_ack()
    }

    fn has_stop_ack(&self) -> bool {
        self.stop_ack_wait_children.load(Ordering::SeqCst) <= 0
            && !self.stop_ack_wait_self.load(Ordering::SeqCst)
    }

    fn arm_quit_ack(&self, num_children: usize) {
        self.quit_ack_wait_children
            .store(num_children as i64, Ordering::SeqCst);
        self.quit_ack_wait_self.store(true, Ordering::SeqCst);
    }

    fn self_drained_quit(&self) {
        self.quit_ack_wait_self.store(false, Ordering::SeqCst);
    }

    fn child_quit_ack(&self) -> bool {
        self.quit_ack_wait_children.fetch_sub(1, Ordering::SeqCst);
        self.has_quit_ack()
    }

    fn has_quit_ack(&self) -> bool {
        self.quit_ack_wait_children.load(Ordering::SeqCst) <= 0
            && !self.quit_ack_wait_self.load(Ordering::SeqCst)
    }
}

/// Adapter so a [`crate::time_control::TimeController`] can poll a
/// communicator's stop state without depending on `Communicator` directly
/// (avoids a trait-object-of-a-trait-object indirection in the hot path).
pub struct JobStopSource<C: Communicator + ?Sized> {
    comm: std::sync::Arc<C>,
    job_id: JobId,
}

impl<C: Communicator + ?Sized> JobStopSource<C> {
    pub fn new(comm: std::sync::Arc<C>, job_id: JobId) -> Self {
        Self { comm, job_id }
    }
}

impl<C: Communicator + ?Sized> ShouldStop for JobStopSource<C> {
    fn should_stop(&self) -> bool {
        self.comm.should_stop(self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_start_search_coalesces_older_pending_commands() {
        let comm = InProcessCommunicator::new();
        comm.enqueue(Command::StartSearch { job_id: 1, alpha: -100, beta: 100, depth: 4 });
        comm.enqueue(Command::StopSearch);
        comm.enqueue(Command::StartSearch { job_id: 2, alpha: -50, beta: 50, depth: 6 });

        let drained = comm.wait_and_drain();
        assert_eq!(drained.len(), 1);
        assert!(matches!(drained[0], Command::StartSearch { job_id: 2, .. }));
    }

    #[test]
    fn report_stats_folds_into_existing_queued_report() {
        let comm = InProcessCommunicator::new();
        comm.enqueue(Command::ReportStats { nodes: 10, tb_hits: 1 });
        comm.enqueue(Command::ReportStats { nodes: 5, tb_hits: 0 });

        let drained = comm.wait_and_drain();
        assert_eq!(drained.len(), 1);
        assert!(matches!(
            drained[0],
            Command::ReportStats { nodes: 15, tb_hits: 1 }
        ));
    }

    #[test]
    fn should_stop_reacts_before_queue_is_drained() {
        let comm = InProcessCommunicator::new();
        comm.enqueue(Command::StartSearch { job_id: 7, alpha: -1, beta: 1, depth: 1 });
        assert!(!comm.should_stop(7));

        comm.enqueue(Command::StopSearch);
        assert!(comm.should_stop(7), "terminate flag must be visible without draining");
    }

    #[test]
    fn stop_ack_completes_only_after_self_and_every_child() {
        let comm = InProcessCommunicator::new();
        comm.arm_stop_ack(2);
        assert!(!comm.has_stop_ack());

        assert!(!comm.child_stop_ack());
        assert!(!comm.child_stop_ack());
        assert!(!comm.has_stop_ack(), "self hasn't drained yet");

        comm.self_drained_stop();
        assert!(comm.has_stop_ack());
    }

    #[test]
    fn take_stats_zeroes_accumulator_to_avoid_double_counting() {
        let comm = InProcessCommunicator::new();
        comm.add_nodes(42);
        comm.add_tb_hits(3);
        assert_eq!(comm.take_stats(), (42, 3));
        assert_eq!(comm.take_stats(), (0, 0));
    }
}
