//! Time/progress tracking for a single search.
//!
//! A search can be bounded by a few different kinds of constraints:
//!
//! 1. Fixed depth: search up to a (nominal) depth of N plies. Doesn't
//!    include the quiescence extension.
//!
//! 2. Fixed nodes: search until a node budget is exhausted.
//!
//! 3. Fixed time: search for at most X milliseconds.
//!
//! 4. Clock: given a remaining time budget (and perhaps increments), decide
//!    how to divide it up across however many moves remain in the game.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// Lets a [`TimeController`] defer to an external stop condition (e.g. a
/// worker's communicator reporting `STOP_SEARCH` or a stale job id) without
/// this module depending on the worker-tree types directly.
pub trait ShouldStop: Send + Sync {
    fn should_stop(&self) -> bool;
}

use chess::piece::Color;
use uci::time_control::TimeControl;

use crate::search::params::base_time_frac;
use crate::search::params::hard_time_frac;
use crate::search::params::inc_frac;
use crate::search::params::limit_time_frac;
use crate::search::params::node_frac_base;
use crate::search::params::node_frac_mult;
use crate::search::params::soft_time_frac;

/// Allow an overhead to make sure we don't time out because of UCI
/// communication latency.
const OVERHEAD: Duration = Duration::from_millis(20);

/// How often should we check timers and atomics for stopping conditions?
const CHECKUP_WINDOW: u32 = 4096;

/// The time controller is in charge of determining when a search should
/// continue or stop in order not to violate the requested time control.
#[derive(Clone)]
pub struct TimeController {
    /// The type of time control (depth, nodes, time or clock)
    tc: TimeControl,

    /// The instant the search was started
    start: Instant,

    /// The base time off of which we calculate the running soft time
    base_soft_time: Duration,

    /// Time limit after which it's not worth it starting a new search
    soft_time: Duration,

    /// Time limit after which we should abort an ongoing search and return
    /// ASAP
    hard_time: Duration,

    /// A global, thread-safe, stop-flag that we can use to abort the search
    /// thread from another thread.
    stop: Arc<AtomicBool>,

    /// The next node count when we should check the timers and atomics on
    /// whether to continue or not.
    next_checkup: u32,

    /// Flag that allows the search to signal that we shouldn't start a new
    /// ID iteration (e.g. when the position is forced).
    stop_early: bool,

    /// Correction factor to the soft_time derived from how stable the best
    /// move was across iterations.
    bm_stability_factor: f64,

    /// Correction factor to the soft_time derived from what fraction of
    /// nodes was spent searching the current best move.
    node_frac_factor: f64,

    /// Correction factor to the soft_time derived from how stable the
    /// search score was across iterations.
    score_stability_factor: f64,

    /// Worker-tree stop condition (job superseded or STOP_SEARCH/QUIT
    /// observed), consulted alongside the plain `stop` handle. `None` for a
    /// single-threaded, non-worker-tree search.
    stop_source: Option<Arc<dyn ShouldStop>>,

    /// `MaxNPS`/strength-weakening nodes/second ceiling. Enforced by
    /// sleeping off any excess at each checkup rather than by refusing to
    /// search, so node counts and the reported PV stay meaningful.
    max_nps: Option<u32>,
}

impl TimeController {
    // Scales (as percents) by which to scale the remaining time according to
    // the stability of `best_move`/score between ID iterations.
    const BESTMOVE_STABILITY: [f64; 5] = [2.50, 1.20, 0.90, 0.80, 0.75];
    const SCORE_STABILITY: [f64; 5] = [1.25, 1.15, 1.00, 0.94, 0.88];

    /// Create a new controller, and return a handle the caller can use to
    /// abort the search from another thread.
    pub fn new(tc_type: TimeControl, side: Color) -> (Self, TimeControlHandle) {
        use TimeControl::*;

        let stop: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let handle = TimeControlHandle { stop: stop.clone() };

        let mut tc = TimeController {
            tc: tc_type,
            base_soft_time: Duration::default(),
            soft_time: Duration::default(),
            hard_time: Duration::default(),
            start: Instant::now(),
            stop,
            next_checkup: CHECKUP_WINDOW,
            stop_early: false,
            bm_stability_factor: 1.0,
            node_frac_factor: 1.0,
            score_stability_factor: 1.0,
            stop_source: None,
            max_nps: None,
        };

        // Hard time determines when we should abort an ongoing search.
        match tc_type {
            FixedTime(max_time) => {
                tc.hard_time = max_time.saturating_sub(OVERHEAD);
                tc.soft_time = tc.hard_time;
            }

            // Allocate time (inversely) proportional to the estimated
            // number of remaining moves.
            Clock { wtime, btime, winc, binc, movestogo } => {
                let time = if side.is_white() { wtime } else { btime };
                let inc = if side.is_white() { winc } else { binc };
                let inc = inc.unwrap_or_default();

                let allowed_time = time.saturating_sub(OVERHEAD);
                let limit_time = limit_time_frac() * allowed_time / 100;

                let base_time = if let Some(movestogo) = movestogo {
                    allowed_time / movestogo + inc_frac() * inc / 100
                } else {
                    base_time_frac() * allowed_time / 1000 + inc_frac() * inc / 100
                };

                tc.hard_time = (hard_time_frac() * base_time / 100).min(limit_time);
                tc.base_soft_time = (soft_time_frac() * base_time / 100).min(limit_time);
                tc.soft_time = tc.base_soft_time;
            }

            _ => {}
        };

        (tc, handle)
    }

    /// Check whether the search should continue, depending on the
    /// particular time control. Only checked once we're due for a
    /// "checkup" (i.e. we've passed the next checkup node count), so the
    /// hot path doesn't pay for an `Instant::now()` call on every node.
    pub fn should_continue(&mut self, nodes: u32) -> bool {
        if nodes < self.next_checkup {
            return true;
        }

        self.next_checkup = nodes + CHECKUP_WINDOW;

        if self.stopped() {
            return false;
        }

        if let Some(cap) = self.max_nps {
            let elapsed = self.elapsed();
            let allowed = Duration::from_secs_f64(nodes as f64 / cap as f64);
            if allowed > elapsed {
                std::thread::sleep((allowed - elapsed).min(Duration::from_millis(200)));
            }
        }

        match self.tc {
            TimeControl::Nodes(max_nodes) => self.next_checkup < max_nodes as u32,

            TimeControl::FixedTime(_) => self.elapsed() < self.hard_time,

            TimeControl::Clock { .. } => self.elapsed() < self.hard_time,

            _ => true,
        }
    }

    /// Check whether we should start a new iterative deepening iteration.
    pub fn should_start_search(&self, depth: usize) -> bool {
        // Always do at least one iteration.
        if depth <= 1 {
            return true;
        }

        if self.stopped() {
            return false;
        }

        match self.tc {
            TimeControl::Depth(max_depth) => depth <= max_depth,

            TimeControl::Nodes(max_nodes) => self.next_checkup < max_nodes as u32,

            TimeControl::FixedTime(_) => self.elapsed() < self.hard_time,

            TimeControl::Clock { .. } => {
                // Stop early if the search signaled there's no point
                // searching any further (e.g. a forced move).
                if self.stop_early {
                    return false;
                }

                let mut adjusted_soft_time = self.soft_time.as_millis() as f64;
                adjusted_soft_time *= self.bm_stability_factor;
                adjusted_soft_time *= self.node_frac_factor;

                if depth >= 7 {
                    adjusted_soft_time *= self.score_stability_factor;
                }

                self.elapsed().as_millis() < adjusted_soft_time as u128
            }

            _ => true,
        }
    }

    /// Update the soft time limit with additional information gathered
    /// over the course of the search.
    pub fn update(&mut self, stability: usize, node_frac: f64, score_stability: usize) {
        self.bm_stability_factor = Self::BESTMOVE_STABILITY[stability.min(4)];
        self.score_stability_factor = Self::SCORE_STABILITY[score_stability.min(4)];
        self.node_frac_factor = (node_frac_base() as f64 / 100.0 - node_frac)
            * node_frac_mult() as f64 / 100.0;
    }

    /// Attach a worker-tree stop condition, polled alongside the plain stop
    /// handle on every checkup. Used by [`crate::worker`] so a job that's
    /// been superseded or `STOP_SEARCH`-ed unwinds promptly even though it
    /// was started with its own private [`TimeControlHandle`].
    pub fn with_stop_source(mut self, source: Arc<dyn ShouldStop>) -> Self {
        self.stop_source = Some(source);
        self
    }

    /// Cap throughput to `nps` nodes/second, per `MaxNPS`/strength weakening.
    pub fn with_max_nps(mut self, nps: Option<u32>) -> Self {
        self.max_nps = nps;
        self
    }

    /// Check whether the search has been aborted by the stop handle, or by
    /// the attached worker-tree stop condition.
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
            || self.stop_source.as_ref().is_some_and(|s| s.should_stop())
    }

    /// Return the time that's elapsed since the start of the search.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Signal that the search can stop early, rather than starting a new
    /// ID iteration.
    pub fn stop_early(&mut self) {
        self.stop_early = true;
    }
}

/// A handle for aborting a search, even from a different thread.
#[derive(Debug, Clone)]
pub struct TimeControlHandle {
    stop: Arc<AtomicBool>,
}

impl TimeControlHandle {
    /// Signal the associated search to stop as soon as possible.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_depth_stops_after_requested_depth() {
        let (tc, _handle) = TimeController::new(TimeControl::Depth(5), Color::White);
        assert!(tc.should_start_search(5));
        assert!(!tc.should_start_search(6));
    }

    #[test]
    fn handle_stops_the_controller() {
        let (tc, handle) = TimeController::new(TimeControl::Infinite, Color::White);
        assert!(tc.should_start_search(10));
        handle.stop();
        assert!(!tc.should_start_search(10));
    }

    #[test]
    fn infinite_never_stops_on_depth() {
        let (tc, _handle) = TimeController::new(TimeControl::Infinite, Color::White);
        assert!(tc.should_start_search(50));
    }
}
