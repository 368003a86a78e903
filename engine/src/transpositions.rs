//! The transposition table is one of the most important data structures in the
//! engine.
//!
//! As we're searching through the game tree, we're bound to come across
//! duplicate board positions. It would be great if we could re-use some of the
//! work we've already done in other branches of the tree. Enter the
//! Transposition table.
//!
//! We store some key information about the node (the score we found, how deep
//! we searched the node for, whether the score is an upper/lower bound, etc...)
//! and use the position's Zobrist hash as a key to index into it.
//!
//! Entries are grouped into 4-way buckets, one per cache line, so that a
//! worker probing a bucket concurrent with another worker's store touches at
//! most one cache line and (with the XOR-encoded key below) never reads a
//! torn move/score pair. Replacement within a bucket favours the entry with
//! the lowest depth/age "quality", the same bucketed scheme most production
//! engines use instead of a bare one-entry-per-key table.
//!
//! A couple of concerns:
//! 1. There's more possible board positions than Zobrist hashes (2^64). That
//! means we'll inevitably have hash collisions. (So-called Type-1 collisions).
//! These should be pretty rare, though...
//!
//! 2. We don't want a lookup table with 2^64 entries, that would be absurd.
//! Instead, we truncate the Zobrist hash to however many bits we need to
//! accomodate for the requested table size. Reducing the key size means we'll
//! get _many_ more collisions (called Type-2 Collisions). Because these are
//! much more frequent, we store the full hash along with the rest of the
//! values, so that when we read the entry from the table, we can check our
//! board's position with the full hash, to make sure we (probably) didn't get
//! a false positive.

use crate::evaluate::Score;
use crate::evaluate::ScoreExt;
use crate::position::Position;
use crate::zobrist::ZHash;
use chess::movegen::moves::Move;
use std::mem::size_of;
use std::sync::atomic::AtomicI16;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

/// A flag that stores whether the entry corresponds to a PV, fail-high or
/// fail-low node. Or, equivalently, whether the score saved in the entry is
/// exact, and upper bound, or a lower bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
  Exact = 0b00,
  Upper = 0b01,
  Lower = 0b10,
}

/// Packed u8 that holds various bits of metadata:
/// +----------------------------------------------------------------------+
/// |                       |              |             |                |
/// |   Age (4 bits)        | Busy (1 bit) | TTPV (1 bit) | Node type (2b) |
/// |                       |              |              |                |
/// +----------------------------------------------------------------------+
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TTInfo(u8);

impl TTInfo {
  const TYPE_MASK: u8 = 0b0000_0011;
  const TTPV_MASK: u8 = 0b0000_0100;
  const BUSY_MASK: u8 = 0b0000_1000;
  const MAX_AGE: u8 = 1 << 4;

  pub fn new(age: u8, node_type: NodeType, ttpv: bool, busy: bool) -> Self {
    let age = age & (Self::MAX_AGE - 1);

    TTInfo((age << 4) | ((busy as u8) << 3) | ((ttpv as u8) << 2) | node_type as u8)
  }

  pub fn age(self) -> u8 {
    self.0 >> 4
  }

  pub fn ttpv(self) -> bool {
    self.0 & Self::TTPV_MASK != 0
  }

  pub fn busy(self) -> bool {
    self.0 & Self::BUSY_MASK != 0
  }

  pub fn node_type(self) -> NodeType {
    let node_type = self.0 & Self::TYPE_MASK;

    assert!(
      node_type < 3,
      "Illegal node type stored in TTInfo"
    );

    // SAFETY: asserted above that `node_type` fits inside a `NodeType`.
    unsafe { std::mem::transmute::<u8, NodeType>(node_type) }
  }
}

////////////////////////////////////////////////////////////////////////////////
//
// TT Entry
//
////////////////////////////////////////////////////////////////////////////////

/// A single TT entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TTEntry {
  /// The hash of the board the entry is for, used to test for hash
  /// collisions
  hash: ZHash,

  /// The depth we searched to from this node
  depth: u8,

  /// The best move we found in the previous search
  best_move: Move,

  /// The associated score we found.
  /// Mate scores are normalized to be relative to the node where the entry
  /// was stored.
  score: i16,

  /// The static eval for the board position
  eval: i16,

  /// A packed u8 that holds the age, busy, ttpv and node type information
  info: TTInfo,
}

impl TTEntry {
  const NULL: TTEntry = TTEntry {
    hash: ZHash::NULL,
    best_move: Move::NULL,
    score: i16::MIN,
    eval: i16::MIN,
    depth: 0,
    info: TTInfo(0),
  };

  /// Create a new TT entry
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    hash: ZHash,
    best_move: Move,
    score: Score,
    eval: Score,
    depth: usize,
    node_type: NodeType,
    age: u8,
    ttpv: bool,
    ply: usize,
  ) -> TTEntry {
    TTEntry {
      hash,
      best_move,
      score: score.relative(ply) as i16,
      eval: eval as i16,
      depth: depth as u8,
      info: TTInfo::new(age, node_type, ttpv, false),
    }
  }

  /// Return the hash for the entry
  pub fn get_hash(&self) -> ZHash {
    self.hash
  }

  /// Return the best move for the entry
  pub fn get_move(&self) -> Option<Move> {
    match self.best_move {
      Move::NULL => None,
      mv => Some(mv),
    }
  }

  /// Return the score for the entry. In case of a mate score, this value is
  /// normalized!
  pub fn get_score(&self) -> Score {
    self.score as Score
  }

  /// Return the static eval for the entry
  pub fn get_eval(&self) -> Score {
    self.eval as Score
  }

  /// Return the depth for the entry
  pub fn get_depth(&self) -> usize {
    self.depth as usize
  }

  /// Return the type for the entry
  pub fn get_type(&self) -> NodeType {
    self.info.node_type()
  }

  /// Return the age for the entry
  pub fn get_age(&self) -> u8 {
    self.info.age()
  }

  /// Return whether the TT entry was a pv node
  pub fn get_ttpv(&self) -> bool {
    self.info.ttpv()
  }

  /// Return whether some other worker is currently searching this entry's
  /// subtree (set by [`TTable::mark_busy`]).
  pub fn is_busy(&self) -> bool {
    self.info.busy()
  }

  /// Check whether there's any data stored in the entry
  pub fn is_empty(&self) -> bool {
    self.hash == ZHash::NULL
  }

  /// Check whether we can use the entry in the first place, and return the
  /// move/score if so.
  ///
  /// We don't want to use results that didn't search as deep as we're meant
  /// to search. Additionally, we want to be careful returning a value that
  /// isn't the _actual_ value, but an upper/lower bound.
  pub fn try_score(
    &self,
    depth: usize,
    alpha: Score,
    beta: Score,
    ply: usize,
  ) -> Option<Score> {
    let entry_type = self.get_type();
    let entry_score = self.get_score();
    let entry_depth = self.get_depth();
    let absolute_score = entry_score.absolute(ply);

    if entry_depth < depth {
      return None;
    }

    match entry_type {
      NodeType::Exact => Some(absolute_score),

      NodeType::Upper if absolute_score <= alpha => Some(absolute_score),

      NodeType::Lower if absolute_score >= beta => Some(absolute_score),

      _ => None,
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//
// Packed TT Entry
//
////////////////////////////////////////////////////////////////////////////////

/// A single slot in a bucket: 16 bytes, lock-free, torn-read resistant.
///
/// The stored "key" is `hash ^ data` rather than the raw hash. Reads and
/// writes of the two `u64`s aren't atomic as a pair, so a concurrent writer
/// can tear a reader's view across them; XOR-encoding the key means a torn
/// read only ever produces a `key ^ data` that fails to match the probed
/// hash, instead of silently returning another entry's move paired with our
/// score.
#[derive(Default)]
struct PackedTTEntry {
  key: AtomicU64,
  data: AtomicU64,
}

type Layout = (Move, i16, i16, u8, TTInfo);

impl PackedTTEntry {
  fn store(&self, entry: &TTEntry) {
    // SAFETY: The sizes of the Layout type and u64 match.
    let data = unsafe {
      std::mem::transmute::<Layout, u64>((
        entry.best_move,
        entry.score,
        entry.eval,
        entry.depth,
        entry.info,
      ))
    };

    self.data.store(data, Ordering::Relaxed);
    self.key.store(entry.hash.0 ^ data, Ordering::Relaxed);
  }

  /// Load the slot, returning `None` if the key/data pair doesn't check out
  /// (either genuinely empty, or a torn concurrent read).
  fn load(&self) -> Option<TTEntry> {
    let key = self.key.load(Ordering::Relaxed);
    let data = self.data.load(Ordering::Relaxed);

    if key == 0 && data == 0 {
      return None;
    }

    let hash = ZHash(key ^ data);

    // SAFETY: The sizes of the Layout type and u64 match.
    let (best_move, score, eval, depth, info) =
      unsafe { std::mem::transmute::<_, Layout>(data) };

    Some(TTEntry {
      hash,
      best_move,
      score,
      eval,
      depth,
      info,
    })
  }

  fn mark_busy(&self, busy: bool) {
    let Some(mut entry) = self.load() else { return };
    entry.info = TTInfo::new(entry.info.age(), entry.info.node_type(), entry.info.ttpv(), busy);
    self.store(&entry);
  }

  fn clear(&self) {
    self.key.store(0, Ordering::Relaxed);
    self.data.store(0, Ordering::Relaxed);
  }
}

/// A 64-byte, cache-line-aligned group of 4 entries sharing an index. Probes
/// scan the whole bucket; replacement picks the weakest slot in it.
#[repr(align(64))]
#[derive(Default)]
struct TTBucket {
  slots: [PackedTTEntry; 4],
}

////////////////////////////////////////////////////////////////////////////////
//
// Transposition table
//
////////////////////////////////////////////////////////////////////////////////

/// A transposition table that stores previously searched results
pub struct TTable {
  /// A collection of buckets. Stored on the heap because we need to be able
  /// to dynamically resize it. We only instantiate it once at the start of
  /// the search though, so this isn't a big deal.
  buckets: Vec<TTBucket>,

  /// The number of buckets in the TT
  num_buckets: usize,

  /// The generation of the transposition table, incremented every time a new
  /// search is run. Used both to judge how stale an entry is, and (wrapping
  /// on overflow) to reuse the same 4-bit field indefinitely across a long
  /// session.
  generation: AtomicU8,

  /// The contempt value the table was populated under. Mixed into both the
  /// index and the stored key so that re-probing under a different contempt
  /// setting (as happens switching between playing and analysis) can't
  /// return a score biased by the old setting.
  contempt: AtomicI16,
}

impl TTable {
  /// Resize table to the size requested in MiB
  pub fn resize(&mut self, mb_size: usize) {
    let num_buckets = ((mb_size << 20) / size_of::<TTBucket>()).max(1);
    self.buckets = Vec::new();
    self.buckets.resize_with(num_buckets, TTBucket::default);
    self.num_buckets = num_buckets;
  }

  /// Create a new table with the requested capacity in megabytes
  pub fn with_capacity(mb_size: usize) -> TTable {
    let mut table = TTable {
      buckets: Vec::new(),
      num_buckets: 0,
      generation: AtomicU8::new(0),
      contempt: AtomicI16::new(0),
    };

    table.resize(mb_size);
    table
  }

  pub fn set_contempt(&self, contempt: i16) {
    self.contempt.store(contempt, Ordering::Relaxed);
  }

  fn keyed_hash(&self, hash: ZHash) -> ZHash {
    hash.with_contempt(self.contempt.load(Ordering::Relaxed))
  }

  fn bucket_for(&self, hash: ZHash) -> &TTBucket {
    let index = ZKey::from_hash(hash, self.num_buckets);
    &self.buckets[index.0]
  }

  /// Insert an entry into the transposition table.
  ///
  /// Replaces a slot in the bucket if: it holds the same position (always
  /// refresh), it's empty, it's from an older generation, or it holds a
  /// shallower search than the one we're storing. Among equally-stale
  /// candidates, the slot with the worst "quality" (depth penalized by age)
  /// is evicted.
  pub fn insert(&self, mut entry: TTEntry) {
    let keyed_hash = self.keyed_hash(entry.hash);
    entry.hash = keyed_hash;

    let bucket = self.bucket_for(keyed_hash);
    let generation = self.get_age();

    let mut replace_idx = 0;
    let mut worst_quality = i32::MAX;

    for (i, slot) in bucket.slots.iter().enumerate() {
      match slot.load() {
        None => {
          replace_idx = i;
          worst_quality = i32::MIN;
          break;
        }
        Some(existing) if existing.hash == keyed_hash => {
          replace_idx = i;
          worst_quality = i32::MIN;
          break;
        }
        Some(existing) => {
          let age_penalty = generation.wrapping_sub(existing.get_age()) as i32;
          let quality = existing.get_depth() as i32 - 2 * age_penalty;

          if quality < worst_quality {
            worst_quality = quality;
            replace_idx = i;
          }
        }
      }
    }

    let slot = &bucket.slots[replace_idx];
    let existing = slot.load();

    let should_replace = match existing {
      None => true,
      Some(existing) => {
        existing.hash != keyed_hash
          || existing.get_age() != generation
          || entry.get_type() == NodeType::Exact
          || entry.depth.saturating_add(3) >= existing.depth
      }
    };

    if should_replace {
      slot.store(&entry);
    }
  }

  /// Check whether the hash appears in the transposition table, and return it
  /// if so. Entries from another contempt setting never match.
  pub fn probe(&self, hash: ZHash) -> Option<TTEntry> {
    let keyed_hash = self.keyed_hash(hash);
    let bucket = self.bucket_for(keyed_hash);

    bucket
      .slots
      .iter()
      .find_map(|slot| slot.load().filter(|entry| entry.hash == keyed_hash))
  }

  /// Mark the bucket for `hash` busy/not-busy, so sibling workers searching
  /// the same subtree can defer rather than duplicate the work.
  pub fn mark_busy(&self, hash: ZHash, busy: bool) {
    let keyed_hash = self.keyed_hash(hash);
    let bucket = self.bucket_for(keyed_hash);

    for slot in &bucket.slots {
      if slot.load().is_some_and(|e| e.hash == keyed_hash) {
        slot.mark_busy(busy);
      }
    }
  }

  pub fn is_busy(&self, hash: ZHash) -> bool {
    self.probe(hash).is_some_and(|e| e.is_busy())
  }

  /// Instruct the CPU to read the requested TT bucket into the CPU cache
  /// ahead of time.
  pub fn prefetch(&self, hash: ZHash) {
    let bucket = self.bucket_for(self.keyed_hash(hash));

    #[cfg(target_arch = "x86_64")]
    unsafe {
      use std::arch::x86_64::_mm_prefetch;
      use std::arch::x86_64::_MM_HINT_T0;
      _mm_prefetch((bucket as *const TTBucket).cast::<i8>(), _MM_HINT_T0);
    }

    #[cfg(not(target_arch = "x86_64"))]
    let _ = bucket;
  }

  /// Return occupancy in parts-per-thousand, as reported by the UCI
  /// `hashfull` field: sample the first 1000 buckets (4000 slots).
  pub fn hashfull_permille(&self) -> u32 {
    let sample = self.num_buckets.min(250);
    if sample == 0 {
      return 0;
    }

    let filled: usize = self.buckets[0..sample]
      .iter()
      .flat_map(|bucket| bucket.slots.iter())
      .filter(|slot| slot.load().is_some())
      .count();

    let total = sample * 4;
    ((filled * 1000) / total) as u32
  }

  /// Walk the table from `position` following best moves, for the UCI `pv`
  /// line reported alongside a TT-backed `bestmove`. Stops at the first
  /// missing/illegal entry or after `max_len` moves, whichever comes first,
  /// to guard against cycling through a repetition.
  pub fn extract_pv(&self, position: &Position, max_len: usize) -> Vec<Move> {
    let mut pv = Vec::with_capacity(max_len);
    let mut pos = position.clone();

    while pv.len() < max_len {
      let Some(entry) = self.probe(pos.hash) else { break };
      let Some(mv) = entry.get_move() else { break };

      if !pos.board.legal_moves::<true>().contains(&mv) {
        break;
      }

      pv.push(mv);
      pos = pos.play_move(mv);
    }

    pv
  }

  /// Get the current generation of the transposition table
  pub fn get_age(&self) -> u8 {
    self.generation.load(Ordering::Relaxed)
  }

  /// Advance to the next generation (wraps within the 4-bit age field).
  pub fn increment_age(&self) {
    self.generation.fetch_add(1, Ordering::Relaxed);
  }

  /// Clear every bucket, in parallel across however many worker threads are
  /// available, since zeroing a large table single-threaded can take
  /// noticeable wall-clock time on a `Clear Hash` or `ucinewgame`.
  pub fn clear(&mut self) {
    let num_threads = std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(1)
      .min(self.buckets.len().max(1));

    let chunk_size = self.buckets.len().div_ceil(num_threads).max(1);

    std::thread::scope(|scope| {
      for chunk in self.buckets.chunks(chunk_size) {
        scope.spawn(move || {
          for bucket in chunk {
            for slot in &bucket.slots {
              slot.clear();
            }
          }
        });
      }
    });

    self.generation.store(0, Ordering::Relaxed);
  }
}

////////////////////////////////////////////////////////////////////////////////
//
// Zobrist keys
//
////////////////////////////////////////////////////////////////////////////////

/// ZKeys are Lookup keys derived from a Zobrist hash.
///
/// They are truncated to the requested size, in order to acommodate for the
/// desired transposition table size
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ZKey(pub usize);

impl ZKey {
  pub fn from_hash(hash: ZHash, size: usize) -> Self {
    ZKey(((hash.0 as u128 * size as u128) >> 64) as usize)
  }
}

////////////////////////////////////////////////////////////////////////////////
//
// Tablebase overlay
//
////////////////////////////////////////////////////////////////////////////////

/// Hook for an external endgame-tablebase probe, consulted before (and
/// independently of) the transposition table. No tablebase is bundled with
/// this engine, so the only implementation shipped is [`NoTablebase`]; the
/// trait exists so a future Syzygy backend can be dropped in without
/// touching the search core.
pub trait TablebaseProbe: Send + Sync {
  fn probe(&self, hash: ZHash) -> Option<(Score, NodeType)>;
}

pub struct NoTablebase;

impl TablebaseProbe for NoTablebase {
  fn probe(&self, _hash: ZHash) -> Option<(Score, NodeType)> {
    None
  }
}

////////////////////////////////////////////////////////////////////////////////
//
// Utility traits
//
////////////////////////////////////////////////////////////////////////////////

impl Default for TTEntry {
  fn default() -> Self {
    TTEntry::NULL
  }
}
