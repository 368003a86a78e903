//! Opening-book: a DAG of previously-searched positions, negamax-backed up
//! from leaf search scores, with an expansion-cost policy that picks the
//! next leaf worth extending.
//!
//! [`node`] defines the DAG node and its invariants, [`store`] the in-memory
//! lookup table plus the on-disk binary format, and [`builder`] the
//! select/search/fold-back loop that grows the book offline.
pub mod builder;
pub mod node;
pub mod store;

pub use builder::{BookBuilder, BuilderHandle};
pub use node::{BookNode, BookNodeState, BookWeights};
pub use store::Book;
