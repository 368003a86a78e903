//! Utilities for serializing and deserializing Simbelmyne data into
//! UCI messages

pub mod client;
pub mod engine;
pub mod options;
pub mod search_info;
pub mod time_control;
pub mod wdl;
