//! clip-kernel: filesystem-backed prototype entries.
//!
//! An entry is a directory with a parameters file. Entries inherit
//! parameters from a parent entry, look methods up along their ancestry,
//! and are chained from the command line with a small pipeline language.

pub mod cli;
pub mod core;
pub mod ops;
