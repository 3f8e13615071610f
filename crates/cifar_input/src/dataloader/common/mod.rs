//! src/dataloader/common/mod.rs
//!
//! Utilities shared by the single-threaded and the worker-backed streams.

pub mod thread;
