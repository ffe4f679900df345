//! Exploit lab library surface.
//!
//! Runs scripted exploit scenarios against a dev chain (an external JSON-RPC node or the
//! in-process simulator) and checks that each exploit leaves its expected post-state.

pub mod chain;
pub mod contracts;
pub mod error;
pub mod executor;
pub mod report;
pub mod runtime;
pub mod scenario;
pub mod utils;
