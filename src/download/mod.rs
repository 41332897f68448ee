//! Download flow.
//!
//! - `chunk`       : transfer chunk size by expected payload size
//! - `stream`      : one streaming GET written to disk
//! - `pipeline`    : per-episode resolve-then-download state machine
//! - `orchestrator`: bounded worker pool over all episodes
//! - `progress`    : shared progress board and terminal bars
//! - `series`      : listing -> series directory -> run, the top-level entry

pub mod chunk;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod series;
pub mod stream;
