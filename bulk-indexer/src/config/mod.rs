//! Configuration and dependency initialization for the bulk indexer.

mod dependencies;

pub use dependencies::{ConnectionMode, Dependencies, DispatchSettings, SinkKind};
