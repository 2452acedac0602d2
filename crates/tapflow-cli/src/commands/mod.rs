//! CLI subcommand implementations.

pub mod events;
pub mod export;
pub mod metrics;
pub mod status;
pub mod sync;
pub mod tap;
