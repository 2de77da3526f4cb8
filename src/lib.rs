//! Personal desktop activity logger. A background daemon samples the
//! foreground window once a second, turns continuous focus into sessions in
//! a local SQLite store, and the cli answers questions about where the time
//! went.

pub mod cli;
pub mod daemon;
pub mod probe;
pub mod utils;
