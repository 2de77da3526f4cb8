//! Durable side of the daemon: the SQLite session store, the read-side
//! aggregation queries and the hourly consistency maintenance loop.

pub mod db;
pub mod entities;
pub mod maintenance;
pub mod queries;

/// Database file name inside the application directory.
pub const DATABASE_FILE: &str = "usage.db";
