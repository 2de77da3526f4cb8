//! The tracking engine: the per-tick session state machine and the policy
//! value it evaluates against.

pub mod policy;
pub mod tracker;
