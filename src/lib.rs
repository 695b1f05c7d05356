//! Nomad backup operator
//!
//! Watches the Nomad event stream and keeps a scheduled backup job in step
//! with every job that opts in through its metadata.

pub mod backup;
pub mod config;
pub mod node;
pub mod nomad;
pub mod operator;
pub mod secrets;
pub mod stream;
pub mod supervisor;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
