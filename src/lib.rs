pub mod adaptor;
pub mod aggregate;
pub mod backend;
pub mod cli;
pub mod config;
pub mod matcher;
pub mod occurrences;
pub mod rule;
pub mod runner;
pub mod worker;

pub use matcher::{Match, MatchError};
pub use rule::Rule;
pub use runner::{Runner, RunnerError};
