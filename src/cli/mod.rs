pub mod run;

pub use run::{run, run_with_config, RunError};
