//! Command line interface for the diagnostic binary

pub mod args;
pub mod output;

pub use args::Args;
pub use output::OutputFormatter;
