//! Command-line front end: argument parsing, configuration files, logging and
//! the stage runners that drive the library crates.

pub mod cli;
pub mod logging;
pub mod pipeline;
pub mod settings;
