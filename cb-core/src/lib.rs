pub mod error;

pub mod config;

pub mod logging;
pub use logging::LoggerBuilder;

pub mod cli;
pub use cli::{Action, Invocation};

pub mod prompt;

pub mod indicator;

pub mod app;
pub use app::{App, Report, Terminal};
