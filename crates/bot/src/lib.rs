//! Eve bot runtime: CLI, startup sequence, post handler and shutdown.

pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod handler;
pub mod shutdown;

pub use app::run;
pub use cli::Cli;
