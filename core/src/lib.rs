pub mod builder;
pub mod builtin;
pub mod cli;
pub mod command;
pub mod config;
pub mod console;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod log_file;
pub mod logger;
pub mod parser;
pub mod path;
pub mod pipe;
pub mod stage_context;
pub mod stage_runner;
pub mod staleness;

pub use builder::{BuildOutcome, Builder};
pub use cli::{Cli, IsOlderCli};
pub use command::{CommandKind, CommandSpec, StageInput, StageOutput};
pub use config::Config;
pub use console::Console;
pub use dependency::Dependency;
pub use error::{AggregateError, BuildError, ExecError, ScriptError, Termination};
pub use log_file::LogFile;
pub use logger::{LogLevel, Logger};
pub use stage_context::StageContext;
pub use stage_runner::StageRunner;
pub use staleness::{Freshness, Staleness};
