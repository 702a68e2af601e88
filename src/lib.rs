//! A small interactive shell: a recursive-descent parser for
//! `cmd args < in > out | cmd &`, a fork/exec engine that mirrors the parsed
//! tree, and job control over process groups and the terminal.

pub mod builtin;
pub mod config;
pub mod error;
pub mod eval;
pub mod global;
pub mod job;
pub mod parser;
pub mod reader;
pub mod signal;
pub mod terminal;
pub mod tokenizer;
pub mod types;

pub use config::Config;
pub use error::{ShellError, SyntaxError};
pub use job::{JobControl, JobState, JobSummary};
pub use parser::{parse, Limits};
pub use types::{Command, Direction};
