use std::io;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SyntaxError {
	#[error("missing file for redirection")]
	MissingRedirectTarget,
	#[error("too many args (max {max})")]
	TooManyArgs { max: usize },
	#[error("leftovers: {0}")]
	Leftovers(String),
	#[error("syntax error near '{0}'")]
	UnexpectedSymbol(char),
	#[error("line too long (max {max} bytes)")]
	LineTooLong { max: usize },
}

#[derive(Debug, Error)]
pub enum ShellError {
	#[error(transparent)]
	Syntax(#[from] SyntaxError),
	#[error("{op}: {source}")]
	Resource {
		op: &'static str,
		#[source]
		source: nix::Error,
	},
	#[error("no such job: {0}")]
	NoSuchJob(usize),
	#[error("no current job")]
	NoJobs,
	#[error("usage: {0}")]
	Usage(String),
	#[error(transparent)]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;

/// Tags a failed system call with the operation that produced it.
pub trait ResourceContext<T> {
	fn during(self, op: &'static str) -> Result<T>;
}

impl<T> ResourceContext<T> for nix::Result<T> {
	fn during(self, op: &'static str) -> Result<T> {
		self.map_err(|source| ShellError::Resource { op: op, source: source })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nix::errno::Errno;

	#[test]
	fn resource_errors_name_the_failing_call() {
		let r: nix::Result<()> = Err(Errno::EPERM);
		let e = r.during("tcsetpgrp").unwrap_err();
		assert!(e.to_string().starts_with("tcsetpgrp: "));
	}

	#[test]
	fn syntax_errors_pass_through_unchanged() {
		let e: ShellError = SyntaxError::TooManyArgs { max: 10 }.into();
		assert_eq!(e.to_string(), "too many args (max 10)");
	}
}
