use clap::Parser;

use crate::parser::Limits;

/// Interactive shell with pipelines, redirection and job control.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "jobsh", version)]
pub struct Config {
	/// Most words a single command may have
	#[arg(long, default_value_t = 10)]
	pub max_args: usize,

	/// Longest accepted input line, in bytes
	#[arg(long, default_value_t = 100)]
	pub max_line: usize,

	#[arg(long, default_value = "jobsh> ")]
	pub prompt: String,
}

impl Config {
	pub fn limits(&self) -> Limits {
		Limits { max_args: self.max_args, max_line: self.max_line }
	}
}

impl Default for Config {
	fn default() -> Config {
		let limits = Limits::default();
		Config { max_args: limits.max_args, max_line: limits.max_line, prompt: "jobsh> ".to_string() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_parser_limits() {
		let parsed = Config::try_parse_from(["jobsh"]).unwrap();
		assert_eq!(parsed, Config::default());
		assert_eq!(parsed.limits(), Limits::default());
	}

	#[test]
	fn limits_are_configurable() {
		let parsed = Config::try_parse_from(["jobsh", "--max-args", "3", "--max-line", "512", "--prompt", "$ "]).unwrap();
		assert_eq!(parsed.limits(), Limits { max_args: 3, max_line: 512 });
		assert_eq!(parsed.prompt, "$ ");
	}
}
