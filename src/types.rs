use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction { Input, Output }

impl Direction {
	/// Descriptor a redirection in this direction replaces.
	pub fn default_fd(self) -> i32 {
		match self {
			Direction::Input => 0,
			Direction::Output => 1,
		}
	}
}

/// Parsed form of one input line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
	Execute {
		argv: Vec<String>,
	},
	Redirect {
		target: Box<Command>,
		file: String,
		direction: Direction,
		fd: i32,
	},
	Pipe {
		left: Box<Command>,
		right: Box<Command>,
	},
	Background {
		inner: Box<Command>,
	},
}

impl Command {
	pub fn is_background(&self) -> bool {
		match *self {
			Command::Background { .. } => true,
			_ => false,
		}
	}

	/// Strips every `Background` wrapper off the root.
	pub fn foreground_part(&self) -> &Command {
		let mut cmd = self;
		while let Command::Background { ref inner } = *cmd {
			cmd = inner;
		}
		cmd
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Command::Execute { ref argv } => write!(f, "{}", argv.join(" ")),
			Command::Redirect { ref target, ref file, direction, .. } => {
				let sym = if direction == Direction::Input { '<' } else { '>' };
				write!(f, "{} {} {}", target, sym, file)
			},
			Command::Pipe { ref left, ref right } => write!(f, "{} | {}", left, right),
			Command::Background { ref inner } => write!(f, "{} &", inner),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn exec(words: &[&str]) -> Command {
		Command::Execute { argv: words.iter().map(|w| w.to_string()).collect() }
	}

	#[test]
	fn background_detection_looks_at_root_only() {
		let bg = Command::Background { inner: Box::new(exec(&["sleep", "1"])) };
		assert!(bg.is_background());
		assert!(!exec(&["sleep", "1"]).is_background());
		let piped = Command::Pipe { left: Box::new(bg.clone()), right: Box::new(exec(&["cat"])) };
		assert!(!piped.is_background());
	}

	#[test]
	fn foreground_part_unwraps_nested_background() {
		let inner = exec(&["yes"]);
		let bg = Command::Background {
			inner: Box::new(Command::Background { inner: Box::new(inner.clone()) }),
		};
		assert_eq!(bg.foreground_part(), &inner);
	}

	#[test]
	fn display_reconstructs_a_readable_line() {
		let cmd = Command::Background {
			inner: Box::new(Command::Pipe {
				left: Box::new(Command::Redirect {
					target: Box::new(exec(&["sort"])),
					file: "in.txt".to_string(),
					direction: Direction::Input,
					fd: 0,
				}),
				right: Box::new(exec(&["uniq", "-c"])),
			}),
		};
		assert_eq!(cmd.to_string(), "sort < in.txt | uniq -c &");
	}
}
