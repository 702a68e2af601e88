use crate::builtin;
use crate::config::Config;
use crate::error::Result;
use crate::job::JobControl;
use crate::parser;
use crate::signal::Pending;
use crate::terminal::Terminal;

pub struct State {
	pub config: Config,
	pub jobs: JobControl,
	notices: Vec<String>,
}

impl State {
	pub fn new(config: Config, terminal: Terminal) -> State {
		State { config: config, jobs: JobControl::new(terminal), notices: vec![] }
	}

	/// Runs one input line: a builtin in the shell itself, anything else
	/// as a job.
	pub fn execute_line(&mut self, line: &str) -> Result<i32> {
		let words: Vec<&str> = line.split_whitespace().collect();
		if words.is_empty() {
			return Ok(0);
		}
		if let Some(func) = builtin::match_builtin(words[0]) {
			return func(self, &words[1 ..]);
		}
		let tree = parser::parse(line, self.config.limits())?;
		let label = line.trim();
		if tree.is_background() {
			let job = self.jobs.run_background(&tree, label)?;
			println!("[{}] {}", job.index, job.pid);
			Ok(0)
		} else {
			self.jobs.run_foreground(&tree, label)
		}
	}

	pub fn collect_finished(&mut self) {
		for job in self.jobs.reap() {
			self.notices.push(format!("[{}] done {}", job.pid, job.label));
		}
	}

	pub fn flush_notices(&mut self) {
		for notice in self.notices.drain(..) {
			println!("{}", notice);
		}
	}

	/// Acts on what the signal handler recorded. Returns true when the
	/// prompt has to be shown again.
	pub fn handle_signals(&mut self, pending: Pending) -> bool {
		if pending.hangup {
			self.jobs.hangup_all_and_exit();
		}
		if pending.child {
			self.collect_finished();
		}
		if pending.interrupt {
			println!();
			println!("interrupt");
		}
		if pending.quit {
			println!();
			println!("quit");
		}
		pending.interrupt || pending.quit
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn state() -> State {
		State::new(Config::default(), Terminal::detached())
	}

	#[test]
	fn blank_lines_do_nothing() {
		let mut s = state();
		assert_eq!(s.execute_line("   \t").unwrap(), 0);
		assert!(s.jobs.list_jobs().is_empty());
	}

	#[test]
	fn syntax_errors_spawn_nothing() {
		let mut s = state();
		assert!(s.execute_line("a b c d e f g h i j k").is_err());
		assert!(s.execute_line("cat >").is_err());
		assert!(s.jobs.list_jobs().is_empty());
	}

	#[test]
	fn interrupt_asks_for_a_new_prompt() {
		let mut s = state();
		assert!(s.handle_signals(Pending { interrupt: true, ..Pending::default() }));
		assert!(!s.handle_signals(Pending::default()));
	}
}
