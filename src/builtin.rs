use std::env;
use std::path::PathBuf;

use crate::error::{Result, ShellError};
use crate::global;

pub type Builtin = fn(&mut global::State, &[&str]) -> Result<i32>;

const HELP: &str = "\
builtins:
  cd [dir]          change directory (default $HOME)
  jobs              list jobs as [index] pid pgid state command
  fg [index]        continue a job in the foreground (default: latest)
  bg [index]        continue a stopped job in the background (default: latest)
  killjob <index>   terminate a job
  help              show this text
  exit              hang up all jobs and leave
anything else runs as: cmd [args] [< in] [> out] [| cmd ...] [&]";

fn parse_index(arg: Option<&&str>, usage: &str) -> Result<Option<usize>> {
	match arg {
		None => Ok(None),
		Some(s) => s.parse().map(Some).map_err(|_| ShellError::Usage(usage.to_string())),
	}
}

pub fn builtin_cd(_: &mut global::State, args: &[&str]) -> Result<i32> {
	let dir = match args.first() {
		Some(dir) => PathBuf::from(dir),
		None => match env::var_os("HOME") {
			Some(home) => PathBuf::from(home),
			None => return Err(ShellError::Usage("cd <dir>".to_string())),
		},
	};
	env::set_current_dir(&dir)?;
	Ok(0)
}

pub fn builtin_exit(state: &mut global::State, _: &[&str]) -> Result<i32> {
	state.jobs.hangup_all_and_exit()
}

pub fn builtin_help(_: &mut global::State, _: &[&str]) -> Result<i32> {
	println!("{}", HELP);
	Ok(0)
}

pub fn builtin_jobs(state: &mut global::State, _: &[&str]) -> Result<i32> {
	state.collect_finished();
	state.flush_notices();
	for job in state.jobs.list_jobs() {
		println!("{}", job);
	}
	Ok(0)
}

pub fn builtin_fg(state: &mut global::State, args: &[&str]) -> Result<i32> {
	state.collect_finished();
	let index = parse_index(args.first(), "fg [index]")?;
	state.jobs.bring_to_foreground(index)
}

pub fn builtin_bg(state: &mut global::State, args: &[&str]) -> Result<i32> {
	state.collect_finished();
	let index = parse_index(args.first(), "bg [index]")?;
	let job = state.jobs.resume_in_background(index)?;
	println!("[{}] {} &", job.index, job.label.trim_end_matches('&').trim_end());
	Ok(0)
}

pub fn builtin_killjob(state: &mut global::State, args: &[&str]) -> Result<i32> {
	state.collect_finished();
	let usage = "killjob <index>";
	let index = parse_index(args.first(), usage)?.ok_or_else(|| ShellError::Usage(usage.to_string()))?;
	state.jobs.kill_job(index)?;
	Ok(0)
}

pub fn match_builtin(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(builtin_cd),
		"exit" => Some(builtin_exit),
		"help" => Some(builtin_help),
		"jobs" => Some(builtin_jobs),
		"fg" => Some(builtin_fg),
		"bg" => Some(builtin_bg),
		"killjob" => Some(builtin_killjob),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::terminal::Terminal;

	fn state() -> global::State {
		global::State::new(Config::default(), Terminal::detached())
	}

	#[test]
	fn only_exact_names_are_builtins() {
		assert!(match_builtin("fg").is_some());
		assert!(match_builtin("killjob").is_some());
		assert!(match_builtin("fgrep").is_none());
		assert!(match_builtin("exit2").is_none());
	}

	#[test]
	fn job_builtins_on_empty_table() {
		let mut s = state();
		match builtin_fg(&mut s, &[]) {
			Err(ShellError::NoJobs) => {},
			other => panic!("unexpected {:?}", other),
		}
		match builtin_bg(&mut s, &["3"]) {
			Err(ShellError::NoSuchJob(3)) => {},
			other => panic!("unexpected {:?}", other),
		}
		match builtin_killjob(&mut s, &["5"]) {
			Err(ShellError::NoSuchJob(5)) => {},
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn killjob_needs_a_numeric_index() {
		let mut s = state();
		match builtin_killjob(&mut s, &[]) {
			Err(ShellError::Usage(u)) => assert_eq!(u, "killjob <index>"),
			other => panic!("unexpected {:?}", other),
		}
		match builtin_killjob(&mut s, &["first"]) {
			Err(ShellError::Usage(_)) => {},
			other => panic!("unexpected {:?}", other),
		}
	}
}
