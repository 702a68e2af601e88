use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::{ResourceContext, Result, ShellError};
use crate::eval;
use crate::signal;
use crate::terminal::Terminal;
use crate::types::Command;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JobState { Running, Stopped }

impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			JobState::Running => write!(f, "running"),
			JobState::Stopped => write!(f, "stopped"),
		}
	}
}

pub trait WaitStatusExt {
	/// Exit code, or 128 plus the signal that killed or stopped the process.
	fn code(self) -> Option<i32>;
	fn is_terminated(self) -> bool;
}

impl WaitStatusExt for WaitStatus {
	fn code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
			WaitStatus::Stopped(_, sig) => Some(128 + sig as i32),
			_ => None,
		}
	}

	fn is_terminated(self) -> bool {
		match self {
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => true,
			_ => false,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Job {
	/// First forked process of the job; the shell's only direct child in it.
	pub pid: Pid,
	pub pgid: Pid,
	pub label: String,
	pub state: JobState,
}

impl Job {
	pub fn new(pid: Pid, pgid: Pid, label: &str) -> Job {
		Job { pid: pid, pgid: pgid, label: label.to_owned(), state: JobState::Running }
	}
}

/// A row of `jobs` output.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct JobSummary {
	pub index: usize,
	pub pid: Pid,
	pub pgid: Pid,
	pub label: String,
	pub state: JobState,
}

impl fmt::Display for JobSummary {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[{}] {} {} {} {}", self.index, self.pid, self.pgid, self.state, self.label)
	}
}

/// Live and stopped jobs, oldest first. Indices shift down when an earlier
/// entry goes away. Only the main control flow touches it.
#[derive(Debug, Default)]
pub struct JobTable {
	jobs: Vec<Job>,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable { jobs: vec![] }
	}

	/// Returns the new entry's index. A pid already present keeps its slot.
	pub fn push(&mut self, job: Job) -> usize {
		if let Some(i) = self.index_of(job.pid) {
			self.jobs[i] = job;
			return i;
		}
		self.jobs.push(job);
		self.jobs.len() - 1
	}

	/// Idempotent: removing a pid that is not tracked is a no-op.
	pub fn remove(&mut self, pid: Pid) -> Option<Job> {
		self.index_of(pid).map(|i| self.jobs.remove(i))
	}

	pub fn index_of(&self, pid: Pid) -> Option<usize> {
		self.jobs.iter().position(|j| j.pid == pid)
	}

	pub fn get(&self, index: usize) -> Option<&Job> {
		self.jobs.get(index)
	}

	pub fn set_state(&mut self, pid: Pid, state: JobState) -> bool {
		match self.jobs.iter_mut().find(|j| j.pid == pid) {
			Some(job) => {
				job.state = state;
				true
			},
			None => false,
		}
	}

	/// `index` when given, the most recent job otherwise.
	pub fn resolve(&self, index: Option<usize>) -> Result<usize> {
		match index {
			Some(i) if i < self.jobs.len() => Ok(i),
			Some(i) => Err(ShellError::NoSuchJob(i)),
			None if self.jobs.is_empty() => Err(ShellError::NoJobs),
			None => Ok(self.jobs.len() - 1),
		}
	}

	pub fn summary(&self, index: usize) -> Option<JobSummary> {
		self.jobs.get(index).map(|j| JobSummary {
			index: index,
			pid: j.pid,
			pgid: j.pgid,
			label: j.label.clone(),
			state: j.state,
		})
	}

	pub fn summaries(&self) -> Vec<JobSummary> {
		(0 .. self.jobs.len()).filter_map(|i| self.summary(i)).collect()
	}

	pub fn drain(&mut self) -> Vec<Job> {
		self.jobs.drain(..).collect()
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}
}

/// Owns the job table and the terminal, and is the only place that forks
/// top-level processes or waits on them.
#[derive(Debug)]
pub struct JobControl {
	table: JobTable,
	terminal: Terminal,
}

impl JobControl {
	pub fn new(terminal: Terminal) -> JobControl {
		JobControl { table: JobTable::new(), terminal: terminal }
	}

	pub fn table(&self) -> &JobTable {
		&self.table
	}

	/// Forks `tree` into its own process group and tracks it. Returns the
	/// pid and the job's index.
	fn spawn(&mut self, tree: &Command, label: &str, foreground: bool) -> Result<(Pid, usize)> {
		// a child must not inherit and later flush our buffered output
		let _ = io::stdout().flush();
		match unsafe { unistd::fork() }.during("fork")? {
			ForkResult::Child => {
				if let Err(e) = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
					eprintln!("jobsh: setpgid: {}", e);
					eval::exit(1);
				}
				if foreground {
					if let Err(e) = self.terminal.give_to(unistd::getpgrp()) {
						eprintln!("jobsh: {}", e);
						eval::exit(1);
					}
				} else if !self.terminal.is_interactive() {
					detach_stdin();
				}
				signal::reset_for_child();
				eval::run(tree)
			},
			ForkResult::Parent { child } => {
				// the child does the same; whichever runs first wins
				let _ = unistd::setpgid(child, child);
				let index = self.table.push(Job::new(child, child, label));
				debug!(pid = %child, index, foreground, "spawned job");
				Ok((child, index))
			},
		}
	}

	/// Runs `tree` as a job that owns the terminal and waits until it exits
	/// or stops.
	pub fn run_foreground(&mut self, tree: &Command, label: &str) -> Result<i32> {
		let (pid, _) = self.spawn(tree, label, true)?;
		if let Err(e) = self.terminal.give_to(pid) {
			warn!(%pid, error = %e, "could not hand over terminal");
		}
		let status = self.wait_foreground(pid);
		self.take_back_terminal();
		status
	}

	pub fn run_background(&mut self, tree: &Command, label: &str) -> Result<JobSummary> {
		let (pid, index) = self.spawn(tree, label, false)?;
		Ok(JobSummary {
			index: index,
			pid: pid,
			pgid: pid,
			label: label.to_owned(),
			state: JobState::Running,
		})
	}

	fn take_back_terminal(&self) {
		if let Err(e) = self.terminal.reclaim() {
			warn!(error = %e, "could not take back terminal");
		}
	}

	/// SIGHUP and SIGTERM end the shell even while a job holds the
	/// foreground. Anything else is put back for the main loop.
	fn hang_up_on_request(&mut self) {
		let pending = signal::take();
		if pending.hangup {
			// the foreground job is tracked too, so it is hung up with the rest
			debug!("hangup during foreground wait");
			self.hangup_all_and_exit();
		}
		signal::restore(pending);
	}

	fn wait_foreground(&mut self, pid: Pid) -> Result<i32> {
		// with the wakeup pipe, sleep on it instead of in waitpid so that a
		// signal landing just before the wait is not missed
		let flags = match signal::wake_fd() {
			Some(_) => WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG,
			None => WaitPidFlag::WUNTRACED,
		};
		loop {
			match waitpid(pid, Some(flags)) {
				Ok(WaitStatus::StillAlive) => {
					signal::wait_wake();
					self.hang_up_on_request();
				},
				Err(Errno::EINTR) => self.hang_up_on_request(),
				Err(e) => {
					self.table.remove(pid);
					return Err(e).during("waitpid");
				},
				Ok(status @ WaitStatus::Stopped(..)) => {
					self.table.set_state(pid, JobState::Stopped);
					if let Some(s) = self.table.index_of(pid).and_then(|i| self.table.summary(i)) {
						println!();
						println!("[{}] stopped {}", s.index, s.label);
					}
					debug!(%pid, "foreground job stopped");
					return Ok(status.code().unwrap_or(0));
				},
				Ok(status) if status.is_terminated() => {
					self.table.remove(pid);
					debug!(%pid, ?status, "foreground job finished");
					return Ok(status.code().unwrap_or(0));
				},
				Ok(_) => continue,
			}
		}
	}

	/// Collects every child that changed state without blocking. Returns
	/// the jobs that finished.
	pub fn reap(&mut self) -> Vec<Job> {
		let mut done = vec![];
		loop {
			let status = match waitpid(None, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
				Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
				Err(Errno::EINTR) => continue,
				Err(e) => {
					warn!(error = %e, "waitpid failed while reaping");
					break;
				},
				Ok(status) => status,
			};
			let pid = match status.pid() {
				Some(pid) => pid,
				None => continue,
			};
			if status.is_terminated() {
				// already gone when killjob dropped it first
				if let Some(job) = self.table.remove(pid) {
					debug!(%pid, ?status, "reaped job");
					done.push(job);
				}
			} else if let WaitStatus::Stopped(..) = status {
				self.table.set_state(pid, JobState::Stopped);
			}
		}
		done
	}

	pub fn list_jobs(&self) -> Vec<JobSummary> {
		self.table.summaries()
	}

	pub fn bring_to_foreground(&mut self, index: Option<usize>) -> Result<i32> {
		let index = self.table.resolve(index)?;
		let job = self.table.get(index).cloned().ok_or(ShellError::NoSuchJob(index))?;
		self.terminal.give_to(job.pgid)?;
		if job.state == JobState::Stopped {
			if let Err(e) = killpg(job.pgid, Signal::SIGCONT) {
				self.take_back_terminal();
				return Err(e).during("killpg");
			}
			self.table.set_state(job.pid, JobState::Running);
		}
		println!("{}", job.label);
		debug!(pid = %job.pid, index, "job moved to foreground");
		let status = self.wait_foreground(job.pid);
		self.take_back_terminal();
		status
	}

	pub fn resume_in_background(&mut self, index: Option<usize>) -> Result<JobSummary> {
		let index = self.table.resolve(index)?;
		let job = self.table.get(index).cloned().ok_or(ShellError::NoSuchJob(index))?;
		if job.state == JobState::Stopped {
			killpg(job.pgid, Signal::SIGCONT).during("killpg")?;
			self.table.set_state(job.pid, JobState::Running);
			debug!(pid = %job.pid, index, "job resumed in background");
		}
		self.table.summary(index).ok_or(ShellError::NoSuchJob(index))
	}

	/// Sends SIGTERM to the job's group and forgets the job. The zombie is
	/// collected by a later `reap`.
	pub fn kill_job(&mut self, index: usize) -> Result<Job> {
		let job = self.table.get(index).cloned().ok_or(ShellError::NoSuchJob(index))?;
		match killpg(job.pgid, Signal::SIGTERM) {
			Ok(()) | Err(Errno::ESRCH) => {},
			Err(e) => return Err(e).during("killpg"),
		}
		if job.state == JobState::Stopped {
			let _ = killpg(job.pgid, Signal::SIGCONT);
		}
		debug!(pid = %job.pid, index, "killed job");
		Ok(self.table.remove(job.pid).unwrap_or(job))
	}

	/// Sends SIGHUP to every tracked group and empties the table. Returns how
	/// many jobs were signalled.
	pub fn hangup_all(&mut self) -> usize {
		let jobs = self.table.drain();
		for job in &jobs {
			match killpg(job.pgid, Signal::SIGHUP) {
				Ok(()) | Err(Errno::ESRCH) => {},
				Err(e) => warn!(pgid = %job.pgid, error = %e, "could not hang up job"),
			}
			if job.state == JobState::Stopped {
				let _ = killpg(job.pgid, Signal::SIGCONT);
			}
		}
		debug!(count = jobs.len(), "hung up jobs");
		jobs.len()
	}

	pub fn hangup_all_and_exit(&mut self) -> ! {
		self.hangup_all();
		let _ = io::stdout().flush();
		std::process::exit(0)
	}
}

fn detach_stdin() {
	if let Ok(null) = File::open("/dev/null") {
		let _ = unistd::dup2(null.as_raw_fd(), libc::STDIN_FILENO);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn job(pid: i32, label: &str) -> Job {
		Job::new(Pid::from_raw(pid), Pid::from_raw(pid), label)
	}

	#[test]
	fn push_keeps_insertion_order() {
		let mut t = JobTable::new();
		assert_eq!(t.push(job(10, "a")), 0);
		assert_eq!(t.push(job(20, "b")), 1);
		let labels: Vec<String> = t.summaries().into_iter().map(|s| s.label).collect();
		assert_eq!(labels, vec!["a", "b"]);
	}

	#[test]
	fn a_pid_appears_at_most_once() {
		let mut t = JobTable::new();
		t.push(job(10, "a"));
		assert_eq!(t.push(job(10, "again")), 0);
		assert_eq!(t.len(), 1);
		assert_eq!(t.get(0).unwrap().label, "again");
	}

	#[test]
	fn remove_is_idempotent() {
		let mut t = JobTable::new();
		t.push(job(10, "a"));
		t.push(job(20, "b"));
		assert_eq!(t.remove(Pid::from_raw(10)).map(|j| j.label), Some("a".to_string()));
		assert_eq!(t.remove(Pid::from_raw(10)), None);
		assert_eq!(t.len(), 1);
		assert_eq!(t.index_of(Pid::from_raw(20)), Some(0));
	}

	#[test]
	fn resolve_defaults_to_most_recent() {
		let mut t = JobTable::new();
		match t.resolve(None) {
			Err(ShellError::NoJobs) => {},
			other => panic!("unexpected {:?}", other),
		}
		t.push(job(10, "a"));
		t.push(job(20, "b"));
		assert_eq!(t.resolve(None).unwrap(), 1);
		assert_eq!(t.resolve(Some(0)).unwrap(), 0);
	}

	#[test]
	fn out_of_range_index_leaves_table_alone() {
		let mut t = JobTable::new();
		t.push(job(10, "a"));
		match t.resolve(Some(5)) {
			Err(ShellError::NoSuchJob(5)) => {},
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(t.len(), 1);
	}

	#[test]
	fn set_state_marks_stopped_jobs() {
		let mut t = JobTable::new();
		t.push(job(10, "vim"));
		assert!(t.set_state(Pid::from_raw(10), JobState::Stopped));
		assert!(!t.set_state(Pid::from_raw(11), JobState::Stopped));
		assert_eq!(t.summary(0).unwrap().to_string(), "[0] 10 10 stopped vim");
	}

	#[test]
	fn drain_empties_the_table() {
		let mut t = JobTable::new();
		t.push(job(10, "a"));
		t.push(job(20, "b"));
		assert_eq!(t.drain().len(), 2);
		assert!(t.is_empty());
	}

	#[test]
	fn kill_job_rejects_unknown_index() {
		let mut jc = JobControl::new(Terminal::detached());
		match jc.kill_job(0) {
			Err(ShellError::NoSuchJob(0)) => {},
			other => panic!("unexpected {:?}", other),
		}
		assert!(jc.list_jobs().is_empty());
	}

	#[test]
	fn wait_status_codes() {
		let pid = Pid::from_raw(1);
		assert_eq!(WaitStatus::Exited(pid, 3).code(), Some(3));
		assert_eq!(WaitStatus::Signaled(pid, Signal::SIGKILL, false).code(), Some(137));
		assert_eq!(WaitStatus::Stopped(pid, Signal::SIGTSTP).code(), Some(148));
		assert_eq!(WaitStatus::StillAlive.code(), None);
		assert!(WaitStatus::Exited(pid, 0).is_terminated());
		assert!(!WaitStatus::Stopped(pid, Signal::SIGTSTP).is_terminated());
	}
}
