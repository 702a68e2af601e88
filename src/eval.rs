use std::ffi::{CString, NulError};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, warn};

use crate::job::WaitStatusExt;
use crate::types::{Command, Direction};

const EXIT_FAILURE: i32 = 1;
const EXIT_NOT_EXECUTABLE: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;

/// Failures inside a forked child. They never cross back into the shell;
/// the parent only sees the exit status `run` turns them into.
#[derive(Debug, Error)]
enum ExecError {
	#[error("{0}: command not found")]
	NotFound(String),
	#[error("{name}: {source}")]
	Exec { name: String, source: nix::Error },
	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] NulError),
	#[error("{file}: {source}")]
	Open { file: String, source: io::Error },
	#[error("{op}: {source}")]
	Sys { op: &'static str, source: nix::Error },
}

impl ExecError {
	fn exit_code(&self) -> i32 {
		match *self {
			ExecError::NotFound(_) => EXIT_NOT_FOUND,
			ExecError::Exec { .. } | ExecError::Nul(_) => EXIT_NOT_EXECUTABLE,
			ExecError::Open { .. } | ExecError::Sys { .. } => EXIT_FAILURE,
		}
	}
}

fn sys(op: &'static str) -> impl FnOnce(nix::Error) -> ExecError {
	move |source| ExecError::Sys { op: op, source: source }
}

/// Leaves a forked child without running the parent's exit handlers.
pub fn exit(status: i32) -> ! {
	unsafe { libc::_exit(status) }
}

fn exec_argv(argv: &[String]) -> ExecError {
	let args: Result<Vec<CString>, NulError> = argv.iter().map(|a| CString::new(a.as_bytes())).collect();
	let args = match args {
		Ok(args) => args,
		Err(e) => return e.into(),
	};
	match unistd::execvp(&args[0], &args) {
		Err(Errno::ENOENT) => ExecError::NotFound(argv[0].clone()),
		Err(e) => ExecError::Exec { name: argv[0].clone(), source: e },
		Ok(never) => match never {},
	}
}

/// Points `fd` at `file`. The descriptor `open` returned is closed again
/// unless it already is `fd`.
fn redirect(file: &str, direction: Direction, fd: RawFd) -> Result<(), ExecError> {
	let mut opts = OpenOptions::new();
	match direction {
		Direction::Input => { opts.read(true); },
		Direction::Output => { opts.write(true).create(true).truncate(true).mode(0o600); },
	}
	let opened = opts.open(file).map_err(|e| ExecError::Open { file: file.to_owned(), source: e })?;
	if opened.as_raw_fd() == fd {
		let _ = opened.into_raw_fd();
		return Ok(());
	}
	unistd::dup2(opened.as_raw_fd(), fd).map_err(sys("dup2"))?;
	Ok(())
}

fn connect(end: &OwnedFd, fd: RawFd) -> Result<(), ExecError> {
	unistd::dup2(end.as_raw_fd(), fd).map(|_| ()).map_err(sys("dup2"))
}

fn wait_child(pid: Pid) -> i32 {
	loop {
		match waitpid(pid, None) {
			Ok(status) => match status.code() {
				Some(code) => return code,
				None => continue,
			},
			Err(Errno::EINTR) => continue,
			Err(e) => {
				warn!(%pid, error = %e, "waitpid failed");
				return EXIT_FAILURE;
			},
		}
	}
}

fn run_pipe(left: &Command, right: &Command) -> Result<i32, ExecError> {
	let (read_end, write_end) = unistd::pipe().map_err(sys("pipe"))?;

	let left_pid = match unsafe { unistd::fork() }.map_err(sys("fork"))? {
		ForkResult::Child => {
			let wired = connect(&write_end, libc::STDOUT_FILENO);
			drop(read_end);
			drop(write_end);
			finish(wired.and_then(|_| run_tree(left)))
		},
		ForkResult::Parent { child } => child,
	};
	let right_pid = match unsafe { unistd::fork() } {
		Ok(ForkResult::Child) => {
			let wired = connect(&read_end, libc::STDIN_FILENO);
			drop(read_end);
			drop(write_end);
			finish(wired.and_then(|_| run_tree(right)))
		},
		Ok(ForkResult::Parent { child }) => Ok(child),
		Err(e) => Err(e),
	};
	// both ends must be gone here or the reader never sees EOF
	drop(read_end);
	drop(write_end);
	debug!(left = %left_pid, right = ?right_pid, "pipe spawned");

	let left_status = wait_child(left_pid);
	let right_pid = right_pid.map_err(sys("fork"))?;
	let status = wait_child(right_pid);
	debug!(left_status, status, "pipe finished");
	Ok(status)
}

/// Interprets `cmd` in the current process. Returns only when no exec
/// replaced the process image.
fn run_tree(cmd: &Command) -> Result<i32, ExecError> {
	match *cmd {
		Command::Execute { ref argv } => {
			if argv.is_empty() {
				return Ok(0);
			}
			Err(exec_argv(argv))
		},
		Command::Redirect { ref target, ref file, direction, fd } => {
			redirect(file, direction, fd)?;
			run_tree(target)
		},
		Command::Pipe { ref left, ref right } => run_pipe(left, right),
		Command::Background { ref inner } => run_tree(inner),
	}
}

fn finish(result: Result<i32, ExecError>) -> ! {
	let status = result.unwrap_or_else(|e| {
		eprintln!("jobsh: {}", e);
		e.exit_code()
	});
	exit(status)
}

/// Runs `cmd` to completion inside an already forked child. Never returns.
pub fn run(cmd: &Command) -> ! {
	finish(run_tree(cmd))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes_distinguish_missing_programs() {
		assert_eq!(ExecError::NotFound("nope".to_string()).exit_code(), 127);
		let denied = ExecError::Exec { name: "x".to_string(), source: Errno::EACCES };
		assert_eq!(denied.exit_code(), 126);
		let open = ExecError::Open {
			file: "/nonexistent/dir/file".to_string(),
			source: io::Error::from(io::ErrorKind::NotFound),
		};
		assert_eq!(open.exit_code(), 1);
		assert!(open.to_string().starts_with("/nonexistent/dir/file: "));
	}

	#[test]
	fn nul_bytes_are_not_executable() {
		match exec_argv(&["ec\0ho".to_string()]) {
			e @ ExecError::Nul(_) => assert_eq!(e.exit_code(), 126),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn redirect_opens_by_direction() {
		use std::fs;
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::TempDir::new().unwrap();
		let out = dir.path().join("out.txt");
		let out_name = out.to_str().unwrap();
		// a descriptor nothing else in the test binary uses
		let spare: RawFd = 200;
		redirect(out_name, Direction::Output, spare).unwrap();
		unistd::write(unsafe { std::os::fd::BorrowedFd::borrow_raw(spare) }, b"x").unwrap();
		unistd::close(spare).unwrap();
		assert_eq!(fs::read_to_string(&out).unwrap(), "x");
		assert_eq!(fs::metadata(&out).unwrap().permissions().mode() & 0o777, 0o600);

		let missing = dir.path().join("missing.txt");
		match redirect(missing.to_str().unwrap(), Direction::Input, spare) {
			Err(e @ ExecError::Open { .. }) => assert_eq!(e.exit_code(), 1),
			other => panic!("unexpected {:?}", other),
		}
		assert!(!missing.exists());
	}
}
