use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd;

use crate::signal;

const CHUNK: usize = 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
	Line(String),
	Eof,
}

/// Reads newline-terminated lines straight from a descriptor. Unlike
/// `BufRead`, an interrupted wait is handed back to the caller.
pub struct LineReader<'a> {
	fd: BorrowedFd<'a>,
	wake: Option<BorrowedFd<'a>>,
	buf: Vec<u8>,
	eof: bool,
}

impl<'a> LineReader<'a> {
	pub fn new(fd: BorrowedFd<'a>) -> LineReader<'a> {
		LineReader { fd: fd, wake: None, buf: vec![], eof: false }
	}

	/// Also watches `wake`; once it turns readable, `read_line` drains it
	/// and reports `EINTR`.
	pub fn with_wake(fd: BorrowedFd<'a>, wake: Option<BorrowedFd<'a>>) -> LineReader<'a> {
		LineReader { fd: fd, wake: wake, buf: vec![], eof: false }
	}

	fn take_line(&mut self, len: usize, skip: usize) -> ReadEvent {
		let rest = self.buf.split_off(len + skip);
		let mut line = mem::replace(&mut self.buf, rest);
		line.truncate(len);
		ReadEvent::Line(String::from_utf8_lossy(&line).into_owned())
	}

	/// Blocks until `fd` has data. `Err(EINTR)` means the wakeup descriptor
	/// fired first.
	fn wait_readable(&self) -> nix::Result<()> {
		let wake = match self.wake {
			Some(wake) => wake,
			None => return Ok(()),
		};
		let mut fds = [
			PollFd::new(self.fd, PollFlags::POLLIN),
			PollFd::new(wake, PollFlags::POLLIN),
		];
		poll(&mut fds, PollTimeout::NONE)?;
		let woken = fds[1].revents().map_or(false, |r| r.contains(PollFlags::POLLIN));
		if woken {
			signal::drain_pipe(wake);
			return Err(Errno::EINTR);
		}
		Ok(())
	}

	/// Returns `Err(EINTR)` when a signal arrives before a full line does;
	/// whatever was read so far stays buffered.
	pub fn read_line(&mut self) -> nix::Result<ReadEvent> {
		loop {
			if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
				return Ok(self.take_line(pos, 1));
			}
			if self.eof {
				if self.buf.is_empty() {
					return Ok(ReadEvent::Eof);
				}
				let len = self.buf.len();
				return Ok(self.take_line(len, 0));
			}
			self.wait_readable()?;
			let mut chunk = [0u8; CHUNK];
			let n = unistd::read(self.fd.as_raw_fd(), &mut chunk)?;
			if n == 0 {
				self.eof = true;
			} else {
				self.buf.extend_from_slice(&chunk[.. n]);
			}
		}
	}

	pub fn discard_partial(&mut self) {
		self.buf.clear();
	}
}
