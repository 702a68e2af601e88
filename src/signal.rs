use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd;
use tracing::warn;

static CHILD: AtomicBool = AtomicBool::new(false);
static INTERRUPT: AtomicBool = AtomicBool::new(false);
static QUIT: AtomicBool = AtomicBool::new(false);
static HANGUP: AtomicBool = AtomicBool::new(false);

/// Read and write ends of the wakeup pipe. The handler only sees the raw
/// write end through `WAKE_WRITE`.
static WAKE: OnceLock<(OwnedFd, OwnedFd)> = OnceLock::new();
static WAKE_WRITE: AtomicI32 = AtomicI32::new(-1);

const RECORDED: [Signal; 5] = [Signal::SIGCHLD, Signal::SIGINT, Signal::SIGQUIT, Signal::SIGHUP, Signal::SIGTERM];
const IGNORED: [Signal; 3] = [Signal::SIGTTOU, Signal::SIGTTIN, Signal::SIGTSTP];
// ignored by the Rust runtime before main runs
const INHERITED: [Signal; 1] = [Signal::SIGPIPE];

/// Signals observed since the last `take`.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Pending {
	pub child: bool,
	pub interrupt: bool,
	pub quit: bool,
	pub hangup: bool,
}

impl Pending {
	pub fn any(&self) -> bool {
		self.child || self.interrupt || self.quit || self.hangup
	}
}

extern "C" fn record(signo: libc::c_int) {
	let flag = match signo {
		libc::SIGCHLD => &CHILD,
		libc::SIGINT => &INTERRUPT,
		libc::SIGQUIT => &QUIT,
		libc::SIGHUP | libc::SIGTERM => &HANGUP,
		_ => return,
	};
	flag.store(true, Ordering::SeqCst);
	let fd = WAKE_WRITE.load(Ordering::SeqCst);
	if fd >= 0 {
		let saved = Errno::last_raw();
		let byte = 1u8;
		// a full pipe already guarantees a wakeup
		unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1); }
		Errno::set_raw(saved);
	}
}

/// Creates the pipe `record` writes to, once per process.
fn open_wake_pipe() -> nix::Result<BorrowedFd<'static>> {
	if WAKE.get().is_none() {
		let pair = unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
		let _ = WAKE.set(pair);
	}
	match WAKE.get() {
		Some((read_end, write_end)) => {
			WAKE_WRITE.store(write_end.as_raw_fd(), Ordering::SeqCst);
			Ok(read_end.as_fd())
		},
		None => Err(Errno::EBADF),
	}
}

/// Readable whenever a recorded signal arrived since the pipe was last
/// emptied. Empty it before `take`, so a signal landing in between still
/// leaves a byte behind.
pub fn wake_fd() -> Option<BorrowedFd<'static>> {
	WAKE.get().map(|(read_end, _)| read_end.as_fd())
}

/// Empties a non-blocking pipe.
pub fn drain_pipe(fd: BorrowedFd) {
	let mut buf = [0u8; 64];
	loop {
		match unistd::read(fd.as_raw_fd(), &mut buf) {
			Ok(0) | Err(Errno::EAGAIN) => break,
			Err(Errno::EINTR) | Ok(_) => continue,
			Err(_) => break,
		}
	}
}

/// Sleeps until a recorded signal arrives, then empties the wakeup pipe.
/// Returns at once when a signal came in since the pipe was last emptied.
pub fn wait_wake() {
	if let Some(wake) = wake_fd() {
		let mut fds = [PollFd::new(wake, PollFlags::POLLIN)];
		match poll(&mut fds, PollTimeout::NONE) {
			Ok(_) | Err(Errno::EINTR) => {},
			Err(e) => warn!(error = %e, "poll on wakeup pipe failed"),
		}
		drain_pipe(wake);
	}
}

/// Installs the shell's own dispositions. Without SA_RESTART a blocking
/// syscall returns EINTR, and the wakeup pipe covers a signal that lands
/// just before the shell blocks.
pub fn install() -> nix::Result<()> {
	open_wake_pipe()?;
	let recorder = SigAction::new(SigHandler::Handler(record), SaFlags::empty(), SigSet::empty());
	let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
	for &sig in RECORDED.iter() {
		unsafe { sigaction(sig, &recorder)?; }
	}
	for &sig in IGNORED.iter() {
		unsafe { sigaction(sig, &ignore)?; }
	}
	Ok(())
}

/// Restores default dispositions in a freshly forked child.
pub fn reset_for_child() {
	let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	for &sig in RECORDED.iter().chain(IGNORED.iter()).chain(INHERITED.iter()) {
		let _ = unsafe { sigaction(sig, &default) };
	}
}

pub fn take() -> Pending {
	Pending {
		child: CHILD.swap(false, Ordering::SeqCst),
		interrupt: INTERRUPT.swap(false, Ordering::SeqCst),
		quit: QUIT.swap(false, Ordering::SeqCst),
		hangup: HANGUP.swap(false, Ordering::SeqCst),
	}
}

/// Puts back what a nested wait took but left for the main loop.
pub fn restore(pending: Pending) {
	let flags = [
		(pending.child, &CHILD),
		(pending.interrupt, &INTERRUPT),
		(pending.quit, &QUIT),
		(pending.hangup, &HANGUP),
	];
	for (set, flag) in flags {
		if set {
			flag.store(true, Ordering::SeqCst);
		}
	}
}
