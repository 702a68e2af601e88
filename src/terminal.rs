use std::io::{self, IsTerminal};
use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{self, Pid};
use tracing::debug;

use crate::error::{ResourceContext, Result, ShellError};

/// Ownership of the controlling terminal. Every handoff is a no-op when
/// stdin is not a terminal, so the shell runs the same way under a pipe.
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
	interactive: bool,
	shell_pgid: Pid,
}

impl Terminal {
	pub fn detached() -> Terminal {
		Terminal { interactive: false, shell_pgid: unistd::getpgrp() }
	}

	/// Puts the shell in its own process group and takes the terminal.
	/// Blocks (stopped by SIGTTIN) until whoever started us hands it over.
	pub fn acquire() -> Result<Terminal> {
		if !io::stdin().is_terminal() {
			return Ok(Terminal::detached());
		}
		loop {
			let fg = unistd::tcgetpgrp(io::stdin().as_fd()).during("tcgetpgrp")?;
			let own = unistd::getpgrp();
			if fg == own {
				break;
			}
			killpg(own, Signal::SIGTTIN).during("killpg")?;
		}
		match unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
			// already a session leader
			Ok(()) | Err(Errno::EPERM) => {},
			Err(e) => return Err(ShellError::Resource { op: "setpgid", source: e }),
		}
		let term = Terminal { interactive: true, shell_pgid: unistd::getpgrp() };
		term.give_to(term.shell_pgid)?;
		debug!(pgid = %term.shell_pgid, "acquired terminal");
		Ok(term)
	}

	pub fn is_interactive(&self) -> bool {
		self.interactive
	}

	pub fn shell_pgid(&self) -> Pid {
		self.shell_pgid
	}

	pub fn give_to(&self, pgid: Pid) -> Result<()> {
		if !self.interactive {
			return Ok(());
		}
		unistd::tcsetpgrp(io::stdin().as_fd(), pgid).during("tcsetpgrp")
	}

	pub fn reclaim(&self) -> Result<()> {
		self.give_to(self.shell_pgid)
	}
}
