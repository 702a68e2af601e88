use std::io::{self, Write};
use std::os::fd::AsFd;
use std::process;

use clap::Parser;
use nix::errno::Errno;
use tracing_subscriber::EnvFilter;

use jobsh::global::State;
use jobsh::reader::{LineReader, ReadEvent};
use jobsh::signal;
use jobsh::terminal::Terminal;
use jobsh::Config;

fn prompt(text: &str) {
	let mut stdout = io::stdout();
	let _ = stdout.write_all(text.as_bytes());
	let _ = stdout.flush();
}

fn next_line(state: &mut State, reader: &mut LineReader) -> Option<String> {
	loop {
		match reader.read_line() {
			Ok(ReadEvent::Line(line)) => return Some(line),
			Ok(ReadEvent::Eof) => return None,
			Err(Errno::EINTR) => {
				if state.handle_signals(signal::take()) {
					reader.discard_partial();
					prompt(&state.config.prompt);
				}
			},
			Err(e) => {
				eprintln!("jobsh: read: {}", e);
				return None;
			},
		}
	}
}

fn main() {
	let filter = EnvFilter::try_from_env("JOBSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(io::stderr)
		.init();

	let config = Config::parse();
	let terminal = match Terminal::acquire() {
		Ok(t) => t,
		Err(e) => {
			eprintln!("jobsh: cannot take the terminal: {}", e);
			process::exit(1);
		},
	};
	if let Err(e) = signal::install() {
		eprintln!("jobsh: sigaction: {}", e);
		process::exit(1);
	}

	let mut state = State::new(config, terminal);
	let stdin = io::stdin();
	let mut reader = LineReader::with_wake(stdin.as_fd(), signal::wake_fd());
	loop {
		state.handle_signals(signal::take());
		state.flush_notices();
		prompt(&state.config.prompt);
		let line = match next_line(&mut state, &mut reader) {
			Some(line) => line,
			None => {
				println!();
				state.jobs.hangup_all_and_exit();
			},
		};
		if let Err(e) = state.execute_line(&line) {
			eprintln!("jobsh: {}", e);
		}
	}
}
