use crate::error::SyntaxError;
use crate::tokenizer::{Tokenizer, TokenKind};
use crate::types::*;

type ParseResult<T> = Result<T, SyntaxError>;

/// Bounds applied while parsing a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
	pub max_args: usize,
	pub max_line: usize,
}

impl Default for Limits {
	fn default() -> Limits {
		Limits { max_args: 10, max_line: 100 }
	}
}

struct Parser<'a> {
	tokens: Tokenizer<'a>,
	limits: Limits,
}

impl<'a> Parser<'a> {
	fn parse_line(&mut self) -> ParseResult<Command> {
		let mut cmd = self.parse_pipeline()?;
		while self.tokens.peek(&[TokenKind::Amp]) {
			self.tokens.next_token();
			cmd = Command::Background { inner: Box::new(cmd) };
		}
		Ok(cmd)
	}

	fn parse_pipeline(&mut self) -> ParseResult<Command> {
		let cmd = self.parse_exec()?;
		if self.tokens.peek(&[TokenKind::Pipe]) {
			self.tokens.next_token();
			let right = self.parse_pipeline()?;
			return Ok(Command::Pipe { left: Box::new(cmd), right: Box::new(right) });
		}
		Ok(cmd)
	}

	fn parse_redirects(&mut self, redirects: &mut Vec<(Direction, String)>) -> ParseResult<()> {
		while self.tokens.peek(&[TokenKind::Less, TokenKind::Greater]) {
			let direction = match self.tokens.next_token().kind {
				TokenKind::Less => Direction::Input,
				_ => Direction::Output,
			};
			let target = self.tokens.next_token();
			if target.kind != TokenKind::Word {
				return Err(SyntaxError::MissingRedirectTarget);
			}
			redirects.push((direction, self.tokens.text(&target).to_owned()));
		}
		Ok(())
	}

	fn parse_exec(&mut self) -> ParseResult<Command> {
		let mut argv: Vec<String> = vec![];
		let mut redirects: Vec<(Direction, String)> = vec![];

		self.parse_redirects(&mut redirects)?;
		while !self.tokens.peek(&[TokenKind::Pipe, TokenKind::Amp]) {
			let tok = self.tokens.next_token();
			match tok.kind {
				TokenKind::End => { break; },
				TokenKind::Word => {},
				_ => {
					let sym = self.tokens.text(&tok).chars().next().unwrap_or('?');
					return Err(SyntaxError::UnexpectedSymbol(sym));
				},
			}
			argv.push(self.tokens.text(&tok).to_owned());
			if argv.len() > self.limits.max_args {
				return Err(SyntaxError::TooManyArgs { max: self.limits.max_args });
			}
			self.parse_redirects(&mut redirects)?;
		}

		// first redirection ends up innermost
		let mut cmd = Command::Execute { argv: argv };
		for (direction, file) in redirects {
			cmd = Command::Redirect {
				target: Box::new(cmd),
				file: file,
				direction: direction,
				fd: direction.default_fd(),
			};
		}
		Ok(cmd)
	}
}

pub fn parse(line: &str, limits: Limits) -> ParseResult<Command> {
	if line.len() > limits.max_line {
		return Err(SyntaxError::LineTooLong { max: limits.max_line });
	}
	let mut parser = Parser { tokens: Tokenizer::new(line), limits: limits };
	let cmd = parser.parse_line()?;
	if !parser.tokens.at_end() {
		return Err(SyntaxError::Leftovers(parser.tokens.rest().to_owned()));
	}
	Ok(cmd)
}
