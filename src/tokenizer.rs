use std::ops::Range;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind { Word, Less, Greater, Pipe, Amp, End }

impl TokenKind {
	fn symbol(c: u8) -> Option<TokenKind> {
		match c {
			b'<' => Some(TokenKind::Less),
			b'>' => Some(TokenKind::Greater),
			b'|' => Some(TokenKind::Pipe),
			b'&' => Some(TokenKind::Amp),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Token {
	pub kind: TokenKind,
	pub span: Range<usize>,
}

/// Cursor over one input line. Symbols are single bytes, so every span
/// boundary falls on a char boundary of the input `&str`.
pub struct Tokenizer<'a> {
	line: &'a str,
	i: usize,
}

impl<'a> Tokenizer<'a> {
	pub fn new(line: &'a str) -> Tokenizer<'a> {
		Tokenizer { line: line, i: 0 }
	}

	fn bytes(&self) -> &'a [u8] {
		self.line.as_bytes()
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(&c) = self.bytes().get(self.i) {
			if !f(c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		match c {
			b' ' | b'\t' | b'\r' | b'\n' | b'\x0b' => true,
			_ => false,
		}
	}

	fn is_letter(c: u8) -> bool {
		TokenKind::symbol(c).is_none() && !Tokenizer::is_whitespace(c)
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Tokenizer::is_whitespace);
	}

	/// Consumes the next token along with the whitespace on both sides of it.
	pub fn next_token(&mut self) -> Token {
		self.skip_whitespaces();
		let start = self.i;
		let kind = match self.bytes().get(self.i) {
			None => TokenKind::End,
			Some(&c) => match TokenKind::symbol(c) {
				Some(kind) => {
					self.i += 1;
					kind
				},
				None => {
					self.proceed_while(Tokenizer::is_letter);
					TokenKind::Word
				},
			},
		};
		let end = self.i;
		self.skip_whitespaces();
		Token { kind: kind, span: start .. end }
	}

	/// True when the next non-blank byte is one of `kinds`. Only skips whitespace.
	pub fn peek(&mut self, kinds: &[TokenKind]) -> bool {
		self.skip_whitespaces();
		match self.bytes().get(self.i).and_then(|&c| TokenKind::symbol(c)) {
			Some(kind) => kinds.contains(&kind),
			None => false,
		}
	}

	pub fn text(&self, token: &Token) -> &'a str {
		&self.line[token.span.clone()]
	}

	pub fn at_end(&mut self) -> bool {
		self.skip_whitespaces();
		self.i == self.line.len()
	}

	pub fn rest(&self) -> &'a str {
		&self.line[self.i ..]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(line: &str) -> Vec<TokenKind> {
		let mut t = Tokenizer::new(line);
		let mut out = vec![];
		loop {
			let tok = t.next_token();
			out.push(tok.kind);
			if tok.kind == TokenKind::End {
				return out;
			}
		}
	}

	#[test]
	fn symbols_split_words_without_spaces() {
		use super::TokenKind::*;
		assert_eq!(kinds("cat<in|wc>out&"), vec![Word, Less, Word, Pipe, Word, Greater, Word, Amp, End]);
	}

	#[test]
	fn word_spans_exclude_surrounding_whitespace() {
		let mut t = Tokenizer::new("  \techo   hi \n");
		let echo = t.next_token();
		assert_eq!(echo.kind, TokenKind::Word);
		assert_eq!(t.text(&echo), "echo");
		let hi = t.next_token();
		assert_eq!(t.text(&hi), "hi");
		let end = t.next_token();
		assert_eq!(end.kind, TokenKind::End);
		assert!(end.span.is_empty());
	}

	#[test]
	fn blank_line_is_immediately_at_end() {
		let mut t = Tokenizer::new(" \t ");
		assert!(t.at_end());
		assert_eq!(t.next_token().kind, TokenKind::End);
	}

	#[test]
	fn peek_does_not_consume() {
		let mut t = Tokenizer::new("  | x");
		assert!(t.peek(&[TokenKind::Pipe, TokenKind::Amp]));
		assert!(!t.peek(&[TokenKind::Less]));
		assert_eq!(t.next_token().kind, TokenKind::Pipe);
		assert!(!t.peek(&[TokenKind::Pipe]));
		assert_eq!(t.rest(), "x");
	}

	#[test]
	fn non_ascii_words_stay_intact() {
		let mut t = Tokenizer::new("echo héllo>ü");
		t.next_token();
		let w = t.next_token();
		assert_eq!(t.text(&w), "héllo");
		assert_eq!(t.next_token().kind, TokenKind::Greater);
		let f = t.next_token();
		assert_eq!(t.text(&f), "ü");
	}
}
