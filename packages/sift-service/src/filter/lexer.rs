use crate::filter::FilterParseError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
	Ident(String),
	Str(String),
	Number(f64),
	True,
	False,
	Null,
	In,
	LParen,
	RParen,
	LBracket,
	RBracket,
	Comma,
	Dot,
	Minus,
	And,
	Or,
	Not,
	Eq,
	Neq,
	Lt,
	Lte,
	Gt,
	Gte,
}
impl Token {
	pub(crate) fn describe(&self) -> String {
		match self {
			Self::Ident(name) => format!("identifier '{name}'"),
			Self::Str(_) => "string literal".to_string(),
			Self::Number(_) => "number literal".to_string(),
			Self::True => "'true'".to_string(),
			Self::False => "'false'".to_string(),
			Self::Null => "'null'".to_string(),
			Self::In => "'in'".to_string(),
			Self::LParen => "'('".to_string(),
			Self::RParen => "')'".to_string(),
			Self::LBracket => "'['".to_string(),
			Self::RBracket => "']'".to_string(),
			Self::Comma => "','".to_string(),
			Self::Dot => "'.'".to_string(),
			Self::Minus => "'-'".to_string(),
			Self::And => "'&&'".to_string(),
			Self::Or => "'||'".to_string(),
			Self::Not => "'!'".to_string(),
			Self::Eq => "'=='".to_string(),
			Self::Neq => "'!='".to_string(),
			Self::Lt => "'<'".to_string(),
			Self::Lte => "'<='".to_string(),
			Self::Gt => "'>'".to_string(),
			Self::Gte => "'>='".to_string(),
		}
	}
}

#[derive(Clone, Debug)]
pub(crate) struct Spanned {
	pub(crate) token: Token,
	/// Byte offset of the token's first character.
	pub(crate) position: usize,
}

pub(crate) fn tokenize(
	input: &str,
	max_string_bytes: usize,
) -> Result<Vec<Spanned>, FilterParseError> {
	let bytes = input.as_bytes();
	let mut tokens = Vec::new();
	let mut pos = 0;

	while pos < bytes.len() {
		let c = bytes[pos];

		if c.is_ascii_whitespace() {
			pos += 1;

			continue;
		}

		let start = pos;
		let two = bytes.get(pos + 1).copied();
		let token = match c {
			b'(' => Token::LParen,
			b')' => Token::RParen,
			b'[' => Token::LBracket,
			b']' => Token::RBracket,
			b',' => Token::Comma,
			b'.' => Token::Dot,
			b'-' => Token::Minus,
			b'&' if two == Some(b'&') => Token::And,
			b'|' if two == Some(b'|') => Token::Or,
			b'=' if two == Some(b'=') => Token::Eq,
			b'!' if two == Some(b'=') => Token::Neq,
			b'!' => Token::Not,
			b'<' if two == Some(b'=') => Token::Lte,
			b'<' => Token::Lt,
			b'>' if two == Some(b'=') => Token::Gte,
			b'>' => Token::Gt,
			b'"' | b'\'' => {
				let (value, end) = lex_string(input, pos, max_string_bytes)?;

				tokens.push(Spanned { token: Token::Str(value), position: start });

				pos = end;

				continue;
			},
			b'0'..=b'9' => {
				let (value, end) = lex_number(input, pos)?;

				tokens.push(Spanned { token: Token::Number(value), position: start });

				pos = end;

				continue;
			},
			c if c == b'_' || c.is_ascii_alphabetic() => {
				let mut end = pos;

				while end < bytes.len() && is_ident_byte(bytes[end]) {
					end += 1;
				}

				let word = &input[pos..end];
				let token = match word {
					"true" => Token::True,
					"false" => Token::False,
					"null" => Token::Null,
					"in" => Token::In,
					_ => Token::Ident(word.to_string()),
				};

				tokens.push(Spanned { token, position: start });

				pos = end;

				continue;
			},
			_ => {
				let found = input[pos..].chars().next().unwrap_or('?');

				return Err(FilterParseError::new(pos, format!("unexpected character '{found}'.")));
			},
		};
		let width = match token {
			Token::And | Token::Or | Token::Eq | Token::Neq | Token::Lte | Token::Gte => 2,
			_ => 1,
		};

		tokens.push(Spanned { token, position: start });

		pos += width;
	}

	Ok(tokens)
}

fn is_ident_byte(byte: u8) -> bool {
	byte == b'_' || byte.is_ascii_alphanumeric()
}

fn lex_string(
	input: &str,
	start: usize,
	max_string_bytes: usize,
) -> Result<(String, usize), FilterParseError> {
	let mut chars = input[start..].char_indices();
	let Some((_, quote)) = chars.next() else {
		return Err(FilterParseError::new(start, "expected a string literal."));
	};
	let mut value = String::new();

	while let Some((offset, c)) = chars.next() {
		match c {
			c if c == quote => {
				if value.len() > max_string_bytes {
					return Err(FilterParseError::new(
						start,
						format!("string literal exceeds maximum bytes ({max_string_bytes})."),
					));
				}

				return Ok((value, start + offset + c.len_utf8()));
			},
			'\\' => {
				let Some((_, escaped)) = chars.next() else {
					break;
				};

				match escaped {
					'\\' | '"' | '\'' => value.push(escaped),
					'n' => value.push('\n'),
					't' => value.push('\t'),
					other => {
						return Err(FilterParseError::new(
							start + offset,
							format!("unsupported escape sequence '\\{other}'."),
						));
					},
				}
			},
			c => value.push(c),
		}
	}

	Err(FilterParseError::new(start, "unterminated string literal."))
}

fn lex_number(input: &str, start: usize) -> Result<(f64, usize), FilterParseError> {
	let bytes = input.as_bytes();
	let mut end = start;

	while end < bytes.len() && bytes[end].is_ascii_digit() {
		end += 1;
	}
	// A '.' only belongs to the number when a digit follows it.
	if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
		end += 1;

		while end < bytes.len() && bytes[end].is_ascii_digit() {
			end += 1;
		}
	}
	if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
		let mut exp_end = end + 1;

		if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
			exp_end += 1;
		}
		if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
			while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
				exp_end += 1;
			}

			end = exp_end;
		}
	}

	let raw = &input[start..end];
	let value: f64 = raw
		.parse()
		.map_err(|_| FilterParseError::new(start, format!("invalid number literal '{raw}'.")))?;

	if !value.is_finite() {
		return Err(FilterParseError::new(
			start,
			format!("number literal '{raw}' is out of range."),
		));
	}

	Ok((value, end))
}

#[cfg(test)]
mod tests {
	use crate::filter::lexer::{Token, tokenize};

	fn tokens(input: &str) -> Vec<Token> {
		tokenize(input, 1_024).expect("valid input").into_iter().map(|s| s.token).collect()
	}

	#[test]
	fn lexes_operators_and_literals() {
		assert_eq!(
			tokens(r#"status == "firing" && count >= 2.5 || !isNoisy"#),
			vec![
				Token::Ident("status".to_string()),
				Token::Eq,
				Token::Str("firing".to_string()),
				Token::And,
				Token::Ident("count".to_string()),
				Token::Gte,
				Token::Number(2.5),
				Token::Or,
				Token::Not,
				Token::Ident("isNoisy".to_string()),
			]
		);
	}

	#[test]
	fn lexes_escapes_in_both_quote_styles() {
		assert_eq!(
			tokens(r#"'it\'s' "say \"hi\"""#),
			vec![Token::Str("it's".to_string()), Token::Str("say \"hi\"".to_string())]
		);
	}

	#[test]
	fn method_call_dot_is_not_part_of_number() {
		assert_eq!(tokens("1.5"), vec![Token::Number(1.5)]);
		assert_eq!(
			tokens("a.b"),
			vec![Token::Ident("a".to_string()), Token::Dot, Token::Ident("b".to_string())]
		);
	}

	#[test]
	fn rejects_unterminated_string_with_position() {
		let err = tokenize(r#"name == "oops"#, 1_024).expect_err("unterminated");

		assert_eq!(err.position, 8);
	}

	#[test]
	fn rejects_single_ampersand() {
		assert!(tokenize("a & b", 1_024).is_err());
	}
}
