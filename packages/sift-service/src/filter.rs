//! Boolean filter expressions over alert records.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" or ")" | "true" | "false" | "has" "(" path ")"
//!          | path [ cmp literal | "in" "[" literals "]" | "." method "(" string ")" ]
//! literals := literal ( "," literal )*
//! ```
//!
//! Evaluation is total: absent fields and mismatched types evaluate to `false` rather than
//! failing.

mod lexer;

use std::{
	cmp::Ordering,
	fmt::{Display, Formatter},
};

use serde_json::Value;
use sift_domain::AlertRecord;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use self::lexer::{Spanned, Token};

const MAX_FILTER_DEPTH: usize = 16;
const MAX_FILTER_NODES: usize = 256;
const MAX_IN_LIST_ITEMS: usize = 128;
const MAX_STRING_BYTES: usize = 1_024;
const MAX_EXPRESSION_BYTES: usize = 16 * 1_024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterParseError {
	/// Byte offset into the expression text.
	pub position: usize,
	pub message: String,
}
impl FilterParseError {
	pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
		Self { position, message: message.into() }
	}
}
impl Display for FilterParseError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "at offset {}: {}", self.position, self.message)
	}
}

impl std::error::Error for FilterParseError {}

/// A parsed filter expression, ready to evaluate against alerts.
#[derive(Clone, Debug)]
pub struct AlertFilter {
	expr: FilterExpr,
}
impl AlertFilter {
	pub fn parse(source: &str) -> Result<Self, FilterParseError> {
		if source.len() > MAX_EXPRESSION_BYTES {
			return Err(FilterParseError::new(
				0,
				format!("expression exceeds maximum bytes ({MAX_EXPRESSION_BYTES})."),
			));
		}
		if source.trim().is_empty() {
			return Err(FilterParseError::new(0, "expression must not be empty."));
		}

		let tokens = lexer::tokenize(source, MAX_STRING_BYTES)?;
		let mut parser = Parser { tokens, cursor: 0, nodes: 0, end: source.len() };
		let expr = parser.parse_or(1)?;

		if let Some(extra) = parser.peek() {
			return Err(FilterParseError::new(
				extra.position,
				format!("unexpected {} after end of expression.", extra.token.describe()),
			));
		}

		Ok(Self { expr })
	}

	pub fn matches(&self, alert: &AlertRecord) -> bool {
		self.expr.evaluate(alert)
	}

	/// Keeps the alerts that satisfy the expression, preserving input order.
	pub fn apply(&self, alerts: &[AlertRecord]) -> Vec<AlertRecord> {
		alerts.iter().filter(|alert| self.matches(alert)).cloned().collect()
	}

	pub(crate) fn expr(&self) -> &FilterExpr {
		&self.expr
	}
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FilterExpr {
	Const(bool),
	And(Vec<FilterExpr>),
	Or(Vec<FilterExpr>),
	Not(Box<FilterExpr>),
	Compare { field: FieldPath, op: CompareOp, value: Literal },
	In { field: FieldPath, values: Vec<Literal> },
	Text { field: FieldPath, op: TextOp, value: String },
	Has(FieldPath),
	IsTrue(FieldPath),
}
impl FilterExpr {
	fn evaluate(&self, alert: &AlertRecord) -> bool {
		match self {
			Self::Const(value) => *value,
			Self::And(nodes) => nodes.iter().all(|node| node.evaluate(alert)),
			Self::Or(nodes) => nodes.iter().any(|node| node.evaluate(alert)),
			Self::Not(node) => !node.evaluate(alert),
			Self::Compare { field, op, value } => {
				let actual = field.lookup(alert);

				match op {
					CompareOp::Eq => actual.equals(value),
					CompareOp::Neq => !actual.equals(value),
					CompareOp::Lt => actual.ordering(value) == Some(Ordering::Less),
					CompareOp::Lte => matches!(
						actual.ordering(value),
						Some(Ordering::Less | Ordering::Equal)
					),
					CompareOp::Gt => actual.ordering(value) == Some(Ordering::Greater),
					CompareOp::Gte => matches!(
						actual.ordering(value),
						Some(Ordering::Greater | Ordering::Equal)
					),
				}
			},
			Self::In { field, values } => {
				let actual = field.lookup(alert);

				values.iter().any(|value| actual.equals(value))
			},
			Self::Text { field, op, value } => field.lookup(alert).text_matches(*op, value),
			Self::Has(field) =>
				!matches!(field.lookup(alert), FieldValue::Absent | FieldValue::Null),
			Self::IsTrue(field) => matches!(field.lookup(alert), FieldValue::Bool(true)),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CompareOp {
	Eq,
	Neq,
	Lt,
	Lte,
	Gt,
	Gte,
}
impl CompareOp {
	pub(crate) fn as_sql(self) -> &'static str {
		match self {
			Self::Eq => "=",
			Self::Neq => "<>",
			Self::Lt => "<",
			Self::Lte => "<=",
			Self::Gt => ">",
			Self::Gte => ">=",
		}
	}

	fn from_token(token: &Token) -> Option<Self> {
		Some(match token {
			Token::Eq => Self::Eq,
			Token::Neq => Self::Neq,
			Token::Lt => Self::Lt,
			Token::Lte => Self::Lte,
			Token::Gt => Self::Gt,
			Token::Gte => Self::Gte,
			_ => return None,
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextOp {
	Contains,
	StartsWith,
	EndsWith,
}
impl TextOp {
	fn from_method(name: &str) -> Option<Self> {
		match name {
			"contains" => Some(Self::Contains),
			"startsWith" => Some(Self::StartsWith),
			"endsWith" => Some(Self::EndsWith),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Literal {
	Null,
	Bool(bool),
	Number(f64),
	/// `instant` is set when the text is an RFC 3339 timestamp.
	Text { value: String, instant: Option<OffsetDateTime> },
}
impl Literal {
	fn text(value: String) -> Self {
		let instant = OffsetDateTime::parse(&value, &Rfc3339).ok();

		Self::Text { value, instant }
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FieldPath {
	segments: Vec<String>,
}
impl FieldPath {
	pub(crate) fn dotted(&self) -> String {
		self.segments.join(".")
	}

	/// True for fields that hold a list of strings on every alert.
	pub(crate) fn is_string_list(&self) -> bool {
		self.segments.len() == 1 && self.segments[0] == "source"
	}

	fn lookup<'a>(&self, alert: &'a AlertRecord) -> FieldValue<'a> {
		let (head, rest) = match self.segments.split_first() {
			Some(split) => split,
			None => return FieldValue::Absent,
		};
		let known = match head.as_str() {
			"fingerprint" => Some(FieldValue::String(&alert.fingerprint)),
			"id" => Some(alert.id.as_deref().map_or(FieldValue::Absent, FieldValue::String)),
			"name" => Some(FieldValue::String(&alert.name)),
			"status" => Some(FieldValue::String(alert.status.as_str())),
			"severity" =>
				Some(alert.severity.as_deref().map_or(FieldValue::Absent, FieldValue::String)),
			"environment" =>
				Some(alert.environment.as_deref().map_or(FieldValue::Absent, FieldValue::String)),
			"source" => Some(FieldValue::Strings(&alert.source)),
			"lastReceived" => Some(FieldValue::Timestamp(alert.last_received)),
			"isNoisy" => Some(FieldValue::Bool(alert.is_noisy)),
			"deleted" => Some(FieldValue::Bool(alert.deleted)),
			"dismissed" => Some(FieldValue::Bool(alert.dismissed)),
			_ => None,
		};

		if let Some(value) = known {
			return if rest.is_empty() { value } else { FieldValue::Absent };
		}

		let Some(mut current) = alert.extra.get(head) else {
			return FieldValue::Absent;
		};

		for segment in rest {
			match current.get(segment.as_str()) {
				Some(next) => current = next,
				None => return FieldValue::Absent,
			}
		}

		FieldValue::from_json(current)
	}
}

/// The value a field resolves to on a particular alert.
#[derive(Clone, Debug)]
enum FieldValue<'a> {
	Absent,
	Null,
	Bool(bool),
	Number(f64),
	String(&'a str),
	Timestamp(OffsetDateTime),
	Strings(&'a [String]),
	List(&'a [Value]),
	Object,
}
impl<'a> FieldValue<'a> {
	fn from_json(value: &'a Value) -> Self {
		match value {
			Value::Null => Self::Null,
			Value::Bool(b) => Self::Bool(*b),
			Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
			Value::String(s) => Self::String(s),
			Value::Array(items) => Self::List(items),
			Value::Object(_) => Self::Object,
		}
	}

	fn equals(&self, literal: &Literal) -> bool {
		match (self, literal) {
			(Self::Absent | Self::Null, Literal::Null) => true,
			(_, Literal::Null) | (Self::Absent | Self::Null, _) => false,
			(Self::Bool(actual), Literal::Bool(expected)) => actual == expected,
			(Self::Number(actual), Literal::Number(expected)) => actual == expected,
			(Self::String(actual), Literal::Text { value, .. }) => *actual == value.as_str(),
			(Self::Timestamp(actual), Literal::Text { instant: Some(expected), .. }) =>
				actual == expected,
			_ => false,
		}
	}

	fn ordering(&self, literal: &Literal) -> Option<Ordering> {
		match (self, literal) {
			(Self::Number(actual), Literal::Number(expected)) => actual.partial_cmp(expected),
			(Self::String(actual), Literal::Text { value, .. }) =>
				Some((*actual).cmp(value.as_str())),
			(Self::Timestamp(actual), Literal::Text { instant: Some(expected), .. }) =>
				Some(actual.cmp(expected)),
			_ => None,
		}
	}

	fn text_matches(&self, op: TextOp, needle: &str) -> bool {
		match (self, op) {
			(Self::String(actual), TextOp::Contains) => actual.contains(needle),
			(Self::String(actual), TextOp::StartsWith) => actual.starts_with(needle),
			(Self::String(actual), TextOp::EndsWith) => actual.ends_with(needle),
			(Self::Strings(items), TextOp::Contains) => items.iter().any(|item| item == needle),
			(Self::List(items), TextOp::Contains) =>
				items.iter().any(|item| item.as_str() == Some(needle)),
			_ => false,
		}
	}
}

struct Parser {
	tokens: Vec<Spanned>,
	cursor: usize,
	nodes: usize,
	end: usize,
}
impl Parser {
	fn peek(&self) -> Option<&Spanned> {
		self.tokens.get(self.cursor)
	}

	fn peek_token(&self) -> Option<&Token> {
		self.peek().map(|spanned| &spanned.token)
	}

	fn position(&self) -> usize {
		self.peek().map_or(self.end, |spanned| spanned.position)
	}

	fn advance(&mut self) -> Option<Spanned> {
		let spanned = self.tokens.get(self.cursor).cloned();

		if spanned.is_some() {
			self.cursor += 1;
		}

		spanned
	}

	fn expect(&mut self, expected: Token) -> Result<(), FilterParseError> {
		let position = self.position();

		match self.advance() {
			Some(spanned) if spanned.token == expected => Ok(()),
			Some(spanned) => Err(FilterParseError::new(
				position,
				format!("expected {}, found {}.", expected.describe(), spanned.token.describe()),
			)),
			None => Err(FilterParseError::new(
				position,
				format!("expected {}, found end of expression.", expected.describe()),
			)),
		}
	}

	fn check_depth(&self, position: usize, depth: usize) -> Result<(), FilterParseError> {
		if depth > MAX_FILTER_DEPTH {
			return Err(FilterParseError::new(
				position,
				format!("expression depth exceeds maximum ({MAX_FILTER_DEPTH})."),
			));
		}

		Ok(())
	}

	fn node(&mut self, position: usize, depth: usize) -> Result<(), FilterParseError> {
		self.check_depth(position, depth)?;

		self.nodes += 1;

		if self.nodes > MAX_FILTER_NODES {
			return Err(FilterParseError::new(
				position,
				format!("expression node count exceeds maximum ({MAX_FILTER_NODES})."),
			));
		}

		Ok(())
	}

	fn parse_or(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		let position = self.position();
		let first = self.parse_and(depth)?;

		if self.peek_token() != Some(&Token::Or) {
			return Ok(first);
		}

		self.node(position, depth)?;

		let mut nodes = vec![first];

		while self.peek_token() == Some(&Token::Or) {
			self.advance();
			nodes.push(self.parse_and(depth + 1)?);
		}

		Ok(FilterExpr::Or(nodes))
	}

	fn parse_and(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		let position = self.position();
		let first = self.parse_unary(depth)?;

		if self.peek_token() != Some(&Token::And) {
			return Ok(first);
		}

		self.node(position, depth)?;

		let mut nodes = vec![first];

		while self.peek_token() == Some(&Token::And) {
			self.advance();
			nodes.push(self.parse_unary(depth + 1)?);
		}

		Ok(FilterExpr::And(nodes))
	}

	fn parse_unary(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		if self.peek_token() == Some(&Token::Not) {
			let position = self.position();

			self.node(position, depth)?;
			self.advance();

			return Ok(FilterExpr::Not(Box::new(self.parse_unary(depth + 1)?)));
		}

		self.parse_primary(depth)
	}

	fn parse_primary(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		let position = self.position();
		let Some(spanned) = self.advance() else {
			return Err(FilterParseError::new(position, "unexpected end of expression."));
		};

		match spanned.token {
			Token::LParen => {
				self.check_depth(position, depth + 1)?;

				let inner = self.parse_or(depth + 1)?;

				self.expect(Token::RParen)?;

				Ok(inner)
			},
			Token::True => {
				self.node(position, depth)?;

				Ok(FilterExpr::Const(true))
			},
			Token::False => {
				self.node(position, depth)?;

				Ok(FilterExpr::Const(false))
			},
			Token::Ident(name) if name == "has" && self.peek_token() == Some(&Token::LParen) => {
				self.node(position, depth)?;
				self.advance();

				let field = self.parse_path(None)?;

				self.expect(Token::RParen)?;

				Ok(FilterExpr::Has(field))
			},
			Token::Ident(name) => {
				self.node(position, depth)?;
				self.parse_predicate(name)
			},
			other => Err(FilterParseError::new(
				position,
				format!("expected a field, '(' or '!', found {}.", other.describe()),
			)),
		}
	}

	fn parse_path(&mut self, first: Option<String>) -> Result<FieldPath, FilterParseError> {
		let mut segments = match first {
			Some(first) => vec![first],
			None => vec![self.parse_ident()?],
		};

		while self.peek_token() == Some(&Token::Dot) {
			// `field.method(` ends the path.
			if self.tokens.get(self.cursor + 2).map(|s| &s.token) == Some(&Token::LParen) {
				break;
			}

			self.advance();
			segments.push(self.parse_ident()?);
		}

		Ok(FieldPath { segments })
	}

	fn parse_ident(&mut self) -> Result<String, FilterParseError> {
		let position = self.position();

		match self.advance() {
			Some(Spanned { token: Token::Ident(name), .. }) => Ok(name),
			Some(spanned) => Err(FilterParseError::new(
				position,
				format!("expected a field name, found {}.", spanned.token.describe()),
			)),
			None => Err(FilterParseError::new(position, "expected a field name.")),
		}
	}

	fn parse_predicate(&mut self, head: String) -> Result<FilterExpr, FilterParseError> {
		let field = self.parse_path(Some(head))?;
		let position = self.position();

		if let Some(op) = self.peek_token().and_then(CompareOp::from_token) {
			self.advance();

			let value = self.parse_literal()?;

			if matches!(value, Literal::Null) && !matches!(op, CompareOp::Eq | CompareOp::Neq) {
				return Err(FilterParseError::new(
					position,
					"null can only be compared with '==' or '!='.",
				));
			}

			return Ok(FilterExpr::Compare { field, op, value });
		}

		match self.peek_token() {
			Some(Token::In) => {
				self.advance();
				self.expect(Token::LBracket)?;

				let mut values = Vec::new();

				if self.peek_token() != Some(&Token::RBracket) {
					loop {
						values.push(self.parse_literal()?);

						if values.len() > MAX_IN_LIST_ITEMS {
							return Err(FilterParseError::new(
								position,
								format!("'in' list exceeds maximum items ({MAX_IN_LIST_ITEMS})."),
							));
						}
						if self.peek_token() == Some(&Token::Comma) {
							self.advance();

							continue;
						}

						break;
					}
				}

				self.expect(Token::RBracket)?;

				if values.is_empty() {
					return Err(FilterParseError::new(position, "'in' list must not be empty."));
				}

				Ok(FilterExpr::In { field, values })
			},
			Some(Token::Dot) => {
				self.advance();

				let method_position = self.position();
				let method = self.parse_ident()?;
				let Some(op) = TextOp::from_method(&method) else {
					return Err(FilterParseError::new(
						method_position,
						format!("unknown method '{method}'."),
					));
				};

				self.expect(Token::LParen)?;

				let argument_position = self.position();
				let value = match self.parse_literal()? {
					Literal::Text { value, .. } => value,
					_ => {
						return Err(FilterParseError::new(
							argument_position,
							format!("'{method}' expects a string argument."),
						));
					},
				};

				self.expect(Token::RParen)?;

				Ok(FilterExpr::Text { field, op, value })
			},
			_ => Ok(FilterExpr::IsTrue(field)),
		}
	}

	fn parse_literal(&mut self) -> Result<Literal, FilterParseError> {
		let position = self.position();
		let Some(spanned) = self.advance() else {
			return Err(FilterParseError::new(
				position,
				"expected a literal, found end of expression.",
			));
		};

		match spanned.token {
			Token::Str(value) => Ok(Literal::text(value)),
			Token::Number(value) => Ok(Literal::Number(value)),
			Token::Minus => match self.advance() {
				Some(Spanned { token: Token::Number(value), .. }) => Ok(Literal::Number(-value)),
				_ => Err(FilterParseError::new(position, "expected a number after '-'.")),
			},
			Token::True => Ok(Literal::Bool(true)),
			Token::False => Ok(Literal::Bool(false)),
			Token::Null => Ok(Literal::Null),
			other => Err(FilterParseError::new(
				position,
				format!("expected a literal, found {}.", other.describe()),
			)),
		}
	}
}
