//! Renders filter queries into SQL for the remote engine's `_sql` endpoint.

use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};
use sift_domain::TimeWindow;

use crate::filter::{AlertFilter, CompareOp, FieldPath, FilterExpr, Literal, TextOp};

/// Column aliases of [`aggregate_statement`], in select order.
pub const AGGREGATE_COLUMNS: [&str; 3] = ["alerts_count", "active_firing", "active_noisy_firing"];

const LAST_RECEIVED: &str = "lastReceived";
const LIKE_ESCAPE: char = '!';

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslateError {
	pub message: String,
}
impl TranslateError {
	fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}
impl Display for TranslateError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.message)
	}
}

impl std::error::Error for TranslateError {}

/// Substitutes `:name` placeholders with quoted literals in one left-to-right pass.
///
/// Placeholder names are matched greedily, so `:id` never matches a prefix of `:id2`.
/// Text inside single-quoted literals, double-quoted identifiers and `::` casts is copied
/// verbatim. Substituted values are never rescanned.
pub fn render_template(
	template: &str,
	parameters: &Map<String, Value>,
) -> Result<String, TranslateError> {
	let mut out = String::with_capacity(template.len());
	let mut chars = template.char_indices().peekable();
	let mut quote: Option<char> = None;

	while let Some((offset, c)) = chars.next() {
		if let Some(open) = quote {
			if c == open {
				quote = None;
			}

			out.push(c);

			continue;
		}

		match c {
			'\'' | '"' => {
				quote = Some(c);

				out.push(c);
			},
			':' => match chars.peek() {
				Some((_, ':')) => {
					chars.next();
					out.push_str("::");
				},
				Some((_, next)) if *next == '_' || next.is_ascii_alphabetic() => {
					let start = offset + 1;
					let mut end = start;

					while let Some((index, next)) = chars.peek() {
						if *next == '_' || next.is_ascii_alphanumeric() {
							end = index + next.len_utf8();

							chars.next();
						} else {
							break;
						}
					}

					let name = &template[start..end];
					let value = parameters.get(name).ok_or_else(|| {
						TranslateError::new(format!("no value bound for placeholder ':{name}'."))
					})?;

					out.push_str(&render_parameter(name, value)?);
				},
				_ => out.push(':'),
			},
			c => out.push(c),
		}
	}

	if quote.is_some() {
		return Err(TranslateError::new("template has an unterminated quoted section."));
	}

	Ok(out)
}

/// Renders a parsed filter into a SQL predicate with the same results as in-process evaluation.
pub fn render_expression(filter: &AlertFilter) -> String {
	render_node(filter.expr())
}

pub fn select_statement(index: &str, predicate: &str, window: TimeWindow) -> String {
	format!(
		"SELECT * FROM {} WHERE ({predicate}){} ORDER BY {} DESC",
		quote_ident(index),
		window_clause(window),
		quote_ident(LAST_RECEIVED),
	)
}

/// Counts matches and flags active firing alerts, in the column order of
/// [`AGGREGATE_COLUMNS`].
pub fn aggregate_statement(index: &str, predicate: &str, window: TimeWindow) -> String {
	let active =
		r#"("deleted" IS NULL OR "deleted" = false) AND ("dismissed" IS NULL OR "dismissed" = false)"#;
	let firing = r#""status" = 'firing'"#;

	format!(
		"SELECT COUNT(*) AS \"{}\", \
		MAX(CASE WHEN {firing} AND {active} THEN 1 ELSE 0 END) AS \"{}\", \
		MAX(CASE WHEN {firing} AND \"isNoisy\" = true AND {active} THEN 1 ELSE 0 END) AS \"{}\" \
		FROM {} WHERE ({predicate}){}",
		AGGREGATE_COLUMNS[0],
		AGGREGATE_COLUMNS[1],
		AGGREGATE_COLUMNS[2],
		quote_ident(index),
		window_clause(window),
	)
}

pub(crate) fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_string(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

fn window_clause(window: TimeWindow) -> String {
	match window.seconds() {
		Some(seconds) =>
			format!(" AND {} > NOW() - INTERVAL {seconds} SECONDS", quote_ident(LAST_RECEIVED)),
		None => String::new(),
	}
}

fn render_parameter(name: &str, value: &Value) -> Result<String, TranslateError> {
	match value {
		Value::Array(items) => {
			if items.is_empty() {
				return Err(TranslateError::new(format!(
					"placeholder ':{name}' is bound to an empty list."
				)));
			}

			let rendered = items
				.iter()
				.map(|item| match item {
					Value::Array(_) | Value::Object(_) => Err(TranslateError::new(format!(
						"placeholder ':{name}' contains a nested list or object."
					))),
					scalar => render_scalar(name, scalar),
				})
				.collect::<Result<Vec<_>, _>>()?;

			Ok(rendered.join(", "))
		},
		scalar => render_scalar(name, scalar),
	}
}

fn render_scalar(name: &str, value: &Value) -> Result<String, TranslateError> {
	match value {
		Value::Null => Ok("NULL".to_string()),
		Value::Bool(b) => Ok(b.to_string()),
		Value::Number(n) => Ok(n.to_string()),
		Value::String(s) => Ok(quote_string(s)),
		Value::Array(_) | Value::Object(_) => Err(TranslateError::new(format!(
			"placeholder ':{name}' must be bound to a scalar or a list of scalars."
		))),
	}
}

fn render_number(value: f64) -> String {
	if value.fract() == 0.0 && value.abs() < 1e15 {
		format!("{}", value as i64)
	} else {
		format!("{value}")
	}
}

fn render_literal(literal: &Literal) -> String {
	match literal {
		Literal::Null => "NULL".to_string(),
		Literal::Bool(b) => b.to_string(),
		Literal::Number(n) => render_number(*n),
		Literal::Text { value, .. } => quote_string(value),
	}
}

fn is_timestamp(field: &FieldPath) -> bool {
	field.dotted() == LAST_RECEIVED
}

fn constant(value: bool) -> String {
	if value { "(1 = 1)".to_string() } else { "(1 = 0)".to_string() }
}

fn render_node(expr: &FilterExpr) -> String {
	match expr {
		FilterExpr::Const(value) => constant(*value),
		FilterExpr::And(nodes) => join_nodes(nodes, " AND "),
		FilterExpr::Or(nodes) => join_nodes(nodes, " OR "),
		FilterExpr::Not(node) => format!("(NOT {})", render_node(node)),
		FilterExpr::Compare { field, op, value } => render_compare(field, *op, value),
		FilterExpr::In { field, values } => render_in(field, values),
		FilterExpr::Text { field, op, value } => render_text(field, *op, value),
		FilterExpr::Has(field) => format!("{} IS NOT NULL", quote_ident(&field.dotted())),
		FilterExpr::IsTrue(field) => {
			let column = quote_ident(&field.dotted());

			format!("({column} IS NOT NULL AND {column} = true)")
		},
	}
}

fn join_nodes(nodes: &[FilterExpr], separator: &str) -> String {
	let rendered = nodes.iter().map(render_node).collect::<Vec<_>>();

	format!("({})", rendered.join(separator))
}

fn render_compare(field: &FieldPath, op: CompareOp, value: &Literal) -> String {
	let column = quote_ident(&field.dotted());

	if matches!(value, Literal::Bool(_)) && !matches!(op, CompareOp::Eq | CompareOp::Neq) {
		return constant(false);
	}

	let literal = if is_timestamp(field) {
		match value {
			Literal::Null => None,
			Literal::Text { value, instant: Some(_) } =>
				Some(format!("CAST({} AS DATETIME)", quote_string(value))),
			// Timestamps only compare with RFC 3339 text.
			_ => return constant(op == CompareOp::Neq),
		}
	} else {
		(!matches!(value, Literal::Null)).then(|| render_literal(value))
	};

	match (op, literal) {
		(CompareOp::Eq, None) => format!("{column} IS NULL"),
		(_, None) => format!("{column} IS NOT NULL"),
		(CompareOp::Neq, Some(literal)) => format!("({column} IS NULL OR {column} <> {literal})"),
		(op, Some(literal)) =>
			format!("({column} IS NOT NULL AND {column} {} {literal})", op.as_sql()),
	}
}

fn render_in(field: &FieldPath, values: &[Literal]) -> String {
	let column = quote_ident(&field.dotted());
	let has_null = values.iter().any(|value| matches!(value, Literal::Null));
	let listed = values
		.iter()
		.filter(|value| !matches!(value, Literal::Null))
		.map(|value| {
			if is_timestamp(field)
				&& let Literal::Text { value, instant: Some(_) } = value
			{
				format!("CAST({} AS DATETIME)", quote_string(value))
			} else {
				render_literal(value)
			}
		})
		.collect::<Vec<_>>();

	match (has_null, listed.is_empty()) {
		(true, true) => format!("{column} IS NULL"),
		(false, _) => format!("({column} IS NOT NULL AND {column} IN ({}))", listed.join(", ")),
		(true, false) => format!(
			"({column} IS NULL OR ({column} IS NOT NULL AND {column} IN ({})))",
			listed.join(", ")
		),
	}
}

fn render_text(field: &FieldPath, op: TextOp, needle: &str) -> String {
	let column = quote_ident(&field.dotted());

	if field.is_string_list() {
		return match op {
			TextOp::Contains =>
				format!("({column} IS NOT NULL AND {column} = {})", quote_string(needle)),
			TextOp::StartsWith | TextOp::EndsWith => constant(false),
		};
	}

	let escaped = escape_like(needle);
	let pattern = match op {
		TextOp::Contains => format!("%{escaped}%"),
		TextOp::StartsWith => format!("{escaped}%"),
		TextOp::EndsWith => format!("%{escaped}"),
	};

	format!(
		"({column} IS NOT NULL AND {column} LIKE {} ESCAPE '{LIKE_ESCAPE}')",
		quote_string(&pattern)
	)
}

fn escape_like(value: &str) -> String {
	let mut out = String::with_capacity(value.len());

	for c in value.chars() {
		if c == LIKE_ESCAPE || c == '%' || c == '_' {
			out.push(LIKE_ESCAPE);
		}

		out.push(c);
	}

	out
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, Value, json};
	use sift_domain::TimeWindow;

	use crate::{
		filter::AlertFilter,
		translate::{
			aggregate_statement, render_expression, render_template, select_statement,
		},
	};

	fn params(value: Value) -> Map<String, Value> {
		value.as_object().cloned().expect("object")
	}

	fn expression(text: &str) -> String {
		render_expression(&AlertFilter::parse(text).expect("valid expression"))
	}

	#[test]
	fn overlapping_placeholder_names_do_not_collide() {
		let rendered =
			render_template("id = :id OR id = :id2", &params(json!({ "id": "a", "id2": "b" })))
				.expect("rendered");

		assert_eq!(rendered, "id = 'a' OR id = 'b'");
	}

	#[test]
	fn renders_scalars_and_lists() {
		let rendered = render_template(
			"severity IN (:levels) AND count > :n AND isNoisy = :noisy AND owner IS :owner",
			&params(json!({
				"levels": ["critical", "high"],
				"n": 3,
				"noisy": true,
				"owner": null,
			})),
		)
		.expect("rendered");

		assert_eq!(
			rendered,
			"severity IN ('critical', 'high') AND count > 3 AND isNoisy = true AND owner IS NULL"
		);
	}

	#[test]
	fn substituted_text_is_not_rescanned() {
		let rendered = render_template(
			"name = :a AND note = :b",
			&params(json!({ "a": ":b", "b": "it's" })),
		)
		.expect("rendered");

		assert_eq!(rendered, "name = ':b' AND note = 'it''s'");
	}

	#[test]
	fn skips_quoted_text_and_casts() {
		let rendered = render_template(
			"msg = 'at 10:30 :x' AND \"a:b\" = :x AND t::text = :x",
			&params(json!({ "x": "v" })),
		)
		.expect("rendered");

		assert_eq!(rendered, "msg = 'at 10:30 :x' AND \"a:b\" = 'v' AND t::text = 'v'");
	}

	#[test]
	fn rejects_unbound_and_object_parameters() {
		assert!(render_template("a = :missing", &Map::new()).is_err());
		assert!(render_template("a = :obj", &params(json!({ "obj": { "k": 1 } }))).is_err());
		assert!(render_template("a IN (:ids)", &params(json!({ "ids": [] }))).is_err());
		assert!(render_template("a = 'open", &Map::new()).is_err());
	}

	#[test]
	fn renders_null_safe_comparisons() {
		assert_eq!(
			expression("status == 'firing'"),
			r#"("status" IS NOT NULL AND "status" = 'firing')"#
		);
		assert_eq!(
			expression("severity != 'low'"),
			r#"("severity" IS NULL OR "severity" <> 'low')"#
		);
		assert_eq!(expression("owner == null"), r#""owner" IS NULL"#);
		assert_eq!(expression("labels.n >= 2"), r#"("labels.n" IS NOT NULL AND "labels.n" >= 2)"#);
	}

	#[test]
	fn renders_logic_and_negation() {
		assert_eq!(
			expression("!(isNoisy || has(team)) && x == 1.5"),
			r#"((NOT (("isNoisy" IS NOT NULL AND "isNoisy" = true) OR "team" IS NOT NULL)) AND ("x" IS NOT NULL AND "x" = 1.5))"#
		);
	}

	#[test]
	fn renders_membership_and_text_methods() {
		assert_eq!(
			expression("env in ['prod', null]"),
			r#"("env" IS NULL OR ("env" IS NOT NULL AND "env" IN ('prod')))"#
		);
		assert_eq!(
			expression("name.contains('50%_off')"),
			r#"("name" IS NOT NULL AND "name" LIKE '%50!%!_off%' ESCAPE '!')"#
		);
		assert_eq!(
			expression("source.contains('grafana')"),
			r#"("source" IS NOT NULL AND "source" = 'grafana')"#
		);
	}

	#[test]
	fn timestamps_compare_as_datetimes() {
		assert_eq!(
			expression("lastReceived > '2026-03-01T00:00:00Z'"),
			r#"("lastReceived" IS NOT NULL AND "lastReceived" > CAST('2026-03-01T00:00:00Z' AS DATETIME))"#
		);
		assert_eq!(expression("lastReceived == 5"), "(1 = 0)");
	}

	#[test]
	fn statements_wrap_predicate_and_window() {
		assert_eq!(
			select_statement("keep-alerts-acme", "a = 1", TimeWindow::from_secs(600)),
			r#"SELECT * FROM "keep-alerts-acme" WHERE (a = 1) AND "lastReceived" > NOW() - INTERVAL 600 SECONDS ORDER BY "lastReceived" DESC"#
		);
		assert_eq!(
			select_statement("idx", "a = 1", TimeWindow::UNBOUNDED),
			r#"SELECT * FROM "idx" WHERE (a = 1) ORDER BY "lastReceived" DESC"#
		);

		let aggregate = aggregate_statement("idx", "a = 1", TimeWindow::UNBOUNDED);

		assert!(aggregate.starts_with(r#"SELECT COUNT(*) AS "alerts_count", MAX(CASE WHEN"#));
		assert!(aggregate.ends_with(r#"FROM "idx" WHERE (a = 1)"#), "{aggregate}");
		assert!(aggregate.contains(r#""isNoisy" = true"#));
	}
}
