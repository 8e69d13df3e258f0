pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_alerts.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_alerts.sql")),
				"tables/002_alert_enrichments.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_alert_enrichments.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use crate::schema::render_schema;

	#[test]
	fn includes_every_table() {
		let sql = render_schema();

		assert!(sql.contains("CREATE TABLE IF NOT EXISTS alerts"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS alert_enrichments"));
		assert!(!sql.contains("\\ir"));
	}
}
