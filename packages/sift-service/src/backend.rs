//! The two execution paths behind [`FilterExecutor`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sift_domain::{AlertRecord, FilterQuery, NoiseSummary, TimeWindow, dedup_by_fingerprint};
use sift_storage::remote::QueryRows;

use crate::{
	AlertFilter, BoxFuture, Error, RemoteEngine, Result, SiftService,
	translate::{self, AGGREGATE_COLUMNS},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	Internal,
	Remote,
}
impl SearchMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Internal => "internal",
			Self::Remote => "remote",
		}
	}
}

/// Runs filter queries for one tenant on one execution path.
pub trait FilterExecutor
where
	Self: Send + Sync,
{
	fn mode(&self) -> SearchMode;

	/// Matching alerts, at most `limit` of them.
	fn search<'a>(
		&'a self,
		query: &'a FilterQuery,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<AlertRecord>>>;

	/// Match count and activity flags, for noise classification.
	fn summarize<'a>(&'a self, query: &'a FilterQuery) -> BoxFuture<'a, Result<NoiseSummary>>;
}

/// Evaluates expressions in process against a deduplicated alert history.
#[derive(Clone, Debug)]
pub struct InternalExecutor {
	alerts: Vec<AlertRecord>,
}
impl InternalExecutor {
	/// Takes a most-recent-first history and keeps the first record per fingerprint.
	pub fn from_history(history: Vec<AlertRecord>) -> Self {
		let deduplicated = dedup_by_fingerprint(history);

		if deduplicated.dropped > 0 {
			tracing::debug!(
				dropped = deduplicated.dropped,
				kept = deduplicated.alerts.len(),
				"Deduplicated alert history."
			);
		}

		Self { alerts: deduplicated.alerts }
	}

	pub fn alerts(&self) -> &[AlertRecord] {
		&self.alerts
	}

	fn matching(&self, query: &FilterQuery) -> Result<Vec<AlertRecord>> {
		match query {
			FilterQuery::Expression { expression } =>
				Ok(AlertFilter::parse(expression)?.apply(&self.alerts)),
			FilterQuery::Templated { .. } => Err(Error::QuerySyntax {
				message: "templated query cannot be evaluated in-process.".to_string(),
			}),
		}
	}
}

impl FilterExecutor for InternalExecutor {
	fn mode(&self) -> SearchMode {
		SearchMode::Internal
	}

	fn search<'a>(
		&'a self,
		query: &'a FilterQuery,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<AlertRecord>>> {
		let result = self.matching(query).map(|mut alerts| {
			alerts.truncate(limit as usize);

			alerts
		});

		Box::pin(std::future::ready(result))
	}

	fn summarize<'a>(&'a self, query: &'a FilterQuery) -> BoxFuture<'a, Result<NoiseSummary>> {
		let result = self.matching(query).map(|alerts| NoiseSummary::from_alerts(&alerts));

		Box::pin(std::future::ready(result))
	}
}

/// Translates queries to SQL and runs them against the tenant's remote index.
pub struct RemoteExecutor {
	engine: Arc<dyn RemoteEngine>,
	tenant_id: String,
	index: String,
	window: TimeWindow,
}
impl RemoteExecutor {
	pub fn new(
		engine: Arc<dyn RemoteEngine>,
		tenant_id: impl Into<String>,
		index: impl Into<String>,
		window: TimeWindow,
	) -> Self {
		Self { engine, tenant_id: tenant_id.into(), index: index.into(), window }
	}

	/// The SQL predicate for a query, before it is wrapped in a statement.
	pub fn predicate(query: &FilterQuery) -> Result<String> {
		match query {
			FilterQuery::Expression { expression } =>
				Ok(translate::render_expression(&AlertFilter::parse(expression)?)),
			FilterQuery::Templated { template, parameters } =>
				Ok(translate::render_template(template, parameters)?),
		}
	}

	async fn search_remote(&self, query: &FilterQuery, limit: u32) -> Result<Vec<AlertRecord>> {
		let predicate = Self::predicate(query)?;
		let sql = translate::select_statement(&self.index, &predicate, self.window);

		tracing::debug!(tenant_id = %self.tenant_id, sql = %sql, "Running remote search.");

		self.engine.search_records(&self.tenant_id, &sql, limit).await.map_err(Error::remote)
	}

	async fn summarize_remote(&self, query: &FilterQuery) -> Result<NoiseSummary> {
		let predicate = Self::predicate(query)?;
		let sql = translate::aggregate_statement(&self.index, &predicate, self.window);

		tracing::debug!(tenant_id = %self.tenant_id, sql = %sql, "Running remote aggregate.");

		let rows = self.engine.run_query(&self.tenant_id, &sql).await.map_err(Error::remote)?;

		match summary_from_rows(&rows)? {
			Some(summary) => Ok(summary),
			None => {
				tracing::warn!(
					tenant_id = %self.tenant_id,
					query = %query.text(),
					"Remote aggregate returned no rows."
				);

				Ok(NoiseSummary::default())
			},
		}
	}
}

impl FilterExecutor for RemoteExecutor {
	fn mode(&self) -> SearchMode {
		SearchMode::Remote
	}

	fn search<'a>(
		&'a self,
		query: &'a FilterQuery,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<AlertRecord>>> {
		Box::pin(self.search_remote(query, limit))
	}

	fn summarize<'a>(&'a self, query: &'a FilterQuery) -> BoxFuture<'a, Result<NoiseSummary>> {
		Box::pin(self.summarize_remote(query))
	}
}

impl SiftService {
	/// Selects the execution path for one call and prepares it.
	///
	/// The internal path fetches and deduplicates the tenant's history once, so every query
	/// in the call sees the same alerts.
	pub async fn executor(
		&self,
		tenant_id: &str,
		history_limit: u32,
		window: TimeWindow,
	) -> Result<Box<dyn FilterExecutor>> {
		match (self.mode_for(tenant_id), self.sources.remote.as_ref()) {
			(SearchMode::Remote, Some(engine)) => Ok(Box::new(RemoteExecutor::new(
				Arc::clone(engine),
				tenant_id,
				self.cfg.remote.index_name(tenant_id),
				window,
			))),
			_ => {
				let history = self
					.sources
					.alerts
					.fetch_recent_alerts(tenant_id, history_limit, window)
					.await
					.map_err(Error::alert_source)?;

				Ok(Box::new(InternalExecutor::from_history(history)))
			},
		}
	}
}

/// Reads the single row produced by [`translate::aggregate_statement`].
fn summary_from_rows(rows: &QueryRows) -> Result<Option<NoiseSummary>> {
	let Some(row) = rows.first_row() else {
		return Ok(None);
	};
	let alerts_count = match aggregate_cell(rows, row, 0)? {
		Some(Value::Number(n)) =>
			n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(0),
		_ => 0,
	};

	Ok(Some(NoiseSummary {
		alerts_count,
		has_active_firing: flag(aggregate_cell(rows, row, 1)?),
		has_active_noisy_firing: flag(aggregate_cell(rows, row, 2)?),
	}))
}

fn aggregate_cell<'a>(
	rows: &QueryRows,
	row: &'a [Value],
	index: usize,
) -> Result<Option<&'a Value>> {
	let name = AGGREGATE_COLUMNS[index];
	let position = match rows.columns.iter().position(|column| column.name == name) {
		Some(position) => position,
		None if rows.columns.is_empty() => index,
		None => {
			return Err(Error::QuerySyntax {
				message: format!("remote aggregate is missing column '{name}'."),
			});
		},
	};

	Ok(row.get(position))
}

fn flag(value: Option<&Value>) -> bool {
	match value {
		Some(Value::Bool(b)) => *b,
		Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f > 0.0),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use sift_domain::{AlertRecord, AlertStatus, FilterQuery, NoiseSummary};
	use sift_storage::remote::{QueryColumn, QueryRows};
	use time::macros::datetime;

	use crate::backend::{FilterExecutor, InternalExecutor, RemoteExecutor, summary_from_rows};

	fn rows(values: Vec<serde_json::Value>) -> QueryRows {
		QueryRows {
			columns: ["alerts_count", "active_firing", "active_noisy_firing"]
				.into_iter()
				.map(|name| QueryColumn { name: name.to_string(), column_type: "long".to_string() })
				.collect(),
			rows: vec![values],
		}
	}

	#[test]
	fn aggregate_row_becomes_summary() {
		let summary = summary_from_rows(&rows(vec![json!(4), json!(1), json!(0)]))
			.expect("decoded")
			.expect("row");

		assert_eq!(
			summary,
			NoiseSummary {
				alerts_count: 4,
				has_active_firing: true,
				has_active_noisy_firing: false,
			}
		);
	}

	#[test]
	fn null_maxima_mean_no_activity() {
		let summary = summary_from_rows(&rows(vec![json!(0), json!(null), json!(null)]))
			.expect("decoded")
			.expect("row");

		assert_eq!(summary, NoiseSummary::default());
	}

	#[test]
	fn empty_result_has_no_summary() {
		let empty = QueryRows { columns: Vec::new(), rows: Vec::new() };

		assert_eq!(summary_from_rows(&empty).expect("decoded"), None);
	}

	#[test]
	fn templated_query_is_rejected_in_process() {
		let executor = InternalExecutor::from_history(Vec::new());
		let query = FilterQuery::templated("status = :s", Default::default());

		assert!(executor.matching(&query).is_err());
	}

	#[test]
	fn history_is_deduplicated_before_filtering() {
		let at = datetime!(2026-03-01 00:00:00 UTC);
		let executor = InternalExecutor::from_history(vec![
			AlertRecord::new("a", AlertStatus::Firing, at),
			AlertRecord::new("a", AlertStatus::Resolved, at),
		]);

		assert_eq!(executor.alerts().len(), 1);
		assert_eq!(executor.mode().as_str(), "internal");
	}

	#[test]
	fn predicate_follows_query_kind() {
		let expression =
			RemoteExecutor::predicate(&FilterQuery::expression("isNoisy")).expect("ok");

		assert_eq!(expression, r#"("isNoisy" IS NOT NULL AND "isNoisy" = true)"#);

		let mut parameters = serde_json::Map::new();

		parameters.insert("s".to_string(), json!("firing"));

		let templated =
			RemoteExecutor::predicate(&FilterQuery::templated("status = :s", parameters))
				.expect("ok");

		assert_eq!(templated, "status = 'firing'");
	}
}
