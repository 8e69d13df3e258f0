use serde::{Deserialize, Serialize};
use sift_domain::{AlertRecord, FilterQuery, Preset, TimeWindow, classify};
use uuid::Uuid;

use crate::{AlertFilter, Error, Result, SearchMode, SiftService, translate};

const DEFAULT_SEARCH_LIMIT: u32 = 1_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub tenant_id: String,
	pub query: FilterQuery,
	/// Result cap. Clamped to `search.max_limit`.
	#[serde(default = "default_search_limit")]
	pub limit: u32,
	/// Look-back window in seconds; zero means unbounded.
	#[serde(default)]
	pub timeframe: u64,
}
impl SearchRequest {
	pub fn new(tenant_id: impl Into<String>, query: FilterQuery) -> Self {
		Self { tenant_id: tenant_id.into(), query, limit: DEFAULT_SEARCH_LIMIT, timeframe: 0 }
	}
}

/// A preset that could not be evaluated. Its outputs were zeroed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetFailure {
	pub preset_id: Uuid,
	pub preset_name: String,
	pub message: String,
}
impl From<PresetFailure> for Error {
	fn from(failure: PresetFailure) -> Self {
		Self::PresetEvaluation { preset_id: failure.preset_id, message: failure.message }
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct PresetSearchResponse {
	/// Every input preset, in input order, annotated.
	pub presets: Vec<Preset>,
	pub failures: Vec<PresetFailure>,
}

impl SiftService {
	pub async fn search(&self, req: SearchRequest) -> Result<Vec<AlertRecord>> {
		let tenant_id = req.tenant_id.trim();

		if tenant_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "tenant_id must be non-empty.".to_string(),
			});
		}
		if req.limit == 0 {
			return Err(Error::InvalidRequest {
				message: "limit must be greater than zero.".to_string(),
			});
		}

		let limit = req.limit.min(self.cfg.search.max_limit);
		let window = TimeWindow::from_secs(req.timeframe);
		let mode = self.mode_for(tenant_id);

		if let Err(err) = check_syntax(&req.query, mode) {
			tracing::warn!(
				tenant_id,
				query = %req.query.text(),
				error = %err,
				"Rejected search query."
			);

			return Err(err);
		}

		tracing::info!(
			tenant_id,
			mode = mode.as_str(),
			limit,
			timeframe = req.timeframe,
			"Searching alerts."
		);

		let result = async {
			let executor = self.executor(tenant_id, limit, window).await?;

			executor.search(&req.query, limit).await
		}
		.await;

		match result {
			Ok(alerts) => {
				tracing::info!(
					tenant_id,
					mode = mode.as_str(),
					matched = alerts.len(),
					"Search finished."
				);

				Ok(alerts)
			},
			Err(err) => {
				tracing::error!(
					tenant_id,
					query = %req.query.text(),
					error = %err,
					"Search failed."
				);

				Err(err)
			},
		}
	}

	/// Annotates every preset with its match count and noise verdict.
	///
	/// A preset that fails on its own is zeroed and reported in `failures`. Failures that
	/// affect every preset (alert source, unreachable engine) fail the call.
	pub async fn search_for_presets(
		&self,
		tenant_id: &str,
		mut presets: Vec<Preset>,
	) -> Result<PresetSearchResponse> {
		let tenant_id = tenant_id.trim();

		if tenant_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "tenant_id must be non-empty.".to_string(),
			});
		}

		let mode = self.mode_for(tenant_id);

		tracing::info!(
			tenant_id,
			mode = mode.as_str(),
			presets = presets.len(),
			"Evaluating presets."
		);

		let executor = self
			.executor(tenant_id, self.cfg.search.default_limit, TimeWindow::UNBOUNDED)
			.await
			.inspect_err(|err| {
				tracing::error!(tenant_id, error = %err, "Failed to prepare preset evaluation.");
			})?;
		let mut failures = Vec::new();

		for preset in &mut presets {
			match executor.summarize(&preset.filter_query).await {
				Ok(summary) => {
					let verdict = classify(preset, &summary);

					preset.annotate(verdict);
				},
				Err(err) if err.is_call_level() => {
					tracing::error!(
						tenant_id,
						preset_id = %preset.id,
						preset_name = %preset.name,
						query = %preset.filter_query.text(),
						error = %err,
						"Preset evaluation aborted."
					);

					return Err(err);
				},
				Err(err) => {
					tracing::warn!(
						tenant_id,
						preset_id = %preset.id,
						preset_name = %preset.name,
						query = %preset.filter_query.text(),
						error = %err,
						"Preset evaluation failed."
					);
					preset.clear_annotation();
					failures.push(PresetFailure {
						preset_id: preset.id,
						preset_name: preset.name.clone(),
						message: err.to_string(),
					});
				},
			}
		}

		tracing::info!(
			tenant_id,
			mode = mode.as_str(),
			presets = presets.len(),
			failed = failures.len(),
			"Preset evaluation finished."
		);

		Ok(PresetSearchResponse { presets, failures })
	}
}

fn default_search_limit() -> u32 {
	DEFAULT_SEARCH_LIMIT
}

/// Rejects malformed queries before any alert is fetched.
fn check_syntax(query: &FilterQuery, mode: SearchMode) -> Result<()> {
	match (query, mode) {
		(FilterQuery::Expression { expression }, _) => {
			AlertFilter::parse(expression)?;
		},
		(FilterQuery::Templated { .. }, SearchMode::Internal) => {
			return Err(Error::QuerySyntax {
				message: "templated query cannot be evaluated in-process.".to_string(),
			});
		},
		(FilterQuery::Templated { template, parameters }, SearchMode::Remote) => {
			translate::render_template(template, parameters)?;
		},
	}

	Ok(())
}
