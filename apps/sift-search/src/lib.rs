use std::{fs, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use sift_domain::{FilterQuery, Preset};
use sift_service::{SearchRequest, SiftService};
use sift_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = sift_cli::VERSION,
	rename_all = "kebab",
	styles = sift_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Search one tenant's alerts and print the matches as JSON.
	Search(SearchArgs),
	/// Annotate saved presets with match counts and noise verdicts.
	Presets(PresetsArgs),
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
	#[arg(long)]
	pub tenant: String,
	/// Filter expression, e.g. `status == "firing" && isNoisy`.
	#[arg(long, conflicts_with = "template", required_unless_present = "template")]
	pub expr: Option<String>,
	/// Remote-engine predicate with `:name` placeholders.
	#[arg(long)]
	pub template: Option<String>,
	/// JSON object binding the template's placeholders.
	#[arg(long, value_name = "JSON", requires = "template")]
	pub params: Option<String>,
	/// Defaults to `search.default_limit`.
	#[arg(long)]
	pub limit: Option<u32>,
	/// Look-back window in seconds; 0 searches all history.
	#[arg(long, default_value_t = 0)]
	pub timeframe: u64,
}
impl SearchArgs {
	fn into_request(self, default_limit: u32) -> color_eyre::Result<SearchRequest> {
		let query = match (self.expr, self.template) {
			(Some(expression), _) => FilterQuery::expression(expression),
			(None, Some(template)) => {
				let parameters = match self.params.as_deref() {
					Some(raw) => parse_params(raw)?,
					None => Map::new(),
				};

				FilterQuery::templated(template, parameters)
			},
			(None, None) => return Err(eyre::eyre!("Either --expr or --template is required.")),
		};
		let mut req = SearchRequest::new(self.tenant, query);

		req.limit = self.limit.unwrap_or(default_limit);
		req.timeframe = self.timeframe;

		Ok(req)
	}
}

#[derive(Debug, clap::Args)]
pub struct PresetsArgs {
	#[arg(long)]
	pub tenant: String,
	/// JSON array of presets.
	#[arg(long, value_name = "FILE")]
	pub file: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = sift_config::load(&args.config)?;

	init_tracing(&config)?;

	let budget = Duration::from_millis(config.search.timeout_ms);
	let default_limit = config.search.default_limit;
	let db = Db::connect(&config.storage.postgres).await?;
	let service = SiftService::new(config, db)?;
	let output = match args.command {
		Command::Search(search) => {
			let req = search.into_request(default_limit)?;
			let alerts = tokio::time::timeout(budget, service.search(req))
				.await
				.map_err(|_| eyre::eyre!("Search timed out after {budget:?}."))??;

			serde_json::to_string_pretty(&alerts)?
		},
		Command::Presets(presets) => {
			let raw = fs::read_to_string(&presets.file)?;
			let parsed: Vec<Preset> = serde_json::from_str(&raw)?;
			let response =
				tokio::time::timeout(budget, service.search_for_presets(&presets.tenant, parsed))
					.await
					.map_err(|_| eyre::eyre!("Preset evaluation timed out after {budget:?}."))??;

			if !response.failures.is_empty() {
				tracing::warn!(
					failed = response.failures.len(),
					"Some presets could not be evaluated."
				);
			}

			serde_json::to_string_pretty(&response)?
		},
	};

	println!("{output}");

	Ok(())
}

fn parse_params(raw: &str) -> color_eyre::Result<Map<String, Value>> {
	match serde_json::from_str::<Value>(raw)? {
		Value::Object(map) => Ok(map),
		_ => Err(eyre::eyre!("--params must be a JSON object.")),
	}
}

fn init_tracing(config: &sift_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	// Stdout carries the JSON result.
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}
