//! Client for the remote engine's SQL endpoint (Elasticsearch `_sql`, JSON format).

use std::time::Duration as StdDuration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sift_domain::AlertRecord;

use crate::{Error, Result};

const SQL_PATH: &str = "/_sql?format=json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryColumn {
	pub name: String,
	#[serde(default, rename = "type")]
	pub column_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
	#[serde(default)]
	pub columns: Vec<QueryColumn>,
	#[serde(default)]
	pub rows: Vec<Vec<Value>>,
}
impl QueryRows {
	pub fn first_row(&self) -> Option<&[Value]> {
		self.rows.first().map(Vec::as_slice)
	}

	/// Decodes each row into an alert. Dotted column names (`labels.env`) become nested
	/// objects and null cells are dropped, so they read as absent attributes.
	pub fn into_records(self) -> Vec<Result<AlertRecord>> {
		let names: Vec<String> = self.columns.into_iter().map(|column| column.name).collect();

		self.rows
			.into_iter()
			.map(|row| {
				let mut object = Map::new();

				for (name, cell) in names.iter().zip(row) {
					if !cell.is_null() {
						insert_dotted(&mut object, name, cell);
					}
				}

				serde_json::from_value(Value::Object(object)).map_err(|err| Error::Decode {
					what: "remote alert row",
					message: err.to_string(),
				})
			})
			.collect()
	}
}

#[derive(Serialize)]
struct SqlRequest<'a> {
	query: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	fetch_size: Option<u32>,
}

/// Thread-safe handle to the remote engine. Cloning shares the underlying connection pool.
#[derive(Clone, Debug)]
pub struct RemoteClient {
	http: Client,
	base_url: String,
}
impl RemoteClient {
	pub fn new(cfg: &sift_config::Remote) -> Result<Self> {
		let mut headers = HeaderMap::new();

		if let Some(api_key) = cfg.api_key.as_deref() {
			let value = HeaderValue::from_str(&format!("ApiKey {api_key}")).map_err(|err| {
				Error::InvalidArgument(format!("remote.api_key is not a valid header value: {err}"))
			})?;

			headers.insert(AUTHORIZATION, value);
		}

		let http = Client::builder()
			.timeout(StdDuration::from_millis(cfg.timeout_ms))
			.default_headers(headers)
			.build()
			.map_err(|err| Error::InvalidArgument(format!("Failed to build HTTP client: {err}")))?;

		Ok(Self { http, base_url: cfg.url.trim_end_matches('/').to_string() })
	}

	pub async fn run_query(&self, sql: &str) -> Result<QueryRows> {
		self.post_sql(sql, None).await
	}

	pub async fn search_records(&self, sql: &str, limit: u32) -> Result<Vec<AlertRecord>> {
		let rows = self.post_sql(sql, Some(limit)).await?;
		let mut records = Vec::with_capacity(rows.rows.len());

		for record in rows.into_records() {
			match record {
				Ok(record) => records.push(record),
				Err(err) => tracing::warn!(error = %err, "Skipping undecodable remote row."),
			}
		}

		records.truncate(limit as usize);

		Ok(records)
	}

	async fn post_sql(&self, sql: &str, fetch_size: Option<u32>) -> Result<QueryRows> {
		let url = format!("{}{SQL_PATH}", self.base_url);
		let res = self
			.http
			.post(url)
			.json(&SqlRequest { query: sql, fetch_size })
			.send()
			.await
			.map_err(Error::Transport)?;
		let status = res.status();

		if !status.is_success() {
			let body = res.text().await.unwrap_or_default();

			return Err(Error::Status { status: status.as_u16(), body });
		}

		res.json::<QueryRows>()
			.await
			.map_err(|err| Error::Decode { what: "remote response", message: err.to_string() })
	}
}

fn insert_dotted(object: &mut Map<String, Value>, name: &str, value: Value) {
	let Some((head, rest)) = name.split_once('.') else {
		object.insert(name.to_string(), value);

		return;
	};
	let slot = object.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));

	match slot {
		Value::Object(child) => insert_dotted(child, rest, value),
		_ => {
			object.insert(name.to_string(), value);
		},
	}
}
