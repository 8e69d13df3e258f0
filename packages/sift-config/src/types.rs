use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub remote: Remote,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Result cap used when a request does not carry its own limit.
	pub default_limit: u32,
	/// Upper bound applied to every requested limit.
	pub max_limit: u32,
	/// Caller-side budget for one `search` or `search_for_presets` call.
	pub timeout_ms: u64,
}
impl Default for Search {
	fn default() -> Self {
		Self { default_limit: 1_000, max_limit: 10_000, timeout_ms: 30_000 }
	}
}

/// External search cluster used instead of in-process evaluation for large tenants.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Remote {
	pub enabled: bool,
	pub url: String,
	/// Alerts for tenant `t` live in the index `<index_prefix>-<t>`.
	pub index_prefix: String,
	pub timeout_ms: u64,
	pub api_key: Option<String>,
	/// Optional. When non-empty, only these tenants are routed to the remote engine.
	pub tenants: Vec<String>,
}
impl Remote {
	pub fn serves_tenant(&self, tenant_id: &str) -> bool {
		self.enabled && (self.tenants.is_empty() || self.tenants.iter().any(|t| t == tenant_id))
	}

	pub fn index_name(&self, tenant_id: &str) -> String {
		format!("{}-{tenant_id}", self.index_prefix)
	}
}
impl Default for Remote {
	fn default() -> Self {
		Self {
			enabled: false,
			url: "http://localhost:9200".to_string(),
			index_prefix: "keep-alerts".to_string(),
			timeout_ms: 10_000,
			api_key: None,
			tenants: Vec::new(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}
