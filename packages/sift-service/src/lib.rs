pub mod backend;
pub mod filter;
pub mod search;
pub mod translate;

mod error;

pub use backend::{FilterExecutor, InternalExecutor, RemoteExecutor, SearchMode};
pub use error::{Error, Result};
pub use filter::{AlertFilter, FilterParseError};
pub use search::{PresetFailure, PresetSearchResponse, SearchRequest};
pub use translate::TranslateError;

use std::{future::Future, pin::Pin, sync::Arc};

use sift_config::Config;
use sift_domain::{AlertRecord, TimeWindow};
use sift_storage::{
	alerts,
	db::Db,
	remote::{QueryRows, RemoteClient},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies a tenant's recent alert history for in-process evaluation.
pub trait AlertSource
where
	Self: Send + Sync,
{
	/// Most-recent-first alerts, at most `limit` of them, received within `window`.
	fn fetch_recent_alerts<'a>(
		&'a self,
		tenant_id: &'a str,
		limit: u32,
		window: TimeWindow,
	) -> BoxFuture<'a, sift_storage::Result<Vec<AlertRecord>>>;
}

/// An external engine that executes literal SQL against a tenant's alert index.
pub trait RemoteEngine
where
	Self: Send + Sync,
{
	fn run_query<'a>(
		&'a self,
		tenant_id: &'a str,
		sql: &'a str,
	) -> BoxFuture<'a, sift_storage::Result<QueryRows>>;

	fn search_records<'a>(
		&'a self,
		tenant_id: &'a str,
		sql: &'a str,
		limit: u32,
	) -> BoxFuture<'a, sift_storage::Result<Vec<AlertRecord>>>;
}

#[derive(Clone)]
pub struct Sources {
	pub alerts: Arc<dyn AlertSource>,
	pub remote: Option<Arc<dyn RemoteEngine>>,
}

pub struct SiftService {
	pub cfg: Config,
	pub sources: Sources,
}
impl SiftService {
	/// Wires the Postgres alert source and, when enabled, the remote engine client.
	pub fn new(cfg: Config, db: Db) -> Result<Self> {
		let remote = if cfg.remote.enabled {
			let client = RemoteClient::new(&cfg.remote)?;

			Some(Arc::new(client) as Arc<dyn RemoteEngine>)
		} else {
			None
		};
		let sources = Sources { alerts: Arc::new(PgAlertSource::new(db)), remote };

		Self::with_sources(cfg, sources)
	}

	pub fn with_sources(cfg: Config, sources: Sources) -> Result<Self> {
		if cfg.remote.enabled && sources.remote.is_none() {
			return Err(Error::InvalidRequest {
				message: "remote.enabled is true but no remote engine is installed.".to_string(),
			});
		}

		Ok(Self { cfg, sources })
	}

	/// The execution path for one call. Decided once, up front, and never changed mid-call.
	pub fn mode_for(&self, tenant_id: &str) -> SearchMode {
		if self.sources.remote.is_some() && self.cfg.remote.serves_tenant(tenant_id) {
			SearchMode::Remote
		} else {
			SearchMode::Internal
		}
	}
}

pub struct PgAlertSource {
	db: Db,
}
impl PgAlertSource {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl AlertSource for PgAlertSource {
	fn fetch_recent_alerts<'a>(
		&'a self,
		tenant_id: &'a str,
		limit: u32,
		window: TimeWindow,
	) -> BoxFuture<'a, sift_storage::Result<Vec<AlertRecord>>> {
		Box::pin(alerts::fetch_recent_alerts(&self.db, tenant_id, limit, window))
	}
}

impl RemoteEngine for RemoteClient {
	fn run_query<'a>(
		&'a self,
		_tenant_id: &'a str,
		sql: &'a str,
	) -> BoxFuture<'a, sift_storage::Result<QueryRows>> {
		Box::pin(RemoteClient::run_query(self, sql))
	}

	fn search_records<'a>(
		&'a self,
		_tenant_id: &'a str,
		sql: &'a str,
		limit: u32,
	) -> BoxFuture<'a, sift_storage::Result<Vec<AlertRecord>>> {
		Box::pin(RemoteClient::search_records(self, sql, limit))
	}
}
