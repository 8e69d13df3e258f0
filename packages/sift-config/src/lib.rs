mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Postgres, Remote, Search, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(path, &raw)
}

pub fn parse(path: &Path, raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_limit < cfg.search.default_limit {
		return Err(Error::Validation {
			message: "search.max_limit must be greater than or equal to search.default_limit."
				.to_string(),
		});
	}
	if cfg.search.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "search.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.remote.enabled {
		let url = cfg.remote.url.trim();

		if url.is_empty() {
			return Err(Error::Validation {
				message: "remote.url must be non-empty when remote.enabled is true.".to_string(),
			});
		}
		if !(url.starts_with("http://") || url.starts_with("https://")) {
			return Err(Error::Validation {
				message: "remote.url must start with http:// or https://.".to_string(),
			});
		}
		if cfg.remote.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "remote.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	let prefix = cfg.remote.index_prefix.as_str();

	if prefix.trim().is_empty() {
		return Err(Error::Validation {
			message: "remote.index_prefix must be non-empty.".to_string(),
		});
	}
	if prefix.contains('"') {
		return Err(Error::Validation {
			message: "remote.index_prefix must not contain double quotes.".to_string(),
		});
	}

	for tenant in &cfg.remote.tenants {
		if tenant.trim().is_empty() {
			return Err(Error::Validation {
				message: "remote.tenants entries must be non-empty.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.remote.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.remote.api_key = None;
	}

	cfg.remote.url = cfg.remote.url.trim().trim_end_matches('/').to_string();
}
