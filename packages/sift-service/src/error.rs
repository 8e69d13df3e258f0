use uuid::Uuid;

use crate::{filter::FilterParseError, translate::TranslateError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Query syntax error: {message}")]
	QuerySyntax { message: String },
	#[error("Search engine unavailable: {message}")]
	EngineUnavailable { message: String },
	#[error("Preset {preset_id} failed: {message}")]
	PresetEvaluation { preset_id: Uuid, message: String },
	#[error("Alert source error: {message}")]
	AlertSource { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
}
impl Error {
	/// Errors that abort a whole call rather than a single preset.
	pub fn is_call_level(&self) -> bool {
		matches!(
			self,
			Self::EngineUnavailable { .. } | Self::AlertSource { .. } | Self::InvalidRequest { .. }
		)
	}

	pub(crate) fn alert_source(err: sift_storage::Error) -> Self {
		Self::AlertSource { message: err.to_string() }
	}

	pub(crate) fn remote(err: sift_storage::Error) -> Self {
		if err.is_unavailable() {
			Self::EngineUnavailable { message: err.to_string() }
		} else {
			Self::QuerySyntax { message: err.to_string() }
		}
	}
}

impl From<FilterParseError> for Error {
	fn from(err: FilterParseError) -> Self {
		Self::QuerySyntax { message: err.to_string() }
	}
}

impl From<TranslateError> for Error {
	fn from(err: TranslateError) -> Self {
		Self::QuerySyntax { message: err.message }
	}
}

impl From<sift_storage::Error> for Error {
	fn from(err: sift_storage::Error) -> Self {
		match err {
			sift_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			sift_storage::Error::Sqlx(_) => Self::alert_source(err),
			err => Self::remote(err),
		}
	}
}
