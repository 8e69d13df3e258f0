use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

/// A search request's filter. Exactly one shape is active per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterQuery {
	/// Boolean expression evaluated per alert, e.g. `status == "firing" && isNoisy`.
	Expression { expression: String },
	/// Remote-engine predicate with `:name` placeholders bound from `parameters`.
	Templated {
		template: String,
		#[serde(default)]
		parameters: Map<String, Value>,
	},
}
impl FilterQuery {
	pub fn expression(expression: impl Into<String>) -> Self {
		Self::Expression { expression: expression.into() }
	}

	pub fn templated(template: impl Into<String>, parameters: Map<String, Value>) -> Self {
		Self::Templated { template: template.into(), parameters }
	}

	/// Raw query text for log context.
	pub fn text(&self) -> &str {
		match self {
			Self::Expression { expression } => expression,
			Self::Templated { template, .. } => template,
		}
	}
}

/// How far back a search looks, in seconds. Zero and absent both mean "no lower bound".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeWindow(Option<u64>);
impl TimeWindow {
	pub const UNBOUNDED: Self = Self(None);

	pub fn from_secs(secs: u64) -> Self {
		Self(Some(secs))
	}

	/// The window length, or `None` when unbounded.
	pub fn seconds(&self) -> Option<u64> {
		self.0.filter(|secs| *secs > 0)
	}

	/// Exclusive lower bound: alerts received exactly at the bound fall outside the window.
	pub fn lower_bound(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		let secs = i64::try_from(self.seconds()?).unwrap_or(i64::MAX);

		Some(now.checked_sub(Duration::seconds(secs)).unwrap_or(OffsetDateTime::UNIX_EPOCH))
	}
}
impl From<Option<u64>> for TimeWindow {
	fn from(value: Option<u64>) -> Self {
		Self(value)
	}
}
