use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{noise::NoiseVerdict, query::FilterQuery};

/// A saved, named filter plus its noise configuration.
///
/// `alerts_count` and `should_noise_now` are outputs written by the search engine; they
/// are never read as inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
	pub id: Uuid,
	pub name: String,
	pub filter_query: FilterQuery,
	#[serde(default)]
	pub is_noisy: bool,
	#[serde(default)]
	pub is_static: bool,
	#[serde(default)]
	pub alerts_count: u64,
	#[serde(default)]
	pub should_noise_now: bool,
}
impl Preset {
	pub fn new(name: impl Into<String>, filter_query: FilterQuery) -> Self {
		Self {
			id: Uuid::new_v4(),
			name: name.into(),
			filter_query,
			is_noisy: false,
			is_static: false,
			alerts_count: 0,
			should_noise_now: false,
		}
	}

	pub fn annotate(&mut self, verdict: NoiseVerdict) {
		self.alerts_count = verdict.alerts_count;
		self.should_noise_now = verdict.should_noise_now;
	}

	/// Zeroes the outputs, used when the preset could not be evaluated.
	pub fn clear_annotation(&mut self) {
		self.annotate(NoiseVerdict::default());
	}
}
