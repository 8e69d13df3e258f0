//! Per-preset "noisy" classification.
//!
//! Both execution paths reduce a preset's matched alerts to a [`NoiseSummary`] and then
//! call [`classify`], so the priority rules below exist in exactly one place:
//!
//! 1. `alerts_count` is the number of matched alerts.
//! 2. A noisy preset is noisy while any matched alert is firing and active.
//! 3. Otherwise a static preset is never noisy.
//! 4. Otherwise the preset is noisy while any matched alert is firing, active and itself
//!    flagged noisy.
//!
//! "Active" means neither deleted nor dismissed, on both paths.

use serde::{Deserialize, Serialize};

use crate::{alert::AlertRecord, preset::Preset};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseSummary {
	pub alerts_count: u64,
	pub has_active_firing: bool,
	pub has_active_noisy_firing: bool,
}
impl NoiseSummary {
	pub fn from_alerts(alerts: &[AlertRecord]) -> Self {
		let mut summary = Self { alerts_count: alerts.len() as u64, ..Self::default() };

		for alert in alerts.iter().filter(|alert| alert.is_active_firing()) {
			summary.has_active_firing = true;

			if alert.is_noisy {
				summary.has_active_noisy_firing = true;

				break;
			}
		}

		summary
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseVerdict {
	pub alerts_count: u64,
	pub should_noise_now: bool,
}

pub fn classify(preset: &Preset, summary: &NoiseSummary) -> NoiseVerdict {
	let should_noise_now = if preset.is_noisy {
		summary.has_active_firing
	} else if preset.is_static {
		false
	} else {
		summary.has_active_noisy_firing
	};

	NoiseVerdict { alerts_count: summary.alerts_count, should_noise_now }
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use crate::{
		alert::{AlertRecord, AlertStatus},
		noise::{NoiseSummary, classify},
		preset::Preset,
		query::FilterQuery,
	};

	fn alert(status: AlertStatus, is_noisy: bool) -> AlertRecord {
		let mut alert = AlertRecord::new(
			"fp",
			status,
			OffsetDateTime::from_unix_timestamp(0).expect("timestamp"),
		);

		alert.is_noisy = is_noisy;

		alert
	}

	fn preset(is_noisy: bool, is_static: bool) -> Preset {
		let mut preset = Preset::new("p", FilterQuery::expression("true"));

		preset.is_noisy = is_noisy;
		preset.is_static = is_static;

		preset
	}

	#[test]
	fn noisy_preset_overrides_alert_flags() {
		let summary = NoiseSummary::from_alerts(&[alert(AlertStatus::Firing, false)]);
		let verdict = classify(&preset(true, false), &summary);

		assert!(verdict.should_noise_now);
		assert_eq!(verdict.alerts_count, 1);
	}

	#[test]
	fn noisy_preset_is_quiet_without_firing_alerts() {
		let summary = NoiseSummary::from_alerts(&[alert(AlertStatus::Resolved, true)]);

		assert!(!classify(&preset(true, false), &summary).should_noise_now);
	}

	#[test]
	fn static_preset_ignores_alert_flags() {
		let summary = NoiseSummary::from_alerts(&[
			alert(AlertStatus::Firing, true),
			alert(AlertStatus::Firing, true),
		]);
		let verdict = classify(&preset(false, true), &summary);

		assert!(!verdict.should_noise_now);
		assert_eq!(verdict.alerts_count, 2);
	}

	#[test]
	fn noisy_preset_wins_over_static() {
		let summary = NoiseSummary::from_alerts(&[alert(AlertStatus::Firing, false)]);

		assert!(classify(&preset(true, true), &summary).should_noise_now);
	}

	#[test]
	fn plain_preset_follows_noisy_firing_alerts() {
		let quiet = NoiseSummary::from_alerts(&[alert(AlertStatus::Firing, false)]);
		let loud = NoiseSummary::from_alerts(&[
			alert(AlertStatus::Firing, false),
			alert(AlertStatus::Firing, true),
		]);

		assert!(!classify(&preset(false, false), &quiet).should_noise_now);
		assert!(classify(&preset(false, false), &loud).should_noise_now);
	}

	#[test]
	fn inactive_alerts_never_make_noise() {
		let mut deleted = alert(AlertStatus::Firing, true);
		let mut dismissed = alert(AlertStatus::Firing, true);

		deleted.deleted = true;
		dismissed.dismissed = true;

		let summary = NoiseSummary::from_alerts(&[deleted, dismissed]);

		assert_eq!(summary.alerts_count, 2);
		assert!(!classify(&preset(false, false), &summary).should_noise_now);
		assert!(!classify(&preset(true, false), &summary).should_noise_now);
	}

	#[test]
	fn empty_match_set_is_quiet() {
		let verdict = classify(&preset(true, false), &NoiseSummary::from_alerts(&[]));

		assert_eq!(verdict.alerts_count, 0);
		assert!(!verdict.should_noise_now);
	}
}
