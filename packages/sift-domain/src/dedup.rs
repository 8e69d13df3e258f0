use std::collections::HashSet;

use crate::alert::AlertRecord;

#[derive(Debug, Default)]
pub struct Deduplicated {
	pub alerts: Vec<AlertRecord>,
	/// Rows discarded because an earlier row already carried their fingerprint.
	pub dropped: usize,
}

/// Collapses an alert history into one record per fingerprint.
///
/// The first occurrence wins and input order is kept. Callers hand in most-recent-first
/// history, so the survivor is the latest observation; the function itself never sorts.
pub fn dedup_by_fingerprint(alerts: Vec<AlertRecord>) -> Deduplicated {
	let mut seen: HashSet<String> = HashSet::with_capacity(alerts.len());
	let mut kept = Vec::with_capacity(alerts.len());
	let mut dropped = 0;

	for alert in alerts {
		if seen.contains(alert.fingerprint.as_str()) {
			tracing::debug!(
				fingerprint = %alert.fingerprint,
				alert_id = ?alert.id,
				"Skipping duplicate fingerprint."
			);

			dropped += 1;

			continue;
		}

		seen.insert(alert.fingerprint.clone());
		kept.push(alert);
	}

	Deduplicated { alerts: kept, dropped }
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use crate::{
		alert::{AlertRecord, AlertStatus},
		dedup::dedup_by_fingerprint,
	};

	fn alert(fingerprint: &str, ts: i64) -> AlertRecord {
		AlertRecord::new(
			fingerprint,
			AlertStatus::Firing,
			OffsetDateTime::from_unix_timestamp(ts).expect("timestamp"),
		)
	}

	#[test]
	fn keeps_first_occurrence_in_order() {
		let out = dedup_by_fingerprint(vec![
			alert("b", 10),
			alert("a", 9),
			alert("b", 8),
			alert("c", 7),
			alert("a", 6),
		]);
		let fingerprints: Vec<_> = out.alerts.iter().map(|a| a.fingerprint.as_str()).collect();

		assert_eq!(fingerprints, ["b", "a", "c"]);
		assert_eq!(out.alerts[0].last_received.unix_timestamp(), 10);
		assert_eq!(out.alerts[1].last_received.unix_timestamp(), 9);
		assert_eq!(out.dropped, 2);
	}

	#[test]
	fn empty_input_yields_empty_output() {
		let out = dedup_by_fingerprint(Vec::new());

		assert!(out.alerts.is_empty());
		assert_eq!(out.dropped, 0);
	}
}
