use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Lifecycle state of an alert. Statuses this crate does not know keep their wire text
/// so filters and re-serialized output see the same value the remote engine stores.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AlertStatus {
	Firing,
	Resolved,
	Acknowledged,
	Suppressed,
	Pending,
	Other(String),
}
impl AlertStatus {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Firing => "firing",
			Self::Resolved => "resolved",
			Self::Acknowledged => "acknowledged",
			Self::Suppressed => "suppressed",
			Self::Pending => "pending",
			Self::Other(raw) => raw,
		}
	}
}
impl From<String> for AlertStatus {
	fn from(raw: String) -> Self {
		match raw.as_str() {
			"firing" => Self::Firing,
			"resolved" => Self::Resolved,
			"acknowledged" => Self::Acknowledged,
			"suppressed" => Self::Suppressed,
			"pending" => Self::Pending,
			_ => Self::Other(raw),
		}
	}
}
impl Serialize for AlertStatus {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}
impl<'de> Deserialize<'de> for AlertStatus {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(Self::from)
	}
}

/// One observation of an alerting condition, as written by the ingestion pipeline.
///
/// Field names serialize in camelCase because filter expressions address alerts by
/// their wire names (`lastReceived`, `isNoisy`, ...). Provider-specific attributes
/// land in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub fingerprint: String,
	#[serde(default)]
	pub name: String,
	pub status: AlertStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub severity: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,
	#[serde(default, deserialize_with = "one_or_many")]
	pub source: Vec<String>,
	#[serde(with = "crate::time_serde")]
	pub last_received: OffsetDateTime,
	#[serde(default)]
	pub is_noisy: bool,
	#[serde(default)]
	pub deleted: bool,
	#[serde(default)]
	pub dismissed: bool,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl AlertRecord {
	pub fn new(
		fingerprint: impl Into<String>,
		status: AlertStatus,
		last_received: OffsetDateTime,
	) -> Self {
		Self {
			id: None,
			fingerprint: fingerprint.into(),
			name: String::new(),
			status,
			severity: None,
			environment: None,
			source: Vec::new(),
			last_received,
			is_noisy: false,
			deleted: false,
			dismissed: false,
			extra: Map::new(),
		}
	}

	/// Neither deleted nor dismissed.
	pub fn is_active(&self) -> bool {
		!self.deleted && !self.dismissed
	}

	pub fn is_active_firing(&self) -> bool {
		self.status == AlertStatus::Firing && self.is_active()
	}
}

// Remote engines flatten single-element lists to a scalar.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		One(String),
		Many(Vec<String>),
		Missing(()),
	}

	Ok(match Raw::deserialize(deserializer)? {
		Raw::One(value) => vec![value],
		Raw::Many(values) => values,
		Raw::Missing(()) => Vec::new(),
	})
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use crate::alert::{AlertRecord, AlertStatus};

	#[test]
	fn deserializes_wire_payload_with_provider_fields() {
		let raw = serde_json::json!({
			"fingerprint": "fp-1",
			"name": "CPU high",
			"status": "firing",
			"lastReceived": "2024-05-01T10:00:00Z",
			"isNoisy": true,
			"labels": { "env": "prod" },
		});
		let alert: AlertRecord = serde_json::from_value(raw).expect("valid alert");

		assert_eq!(alert.status, AlertStatus::Firing);
		assert!(alert.is_noisy);
		assert!(!alert.deleted);
		assert_eq!(alert.extra["labels"]["env"], "prod");
		assert_eq!(
			alert.last_received,
			OffsetDateTime::from_unix_timestamp(1_714_557_600).expect("timestamp")
		);
	}

	#[test]
	fn scalar_source_is_accepted() {
		let raw = serde_json::json!({
			"fingerprint": "fp-1",
			"status": "firing",
			"lastReceived": 1_700_000_000,
			"source": "grafana",
		});
		let alert: AlertRecord = serde_json::from_value(raw).expect("valid alert");

		assert_eq!(alert.source, vec!["grafana".to_string()]);
	}

	#[test]
	fn unknown_status_keeps_its_wire_text() {
		let raw = serde_json::json!({
			"fingerprint": "fp-1",
			"status": "flapping",
			"lastReceived": 1_700_000_000,
		});
		let alert: AlertRecord = serde_json::from_value(raw).expect("valid alert");

		assert_eq!(alert.status, AlertStatus::Other("flapping".to_string()));
		assert_eq!(alert.status.as_str(), "flapping");

		let json = serde_json::to_value(&alert).expect("serializable alert");

		assert_eq!(json["status"], "flapping");

		let known: AlertStatus = serde_json::from_value(serde_json::json!("resolved"))
			.expect("valid status");

		assert_eq!(known, AlertStatus::Resolved);
	}

	#[test]
	fn dismissed_firing_alert_is_not_active() {
		let mut alert = AlertRecord::new(
			"fp",
			AlertStatus::Firing,
			OffsetDateTime::from_unix_timestamp(0).expect("timestamp"),
		);

		assert!(alert.is_active_firing());

		alert.dismissed = true;

		assert!(!alert.is_active_firing());
	}
}
