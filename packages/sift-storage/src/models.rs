use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use sift_domain::AlertRecord;

use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
pub struct AlertRow {
	pub id: Uuid,
	pub fingerprint: String,
	pub timestamp: OffsetDateTime,
	pub event: Value,
	pub enrichments: Option<Value>,
}
impl AlertRow {
	/// Builds the current view of one alert: the ingested event with the tenant's
	/// enrichments for that fingerprint laid on top.
	pub fn into_record(self) -> Result<AlertRecord> {
		let Value::Object(mut event) = self.event else {
			return Err(Error::Decode {
				what: "alert event",
				message: "event must be a JSON object.".to_string(),
			});
		};

		if let Some(Value::Object(enrichments)) = self.enrichments {
			merge_enrichments(&mut event, enrichments);
		}

		event.insert("id".to_string(), Value::String(self.id.to_string()));
		event.insert("fingerprint".to_string(), Value::String(self.fingerprint));

		if !event.contains_key("lastReceived") {
			let formatted = self
				.timestamp
				.format(&Rfc3339)
				.map_err(|err| Error::Decode { what: "alert timestamp", message: err.to_string() })?;

			event.insert("lastReceived".to_string(), Value::String(formatted));
		}

		serde_json::from_value(Value::Object(event))
			.map_err(|err| Error::Decode { what: "alert event", message: err.to_string() })
	}
}

fn merge_enrichments(event: &mut Map<String, Value>, enrichments: Map<String, Value>) {
	for (key, value) in enrichments {
		event.insert(key, value);
	}
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;
	use uuid::Uuid;

	use sift_domain::AlertStatus;

	use crate::models::AlertRow;

	fn row(event: serde_json::Value, enrichments: Option<serde_json::Value>) -> AlertRow {
		AlertRow {
			id: Uuid::new_v4(),
			fingerprint: "fp-1".to_string(),
			timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
			event,
			enrichments,
		}
	}

	#[test]
	fn enrichments_override_event_fields() {
		let record = row(
			serde_json::json!({ "status": "firing", "name": "Disk full", "dismissed": false }),
			Some(serde_json::json!({ "dismissed": true, "owner": "sre" })),
		)
		.into_record()
		.expect("valid row");

		assert_eq!(record.status, AlertStatus::Firing);
		assert!(record.dismissed);
		assert_eq!(record.extra["owner"], "sre");
		assert_eq!(record.fingerprint, "fp-1");
	}

	#[test]
	fn missing_last_received_falls_back_to_row_timestamp() {
		let record =
			row(serde_json::json!({ "status": "resolved" }), None).into_record().expect("valid row");

		assert_eq!(record.last_received.unix_timestamp(), 1_700_000_000);
	}

	#[test]
	fn non_object_event_is_rejected() {
		assert!(row(serde_json::json!(["not", "an", "object"]), None).into_record().is_err());
	}
}
