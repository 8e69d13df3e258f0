use serde::{Deserialize, Deserializer, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

/// Accepts RFC 3339 strings as well as unix timestamps in seconds, the two shapes
/// alert rows arrive in from the relational store and the remote engine.
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Text(String),
		Seconds(i64),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Text(raw) => OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom),
		Raw::Seconds(secs) =>
			OffsetDateTime::from_unix_timestamp(secs).map_err(serde::de::Error::custom),
	}
}
