pub mod alert;
pub mod dedup;
pub mod noise;
pub mod preset;
pub mod query;
pub mod time_serde;

pub use alert::{AlertRecord, AlertStatus};
pub use dedup::{Deduplicated, dedup_by_fingerprint};
pub use noise::{NoiseSummary, NoiseVerdict, classify};
pub use preset::Preset;
pub use query::{FilterQuery, TimeWindow};
