use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::{AlertRecord, TimeWindow};

use crate::{Error, Result, db::Db, models::AlertRow};

/// Most-recent-first alert history for a tenant, enrichments applied.
///
/// Rows whose event cannot be decoded are skipped with a warning so one malformed
/// payload does not hide the rest of the tenant's history.
pub async fn fetch_recent_alerts(
	db: &Db,
	tenant_id: &str,
	limit: u32,
	window: TimeWindow,
) -> Result<Vec<AlertRecord>> {
	fetch_alerts_after(db, tenant_id, limit, window.lower_bound(OffsetDateTime::now_utc())).await
}

/// Alerts received strictly after `after`, matching the remote engine's window predicate.
pub async fn fetch_alerts_after(
	db: &Db,
	tenant_id: &str,
	limit: u32,
	after: Option<OffsetDateTime>,
) -> Result<Vec<AlertRecord>> {
	let rows: Vec<AlertRow> = sqlx::query_as(
		"\
SELECT a.id, a.fingerprint, a.timestamp, a.event, e.enrichments
FROM alerts a
LEFT JOIN alert_enrichments e
	ON e.tenant_id = a.tenant_id
	AND e.alert_fingerprint = a.fingerprint
WHERE a.tenant_id = $1
	AND ($2::timestamptz IS NULL OR a.timestamp > $2)
ORDER BY a.timestamp DESC
LIMIT $3",
	)
	.bind(tenant_id)
	.bind(after)
	.bind(i64::from(limit))
	.fetch_all(&db.pool)
	.await?;
	let mut alerts = Vec::with_capacity(rows.len());

	for row in rows {
		let row_id = row.id;

		match row.into_record() {
			Ok(alert) => alerts.push(alert),
			Err(err) => {
				tracing::warn!(tenant_id, %row_id, error = %err, "Skipping undecodable alert row.");
			},
		}
	}

	Ok(alerts)
}

pub async fn insert_alert(db: &Db, tenant_id: &str, alert: &AlertRecord) -> Result<Uuid> {
	let id = match alert.id.as_deref() {
		Some(raw) => Uuid::parse_str(raw)
			.map_err(|err| Error::InvalidArgument(format!("alert id {raw:?}: {err}")))?,
		None => Uuid::new_v4(),
	};
	let event = serde_json::to_value(alert)
		.map_err(|err| Error::Decode { what: "alert event", message: err.to_string() })?;

	sqlx::query(
		"\
INSERT INTO alerts (id, tenant_id, fingerprint, timestamp, event)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(id)
	.bind(tenant_id)
	.bind(alert.fingerprint.as_str())
	.bind(alert.last_received)
	.bind(event)
	.execute(&db.pool)
	.await?;

	Ok(id)
}

/// Merges `enrichments` into the stored enrichments for `fingerprint`; later keys win.
pub async fn upsert_enrichments(
	db: &Db,
	tenant_id: &str,
	fingerprint: &str,
	enrichments: &Map<String, Value>,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO alert_enrichments (tenant_id, alert_fingerprint, enrichments, updated_at)
VALUES ($1, $2, $3, now())
ON CONFLICT (tenant_id, alert_fingerprint) DO UPDATE
SET enrichments = alert_enrichments.enrichments || EXCLUDED.enrichments,
	updated_at = now()",
	)
	.bind(tenant_id)
	.bind(fingerprint)
	.bind(Value::Object(enrichments.clone()))
	.execute(&db.pool)
	.await?;

	Ok(())
}
