//! Service behaviour against a stand-in for the remote engine's `_sql` endpoint.

use std::{
	future::IntoFuture,
	sync::{Arc, Mutex},
};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing};
use serde_json::{Value, json};
use tokio::{
	net::TcpListener,
	sync::{oneshot, oneshot::Sender},
};

use sift_config::{Config, Postgres, Remote, Search, Service, Storage};
use sift_domain::{AlertRecord, FilterQuery, Preset, TimeWindow};
use sift_service::{
	AlertSource, BoxFuture, Error, RemoteEngine, SearchRequest, SiftService, Sources,
};
use sift_storage::remote::RemoteClient;

#[derive(Clone)]
struct SqlStub {
	status: StatusCode,
	body: Value,
	queries: Arc<Mutex<Vec<String>>>,
}

struct EmptyAlertSource;
impl AlertSource for EmptyAlertSource {
	fn fetch_recent_alerts<'a>(
		&'a self,
		_tenant_id: &'a str,
		_limit: u32,
		_window: TimeWindow,
	) -> BoxFuture<'a, sift_storage::Result<Vec<AlertRecord>>> {
		Box::pin(async move { Ok(Vec::new()) })
	}
}

async fn sql_handler(State(stub): State<SqlStub>, Json(payload): Json<Value>) -> impl IntoResponse {
	let query = payload.get("query").and_then(Value::as_str).unwrap_or_default().to_string();

	stub.queries.lock().expect("Queries lock poisoned.").push(query);

	(stub.status, Json(stub.body.clone())).into_response()
}

async fn start_sql_server(stub: SqlStub) -> (String, Sender<()>) {
	let app = Router::new().route("/_sql", routing::post(sql_handler)).with_state(stub);
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind SQL server.");
	let addr = listener.local_addr().expect("Failed to read SQL server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), tx)
}

fn remote_service(url: String) -> SiftService {
	let remote = Remote { enabled: true, url, timeout_ms: 2_000, ..Remote::default() };
	let client = RemoteClient::new(&remote).expect("Client builds.");
	let cfg = Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres { dsn: "postgres://unused".to_string(), pool_max_conns: 1 },
		},
		search: Search::default(),
		remote,
	};
	let sources = Sources {
		alerts: Arc::new(EmptyAlertSource),
		remote: Some(Arc::new(client) as Arc<dyn RemoteEngine>),
	};

	SiftService::with_sources(cfg, sources).expect("Service builds.")
}

fn stub(status: StatusCode, body: Value) -> SqlStub {
	SqlStub { status, body, queries: Arc::new(Mutex::new(Vec::new())) }
}

#[tokio::test]
async fn remote_rows_become_alerts() {
	let stub = stub(
		StatusCode::OK,
		json!({
			"columns": [
				{ "name": "fingerprint", "type": "keyword" },
				{ "name": "status", "type": "keyword" },
				{ "name": "lastReceived", "type": "datetime" },
				{ "name": "labels.team", "type": "keyword" }
			],
			"rows": [
				["fp-1", "firing", "2026-03-01T12:00:00.000Z", "storage"],
				["fp-2", "resolved", "2026-03-01T11:00:00.000Z", null]
			]
		}),
	);
	let queries = Arc::clone(&stub.queries);
	let (url, shutdown) = start_sql_server(stub).await;
	let service = remote_service(url);
	let alerts = service
		.search(SearchRequest::new("acme", FilterQuery::expression("has(labels.team) || true")))
		.await
		.expect("Search succeeds.");

	assert_eq!(alerts.len(), 2);
	assert_eq!(alerts[0].extra.get("labels"), Some(&json!({ "team": "storage" })));
	assert!(alerts[1].extra.get("labels").is_none());

	let queries = queries.lock().expect("Queries lock poisoned.").clone();

	assert_eq!(queries.len(), 1);
	assert!(queries[0].contains(r#"FROM "keep-alerts-acme""#), "{}", queries[0]);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn rejected_query_is_a_syntax_error_for_search() {
	let (url, shutdown) =
		start_sql_server(stub(StatusCode::BAD_REQUEST, json!({ "error": "parsing_exception" })))
			.await;
	let service = remote_service(url);
	let mut parameters = serde_json::Map::new();

	parameters.insert("s".to_string(), json!("firing"));

	let query = FilterQuery::templated("status = :s", parameters);
	let err = service.search(SearchRequest::new("acme", query)).await.expect_err("Rejected.");

	assert!(matches!(err, Error::QuerySyntax { .. }), "{err}");

	let _ = shutdown.send(());
}

#[tokio::test]
async fn rejected_query_is_contained_in_a_batch() {
	let (url, shutdown) =
		start_sql_server(stub(StatusCode::BAD_REQUEST, json!({ "error": "parsing_exception" })))
			.await;
	let service = remote_service(url);
	let presets = vec![
		Preset::new("first", FilterQuery::expression("true")),
		Preset::new("second", FilterQuery::expression("isNoisy")),
	];
	let response = service.search_for_presets("acme", presets).await.expect("Batch completes.");

	assert_eq!(response.presets.len(), 2);
	assert_eq!(response.failures.len(), 2);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn server_error_fails_the_whole_batch() {
	let (url, shutdown) =
		start_sql_server(stub(StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "red" }))).await;
	let service = remote_service(url);
	let presets = vec![Preset::new("p", FilterQuery::expression("true"))];
	let err = service.search_for_presets("acme", presets).await.expect_err("Unavailable.");

	assert!(matches!(err, Error::EngineUnavailable { .. }), "{err}");

	let _ = shutdown.send(());
}

#[tokio::test]
async fn unreachable_engine_is_not_downgraded() {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind.");
	let addr = listener.local_addr().expect("Failed to read address.");

	drop(listener);

	let service = remote_service(format!("http://{addr}"));
	let err = service
		.search(SearchRequest::new("acme", FilterQuery::expression("true")))
		.await
		.expect_err("Unreachable.");

	assert!(matches!(err, Error::EngineUnavailable { .. }), "{err}");
}
