//! dashboard-server — HTTP API behind the animal shelter dashboard.
//!
//! Exposes the record gateway (create/find/update/delete) and the read-only
//! dashboard views (table page, outcome chart, map marker) as JSON.
//! - Storage: SQLite file (default, `sqlite` feature) or in-memory, chosen by
//!   the scheme of `STORE_URI`.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string) for the frontend.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p dashboard-server
//!
//! # throwaway in-memory collection seeded from an export
//! STORE_URI=memory://localhost/AAC SEED_FILE=./aac_shelter_outcomes.json \
//!   cargo run -p dashboard-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_store::InMemoryStore;
use domain::connection::{Backend, StoreUri};
use domain::dashboard::{self, DEFAULT_PAGE_SIZE};
use domain::rescue::RescueFilter;
use domain::service::RecordGateway;
use domain::{
    CoreError, Criteria, Cursor, DeleteOutcome, InsertOutcome, Record, RecordStore,
    UpdateOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Largest page the table endpoint serves.
const MAX_PAGE_SIZE: usize = 500;

// Local store abstraction supporting memory or sqlite (feature-gated).
enum StoreKind {
    Memory(InMemoryStore),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteStore),
    #[cfg(test)]
    Shared(Arc<dyn RecordStore>),
}

struct AnyStore {
    kind: StoreKind,
}

impl AnyStore {
    fn memory() -> Self {
        Self {
            kind: StoreKind::Memory(InMemoryStore::new()),
        }
    }

    fn connect(uri: &StoreUri) -> Result<Self, CoreError> {
        match uri.backend {
            Backend::Memory => Ok(Self::memory()),
            #[cfg(feature = "sqlite")]
            Backend::Sqlite => Ok(Self {
                kind: StoreKind::Sqlite(sqlite_adapter::SqliteStore::connect(uri)?),
            }),
            #[cfg(not(feature = "sqlite"))]
            Backend::Sqlite => Err(CoreError::InvalidArgument(
                "built without the `sqlite` feature".into(),
            )),
        }
    }
}

impl RecordStore for AnyStore {
    fn insert_one(&self, record: Record) -> Result<InsertOutcome, CoreError> {
        match &self.kind {
            StoreKind::Memory(s) => s.insert_one(record),
            #[cfg(feature = "sqlite")]
            StoreKind::Sqlite(s) => s.insert_one(record),
            #[cfg(test)]
            StoreKind::Shared(s) => s.insert_one(record),
        }
    }

    fn find(&self, criteria: &Criteria) -> Result<Cursor, CoreError> {
        match &self.kind {
            StoreKind::Memory(s) => s.find(criteria),
            #[cfg(feature = "sqlite")]
            StoreKind::Sqlite(s) => s.find(criteria),
            #[cfg(test)]
            StoreKind::Shared(s) => s.find(criteria),
        }
    }

    fn update_one(
        &self,
        lookup: &Criteria,
        new_values: &Record,
    ) -> Result<UpdateOutcome, CoreError> {
        match &self.kind {
            StoreKind::Memory(s) => s.update_one(lookup, new_values),
            #[cfg(feature = "sqlite")]
            StoreKind::Sqlite(s) => s.update_one(lookup, new_values),
            #[cfg(test)]
            StoreKind::Shared(s) => s.update_one(lookup, new_values),
        }
    }

    fn delete_one(&self, criteria: &Criteria) -> Result<DeleteOutcome, CoreError> {
        match &self.kind {
            StoreKind::Memory(s) => s.delete_one(criteria),
            #[cfg(feature = "sqlite")]
            StoreKind::Sqlite(s) => s.delete_one(criteria),
            #[cfg(test)]
            StoreKind::Shared(s) => s.delete_one(criteria),
        }
    }
}

type Gateway = RecordGateway<AnyStore>;

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    // One connection for the life of the process
    let store = match AnyStore::connect(&cfg.store_uri) {
        Ok(s) => s,
        Err(e) => {
            error!(uri = %cfg.store_uri, err = %e, "failed to open store");
            std::process::exit(1);
        }
    };
    info!(uri = %cfg.store_uri, "store connected");
    let gateway = RecordGateway::new(store);

    if let Some(path) = &cfg.seed_file {
        match seed_from_file(&gateway, path) {
            Ok(0) => info!(path = %path.display(), "collection not empty, seed skipped"),
            Ok(n) => info!(path = %path.display(), inserted = n, "collection seeded"),
            Err(e) => {
                error!(path = %path.display(), err = %e, "seeding failed");
                std::process::exit(1);
            }
        }
    }

    let state = AppState {
        gateway: Arc::new(gateway),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "dashboard-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/records", post(create_record))
        .route("/api/records/find", post(find_records))
        .route("/api/records/update", post(update_record))
        .route("/api/records/delete", post(delete_record))
        .route("/api/dashboard/table", get(dashboard_table))
        .route("/api/dashboard/chart", get(dashboard_chart))
        .route("/api/dashboard/map", get(dashboard_map))
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

/// Load the `SEED_FILE` export into an empty collection; returns how many
/// records were inserted (0 when the collection already had data).
fn seed_from_file(gateway: &Gateway, path: &Path) -> Result<usize, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| format!("read: {e}"))?;
    domain::seed::seed_if_empty(gateway, &raw).map_err(|e| e.to_string())
}

/// Run a gateway call off the async runtime; every store call blocks.
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, CoreError>
where
    F: FnOnce(&Gateway) -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    let gateway = Arc::clone(&state.gateway);
    tokio::task::spawn_blocking(move || f(&gateway))
        .await
        .map_err(|e| CoreError::Unclassified(format!("blocking task failed: {e}")))?
}

fn invalid_argument(message: &str) -> Response {
    warn!(reason = %message, "invalid argument");
    (
        StatusCode::BAD_REQUEST,
        Json(http_common::json_error_with_message("invalid_argument", message)),
    )
        .into_response()
}

// Bodies or query strings the extractors could not read keep the
// extractor's status but use the JSON error shape.
fn rejected_input(status: StatusCode, message: &str) -> Response {
    warn!(%status, reason = %message, "unreadable request");
    (
        status,
        Json(http_common::json_error_with_message("bad_request", message)),
    )
        .into_response()
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    body.map(|Json(inner)| inner)
        .map_err(|rej| rejected_input(rej.status(), &rej.body_text()))
}

fn error_response(err: CoreError) -> Response {
    match err {
        CoreError::InvalidArgument(msg) => invalid_argument(&msg),
        CoreError::WriteRejected(rej) => {
            let mut body = http_common::json_error_with_message("write_rejected", &rej.message);
            body["error"]["kind"] = Value::from(rej.kind.as_str());
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
        CoreError::Unclassified(msg) => {
            error!(err = %msg, "store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(http_common::json_err("store_error")),
            )
                .into_response()
        }
    }
}

// A missing member and an explicit `null` both mean "argument absent".
fn optional_record(value: Option<Value>) -> Result<Option<Record>, CoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Record::try_from(v).map(Some),
    }
}

fn optional_criteria(value: Option<Value>) -> Result<Option<Criteria>, CoreError> {
    optional_record(value).map(|r| r.map(Criteria::from))
}

#[derive(Deserialize)]
struct CreateRecordReq {
    #[serde(default)]
    record: Option<Value>,
}

#[derive(Deserialize)]
struct CriteriaReq {
    #[serde(default)]
    criteria: Option<Value>,
}

#[derive(Deserialize)]
struct UpdateRecordReq {
    #[serde(default)]
    lookup: Option<Value>,
    #[serde(default)]
    new_values: Option<Value>,
}

#[derive(Serialize)]
struct FindOut {
    records: Vec<Record>,
    count: usize,
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn create_record(
    State(state): State<AppState>,
    body: Result<Json<CreateRecordReq>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let record = match optional_record(body.record) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    match run_blocking(&state, move |gw| gw.create(record)).await {
        Ok(out) => {
            info!(id = %out.inserted_id, "record created");
            (StatusCode::CREATED, Json(out)).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn find_records(
    State(state): State<AppState>,
    body: Result<Json<CriteriaReq>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let criteria = match optional_criteria(body.criteria) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let res = run_blocking(&state, move |gw| {
        gw.find(criteria.as_ref())?.collect_records()
    })
    .await;
    match res {
        Ok(records) => {
            let count = records.len();
            Json(FindOut { records, count }).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn update_record(
    State(state): State<AppState>,
    body: Result<Json<UpdateRecordReq>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let lookup = match optional_criteria(body.lookup) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    let new_values = match optional_record(body.new_values) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    let res = run_blocking(&state, move |gw| {
        gw.update(lookup.as_ref(), new_values.as_ref())
    })
    .await;
    match res {
        Ok(out) => Json(out).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_record(
    State(state): State<AppState>,
    body: Result<Json<CriteriaReq>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let criteria = match optional_criteria(body.criteria) {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };
    match run_blocking(&state, move |gw| gw.delete(criteria.as_ref())).await {
        Ok(out) => Json(out).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct ViewQuery {
    filter: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
    selected: Option<usize>,
}

/// Filter and paging parameters shared by the dashboard views.
struct ViewParams {
    filter: RescueFilter,
    page: usize,
    page_size: usize,
    selected: Option<usize>,
}

fn view_params(query: Result<Query<ViewQuery>, QueryRejection>) -> Result<ViewParams, Response> {
    let Query(q) = query.map_err(|rej| rejected_input(rej.status(), &rej.body_text()))?;
    let page_size = match q.page_size {
        Some(n) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
        Some(_) => {
            return Err(invalid_argument(&format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )))
        }
        None => DEFAULT_PAGE_SIZE,
    };
    Ok(ViewParams {
        filter: q
            .filter
            .as_deref()
            .map(RescueFilter::parse)
            .unwrap_or(RescueFilter::Reset),
        page: q.page.unwrap_or(0),
        page_size,
        selected: q.selected,
    })
}

async fn filtered_rows(state: &AppState, filter: RescueFilter) -> Result<Vec<Record>, CoreError> {
    let records = run_blocking(state, move |gw| filter.query(gw)).await?;
    Ok(dashboard::table_rows(records))
}

#[derive(Serialize)]
struct TableOut {
    filter: RescueFilter,
    label: &'static str,
    #[serde(flatten)]
    page: dashboard::Page,
}

#[derive(Serialize)]
struct ChartOut {
    filter: RescueFilter,
    total: usize,
    slices: Vec<dashboard::OutcomeSlice>,
}

#[derive(Serialize)]
struct MapOut {
    filter: RescueFilter,
    marker: Option<dashboard::MapMarker>,
}

async fn dashboard_table(
    State(state): State<AppState>,
    query: Result<Query<ViewQuery>, QueryRejection>,
) -> Response {
    let params = match view_params(query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match filtered_rows(&state, params.filter).await {
        Ok(rows) => Json(TableOut {
            filter: params.filter,
            label: params.filter.label(),
            page: dashboard::paginate(&rows, params.page, params.page_size),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn dashboard_chart(
    State(state): State<AppState>,
    query: Result<Query<ViewQuery>, QueryRejection>,
) -> Response {
    let params = match view_params(query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match filtered_rows(&state, params.filter).await {
        Ok(rows) => Json(ChartOut {
            filter: params.filter,
            total: rows.len(),
            slices: dashboard::outcome_breakdown(&rows),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn dashboard_map(
    State(state): State<AppState>,
    query: Result<Query<ViewQuery>, QueryRejection>,
) -> Response {
    let params = match view_params(query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match filtered_rows(&state, params.filter).await {
        Ok(rows) => {
            let page = dashboard::paginate(&rows, params.page, params.page_size);
            Json(MapOut {
                filter: params.filter,
                marker: dashboard::map_marker(&page.rows, params.selected),
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use domain::WriteRejection;
    use serde_json::json;
    use tower::util::ServiceExt;

    fn app_with(gateway: Gateway) -> Router {
        routes().with_state(AppState {
            gateway: Arc::new(gateway),
        })
    }

    fn app() -> Router {
        app_with(RecordGateway::new(AnyStore::memory()))
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        send(router, req.body(body).unwrap()).await
    }

    fn shelter_dog(name: &str, breed: &str, sex: &str, weeks: f64, outcome: &str) -> Value {
        json!({
            "": 1,
            "animal_type": "Dog",
            "name": name,
            "breed": breed,
            "sex_upon_outcome": sex,
            "age_upon_outcome_in_weeks": weeks,
            "outcome_type": outcome,
            "location_lat": 30.75,
            "location_long": -97.48
        })
    }

    #[tokio::test]
    async fn healthz_ok() {
        let (status, body) = call(&app(), "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn crud_flow_over_http() {
        let router = app();

        let (status, body) = call(
            &router,
            "POST",
            "/api/records",
            Some(json!({"record": {
                "animal_type": "Dog",
                "breed": "Newfoundland",
                "sex_upon_outcome": "Intact Female",
                "age_upon_outcome_in_weeks": 30
            }})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["inserted_id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &router,
            "POST",
            "/api/records/find",
            Some(json!({"criteria": {"animal_type": "Dog"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["count"].as_u64().unwrap() >= 1);
        assert_eq!(body["records"][0]["_id"], json!(id));

        let (status, body) = call(
            &router,
            "POST",
            "/api/records/update",
            Some(json!({
                "lookup": {"_id": id},
                "new_values": {"breed": "Labrador Retriever Mix"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"matched_count": 1, "modified_count": 1}));

        let (_, body) = call(
            &router,
            "POST",
            "/api/records/find",
            Some(json!({"criteria": {"breed": "Labrador Retriever Mix"}})),
        )
        .await;
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["records"][0]["age_upon_outcome_in_weeks"], json!(30));

        let by_id = json!({"criteria": {"_id": id}});
        let (status, body) =
            call(&router, "POST", "/api/records/delete", Some(by_id.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"deleted_count": 1}));

        let (_, body) = call(&router, "POST", "/api/records/find", Some(by_id.clone())).await;
        assert_eq!(body["count"], json!(0));

        let (_, body) = call(&router, "POST", "/api/records/delete", Some(by_id)).await;
        assert_eq!(body, json!({"deleted_count": 0}));
    }

    #[tokio::test]
    async fn absent_arguments_are_rejected() {
        let router = app();

        let (status, body) = call(&router, "POST", "/api/records", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("invalid_argument"));

        let empty = json!({"record": {}});
        let (status, _) = call(&router, "POST", "/api/records", Some(empty)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let null = json!({"criteria": null});
        let (status, _) = call(&router, "POST", "/api/records/find", Some(null)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let lookup_only = json!({"lookup": {"a": 1}});
        let (status, _) = call(&router, "POST", "/api/records/update", Some(lookup_only)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, "POST", "/api/records/delete", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let not_a_mapping = json!({"criteria": ["not", "a", "mapping"]});
        let (status, _) = call(&router, "POST", "/api/records/find", Some(not_a_mapping)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreadable_bodies_get_json_errors() {
        let router = app();

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/records")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&router, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("bad_request"));
        assert!(body["error"]["message"].is_string());

        let untyped = Request::builder()
            .method("POST")
            .uri("/api/records/find")
            .body(Body::from(r#"{"criteria": {}}"#))
            .unwrap();
        let (status, body) = send(&router, untyped).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"]["code"], json!("bad_request"));
    }

    #[tokio::test]
    async fn empty_criteria_returns_everything() {
        let router = app();
        for name in ["a", "b", "c"] {
            let record = json!({"record": {"name": name}});
            call(&router, "POST", "/api/records", Some(record)).await;
        }
        let all = json!({"criteria": {}});
        let (status, body) = call(&router, "POST", "/api/records/find", Some(all)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(3));
    }

    #[tokio::test]
    async fn id_change_is_a_rejected_write() {
        let router = app();
        let record = json!({"record": {"name": "Bear"}});
        let (_, body) = call(&router, "POST", "/api/records", Some(record)).await;
        let id = body["inserted_id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &router,
            "POST",
            "/api/records/update",
            Some(json!({"lookup": {"_id": id}, "new_values": {"_id": "forged"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], json!("write_rejected"));
        assert_eq!(body["error"]["kind"], json!("validation"));
    }

    /// Store that fails every call with the same error.
    struct FailingStore(fn() -> CoreError);

    impl RecordStore for FailingStore {
        fn insert_one(&self, _record: Record) -> Result<InsertOutcome, CoreError> {
            Err((self.0)())
        }

        fn find(&self, _criteria: &Criteria) -> Result<Cursor, CoreError> {
            Err((self.0)())
        }

        fn update_one(
            &self,
            _lookup: &Criteria,
            _new_values: &Record,
        ) -> Result<UpdateOutcome, CoreError> {
            Err((self.0)())
        }

        fn delete_one(&self, _criteria: &Criteria) -> Result<DeleteOutcome, CoreError> {
            Err((self.0)())
        }
    }

    fn failing_app(err: fn() -> CoreError) -> Router {
        let store = AnyStore {
            kind: StoreKind::Shared(Arc::new(FailingStore(err))),
        };
        app_with(RecordGateway::new(store))
    }

    fn write_requests() -> [(&'static str, Value); 3] {
        [
            ("/api/records", json!({"record": {"name": "Bear"}})),
            (
                "/api/records/update",
                json!({"lookup": {"name": "Bear"}, "new_values": {"name": "Max"}}),
            ),
            ("/api/records/delete", json!({"criteria": {"name": "Bear"}})),
        ]
    }

    #[tokio::test]
    async fn store_failures_map_to_500() {
        let router = failing_app(|| CoreError::Unclassified("disk I/O error".into()));

        for (uri, body) in write_requests() {
            let (status, body) = call(&router, "POST", uri, Some(body)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body["error"]["code"], json!("store_error"));
        }

        let all = json!({"criteria": {}});
        let (status, body) = call(&router, "POST", "/api/records/find", Some(all)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], json!("store_error"));
        // Store detail stays in the log
        assert!(!body.to_string().contains("disk I/O"));

        let (status, _) = call(&router, "GET", "/api/dashboard/table", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn write_concern_maps_to_409() {
        let router = failing_app(|| {
            CoreError::WriteRejected(WriteRejection::write_concern("database is locked"))
        });

        for (uri, body) in write_requests() {
            let (status, body) = call(&router, "POST", uri, Some(body)).await;
            assert_eq!(status, StatusCode::CONFLICT, "{uri}");
            assert_eq!(body["error"]["code"], json!("write_rejected"));
            assert_eq!(body["error"]["kind"], json!("write_concern"));
            assert_eq!(body["error"]["message"], json!("database is locked"));
        }
    }

    async fn seeded_router() -> Router {
        let router = app();
        let dogs = [
            shelter_dog("Nessie", "Newfoundland", "Intact Female", 30.0, "Adoption"),
            shelter_dog("Chessie", "Chesapeake Bay Retriever", "Intact Female", 60.0, "Transfer"),
            shelter_dog("Old", "Newfoundland", "Intact Female", 400.0, "Adoption"),
            shelter_dog("Husky", "Siberian Husky", "Intact Male", 52.0, "Adoption"),
            shelter_dog("Bloody", "Bloodhound", "Intact Male", 250.0, "Return to Owner"),
        ];
        for dog in dogs {
            let record = json!({"record": dog});
            let (status, _) = call(&router, "POST", "/api/records", Some(record)).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        router
    }

    #[tokio::test]
    async fn table_filters_and_hides_fields() {
        let router = seeded_router().await;

        let (status, body) =
            call(&router, "GET", "/api/dashboard/table?filter=water", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filter"], json!("water"));
        assert_eq!(body["label"], json!("Water Rescue"));
        assert_eq!(body["total"], json!(2));
        let first = body["rows"][0].as_object().unwrap();
        assert!(!first.contains_key("_id"));
        assert!(!first.contains_key(""));

        let (_, body) = call(
            &router,
            "GET",
            "/api/dashboard/table?filter=Remove+all+filters&page=1&page_size=2",
            None,
        )
        .await;
        assert_eq!(body["filter"], json!("reset"));
        assert_eq!(body["total"], json!(5));
        assert_eq!(body["page_count"], json!(3));
        assert_eq!(body["rows"].as_array().unwrap().len(), 2);
        assert_eq!(body["rows"][0]["name"], json!("Old"));

        let (_, body) = call(
            &router,
            "GET",
            "/api/dashboard/table?filter=Filter%20by%20Mountain%20Rescue",
            None,
        )
        .await;
        assert_eq!(body["filter"], json!("mountain"));
        assert_eq!(body["total"], json!(1));
    }

    #[tokio::test]
    async fn bad_paging_is_rejected() {
        let router = seeded_router().await;

        for uri in [
            "/api/dashboard/table?page_size=501",
            "/api/dashboard/table?page_size=0",
            "/api/dashboard/map?page_size=1000",
        ] {
            let (status, body) = call(&router, "GET", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"]["code"], json!("invalid_argument"));
        }

        for uri in [
            "/api/dashboard/table?page=abc",
            "/api/dashboard/table?page_size=-3",
            "/api/dashboard/map?selected=first",
        ] {
            let (status, body) = call(&router, "GET", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"]["code"], json!("bad_request"));
        }

        let (status, body) =
            call(&router, "GET", "/api/dashboard/table?page_size=500", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page_size"], json!(500));
        assert_eq!(body["rows"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn chart_counts_outcomes() {
        let router = seeded_router().await;
        let (status, body) = call(&router, "GET", "/api/dashboard/chart", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], json!(5));
        assert_eq!(body["slices"][0], json!({"outcome_type": "Adoption", "count": 3}));

        let (_, body) =
            call(&router, "GET", "/api/dashboard/chart?filter=mountain", None).await;
        assert_eq!(body["slices"], json!([{"outcome_type": "Adoption", "count": 1}]));
    }

    #[tokio::test]
    async fn map_marker_follows_selection() {
        let router = seeded_router().await;
        let uri = "/api/dashboard/map?filter=water&selected=1";
        let (_, body) = call(&router, "GET", uri, None).await;
        assert_eq!(body["marker"]["name"], json!("Chessie"));
        assert_eq!(body["marker"]["breed"], json!("Chesapeake Bay Retriever"));
        assert_eq!(body["marker"]["latitude"], json!(30.75));

        let (_, body) = call(&router, "GET", "/api/dashboard/map?filter=disaster", None).await;
        assert_eq!(body["marker"]["name"], json!("Bloody"));

        let empty = app();
        let (status, body) = call(&empty, "GET", "/api/dashboard/map", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["marker"], Value::Null);
    }

    #[test]
    fn seed_file_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        let export = json!([
            {"_id": {"$oid": "5fd3"}, "animal_type": "Dog", "name": "A"},
            {"animal_type": "Cat", "name": "B"}
        ]);
        std::fs::write(&path, export.to_string()).unwrap();

        let gateway = RecordGateway::new(AnyStore::memory());
        assert_eq!(seed_from_file(&gateway, &path).unwrap(), 2);
        assert_eq!(seed_from_file(&gateway, &path).unwrap(), 0);
        assert!(seed_from_file(&gateway, &dir.path().join("missing.json")).is_err());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_backed_gateway_serves_requests() {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!("sqlite:///{}/AAC.db", dir.path().display());
        let uri = StoreUri::parse(&raw).unwrap();
        let router = app_with(RecordGateway::new(AnyStore::connect(&uri).unwrap()));

        let dog = shelter_dog("Nessie", "Newfoundland", "Intact Female", 30.0, "Adoption");
        let (status, _) =
            call(&router, "POST", "/api/records", Some(json!({"record": dog}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) =
            call(&router, "GET", "/api/dashboard/table?filter=water", None).await;
        assert_eq!(body["total"], json!(1));
    }
}
