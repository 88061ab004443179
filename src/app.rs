use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Local;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::client::{ExportFormat, SortOrder};
use crate::config::ServerConfig;
use crate::downloader;
use crate::form::check_types;
use crate::store::{ItemQuery, ListProvider, MemoryList, StoreError};
use crate::tracker::BulkOperation;

pub const APP_NAME: &str = "List Sheet";

/// Shared state of the list server
///
/// Holds the configuration and the list provider. The provider sits behind a
/// mutex so that one request mutates the list at a time; guards are never
/// held across an `.await`.
pub struct AppState {
    config: ServerConfig,
    list: Mutex<Box<dyn ListProvider>>,
}

impl AppState {
    /// Creates the shared state for a server
    ///
    /// # Arguments
    /// * `config` - Server settings (list name, paging and export limits)
    /// * `list` - The list provider the handlers run against
    ///
    /// # Returns
    /// * `AppState` - State to wrap in an `Arc` and hand to [`router`]
    pub fn new(config: ServerConfig, list: Box<dyn ListProvider>) -> Self {
        AppState {
            config,
            list: Mutex::new(list),
        }
    }

    fn list(&self) -> MutexGuard<'_, Box<dyn ListProvider>> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Deserialize)]
struct DataParams {
    page: Option<usize>,
    #[serde(rename = "pageSize")]
    page_size: Option<usize>,
    filters: Option<String>,
    #[serde(rename = "sortField")]
    sort_field: Option<String>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
}

#[derive(Deserialize)]
struct BulkBody {
    #[serde(default)]
    operations: Vec<BulkOperation>,
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(rename = "searchTerm", default)]
    search_term: String,
}

/// Opens the list the configuration describes
///
/// Loads the field schema (from `SCHEMA_FILE` or the built-in default) and,
/// when a data file is configured, restores the list from its snapshot.
///
/// # Arguments
/// * `config` - Server settings
///
/// # Returns
/// * `Result<Box<dyn ListProvider>, Box<dyn Error>>` - The opened list, or
///   the schema or snapshot error
pub fn open_list(config: &ServerConfig) -> Result<Box<dyn ListProvider>, Box<dyn std::error::Error>> {
    let fields = config.load_fields()?;
    let list = match &config.data_file {
        Some(path) => MemoryList::open(fields, path.clone())?,
        None => MemoryList::new(fields),
    };
    Ok(Box::new(list))
}

/// Builds the axum router with every list endpoint
///
/// Routes:
/// * `GET /health`, `GET /api/fields`, `GET /api/data`
/// * `POST /api/item`, `PUT /api/item/:id`, `DELETE /api/item/:id`
/// * `POST /api/bulk`, `GET /api/export/:format`
/// * `POST /api/search`, `POST /api/validate`
/// * `/static` for the front-end assets
///
/// # Arguments
/// * `state` - Shared server state
///
/// # Returns
/// * `Router` - Router with permissive CORS, ready to serve
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/health", get(health))
        .route("/api/fields", get(get_fields))
        .route("/api/data", get(get_data))
        .route("/api/item", post(create_item))
        .route("/api/item/:id", put(update_item).delete(delete_item))
        .route("/api/bulk", post(bulk_operations))
        .route("/api/export/:format", get(export_data))
        .route("/api/search", post(search_data))
        .route("/api/validate", post(validate_data))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Opens the list and serves it until the process stops
///
/// # Arguments
/// * `config` - Server settings, including the bind address
///
/// # Returns
/// * `Result<(), Box<dyn Error>>` - Error when the list cannot be opened or
///   the address cannot be bound
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let list = open_list(&config)?;
    let addr = config.addr();
    let app_state = Arc::new(AppState::new(config, list));

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");
    axum::serve(listener, router(app_state)).await?;

    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Failure of a single-item call, in the `{success, error}` shape
fn item_failure(e: StoreError) -> Response {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::Snapshot(_) => {
            error!("{e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };
    (status, Json(json!({ "success": false, "error": e.to_string() }))).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "app": APP_NAME,
        "list": state.config.list_name,
    }))
}

async fn get_fields(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let fields = state.list().fields();
    Json(json!({ "fields": fields }))
}

async fn get_data(
    Query(params): Query<DataParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let filters = match params.filters.as_deref().filter(|f| !f.is_empty()) {
        None => Map::new(),
        Some(raw) => match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(filters) => filters,
            Err(e) => {
                warn!("Rejected filters {raw:?}: {e}");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("invalid filters: {e}"),
                );
            }
        },
    };

    let query = ItemQuery {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(state.config.rows_per_page),
        filters,
        sort_field: params.sort_field.filter(|f| !f.is_empty()),
        sort_order: match params.sort_order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        },
    };

    let list = state.list();
    let page = list.query(&query);
    Json(json!({
        "items": page.items,
        "total": page.total,
        "fields": list.fields(),
        "page": page.page,
        "page_size": page.page_size,
    }))
    .into_response()
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Map<String, Value>>,
) -> Response {
    match state.list().create(&data) {
        Ok(id) => {
            info!("Created item {id}");
            Json(json!({ "success": true, "id": id })).into_response()
        }
        Err(e) => item_failure(e),
    }
}

async fn update_item(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
    Json(data): Json<Map<String, Value>>,
) -> Response {
    match state.list().update(id, &data) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => item_failure(e),
    }
}

async fn delete_item(Path(id): Path<i64>, State(state): State<Arc<AppState>>) -> Response {
    match state.list().delete(id) {
        Ok(()) => {
            info!("Deleted item {id}");
            Json(json!({ "success": true })).into_response()
        }
        Err(e) => item_failure(e),
    }
}

async fn bulk_operations(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkBody>,
) -> impl IntoResponse {
    let outcome = state.list().bulk_update(&body.operations);
    if !outcome.success {
        warn!(
            "Bulk request: {} of {} operations failed",
            outcome.errors.len(),
            body.operations.len()
        );
    }
    Json(outcome)
}

async fn export_data(Path(format): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let (fields, mut rows) = {
        let list = state.list();
        (list.fields(), list.items())
    };
    rows.truncate(state.config.max_export_rows);

    if rows.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No data to export");
    }
    let Some(format) = ExportFormat::parse(&format) else {
        return error_response(StatusCode::BAD_REQUEST, "Unsupported format");
    };

    let bytes = match format {
        ExportFormat::Csv => downloader::to_csv(&fields, &rows).into_bytes(),
        ExportFormat::Excel => match downloader::to_xlsx(&fields, &rows) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Excel export failed: {e}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        },
    };

    let filename = downloader::export_filename(&state.config.list_name, format, Local::now());
    (
        [
            (header::CONTENT_TYPE, downloader::content_type(format).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

async fn search_data(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> impl IntoResponse {
    let list = state.list();
    let items = list.search(&body.search_term);
    Json(json!({
        "total": items.len(),
        "items": items,
        "fields": list.fields(),
    }))
}

async fn validate_data(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Map<String, Value>>,
) -> impl IntoResponse {
    let fields = state.list().fields();
    let errors = check_types(&fields, &data);
    Json(json!({
        "valid": errors.is_empty(),
        "errors": errors,
    }))
}
