//! Quarry Request Handlers
//!
//! HTTP request handlers for the dashboard API. Each page handler resolves
//! the caller's session context, builds the page's view model and answers
//! with JSON. Downloads answer with the serialized file.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::assets;
use crate::auth::{check_credentials, AuthResponse, LoginRequest, SessionInfo};
use crate::pages::analytics::{
    build_analytics_page, build_correlations, build_outliers, build_trend, load_limit,
};
use crate::pages::overview::{build_detail, build_overview, OverviewDetail};
use crate::pages::query::{format_sql, query_templates, HistoryView, QueryResultView, TemplatesPage};
use crate::pages::tables::{build_table_list, build_table_page, preview_selection, TablePageParams};
use crate::session::{AnalyticsDataset, CurrentSession, HistoryEntry, LastResult, SessionContext};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use chrono::Local;
use quarry_analytics::export::{dated_stem, query_stem};
use quarry_analytics::{build_chart, AggregateFunction, ChartSpec, ExportFile, ExportFormat, Filter};
use quarry_common::{QuarryError, ResultSet};
use quarry_db::QueryOutcome;
use serde::{Deserialize, Serialize};
use std::time::Instant;

// =============================================================================
// Error Responses
// =============================================================================

/// A [`QuarryError`] answered as `{"error": ..., "code": ...}`.
#[derive(Debug)]
pub struct ApiError(pub QuarryError);

impl From<QuarryError> for ApiError {
    fn from(err: QuarryError) -> Self {
        Self(err)
    }
}

/// HTTP status for an error.
pub fn status_for(err: &QuarryError) -> StatusCode {
    match err {
        QuarryError::Configuration(_) | QuarryError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        QuarryError::Query(_) | QuarryError::BadRequest(_) | QuarryError::InvalidIdentifier(_) => {
            StatusCode::BAD_REQUEST
        }
        QuarryError::UnknownTable(_) | QuarryError::NotFound(_) => StatusCode::NOT_FOUND,
        QuarryError::ReadOnly => StatusCode::FORBIDDEN,
        QuarryError::Unauthorized => StatusCode::UNAUTHORIZED,
        QuarryError::Export(_) | QuarryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            status_for(&self.0),
            Json(serde_json::json!({
                "error": self.0.to_string(),
                "code": self.0.code(),
            })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn no_dataset() -> QuarryError {
    QuarryError::BadRequest("no dataset loaded, load a table first".to_string())
}

// =============================================================================
// Shell and Health
// =============================================================================

/// Embedded single-page dashboard shell.
pub async fn index() -> Html<&'static str> {
    Html(assets::INDEX_HTML)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.data.backend_name().to_string(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Not found",
            "code": "NOT_FOUND"
        })),
    )
}

// =============================================================================
// Authentication Endpoints
// =============================================================================

/// Exchange the configured username and password for a session token.
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Response {
    state.login_rate_limiter.cleanup();

    let Some(credentials) = state.credentials.as_deref() else {
        tracing::warn!("Login attempted but no credentials are configured");
        return ApiError(QuarryError::Configuration(
            "authentication is not configured".to_string(),
        ))
        .into_response();
    };

    if !check_credentials(Some(credentials), &request.username, &request.password) {
        tracing::warn!("Failed login attempt for user {}", request.username);
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuthResponse::error("Invalid username or password")),
        )
            .into_response();
    }

    let token = state.sessions.create(&request.username);
    tracing::info!("User {} logged in", request.username);
    (
        StatusCode::OK,
        Json(AuthResponse::success(
            token,
            request.username,
            state.sessions.duration().as_secs(),
        )),
    )
        .into_response()
}

/// End the current session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
) -> impl IntoResponse {
    state.sessions.remove(&session.token);
    let username = session.context.lock().username.clone();
    tracing::info!("User {} logged out", username);
    Json(serde_json::json!({ "success": true }))
}

/// Describe the current session.
pub async fn session_info(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
) -> Json<SessionInfo> {
    let ctx = session.context.lock();
    Json(SessionInfo {
        username: ctx.username.clone(),
        selected_table: ctx.selected_table.clone(),
        read_only: state.data.read_only(),
    })
}

// =============================================================================
// Overview Endpoints
// =============================================================================

pub async fn overview(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_overview(&state.data, &state.dashboard).await)
}

pub async fn overview_detail(
    State(state): State<AppState>,
    Path(detail): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let detail: OverviewDetail = detail.parse()?;
    Ok(Json(build_detail(&state.data, detail).await))
}

// =============================================================================
// Table Endpoints
// =============================================================================

/// `?format=` for downloads.
#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

impl ExportParams {
    fn format(&self) -> Result<ExportFormat, QuarryError> {
        self.format
            .as_deref()
            .map(str::parse)
            .unwrap_or(Ok(ExportFormat::Csv))
    }
}

pub async fn list_tables(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_table_list(&state.data).await)
}

/// Table page. Also makes the table the session's selected table.
pub async fn get_table(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path(name): Path<String>,
    Query(params): Query<TablePageParams>,
) -> ApiResult<impl IntoResponse> {
    let today = Local::now().date_naive();
    let page = build_table_page(&state.data, &name, &params, today).await?;
    session.context.lock().selected_table = Some(name);
    Ok(Json(page))
}

/// Download the table preview as shown: same sample size, column choice
/// and search.
pub async fn export_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<ExportParams>,
    Query(page): Query<TablePageParams>,
) -> ApiResult<Response> {
    let format = params.format()?;
    let schema = state.data.schema();
    state.data.check_table(&name, schema).await?;

    let rows = state.data.get_table_data(&name, page.limit(), schema).await;
    if let Some(error) = rows.error {
        return Err(QuarryError::Connection(error).into());
    }

    let stem = dated_stem(&name, Local::now().date_naive());
    let file = ExportFile::build(&preview_selection(&rows.data, &page), format, &stem, &name)?;
    Ok(download(file))
}

/// Serve a file as an attachment.
fn download(file: ExportFile) -> Response {
    tracing::debug!("Serving download {} ({} bytes)", file.filename, file.bytes.len());
    (
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    )
        .into_response()
}

// =============================================================================
// Custom Query Endpoints
// =============================================================================

/// Query request body.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

/// Run a custom query. Every attempt is recorded in the session history;
/// only a successful SELECT replaces the last result.
pub async fn execute_query(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResultView>> {
    let sql = request.sql.trim();
    if sql.is_empty() {
        return Err(QuarryError::BadRequest("Please enter a SQL query.".to_string()).into());
    }

    let start = Instant::now();
    let result = state.data.execute_query(sql).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let mut ctx = session.context.lock();
    match result {
        Ok(outcome) => {
            let executed_at = Local::now().naive_local();
            let view = QueryResultView::new(&outcome, duration_ms, executed_at);
            match outcome {
                QueryOutcome::Rows(rs) => {
                    ctx.record(HistoryEntry::rows(sql, rs.len()));
                    ctx.last_result = Some(LastResult {
                        result: rs,
                        executed_at,
                    });
                }
                QueryOutcome::Affected(n) => ctx.record(HistoryEntry::affected(sql, n)),
            }
            Ok(Json(view))
        }
        Err(e) => {
            tracing::warn!("Query failed for {}: {}", ctx.username, e);
            ctx.record(HistoryEntry::failed(sql, &e));
            Err(e.into())
        }
    }
}

pub async fn format_query(Json(request): Json<QueryRequest>) -> impl IntoResponse {
    Json(serde_json::json!({ "sql": format_sql(&request.sql) }))
}

/// `?table=` for templates.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateParams {
    pub table: Option<String>,
}

/// Query templates for the requested table, the selected table, or the
/// first table of the schema.
pub async fn query_templates_page(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Query(params): Query<TemplateParams>,
) -> ApiResult<Json<TemplatesPage>> {
    let tables = state.data.list_tables(state.data.schema()).await.data;
    let table = match params.table {
        Some(table) if !tables.contains(&table) => {
            return Err(QuarryError::UnknownTable(table).into())
        }
        Some(table) => Some(table),
        None => session
            .context
            .lock()
            .selected_table
            .clone()
            .filter(|t| tables.contains(t))
            .or_else(|| tables.first().cloned()),
    };

    Ok(Json(TemplatesPage {
        templates: table.as_deref().map(query_templates).unwrap_or_default(),
        tables,
        table,
        read_only: state.data.read_only(),
    }))
}

/// Download the last successful SELECT result.
pub async fn export_query_result(
    Extension(session): Extension<CurrentSession>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let format = params.format()?;
    let file = {
        let ctx = session.context.lock();
        let last = ctx
            .last_result
            .as_ref()
            .ok_or_else(|| QuarryError::NotFound("no query result to export".to_string()))?;
        ExportFile::build(&last.result, format, &query_stem(last.executed_at), "Query Results")?
    };
    Ok(download(file))
}

pub async fn query_history(Extension(session): Extension<CurrentSession>) -> Json<HistoryView> {
    Json(HistoryView::new(&session.context.lock().history))
}

/// Save a query to the history without running it.
pub async fn save_query(
    Extension(session): Extension<CurrentSession>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<impl IntoResponse> {
    let sql = request.sql.trim();
    if sql.is_empty() {
        return Err(QuarryError::BadRequest("Please enter a SQL query.".to_string()).into());
    }
    let mut ctx = session.context.lock();
    ctx.record(HistoryEntry::saved(sql));
    Ok((StatusCode::CREATED, Json(HistoryView::new(&ctx.history))))
}

pub async fn clear_history(Extension(session): Extension<CurrentSession>) -> impl IntoResponse {
    let cleared = session.context.lock().clear_history();
    Json(serde_json::json!({ "cleared": cleared }))
}

pub async fn delete_history_entry(
    Extension(session): Extension<CurrentSession>,
    Path(index): Path<usize>,
) -> ApiResult<Json<HistoryEntry>> {
    session
        .context
        .lock()
        .remove_history(index)
        .map(Json)
        .ok_or_else(|| QuarryError::NotFound(format!("history entry {}", index)).into())
}

/// Download the session history as JSON.
pub async fn export_history(Extension(session): Extension<CurrentSession>) -> ApiResult<Response> {
    let bytes = {
        let ctx = session.context.lock();
        serde_json::to_vec_pretty(&ctx.history).map_err(|e| QuarryError::Export(e.to_string()))?
    };
    let now = Local::now().naive_local();
    Ok(download(ExportFile {
        filename: format!("query_history_{}.json", now.format("%Y%m%d_%H%M%S")),
        content_type: ExportFormat::Json.content_type(),
        bytes,
    }))
}

// =============================================================================
// Analytics Endpoints
// =============================================================================

/// Dataset to load for analysis.
#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub table: String,
    pub limit: Option<usize>,
}

/// Filters to apply to the loaded dataset.
#[derive(Debug, Deserialize)]
pub struct FiltersRequest {
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// Run `f` over the session's dataset view.
fn with_view<T>(
    session: &CurrentSession,
    f: impl FnOnce(&str, &ResultSet) -> Result<T, QuarryError>,
) -> ApiResult<T> {
    let ctx = session.context.lock();
    let dataset = ctx.analytics.as_ref().ok_or_else(no_dataset)?;
    Ok(f(&dataset.table, dataset.view())?)
}

fn analytics_page(tables: Vec<String>, ctx: &SessionContext) -> impl IntoResponse {
    Json(build_analytics_page(tables, ctx.analytics.as_ref()))
}

/// Load a table sample into the session for analysis.
pub async fn load_dataset(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Json(request): Json<LoadRequest>,
) -> ApiResult<impl IntoResponse> {
    let schema = state.data.schema();
    let limit = load_limit(request.limit);
    state.data.check_table(&request.table, schema).await?;

    let rows = state.data.get_table_data(&request.table, limit, schema).await;
    if let Some(error) = rows.error {
        return Err(QuarryError::Connection(error).into());
    }
    let tables = state.data.list_tables(schema).await.data;

    tracing::info!("Loaded {} rows of {} for analysis", rows.data.len(), request.table);
    let mut ctx = session.context.lock();
    ctx.analytics = Some(AnalyticsDataset::new(request.table.clone(), limit, rows.data));
    ctx.selected_table = Some(request.table);
    Ok(analytics_page(tables, &ctx))
}

pub async fn analytics(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
) -> impl IntoResponse {
    let tables = state.data.list_tables(state.data.schema()).await.data;
    let ctx = session.context.lock();
    analytics_page(tables, &ctx)
}

/// Filter the loaded dataset in memory. An empty filter list resets it.
pub async fn apply_filters(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Json(request): Json<FiltersRequest>,
) -> ApiResult<impl IntoResponse> {
    let tables = state.data.list_tables(state.data.schema()).await.data;
    let mut ctx = session.context.lock();
    ctx.analytics
        .as_mut()
        .ok_or_else(no_dataset)?
        .apply(request.filters)?;
    Ok(analytics_page(tables, &ctx))
}

pub async fn reset_filters(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
) -> ApiResult<impl IntoResponse> {
    let tables = state.data.list_tables(state.data.schema()).await.data;
    let mut ctx = session.context.lock();
    ctx.analytics.as_mut().ok_or_else(no_dataset)?.reset();
    Ok(analytics_page(tables, &ctx))
}

/// Build a chart of the user's choosing over the dataset view.
pub async fn analytics_chart(
    Extension(session): Extension<CurrentSession>,
    Json(spec): Json<ChartSpec>,
) -> ApiResult<impl IntoResponse> {
    let figure = with_view(&session, |_, view| Ok(build_chart(view, &spec)))?;
    let message = figure
        .is_none()
        .then(|| "No chart for the selected columns.".to_string());
    Ok(Json(serde_json::json!({ "figure": figure, "message": message })))
}

pub async fn analytics_correlations(
    Extension(session): Extension<CurrentSession>,
) -> ApiResult<impl IntoResponse> {
    with_view(&session, |_, view| Ok(Json(build_correlations(view))))
}

/// `?column=` for outliers.
#[derive(Debug, Default, Deserialize)]
pub struct OutlierParams {
    pub column: Option<String>,
}

pub async fn analytics_outliers(
    Extension(session): Extension<CurrentSession>,
    Query(params): Query<OutlierParams>,
) -> ApiResult<impl IntoResponse> {
    with_view(&session, |_, view| {
        build_outliers(view, params.column.as_deref()).map(Json)
    })
}

/// `?date_column=&value_column=&aggregation=` for trends.
#[derive(Debug, Default, Deserialize)]
pub struct TrendParams {
    pub date_column: Option<String>,
    pub value_column: Option<String>,
    pub aggregation: Option<String>,
}

pub async fn analytics_trend(
    Extension(session): Extension<CurrentSession>,
    Query(params): Query<TrendParams>,
) -> ApiResult<impl IntoResponse> {
    let aggregation = match params.aggregation.as_deref() {
        Some(name) => name.parse::<AggregateFunction>()?,
        None => AggregateFunction::Mean,
    };
    with_view(&session, |_, view| {
        build_trend(
            view,
            params.date_column.as_deref(),
            params.value_column.as_deref(),
            aggregation,
        )
        .map(Json)
    })
}

/// Download the dataset view, filtered or not.
pub async fn export_analytics(
    Extension(session): Extension<CurrentSession>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let format = params.format()?;
    let today = Local::now().date_naive();
    let file = with_view(&session, |table, view| {
        let stem = dated_stem(&format!("{}_analytics", table), today);
        ExportFile::build(view, format, &stem, table)
    })?;
    Ok(download(file))
}

// =============================================================================
// Cache
// =============================================================================

/// Drop every memoized read.
pub async fn refresh_cache(State(state): State<AppState>) -> impl IntoResponse {
    let dropped = state.data.refresh();
    Json(serde_json::json!({ "dropped": dropped }))
}

// =============================================================================
// Tests
// =============================================================================
