//! End-to-end integration tests for Quarry Server
//!
//! Drives the full router over an in-memory database: login, pages,
//! custom SQL with history, analytics and downloads.

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;

use quarry_common::config::QuarryConfig;
use quarry_common::{Column, QuarryError, ResultSet, Value as Cell};
use quarry_db::{MemoryBackend, MemoryTable};
use quarry_server::{create_router, AppState, ServerConfig};

const USERNAME: &str = "analyst";
const PASSWORD: &str = "s3cret-pass";

// =============================================================================
// Helpers
// =============================================================================

/// Send a request and return the status, headers and raw body.
async fn send(
    app: &mut axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.call(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

/// Helper to make a GET request and return JSON response.
async fn get_json(app: &mut axum::Router, uri: &str, token: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, "GET", uri, Some(token), None).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

/// Helper to make a POST request with JSON body and return JSON response.
async fn post_json(app: &mut axum::Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let (status, _, body) = send(app, "POST", uri, token, Some(body)).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn delete_json(app: &mut axum::Router, uri: &str, token: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, "DELETE", uri, Some(token), None).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn login(app: &mut axum::Router) -> String {
    let (status, body) = post_json(
        app,
        "/api/v1/auth/login",
        None,
        json!({"username": USERNAME, "password": PASSWORD}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

fn users() -> MemoryTable {
    MemoryTable::new(ResultSet::new(
        vec![
            Column::new("id", "int4"),
            Column::new("plan", "text"),
            Column::new("spend", "numeric"),
            Column::new("signed_up", "date"),
        ],
        (1..=25)
            .map(|i: i64| {
                vec![
                    Cell::Int(i),
                    Cell::Text(["free", "pro", "team"][(i % 3) as usize].into()),
                    Cell::Float(if i == 25 { 9_000.0 } else { 10.0 * i as f64 }),
                    Cell::Date(NaiveDate::from_ymd_opt(2024, 1, 1 + (i % 5) as u32).unwrap()),
                ]
            })
            .collect(),
    ))
    .with_primary_key("id")
    .with_size("48 kB")
}

fn orders() -> MemoryTable {
    MemoryTable::new(ResultSet::new(
        vec![Column::new("id", "int4"), Column::new("user_id", "int4")],
        (1..=7).map(|i: i64| vec![Cell::Int(i), Cell::Int(i % 3 + 1)]).collect(),
    ))
    .with_primary_key("id")
}

fn empty_feedback() -> MemoryTable {
    MemoryTable::new(ResultSet::new(
        vec![
            Column::new("id", "int4"),
            Column::new("created_at", "timestamp"),
            Column::new("feedback_type", "text"),
        ],
        Vec::new(),
    ))
}

fn backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::default());
    backend.insert_table("users", users());
    backend.insert_table("orders", orders());
    backend.insert_table("chat_feedback", empty_feedback());
    backend
}

fn config(read_only: bool) -> QuarryConfig {
    let mut config = QuarryConfig::default();
    config.auth.username = Some(USERNAME.to_string());
    config.auth.password = Some(PASSWORD.to_string());
    config.dashboard.read_only = read_only;
    config
}

fn app_with(backend: Arc<MemoryBackend>, config: &QuarryConfig) -> axum::Router {
    create_router(AppState::new(ServerConfig::default(), config, backend))
}

fn app(backend: Arc<MemoryBackend>) -> axum::Router {
    app_with(backend, &config(true))
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_login_logout_flow() {
    let mut app = app(backend());

    let (status, body) = post_json(
        &mut app,
        "/api/v1/auth/login",
        None,
        json!({"username": USERNAME, "password": "wrong"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["token"].is_null());

    let token = login(&mut app).await;
    let (status, session) = get_json(&mut app, "/api/v1/auth/session", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["username"], USERNAME);
    assert_eq!(session["read_only"], true);

    let (status, _) = post_json(&mut app, "/api/v1/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_json(&mut app, "/api/v1/overview", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_login_without_configured_credentials() {
    let mut app = app_with(backend(), &QuarryConfig::default());

    let (status, body) = post_json(
        &mut app,
        "/api/v1/auth/login",
        None,
        json!({"username": "", "password": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_login_rate_limited() {
    let mut config = config(true);
    config.dashboard.login_rate_limit = 2;
    let mut app = app_with(backend(), &config);

    let attempt = json!({"username": USERNAME, "password": "nope"});
    for _ in 0..2 {
        let (status, _) = post_json(&mut app, "/api/v1/auth/login", None, attempt.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = post_json(&mut app, "/api/v1/auth/login", None, attempt).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_login_rate_limit_is_per_client_address() {
    let mut config = config(true);
    config.dashboard.login_rate_limit = 2;
    let state = AppState::new(ServerConfig::default(), &config, backend());
    let from = |ip: [u8; 4]| {
        create_router(state.clone()).layer(MockConnectInfo(SocketAddr::from((ip, 51000))))
    };
    let mut noisy = from([203, 0, 113, 7]);
    let mut quiet = from([198, 51, 100, 2]);

    let attempt = json!({"username": USERNAME, "password": "nope"});
    for _ in 0..3 {
        post_json(&mut noisy, "/api/v1/auth/login", None, attempt.clone()).await;
    }
    let (status, _) = post_json(&mut noisy, "/api/v1/auth/login", None, attempt).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let token = login(&mut quiet).await;
    assert!(!token.is_empty());
}

// =============================================================================
// Overview
// =============================================================================

#[tokio::test]
async fn test_overview_with_empty_feedback_table() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, page) = get_json(&mut app, "/api/v1/overview", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["tiles"][0]["value"], "3");
    assert_eq!(page["tiles"][2]["value"], "32");

    let highlight = &page["highlight"];
    assert_eq!(highlight["summary"], "Total Feedback: 0");
    assert!(highlight["trend"].is_null());
    assert!(highlight["distribution"].is_null());
    assert!(highlight["error"].is_null());
    assert_eq!(page["errors"], json!([]));
}

#[tokio::test]
async fn test_sessions_share_table_counts() {
    let backend = backend();
    let mut app = app(backend.clone());
    let first = login(&mut app).await;
    let second = login(&mut app).await;

    let (_, a) = get_json(&mut app, "/api/v1/overview", &first).await;
    let (_, b) = get_json(&mut app, "/api/v1/overview", &second).await;
    assert_eq!(a["tiles"][2], b["tiles"][2]);
    assert_eq!(backend.count_calls(), 3);
}

#[tokio::test]
async fn test_overview_drill_down() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, detail) = get_json(&mut app, "/api/v1/overview/records", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["rows"][0]["table"], "users");

    let (status, body) = get_json(&mut app, "/api/v1/overview/bogus", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

// =============================================================================
// Table Browser
// =============================================================================

#[tokio::test]
async fn test_table_page_selects_table() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, page) = get_json(&mut app, "/api/v1/tables/users?limit=10", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["preview"]["data"]["rows"].as_array().unwrap().len(), 10);
    assert_eq!(page["table"]["row_count"], 25);
    assert_eq!(page["downloads"].as_array().unwrap().len(), 2);

    let (_, session) = get_json(&mut app, "/api/v1/auth/session", &token).await;
    assert_eq!(session["selected_table"], "users");

    let (status, body) = get_json(&mut app, "/api/v1/tables/missing", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNKNOWN_TABLE");
}

#[tokio::test]
async fn test_table_page_tabs() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, page) = get_json(
        &mut app,
        "/api/v1/tables/users?search=PRO&columns=id,plan&column=plan&date_column=signed_up&value_column=spend",
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{page}");

    let preview = &page["preview"];
    assert_eq!(preview["data"]["row_count"], 9);
    assert_eq!(preview["data"]["columns"].as_array().unwrap().len(), 2);
    assert_eq!(preview["message"], "Showing 9 rows × 2 columns");
    assert_eq!(preview["available_columns"].as_array().unwrap().len(), 4);

    let charts = &page["visualizations"];
    assert_eq!(charts["histogram"]["layout"]["title"]["text"], "Distribution of id");
    assert_eq!(charts["correlation"]["layout"]["title"]["text"], "Correlation Matrix");
    assert_eq!(charts["top_five"]["layout"]["title"]["text"], "Top 5 plan Distribution");
    assert_eq!(charts["time_series"]["layout"]["title"]["text"], "Average spend over Time");

    let stats = &page["statistics"];
    assert_eq!(stats["describe"].as_array().unwrap().len(), 2);
    assert_eq!(stats["quality"]["complete_records"], 25);
    assert_eq!(stats["quality"]["duplicate_records"], 0);
    assert_eq!(stats["quality"]["completeness"], 100.0);
    assert_eq!(stats["memory"].as_array().unwrap().len(), 4);

    let profile = &page["column_analysis"];
    assert_eq!(profile["column"], "plan");
    assert_eq!(profile["unique"], 3);
    assert_eq!(profile["most_common"]["value"], "pro");
    assert_eq!(profile["most_common"]["count"], 9);

    let (status, body) = get_json(&mut app, "/api/v1/tables/users?value_column=plan", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_table_export_follows_preview_selection() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, _, body) = send(
        &mut app,
        "GET",
        "/api/v1/tables/users/export?format=csv&columns=id,plan&search=pro",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(lines[0], "id,plan");
    assert!(lines[1..].iter().all(|l| l.ends_with(",pro")));
}

#[tokio::test]
async fn test_table_csv_download() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, headers, body) = send(
        &mut app,
        "GET",
        "/api/v1/tables/orders/export?format=csv",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let disposition = headers["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"orders_"));
    assert!(disposition.ends_with(".csv\""));

    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "id,user_id");
}

// =============================================================================
// Custom SQL
// =============================================================================

#[tokio::test]
async fn test_failing_query_is_recorded() {
    let backend = backend();
    backend.on_query("SELECT 1/0", Err(QuarryError::Query("division by zero".into())));
    let mut app = app(backend);
    let token = login(&mut app).await;

    let (status, body) = post_json(&mut app, "/api/v1/query", Some(&token), json!({"sql": "SELECT 1/0"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "QUERY_ERROR");
    assert_eq!(body["error"], "division by zero");

    let (_, history) = get_json(&mut app, "/api/v1/query/history", &token).await;
    assert_eq!(history["count"], 1);
    assert_eq!(history["entries"][0]["status"], "error");
    assert_eq!(history["entries"][0]["error"], "division by zero");

    let (status, _, _) = send(&mut app, "GET", "/api/v1/query/export?format=csv", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_select_result_and_export() {
    let backend = backend();
    backend.on_query(
        "SELECT plan, count(*) FROM users GROUP BY plan",
        Ok(ResultSet::new(
            vec![Column::new("plan", "text"), Column::new("count", "int8")],
            vec![
                vec![Cell::Text("free".into()), Cell::Int(8)],
                vec![Cell::Text("pro".into()), Cell::Int(9)],
            ],
        )),
    );
    let mut app = app(backend);
    let token = login(&mut app).await;

    let (status, view) = post_json(
        &mut app,
        "/api/v1/query",
        Some(&token),
        json!({"sql": "SELECT plan, count(*) FROM users GROUP BY plan;"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["row_count"], 2);
    assert_eq!(view["message"], "Query executed successfully! Found 2 rows.");
    assert_eq!(view["downloads"].as_array().unwrap().len(), 3);

    let (status, headers, body) =
        send(&mut app, "GET", "/api/v1/query/export?format=xlsx", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-disposition"].to_str().unwrap().contains("query_"));
    assert_eq!(&body[..2], b"PK");
}

#[tokio::test]
async fn test_read_only_rejects_statements() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, body) =
        post_json(&mut app, "/api/v1/query", Some(&token), json!({"sql": "DELETE FROM users"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "READ_ONLY");

    let (_, history) = get_json(&mut app, "/api/v1/query/history", &token).await;
    assert_eq!(history["entries"][0]["status"], "error");
}

#[tokio::test]
async fn test_statement_reports_affected_rows() {
    let backend = backend();
    backend.on_statement("UPDATE users SET plan = 'pro'", Ok(25));
    let mut app = app_with(backend, &config(false));
    let token = login(&mut app).await;

    let (status, view) = post_json(
        &mut app,
        "/api/v1/query",
        Some(&token),
        json!({"sql": "UPDATE users SET plan = 'pro'"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["affected_rows"], 25);
    assert_eq!(view["message"], "Statement executed, 25 rows affected.");
}

#[tokio::test]
async fn test_history_operations() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, _) = post_json(&mut app, "/api/v1/query/history", Some(&token), json!({"sql": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for sql in ["SELECT 1", "SELECT 2", "SELECT 3"] {
        let (status, _) = post_json(&mut app, "/api/v1/query/history", Some(&token), json!({"sql": sql})).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, removed) = delete_json(&mut app, "/api/v1/query/history/1", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["query"], "SELECT 2");
    assert_eq!(removed["status"], "saved");

    let (status, _) = delete_json(&mut app, "/api/v1/query/history/9", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, headers, body) =
        send(&mut app, "GET", "/api/v1/query/history/export", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-disposition"].to_str().unwrap().contains("query_history_"));
    let exported: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(exported.as_array().unwrap().len(), 2);

    let (_, cleared) = delete_json(&mut app, "/api/v1/query/history", &token).await;
    assert_eq!(cleared["cleared"], 2);
}

#[tokio::test]
async fn test_templates_and_format() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, page) = get_json(&mut app, "/api/v1/query/templates?table=orders", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["templates"].as_array().unwrap().len(), 7);
    assert_eq!(page["templates"][0]["sql"], "SELECT * FROM orders LIMIT 100;");

    let (status, _) = get_json(&mut app, "/api/v1/query/templates?table=nope", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, formatted) = post_json(
        &mut app,
        "/api/v1/query/format",
        Some(&token),
        json!({"sql": "select id from orders where id > 2"}),
    )
    .await;
    assert_eq!(formatted["sql"], "SELECT\n  id\nFROM orders\nWHERE id > 2");
}

// =============================================================================
// Advanced Analytics
// =============================================================================

#[tokio::test]
async fn test_analytics_load_and_filter() {
    let mut app = app(backend());
    let token = login(&mut app).await;

    let (status, body) = get_json(&mut app, "/api/v1/analytics/correlations", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, page) = post_json(
        &mut app,
        "/api/v1/analytics/load",
        Some(&token),
        json!({"table": "users", "limit": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let dataset = &page["dataset"];
    assert_eq!(dataset["limit"], 100);
    assert_eq!(dataset["status"], "Original");
    assert_eq!(dataset["overview"]["rows"], 25);

    let (status, page) = post_json(
        &mut app,
        "/api/v1/analytics/filters",
        Some(&token),
        json!({"filters": [{"type": "range", "column": "id", "min": 1, "max": 10}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["dataset"]["status"], "Filtered");
    assert_eq!(page["dataset"]["overview"]["rows"], 10);

    let (status, _) = post_json(
        &mut app,
        "/api/v1/analytics/filters",
        Some(&token),
        json!({"filters": [{"type": "range", "column": "nope", "min": 1, "max": 10}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = delete_json(&mut app, "/api/v1/analytics/filters", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["dataset"]["status"], "Original");
}

#[tokio::test]
async fn test_analytics_views() {
    let mut app = app(backend());
    let token = login(&mut app).await;
    post_json(&mut app, "/api/v1/analytics/load", Some(&token), json!({"table": "users"})).await;

    let (status, outliers) = get_json(&mut app, "/api/v1/analytics/outliers?column=spend", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outliers["total"], 1);
    assert_eq!(outliers["outliers"]["rows"][0]["id"], 25);

    let (status, _) = get_json(&mut app, "/api/v1/analytics/outliers?column=plan", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, trend) = get_json(
        &mut app,
        "/api/v1/analytics/trend?date_column=signed_up&value_column=spend&aggregation=count",
        &token,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trend["points"], 5);

    let (status, correlations) = get_json(&mut app, "/api/v1/analytics/correlations", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(correlations["top_pairs"].as_array().unwrap().len(), 1);

    let (status, chart) = post_json(
        &mut app,
        "/api/v1/analytics/chart",
        Some(&token),
        json!({"kind": "bar", "title": "Spend by plan", "x": "plan", "y": "spend"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(chart["figure"]["data"].is_array());

    let (status, headers, body) =
        send(&mut app, "GET", "/api/v1/analytics/export?format=json", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers["content-disposition"].to_str().unwrap().contains("users_analytics_"));
    let rows: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 25);
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn test_cache_refresh_forces_reload() {
    let backend = backend();
    let mut app = app(backend.clone());
    let token = login(&mut app).await;

    get_json(&mut app, "/api/v1/tables", &token).await;
    let trips = backend.round_trips();
    get_json(&mut app, "/api/v1/tables", &token).await;
    assert_eq!(backend.round_trips(), trips);

    let (status, body) = post_json(&mut app, "/api/v1/cache/refresh", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["dropped"].as_u64().unwrap() > 0);

    get_json(&mut app, "/api/v1/tables", &token).await;
    assert!(backend.round_trips() > trips);
}
