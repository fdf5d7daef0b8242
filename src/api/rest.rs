// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Reads are public; the mutating
// endpoints (history replace and append, parameter update) require a Bearer
// token checked via the `AuthBearer` extractor.
//
// Analyses are CPU-bound and run on the blocking pool, one task per symbol.
//
// CORS is configured permissively for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::engine::AnalysisReport;
use crate::market_data::normalize_symbol;
use crate::runtime_config::AnalysisParams;
use crate::types::PriceBar;

/// Upper bound on symbols per batch request.
const MAX_BATCH_SYMBOLS: usize = 50;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/analysis", get(analysis_batch))
        .route("/api/v1/analysis/:symbol", get(analysis_one))
        .route("/api/v1/analyses/recent", get(recent_analyses))
        .route("/api/v1/history", get(history_list))
        // ── Authenticated writes ────────────────────────────────────
        .route(
            "/api/v1/history/:symbol",
            put(history_replace).post(history_append),
        )
        .route("/api/v1/config", get(get_config).post(set_config))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

/// Symbols are short tickers: letters, digits, `.`, `-`, `_`.
fn valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 16
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    symbols: usize,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        uptime_secs: state.uptime_secs(),
        symbols: state.store.symbols().len(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Single-symbol analysis (public)
// =============================================================================

#[derive(Deserialize)]
struct PriceQuery {
    #[serde(default)]
    price: Option<String>,
}

async fn analysis_one(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<PriceQuery>,
) -> Response {
    let symbol = normalize_symbol(&symbol);
    if !valid_symbol(&symbol) {
        return error_response(StatusCode::BAD_REQUEST, "invalid symbol");
    }

    let price = match query.price.as_deref().map(str::parse::<f64>) {
        None => None,
        Some(Ok(p)) if p.is_finite() && p > 0.0 => Some(p),
        Some(_) => {
            return error_response(StatusCode::BAD_REQUEST, "price must be a positive number")
        }
    };

    let task_state = Arc::clone(&state);
    let task_symbol = symbol.clone();
    let joined =
        tokio::task::spawn_blocking(move || task_state.run_analysis(&task_symbol, price)).await;

    match joined {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no price history for {symbol}"),
        ),
        Err(e) => {
            error!(symbol = %symbol, error = %e, "analysis task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "analysis failed")
        }
    }
}

// =============================================================================
// Batch analysis (public)
// =============================================================================

#[derive(Deserialize)]
struct BatchQuery {
    #[serde(default)]
    symbols: Option<String>,
}

#[derive(Serialize)]
struct BatchEntry {
    symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn analysis_batch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BatchQuery>,
) -> Response {
    let mut symbols: Vec<String> = Vec::new();
    for raw in query.symbols.as_deref().unwrap_or("").split(',') {
        let symbol = normalize_symbol(raw);
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "symbols query parameter is required");
    }
    if symbols.len() > MAX_BATCH_SYMBOLS {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("at most {MAX_BATCH_SYMBOLS} symbols per request"),
        );
    }
    if let Some(bad) = symbols.iter().find(|s| !valid_symbol(s)) {
        return error_response(StatusCode::BAD_REQUEST, format!("invalid symbol {bad}"));
    }

    // Analyses are independent; fan out, then collect in request order.
    let handles: Vec<_> = symbols
        .iter()
        .map(|symbol| {
            let task_state = Arc::clone(&state);
            let task_symbol = symbol.clone();
            tokio::task::spawn_blocking(move || task_state.run_analysis(&task_symbol, None))
        })
        .collect();

    let mut entries = Vec::with_capacity(handles.len());
    for (symbol, handle) in symbols.into_iter().zip(handles) {
        let entry = match handle.await {
            Ok(Some(report)) => BatchEntry {
                symbol,
                report: Some(report),
                error: None,
            },
            Ok(None) => BatchEntry {
                error: Some(format!("no price history for {symbol}")),
                symbol,
                report: None,
            },
            Err(e) => {
                error!(symbol = %symbol, error = %e, "analysis task failed");
                BatchEntry {
                    symbol,
                    report: None,
                    error: Some("analysis failed".to_string()),
                }
            }
        };
        entries.push(entry);
    }

    Json(entries).into_response()
}

// =============================================================================
// Analysis audit trail (public)
// =============================================================================

async fn recent_analyses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let records = state.recent_analyses.read().clone();
    Json(records)
}

// =============================================================================
// History (list public, replace authenticated)
// =============================================================================

#[derive(Serialize)]
struct HistorySummary {
    symbol: String,
    bars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_close: Option<f64>,
}

async fn history_list(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summaries: Vec<HistorySummary> = state
        .store
        .symbols()
        .into_iter()
        .map(|(symbol, bars)| HistorySummary {
            last_close: state.store.last_close(&symbol),
            symbol,
            bars,
        })
        .collect();
    Json(summaries)
}

/// Shared checks for uploaded bars. Returns the normalised symbol.
fn check_upload(symbol: &str, bars: &[PriceBar]) -> Result<String, Response> {
    let symbol = normalize_symbol(symbol);
    if !valid_symbol(&symbol) {
        return Err(error_response(StatusCode::BAD_REQUEST, "invalid symbol"));
    }
    if bars.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "history must contain at least one bar",
        ));
    }
    if let Some(bad) = bars.iter().find(|b| !(b.close.is_finite() && b.close > 0.0)) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("close on {} is not a positive price", bad.date),
        ));
    }
    Ok(symbol)
}

async fn history_replace(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(bars): Json<Vec<PriceBar>>,
) -> Response {
    let symbol = match check_upload(&symbol, &bars) {
        Ok(symbol) => symbol,
        Err(resp) => return resp,
    };

    let received = bars.len();
    let kept = state.store.replace(&symbol, bars);
    state.increment_version();
    info!(symbol = %symbol, received, kept, "history replaced via API");

    Json(HistorySummary {
        last_close: state.store.last_close(&symbol),
        symbol,
        bars: kept,
    })
    .into_response()
}

/// Add or overwrite bars by date, keeping the rest of the history.
async fn history_append(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Json(bars): Json<Vec<PriceBar>>,
) -> Response {
    let symbol = match check_upload(&symbol, &bars) {
        Ok(symbol) => symbol,
        Err(resp) => return resp,
    };

    let received = bars.len();
    for bar in bars {
        state.store.upsert(&symbol, bar);
    }
    state.increment_version();
    let kept = state.store.count(&symbol);
    info!(symbol = %symbol, received, kept, "bars appended via API");

    Json(HistorySummary {
        last_close: state.store.last_close(&symbol),
        symbol,
        bars: kept,
    })
    .into_response()
}

// =============================================================================
// Analysis parameters (read public, update authenticated)
// =============================================================================

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.analysis_params())
}

async fn set_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(params): Json<AnalysisParams>,
) -> Response {
    if let Err(e) = params.validate() {
        warn!(error = %e, "rejected analysis parameter update");
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.update_analysis_params(params) {
        Ok(()) => Json(state.analysis_params()).into_response(),
        Err(e) => {
            error!(error = %e, "failed to apply analysis parameters");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use crate::types::test_support::{bars_from_closes, linear, rise_then_pullback};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn test_state() -> Arc<AppState> {
        let state = AppState::new(RuntimeConfig::default(), None)
            .with_admin_token(Some(TOKEN.to_string()));
        state.store.replace("AAPL", bars_from_closes(&rise_then_pullback()));
        Arc::new(state)
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router(Arc::clone(state)).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, token: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = test_state();
        let (status, body) = send(&state, get_req("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["symbols"], 1);
    }

    #[tokio::test]
    async fn analysis_is_served_and_recorded() {
        let state = test_state();
        let (status, body) = send(&state, get_req("/api/v1/analysis/aapl?price=141")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "complete");
        assert_eq!(body["current_price"], 141.0);

        let (status, records) = send(&state, get_req("/api/v1/analyses/recent")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert_eq!(records[0]["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let state = test_state();
        let (status, body) = send(&state, get_req("/api/v1/analysis/MSFT")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("MSFT"));
    }

    #[tokio::test]
    async fn bad_price_is_rejected() {
        let state = test_state();
        let (status, body) = send(&state, get_req("/api/v1/analysis/AAPL?price=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send(&state, get_req("/api/v1/analysis/AAPL?price=-3")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn batch_keeps_request_order() {
        let state = test_state();
        state.store.replace("TSLA", bars_from_closes(&linear(100.0, 110.0, 10)));

        let (status, body) =
            send(&state, get_req("/api/v1/analysis?symbols=tsla,AAPL,NOPE,aapl")).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["symbol"], "TSLA");
        assert_eq!(entries[0]["report"]["status"], "insufficient_data");
        assert_eq!(entries[1]["report"]["status"], "complete");
        assert!(entries[2]["error"].is_string());
        assert_eq!(state.recent_analyses.read().len(), 2);
    }

    #[tokio::test]
    async fn batch_without_symbols_is_bad_request() {
        let state = test_state();
        let (status, _) = send(&state, get_req("/api/v1/analysis")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_upload_requires_token() {
        let state = test_state();
        let bars = bars_from_closes(&linear(50.0, 60.0, 40));
        let payload = serde_json::to_string(&bars).unwrap();

        let req = json_req("PUT", "/api/v1/history/msft", None, payload.clone());
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = json_req("PUT", "/api/v1/history/msft", Some("wrong"), payload.clone());
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = json_req("PUT", "/api/v1/history/msft", Some(TOKEN), payload);
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "MSFT");
        assert_eq!(body["bars"], 40);

        let (_, list) = send(&state, get_req("/api/v1/history")).await;
        assert_eq!(list.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn appended_bars_merge_by_date() {
        let state = test_state();
        let day = |d: u32| chrono::NaiveDate::from_ymd_opt(2024, 2, d).unwrap();
        let bars = vec![
            PriceBar::from_close(day(9), 139.0),
            PriceBar::from_close(day(10), 138.5),
        ];
        let payload = serde_json::to_string(&bars).unwrap();

        let req = json_req("POST", "/api/v1/history/aapl", None, payload.clone());
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = json_req("POST", "/api/v1/history/aapl", Some(TOKEN), payload);
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        // 40 bars, the last one overwritten, one new day.
        assert_eq!(body["bars"], 41);
        assert_eq!(body["last_close"], 138.5);

        let recent = state.store.get("AAPL", 2);
        assert_eq!(recent[0].date, day(9));
        assert_eq!(recent[0].close, 139.0);

        let req = json_req("POST", "/api/v1/history/aapl", Some(TOKEN), "[]".to_string());
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn runaway_retry_budget_is_rejected() {
        let state = test_state();
        let body = r#"{"zigzag": {"max_retries": 200000, "min_threshold_pct": 0.0}}"#;
        let req = json_req("POST", "/api/v1/config", Some(TOKEN), body.to_string());
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("max_retries"));
        assert_eq!(state.analysis_params(), AnalysisParams::default());
    }

    #[tokio::test]
    async fn config_update_validates() {
        let state = test_state();

        let mut bad = AnalysisParams::default();
        bad.zigzag.retry_factor = 0.0;
        let req = json_req(
            "POST",
            "/api/v1/config",
            Some(TOKEN),
            serde_json::to_string(&bad).unwrap(),
        );
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = r#"{"min_bars": 45}"#.to_string();
        let req = json_req("POST", "/api/v1/config", Some(TOKEN), body);
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["min_bars"], 45);
        assert_eq!(state.analysis_params().min_bars, 45);

        let (_, body) = send(&state, get_req("/api/v1/config")).await;
        assert_eq!(body["min_bars"], 45);
    }

    #[test]
    fn symbol_validation() {
        assert!(valid_symbol("BRK.B"));
        assert!(valid_symbol("2330"));
        assert!(!valid_symbol(""));
        assert!(!valid_symbol("../etc"));
        assert!(!valid_symbol("A B"));
    }
}
