use crate::errors::{AppError, AppResult};
use crate::models::{MetricsUpdate, ScriptStatus};
use crate::pipeline::Pipeline;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const DEFAULT_TOP_LIMIT: i64 = 10;
const RECENT_LIMIT: i64 = 10;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/stats", get(stats))
        .route("/api/scripts", get(list_scripts))
        .route("/api/scripts/{id}", get(get_script))
        .route("/api/scripts/{id}/status", patch(patch_status))
        .route("/api/scripts/{id}/url", patch(patch_url))
        .route("/api/scripts/{id}/metrics", patch(patch_metrics))
        .route("/api/analytics/structures", get(structures))
        .route("/api/analytics/topics", get(topics))
        .route("/api/analytics/top", get(top_performers))
        .route("/api/analytics/hooks", get(hooks))
        .route("/api/analytics/latest", get(latest_analysis))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html(include_str!("dashboard.html"))
}

async fn stats(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let counts = state.pipeline.counts_by_status()?;
    let get = |status: ScriptStatus| counts.get(&status).copied().unwrap_or(0);
    let total: i64 = counts.values().sum();
    let recent = state.pipeline.recent_scripts(RECENT_LIMIT)?;
    Ok(Json(json!({
        "pending": get(ScriptStatus::Pending),
        "queued": get(ScriptStatus::Queued),
        "recorded": get(ScriptStatus::Recorded),
        "uploaded": get(ScriptStatus::Uploaded),
        "total": total,
        "recent": recent,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_scripts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Response> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let scripts = state.pipeline.scripts(status)?;
    Ok(Json(scripts).into_response())
}

async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let script = state
        .pipeline
        .script(id)?
        .ok_or_else(|| AppError::NotFound(format!("script #{id} does not exist")))?;
    Ok(Json(script).into_response())
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

async fn patch_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> AppResult<Response> {
    let status = parse_status(&body.status)?;
    require_script(&state, id)?;
    state.pipeline.set_status(id, status)?;
    Ok(Json(json!({ "id": id, "status": status })).into_response())
}

#[derive(Debug, Deserialize)]
struct UrlBody {
    url: String,
}

async fn patch_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UrlBody>,
) -> AppResult<Response> {
    if body.url.trim().is_empty() {
        return Err(AppError::Validation("url must not be empty".to_string()));
    }
    require_script(&state, id)?;
    state.pipeline.set_url(id, body.url.trim())?;
    Ok(Json(json!({ "id": id, "status": ScriptStatus::Uploaded })).into_response())
}

async fn patch_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<MetricsUpdate>,
) -> AppResult<Response> {
    let summary = state.pipeline.record_metrics(id, update)?;
    Ok(Json(summary).into_response())
}

async fn structures(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    Ok(Json(state.pipeline.structure_aggregates()?).into_response())
}

async fn topics(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    Ok(Json(state.pipeline.topic_aggregates()?).into_response())
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    limit: Option<i64>,
}

async fn top_performers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> AppResult<Response> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, 100);
    Ok(Json(state.pipeline.top_performers(limit)?).into_response())
}

async fn hooks(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    Ok(Json(state.pipeline.hook_leaderboard()?).into_response())
}

async fn latest_analysis(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    match state.pipeline.latest_analysis()? {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok(Json(json!(null)).into_response()),
    }
}

fn require_script(state: &AppState, id: i64) -> AppResult<()> {
    if state.pipeline.script(id)?.is_none() {
        return Err(AppError::NotFound(format!("script #{id} does not exist")));
    }
    Ok(())
}

fn parse_status(raw: &str) -> AppResult<ScriptStatus> {
    ScriptStatus::parse(raw).ok_or_else(|| {
        AppError::Validation(format!(
            "unknown status '{raw}', expected one of pending, queued, recorded, uploaded"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::parse_status;
    use crate::errors::AppError;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn error_variants_map_to_their_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::ExternalService("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn unknown_status_strings_are_validation_errors() {
        assert!(matches!(parse_status("archived"), Err(AppError::Validation(_))));
        assert!(parse_status("queued").is_ok());
    }
}
