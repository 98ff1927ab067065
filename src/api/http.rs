use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver as BroadcastReceiver;
use tracing::{error, info};

use crate::metrics::{Metrics, MetricsSnapshot};
use crate::model::WindowKind;
use crate::query::PeriodSummary;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

pub fn router(state: Arc<crate::AppState>) -> Router {
    Router::new()
        .route("/weather/current", get(current_handler))
        .route("/weather/average/today", get(average_today_handler))
        .route("/weather/average/week", get(average_week_handler))
        .route("/weather/range/today", get(range_today_handler))
        .route("/weather/range/week", get(range_week_handler))
        .route("/weather/readings", post(publish_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
}

pub async fn run(
    state: Arc<crate::AppState>,
    addr: String,
    mut shutdown: BroadcastReceiver<()>,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}

async fn current_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
) -> Result<Json<BTreeMap<String, f64>>, ApiError> {
    Metrics::incr(&state.metrics.current_requests);
    match state.engine.current_temperatures().await {
        Ok(temps) => Ok(Json(temps)),
        Err(e) => {
            error!(error = %e, "current temperatures unavailable");
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

async fn average_today_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
) -> Json<BTreeMap<String, f64>> {
    Metrics::incr(&state.metrics.day_average_requests);
    Json(state.engine.average_for_period(WindowKind::Day).await)
}

async fn average_week_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
) -> Json<BTreeMap<String, f64>> {
    Metrics::incr(&state.metrics.week_average_requests);
    Json(state.engine.average_for_period(WindowKind::Week).await)
}

async fn range_today_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<PeriodSummary> {
    Metrics::incr(&state.metrics.day_range_requests);
    Json(state.engine.summary_for_period(WindowKind::Day).await)
}

async fn range_week_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<PeriodSummary> {
    Metrics::incr(&state.metrics.week_range_requests);
    Json(state.engine.summary_for_period(WindowKind::Week).await)
}

// Only available with the in-process broker; Kafka producers live elsewhere.
async fn publish_handler(
    Extension(state): Extension<Arc<crate::AppState>>,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Some(publisher) = state.publisher.as_ref() else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "readings are accepted over HTTP only with the in-process broker",
        ));
    };
    publisher.publish(&state.topic, body).await;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "queued" }))))
}

async fn metrics_handler(Extension(state): Extension<Arc<crate::AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
