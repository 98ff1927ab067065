use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use weathermetrics::api::http::router;
use weathermetrics::build_service;
use weathermetrics::clock::ManualClock;
use weathermetrics::config::{BrokerKind, Settings};

const NOW: i64 = 1_600_000_000_000;

async fn call(app: axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn posted_readings_show_up_in_every_endpoint() {
    let mut settings = Settings::load(None).unwrap();
    settings.broker.poll_timeout_ms = 50;
    let service = build_service(&settings, Arc::new(ManualClock::new(NOW))).await.unwrap();
    service.consumer.start().await.unwrap();
    let app = router(service.state.clone());

    for body in [
        r#"{"name":"Paris","main":{"temp":10.0}}"#,
        r#"{"name":"Paris","main":{"temp":14.0}}"#,
        r#"{"name":"Oslo","main":{"temp":-4.5}}"#,
    ] {
        let (status, _) = call(app.clone(), "POST", "/weather/readings", body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    for _ in 0..400 {
        if service.state.metrics.snapshot().readings_stored == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (status, current) = call(app.clone(), "GET", "/weather/current", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current, serde_json::json!({ "Oslo": -4.5, "Paris": 14.0 }));

    let (_, today) = call(app.clone(), "GET", "/weather/average/today", "").await;
    assert_eq!(
        today,
        serde_json::json!({ "temps:lastDay:Oslo": -4.5, "temps:lastDay:Paris": 12.0 })
    );

    let (_, week) = call(app.clone(), "GET", "/weather/average/week", "").await;
    assert_eq!(week["temps:lastWeek:Paris"], 12.0);

    let (_, range) = call(app.clone(), "GET", "/weather/range/week", "").await;
    assert_eq!(range["min"], -4.5);
    assert_eq!(range["max"], 14.0);

    let (_, metrics) = call(app.clone(), "GET", "/metrics", "").await;
    assert_eq!(metrics["weather.current.temperature.requests"], 1);
    assert_eq!(metrics["weather.average.temperature.lastday.requests"], 1);
    assert_eq!(metrics["weather.average.temperature.lastweek.requests"], 1);
    assert_eq!(metrics["weather.range.temperature.lastweek.requests"], 1);
    assert_eq!(metrics["weather.range.temperature.lastday.requests"], 0);
    let cpu = metrics["system.cpu.usage"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&cpu));
    assert!(metrics["process.memory.used"].is_u64());
    assert_eq!(metrics["weather.ingest.readings.stored"], 3);

    service.consumer.stop().await.unwrap();
}

#[tokio::test]
async fn empty_range_reports_missing_extremes() {
    let settings = Settings::load(None).unwrap();
    let service = build_service(&settings, Arc::new(ManualClock::new(NOW))).await.unwrap();
    let app = router(service.state.clone());

    let (status, current) = call(app.clone(), "GET", "/weather/current", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current, serde_json::json!({}));

    let (_, range) = call(app, "GET", "/weather/range/today", "").await;
    assert_eq!(range, serde_json::json!({ "averages": {}, "min": null, "max": null }));
}

#[tokio::test]
async fn publishing_requires_in_process_broker() {
    let settings = Settings::load(None).unwrap();
    let service = build_service(&settings, Arc::new(ManualClock::new(NOW))).await.unwrap();
    assert_eq!(settings.broker.kind, BrokerKind::Memory);

    let mut state = Arc::try_unwrap(service.state).ok().expect("state is not shared yet");
    state.publisher = None;
    let app = router(Arc::new(state));

    let (status, body) = call(app, "POST", "/weather/readings", "{}").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("in-process broker"));
}
