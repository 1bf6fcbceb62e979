use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use medcourier_dispatch::api::rest::router;
use medcourier_dispatch::config::Config;
use medcourier_dispatch::engine::cost::CostModelKind;
use medcourier_dispatch::models::schedule::DispatchMethod;
use medcourier_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        commit_pacing_ms: 0,
        ..Config::default()
    }
}

fn setup() -> (axum::Router, Arc<AppState>) {
    setup_with(test_config())
}

fn setup_with(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(&config));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn create_driver(app: &axum::Router, name: &str) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": name, "vehicle_type": "van", "rating": 4.6 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn create_delivery(app: &axum::Router, priority: &str) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            json!({
                "priority": priority,
                "package_type": "blood sample",
                "pickup_location": "St. Mary Clinic",
                "delivery_location": "Central Lab"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["deliveries"], 0);
    assert_eq!(body["reroutes"], 0);
    assert_eq!(body["auto_dispatch"], false);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("auto_dispatch_enabled"));
}

#[tokio::test]
async fn create_driver_returns_active_driver() {
    let (app, _state) = setup();
    let body = create_driver(&app, "Alice").await;

    assert_eq!(body["name"], "Alice");
    assert_eq!(body["status"], "active");
    assert!(body["current_delivery"].is_null());
    assert_eq!(body["rating"], 4.6);
}

#[tokio::test]
async fn create_driver_empty_name_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": "  ", "vehicle_type": "van", "rating": 4.5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn driver_rating_clamped_to_5() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": "Max", "vehicle_type": "bike", "rating": 9.9 }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["rating"], 5.0);
}

#[tokio::test]
async fn update_driver_status() {
    let (app, _state) = setup();
    let driver = create_driver(&app, "Eve").await;
    let id = driver["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/drivers/{id}/status"),
            json!({ "status": "inactive" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["status"], "inactive");
}

#[tokio::test]
async fn get_nonexistent_delivery_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/deliveries/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_delivery_returns_pending() {
    let (app, _state) = setup();
    let body = create_delivery(&app, "normal").await;

    assert_eq!(body["status"], "pending");
    assert!(body["assigned_driver"].is_null());
    assert_eq!(body["tracking_updates"][0]["status"], "Request Received");
}

#[tokio::test]
async fn manual_run_assigns_approved_urgent_first() {
    let (app, _state) = setup();
    let driver = create_driver(&app, "Dispatch Dan").await;
    let driver_id = driver["id"].as_str().unwrap().to_string();

    create_delivery(&app, "normal").await;
    let urgent = create_delivery(&app, "urgent").await;
    let urgent_id = urgent["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(post_request(&format!("/deliveries/{urgent_id}/approve")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.clone().oneshot(post_request("/dispatch/run")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary = body_json(res).await;
    assert_eq!(summary["trigger"], "manual");
    assert_eq!(summary["attempted"], 1);
    assert_eq!(summary["committed"], 1);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/deliveries/{urgent_id}")))
        .await
        .unwrap();
    let updated = body_json(res).await;
    assert_eq!(updated["status"], "in_progress");
    assert_eq!(updated["assigned_driver"], driver_id);

    let res = app.oneshot(get_request("/dispatch/status")).await.unwrap();
    let status = body_json(res).await;
    assert_eq!(status["cumulative_dispatch_count"], 1);
    assert_eq!(status["last_cycle_summary"]["committed"], 1);
    assert_eq!(status["state"]["state"], "disabled");
}

#[tokio::test]
async fn enable_and_disable_schedule() {
    let (app, state) = setup();

    let res = app.clone().oneshot(post_request("/dispatch/enable")).await.unwrap();
    let status = body_json(res).await;
    assert_eq!(status["enabled"], true);
    assert_eq!(status["state"]["state"], "armed");
    assert!(status["countdown_seconds"].as_i64().unwrap() <= 120);

    for _ in 0..2 {
        let res = app.clone().oneshot(post_request("/dispatch/disable")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let status = body_json(res).await;
        assert_eq!(status["enabled"], false);
        assert_eq!(status["state"]["state"], "disabled");
        assert!(status["countdown_seconds"].is_null());
    }

    assert!(!state.scheduler.is_enabled());
}

#[tokio::test]
async fn zero_interval_returns_400() {
    let (app, _state) = setup();
    let res = app
        .clone()
        .oneshot(json_request("PUT", "/dispatch/interval", json!({ "seconds": 0 })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(json_request("PUT", "/dispatch/interval", json!({ "seconds": 45 })))
        .await
        .unwrap();
    let status = body_json(res).await;
    assert_eq!(status["interval_seconds"], 45);
}

#[tokio::test]
async fn settings_round_trip_through_api() {
    let (app, _state) = setup();
    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/dispatch/settings",
            json!({
                "prioritize_urgent": false,
                "dispatch_method": "balanced",
                "max_distance_km": 12.5
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.oneshot(get_request("/dispatch/settings")).await.unwrap();
    let settings = body_json(res).await;
    assert_eq!(settings["dispatch_method"], "balanced");
    assert_eq!(settings["prioritize_urgent"], false);
}

#[tokio::test]
async fn orphaned_delivery_is_listed_and_reset() {
    let (app, state) = setup();
    create_driver(&app, "Ada").await;
    let delivery = create_delivery(&app, "urgent").await;
    let id = delivery["id"].as_str().unwrap().to_string();
    state.store.faults.fail_driver_links(1);

    let res = app.clone().oneshot(post_request("/dispatch/run")).await.unwrap();
    let summary = body_json(res).await;
    assert_eq!(summary["failed"], 1);

    let res = app.clone().oneshot(get_request("/dispatch/orphans")).await.unwrap();
    let orphans = body_json(res).await;
    assert_eq!(orphans.as_array().unwrap().len(), 1);
    assert_eq!(orphans[0]["id"], id);

    let res = app
        .clone()
        .oneshot(post_request(&format!("/deliveries/{id}/reset")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "pending");

    let res = app.oneshot(post_request(&format!("/deliveries/{id}/reset"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reroute_is_idempotent_over_http() {
    let (app, _state) = setup();
    create_driver(&app, "Ada").await;
    let delivery = create_delivery(&app, "normal").await;
    let id = delivery["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(post_request(&format!("/deliveries/{id}/reroute")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    app.clone().oneshot(post_request("/dispatch/run")).await.unwrap();

    let first = app
        .clone()
        .oneshot(post_request(&format!("/deliveries/{id}/reroute")))
        .await
        .unwrap();
    let first = body_string(first).await;
    let second = app
        .clone()
        .oneshot(post_request(&format!("/deliveries/{id}/reroute")))
        .await
        .unwrap();
    let second = body_string(second).await;
    assert_eq!(first, second);

    let res = app.oneshot(get_request("/reroutes")).await.unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn advise_suggests_reroutes_for_reported_incident() {
    let (app, _state) = setup();
    create_driver(&app, "Ada").await;
    create_driver(&app, "Bo").await;
    create_delivery(&app, "urgent").await;
    create_delivery(&app, "normal").await;
    app.clone().oneshot(post_request("/dispatch/run")).await.unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/incidents",
            json!({ "location": "Harbor Bridge", "kind": "accident", "severity": "high" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.clone().oneshot(post_request("/reroutes/advise")).await.unwrap();
    let advice = body_json(res).await;
    let suggestions = advice["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["estimated_delay_minutes"], 30);
    assert!(advice["rerouted"].as_array().unwrap().is_empty());

    let delivery_id = suggestions[0]["delivery_id"].clone();
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/reroutes",
            json!({ "delivery_ids": [delivery_id], "reason": "bridge closed" }),
        ))
        .await
        .unwrap();
    let records = body_json(res).await;
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["reason"], "bridge closed");
}

#[tokio::test]
async fn interval_change_while_enabled_is_reported_as_pending() {
    let (app, state) = setup();
    app.clone().oneshot(post_request("/dispatch/enable")).await.unwrap();

    let res = app
        .clone()
        .oneshot(json_request("PUT", "/dispatch/interval", json!({ "seconds": 45 })))
        .await
        .unwrap();
    let status = body_json(res).await;
    assert_eq!(status["interval_seconds"], 120);
    assert_eq!(status["pending_interval_seconds"], 45);

    let res = app.oneshot(post_request("/dispatch/disable")).await.unwrap();
    let status = body_json(res).await;
    assert_eq!(status["interval_seconds"], 45);
    assert!(status["pending_interval_seconds"].is_null());
    assert!(!state.scheduler.is_enabled());
}

#[tokio::test]
async fn rating_cost_model_prefers_stronger_driver() {
    let (app, _state) = setup_with(Config {
        cost_model: CostModelKind::Rating,
        dispatch_method: DispatchMethod::Efficiency,
        ..test_config()
    });
    for (name, rating) in [("Ada", 3.0), ("Bo", 4.9)] {
        app.clone()
            .oneshot(json_request(
                "POST",
                "/drivers",
                json!({ "name": name, "vehicle_type": "van", "rating": rating }),
            ))
            .await
            .unwrap();
    }
    let delivery = create_delivery(&app, "urgent").await;

    let res = app.clone().oneshot(get_request("/dispatch/plan")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let plan = body_json(res).await;
    assert_eq!(plan.as_array().unwrap().len(), 1);
    assert_eq!(plan[0]["request_id"], delivery["id"]);
    let planned_driver = plan[0]["driver_id"].clone();

    let res = app.clone().oneshot(get_request("/drivers")).await.unwrap();
    let drivers = body_json(res).await;
    let bo = drivers
        .as_array()
        .unwrap()
        .iter()
        .find(|driver| driver["name"] == "Bo")
        .unwrap();
    assert_eq!(planned_driver, bo["id"]);

    app.clone().oneshot(post_request("/dispatch/run")).await.unwrap();
    let id = delivery["id"].as_str().unwrap();
    let res = app
        .oneshot(get_request(&format!("/deliveries/{id}")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["assigned_driver"], bo["id"]);
}
