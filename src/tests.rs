use super::*;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use form_funnel::forms::InMemoryFormProvider;
use form_funnel::models::{FormDefinition, FormStep};
use form_funnel::store::MemoryEventStore;
use tower::ServiceExt;

fn test_app() -> Router {
    let form = FormDefinition {
        id: "lead-capture".into(),
        name: "Lead capture".into(),
        steps: vec![
            FormStep {
                id: "contact".into(),
                title: "Contact".into(),
            },
            FormStep {
                id: "details".into(),
                title: "Details".into(),
            },
        ],
    };
    let analytics = AnalyticsService::new(
        Arc::new(MemoryEventStore::new()),
        Arc::new(InMemoryFormProvider::with_forms([form])),
        Arc::new(MemorySessionStore::new()),
    );
    router(AppState {
        analytics: Arc::new(analytics),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, body)
}

fn track(body: serde_json::Value, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_track_then_read_analytics() {
    let app = test_app();

    for session in ["s1", "s2"] {
        let (status, _) = send(
            &app,
            track(serde_json::json!({ "formId": "lead-capture", "eventType": "form_view" }), Some(session)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        send(
            &app,
            track(
                serde_json::json!({ "formId": "lead-capture", "stepId": "contact", "eventType": "step_view" }),
                Some(session),
            ),
        )
        .await;
    }
    send(
        &app,
        track(
            serde_json::json!({
                "formId": "lead-capture",
                "stepId": "details",
                "eventType": "step_view",
                "sessionId": "s1"
            }),
            None,
        ),
    )
    .await;

    let (status, body) = send(&app, get_req("/forms/lead-capture/analytics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalViews"], 2);
    assert_eq!(body["stepAnalytics"][0]["views"], 2);
    assert_eq!(body["stepAnalytics"][0]["exits"], 1);
    assert_eq!(body["stepAnalytics"][0]["dropOffRate"], 50.0);
    assert_eq!(body["stepAnalytics"][0]["severity"], "high");
}

#[tokio::test]
async fn test_step_event_without_step_is_bad_request() {
    let app = test_app();
    let (status, body) = send(
        &app,
        track(serde_json::json!({ "formId": "lead-capture", "eventType": "step_view" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_unknown_form_is_not_found_with_suggestion() {
    let app = test_app();
    let (status, body) = send(&app, get_req("/forms/lead-captur/analytics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["didYouMean"], "lead-capture");
}

#[tokio::test]
async fn test_overview_debug_and_reset() {
    let app = test_app();
    send(
        &app,
        track(serde_json::json!({ "formId": "lead-capture", "eventType": "form_view" }), Some("a")),
    )
    .await;
    send(
        &app,
        track(serde_json::json!({ "formId": "lead-capture", "eventType": "form_submission" }), Some("a")),
    )
    .await;

    let (_, overview) = send(&app, get_req("/analytics")).await;
    assert_eq!(overview["overallConversionRate"], 100.0);

    let (_, counts) = send(&app, get_req("/analytics/debug")).await;
    assert_eq!(counts["totalEvents"], 2);
    assert_eq!(counts["formSubmissions"], 1);

    let (_, events) = send(&app, get_req("/events?formId=lead-capture&limit=1")).await;
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["eventType"], "form_submission");

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/admin/events")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get_req("/forms/lead-capture/analytics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sample_data_and_refresh() {
    let app = test_app();
    let post = |uri: &str| {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(&app, post("/admin/forms/lead-capture/sample-data")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["events"].as_u64().unwrap() > 0);

    let (status, _) = send(&app, post("/admin/analytics/refresh")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, analytics) = send(&app, get_req("/forms/lead-capture/analytics")).await;
    assert_eq!(analytics["totalViews"], 584);
    assert_eq!(analytics["totalSubmissions"], 225);

    let (status, _) = send(&app, post("/admin/forms/missing/sample-data")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sample_data_runs_alongside_other_requests() {
    let app = test_app();
    let seeding = tokio::spawn({
        let app = app.clone();
        async move {
            let request = Request::builder()
                .method("POST")
                .uri("/admin/forms/lead-capture/sample-data")
                .body(Body::empty())
                .unwrap();
            send(&app, request).await
        }
    });

    let (status, body) = send(&app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = seeding.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_are_not_cross_origin() {
    let app = test_app();
    let cross_origin = |method: &str, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("origin", "https://customer-site.example")
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(cross_origin("GET", "/analytics"))
        .await
        .unwrap();
    assert!(response.headers().contains_key("access-control-allow-origin"));

    let response = app
        .clone()
        .oneshot(cross_origin("DELETE", "/admin/events"))
        .await
        .unwrap();
    assert!(!response.headers().contains_key("access-control-allow-origin"));

    // the old unprefixed reset path is gone
    let response = app
        .clone()
        .oneshot(cross_origin("DELETE", "/events"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
