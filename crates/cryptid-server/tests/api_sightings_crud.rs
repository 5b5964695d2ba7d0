use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use cryptid_broker::TopicBroker;
use cryptid_db::{create_pool, run_migrations, DbRuntimeSettings};
use cryptid_server::{app, AppState};
use cryptid_store::SightingStore;
use cryptid_types::Sighting;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// File-backed so every pooled connection sees the migrated schema; an
// in-memory pool gives each connection its own database. The TempDir must
// outlive the test.
fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("api.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("pool");
    {
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrations");
    }
    let state = AppState {
        store: Arc::new(SightingStore::new(pool)),
        broker: TopicBroker::new(),
    };
    (state, dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("PUT")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn create_round_trips_through_get() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/sightings",
            json!({"state": "OR", "description": "tall figure"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let created: Sighting = serde_json::from_value(body_json(response).await).expect("sighting");
    assert!(!created.id.is_empty(), "store must assign an id");
    assert_eq!(created.state, "OR");
    assert_eq!(created.description, "tall figure");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/sighting/{}", created.id))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let fetched: Sighting = serde_json::from_value(body_json(response).await).expect("sighting");
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_reports_all_missing_fields_and_persists_nothing() {
    let (state, _dir) = test_state();
    let app = app(state.clone());

    let response = app
        .clone()
        .oneshot(post_json("/sightings", json!({"location": "forest"})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let errors: Vec<String> =
        serde_json::from_value(body_json(response).await).expect("error list");
    assert_eq!(errors.len(), 2, "both missing fields reported together");
    assert!(errors.iter().any(|e| e.contains("state")));
    assert!(errors.iter().any(|e| e.contains("description")));

    // Nothing was written.
    let count: i64 = {
        let store = state.store.clone();
        tokio::task::spawn_blocking(move || store.list_by_state("OR").map(|v| v.len() as i64))
            .await
            .expect("join")
            .expect("list")
    };
    assert_eq!(count, 0);
}

#[tokio::test]
async fn create_rejects_blank_required_fields() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .oneshot(post_json(
            "/sightings",
            json!({"state": "  ", "description": "something"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let errors: Vec<String> =
        serde_json::from_value(body_json(response).await).expect("error list");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("state"));
}

#[tokio::test]
async fn list_by_state_returns_matching_records() {
    let (state, _dir) = test_state();
    let app = app(state);

    for (state, description) in [
        ("OR", "tall figure"),
        ("OR", "large footprints"),
        ("WA", "shadow in the treeline"),
    ] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/sightings",
                json!({"state": state, "description": description}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/sightings/OR")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let sightings: Vec<Sighting> =
        serde_json::from_value(body_json(response).await).expect("list");
    assert_eq!(sightings.len(), 2);
    assert!(sightings.iter().all(|s| s.state == "OR"));
}

#[tokio::test]
async fn get_unknown_id_is_404() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/sighting/ghost")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_ignores_client_supplied_id() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/sightings",
            json!({"state": "WA", "description": "original"}),
        ))
        .await
        .expect("response");
    let created: Sighting = serde_json::from_value(body_json(response).await).expect("sighting");

    let response = app
        .clone()
        .oneshot(put_json(
            &format!("/sighting/{}", created.id),
            json!({"description": "updated text", "id": "999"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let updated: Sighting = serde_json::from_value(body_json(response).await).expect("sighting");
    assert_eq!(updated.id, created.id, "body id must be ignored");
    assert_eq!(updated.description, "updated text");
    assert_eq!(updated.state, "WA", "untouched fields preserved");

    // The original id still resolves; "999" never existed.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/sighting/999")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_unknown_id_is_404() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .oneshot(put_json("/sighting/ghost", json!({"description": "boo"})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_record_and_unknown_id_is_404() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/sightings",
            json!({"state": "ID", "description": "footprints"}),
        ))
        .await
        .expect("response");
    let created: Sighting = serde_json::from_value(body_json(response).await).expect("sighting");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/sighting/{}", created.id))
                .method("DELETE")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let ack = body_json(response).await;
    assert_eq!(ack.get("status").and_then(|v| v.as_str()), Some("deleted"));
    assert_eq!(
        ack.get("id").and_then(|v| v.as_str()),
        Some(created.id.as_str())
    );

    // Strict semantics: the second delete is a 404.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/sighting/{}", created.id))
                .method("DELETE")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (state, _dir) = test_state();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}
