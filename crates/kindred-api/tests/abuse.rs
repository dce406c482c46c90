mod support;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use support::{TestApp, circle_id, error_code};

const ALICE: &str = "alice-device-token-0001";
const BOB: &str = "bob-device-token-000002";
const CARA: &str = "cara-device-token-00003";

#[tokio::test]
async fn self_targeting_is_rejected_without_membership() {
    let app = TestApp::new();
    let alice = app.device(ALICE).await;

    let report = app
        .post(
            "/reports",
            ALICE,
            json!({ "target_id": alice, "circle_id": Uuid::new_v4(), "reason": "me" }),
        )
        .await;
    assert_eq!(report.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&report), "SELF_REPORT");

    let block = app.post("/blocks", ALICE, json!({ "target_id": alice })).await;
    assert_eq!(block.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&block), "SELF_BLOCK");
}

#[tokio::test]
async fn reports_are_scoped_to_the_reporters_circle() {
    let app = TestApp::new();
    let circle = circle_id(&app.join(ALICE, "calm", "books").await);
    app.join(BOB, "calm", "books").await;
    let bob = app.device(BOB).await;

    let outsider = app
        .post("/reports", CARA, json!({ "target_id": bob, "circle_id": circle, "reason": "spam" }))
        .await;
    assert_eq!(outsider.status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&outsider), "NOT_ALLOWED");

    let unknown = app
        .post(
            "/reports",
            ALICE,
            json!({ "target_id": Uuid::new_v4(), "circle_id": circle, "reason": "spam" }),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let blank = app
        .post("/reports", ALICE, json!({ "target_id": bob, "circle_id": circle, "reason": "  " }))
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    // duplicates are kept
    for _ in 0..2 {
        let ok = app
            .post("/reports", ALICE, json!({ "target_id": bob, "circle_id": circle, "reason": "spam" }))
            .await;
        assert_eq!(ok.status, StatusCode::CREATED);
        assert!(ok.body["id"].as_str().is_some());
    }
    assert_eq!(app.count_rows("SELECT COUNT(*) FROM reports WHERE target_id = ?1", bob), 2);
}

#[tokio::test]
async fn blocking_is_idempotent() {
    let app = TestApp::new();
    app.device(ALICE).await;
    let bob = app.device(BOB).await;

    let first = app.post("/blocks", ALICE, json!({ "target_id": bob })).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["created"], true);

    let second = app.post("/blocks", ALICE, json!({ "target_id": bob })).await;
    assert_eq!(second.body["created"], false);

    let unknown = app.post("/blocks", ALICE, json!({ "target_id": Uuid::new_v4() })).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blocks_do_not_affect_matching() {
    let app = TestApp::new();
    app.device(ALICE).await;
    let bob = app.device(BOB).await;
    app.post("/blocks", ALICE, json!({ "target_id": bob })).await;

    let a = circle_id(&app.join(ALICE, "calm", "books").await);
    let b = circle_id(&app.join(BOB, "calm", "books").await);
    assert_eq!(a, b);
}
