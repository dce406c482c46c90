mod support;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use serde_json::json;

use kindred_api::config::Settings;
use kindred_api::middleware::{DEVICE_CREATED_HEADER, DEVICE_TOKEN_HEADER};
use kindred_db::models::encode_time;
use kindred_types::models::CircleStatus;

use support::{TestApp, circle_id, error_code};

const ALICE: &str = "alice-device-token-0001";
const BOB: &str = "bob-device-token-000002";
const CARA: &str = "cara-device-token-00003";

#[tokio::test]
async fn health_needs_no_device() {
    let app = TestApp::new();
    let reply = app.call(Method::GET, "/health", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["ok"], true);
    assert!(reply.headers.get(&DEVICE_TOKEN_HEADER).is_none());
}

#[tokio::test]
async fn missing_token_is_minted_and_echoed() {
    let app = TestApp::new();
    let reply = app.call(Method::GET, "/circles/current", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers.get(&DEVICE_CREATED_HEADER).unwrap(), "true");
    let token = reply.headers.get(&DEVICE_TOKEN_HEADER).unwrap().to_str().unwrap().to_string();
    assert_eq!(token.len(), 43);

    // presenting the minted token resolves to the same device, no new headers
    let again = app.get("/circles/current", &token).await;
    assert_eq!(again.status, StatusCode::OK);
    assert!(again.headers.get(&DEVICE_CREATED_HEADER).is_none());
    assert!(app.token_device(&token).is_some());
}

#[tokio::test]
async fn malformed_token_gets_a_fresh_identity() {
    let app = TestApp::new();
    let reply = app.call(Method::GET, "/circles/current", Some("short"), None).await;

    assert_eq!(reply.status, StatusCode::OK);
    let minted = reply.headers.get(&DEVICE_TOKEN_HEADER).unwrap().to_str().unwrap();
    assert_ne!(minted, "short");
    assert!(app.token_device("short").is_none());
}

#[tokio::test]
async fn devices_with_the_same_pair_share_a_circle() {
    let app = TestApp::new();

    let first = app.join(ALICE, "Calm", " books ").await;
    assert_eq!(first["mood"], "calm");
    assert_eq!(first["interest"], "books");
    assert_eq!(first["member_count"], 1);
    assert_eq!(first["capacity"], 5);
    assert_eq!(first["status"], "active");

    let second = app.join(BOB, "calm", "books").await;
    assert_eq!(circle_id(&second), circle_id(&first));
    assert_eq!(second["member_count"], 2);

    // a different pair lands elsewhere
    let other = app.join(CARA, "calm", "music").await;
    assert_ne!(circle_id(&other), circle_id(&first));
}

#[tokio::test]
async fn rejoining_the_same_pair_is_a_no_op() {
    let app = TestApp::new();
    let first = app.join(ALICE, "calm", "books").await;
    let again = app.join(ALICE, "calm", "books").await;

    assert_eq!(circle_id(&again), circle_id(&first));
    assert_eq!(again["member_count"], 1);
}

#[tokio::test]
async fn full_circle_overflows_into_a_new_one() {
    let app = TestApp::with_settings(Settings {
        circle_capacity: 2,
        ..Settings::default()
    });

    let a = app.join(ALICE, "calm", "books").await;
    let b = app.join(BOB, "calm", "books").await;
    let c = app.join(CARA, "calm", "books").await;

    assert_eq!(circle_id(&a), circle_id(&b));
    assert_ne!(circle_id(&c), circle_id(&a));
    assert_eq!(c["member_count"], 1);
}

#[tokio::test]
async fn concurrent_joins_converge_on_one_circle() {
    let app = TestApp::new();
    let tokens: Vec<String> = (0..5).map(|i| format!("racing-device-token-{:04}", i)).collect();

    let mut handles = Vec::new();
    for token in tokens {
        let router = app.router.clone();
        let state = app.state.clone();
        handles.push(tokio::spawn(async move {
            let app = support::TestApp { state, router };
            app.join(&token, "calm", "books").await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(circle_id(&handle.await.unwrap()));
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let circle = app.state.db.get_circle(ids[0]).unwrap().unwrap();
    assert_eq!(circle.member_count, 5);
}

#[tokio::test]
async fn joining_another_pair_leaves_the_old_circle() {
    let app = TestApp::new();
    let books = circle_id(&app.join(ALICE, "calm", "books").await);
    let music = circle_id(&app.join(ALICE, "calm", "music").await);
    let alice = app.device(ALICE).await;

    assert_ne!(books, music);
    assert!(!app.state.db.is_member(books, alice).unwrap());
    assert!(app.state.db.is_member(music, alice).unwrap());
}

#[tokio::test]
async fn blank_tags_are_rejected() {
    let app = TestApp::new();
    let reply = app.post("/circles/join", ALICE, json!({ "mood": "  ", "interest": "books" })).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&reply), "INVALID_PAYLOAD");
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let app = TestApp::new();
    let reply = app
        .post("/circles/join", ALICE, json!({ "mood": "calm", "interest": "books", "extra": 1 }))
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&reply), "INVALID_PAYLOAD");
}

#[tokio::test]
async fn leave_is_idempotent_and_clears_current() {
    let app = TestApp::new();
    let joined = app.join(ALICE, "calm", "books").await;

    let current = app.get("/circles/current", ALICE).await;
    assert_eq!(circle_id(&current.body["circle"]), circle_id(&joined));

    let left = app.post("/circles/leave", ALICE, json!({})).await;
    assert_eq!(left.status, StatusCode::OK);
    assert_eq!(left.body["left"], true);

    let again = app.post("/circles/leave", ALICE, json!({})).await;
    assert_eq!(again.body["left"], false);

    let current = app.get("/circles/current", ALICE).await;
    assert!(current.body["circle"].is_null());
}

#[tokio::test]
async fn expired_circle_is_archived_on_lookup() {
    let app = TestApp::new();
    let id = circle_id(&app.join(ALICE, "calm", "books").await);

    let past = encode_time(&(Utc::now() - chrono::Duration::minutes(1)));
    app.state
        .db
        .with_conn(|conn| {
            conn.execute("UPDATE circles SET expires_at = ?1 WHERE id = ?2", (past, id.to_string()))?;
            Ok(())
        })
        .unwrap();

    let current = app.get("/circles/current", ALICE).await;
    assert!(current.body["circle"].is_null());
    assert_eq!(app.state.db.get_circle(id).unwrap().unwrap().status, CircleStatus::Archived);

    // posting into it is refused, and a fresh join opens a new circle
    let post = app.post(&format!("/circles/{}/messages", id), ALICE, json!({ "content": "anyone?" })).await;
    assert_eq!(post.status, StatusCode::CONFLICT);
    assert_eq!(error_code(&post), "CIRCLE_CLOSED");

    let next = circle_id(&app.join(ALICE, "calm", "books").await);
    assert_ne!(next, id);
}

#[tokio::test]
async fn reset_forgets_the_device() {
    let app = TestApp::new();
    let joined = circle_id(&app.join(ALICE, "calm", "books").await);
    app.join(BOB, "calm", "books").await;
    let alice = app.device(ALICE).await;

    let reply = app.call(Method::DELETE, "/device", Some(ALICE), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["reset"], true);

    assert!(!app.state.db.device_exists(alice).unwrap());
    assert_eq!(app.state.db.get_circle(joined).unwrap().unwrap().member_count, 1);

    // the leave notice survives for the remaining member
    let messages = app.get(&format!("/circles/{}/messages", joined), BOB).await;
    let last = messages.body.as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["is_system"], true);
    assert_eq!(last["content"], "A voice left the circle.");

    // the old token now names a different, empty device
    let after = app.get("/circles/current", ALICE).await;
    assert!(after.body["circle"].is_null());
    assert!(after.headers.get(&DEVICE_CREATED_HEADER).is_none());
    let fresh = app.token_device(ALICE).unwrap();
    assert_ne!(fresh, alice);
    assert!(!app.state.db.is_member(joined, fresh).unwrap());
}

#[tokio::test]
async fn oversized_ttl_fails_the_join_cleanly() {
    let app = TestApp::with_settings(Settings {
        circle_ttl: chrono::Duration::hours(3_000_000_000),
        ..Settings::default()
    });

    let reply = app.post("/circles/join", ALICE, json!({ "mood": "calm", "interest": "books" })).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&reply), "INTERNAL");

    // the server keeps answering
    let health = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}
