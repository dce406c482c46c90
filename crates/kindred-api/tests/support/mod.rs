#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

use kindred_api::config::Settings;
use kindred_api::middleware::DEVICE_TOKEN_HEADER;
use kindred_api::moderation::Moderator;
use kindred_api::{AppState, AppStateInner, build_router};
use kindred_db::Database;
use kindred_gateway::Dispatcher;

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let moderator = Moderator::new(&settings.moderation).unwrap();
        let db = Database::open_in_memory().unwrap();
        let state = AppStateInner::new(db, Dispatcher::new(), settings, moderator);
        let router = build_router(state.clone());
        Self { state, router }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(DEVICE_TOKEN_HEADER, token);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Reply { status, headers, body }
    }

    pub async fn get(&self, uri: &str, token: &str) -> Reply {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Reply {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Register a device under a fixed, well-formed token and return its id.
    pub async fn device(&self, token: &str) -> Uuid {
        let reply = self.get("/circles/current", token).await;
        assert_eq!(reply.status, StatusCode::OK);
        self.token_device(token).unwrap()
    }

    /// Device currently stored for `token`, if any.
    pub fn token_device(&self, token: &str) -> Option<Uuid> {
        let id: Option<String> = self
            .state
            .db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT MAX(id) FROM devices WHERE token = ?1", [token], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        id.map(|id| id.parse().unwrap())
    }

    pub fn count_rows(&self, sql: &str, id: Uuid) -> i64 {
        self.state
            .db
            .with_conn(|conn| Ok(conn.query_row(sql, [id.to_string()], |row| row.get(0))?))
            .unwrap()
    }

    pub async fn join(&self, token: &str, mood: &str, interest: &str) -> Value {
        let reply = self
            .post("/circles/join", token, serde_json::json!({ "mood": mood, "interest": interest }))
            .await;
        assert_eq!(reply.status, StatusCode::OK, "join failed: {}", reply.body);
        reply.body
    }
}

pub fn circle_id(circle: &Value) -> Uuid {
    circle["id"].as_str().unwrap().parse().unwrap()
}

pub fn error_code(reply: &Reply) -> &str {
    reply.body["error"].as_str().unwrap_or_default()
}
