use std::sync::Arc;

use tracing::error;

use kindred_db::Database;
use kindred_gateway::Dispatcher;
use kindred_types::events::{CircleEvent, circle_channel};

use crate::config::Settings;
use crate::error::ApiError;
use crate::moderation::Moderator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub settings: Settings,
    pub moderator: Moderator,
}

impl AppStateInner {
    pub fn new(db: Database, dispatcher: Dispatcher, settings: Settings, moderator: Moderator) -> AppState {
        Arc::new(Self {
            db,
            dispatcher,
            settings,
            moderator,
        })
    }

    /// Push an event to every viewer of the circle.
    pub fn publish(&self, event: CircleEvent) -> usize {
        self.dispatcher.publish(&circle_channel(event.circle_id()), &event)
    }
}

/// Run blocking DB work off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::from)
}
