pub mod abuse;
pub mod circles;
pub mod config;
pub mod device;
pub mod error;
pub mod identity;
pub mod letters;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod reactions;
pub mod realtime;
pub mod reaper;
pub mod router;
pub mod state;
pub mod typing;

pub use router::build_router;
pub use state::{AppState, AppStateInner};
