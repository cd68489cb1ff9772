use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::auth::SessionUser;
use crate::config::AppConfig;
use crate::events::ChangeEvent;
use crate::shared::utils::DbPool;

pub type SessionMap = Arc<RwLock<HashMap<String, SessionUser>>>;

#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub events: broadcast::Sender<ChangeEvent>,
    pub sessions: SessionMap,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            conn,
            config,
            events,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
