use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, config: AppConfig) -> Self {
        Self {
            pool,
            orm,
            config: Arc::new(config),
        }
    }

    pub fn mirror_enabled(&self) -> bool {
        self.config.mirror.is_some()
    }
}
