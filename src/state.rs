//! Shared application state handed to every handler.

use crate::config::Config;
use crate::gateway::ChapaClient;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub nats: Option<async_nats::Client>,
    pub config: Config,
    pub gateway: ChapaClient,
}
