use std::sync::Arc;

use crate::auth::{CredentialCodec, TokenService};
use crate::config::AppConfig;
use crate::database::Persistence;

/// Shared handler state. Everything here is fixed after startup; the store
/// handles its own synchronisation.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub credentials: CredentialCodec,
    pub store: Arc<dyn Persistence>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Persistence>) -> Self {
        let tokens = TokenService::from_config(&config.security);
        let credentials = CredentialCodec::new(config.security.bcrypt_cost);
        Self {
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            credentials,
            store,
        }
    }
}
