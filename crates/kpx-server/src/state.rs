use std::sync::Arc;

use kpx_config::KpxConfig;
use kpx_db::service::KpxService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub svc: Arc<KpxService>,
    pub config: Arc<KpxConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(svc: Arc<KpxService>, config: KpxConfig) -> Self {
        Self {
            svc,
            config: Arc::new(config),
        }
    }
}
