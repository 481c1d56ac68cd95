use std::sync::Arc;

use crate::service::LocalBroker;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<LocalBroker>,
    pub auth_token: Arc<String>,
}

impl AppState {
    pub fn new(broker: Arc<LocalBroker>, auth_token: String) -> Self {
        Self {
            broker,
            auth_token: Arc::new(auth_token),
        }
    }
}
