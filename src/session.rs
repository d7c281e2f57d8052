use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::TransportError;
use crate::transport::SessionProvider;

/// Session backed by a single pre-issued bearer token.
///
/// There is no refresh endpoint behind it, so `refresh` only succeeds while a
/// token is still held. `force_logout` clears it for good.
#[derive(Debug, Default)]
pub struct BearerSession {
    token: RwLock<Option<String>>,
    logged_out: AtomicBool,
}

impl BearerSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: RwLock::new(Some(token.into())), logged_out: AtomicBool::new(false) }
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for BearerSession {
    fn credential(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    async fn refresh(&self) -> Result<String, TransportError> {
        // A static token cannot be renewed; hand it back so the caller retries once.
        self.credential().ok_or(TransportError::Unauthorized)
    }

    fn force_logout(&self) {
        warn!("Session credentials cleared, sign-in required");
        if let Ok(mut token) = self.token.write() {
            *token = None;
        }
        self.logged_out.store(true, Ordering::SeqCst);
    }
}
