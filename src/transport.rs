use async_trait::async_trait;

use crate::errors::TransportError;
use crate::models::{Caller, Message, OutgoingMessage, RelationshipRecord, ThreadAddress};

/// Holder of the caller's bearer credential.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn credential(&self) -> Option<String>;

    /// Obtain a fresh credential, replacing the current one.
    async fn refresh(&self) -> Result<String, TransportError>;

    /// Drop the credential and require the user to sign in again.
    fn force_logout(&self);
}

/// Source of the caller's consumer ↔ supplier links.
#[async_trait]
pub trait RelationshipDirectory: Send + Sync {
    async fn relationships(&self, caller: &Caller) -> Result<Vec<RelationshipRecord>, TransportError>;

    /// Canonical identity of the organization the caller works for.
    async fn organization_identity(&self, caller: &Caller) -> Result<String, TransportError>;
}

/// Request/response access to message threads.
#[async_trait]
pub trait ThreadTransport: Send + Sync {
    /// The full thread, in server order.
    async fn fetch_thread(&self, address: &ThreadAddress) -> Result<Vec<Message>, TransportError>;

    /// Returns the stored copy with its server id and timestamp.
    async fn send_message(
        &self,
        address: &ThreadAddress,
        message: &OutgoingMessage,
    ) -> Result<Message, TransportError>;
}
