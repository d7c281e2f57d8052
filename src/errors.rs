use thiserror::Error;

/// Failure reported by an external collaborator (session, directory or thread
/// transport). Only the authorization case has engine-wide consequences.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Authorization rejected")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Parse error: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized)
    }
}

/// Top-level error surfaced by the conversation engine.
/// Cloneable so the same error can be both logged and handed to the view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    // ── Session ──────────────────────────────────────────────────────────────
    #[error("Session expired, re-authentication required")]
    AuthExpired,

    // ── Transport ────────────────────────────────────────────────────────────
    #[error("Failed to refresh conversation with '{partner_id}': {message}")]
    TransientFetch { partner_id: String, message: String },

    #[error("Failed to send message: {message}")]
    SendFailure { message: String },

    #[error("Failed to resolve chat partners: {message}")]
    ResolutionFailure { message: String },

    // ── Validation ───────────────────────────────────────────────────────────
    #[error("Message needs text, an attachment or a reference")]
    EmptyMessage,

    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Only the selling party can reference products")]
    ProductRefNotAllowed,

    // ── Lifecycle ────────────────────────────────────────────────────────────
    #[error("No active chat partner")]
    NoActivePartner,

    #[error("Conversation engine has stopped")]
    EngineStopped,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    pub fn fetch(partner_id: impl Into<String>, source: TransportError) -> Self {
        match source {
            TransportError::Unauthorized => ChatError::AuthExpired,
            other => ChatError::TransientFetch {
                partner_id: partner_id.into(),
                message: other.to_string(),
            },
        }
    }

    pub fn send(source: TransportError) -> Self {
        match source {
            TransportError::Unauthorized => ChatError::AuthExpired,
            other => ChatError::SendFailure { message: other.to_string() },
        }
    }

    pub fn resolution(source: TransportError) -> Self {
        match source {
            TransportError::Unauthorized => ChatError::AuthExpired,
            other => ChatError::ResolutionFailure { message: other.to_string() },
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ChatError::AuthExpired)
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyMessage
                | ChatError::EmptyField { .. }
                | ChatError::FieldTooLong { .. }
                | ChatError::ProductRefNotAllowed
        )
    }
}
