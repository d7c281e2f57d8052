//! Conversation synchronization engine for a buyer–seller marketplace client.
//!
//! [`ConversationSync`] polls the active partner's thread, reconciles it
//! against what was last seen, decides when the view should follow the newest
//! message and echoes outgoing messages before the server confirms them.
//! Transport, relationship directory and session are supplied through the
//! traits in [`transport`]; [`api::HttpClient`] is a reqwest implementation.

pub mod api;
pub mod composer;
pub mod config;
pub mod errors;
pub mod models;
pub mod partners;
pub mod session;
pub mod sync;
pub mod transport;

pub use composer::Composer;
pub use config::{RunnerConfig, SyncConfig};
pub use errors::{ChatError, TransportError};
pub use models::{
    Attachment, Caller, CallerRole, Draft, Message, MessageKind, Partner, PartnerRole, Reference,
};
pub use partners::{Addressing, PartnerResolver, PartnerRoster, ResolvedPartners};
pub use session::BearerSession;
pub use sync::{
    ConversationEvent, ConversationHandle, ConversationSync, ScrollDirective, ScrollObserver,
    SyncPhase, ThreadUpdate, Viewport,
};
pub use transport::{RelationshipDirectory, SessionProvider, ThreadTransport};
