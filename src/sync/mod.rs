//! Conversation synchronization: poll loop, reconciliation, scroll anchoring
//! and optimistic echo for the active partner's thread.

pub mod scroll;
pub mod synchronizer;
pub mod thread;

pub use scroll::{ScrollAnchor, ScrollDirective, Viewport};
pub use synchronizer::{
    ConversationEvent, ConversationHandle, ConversationSync, ScrollObserver, SyncPhase, ThreadUpdate,
};
pub use thread::ThreadState;
