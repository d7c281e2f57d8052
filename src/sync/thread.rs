use std::collections::HashSet;

use tracing::warn;

use crate::models::{DeliveryState, Message};

/// Rendered thread of the active partner plus the bookkeeping needed to tell
/// new activity apart from a no-op refresh.
#[derive(Debug, Default)]
pub struct ThreadState {
    messages: Vec<Message>,
    seen: HashSet<String>,
    loaded: bool,
}

impl ThreadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn seen_ids(&self) -> &HashSet<String> {
        &self.seen
    }

    /// True until the first successful fetch for this partner lands.
    pub fn awaiting_first_load(&self) -> bool {
        !self.loaded
    }

    /// Replaces the thread with a fetched list, verbatim and in server order.
    ///
    /// Returns `has_new`: whether the list carries an id the previous fetch did
    /// not. The first load always reports new activity.
    pub fn reconcile(&mut self, fetched: Vec<Message>, own_identity: &str) -> bool {
        let first = !self.loaded;
        let ids: HashSet<String> = fetched.iter().map(|m| m.id.clone()).collect();
        if ids.len() != fetched.len() {
            warn!("Fetched thread carries duplicate message ids ({} unique of {})", ids.len(), fetched.len());
        }

        let has_new = first || ids.iter().any(|id| !self.seen.contains(id));

        self.messages = fetched
            .into_iter()
            .map(|mut m| {
                m.is_own = m.sender_id == own_identity;
                m.delivery = DeliveryState::Confirmed;
                m
            })
            .collect();
        self.seen = ids;
        self.loaded = true;
        has_new
    }

    /// Appends an unconfirmed local copy of a message being sent.
    pub fn push_echo(&mut self, mut echo: Message) {
        echo.is_own = true;
        echo.delivery = DeliveryState::Pending;
        self.messages.push(echo);
    }

    /// Swaps the echo for the server's copy. If a fetch already dropped the
    /// echo without carrying the server copy, the copy is appended instead.
    /// The Seen-Id Set is left to the next fetch.
    pub fn confirm_echo(&mut self, local_id: &str, mut confirmed: Message) -> bool {
        if self.messages.iter().any(|m| m.id == confirmed.id) {
            let before = self.messages.len();
            self.messages.retain(|m| m.id != local_id);
            return self.messages.len() != before;
        }
        confirmed.is_own = true;
        confirmed.delivery = DeliveryState::Confirmed;
        match self.messages.iter_mut().find(|m| m.id == local_id) {
            Some(slot) => *slot = confirmed,
            None => self.messages.push(confirmed),
        }
        true
    }

    pub fn fail_echo(&mut self, local_id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == local_id) {
            Some(slot) => {
                slot.delivery = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }
}
