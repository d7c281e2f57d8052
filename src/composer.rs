use chrono::Utc;
use uuid::Uuid;

use crate::errors::ChatError;
use crate::models::{
    AttachmentRef, CallerRole, DeliveryState, Draft, Message, MessageKind, OutgoingMessage, Reference,
    ThreadAddress,
};

pub const LOCAL_ID_PREFIX: &str = "local-";

/// Validates composer drafts and encodes them into outgoing payloads.
#[derive(Debug, Clone)]
pub struct Composer {
    role: CallerRole,
    max_text_length: usize,
}

impl Composer {
    pub fn new(role: CallerRole, max_text_length: usize) -> Self {
        Self { role, max_text_length }
    }

    /// Rejects a draft before any request is made.
    pub fn validate(&self, draft: &Draft) -> Result<(), ChatError> {
        let text = draft.text.trim();
        if text.is_empty() && draft.attachment.is_none() && draft.reference.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        let length = text.chars().count();
        if length > self.max_text_length {
            return Err(ChatError::FieldTooLong {
                field_name: "text".to_string(),
                max_length: self.max_text_length,
                actual_length: length,
            });
        }
        if let Some(attachment) = &draft.attachment {
            if attachment.name.trim().is_empty() {
                return Err(ChatError::EmptyField { field_name: "attachment name".to_string() });
            }
        }
        if matches!(draft.reference, Some(Reference::Product { .. })) && !self.role.is_seller() {
            return Err(ChatError::ProductRefNotAllowed);
        }
        Ok(())
    }

    pub fn compose(&self, draft: &Draft, address: &ThreadAddress) -> Result<OutgoingMessage, ChatError> {
        self.validate(draft)?;

        let text = Some(draft.text.trim().to_string()).filter(|t| !t.is_empty());
        let (kind, order_ref, product_ref) = match &draft.reference {
            Some(Reference::Receipt { order_id }) => (MessageKind::Receipt, Some(order_id.clone()), None),
            Some(Reference::Product { product_id }) => {
                (MessageKind::ProductRef, None, Some(product_id.clone()))
            }
            None if draft.attachment.is_some() => (MessageKind::Attachment, None, None),
            None => (MessageKind::Text, None, None),
        };

        Ok(OutgoingMessage {
            kind,
            text,
            attachment: draft.attachment.clone(),
            order_ref,
            product_ref,
            counterpart_id: address.counterpart_id.clone(),
        })
    }

    /// Local stand-in rendered until the server's copy shows up.
    pub fn echo(&self, outgoing: &OutgoingMessage, own_identity: &str) -> Message {
        Message {
            id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
            text: outgoing.text.clone(),
            kind: outgoing.kind,
            sender_id: own_identity.to_string(),
            timestamp: Utc::now(),
            attachment: outgoing
                .attachment
                .as_ref()
                .map(|a| AttachmentRef { name: a.name.clone(), url: None }),
            order_ref: outgoing.order_ref.clone(),
            product_ref: outgoing.product_ref.clone(),
            is_own: true,
            delivery: DeliveryState::Pending,
        }
    }
}
