use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Relationships & partners ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Linked,
    Pending,
    Rejected,
    Blocked,
    NotLinked,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Linked => "linked",
            LinkStatus::Pending => "pending",
            LinkStatus::Rejected => "rejected",
            LinkStatus::Blocked => "blocked",
            LinkStatus::NotLinked => "not_linked",
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One consumer ↔ supplier link as reported by the relationship directory.
/// `supplier_id` is the organization's canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub consumer_id: String,
    pub consumer_name: String,
    pub supplier_id: String,
    pub supplier_name: String,
    pub status: LinkStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerRole {
    Consumer,
    Supplier,
}

/// The other party of a one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: String,
    pub display_name: String,
    pub role: PartnerRole,
}

impl Partner {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: PartnerRole) -> Self {
        Self { id: id.into(), display_name: display_name.into(), role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerRole {
    Consumer,
    SupplierOwner,
    /// Member of a supplier organization who does not own it.
    SupplierStaff,
}

impl CallerRole {
    pub fn is_seller(&self) -> bool {
        matches!(self, CallerRole::SupplierOwner | CallerRole::SupplierStaff)
    }
}

impl TryFrom<String> for CallerRole {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().to_lowercase().as_str() {
            "consumer" => Ok(CallerRole::Consumer),
            "owner" | "supplier_owner" => Ok(CallerRole::SupplierOwner),
            "staff" | "supplier_staff" => Ok(CallerRole::SupplierStaff),
            other => Err(format!("Unknown caller role: {other}")),
        }
    }
}

/// The signed-in user driving the conversation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: CallerRole,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: CallerRole) -> Self {
        Self { user_id: user_id.into(), role }
    }
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Attachment,
    Receipt,
    ProductRef,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Attachment => "attachment",
            MessageKind::Receipt => "receipt",
            MessageKind::ProductRef => "product_ref",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local-only delivery marker. Everything the server returns is `Confirmed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryState {
    #[default]
    Confirmed,
    Pending,
    Failed,
}

/// Server-side handle to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub name: String,
    /// Absent on an optimistic echo, before the upload is confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub kind: MessageKind,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_ref: Option<String>,

    /// Derived from `sender_id` against the caller's own identity.
    #[serde(skip)]
    pub is_own: bool,
    #[serde(skip)]
    pub delivery: DeliveryState,
}

impl Message {
    /// Plain text message as the server would return it.
    pub fn text(id: impl Into<String>, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: Some(text.into()),
            kind: MessageKind::Text,
            sender_id: sender_id.into(),
            timestamp: Utc::now(),
            attachment: None,
            order_ref: None,
            product_ref: None,
            is_own: false,
            delivery: DeliveryState::Confirmed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }
}

// ── Outgoing payloads ────────────────────────────────────────────────────────

/// File chosen in the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }
}

/// Pointer to an existing order or product. One per message at most.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Receipt { order_id: String },
    Product { product_id: String },
}

/// Composer contents. Handed back untouched when a send fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<Attachment>,
    pub reference: Option<Reference>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_receipt(mut self, order_id: impl Into<String>) -> Self {
        self.reference = Some(Reference::Receipt { order_id: order_id.into() });
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.reference = Some(Reference::Product { product_id: product_id.into() });
        self
    }
}

/// Where a thread lives on the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadAddress {
    pub key: String,
    /// Set when `key` is an organization rather than the partner itself.
    pub counterpart_id: Option<String>,
}

/// Encoded send payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip)]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterpart_id: Option<String>,
}
