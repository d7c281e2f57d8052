use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::errors::ChatError;
use crate::models::{
    Caller, CallerRole, LinkStatus, Partner, PartnerRole, RelationshipRecord, ThreadAddress,
};
use crate::transport::{RelationshipDirectory, SessionProvider};

/// How the caller addresses threads on the transport.
///
/// Consumers and organization owners talk to a partner directly. Staff who do
/// not own the organization speak through the organization's identity and
/// name the consumer explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Direct { own_id: String },
    Organization { organization_id: String, staff_id: String },
}

impl Addressing {
    pub fn thread_address(&self, partner: &Partner) -> ThreadAddress {
        match self {
            Addressing::Direct { .. } => ThreadAddress { key: partner.id.clone(), counterpart_id: None },
            Addressing::Organization { organization_id, .. } => ThreadAddress {
                key: organization_id.clone(),
                counterpart_id: Some(partner.id.clone()),
            },
        }
    }

    /// Sender id the server stamps on messages the caller sends.
    pub fn own_identity(&self) -> &str {
        match self {
            Addressing::Direct { own_id } => own_id,
            Addressing::Organization { organization_id, .. } => organization_id,
        }
    }
}

/// Output of one partner resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPartners {
    pub partners: Vec<Partner>,
    pub addressing: Addressing,
}

/// Turns the caller's relationship records into addressable chat partners.
#[derive(Clone)]
pub struct PartnerResolver {
    directory: Arc<dyn RelationshipDirectory>,
    session: Arc<dyn SessionProvider>,
}

impl PartnerResolver {
    pub fn new(directory: Arc<dyn RelationshipDirectory>, session: Arc<dyn SessionProvider>) -> Self {
        Self { directory, session }
    }

    pub async fn resolve(&self, caller: &Caller) -> Result<ResolvedPartners, ChatError> {
        let records = self.directory.relationships(caller).await.map_err(|e| {
            error!("Failed to fetch relationships for {}: {e}", caller.user_id);
            self.fail(ChatError::resolution(e))
        })?;

        let addressing = match caller.role {
            CallerRole::Consumer | CallerRole::SupplierOwner => {
                Addressing::Direct { own_id: caller.user_id.clone() }
            }
            CallerRole::SupplierStaff => {
                let organization_id =
                    self.directory.organization_identity(caller).await.map_err(|e| {
                        error!("Failed to resolve organization of {}: {e}", caller.user_id);
                        self.fail(ChatError::resolution(e))
                    })?;
                Addressing::Organization { organization_id, staff_id: caller.user_id.clone() }
            }
        };

        let partners = linked_partners(caller.role, &records);
        debug!(
            "Resolved {} partners from {} relationships for {}",
            partners.len(),
            records.len(),
            caller.user_id
        );
        Ok(ResolvedPartners { partners, addressing })
    }

    fn fail(&self, err: ChatError) -> ChatError {
        if err.is_auth_expired() {
            self.session.force_logout();
        }
        err
    }
}

/// Linked counterparts in directory order, first occurrence wins.
pub fn linked_partners(role: CallerRole, records: &[RelationshipRecord]) -> Vec<Partner> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| r.status == LinkStatus::Linked)
        .map(|r| match role {
            CallerRole::Consumer => Partner::new(&r.supplier_id, &r.supplier_name, PartnerRole::Supplier),
            CallerRole::SupplierOwner | CallerRole::SupplierStaff => {
                Partner::new(&r.consumer_id, &r.consumer_name, PartnerRole::Consumer)
            }
        })
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

/// Latest partner list shown to the caller.
///
/// Every refresh is a full recompute; on failure the list is emptied rather
/// than left stale.
#[derive(Debug, Default)]
pub struct PartnerRoster {
    partners: Vec<Partner>,
    addressing: Option<Addressing>,
    error: Option<ChatError>,
}

impl PartnerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refresh(
        &mut self,
        resolver: &PartnerResolver,
        caller: &Caller,
    ) -> Result<&[Partner], ChatError> {
        match resolver.resolve(caller).await {
            Ok(resolved) => {
                info!("Partner list refreshed: {} linked", resolved.partners.len());
                self.partners = resolved.partners;
                self.addressing = Some(resolved.addressing);
                self.error = None;
                Ok(&self.partners)
            }
            Err(e) => {
                self.partners.clear();
                self.addressing = None;
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn partners(&self) -> &[Partner] {
        &self.partners
    }

    pub fn addressing(&self) -> Option<&Addressing> {
        self.addressing.as_ref()
    }

    pub fn error(&self) -> Option<&ChatError> {
        self.error.as_ref()
    }

    pub fn find(&self, partner_id: &str) -> Option<&Partner> {
        self.partners.iter().find(|p| p.id == partner_id)
    }
}
