use lastbasket_core::{ActorRole, UserId};

/// Authenticated request principal.
///
/// Identity resolution happens upstream (the auth collaborator); middleware
/// only translates its headers into this context. Must be present for all
/// domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Principal {
    actor_id: UserId,
    role: ActorRole,
}

impl Principal {
    pub fn new(actor_id: UserId, role: ActorRole) -> Self {
        Self { actor_id, role }
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    /// Dealer-facing routes also accept the system role (ops tooling).
    pub fn is_dealer(&self) -> bool {
        matches!(self.role, ActorRole::Dealer | ActorRole::System)
    }

    pub fn is_client(&self) -> bool {
        matches!(self.role, ActorRole::Client | ActorRole::System)
    }
}
