//! Actor roles resolved by the external authentication collaborator.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Role an actor holds when invoking the core.
///
/// Identity and role are established by the session provider before a
/// request reaches the domain; the domain only enforces what each role may
/// do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Reserves baskets and drives cancellations of their own orders.
    Client,
    /// Owns baskets and drives order fulfillment.
    Dealer,
    /// Internal/admin automation (refunds, sweeps).
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Client => "client",
            ActorRole::Dealer => "dealer",
            ActorRole::System => "system",
        }
    }
}

impl core::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(ActorRole::Client),
            "dealer" => Ok(ActorRole::Dealer),
            "system" => Ok(ActorRole::System),
            other => Err(DomainError::validation(format!("unknown actor role: {other}"))),
        }
    }
}
