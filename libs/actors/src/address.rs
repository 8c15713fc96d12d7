//! Actor Addresses
//!
//! Location-transparent actor identifiers. An address names the actor system
//! that owns the actor plus the actor's local name inside that system; the
//! same value is used for local and remote resolution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor address: `{actorSystemName, localAddress}` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub actor_system_name: String,
    pub local_address: String,
}

impl Address {
    pub fn new(actor_system_name: impl Into<String>, local_address: impl Into<String>) -> Self {
        Self {
            actor_system_name: actor_system_name.into(),
            local_address: local_address.into(),
        }
    }

    pub fn actor_system_name(&self) -> &str {
        &self.actor_system_name
    }

    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    /// True if this address names an actor owned by `system_name`
    pub fn belongs_to(&self, system_name: &str) -> bool {
        self.actor_system_name == system_name
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.actor_system_name, self.local_address)
    }
}

impl From<&Address> for Address {
    fn from(address: &Address) -> Self {
        address.clone()
    }
}
