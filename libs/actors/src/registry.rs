//! Actor Registry
//!
//! Address resolution tables owned by one actor system: local actors keyed
//! by local address, and remote actor systems keyed by the name they
//! announced in their handshake. Both tables are per-instance so several
//! systems can share a process without interfering.

use crate::mailbox::Mailbox;
use crate::transport::Channel;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry entry for a local actor
#[derive(Debug, Clone)]
pub(crate) struct ActorCell {
    pub mailbox: Mailbox,
    pub actor_type: &'static str,
}

/// Local and remote resolution tables
#[derive(Default)]
pub(crate) struct ActorRegistry {
    /// Local actors (same system)
    local_actors: RwLock<HashMap<String, ActorCell>>,

    /// Remote actor systems reachable through a channel
    remote_systems: RwLock<HashMap<String, Arc<dyn Channel>>>,

    /// Channels this system listens on, named or not
    attached_channels: RwLock<Vec<AttachedChannel>>,
}

struct AttachedChannel {
    channel: Arc<dyn Channel>,
    /// `register`ed, so the handshake repeats on reconnect
    announced: bool,
}

fn same_channel(a: &Arc<dyn Channel>, b: &Arc<dyn Channel>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local actor, returning the entry it replaced
    pub fn register_actor(&self, local_address: &str, cell: ActorCell) -> Option<ActorCell> {
        debug!("Registering local actor: {}", local_address);
        let previous = self
            .local_actors
            .write()
            .insert(local_address.to_string(), cell);

        if previous.is_some() {
            warn!(
                "Local actor {} re-created; previous instance will stop",
                local_address
            );
        }
        previous
    }

    pub fn find_actor(&self, local_address: &str) -> Option<ActorCell> {
        self.local_actors.read().get(local_address).cloned()
    }

    pub fn list_local_actors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.local_actors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every local entry, closing their mailboxes
    pub fn clear_local(&self) -> usize {
        let mut actors = self.local_actors.write();
        let count = actors.len();
        actors.clear();
        count
    }

    /// Bind `channel` to `system_name`
    ///
    /// A channel is registered under at most one name: any other name the
    /// same channel was bound to is released first.
    pub fn register_remote(&self, system_name: &str, channel: Arc<dyn Channel>) {
        let mut remotes = self.remote_systems.write();

        let stale: Vec<String> = remotes
            .iter()
            .filter(|(name, existing)| name.as_str() != system_name && same_channel(existing, &channel))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            debug!("Channel re-announced; releasing remote system {}", name);
            remotes.remove(&name);
        }

        if let Some(previous) = remotes.insert(system_name.to_string(), channel.clone()) {
            if !same_channel(&previous, &channel) {
                warn!("Remote system {} moved to a new channel", system_name);
            }
        }
    }

    pub fn find_remote(&self, system_name: &str) -> Option<Arc<dyn Channel>> {
        self.remote_systems.read().get(system_name).cloned()
    }

    /// Forget every remote system bound to `channel`
    pub fn remove_channel(&self, channel: &Arc<dyn Channel>) -> Vec<String> {
        let mut remotes = self.remote_systems.write();
        let names: Vec<String> = remotes
            .iter()
            .filter(|(_, existing)| same_channel(existing, channel))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            remotes.remove(name);
        }
        names
    }

    pub fn list_remote_systems(&self) -> Vec<String> {
        let mut names: Vec<String> = self.remote_systems.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Keep `channel` alive for as long as this system listens on it.
    /// Returns false when the channel was already attached.
    pub fn attach_channel(&self, channel: Arc<dyn Channel>) -> bool {
        let mut attached = self.attached_channels.write();
        if attached
            .iter()
            .any(|existing| same_channel(&existing.channel, &channel))
        {
            return false;
        }
        attached.push(AttachedChannel {
            channel,
            announced: false,
        });
        true
    }

    /// Flag an attached channel as announced. Returns false when it already was.
    pub fn mark_announced(&self, channel: &Arc<dyn Channel>) -> bool {
        let mut attached = self.attached_channels.write();
        match attached
            .iter_mut()
            .find(|existing| same_channel(&existing.channel, channel))
        {
            Some(entry) if !entry.announced => {
                entry.announced = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear_remote(&self) {
        self.remote_systems.write().clear();
        self.attached_channels.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::memory::MemoryChannel;

    fn cell(name: &str) -> (ActorCell, crate::mailbox::MailboxReceiver) {
        let (mailbox, receiver) = Mailbox::new(Address::new("S", name), |_| false, 16);
        (
            ActorCell {
                mailbox,
                actor_type: "TestActor",
            },
            receiver,
        )
    }

    #[test]
    fn test_registry_local_actor() {
        let registry = ActorRegistry::new();
        let (entry, _receiver) = cell("echo");

        assert!(registry.register_actor("echo", entry).is_none());
        assert!(registry.find_actor("echo").is_some());
        assert!(registry.find_actor("missing").is_none());
        assert_eq!(registry.list_local_actors(), vec!["echo".to_string()]);

        let (replacement, _receiver2) = cell("echo");
        assert!(registry.register_actor("echo", replacement).is_some());
        assert_eq!(registry.list_local_actors().len(), 1);

        assert_eq!(registry.clear_local(), 1);
        assert!(registry.find_actor("echo").is_none());
    }

    #[test]
    fn test_channel_registered_under_one_name() {
        let registry = ActorRegistry::new();
        let (left, right) = MemoryChannel::pair();
        let left: Arc<dyn Channel> = left;
        let right: Arc<dyn Channel> = right;

        registry.register_remote("B", left.clone());
        registry.register_remote("C", right.clone());
        assert_eq!(registry.list_remote_systems(), vec!["B", "C"]);

        // same channel announces a new name
        registry.register_remote("B2", left.clone());
        assert_eq!(registry.list_remote_systems(), vec!["B2", "C"]);
        assert!(registry.find_remote("B").is_none());

        let removed = registry.remove_channel(&left);
        assert_eq!(removed, vec!["B2".to_string()]);
        assert_eq!(registry.list_remote_systems(), vec!["C"]);
    }

    #[test]
    fn test_channel_attached_once() {
        let registry = ActorRegistry::new();
        let (left, _right) = MemoryChannel::pair();
        let left: Arc<dyn Channel> = left;

        assert!(!registry.mark_announced(&left));
        assert!(registry.attach_channel(left.clone()));
        assert!(!registry.attach_channel(left.clone()));

        assert!(registry.mark_announced(&left));
        assert!(!registry.mark_announced(&left));

        registry.clear_remote();
        assert!(registry.attach_channel(left));
    }
}
