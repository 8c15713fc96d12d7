//! Actor System Core
//!
//! The system owns the local actor registry, the remote-system registry and
//! every routing decision. Dispatch is decided by the target address alone:
//!
//! ```text
//! target.actor_system_name == self.name ──▶ local mailbox  (or ActorNotFound)
//!                 otherwise            ──▶ remote channel (or ActorSystemNotFound)
//! ```
//!
//! Routing never retries and never queues messages for actors or systems that
//! do not exist yet.
//!
//! `ActorSystem` is a cheap handle around shared state; clones address the
//! same registries. Several systems may coexist in one process. Running actors
//! keep their system alive, so call [`ActorSystem::shutdown`] to stop them.

use crate::actor::{Actor, Context};
use crate::address::Address;
use crate::composer::MessageComposer;
use crate::config::ActorSystemConfig;
use crate::error::{ActorError, Result};
use crate::mailbox::{ActorTask, Mailbox, MailboxStats, ReplyFuture};
use crate::messages::{Envelope, Mode, Reply, WireMessage};
use crate::reference::{ActorRef, TypedRef};
use crate::registry::{ActorCell, ActorRegistry};
use crate::transport::{Ack, Channel};
use futures::future::{self, FutureExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// System-wide counters
#[derive(Debug, Default)]
pub(crate) struct SystemMetrics {
    actors_created: AtomicU64,
    messages_processed: AtomicU64,
    total_processing_time_ns: AtomicU64,
    handler_failures: AtomicU64,
    remote_envelopes_sent: AtomicU64,
    remote_envelopes_received: AtomicU64,
    unrouted_dropped: AtomicU64,
}

impl SystemMetrics {
    pub fn record_actor_created(&self) {
        self.actors_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_handled(&self, duration: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_sent(&self) {
        self.remote_envelopes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_received(&self) {
        self.remote_envelopes_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.unrouted_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SystemStats {
        let messages_processed = self.messages_processed.load(Ordering::Relaxed);
        let total = self.total_processing_time_ns.load(Ordering::Relaxed);
        SystemStats {
            actors_created: self.actors_created.load(Ordering::Relaxed),
            messages_processed,
            avg_processing_time_ns: if messages_processed == 0 {
                0.0
            } else {
                total as f64 / messages_processed as f64
            },
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            remote_envelopes_sent: self.remote_envelopes_sent.load(Ordering::Relaxed),
            remote_envelopes_received: self.remote_envelopes_received.load(Ordering::Relaxed),
            unrouted_dropped: self.unrouted_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a system's counters
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStats {
    pub actors_created: u64,
    pub messages_processed: u64,
    pub avg_processing_time_ns: f64,
    /// Failed handlers, asks and tells alike
    pub handler_failures: u64,
    pub remote_envelopes_sent: u64,
    pub remote_envelopes_received: u64,
    /// Remote envelopes whose target did not exist here
    pub unrouted_dropped: u64,
}

struct SystemInner {
    name: String,
    config: ActorSystemConfig,
    registry: ActorRegistry,
    metrics: Arc<SystemMetrics>,
}

/// Core actor system managing actor lifecycles and routing
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.inner.name)
            .field("actors", &self.inner.registry.list_local_actors())
            .field("remote_systems", &self.inner.registry.list_remote_systems())
            .finish()
    }
}

/// Non-owning handle, used by channel callbacks
#[derive(Clone)]
pub(crate) struct WeakActorSystem {
    inner: Weak<SystemInner>,
}

impl WeakActorSystem {
    pub fn upgrade(&self) -> Option<ActorSystem> {
        self.inner.upgrade().map(|inner| ActorSystem { inner })
    }
}

impl ActorSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(ActorSystemConfig::named(name))
    }

    /// Create a system from configuration; an unset name gets a random one
    pub fn with_config(config: ActorSystemConfig) -> Self {
        let name = config.resolve_name();
        info!(
            system = %name,
            mailbox_high_water_mark = config.mailbox_high_water_mark,
            "Actor system created"
        );

        Self {
            inner: Arc::new(SystemInner {
                name,
                config,
                registry: ActorRegistry::new(),
                metrics: Arc::new(SystemMetrics::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ActorSystemConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> SystemStats {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn counters(&self) -> &Arc<SystemMetrics> {
        &self.inner.metrics
    }

    pub(crate) fn registry(&self) -> &ActorRegistry {
        &self.inner.registry
    }

    pub(crate) fn downgrade(&self) -> WeakActorSystem {
        WeakActorSystem {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Create and start an actor addressed `{self.name, name}`
    ///
    /// Re-using a name replaces the registry entry; the previous instance
    /// drains what is already queued and stops.
    pub fn create_actor<A: Actor>(&self, name: impl Into<String>, actor: A) -> TypedRef<A> {
        let name = name.into();
        let address = Address::new(self.name(), name.clone());
        let actor_type = std::any::type_name::<A>();

        let (mailbox, receiver) = Mailbox::new(
            address.clone(),
            A::preempts,
            self.inner.config.mailbox_high_water_mark,
        );
        let context = Context::new(name.clone(), address.clone(), self.clone());
        let task = ActorTask::new(actor, receiver, context, self.inner.metrics.clone());

        self.inner
            .registry
            .register_actor(&name, ActorCell { mailbox, actor_type });
        self.inner.metrics.record_actor_created();
        tokio::spawn(task.run());

        debug!(
            system = %self.name(),
            actor = %address,
            actor_type,
            "Actor created"
        );

        self.reference(address).class_type::<A>()
    }

    /// Untyped reference to any address, local or remote
    pub fn reference(&self, address: Address) -> ActorRef {
        ActorRef::new(address, self.clone())
    }

    /// Reference to a registered local actor
    pub fn find_actor(&self, address: &Address) -> Option<ActorRef> {
        self.resolve_local(address)
            .map(|cell| self.reference(cell.mailbox.address().clone()))
    }

    pub fn is_local_address(&self, address: &Address) -> bool {
        address.belongs_to(self.name())
    }

    /// Rust type name of a registered local actor
    pub fn actor_type(&self, address: &Address) -> Option<&'static str> {
        self.resolve_local(address).map(|cell| cell.actor_type)
    }

    pub fn mailbox_stats(&self, address: &Address) -> Option<MailboxStats> {
        self.resolve_local(address).map(|cell| cell.mailbox.stats())
    }

    /// Local addresses of every registered actor, sorted
    pub fn actor_names(&self) -> Vec<String> {
        self.inner.registry.list_local_actors()
    }

    /// Names of every remote system with a live channel, sorted
    pub fn remote_systems(&self) -> Vec<String> {
        self.inner.registry.list_remote_systems()
    }

    pub fn compose(&self) -> MessageComposer {
        MessageComposer::new(self.clone())
    }

    pub(crate) fn resolve_local(&self, address: &Address) -> Option<ActorCell> {
        if !self.is_local_address(address) {
            return None;
        }
        self.inner.registry.find_actor(address.local_address())
    }

    /// Ask `target` and settle with the handler's result
    ///
    /// Routing happens before this returns, so two asks issued in order are
    /// enqueued in order even if their futures are polled out of order.
    pub fn send_message(
        &self,
        target: &Address,
        message_type: &str,
        payload: Value,
        sender: Option<Address>,
    ) -> ReplyFuture {
        self.trace_dispatch(Mode::Ask, target, message_type, &payload);

        if self.is_local_address(target) {
            let Some(cell) = self.inner.registry.find_actor(target.local_address()) else {
                warn!(system = %self.name(), target = %target, "Unable to find local actor");
                return future::ready(Err(ActorError::actor_not_found(target.clone()))).boxed();
            };
            return match cell.mailbox.push_question(message_type, payload, sender) {
                Ok(pending) => pending,
                Err(e) => future::ready(Err(e)).boxed(),
            };
        }

        let channel = match self.find_channel(target) {
            Ok(channel) => channel,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        self.ask_remote(channel, target, message_type, payload, sender)
    }

    /// Fire-and-forget delivery to `target`
    ///
    /// Routing failures are returned; handler failures are only logged by the
    /// receiving actor.
    pub fn tell(
        &self,
        target: &Address,
        message_type: &str,
        payload: Value,
        sender: Option<Address>,
    ) -> Result<()> {
        self.trace_dispatch(Mode::Send, target, message_type, &payload);

        if self.is_local_address(target) {
            let cell = self
                .inner
                .registry
                .find_actor(target.local_address())
                .ok_or_else(|| {
                    warn!(system = %self.name(), target = %target, "Unable to find local actor");
                    ActorError::actor_not_found(target.clone())
                })?;
            return cell.mailbox.push(message_type, payload, sender);
        }

        let channel = self.find_channel(target)?;
        let wire = serde_json::to_value(WireMessage::envelope(
            Mode::Send,
            Envelope {
                message_type: message_type.to_string(),
                payload,
                target_address: target.clone(),
                sender_address: sender,
            },
        ))?;
        channel.emit(wire, None)?;
        self.inner.metrics.record_remote_sent();
        Ok(())
    }

    fn find_channel(&self, target: &Address) -> Result<Arc<dyn Channel>> {
        self.inner
            .registry
            .find_remote(target.actor_system_name())
            .ok_or_else(|| {
                warn!(
                    system = %self.name(),
                    remote_system = %target.actor_system_name(),
                    "Unable to find remote actor system"
                );
                ActorError::actor_system_not_found(target.actor_system_name())
            })
    }

    fn ask_remote(
        &self,
        channel: Arc<dyn Channel>,
        target: &Address,
        message_type: &str,
        payload: Value,
        sender: Option<Address>,
    ) -> ReplyFuture {
        let wire = WireMessage::envelope(
            Mode::Ask,
            Envelope {
                message_type: message_type.to_string(),
                payload,
                target_address: target.clone(),
                sender_address: sender,
            },
        );
        let wire = match serde_json::to_value(wire) {
            Ok(wire) => wire,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let ack: Ack = Box::new(move |value: Value| {
            let result = serde_json::from_value::<Reply>(value)
                .map_err(|e| ActorError::codec_with_source("Malformed acknowledgement", e))
                .and_then(Reply::into_result);
            // the asker may have stopped waiting
            let _ = reply_tx.send(result);
        });

        if let Err(e) = channel.emit(wire, Some(ack)) {
            return future::ready(Err(e)).boxed();
        }
        self.inner.metrics.record_remote_sent();

        let target = target.clone();
        async move {
            reply_rx.await.unwrap_or_else(|_| {
                Err(ActorError::channel(format!(
                    "acknowledgement for {} was dropped",
                    target
                )))
            })
        }
        .boxed()
    }

    fn trace_dispatch(&self, mode: Mode, target: &Address, message_type: &str, payload: &Value) {
        if self.inner.config.log_payloads {
            debug!(
                system = %self.name(),
                mode = ?mode,
                target = %target,
                message_type,
                payload = %payload,
                "Dispatching message"
            );
        } else {
            debug!(
                system = %self.name(),
                mode = ?mode,
                target = %target,
                message_type,
                "Dispatching message"
            );
        }
    }

    /// Close every mailbox and forget every remote system
    ///
    /// Actors finish what is already queued, run their `stopped` hook and
    /// exit. Pending asks to them still settle.
    pub fn shutdown(&self) {
        let actors = self.inner.registry.clear_local();
        self.inner.registry.clear_remote();
        info!(system = %self.name(), actors, "Actor system shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::reply;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "camelCase")]
    enum CounterMessage {
        Add(i64),
        Get,
    }

    #[derive(Default)]
    struct Counter {
        total: i64,
    }

    #[async_trait]
    impl Actor for Counter {
        type Message = CounterMessage;

        async fn handle(&mut self, msg: CounterMessage, _ctx: &mut Context) -> Result<Value> {
            match msg {
                CounterMessage::Add(n) => {
                    self.total += n;
                    reply(self.total)
                }
                CounterMessage::Get => reply(self.total),
            }
        }
    }

    #[tokio::test]
    async fn test_local_routing() {
        let system = ActorSystem::new("S");
        let counter = system.create_actor("counter", Counter::default());
        let address = counter.address().clone();

        system.tell(&address, "add", json!(2), None).unwrap();
        let total = system.send_message(&address, "add", json!(3), None).await.unwrap();
        assert_eq!(total, json!(5));

        assert_eq!(system.actor_names(), vec!["counter".to_string()]);
        assert!(system.find_actor(&address).is_some());
        assert!(system.actor_type(&address).unwrap().ends_with("Counter"));

        let stats = system.metrics();
        assert_eq!(stats.actors_created, 1);
        assert_eq!(stats.messages_processed, 2);
    }

    #[tokio::test]
    async fn test_unbounded_high_water_mark() {
        let system = ActorSystem::with_config(ActorSystemConfig {
            name: Some("S".to_string()),
            mailbox_high_water_mark: usize::MAX,
            ..ActorSystemConfig::default()
        });
        let counter = system.create_actor("counter", Counter::default());
        let address = counter.address().clone();

        system.tell(&address, "add", json!(5), None).unwrap();
        let total = system.send_message(&address, "get", json!(null), None).await;
        assert_eq!(total.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn test_routing_failures() {
        let system = ActorSystem::new("S");

        let missing = Address::new("S", "nobody");
        let err = system.send_message(&missing, "get", Value::Null, None).await.unwrap_err();
        assert!(matches!(err, ActorError::ActorNotFound { .. }));
        assert!(system.find_actor(&missing).is_none());

        let elsewhere = Address::new("Other", "counter");
        let err = system.tell(&elsewhere, "get", Value::Null, None).unwrap_err();
        assert!(matches!(err, ActorError::ActorSystemNotFound { ref name } if name == "Other"));

        // same local name in another system is not local
        system.create_actor("counter", Counter::default());
        assert!(system.find_actor(&elsewhere).is_none());
    }

    #[tokio::test]
    async fn test_recreate_replaces_entry() {
        let system = ActorSystem::new("S");
        let first = system.create_actor("counter", Counter::default());
        first.untyped().tell("add", 10).unwrap();

        system.create_actor("counter", Counter::default());
        let total = system
            .send_message(first.address(), "get", Value::Null, None)
            .await
            .unwrap();
        assert_eq!(total, json!(0));
    }

    #[tokio::test]
    async fn test_shutdown_clears_registries() {
        let system = ActorSystem::new("S");
        let counter = system.create_actor("counter", Counter::default());

        system.shutdown();
        assert!(system.actor_names().is_empty());
        let err = counter.untyped().tell("add", 1).unwrap_err();
        assert!(err.is_routing());
    }

    #[test]
    fn test_unnamed_system_gets_a_name() {
        let system = ActorSystem::with_config(ActorSystemConfig::default());
        assert!(!system.name().is_empty());
    }
}
