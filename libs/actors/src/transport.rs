//! Cross-System Transport & Handshake Protocol
//!
//! Two actor systems exchange [`WireMessage`]s over an abstract
//! bidirectional [`Channel`]. The channel only has to round-trip JSON values
//! structurally; reliability and ordering across emits are not assumed.
//!
//! ## Connection lifecycle
//!
//! 1. `register(channel)` starts listening, then emits
//!    `{"mode": "handshake", "address": <system name>}`. This is the only
//!    message sent before application traffic; the peer uses it to route
//!    return traffic. `listen_to(channel)` only listens.
//! 2. A received handshake binds the announced name to the channel in the
//!    remote registry.
//! 3. Received `send`/`ask` envelopes are resolved against the local
//!    registry. An `ask` is acknowledged with a [`Reply`] carrying either
//!    the result or the failure. Envelopes for unknown targets are logged
//!    and dropped without a NACK.
//! 4. `disconnect` removes every remote entry bound to the channel, so
//!    routing to those names fails fast. `reconnect` re-sends the handshake
//!    on registered channels.

use crate::error::{ActorError, Result};
use crate::messages::{Envelope, Mode, Reply, WireMessage};
use crate::system::ActorSystem;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Acknowledgement callback passed along with an emitted message
pub type Ack = Box<dyn FnOnce(Value) + Send + 'static>;

/// Handler for the `message` event
pub type MessageHandler = Arc<dyn Fn(Value, Option<Ack>) + Send + Sync + 'static>;

/// Handler for the `disconnect` and `reconnect` events
pub type SignalHandler = Arc<dyn Fn() + Send + Sync + 'static>;

/// Abstract duplex channel between two actor systems
pub trait Channel: Send + Sync + 'static {
    /// Subscribe to incoming messages
    fn on_message(&self, handler: MessageHandler);

    /// Subscribe to loss of the connection
    fn on_disconnect(&self, handler: SignalHandler);

    /// Subscribe to re-establishment of the connection
    fn on_reconnect(&self, handler: SignalHandler);

    /// Send a message to the peer, optionally expecting an acknowledgement
    fn emit(&self, payload: Value, ack: Option<Ack>) -> Result<()>;
}

impl ActorSystem {
    /// Listen on `channel` and announce this system to the peer
    pub fn register(&self, channel: Arc<dyn Channel>) -> Result<()> {
        self.listen_to(channel.clone());

        if self.registry().mark_announced(&channel) {
            let system = self.downgrade();
            let weak_channel = Arc::downgrade(&channel);
            channel.on_reconnect(Arc::new(move || {
                let (Some(system), Some(channel)) = (system.upgrade(), weak_channel.upgrade())
                else {
                    return;
                };
                info!(system = %system.name(), "Channel reconnected; repeating handshake");
                if let Err(e) = system.handshake(&channel) {
                    warn!(system = %system.name(), error = %e, "Handshake after reconnect failed");
                }
            }));
        }

        self.handshake(&channel)
    }

    /// Listen on `channel` without announcing this system.
    ///
    /// Listening twice on the same channel is a no-op; every inbound
    /// envelope is delivered once.
    pub fn listen_to(&self, channel: Arc<dyn Channel>) {
        if !self.registry().attach_channel(channel.clone()) {
            debug!(system = %self.name(), "Already listening on channel");
            return;
        }
        debug!(system = %self.name(), "Listening on channel");

        let system = self.downgrade();
        let weak_channel: Weak<dyn Channel> = Arc::downgrade(&channel);
        channel.on_message(Arc::new(move |payload: Value, ack: Option<Ack>| {
            if let (Some(system), Some(channel)) = (system.upgrade(), weak_channel.upgrade()) {
                system.handle_wire_message(channel, payload, ack);
            }
        }));

        let system = self.downgrade();
        let weak_channel: Weak<dyn Channel> = Arc::downgrade(&channel);
        channel.on_disconnect(Arc::new(move || {
            if let (Some(system), Some(channel)) = (system.upgrade(), weak_channel.upgrade()) {
                system.handle_disconnect(&channel);
            }
        }));
    }

    fn handshake(&self, channel: &Arc<dyn Channel>) -> Result<()> {
        let handshake = serde_json::to_value(WireMessage::handshake(self.name()))?;
        channel.emit(handshake, None)
    }

    fn handle_wire_message(&self, channel: Arc<dyn Channel>, payload: Value, ack: Option<Ack>) {
        let message: WireMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    system = %self.name(),
                    error = %e,
                    "Dropping malformed message from across the system boundary"
                );
                return;
            }
        };

        match message {
            WireMessage::Handshake { address } => {
                info!(
                    system = %self.name(),
                    remote_system = %address,
                    "Handshake received; remote system registered"
                );
                self.registry().register_remote(&address, channel);
            }
            WireMessage::Send(envelope) => self.deliver_envelope(Mode::Send, envelope, ack),
            WireMessage::Ask(envelope) => self.deliver_envelope(Mode::Ask, envelope, ack),
        }
    }

    fn deliver_envelope(&self, mode: Mode, envelope: Envelope, ack: Option<Ack>) {
        self.counters().record_remote_received();
        debug!(
            system = %self.name(),
            mode = ?mode,
            message_type = %envelope.message_type,
            target = %envelope.target_address,
            "Received a message from across the system boundary"
        );

        let Some(cell) = self.resolve_local(&envelope.target_address) else {
            self.counters().record_unrouted();
            warn!(
                system = %self.name(),
                target = %envelope.target_address,
                message_type = %envelope.message_type,
                "Unable to find the recipient of a remote message; dropping it"
            );
            return;
        };

        let Envelope {
            message_type,
            payload,
            sender_address,
            ..
        } = envelope;

        match (mode, ack) {
            (Mode::Ask, Some(ack)) => {
                match cell
                    .mailbox
                    .push_question(&message_type, payload, sender_address)
                {
                    Ok(pending) => {
                        tokio::spawn(async move {
                            let result = pending.await;
                            acknowledge(ack, result);
                        });
                    }
                    Err(e) => acknowledge(ack, Err(e)),
                }
            }
            (mode, _) => {
                if mode == Mode::Ask {
                    debug!(message_type = %message_type, "Ask arrived without acknowledgement; treating as send");
                }
                if let Err(e) = cell.mailbox.push(&message_type, payload, sender_address) {
                    warn!(error = %e, "Failed to deliver remote message");
                }
            }
        }
    }

    fn handle_disconnect(&self, channel: &Arc<dyn Channel>) {
        let removed = self.registry().remove_channel(channel);
        info!(
            system = %self.name(),
            remote_systems = ?removed,
            "Channel disconnected; remote systems removed"
        );
    }
}

fn acknowledge(ack: Ack, result: Result<Value>) {
    match serde_json::to_value(Reply::from_result(result)) {
        Ok(reply) => ack(reply),
        Err(e) => {
            let fallback = Reply::from_result(Err(ActorError::codec_with_source(
                "Failed to encode reply",
                e,
            )));
            match serde_json::to_value(fallback) {
                Ok(reply) => ack(reply),
                Err(e) => warn!(error = %e, "Dropping unencodable acknowledgement"),
            }
        }
    }
}
