//! Actor Behavior and Handler Context
//!
//! An actor declares a closed message enum and handles one message at a
//! time. The enum is adjacently tagged so the erased `(type, payload)` pair
//! decodes straight into a variant; an unknown tag is rejected as a handler
//! error before `handle` runs.
//!
//! ```rust,ignore
//! #[derive(Deserialize)]
//! #[serde(tag = "type", content = "payload", rename_all = "camelCase")]
//! enum EchoMessage {
//!     Greet(Greeting),
//! }
//!
//! #[async_trait]
//! impl Actor for EchoActor {
//!     type Message = EchoMessage;
//!
//!     async fn handle(&mut self, msg: EchoMessage, _ctx: &mut Context) -> Result<Value> {
//!         match msg {
//!             EchoMessage::Greet(_) => reply(Greeting { content: "thanks".into() }),
//!         }
//!     }
//! }
//! ```

use crate::address::Address;
use crate::composer::MessageComposer;
use crate::error::Result;
use crate::flow::Flow;
use crate::messages::encode_payload;
use crate::reference::{ActorRef, TypedRef};
use crate::system::ActorSystem;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Trait for actor behavior
#[async_trait]
pub trait Actor: Send + 'static {
    /// Closed set of messages this actor understands
    type Message: DeserializeOwned + Send + 'static;

    /// Handle one message; the returned value answers an ask
    async fn handle(&mut self, msg: Self::Message, ctx: &mut Context) -> Result<Value>;

    /// Called before the first message is processed
    async fn started(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    /// Called after the mailbox has closed and drained
    async fn stopped(&mut self, _ctx: &mut Context) {}

    /// Whether a newer message of this type supersedes an in-flight one
    fn preempts(_message_type: &str) -> bool
    where
        Self: Sized,
    {
        false
    }
}

/// Per-actor view of the runtime, refreshed for every message
pub struct Context {
    name: String,
    address: Address,
    system: ActorSystem,
    sender: Option<Address>,
    message_type: Option<String>,
    token: CancellationToken,
}

impl Context {
    pub(crate) fn new(name: String, address: Address, system: ActorSystem) -> Self {
        Self {
            name,
            address,
            system,
            sender: None,
            message_type: None,
            token: CancellationToken::new(),
        }
    }

    /// Set the current context before a handler runs
    pub(crate) fn enter(
        &mut self,
        sender: Option<Address>,
        message_type: String,
        token: CancellationToken,
    ) {
        self.sender = sender;
        self.message_type = Some(message_type);
        self.token = token;
    }

    pub(crate) fn leave(&mut self) {
        self.sender = None;
        self.message_type = None;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Sender of the message being handled
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Reference to the sender, bound to reply as this actor
    pub fn sender_ref(&self) -> Option<ActorRef> {
        self.sender
            .as_ref()
            .map(|sender| self.send_to(sender.clone()))
    }

    /// Type of the message being handled
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    /// Flow bound to the message being handled
    pub fn flow(&self) -> Flow {
        let label = self.message_type.clone().unwrap_or_else(|| self.name.clone());
        Flow::with_token(label, self.token.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Untyped reference to `target`, sending as this actor
    pub fn send_to(&self, target: impl Into<Address>) -> ActorRef {
        self.system
            .reference(target.into())
            .invoke(Some(self.address.clone()))
    }

    /// Typed reference to `target`, sending as this actor
    pub fn at<T>(&self, target: impl Into<Address>) -> TypedRef<T> {
        self.send_to(target).class_type::<T>()
    }

    /// Composer with this actor pre-bound as sender
    pub fn compose(&self) -> MessageComposer {
        self.system.compose().sender(self.address.clone())
    }

    /// Enqueue a message to this actor, optionally after a delay
    pub fn send_to_self<P: Serialize>(
        &self,
        message_type: &str,
        payload: P,
        delay: Option<Duration>,
    ) -> Result<()> {
        let payload = encode_payload(payload)?;
        let address = self.address.clone();

        match delay {
            None => self
                .system
                .tell(&address, message_type, payload, Some(address.clone())),
            Some(delay) => {
                let system = self.system.clone();
                let message_type = message_type.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) =
                        system.tell(&address, &message_type, payload, Some(address.clone()))
                    {
                        warn!(
                            actor = %address,
                            message_type = %message_type,
                            error = %e,
                            "Delayed self-message could not be delivered"
                        );
                    }
                });
                Ok(())
            }
        }
    }
}
