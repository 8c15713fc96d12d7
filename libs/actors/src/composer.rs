//! Message Composer
//!
//! Immutable builder for one message. Every binder returns a new composer
//! carrying what was bound so far, so partially built composers can be
//! shared and specialised:
//!
//! ```rust,ignore
//! let to_room = system.compose().target(room_address).sender(me);
//! to_room.message_type("post").payload(text).send();
//! let history = to_room.message_type("history").payload(()).ask().await?;
//! ```
//!
//! `ask` needs a target, a message type and a payload; `sender` is optional.

use crate::address::Address;
use crate::error::{ActorError, Result};
use crate::mailbox::ReplyFuture;
use crate::messages::{decode_response, encode_payload, Exposes, Method};
use crate::system::ActorSystem;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::debug;

/// Capability set of a composer with no class type bound
#[derive(Debug)]
pub enum Untyped {}

pub struct MessageComposer<T = Untyped> {
    system: ActorSystem,
    target: Option<Address>,
    message_type: Option<String>,
    payload: Option<Value>,
    sender: Option<Address>,
    /// First payload encoding failure, reported on dispatch
    encode_error: Option<ActorError>,
    _capabilities: PhantomData<fn() -> T>,
}

impl<T> Clone for MessageComposer<T> {
    fn clone(&self) -> Self {
        Self {
            system: self.system.clone(),
            target: self.target.clone(),
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            sender: self.sender.clone(),
            encode_error: self.encode_error.clone(),
            _capabilities: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for MessageComposer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageComposer")
            .field("target", &self.target)
            .field("message_type", &self.message_type)
            .field("payload", &self.payload)
            .field("sender", &self.sender)
            .finish()
    }
}

impl MessageComposer {
    pub(crate) fn new(system: ActorSystem) -> Self {
        Self {
            system,
            target: None,
            message_type: None,
            payload: None,
            sender: None,
            encode_error: None,
            _capabilities: PhantomData,
        }
    }
}

impl<T> MessageComposer<T> {
    pub fn target(&self, target: impl Into<Address>) -> Self {
        Self {
            target: Some(target.into()),
            ..self.clone()
        }
    }

    pub fn message_type(&self, message_type: impl Into<String>) -> Self {
        Self {
            message_type: Some(message_type.into()),
            ..self.clone()
        }
    }

    pub fn payload<P: Serialize>(&self, payload: P) -> Self {
        match encode_payload(payload) {
            Ok(payload) => Self {
                payload: Some(payload),
                encode_error: None,
                ..self.clone()
            },
            Err(e) => Self {
                payload: None,
                encode_error: Some(e),
                ..self.clone()
            },
        }
    }

    pub fn sender(&self, sender: impl Into<Address>) -> Self {
        Self {
            sender: Some(sender.into()),
            ..self.clone()
        }
    }

    /// Same bindings under a different capability set
    pub fn class_type<U>(&self) -> MessageComposer<U> {
        MessageComposer {
            system: self.system.clone(),
            target: self.target.clone(),
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            sender: self.sender.clone(),
            encode_error: self.encode_error.clone(),
            _capabilities: PhantomData,
        }
    }

    /// Bind type and payload from method `M` of the class type
    pub fn method<M>(&self, payload: M::Payload) -> Self
    where
        M: Method,
        T: Exposes<M>,
    {
        self.message_type(M::TYPE).payload(payload)
    }

    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.target.is_none() {
            missing.push("target");
        }
        if self.message_type.is_none() {
            missing.push("type");
        }
        if self.payload.is_none() && self.encode_error.is_none() {
            missing.push("payload");
        }
        missing
    }

    fn parts(&self) -> Result<(Address, String, Value)> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ActorError::InsufficientComposerInput { missing });
        }
        if let Some(e) = &self.encode_error {
            return Err(e.clone());
        }
        match (&self.target, &self.message_type, &self.payload) {
            (Some(target), Some(message_type), Some(payload)) => {
                Ok((target.clone(), message_type.clone(), payload.clone()))
            }
            _ => Err(ActorError::InsufficientComposerInput {
                missing: self.missing(),
            }),
        }
    }

    /// Dispatch as an ask
    pub fn ask(&self) -> ReplyFuture {
        match self.parts() {
            Ok((target, message_type, payload)) => {
                self.system
                    .send_message(&target, &message_type, payload, self.sender.clone())
            }
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    /// Dispatch as an ask and decode the response
    pub fn ask_typed<R>(&self) -> BoxFuture<'static, Result<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let pending = self.ask();
        async move { decode_response::<R>(pending.await?) }.boxed()
    }

    /// Dispatch fire-and-forget; failures are logged, never returned
    pub fn send(&self) {
        let outcome = self.parts().and_then(|(target, message_type, payload)| {
            self.system
                .tell(&target, &message_type, payload, self.sender.clone())
        });
        if let Err(e) = outcome {
            debug!(
                composer = ?self,
                error = %e,
                "Composed send discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_fields_reported_in_order() {
        let system = ActorSystem::new("S");

        let err = system.compose().ask().await.unwrap_err();
        match err {
            ActorError::InsufficientComposerInput { missing } => {
                assert_eq!(missing, vec!["target", "type", "payload"])
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = system
            .compose()
            .target(Address::new("S", "x"))
            .payload(1)
            .ask()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient composer input: missing type");
    }

    #[tokio::test]
    async fn test_binders_do_not_mutate() {
        let system = ActorSystem::new("S");
        let base = system.compose().target(Address::new("S", "x"));
        let typed = base.message_type("ping");

        assert!(base.message_type.is_none());
        assert_eq!(typed.target, base.target);
        assert_eq!(typed.message_type.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn test_complete_composer_routes() {
        let system = ActorSystem::new("S");
        let err = system
            .compose()
            .target(Address::new("S", "nobody"))
            .message_type("ping")
            .payload(())
            .ask()
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::ActorNotFound { .. }));

        // send never surfaces errors
        system.compose().send();
    }
}
