//! Actor References
//!
//! [`ActorRef`] is an untyped handle: an address plus the system that routes
//! for it and, optionally, the address to report as sender. [`TypedRef`]
//! adds a compile-time capability set on top. Both degrade to the same
//! `(type, payload)` traffic, so a typed call and a raw
//! [`ActorSystem::send_message`] are indistinguishable to the receiver.

use crate::address::Address;
use crate::error::Result;
use crate::mailbox::ReplyFuture;
use crate::messages::{decode_response, encode_payload, Exposes, Method};
use crate::system::ActorSystem;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Untyped, location-transparent reference
#[derive(Debug, Clone)]
pub struct ActorRef {
    address: Address,
    system: ActorSystem,
    sender: Option<Address>,
}

impl ActorRef {
    pub(crate) fn new(address: Address, system: ActorSystem) -> Self {
        Self {
            address,
            system,
            sender: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Sender reported with every message sent through this reference
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Same target, different sender
    pub fn invoke(&self, sender: Option<Address>) -> Self {
        Self {
            address: self.address.clone(),
            system: self.system.clone(),
            sender,
        }
    }

    /// Attach a capability set; nothing is checked at runtime
    pub fn class_type<T>(self) -> TypedRef<T> {
        TypedRef {
            inner: self,
            _capabilities: PhantomData,
        }
    }

    pub fn tell<P: Serialize>(&self, message_type: &str, payload: P) -> Result<()> {
        let payload = encode_payload(payload)?;
        self.system
            .tell(&self.address, message_type, payload, self.sender.clone())
    }

    pub fn ask<P: Serialize>(&self, message_type: &str, payload: P) -> ReplyFuture {
        match encode_payload(payload) {
            Ok(payload) => {
                self.system
                    .send_message(&self.address, message_type, payload, self.sender.clone())
            }
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }
}

/// Reference restricted to the methods `T` exposes
pub struct TypedRef<T> {
    inner: ActorRef,
    _capabilities: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _capabilities: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRef")
            .field("capabilities", &std::any::type_name::<T>())
            .field("address", &self.inner.address)
            .field("sender", &self.inner.sender)
            .finish()
    }
}

impl<T> TypedRef<T> {
    pub fn address(&self) -> &Address {
        self.inner.address()
    }

    pub fn untyped(&self) -> &ActorRef {
        &self.inner
    }

    pub fn into_untyped(self) -> ActorRef {
        self.inner
    }

    /// Sender-bound copy of this reference
    pub fn invoke(&self, sender: Option<Address>) -> Self {
        self.inner.invoke(sender).class_type()
    }

    /// Call method `M` and decode its response
    pub fn ask<M>(&self, payload: M::Payload) -> BoxFuture<'static, Result<M::Response>>
    where
        M: Method,
        T: Exposes<M>,
    {
        let pending = self.inner.ask(M::TYPE, payload);
        async move { decode_response::<M::Response>(pending.await?) }.boxed()
    }

    /// Fire method `M` without waiting for a response
    pub fn tell<M>(&self, payload: M::Payload) -> Result<()>
    where
        M: Method,
        T: Exposes<M>,
    {
        self.inner.tell(M::TYPE, payload)
    }
}

impl From<&ActorRef> for Address {
    fn from(reference: &ActorRef) -> Self {
        reference.address.clone()
    }
}

impl From<ActorRef> for Address {
    fn from(reference: ActorRef) -> Self {
        reference.address
    }
}

impl<T> From<&TypedRef<T>> for Address {
    fn from(reference: &TypedRef<T>) -> Self {
        reference.inner.address.clone()
    }
}

impl<T> From<TypedRef<T>> for Address {
    fn from(reference: TypedRef<T>) -> Self {
        reference.inner.address
    }
}
