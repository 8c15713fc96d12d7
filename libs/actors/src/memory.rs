//! In-Memory Channel
//!
//! A connected pair of [`Channel`] ends living in one process, used by tests
//! and the chat demo in place of a socket. Every payload and acknowledgement
//! is round-tripped through JSON text, so anything that crosses a
//! `MemoryChannel` would also survive a real wire.
//!
//! Delivery is synchronous on the emitting thread. Messages emitted before the
//! peer attaches a message handler are buffered and flushed, in order, when
//! the first handler attaches. Messages emitted while that flush runs queue
//! behind the backlog.

use crate::error::{ActorError, Result};
use crate::transport::{Ack, Channel, MessageHandler, SignalHandler};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct EndState {
    message_handlers: Vec<MessageHandler>,
    disconnect_handlers: Vec<SignalHandler>,
    reconnect_handlers: Vec<SignalHandler>,
    backlog: VecDeque<(Value, Option<Ack>)>,
    flushing: bool,
}

#[derive(Default)]
struct Link {
    closed: AtomicBool,
    ends: [Mutex<EndState>; 2],
}

impl Link {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn deliver(&self, side: usize, payload: Value, ack: Option<Ack>) {
        let handlers = {
            let mut end = self.ends[side].lock();
            if end.message_handlers.is_empty() || end.flushing {
                end.backlog.push_back((payload, ack));
                return;
            }
            end.message_handlers.clone()
        };
        dispatch(&handlers, payload, ack);
    }

    fn signal(&self, select: fn(&EndState) -> &Vec<SignalHandler>) {
        for end in &self.ends {
            let handlers = select(&end.lock()).clone();
            for handler in handlers {
                handler();
            }
        }
    }
}

fn dispatch(handlers: &[MessageHandler], payload: Value, ack: Option<Ack>) {
    let mut ack = ack;
    for handler in handlers {
        // the first listener owns the acknowledgement
        handler(payload.clone(), ack.take());
    }
}

fn round_trip(value: &Value) -> Result<Value> {
    let text = serde_json::to_string(value)?;
    Ok(serde_json::from_str(&text)?)
}

/// One end of an in-process channel pair
pub struct MemoryChannel {
    link: Arc<Link>,
    side: usize,
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("side", &self.side)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MemoryChannel {
    /// Create two connected ends
    pub fn pair() -> (Arc<MemoryChannel>, Arc<MemoryChannel>) {
        let link = Arc::new(Link::default());
        (
            Arc::new(MemoryChannel {
                link: link.clone(),
                side: 0,
            }),
            Arc::new(MemoryChannel { link, side: 1 }),
        )
    }

    pub fn is_connected(&self) -> bool {
        !self.link.is_closed()
    }

    /// Drop the link; both ends see `disconnect`
    pub fn disconnect(&self) {
        if self.link.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Memory channel disconnected");
        self.link.signal(|end| &end.disconnect_handlers);
    }

    /// Restore the link; both ends see `reconnect`
    pub fn reconnect(&self) {
        if !self.link.closed.swap(false, Ordering::AcqRel) {
            return;
        }
        debug!("Memory channel reconnected");
        self.link.signal(|end| &end.reconnect_handlers);
    }

    fn peer(&self) -> usize {
        1 - self.side
    }
}

impl Channel for MemoryChannel {
    fn on_message(&self, handler: MessageHandler) {
        let end = &self.link.ends[self.side];
        {
            let mut state = end.lock();
            state.message_handlers.push(handler);
            if state.flushing || state.backlog.is_empty() {
                return;
            }
            state.flushing = true;
        }

        loop {
            let (handlers, (payload, ack)) = {
                let mut state = end.lock();
                match state.backlog.pop_front() {
                    Some(next) => (state.message_handlers.clone(), next),
                    None => {
                        state.flushing = false;
                        return;
                    }
                }
            };
            dispatch(&handlers, payload, ack);
        }
    }

    fn on_disconnect(&self, handler: SignalHandler) {
        self.link.ends[self.side]
            .lock()
            .disconnect_handlers
            .push(handler);
    }

    fn on_reconnect(&self, handler: SignalHandler) {
        self.link.ends[self.side]
            .lock()
            .reconnect_handlers
            .push(handler);
    }

    fn emit(&self, payload: Value, ack: Option<Ack>) -> Result<()> {
        if self.link.is_closed() {
            return Err(ActorError::channel("memory channel is disconnected"));
        }
        let payload = round_trip(&payload)?;

        let ack = ack.map(|ack| {
            let link = Arc::downgrade(&self.link);
            Box::new(move |reply: Value| {
                let Some(link) = link.upgrade() else {
                    return;
                };
                if link.is_closed() {
                    debug!("Link closed; dropping acknowledgement");
                    return;
                }
                match round_trip(&reply) {
                    Ok(reply) => ack(reply),
                    Err(e) => warn!(error = %e, "Dropping unserializable acknowledgement"),
                }
            }) as Ack
        });

        self.link.deliver(self.peer(), payload, ack);
        Ok(())
    }
}
