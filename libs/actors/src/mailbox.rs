//! Actor Mailbox & Scheduler
//!
//! Each actor owns one unbounded single-consumer queue drained by its own
//! task, so handlers for one actor never overlap and run in exact enqueue
//! order. Senders only ever touch the [`Mailbox`] handle; the actor value
//! itself lives inside the [`ActorTask`].
//!
//! Scheduler phases per actor:
//!
//! ```text
//! Idle ──push──▶ Scheduled ──dequeue──▶ Processing ──┬─ queue empty ──▶ Idle
//!                    ▲                               │
//!                    └────────── entries left ───────┘
//! ```
//!
//! The handle also implements same-type preemption for actors whose
//! [`Actor::preempts`] opts in: pushing a message of the type currently in
//! flight cancels the in-flight handler's token, and a preemptible entry that
//! is dequeued while a newer entry of its type waits starts already
//! cancelled.

use crate::actor::{Actor, Context};
use crate::address::Address;
use crate::error::{ActorError, Result};
use crate::messages::decode_message;
use crate::system::SystemMetrics;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Future settling with an ask's result
pub type ReplyFuture = BoxFuture<'static, Result<Value>>;

/// One pending message
#[derive(Debug)]
pub(crate) struct MailboxEntry {
    pub message_type: String,
    pub payload: Value,
    pub sender: Option<Address>,
    /// Present for asks, absent for tells
    pub reply: Option<oneshot::Sender<Result<Value>>>,
}

impl MailboxEntry {
    pub fn is_question(&self) -> bool {
        self.reply.is_some()
    }
}

/// Scheduler phase of one actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Scheduled,
    Processing,
}

#[derive(Debug)]
struct InFlight {
    message_type: String,
    token: CancellationToken,
}

#[derive(Debug)]
struct SchedulerState {
    phase: SchedulerPhase,
    queued: usize,
    queued_by_type: HashMap<String, usize>,
    in_flight: Option<InFlight>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            queued: 0,
            queued_by_type: HashMap::new(),
            in_flight: None,
        }
    }

    fn dequeued(&mut self, message_type: &str) {
        self.queued = self.queued.saturating_sub(1);
        if let Some(count) = self.queued_by_type.get_mut(message_type) {
            *count -= 1;
            if *count == 0 {
                self.queued_by_type.remove(message_type);
            }
        }
    }
}

struct MailboxShared {
    state: Mutex<SchedulerState>,
    preempts: fn(&str) -> bool,
    high_water_mark: usize,
    processed: AtomicU64,
}

/// Point-in-time view of an actor's mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxStats {
    pub phase: SchedulerPhase,
    pub queued: usize,
    pub processed: u64,
    pub in_flight: Option<String>,
}

/// Sending half of an actor's mailbox
#[derive(Clone)]
pub(crate) struct Mailbox {
    address: Address,
    sender: mpsc::UnboundedSender<MailboxEntry>,
    shared: Arc<MailboxShared>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("address", &self.address)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Receiving half, owned by the actor task
pub(crate) struct MailboxReceiver {
    receiver: mpsc::UnboundedReceiver<MailboxEntry>,
    shared: Arc<MailboxShared>,
}

impl Mailbox {
    pub fn new(
        address: Address,
        preempts: fn(&str) -> bool,
        high_water_mark: usize,
    ) -> (Self, MailboxReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(MailboxShared {
            state: Mutex::new(SchedulerState::new()),
            preempts,
            high_water_mark,
            processed: AtomicU64::new(0),
        });

        let mailbox = Self {
            address,
            sender,
            shared: Arc::clone(&shared),
        };
        (mailbox, MailboxReceiver { receiver, shared })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Append a tell entry
    pub fn push(&self, message_type: &str, payload: Value, sender: Option<Address>) -> Result<()> {
        self.enqueue(MailboxEntry {
            message_type: message_type.to_string(),
            payload,
            sender,
            reply: None,
        })
    }

    /// Append an ask entry; the returned future settles once it is processed
    pub fn push_question(
        &self,
        message_type: &str,
        payload: Value,
        sender: Option<Address>,
    ) -> Result<ReplyFuture> {
        let (reply, receiver) = oneshot::channel();
        self.enqueue(MailboxEntry {
            message_type: message_type.to_string(),
            payload,
            sender,
            reply: Some(reply),
        })?;

        let address = self.address.clone();
        Ok(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(ActorError::MailboxClosed { address }))
        }
        .boxed())
    }

    pub fn stats(&self) -> MailboxStats {
        let state = self.shared.state.lock();
        MailboxStats {
            phase: state.phase,
            queued: state.queued,
            processed: self.shared.processed.load(Ordering::Relaxed),
            in_flight: state.in_flight.as_ref().map(|f| f.message_type.clone()),
        }
    }

    fn enqueue(&self, entry: MailboxEntry) -> Result<()> {
        let mut state = self.shared.state.lock();

        if let Some(in_flight) = &state.in_flight {
            if in_flight.message_type == entry.message_type
                && (self.shared.preempts)(&entry.message_type)
                && !in_flight.token.is_cancelled()
            {
                debug!(
                    actor = %self.address,
                    message_type = %entry.message_type,
                    "Newer message supersedes in-flight handler"
                );
                in_flight.token.cancel();
            }
        }

        let message_type = entry.message_type.clone();
        self.sender.send(entry).map_err(|_| ActorError::MailboxClosed {
            address: self.address.clone(),
        })?;

        state.queued += 1;
        *state.queued_by_type.entry(message_type).or_insert(0) += 1;
        if state.phase == SchedulerPhase::Idle {
            state.phase = SchedulerPhase::Scheduled;
        }

        if state.queued == self.shared.high_water_mark.saturating_add(1) {
            warn!(
                actor = %self.address,
                queued = state.queued,
                high_water_mark = self.shared.high_water_mark,
                "Mailbox backlog above high-water mark"
            );
        }

        Ok(())
    }
}

impl MailboxReceiver {
    async fn recv(&mut self) -> Option<MailboxEntry> {
        self.receiver.recv().await
    }

    /// Move to Processing and hand out the token for this entry
    fn begin(&self, entry: &MailboxEntry) -> CancellationToken {
        let mut state = self.shared.state.lock();
        state.dequeued(&entry.message_type);
        state.phase = SchedulerPhase::Processing;

        let token = CancellationToken::new();
        if (self.shared.preempts)(&entry.message_type)
            && state.queued_by_type.contains_key(&entry.message_type)
        {
            // a newer entry of the same type is already waiting
            token.cancel();
        }

        state.in_flight = Some(InFlight {
            message_type: entry.message_type.clone(),
            token: token.clone(),
        });
        token
    }

    fn finish(&self) {
        let mut state = self.shared.state.lock();
        state.in_flight = None;
        state.phase = if state.queued > 0 {
            SchedulerPhase::Scheduled
        } else {
            SchedulerPhase::Idle
        };
        self.shared.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Actor task runner
pub(crate) struct ActorTask<A: Actor> {
    actor: A,
    receiver: MailboxReceiver,
    context: Context,
    metrics: Arc<SystemMetrics>,
}

impl<A: Actor> ActorTask<A> {
    pub fn new(
        actor: A,
        receiver: MailboxReceiver,
        context: Context,
        metrics: Arc<SystemMetrics>,
    ) -> Self {
        Self {
            actor,
            receiver,
            context,
            metrics,
        }
    }

    pub async fn run(mut self) {
        let address = self.context.address().clone();

        if let Err(e) = self.actor.started(&mut self.context).await {
            error!(
                actor = %address,
                error = %e,
                "Actor start hook failed; processing messages anyway"
            );
        }
        debug!(actor = %address, "Actor entering message loop");

        while let Some(entry) = self.receiver.recv().await {
            let started = Instant::now();
            let token = self.receiver.begin(&entry);
            let MailboxEntry {
                message_type,
                payload,
                sender,
                reply,
            } = entry;

            self.context
                .enter(sender, message_type.clone(), token.clone());
            let result = self.dispatch(&message_type, payload).await;
            self.context.leave();
            self.receiver.finish();
            self.metrics.record_message_handled(started.elapsed());

            match (reply, result) {
                (Some(reply), result) => {
                    if let Err(e) = &result {
                        self.metrics.record_handler_failure();
                        debug!(
                            actor = %address,
                            message_type = %message_type,
                            error = %e,
                            "Ask rejected by handler"
                        );
                    }
                    if reply.send(result).is_err() {
                        debug!(
                            actor = %address,
                            message_type = %message_type,
                            "Asker went away before the reply"
                        );
                    }
                }
                (None, Err(e)) if e.is_cancelled() && token.is_cancelled() => {
                    debug!(
                        actor = %address,
                        message_type = %message_type,
                        "Superseded message discarded"
                    );
                }
                (None, Err(e)) => {
                    self.metrics.record_handler_failure();
                    error!(
                        actor = %address,
                        message_type = %message_type,
                        error = %e,
                        error_category = e.category(),
                        "Actor failed to handle a message"
                    );
                }
                (None, Ok(_)) => {}
            }
        }

        self.actor.stopped(&mut self.context).await;
        info!(actor = %address, "Actor stopped");
    }

    async fn dispatch(&mut self, message_type: &str, payload: Value) -> Result<Value> {
        let message = decode_message::<A::Message>(message_type, payload).map_err(|e| {
            ActorError::handler(
                self.context.name(),
                format!("cannot handle message `{}`: {}", message_type, e),
            )
        })?;

        let outcome = AssertUnwindSafe(self.actor.handle(message, &mut self.context))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let reason = if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic.downcast_ref::<&str>() {
                    (*s).to_string()
                } else {
                    "unknown panic".to_string()
                };
                Err(ActorError::handler(
                    self.context.name(),
                    format!("handler panicked on `{}`: {}", message_type, reason),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn never(_: &str) -> bool {
        false
    }

    fn change_room(message_type: &str) -> bool {
        message_type == "changeRoom"
    }

    #[tokio::test]
    async fn test_push_schedules_and_counts() {
        let (mailbox, mut receiver) = Mailbox::new(Address::new("S", "a"), never, 8);
        assert_eq!(mailbox.stats().phase, SchedulerPhase::Idle);

        mailbox.push("one", json!(1), None).unwrap();
        mailbox.push("two", json!(2), None).unwrap();

        let stats = mailbox.stats();
        assert_eq!(stats.phase, SchedulerPhase::Scheduled);
        assert_eq!(stats.queued, 2);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.message_type, "one");
        assert!(!first.is_question());
        receiver.begin(&first);
        assert_eq!(mailbox.stats().phase, SchedulerPhase::Processing);
        assert_eq!(mailbox.stats().in_flight.as_deref(), Some("one"));

        receiver.finish();
        let stats = mailbox.stats();
        assert_eq!(stats.phase, SchedulerPhase::Scheduled);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_same_type_push_cancels_in_flight() {
        let (mailbox, mut receiver) = Mailbox::new(Address::new("S", "switcher"), change_room, 8);

        mailbox.push("changeRoom", json!("one"), None).unwrap();
        let first = receiver.recv().await.unwrap();
        let token = receiver.begin(&first);
        assert!(!token.is_cancelled());

        mailbox.push("other", json!(null), None).unwrap();
        assert!(!token.is_cancelled());

        mailbox.push("changeRoom", json!("two"), None).unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_stale_queued_entry_starts_cancelled() {
        let (mailbox, mut receiver) = Mailbox::new(Address::new("S", "switcher"), change_room, 8);

        mailbox.push("changeRoom", json!("one"), None).unwrap();
        mailbox.push("changeRoom", json!("two"), None).unwrap();

        let first = receiver.recv().await.unwrap();
        assert!(receiver.begin(&first).is_cancelled());
        receiver.finish();

        let second = receiver.recv().await.unwrap();
        assert!(!receiver.begin(&second).is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_mailbox_rejects_pushes() {
        let (mailbox, receiver) = Mailbox::new(Address::new("S", "gone"), never, 8);
        drop(receiver);

        let err = mailbox.push("anything", json!({}), None).unwrap_err();
        assert!(matches!(err, ActorError::MailboxClosed { .. }));
        assert!(mailbox.push_question("anything", json!({}), None).is_err());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_backlog_warning_past_high_water_mark() {
        let (mailbox, _receiver) = Mailbox::new(Address::new("S", "busy"), never, 2);

        mailbox.push("one", json!(1), None).unwrap();
        mailbox.push("two", json!(2), None).unwrap();
        assert!(!logs_contain("above high-water mark"));

        mailbox.push("three", json!(3), None).unwrap();
        assert!(logs_contain("above high-water mark"));
    }

    #[tokio::test]
    async fn test_unbounded_high_water_mark_never_warns() {
        let (mailbox, _receiver) = Mailbox::new(Address::new("S", "quiet"), never, usize::MAX);

        mailbox.push("one", json!(1), None).unwrap();
        assert!(mailbox.push_question("two", json!(2), None).is_ok());
        assert_eq!(mailbox.stats().queued, 2);
    }
}
