//! Lightweight Actor Runtime
//!
//! Isolated units of state ("actors") that talk only through asynchronous
//! messages. Addresses are location transparent: the same
//! [`Address`] reaches an actor in this process or one living in another
//! [`ActorSystem`] connected through a [`Channel`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │   ActorSystem "client"   │          │   ActorSystem "server"   │
//! │                          │ Channel  │                          │
//! │  TypedRef ─▶ router ─────┼──────────┼─▶ router ─▶ mailbox      │
//! │               │          │ handshake│              │           │
//! │               ▼          │ send/ask │              ▼           │
//! │            mailbox       │ ◀── ack ─┼──────── ActorTask        │
//! │               │          │          │         (one handler     │
//! │               ▼          │          │          at a time)      │
//! │           ActorTask      │          │                          │
//! └──────────────────────────┘          └──────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **FIFO per actor**: entries run in exact enqueue order, one at a time
//! - **Ask isolation**: a failing handler rejects only its own ask
//! - **Best effort across systems**: no retries, no durable queues
//!
//! # Examples
//!
//! ```rust,ignore
//! use actrix::{reply, Actor, ActorSystem, Context, Result};
//!
//! let system = ActorSystem::new("server");
//! let echo = system.create_actor("echo", EchoActor);
//! let answer = echo.untyped().ask("greet", Greeting { content: "hi".into() }).await?;
//! ```

pub mod actor;
pub mod address;
pub mod composer;
pub mod config;
pub mod error;
pub mod flow;
pub mod mailbox;
pub mod memory;
pub mod messages;
pub mod reference;
mod registry;
pub mod system;
pub mod transport;

pub use actor::{Actor, Context};
pub use address::Address;
pub use composer::{MessageComposer, Untyped};
pub use config::{ActorSystemConfig, DEFAULT_MAILBOX_HIGH_WATER_MARK};
pub use error::{ActorError, Result};
pub use flow::{Flow, FlowHandle};
pub use mailbox::{MailboxStats, ReplyFuture, SchedulerPhase};
pub use memory::MemoryChannel;
pub use messages::{reply, Envelope, Exposes, Method, Mode, Reply, WireMessage};
pub use reference::{ActorRef, TypedRef};
pub use system::{ActorSystem, SystemStats};
pub use transport::{Ack, Channel, MessageHandler, SignalHandler};

// Re-exported for implementors of `Actor`
pub use async_trait::async_trait;
