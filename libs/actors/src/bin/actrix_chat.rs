//! Chat demo - one chat room served to several client systems
//!
//! Every client lives in its own actor system, connected to the server
//! system through an in-memory channel pair.
//!
//! Usage:
//!   actrix-chat --clients 3 --message hello --message "how are you"
//!   actrix-chat --config config/chat.toml --log-level debug

use actrix::{
    async_trait, reply, Actor, ActorError, ActorSystem, ActorSystemConfig, Address, Context,
    Exposes, MemoryChannel, Method,
};
use anyhow::{Context as _, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ROOM: &str = "chatActor";

#[derive(Parser, Debug)]
#[command(name = "actrix-chat")]
#[command(about = "Chat room served across in-memory actor systems")]
#[command(version)]
struct Args {
    /// Optional actor system configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of client systems
    #[arg(long, default_value_t = 2)]
    clients: usize,

    /// Message posted by every client
    #[arg(short, long = "message", default_values_t = vec!["hello".to_string()])]
    messages: Vec<String>,

    /// Log filter used when RUST_LOG is unset (e.g. info, actrix=debug)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatLine {
    user: Address,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PostPayload {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UnsubscribePayload {
    address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdatePayload {
    messages: Vec<ChatLine>,
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum RoomMessage {
    Subscribe,
    Unsubscribe(UnsubscribePayload),
    Post(PostPayload),
    History,
}

struct Subscribe;
struct Unsubscribe;
struct Post;
struct History;

impl Method for Subscribe {
    const TYPE: &'static str = "subscribe";
    type Payload = ();
    type Response = ();
}

impl Method for Unsubscribe {
    const TYPE: &'static str = "unsubscribe";
    type Payload = UnsubscribePayload;
    type Response = ();
}

impl Method for Post {
    const TYPE: &'static str = "post";
    type Payload = PostPayload;
    type Response = ();
}

impl Method for History {
    const TYPE: &'static str = "history";
    type Payload = ();
    type Response = Vec<ChatLine>;
}

/// Chat room kept by the server system
#[derive(Default)]
struct ChatRoom {
    subscribers: Vec<Address>,
    messages: Vec<ChatLine>,
}

impl Exposes<Subscribe> for ChatRoom {}
impl Exposes<Unsubscribe> for ChatRoom {}
impl Exposes<Post> for ChatRoom {}
impl Exposes<History> for ChatRoom {}

impl ChatRoom {
    fn update(ctx: &Context, subscriber: &Address, messages: Vec<ChatLine>) {
        ctx.compose()
            .target(subscriber)
            .class_type::<ChatClient>()
            .method::<Update>(UpdatePayload { messages })
            .send();
    }
}

#[async_trait]
impl Actor for ChatRoom {
    type Message = RoomMessage;

    async fn handle(&mut self, msg: RoomMessage, ctx: &mut Context) -> actrix::Result<Value> {
        match msg {
            RoomMessage::Subscribe => {
                let subscriber = ctx
                    .sender()
                    .cloned()
                    .ok_or_else(|| ActorError::handler(ctx.name(), "subscribe needs a sender"))?;
                info!(subscriber = %subscriber, "Subscribe request");
                Self::update(ctx, &subscriber, self.messages.clone());
                self.subscribers.push(subscriber);
                reply(())
            }
            RoomMessage::Unsubscribe(UnsubscribePayload { address }) => {
                info!(subscriber = %address, "Unsubscribe request");
                self.subscribers.retain(|s| s != &address);
                reply(())
            }
            RoomMessage::Post(PostPayload { message }) => {
                let user = ctx
                    .sender()
                    .cloned()
                    .ok_or_else(|| ActorError::handler(ctx.name(), "post needs a sender"))?;
                info!(user = %user, message = %message, "New message");
                let line = ChatLine { user, message };
                self.messages.push(line.clone());
                for subscriber in &self.subscribers {
                    Self::update(ctx, subscriber, vec![line.clone()]);
                }
                reply(())
            }
            RoomMessage::History => reply(&self.messages),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum ClientMessage {
    Send(PostPayload),
    Update(UpdatePayload),
    Transcript,
}

struct SendLine;
struct Update;
struct Transcript;

impl Method for SendLine {
    const TYPE: &'static str = "send";
    type Payload = PostPayload;
    type Response = ();
}

impl Method for Update {
    const TYPE: &'static str = "update";
    type Payload = UpdatePayload;
    type Response = ();
}

impl Method for Transcript {
    const TYPE: &'static str = "transcript";
    type Payload = ();
    type Response = Vec<ChatLine>;
}

/// Chat participant living in a client system
struct ChatClient {
    room: Address,
    messages: Vec<ChatLine>,
}

impl Exposes<SendLine> for ChatClient {}
impl Exposes<Update> for ChatClient {}
impl Exposes<Transcript> for ChatClient {}

#[async_trait]
impl Actor for ChatClient {
    type Message = ClientMessage;

    async fn started(&mut self, ctx: &mut Context) -> actrix::Result<()> {
        ctx.at::<ChatRoom>(&self.room).tell::<Subscribe>(())
    }

    async fn handle(&mut self, msg: ClientMessage, ctx: &mut Context) -> actrix::Result<Value> {
        match msg {
            ClientMessage::Send(payload) => {
                ctx.at::<ChatRoom>(&self.room).tell::<Post>(payload)?;
                reply(())
            }
            ClientMessage::Update(UpdatePayload { messages }) => {
                info!(client = %ctx.address(), received = messages.len(), "Update is coming");
                self.messages.extend(messages);
                reply(())
            }
            ClientMessage::Transcript => reply(&self.messages),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = ActorSystemConfig::load(args.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {:#}", e);
        e
    })?;

    info!("Starting chat demo with {} clients", args.clients);

    let server = ActorSystem::with_config(ActorSystemConfig {
        name: Some("server".to_string()),
        ..config.clone()
    });
    let room = server.create_actor(ROOM, ChatRoom::default());

    let mut clients = Vec::with_capacity(args.clients);
    for i in 0..args.clients {
        let system = ActorSystem::with_config(ActorSystemConfig {
            name: Some(format!("client-{}", i)),
            ..config.clone()
        });

        let (server_end, client_end) = MemoryChannel::pair();
        server
            .register(server_end)
            .context("Failed to attach client channel to server")?;
        system
            .register(client_end)
            .context("Failed to connect client system")?;

        let client = system.create_actor(
            "chatClient",
            ChatClient {
                room: room.address().clone(),
                messages: Vec::new(),
            },
        );
        clients.push((system, client));
    }

    // let subscriptions land before anyone posts
    tokio::time::sleep(Duration::from_millis(50)).await;

    for message in &args.messages {
        for (_, client) in &clients {
            client.tell::<SendLine>(PostPayload {
                message: message.clone(),
            })?;
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    let history = room.ask::<History>(()).await?;
    info!("Room history has {} messages", history.len());

    for (system, client) in &clients {
        let transcript = client.ask::<Transcript>(()).await?;
        println!("== {} ==", system.name());
        for line in transcript {
            println!("{}: {}", line.user, line.message);
        }
    }

    for (system, client) in &clients {
        room.invoke(Some(client.address().clone()))
            .tell::<Unsubscribe>(UnsubscribePayload {
                address: client.address().clone(),
            })?;
        system.shutdown();
    }
    server.shutdown();

    let stats = server.metrics();
    info!(
        messages_processed = stats.messages_processed,
        remote_envelopes_received = stats.remote_envelopes_received,
        "Server finished"
    );

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    // RUST_LOG wins; --log-level is the fallback directive
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .with_context(|| format!("Invalid log level: {}", args.log_level))?;

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}
