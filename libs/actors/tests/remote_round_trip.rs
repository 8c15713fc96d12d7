//! Cross-System Integration Tests
//!
//! Two actor systems connected through a `MemoryChannel` pair:
//! - handshake registration and ask/tell round trips
//! - remote handler failures surfacing as `ActorError::Remote`
//! - replies addressed to a sender on the other side
//! - disconnect and reconnect handling

use actrix::{
    async_trait, reply, Ack, Actor, ActorError, ActorSystem, Address, Channel, Context,
    MemoryChannel, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Greeting {
    content: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum ServerMessage {
    Greet(Greeting),
    Reject,
    /// Answer the sender with a tell instead of a reply
    Ping,
}

struct ServerActor;

#[async_trait]
impl Actor for ServerActor {
    type Message = ServerMessage;

    async fn handle(&mut self, msg: ServerMessage, ctx: &mut Context) -> Result<Value> {
        match msg {
            ServerMessage::Greet(_) => reply(Greeting {
                content: "thanks".to_string(),
            }),
            ServerMessage::Reject => Err(ActorError::handler(ctx.name(), "not today")),
            ServerMessage::Ping => {
                let sender = ctx
                    .sender_ref()
                    .ok_or_else(|| ActorError::handler(ctx.name(), "ping needs a sender"))?;
                sender.tell("pong", ctx.address())?;
                reply(())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum ProbeMessage {
    Pong(Address),
}

struct Probe {
    events: mpsc::UnboundedSender<Address>,
}

#[async_trait]
impl Actor for Probe {
    type Message = ProbeMessage;

    async fn handle(&mut self, msg: ProbeMessage, _ctx: &mut Context) -> Result<Value> {
        match msg {
            ProbeMessage::Pong(from) => {
                let _ = self.events.send(from);
                reply(())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum CounterMessage {
    Hit,
    Count,
}

#[derive(Default)]
struct Counter {
    hits: u64,
}

#[async_trait]
impl Actor for Counter {
    type Message = CounterMessage;

    async fn handle(&mut self, msg: CounterMessage, _ctx: &mut Context) -> Result<Value> {
        match msg {
            CounterMessage::Hit => {
                self.hits += 1;
                reply(self.hits)
            }
            CounterMessage::Count => reply(self.hits),
        }
    }
}

/// Server and client systems with both sides announced
fn connected() -> (ActorSystem, ActorSystem, Arc<MemoryChannel>) {
    let server = ActorSystem::new("server");
    let client = ActorSystem::new("client");
    let (server_end, client_end) = MemoryChannel::pair();

    server.register(server_end).unwrap();
    client.register(client_end.clone()).unwrap();
    (server, client, client_end)
}

#[tokio::test]
async fn test_handshake_registers_both_sides() {
    let (server, client, _channel) = connected();
    assert_eq!(server.remote_systems(), vec!["client".to_string()]);
    assert_eq!(client.remote_systems(), vec!["server".to_string()]);
}

#[tokio::test]
async fn test_repeated_listen_delivers_each_envelope_once() {
    let server = ActorSystem::new("server");
    let client = ActorSystem::new("client");
    let (server_end, client_end) = MemoryChannel::pair();

    server.register(server_end.clone()).unwrap();
    server.listen_to(server_end.clone());
    server.register(server_end).unwrap();
    client.register(client_end).unwrap();
    server.create_actor("counter", Counter::default());

    let counter = Address::new("server", "counter");
    let hits = client
        .send_message(&counter, "hit", Value::Null, None)
        .await
        .unwrap();
    assert_eq!(hits, json!(1));

    client.tell(&counter, "hit", Value::Null, None).unwrap();
    let count = client
        .send_message(&counter, "count", Value::Null, None)
        .await
        .unwrap();
    assert_eq!(count, json!(2));
    assert_eq!(server.metrics().remote_envelopes_received, 3);
}

#[tokio::test]
async fn test_listen_only_side_is_not_announced() {
    let server = ActorSystem::new("server");
    let client = ActorSystem::new("client");
    let (server_end, client_end) = MemoryChannel::pair();

    server.listen_to(server_end);
    client.register(client_end).unwrap();

    assert_eq!(server.remote_systems(), vec!["client".to_string()]);
    assert!(client.remote_systems().is_empty());
}

#[tokio::test]
async fn test_remote_ask_round_trip() {
    let (server, client, _channel) = connected();
    server.create_actor("echo", ServerActor);

    let answer = client
        .send_message(
            &Address::new("server", "echo"),
            "greet",
            json!({ "content": "hello" }),
            None,
        )
        .await
        .unwrap();
    assert_eq!(answer, json!({ "content": "thanks" }));

    let stats = server.metrics();
    assert_eq!(stats.remote_envelopes_received, 1);
    assert_eq!(client.metrics().remote_envelopes_sent, 1);
}

#[tokio::test]
async fn test_remote_failure_rejects_asker() {
    let (server, client, _channel) = connected();
    server.create_actor("echo", ServerActor);

    let err = client
        .reference(Address::new("server", "echo"))
        .ask("reject", ())
        .await
        .unwrap_err();
    match err {
        ActorError::Remote { kind, message } => {
            assert_eq!(kind, "HandlerError");
            assert!(message.contains("not today"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // so is a message type the remote actor does not understand
    let err = client
        .reference(Address::new("server", "echo"))
        .ask("unknown", ())
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Remote { ref kind, .. } if kind == "HandlerError"));
}

#[tokio::test]
async fn test_unknown_remote_system() {
    let (_server, client, _channel) = connected();

    let err = client
        .send_message(&Address::new("elsewhere", "echo"), "greet", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::ActorSystemNotFound { ref name } if name == "elsewhere"));
}

#[tokio::test]
async fn test_reply_to_sender_across_boundary() {
    let (server, client, _channel) = connected();
    server.create_actor("echo", ServerActor);

    let (events, mut received) = mpsc::unbounded_channel();
    let probe = client.create_actor("probe", Probe { events });

    client
        .reference(Address::new("server", "echo"))
        .invoke(Some(probe.address().clone()))
        .tell("ping", ())
        .unwrap();

    let from = timeout(Duration::from_secs(1), received.recv())
        .await
        .expect("pong should arrive")
        .unwrap();
    assert_eq!(from, Address::new("server", "echo"));
}

#[tokio::test]
async fn test_unrouted_remote_ask_is_dropped_without_reply() {
    let (server, client, _channel) = connected();

    // the far side drops the envelope and its acknowledgement
    let err = client
        .send_message(&Address::new("server", "ghost"), "greet", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Channel { .. }));
    assert_eq!(server.metrics().unrouted_dropped, 1);

    client
        .reference(Address::new("server", "ghost"))
        .tell("greet", json!({}))
        .unwrap();
    assert_eq!(server.metrics().unrouted_dropped, 2);
}

#[tokio::test]
async fn test_disconnect_removes_remote_and_reconnect_restores() {
    let (server, client, channel) = connected();
    server.create_actor("echo", ServerActor);

    channel.disconnect();
    assert!(server.remote_systems().is_empty());
    assert!(client.remote_systems().is_empty());

    let err = client
        .send_message(&Address::new("server", "echo"), "greet", json!({}), None)
        .await
        .unwrap_err();
    assert!(err.is_routing());

    channel.reconnect();
    assert_eq!(client.remote_systems(), vec!["server".to_string()]);
    assert_eq!(server.remote_systems(), vec!["client".to_string()]);

    let answer = client
        .send_message(
            &Address::new("server", "echo"),
            "greet",
            json!({ "content": "again" }),
            None,
        )
        .await
        .unwrap();
    assert_eq!(answer["content"], "thanks");
}

#[tokio::test]
async fn test_dropped_acknowledgement_rejects_ask() {
    let client = ActorSystem::new("client");
    let (peer_end, client_end) = MemoryChannel::pair();
    client.listen_to(client_end.clone());

    // a peer that announces itself, then discards every acknowledgement
    peer_end.on_message(Arc::new(|_payload: Value, ack: Option<Ack>| drop(ack)));
    peer_end
        .emit(json!({ "mode": "handshake", "address": "mute" }), None)
        .unwrap();
    assert_eq!(client.remote_systems(), vec!["mute".to_string()]);

    let err = client
        .send_message(&Address::new("mute", "echo"), "greet", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::Channel { .. }));
}

#[tokio::test]
async fn test_wire_format_of_outgoing_ask() {
    let client = ActorSystem::new("client");
    let (peer_end, client_end) = MemoryChannel::pair();
    client.register(client_end.clone()).unwrap();

    let (frames, mut seen) = mpsc::unbounded_channel();
    peer_end.on_message(Arc::new(move |payload: Value, ack: Option<Ack>| {
        let _ = frames.send(payload);
        if let Some(ack) = ack {
            ack(json!({ "ok": "done" }));
        }
    }));
    peer_end
        .emit(json!({ "mode": "handshake", "address": "peer" }), None)
        .unwrap();

    let me = Address::new("client", "me");
    let answer = client
        .send_message(&Address::new("peer", "x"), "greet", json!({ "n": 1 }), Some(me))
        .await
        .unwrap();
    assert_eq!(answer, json!("done"));

    assert_eq!(
        seen.recv().await.unwrap(),
        json!({ "mode": "handshake", "address": "client" })
    );
    assert_eq!(
        seen.recv().await.unwrap(),
        json!({
            "mode": "ask",
            "type": "greet",
            "payload": { "n": 1 },
            "targetAddress": { "actorSystemName": "peer", "localAddress": "x" },
            "senderAddress": { "actorSystemName": "client", "localAddress": "me" }
        })
    );
}
