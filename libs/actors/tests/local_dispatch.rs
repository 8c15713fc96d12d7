//! Local Dispatch Integration Tests
//!
//! Exercises one actor system without any channel:
//! - echo round trip through a typed reference and the composer
//! - routing failures for unknown addresses
//! - failure isolation between asks, tells and panics
//! - rejection of unknown message types

use actrix::{
    async_trait, reply, Actor, ActorError, ActorSystem, Address, Context, Exposes, Method, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Greeting {
    content: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum EchoMessage {
    Greet(Greeting),
    Fail { reason: String },
    Explode,
    Count,
}

#[derive(Default)]
struct EchoActor {
    handled: u64,
}

struct Greet;

impl Method for Greet {
    const TYPE: &'static str = "greet";
    type Payload = Greeting;
    type Response = Greeting;
}

struct Count;

impl Method for Count {
    const TYPE: &'static str = "count";
    type Payload = ();
    type Response = u64;
}

impl Exposes<Greet> for EchoActor {}
impl Exposes<Count> for EchoActor {}

#[async_trait]
impl Actor for EchoActor {
    type Message = EchoMessage;

    async fn handle(&mut self, msg: EchoMessage, ctx: &mut Context) -> Result<Value> {
        self.handled += 1;
        match msg {
            EchoMessage::Greet(_) => reply(Greeting {
                content: "thanks".to_string(),
            }),
            EchoMessage::Fail { reason } => Err(ActorError::handler(ctx.name(), reason)),
            EchoMessage::Explode => panic!("boom"),
            EchoMessage::Count => reply(self.handled),
        }
    }
}

fn greeting() -> Greeting {
    Greeting {
        content: "hello".to_string(),
    }
}

#[tokio::test]
async fn test_echo_scenario() {
    let system = ActorSystem::new("S");
    let echo = system.create_actor("echo", EchoActor::default());

    let typed = echo.ask::<Greet>(greeting()).await.unwrap();
    assert_eq!(typed.content, "thanks");

    let composed = system
        .compose()
        .target(Address::new("S", "echo"))
        .message_type("greet")
        .payload(greeting())
        .ask()
        .await
        .unwrap();
    assert_eq!(composed, json!({ "content": "thanks" }));
}

#[tokio::test]
async fn test_unroutable_target_rejects() {
    let system = ActorSystem::new("S");
    system.create_actor("echo", EchoActor::default());

    let err = system
        .send_message(&Address::new("S", "nobody"), "greet", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ActorError::ActorNotFound { ref address } if address.local_address() == "nobody"));
    assert_eq!(err.kind(), "ActorNotFound");

    // the system keeps working
    let echo = system.find_actor(&Address::new("S", "echo")).unwrap();
    assert!(echo.ask("greet", greeting()).await.is_ok());
}

#[tokio::test]
async fn test_ask_isolation() {
    let system = ActorSystem::new("S");
    let echo = system.create_actor("echo", EchoActor::default());
    let raw = echo.untyped();

    let first = raw.ask("fail", json!({ "reason": "first" }));
    let second = raw.ask("greet", greeting());

    let err = first.await.unwrap_err();
    assert!(matches!(err, ActorError::Handler { ref message, .. } if message == "first"));
    assert!(second.await.is_ok());

    // failing tell: nothing settles, the scheduler carries on
    raw.tell("fail", json!({ "reason": "told" })).unwrap();
    assert_eq!(echo.ask::<Count>(()).await.unwrap(), 4);
    assert_eq!(system.metrics().handler_failures, 2);
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let system = ActorSystem::new("S");
    let echo = system.create_actor("echo", EchoActor::default());

    let err = echo.untyped().ask("explode", ()).await.unwrap_err();
    match err {
        ActorError::Handler { message, .. } => assert!(message.contains("boom")),
        other => panic!("unexpected error: {other}"),
    }

    let answer = timeout(Duration::from_secs(1), echo.ask::<Greet>(greeting()))
        .await
        .expect("actor should still be running")
        .unwrap();
    assert_eq!(answer.content, "thanks");
}

#[tokio::test]
async fn test_unknown_message_type_is_handler_error() {
    let system = ActorSystem::new("S");
    let echo = system.create_actor("echo", EchoActor::default());

    let err = echo.untyped().ask("dance", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "HandlerError");
    assert!(err.to_string().contains("dance"));

    // decode failures never reach the handler
    assert_eq!(echo.ask::<Count>(()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_composer_send_swallows_errors() {
    let system = ActorSystem::new("S");
    let echo = system.create_actor("echo", EchoActor::default());

    system.compose().message_type("greet").send();
    system
        .compose()
        .target(Address::new("Elsewhere", "echo"))
        .message_type("greet")
        .payload(greeting())
        .send();
    system
        .compose()
        .target(&echo)
        .message_type("greet")
        .payload(greeting())
        .send();

    assert_eq!(echo.ask::<Count>(()).await.unwrap(), 2);
}
