//! Typed References vs Raw Addresses
//!
//! A typed call, a composed message and a raw `send_message` to the same
//! address must be indistinguishable to the receiving actor.

use actrix::{
    async_trait, reply, Actor, ActorSystem, Address, Context, Exposes, Method, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    text: String,
    priority: u8,
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
enum RecorderMessage {
    Note(Note),
    Entries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    message_type: String,
    note: Note,
    sender: Option<Address>,
}

#[derive(Default)]
struct Recorder {
    entries: Vec<Entry>,
}

struct TakeNote;
struct Entries;

impl Method for TakeNote {
    const TYPE: &'static str = "note";
    type Payload = Note;
    type Response = usize;
}

impl Method for Entries {
    const TYPE: &'static str = "entries";
    type Payload = ();
    type Response = Vec<Entry>;
}

impl Exposes<TakeNote> for Recorder {}
impl Exposes<Entries> for Recorder {}

#[async_trait]
impl Actor for Recorder {
    type Message = RecorderMessage;

    async fn handle(&mut self, msg: RecorderMessage, ctx: &mut Context) -> Result<Value> {
        match msg {
            RecorderMessage::Note(note) => {
                self.entries.push(Entry {
                    message_type: ctx.message_type().unwrap_or_default().to_string(),
                    note,
                    sender: ctx.sender().cloned(),
                });
                reply(self.entries.len())
            }
            RecorderMessage::Entries => reply(&self.entries),
        }
    }
}

fn note() -> Note {
    Note {
        text: "buy milk".to_string(),
        priority: 2,
    }
}

#[tokio::test]
async fn test_typed_and_raw_dispatch_are_equivalent() {
    let system = ActorSystem::new("S");
    let recorder = system.create_actor("recorder", Recorder::default());
    let me = Address::new("S", "me");

    let typed = recorder
        .invoke(Some(me.clone()))
        .ask::<TakeNote>(note())
        .await
        .unwrap();

    let raw = system
        .send_message(
            &Address::new("S", "recorder"),
            "note",
            json!({ "text": "buy milk", "priority": 2 }),
            Some(me.clone()),
        )
        .await
        .unwrap();

    let composed = system
        .compose()
        .class_type::<Recorder>()
        .target(&recorder)
        .sender(me.clone())
        .method::<TakeNote>(note())
        .ask_typed::<usize>()
        .await
        .unwrap();

    assert_eq!((typed, raw, composed), (1, json!(2), 3));

    let entries = recorder.ask::<Entries>(()).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(entries[0].sender, Some(me));
    assert_eq!(entries[0].message_type, "note");
}

#[tokio::test]
async fn test_tell_through_typed_reference() {
    let system = ActorSystem::new("S");
    let recorder = system.create_actor("recorder", Recorder::default());

    recorder.tell::<TakeNote>(note()).unwrap();
    system
        .reference(recorder.address().clone())
        .tell("note", note())
        .unwrap();

    let entries = recorder.ask::<Entries>(()).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], entries[1]);
    assert_eq!(entries[0].sender, None);
}

#[tokio::test]
async fn test_class_type_is_not_checked_at_runtime() {
    struct Unrelated;
    impl Exposes<Entries> for Unrelated {}

    let system = ActorSystem::new("S");
    let recorder = system.create_actor("recorder", Recorder::default());

    // any capability set may be attached to any address
    let mislabelled = system
        .reference(recorder.address().clone())
        .class_type::<Unrelated>();
    assert!(mislabelled.ask::<Entries>(()).await.unwrap().is_empty());
}
