use super::Message;
use super::Role;
use super::Transcript;

#[test]
fn it_executes_new() {
    let msg = Message::new(Role::User, "Hi there!");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.content, "Hi there!".to_string());
    assert!(msg.images.is_empty());
    assert!(!msg.id.is_empty());
    assert!(msg.timestamp > 0);
}

#[test]
fn it_creates_unique_ids() {
    let first = Message::placeholder();
    let second = Message::placeholder();
    assert_ne!(first.id, second.id);
}

#[test]
fn it_creates_placeholders() {
    let msg = Message::placeholder();
    assert_eq!(msg.role, Role::Assistant);
    assert!(msg.is_placeholder());
    assert!(!Message::user("", vec![]).is_placeholder());
}

#[test]
fn it_serializes_camel_case_without_empty_images() -> anyhow::Result<()> {
    let mut msg = Message::new(Role::Assistant, "Hello");
    msg.id = "1".to_string();
    msg.timestamp = 42;

    let res = serde_json::to_string(&msg)?;
    insta::assert_snapshot!(res, @r###"{"id":"1","role":"assistant","content":"Hello","timestamp":42}"###);

    return Ok(());
}

#[test]
fn it_serializes_images() -> anyhow::Result<()> {
    let msg = Message::user("Look", vec!["data:image/png;base64,AAAA".to_string()]);
    let value = serde_json::to_value(&msg)?;
    assert_eq!(value["role"], "user");
    assert_eq!(value["images"][0], "data:image/png;base64,AAAA");

    return Ok(());
}

#[test]
fn it_sets_content_by_id() {
    let mut transcript = Transcript::default();
    let placeholder = Message::placeholder();
    let id = placeholder.id.to_string();
    transcript.push(Message::user("Hi", vec![]));
    transcript.push(placeholder);

    assert!(transcript.set_content(&id, "Hello"));
    assert_eq!(transcript.get(&id).unwrap().content, "Hello");
    assert!(!transcript.set_content("missing", "Nope"));
}

#[test]
fn it_finds_last_user_index() {
    let mut transcript = Transcript::default();
    assert_eq!(transcript.last_user_index(), None);

    transcript.push(Message::user("One", vec![]));
    transcript.push(Message::new(Role::Assistant, "Two"));
    transcript.push(Message::user("Three", vec![]));
    transcript.push(Message::new(Role::Assistant, "Four"));

    assert_eq!(transcript.last_user_index(), Some(2));
}

#[test]
fn it_removes_by_id() {
    let mut transcript = Transcript::default();
    let msg = Message::user("One", vec![]);
    let id = msg.id.to_string();
    transcript.push(msg);
    transcript.remove(&id);
    assert!(transcript.is_empty());
}
