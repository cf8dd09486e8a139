use std::sync::Arc;
use std::thread;

use newsdesk::llm::Role;
use newsdesk::sessions::{ChatMessage, SessionId, SessionStatus, SessionStore};
use newsdesk::SessionError;

#[test]
fn test_session_crud() {
    let store = SessionStore::new();

    // Test 1: Create session
    let id = store.create("a1");
    let session = store.get(id).expect("Failed to get session");
    assert_eq!(session.id, id);
    assert_eq!(session.article_id, "a1");
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.messages.is_empty());

    // Test 2: Append and read back in order
    store
        .append(id, ChatMessage::user("Hello!"))
        .expect("Failed to store user message");
    let messages = store.get(id).expect("get").messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "Hello!");

    store
        .append_message(id, Role::Assistant, "Hi there!")
        .expect("Failed to store assistant message");
    let messages = store.messages(id).expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);

    // Test 3: Article id lookup
    assert_eq!(store.article_id(id).expect("article id"), "a1");
}

#[test]
fn test_fresh_ids_per_create() {
    let store = SessionStore::new();
    let a = store.create("a1");
    let b = store.create("a1");
    assert_ne!(a, b);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_unknown_session_is_not_found() {
    let store = SessionStore::new();
    let unknown = SessionId::new();

    assert_eq!(
        store.append(unknown, ChatMessage::user("hi")),
        Err(SessionError::NotFound(unknown))
    );
    assert_eq!(store.get(unknown).unwrap_err(), SessionError::NotFound(unknown));
    assert_eq!(store.end(unknown), Err(SessionError::NotFound(unknown)));
}

#[test]
fn test_ended_session_rejects_append() {
    let store = SessionStore::new();
    let id = store.create("a1");
    store.append(id, ChatMessage::user("first")).expect("append");

    store.end(id).expect("first end");
    store.end(id).expect("second end is a no-op");

    let err = store.append(id, ChatMessage::user("late")).unwrap_err();
    assert_eq!(
        err,
        SessionError::InvalidState {
            id,
            status: SessionStatus::Ended
        }
    );

    // History is still readable and unchanged
    let session = store.get(id).expect("get ended session");
    assert_eq!(session.status, SessionStatus::Ended);
    assert_eq!(session.messages.len(), 1);
}

#[test]
fn test_snapshot_is_detached() {
    let store = SessionStore::new();
    let id = store.create("a1");
    let mut snapshot = store.get(id).expect("get");
    snapshot.messages.push(ChatMessage::user("not stored"));
    assert!(store.messages(id).expect("messages").is_empty());
}

#[test]
fn test_list_orders_by_recent_activity() {
    let store = SessionStore::new();
    let older = store.create("a1");
    let newer = store.create("a2");
    let mut late = ChatMessage::user("bump");
    late.created_at += chrono::Duration::seconds(60);
    store.append(newer, late).expect("append");

    let listed = store.list();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, newer);
    assert_eq!(listed[0].message_count, 1);
    assert_eq!(listed[1].id, older);
}

#[test]
fn test_concurrent_appends_are_all_kept() {
    let store = Arc::new(SessionStore::new());
    let id = store.create("busy");

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    store
                        .append_message(id, Role::User, format!("{t}-{i}"))
                        .expect("append");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    let messages = store.messages(id).expect("messages");
    assert_eq!(messages.len(), 400);

    // Per-thread order is preserved
    let thread_three: Vec<_> = messages
        .iter()
        .filter(|m| m.content.starts_with("3-"))
        .map(|m| m.content.clone())
        .collect();
    let expected: Vec<_> = (0..50).map(|i| format!("3-{i}")).collect();
    assert_eq!(thread_three, expected);
}

#[test]
fn test_clear_on_shutdown() {
    let store = SessionStore::new();
    let id = store.create("a1");
    store.create("a2");
    assert_eq!(store.clear(), 2);
    assert_eq!(store.get(id).unwrap_err(), SessionError::NotFound(id));
}
