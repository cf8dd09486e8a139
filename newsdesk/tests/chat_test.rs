use std::sync::{Arc, Mutex};

use anyhow::Result;
use newsdesk::llm::remote::RemoteLlmProvider;
use newsdesk::llm::{ChatRequest, LlmProvider, LlmResponse, Role, UsageMetadata};
use newsdesk::sessions::chat::{ChatService, SessionCreateRequest};
use newsdesk::sessions::{SessionId, SessionStatus, SessionStore};
use newsdesk::{ChatError, ContractError, SessionError, Source};

/// Provider that records every request and answers from a script
struct ScriptedProvider {
    replies: Mutex<Vec<Result<String, String>>>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().remove(0);
        match next {
            Ok(content) => Ok(LlmResponse {
                content,
                usage: UsageMetadata {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                },
                model: "scripted".into(),
                search_hits: Vec::new(),
            }),
            Err(message) => Err(anyhow::anyhow!(message)),
        }
    }
}

fn article_request() -> SessionCreateRequest {
    SessionCreateRequest {
        article_id: "17".into(),
        article_title: "Solar prices fall".into(),
        article_content: "Module prices dropped 20% this year [1].".into(),
        sources: vec![Source::new("reuters.com", 1.0).with_url("https://reuters.com/solar")],
        tags: vec!["energy".into()],
        impact_score: Some(6),
    }
}

#[tokio::test]
async fn test_open_and_send_grounds_reply_in_article() {
    let provider = ScriptedProvider::new(vec![
        Ok("Prices fell because of oversupply.".into()),
        Ok("About 20 percent.".into()),
    ]);
    let store = Arc::new(SessionStore::new());
    let service = ChatService::new(store.clone(), provider.clone())
        .with_greeting(Some("Ask me about this article.".into()));

    let opened = service.open(article_request()).expect("open");
    assert_eq!(opened.messages.len(), 1);
    assert_eq!(opened.messages[0].role, Role::Assistant);

    let first = service
        .send(opened.session_id, "Why did prices fall?")
        .await
        .expect("first turn");
    assert_eq!(first.reply, "Prices fell because of oversupply.");
    assert_eq!(first.messages.len(), 3);
    assert_eq!(first.usage.total_tokens, 5);

    let second = service
        .send(opened.session_id, "By how much?")
        .await
        .expect("second turn");
    assert_eq!(second.messages.len(), 5);

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);

    // system prompt + greeting + user on the first turn
    let first_turns = &requests[0].messages;
    assert_eq!(first_turns.len(), 3);
    assert_eq!(first_turns[0].role, Role::System);
    assert!(first_turns[0].content.contains("Solar prices fall"));
    assert!(first_turns[0].content.contains("https://reuters.com/solar"));
    assert_eq!(first_turns[2].content, "Why did prices fall?");

    // second turn carries the whole prior exchange exactly once
    let second_turns = &requests[1].messages;
    assert_eq!(second_turns.len(), 5);
    assert_eq!(second_turns[3].content, "Prices fell because of oversupply.");
    assert_eq!(second_turns[4].content, "By how much?");

    assert_eq!(store.get(opened.session_id).unwrap().article_id, "17");
}

#[tokio::test]
async fn test_send_to_unknown_or_closed_session() {
    let provider = ScriptedProvider::new(vec![]);
    let store = Arc::new(SessionStore::new());
    let service = ChatService::new(store.clone(), provider.clone());

    let unknown = SessionId::new();
    let err = service.send(unknown, "hi").await.unwrap_err();
    assert!(matches!(err, ChatError::Session(SessionError::NotFound(id)) if id == unknown));

    let opened = service.open(article_request()).expect("open");
    service.close(opened.session_id).expect("close");
    service.close(opened.session_id).expect("close twice");

    let err = service.send(opened.session_id, "hi").await.unwrap_err();
    assert!(matches!(
        err,
        ChatError::Session(SessionError::InvalidState {
            status: SessionStatus::Ended,
            ..
        })
    ));
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_invalid_payloads_are_rejected() {
    let provider = ScriptedProvider::new(vec![]);
    let service = ChatService::new(Arc::new(SessionStore::new()), provider);

    let mut request = article_request();
    request.article_title = " ".into();
    let err = service.open(request).unwrap_err();
    assert!(matches!(
        err,
        ChatError::Contract(ContractError::EmptyField("article_title"))
    ));

    let opened = service.open(article_request()).expect("open");
    let err = service.send(opened.session_id, "   ").await.unwrap_err();
    assert!(matches!(err, ChatError::Contract(ContractError::EmptyField("message"))));
}

#[tokio::test]
async fn test_provider_failure_keeps_user_message() {
    let provider = ScriptedProvider::new(vec![Err("upstream 502".into())]);
    let store = Arc::new(SessionStore::new());
    let service = ChatService::new(store.clone(), provider);

    let opened = service.open(article_request()).expect("open");
    let err = service.send(opened.session_id, "Summarize").await.unwrap_err();
    assert!(matches!(err, ChatError::Provider(_)));
    assert!(err.to_string().contains("upstream 502"));

    let messages = store.messages(opened.session_id).expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn test_chat_against_remote_provider() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"model": "gpt-4o-mini",
                "choices": [{"message": {"role": "assistant", "content": "It is about solar."}}],
                "usage": {"prompt_tokens": 40, "completion_tokens": 6, "total_tokens": 46}}"#,
        )
        .create_async()
        .await;

    let provider: Arc<dyn LlmProvider> =
        Arc::new(RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini"));
    let service = ChatService::new(Arc::new(SessionStore::new()), provider).with_max_tokens(200);

    let opened = service.open(article_request()).expect("open");
    let reply = service
        .send(opened.session_id, "What is this about?")
        .await
        .expect("reply");
    assert_eq!(reply.reply, "It is about solar.");
    assert_eq!(reply.usage.total_tokens, 46);

    mock.assert_async().await;
}

/// Provider that takes a while and answers with the history length it saw
struct SlowCounter {
    seen: Mutex<Vec<usize>>,
}

#[async_trait::async_trait]
impl LlmProvider for SlowCounter {
    async fn chat(&self, request: ChatRequest) -> Result<LlmResponse> {
        let turns = request.messages.len();
        self.seen.lock().unwrap().push(turns);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(LlmResponse {
            content: format!("saw {turns} turns"),
            usage: UsageMetadata::default(),
            model: "slow".into(),
            search_hits: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_concurrent_turns_on_one_session_are_serialized() {
    let provider = Arc::new(SlowCounter {
        seen: Mutex::new(Vec::new()),
    });
    let store = Arc::new(SessionStore::new());
    let service = ChatService::new(store.clone(), provider.clone());
    let opened = service.open(article_request()).expect("open");

    let (a, b) = tokio::join!(
        service.send(opened.session_id, "first"),
        service.send(opened.session_id, "second"),
    );
    a.expect("first turn");
    b.expect("second turn");

    // system + user, then system + user + assistant + user
    assert_eq!(*provider.seen.lock().unwrap(), vec![2, 4]);

    let roles: Vec<_> = store
        .messages(opened.session_id)
        .expect("messages")
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}
