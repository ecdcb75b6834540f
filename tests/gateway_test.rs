mod common;

use common::{closed_port_url, FakeServer, Reply};
use queryverse::credentials::{InMemoryCredentialStore, ProviderCredentials};
use queryverse::llm::{
    GatewayErrorKind, GroqProvider, ModelGateway, ModelProvider, OllamaProvider, ProviderKind, TogetherProvider,
    FAILURE_MARKER,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn chat_reply(content: &str) -> Reply {
    Reply::json(
        200,
        json!({
            "id": "cmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        }),
    )
}

fn ollama_server_handler(generate: Reply) -> impl Fn(&common::RecordedRequest) -> Reply + Send + Sync + 'static {
    move |req| match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/") => Reply::text(200, "Ollama is running"),
        ("POST", "/api/generate") => generate.clone(),
        _ => Reply::text(404, "not found"),
    }
}

#[tokio::test]
async fn test_ollama_unreachable_returns_promptly() {
    let url = closed_port_url();
    let provider = OllamaProvider::new(&url, Duration::from_secs(2), Duration::from_secs(30)).unwrap();

    let started = Instant::now();
    let err = provider.invoke("optimize this", "mistral").await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(err.kind, GatewayErrorKind::Unreachable);
    let text = err.to_string();
    assert!(text.starts_with(FAILURE_MARKER));
    assert!(text.contains("ollama run mistral"));
}

#[tokio::test]
async fn test_ollama_generates_after_probe() {
    let server = FakeServer::start(ollama_server_handler(Reply::json(
        200,
        json!({"model": "mistral", "response": "  SELECT 1;  ", "done": true}),
    )))
    .await;
    let provider = OllamaProvider::new(&server.url, Duration::from_secs(2), Duration::from_secs(5)).unwrap();

    let out = provider.invoke("optimize this", "mistral").await.unwrap();
    assert_eq!(out, "SELECT 1;");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "GET");
    let body = requests[1].json();
    assert_eq!(body["model"], "mistral");
    assert_eq!(body["prompt"], "optimize this");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_ollama_probe_must_be_200() {
    let server = FakeServer::start(|_| Reply::text(404, "nope")).await;
    let provider = OllamaProvider::new(&server.url, Duration::from_secs(2), Duration::from_secs(5)).unwrap();

    let err = provider.invoke("p", "mistral").await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Unreachable);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_ollama_error_status() {
    let server = FakeServer::start(ollama_server_handler(Reply::text(500, "model not found"))).await;
    let provider = OllamaProvider::new(&server.url, Duration::from_secs(2), Duration::from_secs(5)).unwrap();

    let err = provider.invoke("p", "missing-model").await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::BadStatus(500));
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn test_ollama_empty_response_is_malformed() {
    let server = FakeServer::start(ollama_server_handler(Reply::json(200, json!({"response": "   "})))).await;
    let provider = OllamaProvider::new(&server.url, Duration::from_secs(2), Duration::from_secs(5)).unwrap();

    let err = provider.invoke("p", "mistral").await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Malformed);
    assert!(err.message.contains("No output from the model."));
}

#[tokio::test]
async fn test_groq_sends_bearer_and_system_message() {
    let server = FakeServer::start(|_| chat_reply("SELECT id FROM t;")).await;
    let store = InMemoryCredentialStore::new().with(ProviderKind::Groq, ProviderCredentials::new("gsk-test", ""));
    let provider = GroqProvider::new(&server.url, Duration::from_secs(5), Arc::new(store)).unwrap();

    let out = provider.invoke("optimize this", "llama-4").await.unwrap();
    assert_eq!(out, "SELECT id FROM t;");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/chat/completions");
    assert_eq!(requests[0].header("Authorization"), Some("Bearer gsk-test"));

    let body = requests[0].json();
    assert_eq!(body["model"], "llama-4");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "You are a helpful assistant.");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "optimize this");
}

#[tokio::test]
async fn test_together_sends_single_user_message() {
    let server = FakeServer::start(|_| chat_reply("SELECT 1;")).await;
    let store = InMemoryCredentialStore::new().with(ProviderKind::Together, ProviderCredentials::new("tg-key", ""));
    let provider = TogetherProvider::new(&server.url, Duration::from_secs(5), Arc::new(store)).unwrap();

    provider.invoke("hello", "m").await.unwrap();

    let body = server.requests()[0].json();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[tokio::test]
async fn test_together_malformed_response() {
    let server = FakeServer::start(|_| Reply::json(200, json!({"choices": []}))).await;
    let store = InMemoryCredentialStore::new().with(ProviderKind::Together, ProviderCredentials::new("tg-key", ""));
    let provider = TogetherProvider::new(&server.url, Duration::from_secs(5), Arc::new(store)).unwrap();

    let err = provider.invoke("hello", "m").await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Malformed);
    assert!(err.to_string().starts_with(FAILURE_MARKER));
}

#[tokio::test]
async fn test_hosted_error_status_keeps_body() {
    let server = FakeServer::start(|_| Reply::json(401, json!({"error": {"message": "invalid api key"}}))).await;
    let store = InMemoryCredentialStore::new().with(ProviderKind::Groq, ProviderCredentials::new("bad", ""));
    let provider = GroqProvider::new(&server.url, Duration::from_secs(5), Arc::new(store)).unwrap();

    let err = provider.invoke("hello", "m").await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::BadStatus(401));
    assert!(err.to_string().contains("invalid api key"));
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let server = FakeServer::start(|_| chat_reply("SELECT 1;")).await;
    let provider =
        TogetherProvider::new(&server.url, Duration::from_secs(5), Arc::new(InMemoryCredentialStore::new())).unwrap();

    let err = provider.invoke("hello", "m").await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Unconfigured);
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_gateway_routes_by_provider() {
    let server = FakeServer::start(|_| chat_reply("SELECT 2;")).await;
    let store = Arc::new(
        InMemoryCredentialStore::new()
            .with(ProviderKind::Groq, ProviderCredentials::new("gsk", ""))
            .with(ProviderKind::Together, ProviderCredentials::new("tg", "")),
    );
    let gateway = ModelGateway::new()
        .with_provider(GroqProvider::new(&server.url, Duration::from_secs(5), store.clone()).unwrap())
        .with_provider(TogetherProvider::new(&server.url, Duration::from_secs(5), store).unwrap());

    assert_eq!(gateway.invoke("p", "m", ProviderKind::Together).await.unwrap(), "SELECT 2;");
    assert_eq!(server.requests()[0].header("authorization"), Some("Bearer tg"));

    let err = gateway.invoke("p", "m", ProviderKind::Ollama).await.unwrap_err();
    assert_eq!(err.kind, GatewayErrorKind::Unconfigured);
}
