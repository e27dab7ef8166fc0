//! CompletionClient against a mock gateway.

use httpmock::prelude::*;
use insight_engine::{
    ChatTurn, CompletionClient, CompletionRequest, CompletionService, EngineError,
};
use serde_json::json;

fn client_for(server: &MockServer) -> CompletionClient {
    CompletionClient::new("sk-test")
        .with_api_url(server.url("/v1/chat/completions"))
        .with_model("test/model")
}

#[tokio::test]
async fn sends_system_history_and_question() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .json_body_partial(
                    r#"{
                        "model": "test/model",
                        "messages": [
                            { "role": "system", "content": "be brief" },
                            { "role": "user", "content": "hi" },
                            { "role": "assistant", "content": "namaste" },
                            { "role": "user", "content": "stock?" }
                        ]
                    }"#,
                );
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Sab theek hai.  " } }]
            }));
        })
        .await;

    let request = CompletionRequest::new("be brief", "stock?")
        .with_history(vec![ChatTurn::user("hi"), ChatTurn::assistant("namaste")]);
    let reply = client_for(&server).complete(request).await.unwrap();

    assert_eq!(reply, "Sab theek hai.");
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limit_and_credit_errors_are_distinguished() {
    let server = MockServer::start_async().await;
    let client = client_for(&server);

    let mut limited = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(429).body("slow down");
        })
        .await;
    let err = client
        .complete(CompletionRequest::new("s", "u"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RateLimited));
    limited.delete_async().await;

    let mut credits = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(402).body("pay up");
        })
        .await;
    let err = client
        .complete(CompletionRequest::new("s", "u"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PaymentRequired));
    credits.delete_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(500).body("internal details");
        })
        .await;
    let err = client
        .complete(CompletionRequest::new("s", "u"))
        .await
        .unwrap_err();
    match err {
        EngineError::ApiError { status, message } => {
            assert_eq!(status, 500);
            assert!(!message.contains("internal details"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_choice_is_an_invalid_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({ "choices": [] }));
        })
        .await;

    let err = client_for(&server)
        .complete(CompletionRequest::new("s", "u"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidResponse(_)));
}
