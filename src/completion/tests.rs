use super::*;
use crate::config::CompletionConfig;
use serial_test::serial;

fn test_config() -> CompletionConfig {
    CompletionConfig::default()
}

#[test]
fn client_requires_non_empty_key() {
    let config = test_config();
    assert!(CompletionClient::new(&config, String::new()).is_err());
    assert!(CompletionClient::new(&config, "  ".to_string()).is_err());
    assert!(CompletionClient::new(&config, "gsk_test".to_string()).is_ok());
}

#[test]
#[serial]
fn from_env_fails_without_key() {
    let mut config = test_config();
    config.api_key_env = "PORTFOLIO_QA_TEST_MISSING_KEY".to_string();
    // SAFETY: serialized test; no other thread reads the environment here
    unsafe { std::env::remove_var(&config.api_key_env) };

    let result = CompletionClient::from_env(&config);
    assert!(matches!(result, Err(crate::PortfolioError::Config(_))));
}

#[test]
#[serial]
fn from_env_reads_configured_variable() {
    let mut config = test_config();
    config.api_key_env = "PORTFOLIO_QA_TEST_KEY".to_string();
    // SAFETY: serialized test; no other thread reads the environment here
    unsafe { std::env::set_var(&config.api_key_env, "gsk_test") };

    let client = CompletionClient::from_env(&config).expect("should create client");
    assert_eq!(client.model(), "llama-3.1-8b-instant");

    unsafe { std::env::remove_var(&config.api_key_env) };
}

#[test]
fn chat_url_joins_base_path() {
    let mut config = test_config();
    config.base_url = "https://api.groq.com/openai/v1".to_string();
    let client = CompletionClient::new(&config, "gsk_test".to_string()).expect("client");
    let url = client.chat_endpoint().expect("should build url");
    assert_eq!(
        url.as_str(),
        "https://api.groq.com/openai/v1/chat/completions"
    );

    let mut config = test_config();
    config.base_url = "http://localhost:8080/".to_string();
    let client = CompletionClient::new(&config, "gsk_test".to_string()).expect("client");
    let url = client.chat_endpoint().expect("should build url");
    assert_eq!(url.as_str(), "http://localhost:8080/chat/completions");
}

#[test]
fn request_shape_matches_chat_completions_api() {
    let request = ChatRequest {
        model: "llama-3.1-8b-instant".to_string(),
        messages: vec![ChatMessage {
            role: "user",
            content: "hello".to_string(),
        }],
        temperature: 0.3,
        max_tokens: 500,
    };

    let json: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&request).expect("serialize"))
            .expect("round trip");
    assert_eq!(json["model"], "llama-3.1-8b-instant");
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["messages"][0]["content"], "hello");
    assert_eq!(json["max_tokens"], 500);
}

#[test]
fn response_parsing_takes_first_choice() {
    let body = r#"{
        "choices": [
            {"message": {"role": "assistant", "content": "  Sarah knows Python.  "}}
        ]
    }"#;
    let response: ChatResponse = serde_json::from_str(body).expect("should parse");
    assert_eq!(response.choices.len(), 1);
    assert_eq!(
        response.choices[0].message.content.trim(),
        "Sarah knows Python."
    );
}
