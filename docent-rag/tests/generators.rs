//! Generation backends against local stand-in servers that replay canned answers.

use docent_embed::RemoteConfig;
use docent_rag::{
    FailoverGenerator, GeminiGenerator, GenerateError, GenerationBackend, GenerationBackendKind,
    GenerationConfig, OllamaGenerator,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_test::traced_test;

/// Serve `responses` in order, one per connection, recording each request.
async fn canned_server(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            seen.lock().unwrap().push(request);
            let reply = format!(
                "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    (base_url, requests)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn remote(base_url: &str) -> RemoteConfig {
    RemoteConfig::default()
        .with_api_key("test-key")
        .with_base_url(base_url)
        .with_retry_backoff_ms(10)
}

fn gemini(base_url: &str) -> GeminiGenerator {
    let config = GenerationConfig {
        backend: GenerationBackendKind::Remote,
        ..GenerationConfig::default()
    };
    GeminiGenerator::new(&config, &remote(base_url)).unwrap()
}

fn local_config(endpoint: &str) -> GenerationConfig {
    GenerationConfig {
        endpoint: endpoint.to_string(),
        local_model: Some("llama3.2:1b".into()),
        max_tokens: 200,
        ..GenerationConfig::default()
    }
}

const TAGS: &str = r#"{"models":[{"name":"llama3.2:1b"},{"name":"nomic-embed-text:latest"}]}"#;

#[tokio::test]
async fn test_gemini_generates_text() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"The sky is blue [1]."}]},"finishReason":"STOP"}]}"#;
    let (base_url, requests) = canned_server(vec![(200, body.to_string())]).await;

    let generation = gemini(&base_url).generate("prompt text").await.unwrap();

    assert_eq!(generation.text, "The sky is blue [1].");
    assert_eq!(generation.backend, "gemini");
    let requests = requests.lock().unwrap();
    assert!(requests[0].starts_with("POST /v1beta/models/gemini-1.5-flash:generateContent"));
    assert!(requests[0].contains("x-goog-api-key: test-key"));
    assert!(requests[0].contains("prompt text"));
}

#[tokio::test]
#[traced_test]
async fn test_gemini_retries_server_error_once() {
    let ok = r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]}}]}"#;
    let (base_url, requests) = canned_server(vec![
        (503, "overloaded".to_string()),
        (200, ok.to_string()),
    ])
    .await;

    let generation = gemini(&base_url).generate("q").await.unwrap();

    assert_eq!(generation.text, "ok");
    assert_eq!(requests.lock().unwrap().len(), 2);
    assert!(logs_contain("retrying"));
}

#[tokio::test]
async fn test_gemini_error_mapping() {
    let limited = r#"{"error":{"code":429}}"#.to_string();
    let (base_url, _) = canned_server(vec![(429, limited.clone()), (429, limited)]).await;
    let err = gemini(&base_url).generate("q").await.unwrap_err();
    assert!(matches!(err, GenerateError::RateLimited { .. }));

    let (base_url, requests) = canned_server(vec![(401, "{}".to_string())]).await;
    let err = gemini(&base_url).generate("q").await.unwrap_err();
    assert_eq!(err.code(), "upstream_unavailable");
    assert_eq!(requests.lock().unwrap().len(), 1, "auth failures are not retried");

    let (base_url, _) = canned_server(vec![(200, "not json".to_string())]).await;
    let err = gemini(&base_url).generate("q").await.unwrap_err();
    assert_eq!(err.code(), "invalid_response");
}

#[tokio::test]
async fn test_ollama_checks_model_then_generates() {
    let (endpoint, requests) = canned_server(vec![
        (200, TAGS.to_string()),
        (200, r#"{"model":"llama3.2:1b","response":" Water is wet. ","done":true}"#.to_string()),
    ])
    .await;

    let generator = OllamaGenerator::connect(&local_config(&endpoint)).await.unwrap();
    let generation = generator.generate("prompt").await.unwrap();

    assert_eq!(generation.text, "Water is wet.");
    assert_eq!(generation.backend, "ollama");
    let requests = requests.lock().unwrap();
    assert!(requests[0].starts_with("GET /api/tags"));
    assert!(requests[1].starts_with("POST /api/generate"));
    assert!(requests[1].contains("\"num_predict\":200"));
    assert!(requests[1].contains("\"stream\":false"));
}

#[tokio::test]
async fn test_ollama_missing_model_fails_at_connect() {
    let (endpoint, _) =
        canned_server(vec![(200, r#"{"models":[{"name":"mistral:7b"}]}"#.to_string())]).await;

    let err = OllamaGenerator::connect(&local_config(&endpoint))
        .await
        .unwrap_err();

    assert!(matches!(err, GenerateError::ModelLoad { .. }));
    assert!(err.to_string().contains("ollama pull llama3.2:1b"));
}

#[tokio::test]
async fn test_ollama_out_of_memory() {
    let oom = r#"{"error":"model requires more system memory (5.5 GiB) than is available (2.0 GiB)"}"#;
    let (endpoint, requests) =
        canned_server(vec![(200, TAGS.to_string()), (500, oom.to_string())]).await;

    let generator = OllamaGenerator::connect(&local_config(&endpoint)).await.unwrap();
    let err = generator.generate("prompt").await.unwrap_err();

    assert!(matches!(err, GenerateError::OutOfMemory { .. }));
    assert_eq!(requests.lock().unwrap().len(), 2, "local calls are not retried");
}

#[tokio::test]
#[traced_test]
async fn test_failover_from_gemini_to_ollama() {
    let (gemini_url, gemini_requests) = canned_server(vec![
        (503, "down".to_string()),
        (503, "still down".to_string()),
    ])
    .await;
    let (ollama_url, _) = canned_server(vec![
        (200, TAGS.to_string()),
        (200, r#"{"response":"local answer","done":true}"#.to_string()),
    ])
    .await;

    let fallback = OllamaGenerator::connect(&local_config(&ollama_url)).await.unwrap();
    let failover = FailoverGenerator::new(gemini(&gemini_url), fallback, Duration::from_secs(60));

    let first = failover.generate("q").await.unwrap_err();
    assert_eq!(first.code(), "upstream_unavailable");
    assert_eq!(gemini_requests.lock().unwrap().len(), 2);

    let second = failover.generate("q").await.unwrap();
    assert_eq!(second.text, "local answer");
    assert_eq!(second.backend, "ollama");
    assert_eq!(failover.active_backend(), "ollama (failover)");
    assert!(logs_contain("routing questions to ollama"));
}
