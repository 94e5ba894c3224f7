use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::{TestServer, TestServerConfig, Transport};
use chapter_chat::config::CompletionSettings;
use chapter_chat::web_server::{build_router, AppState, ChaptersResponse, RespondResponse, WebOptions};
use chapter_chat::{Chapter, ChapterStore, ConversationTurn, OpenAiClient};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn store() -> ChapterStore {
    ChapterStore::from_chapters(vec![
        Chapter {
            name: "chapter_1.txt".to_string(),
            text: "Ants cooperate via pheromones.".to_string(),
        },
        Chapter { name: "chapter_2.txt".to_string(), text: "Bees dance.".to_string() },
    ])
    .unwrap()
}

fn state_for(api_base: &str, template_dir: PathBuf) -> AppState {
    let client = OpenAiClient::new(CompletionSettings {
        api_key: "sk-test".to_string(),
        api_base: api_base.to_string(),
        model: "gpt-3.5-turbo".to_string(),
        timeout: Duration::from_secs(30),
    })
    .unwrap();
    AppState::new(
        store(),
        client,
        WebOptions {
            title: "Reflective Chatbot".to_string(),
            window: 5,
            template_dir,
            static_dir: manifest_dir().join("static"),
        },
    )
}

fn server_with(api_base: &str, template_dir: PathBuf) -> TestServer {
    TestServer::new(build_router(state_for(api_base, template_dir))).unwrap()
}

// WebSocket upgrades need a real listener rather than the mock transport.
fn ws_server(api_base: &str) -> TestServer {
    let config = TestServerConfig {
        transport: Some(Transport::HttpRandomPort),
        ..TestServerConfig::default()
    };
    TestServer::new_with_config(
        build_router(state_for(api_base, manifest_dir().join("templates"))),
        config,
    )
    .unwrap()
}

fn server(api_base: &str) -> TestServer {
    server_with(api_base, manifest_dir().join("templates"))
}

async fn mock_reply(mock_server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .mount(mock_server)
        .await;
}

fn turns(n: usize) -> Vec<ConversationTurn> {
    (1..=n)
        .map(|i| ConversationTurn::new(format!("q{}", i), format!("a{}", i)))
        .collect()
}

#[tokio::test]
async fn test_index_lists_chapters() {
    let server = server("http://127.0.0.1:9");
    let response = server.get("/").await;

    response.assert_status_ok();
    let page = response.text();
    assert!(page.contains("<title>Reflective Chatbot</title>"));
    assert!(page.contains(r#"<option value="chapter_1.txt" selected>"#));
    assert!(page.contains(r#"<option value="chapter_2.txt">"#));
}

#[tokio::test]
async fn test_index_falls_back_to_embedded_template() {
    let server = server_with("http://127.0.0.1:9", manifest_dir().join("no-such-templates"));
    let response = server.get("/").await;

    response.assert_status_ok();
    assert!(response.text().contains("chapter_2.txt"));
}

#[tokio::test]
async fn test_index_render_failure_is_server_error() {
    // An existing template directory without index.html disables the embedded fallback.
    let dir = tempfile::tempdir().unwrap();
    let server = server_with("http://127.0.0.1:9", dir.path().to_path_buf());

    let response = server.get("/").await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Internal Server Error"));
}

#[tokio::test]
async fn test_static_files() {
    let server = server("http://127.0.0.1:9");
    server.get("/static/chat.js").await.assert_status_ok();
    server
        .get("/static/missing.js")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chapters_endpoint() {
    let server = server("http://127.0.0.1:9");
    let body: ChaptersResponse = server.get("/api/chapters").await.json();

    assert_eq!(body.chapters, vec!["chapter_1.txt", "chapter_2.txt"]);
    assert_eq!(body.default, "chapter_1.txt");
}

#[test_log::test(tokio::test)]
async fn test_respond_appends_turn_and_clears_input() {
    let mock_server = MockServer::start().await;
    mock_reply(&mock_server, "Through pheromones.").await;
    let server = server(&mock_server.uri());

    let response = server
        .post("/api/respond")
        .json(&json!({"chapter": "chapter_1.txt", "message": "Why do ants cooperate?"}))
        .await;

    response.assert_status_ok();
    let body: RespondResponse = response.json();
    assert_eq!(body.input, "");
    assert_eq!(body.history.len(), 1);
    assert_eq!(body.history[0].user, "Why do ants cooperate?");
    assert_eq!(body.history[0].assistant, "Through pheromones.");

    let requests = mock_server.received_requests().await.unwrap();
    let sent: serde_json::Value = requests[0].body_json().unwrap();
    assert!(sent["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("Ants cooperate via pheromones."));
    assert_eq!(sent["messages"][1]["content"], "User: Why do ants cooperate?\nAssistant:");
}

#[test_log::test(tokio::test)]
async fn test_respond_replays_only_recent_window() {
    let mock_server = MockServer::start().await;
    mock_reply(&mock_server, "ok").await;
    let server = server(&mock_server.uri());

    let response = server
        .post("/api/respond")
        .json(&json!({"message": "seventh", "history": turns(6)}))
        .await;

    response.assert_status_ok();
    let body: RespondResponse = response.json();
    assert_eq!(body.history.len(), 7);

    let requests = mock_server.received_requests().await.unwrap();
    let sent: serde_json::Value = requests[0].body_json().unwrap();
    let user_prompt = sent["messages"][1]["content"].as_str().unwrap();
    assert_eq!(user_prompt.matches("Assistant: ").count(), 5);
    assert!(!user_prompt.contains("User: q1\n"));
    assert!(user_prompt.starts_with("User: q2\nAssistant: a2\n"));
    assert!(user_prompt.ends_with("User: seventh\nAssistant:"));
}

#[test_log::test(tokio::test)]
async fn test_respond_unknown_chapter_is_silent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    let server = server(&mock_server.uri());

    let response = server
        .post("/api/respond")
        .json(&json!({"chapter": "chapter_9.txt", "message": "hello", "history": turns(2)}))
        .await;

    response.assert_status_ok();
    let body: RespondResponse = response.json();
    assert_eq!(body.input, "");
    assert_eq!(body.history.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_respond_upstream_failure_is_bad_gateway() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;
    let server = server(&mock_server.uri());

    let response = server
        .post("/api/respond")
        .json(&json!({"message": "hello"}))
        .expect_failure()
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("401"));
}

#[test_log::test(tokio::test)]
async fn test_ws_welcome_frame() {
    let server = ws_server("http://127.0.0.1:9");
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;

    let welcome: Value = ws.receive_json().await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["chapters"], json!(["chapter_1.txt", "chapter_2.txt"]));
    assert_eq!(welcome["selected"], "chapter_1.txt");
    assert!(!welcome["session_id"].as_str().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_ws_submit_select_and_clear() {
    let mock_server = MockServer::start().await;
    mock_reply(&mock_server, "Through pheromones.").await;
    let server = ws_server(&mock_server.uri());
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _welcome: Value = ws.receive_json().await;

    ws.send_json(&json!({"type": "submit", "message": "Why do ants cooperate?"})).await;
    let transcript: Value = ws.receive_json().await;
    assert_eq!(transcript["type"], "transcript");
    assert_eq!(transcript["input"], "");
    assert_eq!(transcript["selected"], "chapter_1.txt");
    assert_eq!(transcript["turns"].as_array().unwrap().len(), 1);
    assert_eq!(transcript["turns"][0]["user"], "Why do ants cooperate?");
    assert_eq!(transcript["turns"][0]["assistant"], "Through pheromones.");

    ws.send_json(&json!({"type": "select", "chapter": "chapter_2.txt"})).await;
    let selected: Value = ws.receive_json().await;
    assert_eq!(selected["type"], "transcript");
    assert_eq!(selected["selected"], "chapter_2.txt");
    assert_eq!(selected["turns"].as_array().unwrap().len(), 1);

    ws.send_json(&json!({"type": "clear"})).await;
    let cleared: Value = ws.receive_json().await;
    assert_eq!(cleared["type"], "transcript");
    assert_eq!(cleared["input"], "");
    assert_eq!(cleared["selected"], "chapter_2.txt");
    assert!(cleared["turns"].as_array().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_ws_upstream_error_keeps_input() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("server exploded"))
        .mount(&mock_server)
        .await;
    let server = ws_server(&mock_server.uri());
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _welcome: Value = ws.receive_json().await;

    ws.send_json(&json!({"type": "submit", "message": "still there?"})).await;
    let error: Value = ws.receive_json().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["input"], "still there?");
    assert!(error["message"].as_str().unwrap().contains("500"));

    ws.send_json(&json!({"type": "select", "chapter": "chapter_1.txt"})).await;
    let transcript: Value = ws.receive_json().await;
    assert_eq!(transcript["input"], "still there?");
    assert!(transcript["turns"].as_array().unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_ws_malformed_frame_is_reported() {
    let server = ws_server("http://127.0.0.1:9");
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _welcome: Value = ws.receive_json().await;

    ws.send_text(r#"{"type":"shout"}"#).await;
    let error: Value = ws.receive_json().await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().starts_with("malformed frame"));
}

#[test_log::test(tokio::test)]
async fn test_ws_cancel_drops_in_flight_completion() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "too late"}}]
                }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;
    let server = ws_server(&mock_server.uri());
    let mut ws = server.get_websocket("/ws").await.into_websocket().await;
    let _welcome: Value = ws.receive_json().await;

    ws.send_json(&json!({"type": "submit", "message": "slow question"})).await;
    ws.send_json(&json!({"type": "cancel"})).await;

    let cancelled: Value = tokio::time::timeout(Duration::from_secs(5), ws.receive_json())
        .await
        .expect("cancel should not wait for the completion");
    assert_eq!(cancelled["type"], "cancelled");
    assert_eq!(cancelled["input"], "slow question");

    ws.send_json(&json!({"type": "select", "chapter": "chapter_1.txt"})).await;
    let transcript: Value = ws.receive_json().await;
    assert_eq!(transcript["type"], "transcript");
    assert_eq!(transcript["input"], "slow question");
    assert!(transcript["turns"].as_array().unwrap().is_empty());
}
