use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const UNREACHABLE_URL: &str = "http://127.0.0.1:1/v1/chat/completions";

fn cerebras_chat() -> Command {
    let mut cmd = Command::cargo_bin("cerebras-chat").unwrap();
    for name in [
        "CEREBRAS_API_KEY",
        "HTTPS_PROXY",
        "https_proxy",
        "HTTP_PROXY",
        "http_proxy",
        "CA_BUNDLE",
        "ca_bundle",
        "RUST_LOG",
    ] {
        cmd.env_remove(name);
    }
    cmd
}

async fn completion_server(content: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-xxxxxxxxxxxxxxxx",
            "object": "chat.completion",
            "model": "llama3.1-8b",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content } }
            ]
        })))
        .mount(&server)
        .await;
    server
}

async fn run_with_stdin(args: Vec<String>, stdin: &'static str) -> std::process::Output {
    tokio::task::spawn_blocking(move || {
        cerebras_chat()
            .env("CEREBRAS_API_KEY", "csk-test")
            .args(args)
            .write_stdin(stdin)
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}

#[test]
fn api_keyがない場合は入力を読む前に失敗する() {
    cerebras_chat()
        .write_stdin("Hi\n")
        .assert()
        .failure()
        .stderr(contains("CEREBRAS_API_KEY"))
        .stdout(contains("You:").not());
}

#[test]
fn ヘッダーに使えないapi_keyは入力を読む前に失敗する() {
    cerebras_chat()
        .env("CEREBRAS_API_KEY", "csk-test\n")
        .args(["--api-url", UNREACHABLE_URL])
        .write_stdin("Hi\n")
        .assert()
        .failure()
        .stderr(contains("CEREBRAS_API_KEY"))
        .stdout(contains("You:").not());
}

#[test]
fn exitを入力すると通信せずに終了する() {
    cerebras_chat()
        .env("CEREBRAS_API_KEY", "csk-test")
        .args(["--api-url", UNREACHABLE_URL])
        .write_stdin(" EXIT \nHi\n")
        .assert()
        .success()
        .stdout(contains("Welcome to the Interactive Cerebras Chat!"))
        .stdout(contains("Thank you for chatting. Goodbye!"))
        .stdout(contains("Assistant:").not())
        .stdout(contains("Failed to get a response").not());
}

#[test]
fn 通信エラーの後も対話を続けられる() {
    cerebras_chat()
        .env("CEREBRAS_API_KEY", "csk-test")
        .args(["--api-url", UNREACHABLE_URL])
        .write_stdin("Hi\nexit\n")
        .assert()
        .success()
        .stdout(contains("Failed to get a response (network error)"))
        .stdout(contains("Thank you for chatting. Goodbye!"))
        .stderr(contains("turn discarded").not());
}

#[tokio::test(flavor = "multi_thread")]
async fn 対話モードで応答が表示される() {
    let server = completion_server("Hello!").await;
    let url = format!("{}/v1/chat/completions", server.uri());

    let output = run_with_stdin(vec!["--api-url".to_string(), url], "Hi\nexit\n").await;

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("You: "));
    assert!(stdout.contains("Assistant: Hello!"));
    assert!(stdout.ends_with("Thank you for chatting. Goodbye!\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn promptを渡すと応答だけを表示して終了する() {
    let server = completion_server("Hello!").await;
    let url = format!("{}/v1/chat/completions", server.uri());

    let output = run_with_stdin(vec!["--api-url".to_string(), url, "Hi".to_string()], "").await;

    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "Hello!\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn api_keyが拒否された場合は0以外で終了する() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;
    let url = format!("{}/v1/chat/completions", server.uri());

    let output = run_with_stdin(vec!["--api-url".to_string(), url], "Hi\nHi again\n").await;

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("rejected"));
    assert_eq!(stderr.matches("Error: ").count(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
