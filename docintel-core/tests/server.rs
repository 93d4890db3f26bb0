mod common;

use common::{fixture, settings, FixedClassifier, ScriptedModel};
use docintel_core::context::{AnswerRequest, AppContext, Capability, ClassifyRequest};
use docintel_core::server::{Client, Request, Response, Server};
use docintel_core::Classifier;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
    }
}

fn spawn_server(socket: &Path, context: AppContext) -> Running {
    let server = Server::new(socket.to_string_lossy().to_string(), Arc::new(context));
    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    Running { shutdown, handle }
}

async fn connect(socket: &Path) -> Client {
    for _ in 0..100 {
        if let Ok(client) = Client::connect(socket).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server never came up on {}", socket.display());
}

async fn ready_context() -> AppContext {
    let fixture = fixture(ScriptedModel::new(), settings(1)).await;
    AppContext::new(
        Capability::Ready(fixture.engine),
        Capability::Ready(Classifier::ag_news(Arc::new(FixedClassifier::new(1, 0.8)))),
        None,
    )
}

#[tokio::test]
async fn serves_requests_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("docintel.sock");
    let running = spawn_server(&socket, ready_context().await);

    let mut client = connect(&socket).await;

    match client.send(&Request::Status).await.unwrap() {
        Response::Status(status) => {
            assert!(status.capabilities.iter().all(|c| c.available));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let classify = Request::Classify(ClassifyRequest {
        text: "The striker scored twice in the final".to_string(),
    });
    match client.send(&classify).await.unwrap() {
        Response::Classification(result) => {
            assert_eq!(result.predicted_class, "Sports");
            assert_eq!(result.confidence, 0.8);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    let answer = Request::Answer(AnswerRequest {
        question: "What is the capital of France?".to_string(),
    });
    match client.send(&answer).await.unwrap() {
        Response::Answer(response) => assert_eq!(response.answer, "PARIS"),
        other => panic!("unexpected response: {:?}", other),
    }

    drop(client);
    running.stop().await;
    assert!(!socket.exists());
}

#[tokio::test]
async fn malformed_line_yields_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("docintel.sock");
    let running = spawn_server(&socket, ready_context().await);

    // Wait for the listener.
    drop(connect(&socket).await);

    let stream = UnixStream::connect(&socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"{\"type\":\"classify\"}\n").await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["type"], "error");
    assert_eq!(response["kind"], "validation");

    writer.write_all(b"{\"type\":\"status\xff\"}\n").await.unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["kind"], "validation");
    assert!(response["message"].as_str().unwrap().contains("UTF-8"));

    // The connection survives bad requests.
    writer.write_all(b"{\"type\":\"status\"}\n").await.unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["type"], "status");

    drop(writer);
    running.stop().await;
}

#[tokio::test]
async fn unavailable_capability_reported_to_client() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("docintel.sock");
    let context = AppContext::new(
        Capability::Unavailable("index missing".to_string()),
        Capability::Unavailable("weights missing".to_string()),
        None,
    );
    let running = spawn_server(&socket, context);

    let mut client = connect(&socket).await;
    let answer = Request::Answer(AnswerRequest {
        question: "What is the capital of France?".to_string(),
    });
    match client.send(&answer).await.unwrap() {
        Response::Error(body) => {
            assert_eq!(body.kind, "retrieval_unavailable");
            assert!(body.message.contains("index missing"));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    match client.send(&Request::Status).await.unwrap() {
        Response::Status(status) => {
            assert!(status.capabilities.iter().all(|c| !c.available));
        }
        other => panic!("unexpected response: {:?}", other),
    }

    drop(client);
    running.stop().await;
}
