use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use chathub::nlp::{
    Entity, EntityExtractor, NlpResult, SentimentClassifier, TextGenerator, Translator,
};
use chathub::{
    decode, handle_connection, AppError, Broadcaster, Dispatcher, Envelope, NlpServices, Registry,
    Sentiment, ServerContext,
};

/// Upper bound for every await in these tests
const STEP: Duration = Duration::from_secs(5);

/// Canned collaborators standing in for the inference service
struct StaticNlp;

#[async_trait]
impl SentimentClassifier for StaticNlp {
    async fn classify(&self, _text: &str) -> NlpResult<Sentiment> {
        Ok(Sentiment {
            label: "POSITIVE".to_string(),
            score: 0.99,
        })
    }
}

#[async_trait]
impl Translator for StaticNlp {
    async fn translate(&self, lang: &str, text: &str) -> NlpResult<String> {
        Ok(format!("{}:{}", lang, text))
    }
}

#[async_trait]
impl EntityExtractor for StaticNlp {
    async fn extract_entities(&self, _text: &str) -> NlpResult<Vec<Entity>> {
        Ok(vec![Entity {
            text: "Paris".to_string(),
            group: "LOC".to_string(),
            score: 0.97,
        }])
    }
}

#[async_trait]
impl TextGenerator for StaticNlp {
    async fn generate(&self, _prompt: &str) -> NlpResult<String> {
        Ok("once upon a time".to_string())
    }
}

fn test_context() -> (ServerContext, watch::Sender<bool>) {
    let registry = Arc::new(Registry::new());
    let broadcaster = Broadcaster::new(registry.clone());
    let nlp = NlpServices {
        sentiment: Arc::new(StaticNlp),
        translator: Arc::new(StaticNlp),
        entities: Arc::new(StaticNlp),
        generator: Arc::new(StaticNlp),
    };
    let dispatcher = Arc::new(Dispatcher::new(nlp, broadcaster.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctx = ServerContext {
        registry,
        broadcaster,
        dispatcher,
        shutdown: shutdown_rx,
    };
    (ctx, shutdown_tx)
}

/// One simulated client over an in-memory duplex pipe
struct TestClient {
    lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
    write: WriteHalf<DuplexStream>,
    handle: JoinHandle<Result<(), AppError>>,
}

impl TestClient {
    fn connect(ctx: &ServerContext) -> Self {
        let (client, server) = duplex(4096);
        let handle = tokio::spawn(handle_connection(server, "test-peer".to_string(), ctx.clone()));
        let (read, write) = tokio::io::split(client);
        Self {
            lines: BufReader::new(read).lines(),
            write,
            handle,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }

    async fn login(&mut self, username: &str) {
        self.send_raw(&format!(
            "{{\"type\": \"login\", \"username\": \"{}\"}}",
            username
        ))
        .await;
    }

    async fn chat(&mut self, message: &str) {
        self.send_raw(&format!(
            "{{\"type\": \"chat_message\", \"message\": \"{}\"}}",
            message
        ))
        .await;
    }

    async fn recv(&mut self) -> Envelope {
        let line = timeout(STEP, self.lines.next_line())
            .await
            .expect("timed out waiting for a record")
            .expect("read failed")
            .expect("stream closed");
        decode(&line).unwrap()
    }

    /// Close the client's write side and wait for the handler to finish
    async fn disconnect(mut self) {
        self.write.shutdown().await.unwrap();
        let _ = timeout(STEP, self.handle)
            .await
            .expect("handler did not finish");
    }
}

async fn wait_for_sessions(registry: &Registry, expected: usize) {
    timeout(STEP, async {
        while registry.len().await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

fn assert_notification_contains(envelope: Envelope, needle: &str) {
    match envelope {
        Envelope::ServerNotification { message, .. } => {
            assert!(
                message.contains(needle),
                "notification '{}' does not contain '{}'",
                message,
                needle
            );
        }
        other => panic!("Expected server_notification, got {:?}", other),
    }
}

/// End-to-end flow: two logins, sentiment-tagged fan-out, direct-only
/// command replies, untyped-record tolerance, departure notice, shutdown.
#[tokio::test]
async fn test_full_chat_flow() {
    let (ctx, shutdown_tx) = test_context();

    // 1. Alice connects and logs in
    let mut alice = TestClient::connect(&ctx);
    alice.login("alice").await;
    assert_notification_contains(alice.recv().await, "Welcome to the chat, alice");
    wait_for_sessions(&ctx.registry, 1).await;

    // 2. Bob joins; Alice is notified
    let mut bob = TestClient::connect(&ctx);
    bob.login("bob").await;
    assert_notification_contains(bob.recv().await, "Welcome to the chat, bob");
    assert_notification_contains(alice.recv().await, "bob has joined the chat");
    wait_for_sessions(&ctx.registry, 2).await;

    // 3. Plain text goes out sentiment-tagged, to sender and peer alike
    alice.chat("I love this").await;
    let direct = alice.recv().await;
    let fanned_out = bob.recv().await;
    assert_eq!(direct, fanned_out);
    match direct {
        Envelope::ChatMessage {
            username,
            message,
            sentiment,
            timestamp,
        } => {
            assert_eq!(username.as_deref(), Some("alice"));
            assert_eq!(message, "I love this");
            let sentiment = sentiment.expect("sentiment must be attached");
            assert_eq!(sentiment.label, "POSITIVE");
            assert_eq!(sentiment.score, 0.99);
            assert!(timestamp.is_some());
        }
        other => panic!("Expected chat_message, got {:?}", other),
    }

    // 4. Command replies go to the asker only
    alice.chat("!translate fr Hello").await;
    match alice.recv().await {
        Envelope::ServerResponse { message, .. } => assert_eq!(message, "fr:Hello"),
        other => panic!("Expected server_response, got {:?}", other),
    }

    // 5. Records without a type field are ignored, not answered
    alice.send_raw("{\"message\": \"untyped noise\"}").await;
    alice.chat("!ner Paris is nice").await;
    match alice.recv().await {
        Envelope::ServerResponse { message, .. } => assert_eq!(message, "Paris (LOC)"),
        other => panic!("Expected server_response, got {:?}", other),
    }

    // 6. Alice leaves; Bob hears it exactly once
    alice.disconnect().await;
    assert_notification_contains(bob.recv().await, "alice has left the chat");
    wait_for_sessions(&ctx.registry, 1).await;

    // Bob's next inbound envelope is his own echo, not a second notice
    bob.chat("all alone now").await;
    match bob.recv().await {
        Envelope::ChatMessage { username, .. } => assert_eq!(username.as_deref(), Some("bob")),
        other => panic!("Expected chat_message, got {:?}", other),
    }

    // 7. Server shutdown winds Bob's connection down
    shutdown_tx.send(true).unwrap();
    let _ = timeout(STEP, bob.handle)
        .await
        .expect("handler did not observe shutdown");
    wait_for_sessions(&ctx.registry, 0).await;
}

/// A connection whose first record is not a login is rejected and never
/// becomes a broadcast recipient.
#[tokio::test]
async fn test_non_login_first_message_is_rejected() {
    let (ctx, _shutdown_tx) = test_context();

    let mut intruder = TestClient::connect(&ctx);
    intruder.chat("let me in").await;

    match intruder.recv().await {
        Envelope::Error { message } => assert!(message.contains("Login failed")),
        other => panic!("Expected error, got {:?}", other),
    }

    // The handler reports the rejection and the registry never saw the peer
    let result = timeout(STEP, intruder.handle)
        .await
        .expect("handler did not finish")
        .expect("handler task panicked");
    assert!(matches!(result, Err(AppError::Handshake(_))));
    assert!(ctx.registry.is_empty().await);

    // A legitimate client is unaffected and hears no trace of the intruder
    let mut alice = TestClient::connect(&ctx);
    alice.login("alice").await;
    assert_notification_contains(alice.recv().await, "Welcome to the chat, alice");
    wait_for_sessions(&ctx.registry, 1).await;
}

/// Malformed records after login are answered with an error envelope and the
/// connection stays open.
#[tokio::test]
async fn test_malformed_record_keeps_connection_alive() {
    let (ctx, _shutdown_tx) = test_context();

    let mut alice = TestClient::connect(&ctx);
    alice.login("alice").await;
    assert_notification_contains(alice.recv().await, "Welcome");

    alice.send_raw("this is not json").await;
    match alice.recv().await {
        Envelope::Error { message } => assert!(message.contains("Malformed message")),
        other => panic!("Expected error, got {:?}", other),
    }

    // Still logged in, still chatting
    alice.chat("still here").await;
    match alice.recv().await {
        Envelope::ChatMessage { message, .. } => assert_eq!(message, "still here"),
        other => panic!("Expected chat_message, got {:?}", other),
    }
    assert_eq!(ctx.registry.len().await, 1);
}
