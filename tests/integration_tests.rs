//! Integration tests for the chatlink session layer.
//! Most tests script the backend in memory; the `network` tests run a real
//! WebSocket and HTTP backend on loopback.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chatlink::chat::{
        BACKEND_UNREACHABLE_NOTICE, ChatSession, SessionConfig, SessionObserver, SessionState,
    };
    use chatlink::connection::{
        ChannelMode, ConnectionManager, ScriptedChannel, ScriptedConnector, ScriptedFallback,
        ScriptedServer,
    };
    use chatlink::endpoint::{DEFAULT_GREETING, EndpointConfig};
    use chatlink::{Action, ChatResponse, Error, Role, Turn};

    fn endpoints() -> EndpointConfig {
        EndpointConfig::new("ws://127.0.0.1:8000", "http://127.0.0.1:8000").unwrap()
    }

    fn fallback_session(fallback: Arc<ScriptedFallback>) -> ChatSession {
        let manager = ConnectionManager::new(Arc::new(ScriptedConnector::refusing()), fallback);
        ChatSession::new(manager, SessionConfig::new(endpoints()))
    }

    fn live_session() -> (ChatSession, ScriptedServer, Arc<ScriptedFallback>) {
        let (channel, server) = ScriptedChannel::pair();
        server.welcome("Hello from the backend");
        let fallback = Arc::new(ScriptedFallback::echo());
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::accepting(channel)),
            Arc::clone(&fallback) as _,
        );
        let session = ChatSession::new(manager, SessionConfig::new(endpoints()));
        (session, server, fallback)
    }

    fn roles(session: &ChatSession) -> Vec<Role> {
        session.transcript().all().map(Turn::role).collect()
    }

    fn contents(session: &ChatSession) -> Vec<String> {
        session
            .transcript()
            .all()
            .map(|turn| turn.content().to_string())
            .collect()
    }

    #[derive(Clone, Default)]
    struct ActionLog {
        actions: Arc<Mutex<Vec<Action>>>,
    }

    impl SessionObserver for ActionLog {
        fn on_actions(&mut self, actions: &[Action]) {
            self.actions.lock().unwrap().extend_from_slice(actions);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_falls_back_with_greeting() {
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::hanging()),
            Arc::new(ScriptedFallback::echo()),
        );
        let mut session = ChatSession::new(manager, SessionConfig::new(endpoints()));

        let result = session.open().await.unwrap();
        assert_eq!(result.mode, ChannelMode::Fallback);
        assert!(result.downgrade_reason.unwrap().is_connect_failure());
        assert_eq!(session.channel_mode(), ChannelMode::Fallback);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.input_enabled());
        assert_eq!(roles(&session), vec![Role::System]);
        assert_eq!(contents(&session), vec![DEFAULT_GREETING.to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_send_carries_history() {
        let fallback = Arc::new(ScriptedFallback::echo());
        fallback.respond(ChatResponse::new("Hi! How can I help?"));
        let mut session = fallback_session(Arc::clone(&fallback));
        session.open().await.unwrap();

        let reply = session.send("hello").await.unwrap();
        assert_eq!(reply.text, "Hi! How can I help?");
        assert_eq!(fallback.request_count(), 1);
        let first = &fallback.requests()[0];
        assert_eq!(first.message, "hello");
        assert!(first.conversation_history.is_empty());

        assert_eq!(
            roles(&session),
            vec![Role::System, Role::User, Role::Assistant]
        );
        assert_eq!(contents(&session)[1..], ["hello", "Hi! How can I help?"]);

        session.send("what projects?").await.unwrap();
        let second = &fallback.requests()[1];
        assert_eq!(second.conversation_history.len(), 1);
        assert_eq!(second.conversation_history[0].user, "hello");
        assert_eq!(
            second.conversation_history[0].assistant,
            "Hi! How can I help?"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_sending_is_rejected() {
        let fallback = Arc::new(ScriptedFallback::echo().with_delay(Duration::from_secs(2)));
        let mut session = fallback_session(Arc::clone(&fallback));
        session.open().await.unwrap();

        session.submit("first").await.unwrap();
        assert_eq!(session.state(), SessionState::Sending);
        assert!(!session.input_enabled());

        let err = session.submit("x").await.unwrap_err();
        assert!(err.is_busy());
        assert_eq!(session.state(), SessionState::Sending);

        let reply = session.await_reply().await.unwrap();
        assert_eq!(reply.text, "You said: first");
        assert_eq!(fallback.request_count(), 1);
        let users = session
            .transcript()
            .all()
            .filter(|turn| turn.role() == Role::User)
            .count();
        assert_eq!(users, 1);
    }

    #[tokio::test]
    async fn test_empty_send_is_a_noop() {
        let fallback = Arc::new(ScriptedFallback::echo());
        let mut session = fallback_session(Arc::clone(&fallback));
        session.open().await.unwrap();
        let before = session.transcript().len();

        for text in ["", "   ", "\n\t"] {
            let err = session.send(text).await.unwrap_err();
            assert!(err.is_invalid_input());
            assert_eq!(session.state(), SessionState::Ready);
        }
        assert_eq!(session.transcript().len(), before);
        assert_eq!(fallback.request_count(), 0);
    }

    #[tokio::test]
    async fn test_no_promotion_after_failed_handshake() {
        let (channel, server) = ScriptedChannel::pair();
        server.error("service warming up");
        let connector = Arc::new(ScriptedConnector::accepting(channel));
        let manager = ConnectionManager::new(
            Arc::clone(&connector) as _,
            Arc::new(ScriptedFallback::echo()),
        );
        let mut session = ChatSession::new(manager, SessionConfig::new(endpoints()));

        session.open().await.unwrap();
        assert_eq!(session.channel_mode(), ChannelMode::Fallback);
        for text in ["one", "two", "three"] {
            session.send(text).await.unwrap();
            assert_eq!(session.channel_mode(), ChannelMode::Fallback);
        }
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_live_exchange() {
        let (mut session, mut server, fallback) = live_session();
        let result = session.open().await.unwrap();
        assert!(result.is_live());
        assert_eq!(contents(&session), vec!["Hello from the backend".to_string()]);

        session.submit("hello").await.unwrap();
        assert_eq!(server.next_sent().await.unwrap().message, "hello");
        server.reply("Hi there");
        let reply = session.await_reply().await.unwrap();
        assert_eq!(reply.text, "Hi there");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.history().len(), 1);
        assert_eq!(fallback.request_count(), 0);
    }

    #[tokio::test]
    async fn test_live_loss_downgrades_for_rest_of_session() {
        let (mut session, mut server, fallback) = live_session();
        session.open().await.unwrap();
        server.close();

        let reply = session.send("still there?").await.unwrap();
        assert_eq!(reply.text, "You said: still there?");
        assert_eq!(session.channel_mode(), ChannelMode::Fallback);
        assert_eq!(fallback.request_count(), 1);

        session.send("and now?").await.unwrap();
        assert_eq!(session.channel_mode(), ChannelMode::Fallback);
        assert_eq!(fallback.request_count(), 2);
    }

    #[tokio::test]
    async fn test_live_loss_mid_reply_errors_then_recovers() {
        let (mut session, mut server, fallback) = live_session();
        session.open().await.unwrap();
        session.submit("hello").await.unwrap();
        server.close();

        let err = session.await_reply().await.unwrap_err();
        assert!(err.is_backend_unreachable());
        assert_eq!(session.state(), SessionState::Errored);
        assert!(session.input_enabled());
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role(), Role::Error);
        assert_eq!(last.content(), BACKEND_UNREACHABLE_NOTICE);

        // retrying from Errored goes through the fallback
        let reply = session.send("hello").await.unwrap();
        assert_eq!(reply.text, "You said: hello");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(fallback.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_then_retry() {
        let fallback = Arc::new(ScriptedFallback::echo());
        fallback.fail(Error::backend_unreachable(
            "connection refused",
            None,
            None,
        ));
        let mut session = fallback_session(Arc::clone(&fallback));
        session.open().await.unwrap();

        assert!(session.send("hello").await.is_err());
        assert_eq!(session.state(), SessionState::Errored);
        assert!(session.last_error().unwrap().is_backend_unreachable());
        assert_eq!(
            session.transcript().last().unwrap().content(),
            BACKEND_UNREACHABLE_NOTICE
        );
        assert!(session.history().is_empty());

        session.acknowledge();
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.last_error().is_none());
        session.send("hello").await.unwrap();
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_envelope() {
        let (mut session, server, _) = live_session();
        session.open().await.unwrap();
        session.submit("hello").await.unwrap();
        server.error("The assistant is busy, try again.");

        let err = session.await_reply().await.unwrap_err();
        assert!(err.is_backend());
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role(), Role::Error);
        assert_eq!(last.content(), "The assistant is busy, try again.");
        assert_eq!(session.channel_mode(), ChannelMode::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout_is_not_stuck() {
        let fallback = Arc::new(ScriptedFallback::echo().with_delay(Duration::from_secs(600)));
        let manager = ConnectionManager::new(Arc::new(ScriptedConnector::refusing()), fallback);
        let config = SessionConfig::new(endpoints()).with_reply_timeout(Duration::from_secs(5));
        let mut session = ChatSession::new(manager, config);
        session.open().await.unwrap();

        let err = session.send("hello").await.unwrap_err();
        assert!(err.is_backend_unreachable());
        assert_eq!(session.state(), SessionState::Errored);
        assert!(session.input_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_reply_after_timeout_does_not_answer_next_message() {
        let (channel, mut server) = ScriptedChannel::pair();
        server.welcome("Hello from the backend");
        let fallback = Arc::new(ScriptedFallback::echo());
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::accepting(channel)),
            Arc::clone(&fallback) as _,
        );
        let config = SessionConfig::new(endpoints()).with_reply_timeout(Duration::from_secs(5));
        let mut session = ChatSession::new(manager, config);
        session.open().await.unwrap();

        let err = session.send("first").await.unwrap_err();
        assert!(err.is_backend_unreachable());
        assert_eq!(session.state(), SessionState::Errored);
        assert_eq!(server.next_sent().await.unwrap().message, "first");
        server.reply("answer to first");

        session.submit("second").await.unwrap();
        assert_eq!(server.next_sent().await.unwrap().message, "second");
        server.reply("answer to second");
        let reply = session.await_reply().await.unwrap();
        assert_eq!(reply.text, "answer to second");
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.channel_mode(), ChannelMode::Live);

        let history: Vec<(&str, &str)> = session
            .history()
            .iter()
            .map(|entry| (entry.user.as_str(), entry.assistant.as_str()))
            .collect();
        assert_eq!(history, vec![("second", "answer to second")]);
        assert!(!contents(&session).contains(&"answer to first".to_string()));
        assert_eq!(fallback.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_send_discards_late_reply() {
        let fallback = Arc::new(ScriptedFallback::echo().with_delay(Duration::from_secs(1)));
        let mut session = fallback_session(Arc::clone(&fallback));
        session.open().await.unwrap();
        session.submit("old").await.unwrap();

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transcript().is_empty());
        session.close().await;

        session.open().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let reply = session.send("new").await.unwrap();
        assert_eq!(reply.text, "You said: new");
        assert_eq!(
            contents(&session),
            vec![
                DEFAULT_GREETING.to_string(),
                "new".to_string(),
                "You said: new".to_string(),
            ]
        );
        let history: Vec<&str> = session
            .history()
            .iter()
            .map(|entry| entry.user.as_str())
            .collect();
        assert_eq!(history, vec!["new"]);
    }

    #[tokio::test]
    async fn test_reply_markup_is_inert() {
        let (mut session, server, _) = live_session();
        session.open().await.unwrap();
        session.submit("<img src=x onerror=alert(1)>").await.unwrap();
        server.reply("<script>alert(1)</script> [x](javascript:alert(1))");
        session.await_reply().await.unwrap();

        for turn in session.transcript().all() {
            let html = turn.rendered().as_str();
            assert!(!html.contains("<script"), "{html}");
            assert!(!html.contains("<img"), "{html}");
            assert!(!html.contains("javascript:"), "{html}");
        }
    }

    #[tokio::test]
    async fn test_actions_reach_observer() {
        let (channel, server) = ScriptedChannel::pair();
        server.welcome("hi");
        let manager = ConnectionManager::new(
            Arc::new(ScriptedConnector::accepting(channel)),
            Arc::new(ScriptedFallback::echo()),
        );
        let log = ActionLog::default();
        let mut session =
            ChatSession::new(manager, SessionConfig::new(endpoints())).with_observer(log.clone());
        session.open().await.unwrap();

        session.submit("show me projects").await.unwrap();
        server.reply_with_actions("Here they are.", vec![Action::navigate("projects")]);
        let reply = session.await_reply().await.unwrap();
        assert_eq!(reply.actions.len(), 1);

        let actions = log.actions.lock().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].navigation_target(), Some("projects"));
    }

    #[tokio::test]
    async fn test_reset_starts_fresh() {
        let fallback = Arc::new(ScriptedFallback::echo());
        let mut session = fallback_session(Arc::clone(&fallback));
        session.open().await.unwrap();
        session.send("hello").await.unwrap();

        session.reset().await.unwrap();
        assert_eq!(roles(&session), vec![Role::System]);
        assert!(session.history().is_empty());
        session.send("again").await.unwrap();
        assert!(fallback.requests()[1].conversation_history.is_empty());
    }

    mod network {
        use std::sync::{Arc, Mutex};

        use futures::{SinkExt, StreamExt};
        use serde_json::{Value, json};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio_tungstenite::tungstenite::Message;

        use chatlink::chat::{ChatSession, SessionConfig};
        use chatlink::connection::ChannelMode;
        use chatlink::endpoint::EndpointConfig;
        use chatlink::{Role, Turn};

        async fn spawn_ws_backend() -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let welcome = json!({"type": "welcome", "message": "Hello over WebSocket"});
                ws.send(Message::Text(welcome.to_string().into()))
                    .await
                    .unwrap();
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(text.as_str()).unwrap();
                    let reply = json!({
                        "type": "message",
                        "response": format!("echo: {}", request["message"].as_str().unwrap()),
                        "tools_used": null,
                        "actions": [{"type": "navigate", "section_id": "skills"}],
                    });
                    ws.send(Message::Text(reply.to_string().into()))
                        .await
                        .unwrap();
                }
            });
            format!("ws://{addr}")
        }

        async fn read_request(stream: &mut TcpStream) -> (String, Vec<u8>) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let header_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client hung up");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            while buf.len() < header_end + length {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client hung up");
                buf.extend_from_slice(&chunk[..n]);
            }
            (head, buf[header_end..header_end + length].to_vec())
        }

        async fn spawn_http_backend(bodies: Arc<Mutex<Vec<Value>>>) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                loop {
                    let (mut stream, _) = listener.accept().await.unwrap();
                    let bodies = Arc::clone(&bodies);
                    tokio::spawn(async move {
                        let (head, body) = read_request(&mut stream).await;
                        let payload = if head.starts_with("POST /api/chat") {
                            let request: Value = serde_json::from_slice(&body).unwrap();
                            let message = request["message"].as_str().unwrap().to_string();
                            bodies.lock().unwrap().push(request);
                            json!({
                                "response": format!("http echo: {message}"),
                                "timestamp": "2026-10-19T12:00:00",
                                "tools_used": null,
                                "actions": null,
                            })
                        } else {
                            json!({"status": "healthy"})
                        }
                        .to_string();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            payload.len(),
                            payload
                        );
                        stream.write_all(response.as_bytes()).await.unwrap();
                        stream.shutdown().await.unwrap();
                    });
                }
            });
            format!("http://{addr}")
        }

        async fn closed_port() -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            format!("ws://{addr}")
        }

        #[tokio::test]
        async fn test_websocket_round_trip() {
            let ws = spawn_ws_backend().await;
            let endpoints = EndpointConfig::new(&ws, "http://127.0.0.1:9").unwrap();
            let mut session = ChatSession::network(SessionConfig::new(endpoints)).unwrap();

            let result = session.open().await.unwrap();
            assert!(result.is_live(), "{:?}", result.downgrade_reason);
            assert_eq!(
                session.transcript().last().map(Turn::content),
                Some("Hello over WebSocket")
            );

            let reply = session.send("hello").await.unwrap();
            assert_eq!(reply.text, "echo: hello");
            assert!(reply.tools_used.is_empty());
            assert_eq!(reply.actions[0].navigation_target(), Some("skills"));
            session.close().await;
        }

        #[tokio::test]
        async fn test_http_fallback_round_trip() {
            let bodies = Arc::new(Mutex::new(Vec::new()));
            let api = spawn_http_backend(Arc::clone(&bodies)).await;
            let ws = closed_port().await;
            let endpoints = EndpointConfig::new(&ws, &api).unwrap();
            let mut session = ChatSession::network(SessionConfig::new(endpoints)).unwrap();

            let result = session.open().await.unwrap();
            assert_eq!(result.mode, ChannelMode::Fallback);

            let reply = session.send("hello").await.unwrap();
            assert_eq!(reply.text, "http echo: hello");
            session.send("again").await.unwrap();

            let bodies = bodies.lock().unwrap().clone();
            assert_eq!(bodies[0]["conversation_history"], json!([]));
            assert_eq!(
                bodies[1]["conversation_history"],
                json!([{"user": "hello", "assistant": "http echo: hello"}])
            );
            let roles: Vec<Role> = session.transcript().all().map(Turn::role).collect();
            assert_eq!(
                roles,
                vec![
                    Role::System,
                    Role::User,
                    Role::Assistant,
                    Role::User,
                    Role::Assistant
                ]
            );

            let health = session.health().await.unwrap();
            assert!(health.healthy);
        }
    }
}
