//! End-to-end WebSocket client tests.
//!
//! Covers:
//! - Interop with a tokio-tungstenite server (echo, ping, both close directions)
//! - Raw TCP peers for handshake failures, EOF and hand-written frames
//! - Close grace period when the peer never answers

use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite;
use wsnet::ws::{
    compute_accept_key, CloseCode, CloseFrame, Event, FrameCodec, HandshakeError, Message, Opcode,
    ProtocolError, State, WebSocket, WebSocketBuilder,
};
use wsnet::{ErrorKind, NetError};

/// Accept one connection and hand it to `handler`.
async fn spawn_server<F, Fut>(handler: F) -> u16
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handler(stream).await;
    });
    port
}

/// Read the Upgrade request and return its Sec-WebSocket-Key.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed during handshake");
        buf.extend_from_slice(&chunk[..n]);
    }
    let request = String::from_utf8(buf).unwrap();
    request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .unwrap()
        .trim()
        .to_string()
}

fn switching_protocols(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(key)
    )
}

/// Complete the handshake as a raw server.
async fn raw_accept(stream: &mut TcpStream) {
    let key = read_request(stream).await;
    stream
        .write_all(switching_protocols(&key).as_bytes())
        .await
        .unwrap();
}

fn client(port: u16) -> WebSocketBuilder {
    WebSocketBuilder::new()
        .url(&format!("ws://127.0.0.1:{port}/test"))
        .unwrap()
        .close_timeout(Duration::from_secs(2))
}

fn expect_text(event: Option<Event>) -> String {
    match event {
        Some(Event::Message(Message::Text(text))) => text,
        other => panic!("expected text message, got {other:?}"),
    }
}

fn expect_closed(event: Option<Event>) -> (u16, String) {
    match event {
        Some(Event::Closed(frame)) => (frame.code.0, frame.reason),
        other => panic!("expected Closed, got {other:?}"),
    }
}

async fn echo_server(stream: TcpStream) {
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_text() || msg.is_binary() {
            if ws.send(msg).await.is_err() {
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_echo_and_client_close() {
    let port = spawn_server(echo_server).await;
    let ws = client(port).connect().await.unwrap();
    assert_eq!(ws.state(), State::Open);

    ws.send_text("hello").await.unwrap();
    assert_eq!(expect_text(ws.recv().await), "hello");

    ws.send_binary(vec![1u8, 2, 3]).await.unwrap();
    match ws.recv().await {
        Some(Event::Message(Message::Binary(data))) => assert_eq!(&data[..], &[1, 2, 3]),
        other => panic!("expected binary message, got {other:?}"),
    }

    ws.close(CloseCode::NORMAL, "done").await.unwrap();
    assert_eq!(ws.state(), State::Closed);
    assert_eq!(expect_closed(ws.recv().await).0, 1000);
    assert!(ws.recv().await.is_none());
    assert!(matches!(
        ws.send_text("late").await,
        Err(NetError::NotOpen {
            state: State::Closed
        })
    ));
}

#[tokio::test]
async fn test_fragmented_send_reassembled_by_peer() {
    let port = spawn_server(echo_server).await;
    let ws = client(port)
        .write_fragment_size(Some(3))
        .connect()
        .await
        .unwrap();

    ws.send_text("fragmented message").await.unwrap();
    assert_eq!(expect_text(ws.recv().await), "fragmented message");
    ws.close(CloseCode::NORMAL, "").await.unwrap();
}

#[tokio::test]
async fn test_server_ping_gets_pong() {
    let port = spawn_server(|stream| async move {
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(tungstenite::Message::Ping(b"hb".to_vec()))
            .await
            .unwrap();
        let reply = loop {
            match ws.next().await {
                Some(Ok(tungstenite::Message::Pong(data))) => break data,
                Some(Ok(_)) => continue,
                other => panic!("expected pong, got {other:?}"),
            }
        };
        let text = format!("pong:{}", String::from_utf8_lossy(&reply));
        ws.send(tungstenite::Message::Text(text)).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    match ws.recv().await {
        Some(Event::Ping(data)) => assert_eq!(&data[..], b"hb"),
        other => panic!("expected ping, got {other:?}"),
    }
    assert_eq!(expect_text(ws.recv().await), "pong:hb");
    ws.close(CloseCode::NORMAL, "").await.unwrap();
}

#[tokio::test]
async fn test_server_initiated_close() {
    let port = spawn_server(|stream| async move {
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(tungstenite::Message::Text("last".into()))
            .await
            .unwrap();
        ws.close(Some(tungstenite::protocol::CloseFrame {
            code: tungstenite::protocol::frame::coding::CloseCode::Away,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    assert_eq!(expect_text(ws.recv().await), "last");
    assert_eq!(
        expect_closed(ws.recv().await),
        (1001, "bye".to_string())
    );
    assert_eq!(ws.state(), State::Closed);
    assert!(ws.recv().await.is_none());

    // Closing an already closed connection is a no-op
    ws.close(CloseCode::NORMAL, "").await.unwrap();
}

#[tokio::test]
async fn test_subprotocol_negotiation() {
    use tungstenite::handshake::server::{Request, Response};

    let port = spawn_server(|stream| async move {
        let callback = |req: &Request, mut resp: Response| {
            let offered = req
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            assert_eq!(offered, "superchat, chat");
            resp.headers_mut()
                .insert("sec-websocket-protocol", "chat".parse().unwrap());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let ws = client(port)
        .subprotocol("superchat")
        .subprotocol("chat")
        .header("X-Client", "wsnet-test")
        .connect()
        .await
        .unwrap();
    assert_eq!(ws.subprotocol(), Some("chat"));
    ws.close(CloseCode::NORMAL, "").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_send_and_recv() {
    let port = spawn_server(echo_server).await;
    let ws = Arc::new(client(port).connect().await.unwrap());

    let reader = {
        let ws = ws.clone();
        tokio::spawn(async move {
            let mut texts = Vec::new();
            while let Some(event) = ws.recv().await {
                match event {
                    Event::Message(Message::Text(text)) => texts.push(text),
                    Event::Closed(_) => break,
                    _ => {}
                }
                if texts.len() == 3 {
                    break;
                }
            }
            texts
        })
    };

    for i in 0..3 {
        ws.send_text(format!("msg-{i}")).await.unwrap();
    }
    let texts = reader.await.unwrap();
    assert_eq!(texts, vec!["msg-0", "msg-1", "msg-2"]);
    ws.close(CloseCode::NORMAL, "").await.unwrap();
}

#[tokio::test]
async fn test_events_stream_ends_after_closed() {
    let port = spawn_server(|stream| async move {
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for i in 0..3 {
            ws.send(tungstenite::Message::Text(format!("{i}")))
                .await
                .unwrap();
        }
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    let events: Vec<Event> = ws.events().collect().await;
    assert_eq!(events.len(), 4);
    assert!(events[..3]
        .iter()
        .all(|e| matches!(e, Event::Message(Message::Text(_)))));
    assert_eq!(expect_closed(events.last().cloned()).0, 1005);
}

#[tokio::test]
async fn test_bad_status_fails_open() {
    let port = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    })
    .await;

    let ws = client(port).build().unwrap();
    let err = ws.open().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handshake);
    assert!(matches!(
        err,
        NetError::Handshake(HandshakeError::BadStatus { status: 403, .. })
    ));
    assert_eq!(ws.state(), State::Closed);
    assert!(ws.recv().await.is_none());
}

#[tokio::test]
async fn test_bad_accept_fails_open() {
    let port = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        let response = switching_protocols("AQIDBAUGBwgJCgsMDQ4PEA==");
        stream.write_all(response.as_bytes()).await.unwrap();
    })
    .await;

    let err = client(port).connect().await.unwrap_err();
    assert!(matches!(
        err,
        NetError::Handshake(HandshakeError::AcceptMismatch { .. })
    ));
}

#[tokio::test]
async fn test_handshake_timeout() {
    let port = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    })
    .await;

    let err = client(port)
        .handshake_timeout(Some(Duration::from_millis(200)))
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetError::Handshake(HandshakeError::TimedOut)
    ));
}

#[tokio::test]
async fn test_peer_closes_during_handshake() {
    let port = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        stream.write_all(b"HTTP/1.1 101 Swi").await.unwrap();
    })
    .await;

    let err = client(port).connect().await.unwrap_err();
    assert!(matches!(
        err,
        NetError::Handshake(HandshakeError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_eof_without_close_is_abnormal() {
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    assert_eq!(expect_closed(ws.recv().await).0, 1006);
    assert_eq!(ws.state(), State::Closed);
    assert!(ws.recv().await.is_none());
}

#[tokio::test]
async fn test_fragmented_text_from_raw_peer() {
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
        stream.write_all(&[0x01, 0x03, b'h', b'e', b'l']).await.unwrap();
        stream.write_all(&[0x80, 0x02, b'l', b'o']).await.unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    assert_eq!(expect_text(ws.recv().await), "hello");
}

#[tokio::test]
async fn test_frame_bytes_after_handshake_response() {
    let port = spawn_server(|mut stream| async move {
        let key = read_request(&mut stream).await;
        let mut response = switching_protocols(&key).into_bytes();
        response.extend_from_slice(&[0x81, 0x05, b'e', b'a', b'r', b'l', b'y']);
        stream.write_all(&response).await.unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    assert_eq!(expect_text(ws.recv().await), "early");
}

#[tokio::test]
async fn test_masked_server_frame_fails_connection() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
        // Masked frames are only legal from clients
        stream
            .write_all(&[0x81, 0x81, 1, 2, 3, 4, b'x' ^ 1])
            .await
            .unwrap();

        let codec = FrameCodec::server();
        let mut buf = bytes::BytesMut::new();
        let frame = loop {
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                break frame;
            }
            let n = stream.read_buf(&mut buf).await.unwrap();
            assert!(n > 0);
        };
        let _ = tx.send(frame);
    })
    .await;

    let ws = client(port).connect().await.unwrap();
    assert!(matches!(
        ws.recv().await,
        Some(Event::Error(NetError::Protocol(
            ProtocolError::MaskedServerFrame
        )))
    ));
    assert_eq!(expect_closed(ws.recv().await).0, 1006);

    let close = rx.await.unwrap();
    assert_eq!(close.opcode, Opcode::Close);
    assert_eq!(&close.payload[..], &1002u16.to_be_bytes());
}

#[tokio::test]
async fn test_close_grace_period_when_peer_is_silent() {
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
        // Swallow everything, never answer the close
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    })
    .await;

    let ws = client(port)
        .close_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap();

    let started = Instant::now();
    ws.close(CloseCode::NORMAL, "").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(ws.state(), State::Closed);
    assert_eq!(expect_closed(ws.recv().await).0, 1006);
    assert!(ws.recv().await.is_none());
}

#[tokio::test]
async fn test_close_message_then_recv_gives_up_on_silent_peer() {
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    })
    .await;

    let ws = client(port)
        .close_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap();

    ws.send(Message::Close(Some(CloseFrame::new(CloseCode::GOING_AWAY, "leaving"))))
        .await
        .unwrap();
    assert_eq!(ws.state(), State::Closing);

    let started = Instant::now();
    let event = tokio::time::timeout(Duration::from_secs(3), ws.recv())
        .await
        .expect("recv must give up after the close timeout");
    assert_eq!(expect_closed(event).0, 1006);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(ws.state(), State::Closed);
    assert!(ws.recv().await.is_none());
}

#[tokio::test]
async fn test_close_interrupts_send_blocked_on_stalled_peer() {
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
        // Never read, so the client's socket buffers fill up
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    })
    .await;

    let ws = Arc::new(
        client(port)
            .close_timeout(Duration::from_millis(200))
            .connect()
            .await
            .unwrap(),
    );

    let sender = {
        let ws = Arc::clone(&ws);
        tokio::spawn(async move { ws.send_binary(vec![0u8; 32 * 1024 * 1024]).await })
    };
    // Let the send take the writer and block
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!sender.is_finished());

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(3), ws.close(CloseCode::NORMAL, ""))
        .await
        .expect("close must not wait on the blocked writer")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(ws.state(), State::Closed);

    let sent = tokio::time::timeout(Duration::from_secs(3), sender)
        .await
        .expect("blocked send must be released")
        .unwrap();
    assert!(sent.is_err());
}

#[tokio::test]
async fn test_read_timeout_reports_error() {
    let port = spawn_server(|mut stream| async move {
        raw_accept(&mut stream).await;
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    })
    .await;

    let ws = client(port)
        .read_timeout(Some(Duration::from_millis(100)))
        .close_timeout(Duration::from_millis(100))
        .connect()
        .await
        .unwrap();

    assert!(matches!(
        ws.recv().await,
        Some(Event::Error(NetError::ConnectionTimedOut))
    ));
    assert_eq!(expect_closed(ws.recv().await).0, 1006);
}

#[tokio::test]
async fn test_unknown_host_fails_to_resolve() {
    let err = WebSocketBuilder::new()
        .url("ws://nonexistent.invalid/")
        .unwrap()
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connect);
}

#[tokio::test]
async fn test_connect_with_invalid_url() {
    assert!(matches!(
        WebSocket::connect("http://example.com").await,
        Err(NetError::UnknownUrlScheme)
    ));
    assert!(matches!(
        WebSocket::connect("ws://example.com/#fragment").await,
        Err(NetError::InvalidUrl)
    ));
}
