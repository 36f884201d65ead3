//! WebSocket echo client example.
//!
//! Usage: `cargo run --example echo_client -- wss://echo.websocket.org`

use std::time::Duration;
use wsnet::ws::{CloseCode, Event, Message, WebSocketBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_string());

    println!("Connecting to {url}...");
    let ws = WebSocketBuilder::new()
        .url(&url)?
        .connect_timeout(Some(Duration::from_secs(10)))
        .close_timeout(Duration::from_secs(3))
        .connect()
        .await?;
    println!("Connected (subprotocol: {:?})", ws.subprotocol());

    ws.send_text("Hello from wsnet").await?;
    ws.send(Message::json(&serde_json::json!({ "type": "greeting", "n": 1 }))?)
        .await?;
    ws.ping(&b"keepalive"[..]).await?;

    let mut echoes = 0;
    while let Some(event) = ws.recv().await {
        match event {
            Event::Message(Message::Text(text)) => {
                println!("< {text}");
                echoes += 1;
            }
            Event::Message(msg) => println!("< {} bytes", msg.into_data().len()),
            Event::Ping(data) => println!("< ping ({} bytes)", data.len()),
            Event::Pong(data) => println!("< pong {:?}", String::from_utf8_lossy(&data)),
            Event::Error(e) => println!("! {e}"),
            Event::Closed(frame) => {
                println!("Closed: {} {}", frame.code.0, frame.reason);
                return Ok(());
            }
        }
        if echoes >= 2 {
            break;
        }
    }

    ws.close(CloseCode::NORMAL, "bye").await?;
    println!("Closed cleanly");
    Ok(())
}
