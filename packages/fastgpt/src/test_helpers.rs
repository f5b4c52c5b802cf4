use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::{Router, routing::get};

/// Answers every request with a prose fragment (echoing the prompt), a code
/// fragment and a raw non-JSON frame, in that order.
async fn reply_to_prompts(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            let req: serde_json::Value = serde_json::from_str(text.as_str()).expect("request json");
            let prompt = req["prompt"].as_str().unwrap_or_default().to_string();
            let frames = [
                serde_json::json!({ "response": format!("echo: {prompt}") }).to_string(),
                serde_json::json!({ "code": "print(1)" }).to_string(),
                "raw tail".to_string(),
            ];
            for frame in frames {
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Spawn a throwaway generation server on `/generate`.
/// Returns the port it bound to and a shutdown handle.
pub async fn spawn_ws_server() -> (u16, tokio::sync::oneshot::Sender<()>) {
    let app = Router::new().route(
        "/generate",
        get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(reply_to_prompts) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .expect("serve");
    });
    (port, tx)
}

pub fn ws_url(port: u16) -> String {
    format!("ws://127.0.0.1:{port}/generate")
}
