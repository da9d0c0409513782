//! Per-connection handler: hello, then multiplex room output with request
//! replies until the socket closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use odooxr_common::{new_correlation_id, OfficeError, SessionId, UserIdentity};
use odooxr_office::Subscription;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::Instrument;

use crate::gateway::Gateway;
use crate::protocol::{ClientHello, ClientRequest, ServerMessage};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub hello_timeout: Duration,
    pub outbound_buffer: usize,
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    settings: ConnectionSettings,
) {
    let span = tracing::info_span!("conn", id = %new_correlation_id(), peer = %addr);
    serve_connection(ws, gateway, settings).instrument(span).await
}

async fn serve_connection(
    ws: WebSocketStream<TcpStream>,
    gateway: Arc<Gateway>,
    settings: ConnectionSettings,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame decides who this is.
    let hello = match read_hello(&mut stream, settings.hello_timeout).await {
        Some(hello) => hello,
        None => return,
    };

    // 2. Join or resume.
    let accepted = match hello {
        ClientHello::Join {
            room,
            user_id,
            display_name,
            mode,
            resources,
        } => {
            let name = display_name.unwrap_or_else(|| user_id.clone());
            gateway
                .join(room, UserIdentity::new(user_id, name), mode, resources)
                .await
                .map(|joined| {
                    let welcome = ServerMessage::Welcome {
                        token: joined.token.to_string(),
                        room: joined.room,
                        opened: joined.opened,
                    };
                    (joined.token, joined.subscription, welcome)
                })
        }
        ClientHello::Resume { token } => {
            gateway.resume(&token).await.map(|(session, subscription)| {
                let welcome = ServerMessage::Welcome {
                    token: session.to_string(),
                    room: subscription.room().clone(),
                    opened: Vec::new(),
                };
                (session, subscription, welcome)
            })
        }
    };

    let (token, subscription, welcome) = match accepted {
        Ok(accepted) => accepted,
        Err(error) => {
            tracing::info!(error = %error, "Hello rejected");
            let _ = send_message(&mut sink, &ServerMessage::Rejected { id: None, error }).await;
            let _ = sink.close().await;
            return;
        }
    };

    tracing::info!(session = %token, room = %subscription.room(), "Client attached");

    if send_message(&mut sink, &welcome).await.is_err() {
        gateway.disconnect(&token).await;
        return;
    }

    // 3. Room output and request replies share one outbound queue.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(settings.outbound_buffer.max(1));
    let pump = tokio::spawn(pump_subscription(subscription, out_tx.clone()));
    let mut left = false;

    loop {
        tokio::select! {
            Some(msg) = out_rx.recv() => {
                if send_message(&mut sink, &msg).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientRequest>(&text) {
                            Ok(ClientRequest::Leave) => {
                                if let Err(e) = gateway.leave(&token).await {
                                    tracing::debug!(error = %e, "Leave on expired session");
                                }
                                left = true;
                                break;
                            }
                            Ok(ClientRequest::Heartbeat) => {
                                // Answered on the socket directly: the
                                // outbound queue may be full of room output.
                                let reply = match gateway.heartbeat(&token).await {
                                    Ok(()) => ServerMessage::Pong,
                                    Err(error) => rejected(None, error),
                                };
                                if send_message(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                            }
                            Ok(request) => dispatch(request, &gateway, &token, &out_tx),
                            Err(e) => {
                                tracing::debug!(error = %e, "Invalid request frame");
                                let msg = ServerMessage::Error {
                                    message: format!("invalid request: {e}"),
                                };
                                if send_message(&mut sink, &msg).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cleanup.
    pump.abort();
    if left {
        let _ = sink.close().await;
        tracing::info!(session = %token, "Client left");
    } else {
        gateway.disconnect(&token).await;
        tracing::info!(session = %token, "Client disconnected");
    }
}

/// Requests that touch the host run on their own task so a slow write
/// does not stall the socket. Their replies go through `out`.
fn dispatch(
    request: ClientRequest,
    gateway: &Arc<Gateway>,
    token: &SessionId,
    out: &mpsc::Sender<ServerMessage>,
) {
    let gateway = gateway.clone();
    let token = token.clone();
    let out = out.clone();
    match request {
        ClientRequest::Submit { id, delta } => {
            tokio::spawn(async move {
                let reply = match gateway.submit(&token, delta).await {
                    Ok(delta) => ServerMessage::Accepted { id, seq: delta.seq },
                    Err(error) => rejected(Some(id), error),
                };
                let _ = out.send(reply).await;
            });
        }
        ClientRequest::Hydrate { id, panel } => {
            tokio::spawn(async move {
                let reply = match gateway.hydrate(&token, &panel).await {
                    Ok(panel) => ServerMessage::Panel { id, panel },
                    Err(error) => rejected(Some(id), error),
                };
                let _ = out.send(reply).await;
            });
        }
        // Handled by the socket loop.
        ClientRequest::Heartbeat | ClientRequest::Leave => {}
    }
}

fn rejected(id: Option<u64>, error: OfficeError) -> ServerMessage {
    tracing::debug!(request = ?id, error = %error, "Request rejected");
    ServerMessage::Rejected { id, error }
}

async fn pump_subscription(mut subscription: Subscription, out: mpsc::Sender<ServerMessage>) {
    while let Some(msg) = subscription.next().await {
        if out.send(msg.into()).await.is_err() {
            break;
        }
    }
}

/// Read and parse the first message as a ClientHello.
async fn read_hello(stream: &mut WsStream, hello_timeout: Duration) -> Option<ClientHello> {
    let frame = tokio::time::timeout(hello_timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientHello>(&text) {
            Ok(hello) => Some(hello),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid hello message");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!("Expected text hello, got another frame type");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(error = %e, "WS error during hello");
            None
        }
        Ok(None) => {
            tracing::debug!("Connection closed before hello");
            None
        }
        Err(_) => {
            tracing::warn!(timeout_secs = hello_timeout.as_secs(), "Hello timeout");
            None
        }
    }
}

/// Send a ServerMessage as a JSON text frame.
async fn send_message(
    sink: &mut WsSink,
    message: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = serde_json::to_string(message)
        .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"encode failed: {e}"}}"#));
    sink.send(Message::Text(json.into())).await
}
