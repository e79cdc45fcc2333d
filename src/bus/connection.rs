// Persistent WebSocket link to the instrument backend
//
// Connects, attaches the multiplexer's outbound channel, pumps frames both ways
// and, when the link drops for any reason, schedules a single reconnection
// attempt after a fixed backoff. There is no give-up state: the loop only ends
// when its cancellation token fires.

use super::Multiplexer;
use crate::config::ConnectionConfig;
use crate::error::{TelemetryError, TelemetryResult};
use crate::protocol::{kinds, WireMessage};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Drive the connection until `cancel` fires
pub async fn run_connection(mux: Multiplexer, config: ConnectionConfig, cancel: CancellationToken) {
    let delay = config.reconnect_delay();

    loop {
        info!("Connecting to instrument backend at {}", config.url);

        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = connect(&config.url) => attempt,
        };

        match attempt {
            Ok(ws_stream) => {
                info!("Connected to instrument backend");
                run_session(&mux, ws_stream, &config, &cancel).await;
            }
            Err(e) => {
                warn!("{}", e);
            }
        }
        mux.detach();

        if cancel.is_cancelled() {
            break;
        }

        info!("Backend link down, reconnecting in {:?}", delay);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    mux.detach();
    debug!("Connection task ended");
}

async fn connect(url: &str) -> TelemetryResult<WsStream> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| TelemetryError::Connection(format!("{}: {}", url, e)))?;
    Ok(ws_stream)
}

/// Resolve on the next heartbeat tick, or never when heartbeats are disabled
async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Pump one connected socket until it closes, errors or is cancelled
async fn run_session(
    mux: &Multiplexer,
    ws_stream: WsStream,
    config: &ConnectionConfig,
    cancel: &CancellationToken,
) {
    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WireMessage>();
    mux.attach(tx);

    let mut heartbeat = config.heartbeat_interval().map(tokio::time::interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }

            Some(msg) = rx.recv() => {
                let json = match msg.to_json() {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize {} message: {}", msg.kind, e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }

            _ = next_heartbeat(&mut heartbeat) => {
                if mux.send(kinds::PING, json!({})).is_none() {
                    debug!("Heartbeat skipped: link not attached");
                }
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    mux.handle_text(text.as_str());
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("Ignoring binary WebSocket frame");
                }
                Some(Ok(Message::Close(_))) => {
                    info!("WebSocket closed by backend");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong frames are answered by tungstenite
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    // Frames queued after the link dropped are discarded, not replayed later
    mux.detach();
    rx.close();
    let mut discarded = 0usize;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!("Discarded {} unsent outbound messages", discarded);
    }
}
