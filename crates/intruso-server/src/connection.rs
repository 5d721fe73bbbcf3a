use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use intruso_common::protocol::{
    self, framed_transport, serialize_message, ClientMessage, ErrorCode, ServerMessage,
};

use crate::handler;
use crate::server::SharedState;
use crate::session::Session;

pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    // Step 1: Handshake -- expect Hello
    let hello: ClientMessage = match protocol::recv_message(&mut transport).await? {
        Some(msg) => msg,
        None => return Ok(()),
    };

    let (user_id, reconnect) = match hello {
        ClientMessage::Hello {
            user_id,
            reconnect,
            version,
        } => {
            tracing::debug!(?user_id, reconnect, "Hello (client version: {})", version);
            (user_id, reconnect)
        }
        _ => {
            protocol::send_message(
                &mut transport,
                &ServerMessage::HandshakeError {
                    reason: "Expected Hello message".into(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    let connection_id = Uuid::new_v4();
    protocol::send_message(
        &mut transport,
        &ServerMessage::Welcome {
            connection_id,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
    .await?;

    // Step 2: Outbound channel, never awaited by broadcasters
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state
        .sessions
        .write()
        .await
        .insert(Session::new(connection_id, tx));

    // Step 3: Split transport for independent read/write
    let (mut sink, mut stream) = transport.split();

    // Writer task: drains rx and writes to sink
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serialize_message(&msg) {
                Ok(bytes) => {
                    if sink.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    handler::restore_session(connection_id, user_id, reconnect, &state).await;

    // Step 4: Reader loop
    loop {
        match stream.next().await {
            Some(Ok(frame)) => match protocol::deserialize_message::<ClientMessage>(&frame) {
                Ok(ClientMessage::Disconnect) => {
                    tracing::info!(connection = %connection_id, "Client requested disconnect");
                    break;
                }
                Ok(msg) => {
                    if let Err(e) = handler::handle_message(connection_id, msg, &state).await {
                        tracing::error!(connection = %connection_id, "Handler error: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!(connection = %connection_id, "Failed to parse message: {}", e);
                    if serde_json::from_slice::<serde_json::Value>(&frame).is_ok() {
                        state.sessions.read().await.send_to(
                            connection_id,
                            ServerMessage::Error {
                                code: ErrorCode::UnknownCommand,
                                message: "unknown command".into(),
                            },
                        );
                    }
                }
            },
            Some(Err(e)) => {
                tracing::warn!(connection = %connection_id, "Read error: {}", e);
                break;
            }
            None => {
                tracing::info!(connection = %connection_id, "Connection closed");
                break;
            }
        }
    }

    // Cleanup
    handler::handle_disconnect(connection_id, &state).await;
    write_task.abort();
    Ok(())
}
