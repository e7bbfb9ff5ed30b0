//! WebSocket handler for `/ws/transcribe`.
//!
//! One session per connection. The handler owns three event sources: the
//! client socket (control messages and audio), the session's event bridge
//! (everything to be written back to the client), and the driver's exit
//! report. Protocol-level mistakes are answered with an `error` event and
//! the socket stays open; fatal errors emit `error` and then close.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::asr::DriverExit;
use crate::error::{ErrorCode, SessionError, Severity};
use crate::events::{EventEmitter, SessionEvent, SessionEventBridge};
use crate::session::{parse_control_message, ControlMessage, SessionHandle, SessionState};

/// Close code for "try again later" when the server is at `SESSION_MAX`.
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main connection loop: one [`SessionHandle`] per connection, driven by the
/// control protocol until `stop`, a fatal error, or a client disconnect.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    if state.session_registry.at_capacity() {
        tracing::warn!("refusing connection, session capacity exhausted");
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: "session capacity exhausted".into(),
            })))
            .await;
        return;
    }

    let (bridge, mut events_rx) = SessionEventBridge::new();
    let emitter: std::sync::Arc<dyn EventEmitter> = std::sync::Arc::new(bridge);
    let (exit_tx, mut exit_rx) = mpsc::channel(1);

    let mut session = SessionHandle::idle(state.cancel_token.child_token(), emitter, exit_tx);
    let mut guard: Option<crate::session::SessionGuard> = None;
    let mut close_code: Option<u16> = Some(1000);
    let mut client_gone = false;

    loop {
        tokio::select! {
            biased;

            event = events_rx.recv() => {
                let Some(event) = event else { break };
                let is_terminal = matches!(
                    event,
                    SessionEvent::SessionClosed { .. } | SessionEvent::Error { .. }
                );
                if send_event(&mut sender, &event).await.is_err() || is_terminal {
                    break;
                }
            }

            exit = exit_rx.recv() => {
                let Some((exit, stats)) = exit else { break };
                match exit {
                    DriverExit::Stopped | DriverExit::IdleTimeout => {
                        close_code = Some(session.finalize(&exit, stats));
                        // `session_closed` flows through the bridge; the
                        // events arm above delivers it and ends the loop.
                    }
                    DriverExit::Failed(err) => {
                        close_code = Some(session.fail(&err));
                    }
                }
            }

            msg = receiver.next(), if !client_gone => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_control_message(&text) {
                            Ok(ControlMessage::Start(req)) => {
                                if session.state() != SessionState::Idle {
                                    reject(&mut sender, &SessionError::AlreadyActive).await;
                                    continue;
                                }
                                match state.session_registry.register(req.session_id.clone()) {
                                    Ok(slot) => {
                                        let result = session.start(
                                            req,
                                            state.asr_provider.clone(),
                                            state.sink.clone(),
                                            state.slide_matcher.clone(),
                                        ).await;
                                        match result {
                                            Ok(()) => guard = Some(slot),
                                            Err(err) => {
                                                close_code = Some(session.fail(&err));
                                            }
                                        }
                                    }
                                    Err(_) => {
                                        close_code = Some(CLOSE_TRY_AGAIN_LATER);
                                        break;
                                    }
                                }
                            }
                            Ok(ControlMessage::Stop) => {
                                if let Err(err) = session.begin_stop().await {
                                    reject(&mut sender, &err).await;
                                }
                                // The driver's exit report completes the
                                // stop; nothing terminal happens here.
                            }
                            Err(err) => {
                                if session.state() == SessionState::Idle
                                    && err.severity() == Severity::Protocol
                                {
                                    reject(&mut sender, &err).await;
                                } else {
                                    close_code = Some(session.fail(&err));
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Err(err) = session.push_audio(data).await {
                            close_code = Some(session.fail(&err));
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        client_gone = true;
                        close_code = None;
                        if session.state() == SessionState::Active {
                            // Client went away without `stop`: behave as a
                            // stop so queued audio still reaches the
                            // provider and the summary is logged.
                            let _ = session.begin_stop().await;
                        } else if session.state() != SessionState::Stopping {
                            session.abandon();
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    session.abandon();
    if let Some(code) = close_code {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: String::new().into(),
            })))
            .await;
    }
    drop(guard);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &SessionEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize session event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Reports a protocol-level error to the client without ending the session
/// or the socket.
async fn reject(sender: &mut SplitSink<WebSocket, Message>, err: &SessionError) {
    let event = SessionEvent::Error {
        message: format!("[{}] {err}", err.code()),
    };
    let _ = send_event(sender, &event).await;
}
