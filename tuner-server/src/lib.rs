//! WebSocket front end for the tuner.
//!
//! Each connection to `/tune` gets its own [`Session`]; text frames are
//! control messages and binary frames are little-endian f32 audio.

use std::fmt::Display;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tuner_core::{Inbound, Session, TunerConfig, TuningCatalog};

/// Shared, read-only state handed to every connection
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TunerConfig>,
    pub catalog: Arc<TuningCatalog>,
}

impl AppState {
    pub fn new(config: TunerConfig) -> tuner_core::Result<Self> {
        config.validate()?;
        let catalog = config.catalog()?;
        Ok(Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        })
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.config.clone(), self.catalog.clone())
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tune", get(tune_ws))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "tuner-server",
        "version": env!("CARGO_PKG_VERSION"),
        "sample_rate": state.config.sample_rate,
        "window_size": state.config.window_size,
        "tunings": state.catalog.names().collect::<Vec<_>>(),
        "default_tuning": state.catalog.default_table().name(),
    }))
}

async fn tune_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
        .into_response()
}

/// What the connection loop should do after one incoming frame
#[derive(Debug)]
pub enum Step {
    /// Send this frame and keep going
    Reply(Message),
    /// Nothing to send
    Continue,
    /// Send a close frame and end the session
    Close(CloseFrame<'static>),
    /// Peer closed; end without sending anything
    Stop,
}

/// Applies one WebSocket frame to `session`.
pub fn process_frame(session: &mut Session, frame: Message) -> Step {
    let reply = match &frame {
        Message::Text(text) => session.handle(Inbound::Control(text)),
        Message::Binary(bytes) => session.handle(Inbound::Audio(bytes)),
        // Pings are answered by axum itself.
        Message::Ping(_) | Message::Pong(_) => return Step::Continue,
        Message::Close(_) => return Step::Stop,
    };

    match reply {
        Ok(Some(outbound)) => match outbound.to_json() {
            Ok(body) => Step::Reply(Message::Text(body)),
            Err(e) => {
                warn!(error = %e, "failed to encode reply");
                Step::Continue
            }
        },
        Ok(None) => Step::Continue,
        Err(e) => {
            warn!(error = %e, "closing session on corrupt audio frame");
            Step::Close(CloseFrame {
                code: close_code::INVALID,
                reason: e.to_string().into(),
            })
        }
    }
}

/// Why a connection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer sent a close frame
    PeerClosed,
    /// Incoming stream ended without a close frame
    Disconnected,
    /// Corrupt audio; a close frame was sent
    Rejected,
    /// Receiving a frame failed
    ReceiveFailed,
    /// Sending a reply failed
    SendFailed,
}

async fn run_session(socket: WebSocket, state: AppState) {
    let session = state.new_session();
    info!(tuning = session.tuning().name(), "tuner session opened");
    let (tx, rx) = socket.split();
    let end = drive_session(session, tx, rx).await;
    info!(?end, "tuner session closed");
}

/// Feeds frames from `rx` through `session` and writes replies to `tx`
/// until the peer goes away or the session is rejected.
pub async fn drive_session<Tx, Rx, E>(mut session: Session, mut tx: Tx, mut rx: Rx) -> SessionEnd
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "websocket receive failed");
                return SessionEnd::ReceiveFailed;
            }
        };

        match process_frame(&mut session, frame) {
            Step::Reply(message) => {
                if let Err(e) = tx.send(message).await {
                    debug!(error = %e, "websocket send failed");
                    return SessionEnd::SendFailed;
                }
            }
            Step::Continue => {}
            Step::Close(frame) => {
                if let Err(e) = tx.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "failed to send close frame");
                }
                return SessionEnd::Rejected;
            }
            Step::Stop => return SessionEnd::PeerClosed,
        }
    }
    SessionEnd::Disconnected
}
