use crate::config::RelayConfig;
use crate::gmail_api::MailAuthenticator;
use crate::relay::{RelaySession, TurnOutcome};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::SinkExt;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Shared, read-only state handed to every browser connection.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub authenticator: Arc<dyn MailAuthenticator>,
}

impl AppState {
    pub fn new(config: RelayConfig, authenticator: Arc<dyn MailAuthenticator>) -> Self {
        Self {
            config: Arc::new(config),
            authenticator,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Bind the browser endpoint and serve until the process stops.
pub async fn serve(
    config: RelayConfig,
    authenticator: Arc<dyn MailAuthenticator>,
) -> std::io::Result<()> {
    let addr = config.browser_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Bridge started on ws://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState::new(config, authenticator))).await
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut session =
        match RelaySession::connect(state.config.clone(), state.authenticator.clone()).await {
            Ok(session) => session,
            Err(e) => {
                error!("Could not open relay session: {}", e);
                let _ = SinkExt::close(&mut socket).await;
                return;
            }
        };
    let id = session.id();
    info!("[{}] Browser connected", id);

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                warn!("[{}] Ignoring binary frame from browser", id);
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("[{}] Browser connection error: {}", id, e);
                break;
            }
        };

        match session.handle_turn(&text).await {
            TurnOutcome::Reply { answer, stats } => {
                debug!(
                    "[{}] Replying after {} checked, {} kept",
                    id, stats.total_checked, stats.total_nonpromo
                );
                // A timed-out answer still closes the turn with one (empty) frame
                if let Err(e) = socket
                    .send(Message::Text(answer.unwrap_or_default()))
                    .await
                {
                    debug!("[{}] Failed to reply to browser: {}", id, e);
                    break;
                }
            }
            TurnOutcome::Failed(e) if e.is_fatal() => {
                error!("[{}] Ending session: {}", id, e);
                break;
            }
            TurnOutcome::Failed(_) => {}
            TurnOutcome::Closed => break,
        }
    }

    info!("[{}] Browser disconnected", id);
    let _ = SinkExt::close(&mut socket).await;
    session.close().await;
}
