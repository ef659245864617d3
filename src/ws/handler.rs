//! WebSocket upgrade handler

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::error::GameError;
use crate::game::GameService;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outbound queue depth per connection
const OUTBOUND_BUFFER: usize = 64;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        connection_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(connection_id = %connection_id, error = %e, "Failed to send welcome");
        return;
    }

    // Writer task: replies and game broadcasts -> WebSocket
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_BUFFER);
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let mut connection = Connection::new(connection_id, state.games.clone(), out_tx.clone());

    // Reader loop: WebSocket -> game service
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = connection.on_text(&text).await;
                if out_tx.send(reply).await.is_err() {
                    debug!(connection_id = %connection_id, "Outbound channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // A dropped connection simply stops declaring; the deadline default covers it
    drop(connection);
    writer_handle.abort();

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Per-connection session: which games this socket joined and under which participant
pub struct Connection {
    id: Uuid,
    games: GameService,
    out_tx: mpsc::Sender<ServerMsg>,
    limiter: ConnectionRateLimiter,
    joined: HashMap<Uuid, Uuid>,
    forwarders: HashMap<Uuid, JoinHandle<()>>,
}

impl Connection {
    pub fn new(id: Uuid, games: GameService, out_tx: mpsc::Sender<ServerMsg>) -> Self {
        Self::with_limiter(id, games, out_tx, ConnectionRateLimiter::new())
    }

    pub fn with_limiter(
        id: Uuid,
        games: GameService,
        out_tx: mpsc::Sender<ServerMsg>,
        limiter: ConnectionRateLimiter,
    ) -> Self {
        Self {
            id,
            games,
            out_tx,
            limiter,
            joined: HashMap::new(),
            forwarders: HashMap::new(),
        }
    }

    /// Rate-limit, parse and handle one text frame. Every frame gets a reply.
    pub async fn on_text(&mut self, text: &str) -> ServerMsg {
        if !self.limiter.check_message() {
            warn!(connection_id = %self.id, "Rate limited client message");
            return ServerMsg::Error {
                code: "rate_limited".into(),
                message: "too many messages, slow down".into(),
            };
        }

        match serde_json::from_str::<ClientMsg>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Failed to parse client message");
                ServerMsg::Error {
                    code: "validation".into(),
                    message: format!("malformed message: {e}"),
                }
            }
        }
    }

    /// Handle one client message and produce the direct reply
    pub async fn handle(&mut self, msg: ClientMsg) -> ServerMsg {
        match msg {
            ClientMsg::CreateGame { mode, bots } => {
                let game_id = self.games.create_game(mode, bots);
                ServerMsg::GameCreated { game_id, mode }
            }
            ClientMsg::JoinGame {
                game_id,
                participant_name,
            } => self.join(game_id, participant_name).await,
            ClientMsg::Declare {
                game_id,
                character_id,
                movement,
                action,
            } => {
                let Some(&participant_id) = self.joined.get(&game_id) else {
                    return rejected(
                        game_id,
                        character_id,
                        &GameError::Validation("join the game before declaring".into()),
                    );
                };
                match self
                    .games
                    .declare(game_id, participant_id, character_id, movement, action)
                    .await
                {
                    Ok(receipt) => ServerMsg::DeclarationAccepted {
                        game_id,
                        round: receipt.round,
                        character_id,
                    },
                    Err(e) => {
                        debug!(connection_id = %self.id, game_id = %game_id, error = %e, "Declaration rejected");
                        rejected(game_id, character_id, &e)
                    }
                }
            }
            ClientMsg::Ping { t } => ServerMsg::Pong {
                t,
                server_time: unix_millis(),
            },
        }
    }

    async fn join(&mut self, game_id: Uuid, participant_name: String) -> ServerMsg {
        // Subscribe first so nothing published after the join reply is missed
        let events = self.games.subscribe(game_id);

        match self.games.join_game(game_id, participant_name).await {
            Ok(ticket) => {
                self.joined.insert(game_id, ticket.participant_id);
                if let (Ok(events), false) = (events, self.forwarders.contains_key(&game_id)) {
                    let handle = spawn_forwarder(self.id, game_id, events, self.out_tx.clone());
                    self.forwarders.insert(game_id, handle);
                }
                info!(
                    connection_id = %self.id,
                    game_id = %game_id,
                    character_id = %ticket.character_id,
                    reconnected = ticket.reconnected,
                    "Joined game"
                );
                ServerMsg::Joined {
                    game_id,
                    character_id: ticket.character_id,
                    participant_id: ticket.participant_id,
                    reconnected: ticket.reconnected,
                    snapshot: ticket.snapshot,
                }
            }
            Err(e) => error_msg(&e),
        }
    }

}

impl Drop for Connection {
    fn drop(&mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }
}

/// Relay a game's broadcasts into a connection's outbound queue
fn spawn_forwarder(
    connection_id: Uuid,
    game_id: Uuid,
    mut events: broadcast::Receiver<ServerMsg>,
    out_tx: mpsc::Sender<ServerMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    if out_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        connection_id = %connection_id,
                        game_id = %game_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(connection_id = %connection_id, game_id = %game_id, "Game channel closed");
                    break;
                }
            }
        }
    })
}

fn rejected(game_id: Uuid, character_id: Uuid, err: &GameError) -> ServerMsg {
    ServerMsg::DeclarationRejected {
        game_id,
        character_id,
        code: err.code().to_string(),
        reason: err.to_string(),
    }
}

fn error_msg(err: &GameError) -> ServerMsg {
    ServerMsg::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
