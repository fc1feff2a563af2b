use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use whodunit_protocol::*;

mod game;
mod leaderboard;
mod timers;

use game::{JoinError, Room};
use leaderboard::Leaderboard;

// ==== knobs ====
const MIN_PLAYERS: usize = 4; // a round needs at least this many suspects
const MAX_PLAYERS: usize = 8; // room cap, also the palette size
const MAX_QUESTIONS_PER_PLAYER: usize = 3; // per asker, per round

#[derive(Clone)]
struct AppState {
    rooms: Arc<Mutex<Rooms>>,
    leaderboard: Arc<Leaderboard>,
}
type Rooms = HashMap<String, game::Room>;

#[derive(Parser, Debug)]
#[command(name = "whodunit-server", about = "Murder-mystery party game server")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 9001)]
    port: u16,
    /// Flat file holding the high-score list.
    #[arg(long, default_value = "./leaderboard.json")]
    leaderboard_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let leaderboard = Leaderboard::open(cli.leaderboard_path.clone())
        .with_context(|| format!("opening leaderboard at {}", cli.leaderboard_path.display()))?;

    let state = AppState {
        rooms: Arc::new(Mutex::new(HashMap::new())),
        leaderboard: Arc::new(leaderboard),
    };
    let app = Router::new()
        .route("/", get(leaderboard_page))
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(api_leaderboard))
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("server listening on ws://{addr}/ws");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = tokio::sync::mpsc::unbounded_channel::<ServerToClient>();

    tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let text = serde_json::to_string(&msg).unwrap();
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let my_id = Uuid::new_v4();
    let _ = tx_out.send(ServerToClient::Connected { player_id: my_id });
    debug!("[CONNECT] {my_id}");

    let mut joined_room: Option<String> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(t) => match serde_json::from_str::<ClientToServer>(&t) {
                Ok(cmd) => route_cmd(cmd, &state, &mut joined_room, my_id, &tx_out),
                Err(e) => debug!("[DROP] {my_id} sent malformed message: {e}"),
            },
            _ => {}
        }
    }

    // The read loop ends on clean close, abrupt drop, and protocol error
    // alike; cleanup lives here so every exit path is covered.
    if let Some(room) = joined_room.take() {
        remove_player(&state, &room, my_id);
    }
    debug!("[DISCONNECT] {my_id}");
}

fn route_cmd(
    cmd: ClientToServer,
    state: &AppState,
    joined_room: &mut Option<String>,
    my_id: Uuid,
    tx_out: &mpsc::UnboundedSender<ServerToClient>,
) {
    match cmd {
        ClientToServer::CreateRoom => {
            let mut rooms = state.rooms.lock();
            let mut code = generate_room_code();
            while rooms.contains_key(&code) {
                code = generate_room_code();
            }
            rooms.insert(code.clone(), Room::new(code.clone()));
            info!("[CREATE] room {code}");
            let _ = tx_out.send(ServerToClient::RoomCreated { room_code: code });
        }
        ClientToServer::JoinRoom {
            room_code,
            player_name,
        } => {
            let code = room_code.to_uppercase();
            let mut rooms = state.rooms.lock();
            // Validate the target before leaving the current room so a
            // rejected join never unseats the caller.
            let denied = match rooms.get(&code) {
                None => Some(JoinError::RoomNotFound),
                Some(room) if room.players.len() >= MAX_PLAYERS => Some(JoinError::RoomFull),
                Some(room) if room.phase != Phase::Waiting => Some(JoinError::GameInProgress),
                Some(_) => None,
            };
            if let Some(e) = denied {
                let _ = tx_out.send(ServerToClient::Error {
                    message: e.to_string(),
                });
                return;
            }
            // A connection seated elsewhere changes rooms by leaving first.
            if let Some(old) = joined_room.take() {
                remove_player_locked(&mut rooms, &old, my_id);
            }
            let room = match rooms.get_mut(&code) {
                Some(r) => r,
                None => {
                    // Leaving can drop the target itself: a lone player
                    // rejoining their own room.
                    let _ = tx_out.send(ServerToClient::Error {
                        message: JoinError::RoomNotFound.to_string(),
                    });
                    return;
                }
            };
            let player = room.seat_player(my_id, player_name, tx_out.clone());
            let player_count = room.players.len();
            info!(
                "[JOIN] {} ({my_id}) -> room {code} ({player_count} seated)",
                player.name
            );
            broadcast_except(
                room,
                my_id,
                &ServerToClient::PlayerJoined {
                    player,
                    player_count,
                },
            );
            let _ = tx_out.send(ServerToClient::RoomJoined {
                room_code: code.clone(),
                players: room.public_players(),
                game_state: room.personal_state(my_id),
            });
            *joined_room = Some(code);
        }
        ClientToServer::StartGame => {
            with_room(state, joined_room, |st, room| start_game(st, room));
        }
        ClientToServer::SubmitAlibi { alibi } => {
            with_room(state, joined_room, |_, room| {
                player_submit_alibi(room, my_id, alibi)
            });
        }
        ClientToServer::AskQuestion { to_id, question } => {
            with_room(state, joined_room, |_, room| {
                player_ask_question(room, my_id, to_id, question)
            });
        }
        ClientToServer::AnswerQuestion {
            question_id,
            answer,
        } => {
            with_room(state, joined_room, |_, room| {
                player_answer_question(room, my_id, question_id, answer)
            });
        }
        ClientToServer::SubmitVote {
            suspect_id,
            confidence,
        } => {
            with_room(state, joined_room, |_, room| {
                player_submit_vote(room, my_id, suspect_id, confidence)
            });
        }
    }
}

/// Runs `f` on the caller's room, if any. Unseated callers and stale codes
/// fall through silently.
fn with_room<F>(state: &AppState, joined_room: &Option<String>, f: F)
where
    F: FnOnce(&AppState, &mut Room),
{
    if let Some(code) = joined_room {
        let mut rooms = state.rooms.lock();
        if let Some(room) = rooms.get_mut(code) {
            f(state, room);
        }
    }
}

fn start_game(state: &AppState, room: &mut Room) {
    if room.phase != Phase::Waiting || room.players.len() < MIN_PLAYERS {
        debug!(
            "[START] room {} not ready ({} seated, {:?})",
            room.code,
            room.players.len(),
            room.phase
        );
        return;
    }
    room.begin_round();
    info!("[START] room {} round {}", room.code, room.round_number);
    start_phase(state, room, Phase::Setup);
}

/// Moves the room into `phase`: invalidates every armed timer, stamps the
/// clock, fans out personalized snapshots, then arms the advance timer and,
/// during interrogation, one reveal timer per evidence item.
fn start_phase(state: &AppState, room: &mut Room, phase: Phase) {
    room.timers.cancel_all();
    room.phase = phase;
    room.phase_started_at = Utc::now().timestamp_millis();
    info!("[PHASE] room {} -> {:?}", room.code, phase);
    broadcast_phase_change(room);

    let epoch = room.timers.epoch;
    if let Some(duration) = phase.duration_ms() {
        let st = state.clone();
        let code = room.code.clone();
        room.timers.phase = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(duration)).await;
            advance_phase(&st, &code, epoch);
        }));
    }
    if phase == Phase::Interrogation {
        let schedule: Vec<Evidence> = room
            .crime
            .as_ref()
            .map(|c| c.evidence.clone())
            .unwrap_or_default();
        for evidence in schedule {
            let st = state.clone();
            let code = room.code.clone();
            room.timers.evidence.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(evidence.reveal_time)).await;
                reveal_evidence(&st, &code, evidence, epoch);
            }));
        }
    }
}

/// Phase-timer body. The epoch check makes a timer armed before the latest
/// `start_phase` a no-op even if it had already woken up.
fn advance_phase(state: &AppState, code: &str, epoch: u64) {
    let mut candidates = Vec::new();
    {
        let mut rooms = state.rooms.lock();
        let room = match rooms.get_mut(code) {
            Some(r) => r,
            None => return,
        };
        if room.timers.epoch != epoch {
            return;
        }
        let next = room.phase.next();
        if next == Phase::Results {
            candidates = room.score_round();
        }
        if next == Phase::Waiting {
            room.guilty_player_id = None;
        }
        start_phase(state, room, next);
    }
    // File IO stays outside the registry lock.
    for entry in candidates {
        if let Err(e) = state.leaderboard.append(entry) {
            warn!("[LEADERBOARD] append failed: {e}");
        }
    }
}

/// Evidence-timer body, same staleness rule as `advance_phase`.
fn reveal_evidence(state: &AppState, code: &str, evidence: Evidence, epoch: u64) {
    let mut rooms = state.rooms.lock();
    let room = match rooms.get_mut(code) {
        Some(r) => r,
        None => return,
    };
    if room.timers.epoch != epoch {
        return;
    }
    info!("[EVIDENCE] room {code} reveals {}", evidence.id);
    room.revealed_evidence.push(evidence.clone());
    broadcast(room, &ServerToClient::EvidenceRevealed { evidence });
}

fn player_submit_alibi(room: &mut Room, player_id: Uuid, alibi: String) {
    if room.phase != Phase::AlibiConstruction {
        debug!("[ALIBI] {player_id} ignored in {:?}", room.phase);
        return;
    }
    room.alibis.insert(player_id, alibi);
    broadcast(room, &ServerToClient::AlibiSubmitted { player_id });
}

fn player_ask_question(room: &mut Room, from: Uuid, to: Uuid, text: String) {
    if room.phase != Phase::Interrogation {
        debug!("[ASK] {from} ignored in {:?}", room.phase);
        return;
    }
    let asked = room.questions.iter().filter(|q| q.from == from).count();
    if asked >= MAX_QUESTIONS_PER_PLAYER {
        debug!("[ASK] {from} is over the question cap");
        return;
    }
    let question = Question {
        id: Uuid::new_v4(),
        from,
        to,
        question: text,
        answer: None,
        timestamp: Utc::now().to_rfc3339(),
    };
    room.questions.push(question.clone());
    broadcast(room, &ServerToClient::NewQuestion { question });
}

/// No phase gate: a straggling answer still lands as long as the question is
/// open and addressed to the answerer.
fn player_answer_question(room: &mut Room, answerer: Uuid, question_id: Uuid, answer: String) {
    let question = match room.questions.iter_mut().find(|q| q.id == question_id) {
        Some(q) => q,
        None => return,
    };
    if question.to != answerer || question.answer.is_some() {
        return;
    }
    question.answer = Some(answer.clone());
    broadcast(
        room,
        &ServerToClient::QuestionAnswered {
            question_id,
            answer,
        },
    );
}

fn player_submit_vote(room: &mut Room, voter: Uuid, suspect_id: Uuid, confidence: u8) {
    if room.phase != Phase::Accusations {
        debug!("[VOTE] {voter} ignored in {:?}", room.phase);
        return;
    }
    let confidence = confidence.clamp(1, 3);
    room.votes.insert(
        voter,
        Vote {
            suspect_id,
            confidence,
        },
    );
    broadcast(room, &ServerToClient::VoteSubmitted { player_id: voter });
}

fn remove_player(state: &AppState, code: &str, player_id: Uuid) {
    let mut rooms = state.rooms.lock();
    remove_player_locked(&mut rooms, code, player_id);
}

/// Removal body for callers already holding the registry lock.
fn remove_player_locked(rooms: &mut Rooms, code: &str, player_id: Uuid) {
    if let Some(room) = rooms.get_mut(code) {
        let before = room.players.len();
        room.players.retain(|p| p.id != player_id);
        if room.players.len() == before {
            return;
        }
        info!("[LEAVE] {player_id} left room {code}");
        if room.players.is_empty() {
            room.timers.cancel_all();
            rooms.remove(code);
            info!("[CLOSE] room {code} empty, dropped");
            return;
        }
        if room.host_id == Some(player_id) {
            room.host_id = room.players.first().map(|p| p.id);
        }
        let player_count = room.players.len();
        broadcast(
            room,
            &ServerToClient::PlayerLeft {
                player_id,
                player_count,
            },
        );
    }
}

fn broadcast(room: &Room, msg: &ServerToClient) {
    for p in &room.players {
        let _ = p.tx.send(msg.clone());
    }
}

fn broadcast_except(room: &Room, skip: Uuid, msg: &ServerToClient) {
    for p in room.players.iter().filter(|p| p.id != skip) {
        let _ = p.tx.send(msg.clone());
    }
}

/// Each member gets a snapshot cut for them alone; the culprit's copy hides
/// the crime sheet.
fn broadcast_phase_change(room: &Room) {
    for p in &room.players {
        let _ = p
            .tx
            .send(ServerToClient::PhaseChange(room.personal_state(p.id)));
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

async fn api_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<Vec<LeaderboardEntry>> {
    Json(state.leaderboard.top_n(query.limit.unwrap_or(10)))
}

async fn leaderboard_page() -> Html<&'static str> {
    Html(LEADERBOARD_PAGE)
}

const LEADERBOARD_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Whodunit Hall of Fame</title>
<style>
  body { font-family: Georgia, serif; background: #1b1b23; color: #eee; max-width: 640px; margin: 40px auto; }
  h1 { text-align: center; }
  table { width: 100%; border-collapse: collapse; }
  td, th { padding: 8px 12px; border-bottom: 1px solid #333; text-align: left; }
  .score { text-align: right; font-variant-numeric: tabular-nums; }
</style>
</head>
<body>
<h1>🔎 Whodunit Hall of Fame</h1>
<table>
  <thead><tr><th>Detective</th><th class="score">Score</th></tr></thead>
  <tbody id="rows"></tbody>
</table>
<script>
async function refresh() {
  const res = await fetch('/api/leaderboard?limit=10');
  if (!res.ok) return;
  const entries = await res.json();
  document.getElementById('rows').innerHTML = entries.map(e =>
    '<tr><td>' + e.name + '</td><td class="score">' + e.score + '</td></tr>'
  ).join('');
}
refresh();
setInterval(refresh, 10000);
</script>
</body>
</html>
"#;
