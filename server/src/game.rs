use chrono::Utc;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;
use whodunit_protocol::{
    crime_catalog, score_votes, Crime, CrimeView, Evidence, GameState, LeaderboardEntry, Phase,
    PublicPlayer, Question, RoundResults, ServerToClient, Vote, PLAYER_AVATARS, PLAYER_COLORS,
};

use crate::timers::RoomTimers;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Game already in progress")]
    GameInProgress,
}

pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub avatar: String,
    pub score: u32,
    pub tx: UnboundedSender<ServerToClient>,
}

impl Player {
    pub fn public(&self) -> PublicPlayer {
        PublicPlayer {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            avatar: self.avatar.clone(),
            score: self.score,
        }
    }
}

/// One live party. Everything round-scoped is cleared by `begin_round`;
/// players and their scores outlive rounds but not their connections.
pub struct Room {
    pub code: String,
    pub host_id: Option<Uuid>,
    pub players: Vec<Player>,
    pub phase: Phase,
    pub crime: Option<Crime>,
    pub guilty_player_id: Option<Uuid>,
    /// Survives the wrap back to the lobby so the next draw can avoid a repeat.
    pub previous_guilty: Option<Uuid>,
    pub alibis: HashMap<Uuid, String>,
    pub questions: Vec<Question>,
    pub votes: HashMap<Uuid, Vote>,
    pub revealed_evidence: Vec<Evidence>,
    pub phase_started_at: i64,
    pub round_number: u32,
    pub results: Option<RoundResults>,
    pub timers: RoomTimers,
}

impl Room {
    pub fn new(code: String) -> Room {
        Room {
            code,
            host_id: None,
            players: Vec::new(),
            phase: Phase::Waiting,
            crime: None,
            guilty_player_id: None,
            previous_guilty: None,
            alibis: HashMap::new(),
            questions: Vec::new(),
            votes: HashMap::new(),
            revealed_evidence: Vec::new(),
            phase_started_at: Utc::now().timestamp_millis(),
            round_number: 0,
            results: None,
            timers: RoomTimers::default(),
        }
    }

    /// Adds a player, assigning color and avatar by join index. The first
    /// player to sit down becomes host. The id is the connection's id so the
    /// client can recognize itself in snapshots.
    pub fn seat_player(
        &mut self,
        id: Uuid,
        name: String,
        tx: UnboundedSender<ServerToClient>,
    ) -> PublicPlayer {
        let idx = self.players.len();
        let player = Player {
            id,
            name,
            color: PLAYER_COLORS[idx % PLAYER_COLORS.len()].to_string(),
            avatar: PLAYER_AVATARS[idx % PLAYER_AVATARS.len()].to_string(),
            score: 0,
            tx,
        };
        if self.host_id.is_none() {
            self.host_id = Some(player.id);
        }
        let public = player.public();
        self.players.push(player);
        public
    }

    pub fn public_players(&self) -> Vec<PublicPlayer> {
        self.players.iter().map(Player::public).collect()
    }

    /// Draws a fresh crime and culprit and resets all round-scoped state.
    /// The previous culprit is excluded from the draw unless nobody else is
    /// seated.
    pub fn begin_round(&mut self) {
        let mut rng = thread_rng();
        self.crime = crime_catalog().choose(&mut rng).cloned();
        let mut candidates: Vec<Uuid> = self
            .players
            .iter()
            .map(|p| p.id)
            .filter(|id| Some(*id) != self.previous_guilty)
            .collect();
        if candidates.is_empty() {
            candidates = self.players.iter().map(|p| p.id).collect();
        }
        self.guilty_player_id = candidates.choose(&mut rng).copied();
        self.previous_guilty = self.guilty_player_id;
        self.alibis.clear();
        self.questions.clear();
        self.votes.clear();
        self.revealed_evidence.clear();
        self.results = None;
        self.round_number += 1;
    }

    /// Applies this round's votes to running totals, records the reveal, and
    /// returns the players who belong on the high-score list.
    pub fn score_round(&mut self) -> Vec<LeaderboardEntry> {
        let guilty_id = match self.guilty_player_id {
            Some(id) => id,
            None => return Vec::new(),
        };
        let deltas = score_votes(guilty_id, &self.votes);
        for player in &mut self.players {
            if let Some(delta) = deltas.get(&player.id) {
                player.score += delta;
            }
        }
        self.results = Some(RoundResults {
            guilty_player_id: guilty_id,
            votes: self.votes.clone(),
            scores: self.players.iter().map(|p| (p.id, p.score)).collect(),
        });
        let stamp = Utc::now().to_rfc3339();
        self.players
            .iter()
            .filter(|p| p.score > 0)
            .map(|p| LeaderboardEntry {
                name: p.name.clone(),
                score: p.score,
                timestamp: stamp.clone(),
            })
            .collect()
    }

    /// Snapshot as one recipient sees it: the culprit gets a redacted crime
    /// and `is_guilty` flips for them alone.
    pub fn personal_state(&self, recipient: Uuid) -> GameState {
        let is_guilty = self.guilty_player_id == Some(recipient);
        GameState {
            phase: self.phase,
            round_number: self.round_number,
            phase_started_at: self.phase_started_at,
            host_id: self.host_id,
            players: self.public_players(),
            crime: self
                .crime
                .as_ref()
                .map(|c| CrimeView::for_recipient(c, is_guilty)),
            alibis: self.alibis.clone(),
            questions: self.questions.clone(),
            revealed_evidence: self.revealed_evidence.clone(),
            is_guilty,
            results: self.results.clone(),
        }
    }
}
