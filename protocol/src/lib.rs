use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// ---- Phases ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    Setup,
    AlibiConstruction,
    Interrogation,
    Accusations,
    Results,
}

impl Phase {
    /// Nominal duration of the phase, `None` for the open-ended lobby.
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            Phase::Waiting => None,
            Phase::Setup => Some(5_000),
            Phase::AlibiConstruction => Some(30_000),
            Phase::Interrogation => Some(30_000),
            Phase::Accusations => Some(20_000),
            Phase::Results => Some(10_000),
        }
    }

    /// Next phase in the fixed round sequence.
    pub fn next(&self) -> Phase {
        match self {
            Phase::Waiting => Phase::Setup,
            Phase::Setup => Phase::AlibiConstruction,
            Phase::AlibiConstruction => Phase::Interrogation,
            Phase::Interrogation => Phase::Accusations,
            Phase::Accusations => Phase::Results,
            Phase::Results => Phase::Waiting,
        }
    }
}

/// ---- Player identity palettes ----
/// Assigned round-robin by join order; both are sized to the room cap.
pub const PLAYER_COLORS: [&str; 8] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f1c40f", "#9b59b6", "#e67e22", "#1abc9c", "#e84393",
];

pub const PLAYER_AVATARS: [&str; 8] = ["🦊", "🐱", "🐺", "🦉", "🐰", "🐻", "🐼", "🐸"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPlayer {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub avatar: String,
    pub score: u32,
}

/// ---- Crimes & evidence ----
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub description: String,
    /// Seconds after interrogation start at which this clue goes public.
    pub reveal_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crime {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub time: String,
    pub evidence: Vec<Evidence>,
}

/// What a recipient sees in the `crime` slot of a snapshot. The guilty
/// player only ever learns the where and the when.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrimeView {
    Full(Crime),
    Redacted {
        location: String,
        time: String,
        hidden: bool,
    },
}

impl CrimeView {
    pub fn for_recipient(crime: &Crime, is_guilty: bool) -> CrimeView {
        if is_guilty {
            CrimeView::Redacted {
                location: crime.location.clone(),
                time: crime.time.clone(),
                hidden: true,
            }
        } else {
            CrimeView::Full(crime.clone())
        }
    }
}

/// Fixed scenario catalog; one entry is drawn per round.
pub fn crime_catalog() -> Vec<Crime> {
    vec![
        Crime {
            id: "gallery-heist".into(),
            title: "The Gallery Heist".into(),
            description: "The prized 'Midnight Venus' vanished from its frame during the \
                          champagne reception."
                .into(),
            location: "Blackwood Gallery, east wing".into(),
            time: "9:40 PM".into(),
            evidence: vec![
                Evidence {
                    id: "cut-canvas".into(),
                    description: "The canvas was cut from its frame with surgical precision."
                        .into(),
                    reveal_time: 5,
                },
                Evidence {
                    id: "propped-door".into(),
                    description: "The service door was propped open with a champagne cork.".into(),
                    reveal_time: 15,
                },
                Evidence {
                    id: "white-glove".into(),
                    description: "A single white glove lay behind the velvet rope.".into(),
                    reveal_time: 25,
                },
            ],
        },
        Crime {
            id: "poisoned-vintage".into(),
            title: "The Poisoned Vintage".into(),
            description: "Colonel Fairfax collapsed mid-toast; his glass of '52 Bordeaux was \
                          laced with something bitter."
                .into(),
            location: "The wine cellar".into(),
            time: "8:15 PM".into(),
            evidence: vec![
                Evidence {
                    id: "bitter-residue".into(),
                    description: "A bitter almond residue coated the bottom of the glass.".into(),
                    reveal_time: 6,
                },
                Evidence {
                    id: "cellar-key".into(),
                    description: "The cellar key went missing from its hook an hour earlier."
                        .into(),
                    reveal_time: 14,
                },
                Evidence {
                    id: "gloved-print".into(),
                    description: "A smudged glove print marked the decanter's neck.".into(),
                    reveal_time: 22,
                },
            ],
        },
        Crime {
            id: "observatory-sabotage".into(),
            title: "Sabotage at the Observatory".into(),
            description: "The great telescope's lens was shattered the night of the comet \
                          viewing, ruining Professor Lin's career observation."
                .into(),
            location: "The rooftop observatory".into(),
            time: "11:05 PM".into(),
            evidence: vec![
                Evidence {
                    id: "brass-weight".into(),
                    description: "A brass paperweight from the study sat among the glass shards."
                        .into(),
                    reveal_time: 8,
                },
                Evidence {
                    id: "muddy-rungs".into(),
                    description: "Fresh mud streaked the ladder rungs up to the dome.".into(),
                    reveal_time: 16,
                },
                Evidence {
                    id: "torn-sleeve".into(),
                    description: "A scrap of evening-wear fabric clung to the dome latch.".into(),
                    reveal_time: 24,
                },
            ],
        },
        Crime {
            id: "manuscript-theft".into(),
            title: "The Missing Manuscript".into(),
            description: "Lady Ashcombe's unpublished memoir disappeared from the locked \
                          library cabinet before the reading."
                .into(),
            location: "The library".into(),
            time: "7:30 PM".into(),
            evidence: vec![
                Evidence {
                    id: "picked-lock".into(),
                    description: "The cabinet lock bore fine scratches, picked rather than \
                                  forced."
                        .into(),
                    reveal_time: 5,
                },
                Evidence {
                    id: "ink-smudge".into(),
                    description: "A fresh ink smudge stained the reading desk's blotter.".into(),
                    reveal_time: 12,
                },
                Evidence {
                    id: "moved-ladder".into(),
                    description: "The rolling ladder was parked two shelves from its usual bay."
                        .into(),
                    reveal_time: 20,
                },
            ],
        },
        Crime {
            id: "conservatory-vandal".into(),
            title: "Ruin in the Conservatory".into(),
            description: "The duchess's prize orchid, due to be judged at dawn, was found \
                          snipped at the stem."
                .into(),
            location: "The glass conservatory".into(),
            time: "10:20 PM".into(),
            evidence: vec![
                Evidence {
                    id: "pruning-shears".into(),
                    description: "The gardener's shears were returned to the wrong peg, still \
                                  damp."
                        .into(),
                    reveal_time: 7,
                },
                Evidence {
                    id: "gravel-tracks".into(),
                    description: "Gravel from the orchid bed trailed toward the ballroom doors."
                        .into(),
                    reveal_time: 18,
                },
                Evidence {
                    id: "petal-pocket".into(),
                    description: "A crushed petal turned up near the coat stand.".into(),
                    reveal_time: 26,
                },
            ],
        },
    ]
}

/// ---- Room codes ----
const ROOM_CODE_LEN: usize = 4;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Four uppercase alphanumerics, e.g. "AB12". Uniqueness is the registry's
/// problem; callers retry on collision.
pub fn generate_room_code() -> String {
    let mut rng = thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .collect()
}

/// ---- Questions & votes ----
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub suspect_id: Uuid,
    pub confidence: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResults {
    pub guilty_player_id: Uuid,
    pub votes: HashMap<Uuid, Vote>,
    pub scores: HashMap<Uuid, u32>,
}

/// ---- Scoring ----
/// Applies the accusation payoff rule to one round's votes and returns the
/// score delta per player id. A correct accusation pays the voter
/// `100 x confidence`; every wrong vote feeds the guilty player's
/// `150 x fooled` bonus. Players absent from the map earn nothing. A guilty
/// self-vote is an ordinary map entry and gets no special handling.
pub fn score_votes(guilty_id: Uuid, votes: &HashMap<Uuid, Vote>) -> HashMap<Uuid, u32> {
    let mut deltas: HashMap<Uuid, u32> = HashMap::new();
    let mut fooled = 0u32;
    for (voter, vote) in votes {
        if vote.suspect_id == guilty_id {
            *deltas.entry(*voter).or_default() += 100 * vote.confidence as u32;
        } else {
            fooled += 1;
        }
    }
    if fooled > 0 {
        *deltas.entry(guilty_id).or_default() += 150 * fooled;
    }
    deltas
}

/// ---- Snapshots ----
/// Per-recipient view of a room. `crime` and `is_guilty` are personalized;
/// everything else is common to the whole room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub round_number: u32,
    pub phase_started_at: i64,
    pub host_id: Option<Uuid>,
    pub players: Vec<PublicPlayer>,
    pub crime: Option<CrimeView>,
    pub alibis: HashMap<Uuid, String>,
    pub questions: Vec<Question>,
    pub revealed_evidence: Vec<Evidence>,
    pub is_guilty: bool,
    pub results: Option<RoundResults>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
    pub timestamp: String,
}

/// ---- Wire messages ----
/// JSON envelopes `{type, payload}` over one WebSocket per player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientToServer {
    CreateRoom,
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_code: String,
        player_name: String,
    },
    StartGame,
    SubmitAlibi {
        alibi: String,
    },
    #[serde(rename_all = "camelCase")]
    AskQuestion {
        to_id: Uuid,
        question: String,
    },
    #[serde(rename_all = "camelCase")]
    AnswerQuestion {
        question_id: Uuid,
        answer: String,
    },
    #[serde(rename_all = "camelCase")]
    SubmitVote {
        suspect_id: Uuid,
        confidence: u8,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerToClient {
    #[serde(rename_all = "camelCase")]
    Connected {
        player_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_code: String,
    },
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_code: String,
        players: Vec<PublicPlayer>,
        game_state: GameState,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player: PublicPlayer,
        player_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_id: Uuid,
        player_count: usize,
    },
    /// Payload is the personalized snapshot itself.
    PhaseChange(GameState),
    #[serde(rename_all = "camelCase")]
    AlibiSubmitted {
        player_id: Uuid,
    },
    NewQuestion {
        question: Question,
    },
    #[serde(rename_all = "camelCase")]
    QuestionAnswered {
        question_id: Uuid,
        answer: String,
    },
    EvidenceRevealed {
        evidence: Evidence,
    },
    #[serde(rename_all = "camelCase")]
    VoteSubmitted {
        player_id: Uuid,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_envelope_parses() {
        let raw = r#"{"type":"JOIN_ROOM","payload":{"roomCode":"ab12","playerName":"Maya"}}"#;
        match serde_json::from_str::<ClientToServer>(raw).unwrap() {
            ClientToServer::JoinRoom {
                room_code,
                player_name,
            } => {
                assert_eq!(room_code, "ab12");
                assert_eq!(player_name, "Maya");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn bare_command_envelopes_parse_without_payload() {
        let create = serde_json::from_str::<ClientToServer>(r#"{"type":"CREATE_ROOM"}"#).unwrap();
        assert!(matches!(create, ClientToServer::CreateRoom));
        let start = serde_json::from_str::<ClientToServer>(r#"{"type":"START_GAME"}"#).unwrap();
        assert!(matches!(start, ClientToServer::StartGame));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let raw = r#"{"type":"DANCE_OFF","payload":{}}"#;
        assert!(serde_json::from_str::<ClientToServer>(raw).is_err());
    }

    #[test]
    fn room_created_envelope_shape() {
        let msg = ServerToClient::RoomCreated {
            room_code: "AB12".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "ROOM_CREATED", "payload": {"roomCode": "AB12"}})
        );
    }

    #[test]
    fn phase_change_payload_is_the_snapshot() {
        let snapshot = GameState {
            phase: Phase::AlibiConstruction,
            round_number: 2,
            phase_started_at: 1_700_000_000_000,
            host_id: None,
            players: vec![],
            crime: None,
            alibis: HashMap::new(),
            questions: vec![],
            revealed_evidence: vec![],
            is_guilty: false,
            results: None,
        };
        let value = serde_json::to_value(ServerToClient::PhaseChange(snapshot)).unwrap();
        assert_eq!(value["type"], "PHASE_CHANGE");
        assert_eq!(value["payload"]["phase"], "ALIBI_CONSTRUCTION");
        assert_eq!(value["payload"]["roundNumber"], 2);
        assert_eq!(value["payload"]["isGuilty"], false);
    }

    #[test]
    fn redacted_crime_hides_everything_but_place_and_time() {
        let catalog = crime_catalog();
        let crime = &catalog[0];

        let redacted = serde_json::to_value(CrimeView::for_recipient(crime, true)).unwrap();
        assert_eq!(redacted["hidden"], true);
        assert_eq!(redacted["location"], crime.location.as_str());
        assert_eq!(redacted["time"], crime.time.as_str());
        assert!(redacted.get("title").is_none());
        assert!(redacted.get("evidence").is_none());

        let full = serde_json::to_value(CrimeView::for_recipient(crime, false)).unwrap();
        assert_eq!(full["title"], crime.title.as_str());
        assert_eq!(full["evidence"].as_array().unwrap().len(), crime.evidence.len());
    }

    #[test]
    fn phase_sequence_is_fixed_and_wraps() {
        assert_eq!(Phase::Waiting.next(), Phase::Setup);
        assert_eq!(Phase::Setup.next(), Phase::AlibiConstruction);
        assert_eq!(Phase::AlibiConstruction.next(), Phase::Interrogation);
        assert_eq!(Phase::Interrogation.next(), Phase::Accusations);
        assert_eq!(Phase::Accusations.next(), Phase::Results);
        assert_eq!(Phase::Results.next(), Phase::Waiting);
    }

    #[test]
    fn phase_durations_match_schedule() {
        assert_eq!(Phase::Waiting.duration_ms(), None);
        assert_eq!(Phase::Setup.duration_ms(), Some(5_000));
        assert_eq!(Phase::AlibiConstruction.duration_ms(), Some(30_000));
        assert_eq!(Phase::Interrogation.duration_ms(), Some(30_000));
        assert_eq!(Phase::Accusations.duration_ms(), Some(20_000));
        assert_eq!(Phase::Results.duration_ms(), Some(10_000));
    }

    #[test]
    fn correct_vote_pays_hundred_per_confidence_point() {
        let guilty = Uuid::new_v4();
        let voter = Uuid::new_v4();
        let mut votes = HashMap::new();
        votes.insert(
            voter,
            Vote {
                suspect_id: guilty,
                confidence: 3,
            },
        );
        let deltas = score_votes(guilty, &votes);
        assert_eq!(deltas.get(&voter), Some(&300));
        assert_eq!(deltas.get(&guilty), None);
    }

    #[test]
    fn wrong_votes_pay_the_guilty_bonus() {
        let guilty = Uuid::new_v4();
        let sharp = Uuid::new_v4();
        let fooled = Uuid::new_v4();
        let innocent = Uuid::new_v4();
        let mut votes = HashMap::new();
        votes.insert(
            sharp,
            Vote {
                suspect_id: guilty,
                confidence: 2,
            },
        );
        votes.insert(
            fooled,
            Vote {
                suspect_id: innocent,
                confidence: 3,
            },
        );
        let deltas = score_votes(guilty, &votes);
        assert_eq!(deltas.get(&sharp), Some(&200));
        assert_eq!(deltas.get(&guilty), Some(&150));
        assert_eq!(deltas.get(&fooled), None);
    }

    #[test]
    fn guilty_self_vote_is_not_special_cased() {
        let guilty = Uuid::new_v4();
        let fooled = Uuid::new_v4();
        let innocent = Uuid::new_v4();
        let mut votes = HashMap::new();
        votes.insert(
            guilty,
            Vote {
                suspect_id: guilty,
                confidence: 3,
            },
        );
        votes.insert(
            fooled,
            Vote {
                suspect_id: innocent,
                confidence: 1,
            },
        );
        let deltas = score_votes(guilty, &votes);
        // 300 for the "correct" self-accusation plus 150 for one fooled voter.
        assert_eq!(deltas.get(&guilty), Some(&450));
    }

    #[test]
    fn no_votes_means_no_deltas() {
        let deltas = score_votes(Uuid::new_v4(), &HashMap::new());
        assert!(deltas.is_empty());
    }

    #[test]
    fn catalog_and_palettes_are_fixed_size() {
        let catalog = crime_catalog();
        assert_eq!(catalog.len(), 5);
        for crime in &catalog {
            assert!(!crime.evidence.is_empty());
            for evidence in &crime.evidence {
                // Reveals must land inside the interrogation window.
                assert!(evidence.reveal_time * 1_000 < Phase::Interrogation.duration_ms().unwrap());
            }
        }
        assert_eq!(PLAYER_COLORS.len(), 8);
        assert_eq!(PLAYER_AVATARS.len(), 8);
    }

    #[test]
    fn room_codes_are_four_uppercase_alphanumerics() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(code.len(), 4);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}
