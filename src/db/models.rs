use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// NHL game identifier, e.g. `2024020345`
pub type GameId = i64;

/// Division names in the order the display lays them out
pub const DIVISIONS: [&str; 4] = ["Central", "Pacific", "Atlantic", "Metropolitan"];

/// Conference names; every team that overflows its division lands here
pub const CONFERENCES: [&str; 2] = ["Western", "Eastern"];

/// Maximum number of teams listed under a division heading
pub const DIVISION_CAPACITY: usize = 3;

/// Upstream `gameState` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameState {
    Fut,
    Pre,
    Live,
    Crit,
    Off,
    Final,
    /// Missing or unrecognised state; treated as still in play
    Unknown,
}

impl GameState {
    pub fn from_api(s: &str) -> Self {
        match s {
            "FUT" => GameState::Fut,
            "PRE" => GameState::Pre,
            "LIVE" => GameState::Live,
            "CRIT" => GameState::Crit,
            "OFF" => GameState::Off,
            "FINAL" => GameState::Final,
            _ => GameState::Unknown,
        }
    }

    /// `OFF` and `FINAL` mean the game is over and will not change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, GameState::Off | GameState::Final)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameState::Fut => "FUT",
            GameState::Pre => "PRE",
            GameState::Live => "LIVE",
            GameState::Crit => "CRIT",
            GameState::Off => "OFF",
            GameState::Final => "FINAL",
            GameState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

// ── Standings ─────────────────────────────────────────────────────────────────

/// One team's line in the standings table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
    /// Team abbreviation, e.g. "PHI"
    pub abbrev: String,
    pub games_played: i32,
    pub wins: i32,
    pub losses: i32,
    pub ot_losses: i32,
    pub points: i32,
    pub point_pctg: f64,
}

/// A named division or conference bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsGroup {
    pub name: String,
    pub teams: Vec<TeamStanding>,
}

impl StandingsGroup {
    pub fn new(name: &str) -> Self {
        StandingsGroup {
            name: name.to_string(),
            teams: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsSnapshot {
    pub request_time: DateTime<Utc>,
    /// Top three teams of each division, in the order the API ranked them
    pub divisions: Vec<StandingsGroup>,
    /// Wild-card teams, sorted by points then point percentage
    pub conferences: Vec<StandingsGroup>,
}

impl StandingsSnapshot {
    #[cfg(test)]
    pub fn group(&self, name: &str) -> Option<&StandingsGroup> {
        self.divisions
            .iter()
            .chain(self.conferences.iter())
            .find(|g| g.name == name)
    }
}

// ── Schedule ──────────────────────────────────────────────────────────────────

/// A single game from the team's season schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledGame {
    pub id: GameId,
    #[serde(rename = "startTimeUTC")]
    pub start_time_utc: DateTime<Utc>,
    /// 1 = preseason, 2 = regular season, 3 = playoffs
    pub game_type: i32,
    pub game_state: GameState,
    pub away_team: String,
    pub home_team: String,
    pub away_score: Option<i32>,
    pub home_score: Option<i32>,
    /// "REG" | "OT" | "SO"
    pub game_outcome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSnapshot {
    pub request_time: DateTime<Utc>,
    pub team: String,
    pub games: Vec<ScheduledGame>,
}

// ── Roster ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skater {
    pub player_id: i64,
    pub headshot: String,
    pub first_name: String,
    pub last_name: String,
    pub position_code: String,
    pub games_played: i32,
    pub goals: i32,
    pub assists: i32,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goalie {
    pub player_id: i64,
    pub headshot: String,
    pub first_name: String,
    pub last_name: String,
    pub games_played: i32,
    pub games_started: i32,
    pub wins: i32,
    pub losses: i32,
    /// Only reported for seasons that still had ties
    pub ties: Option<i32>,
    pub overtime_losses: i32,
    pub save_percentage: f64,
    pub goals: i32,
    pub assists: i32,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    pub request_time: DateTime<Utc>,
    pub team: String,
    pub skaters: Vec<Skater>,
    pub goalies: Vec<Goalie>,
}

// ── Live game ─────────────────────────────────────────────────────────────────

/// A goal event from the play-by-play feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPlay {
    pub period: i32,
    pub time_in_period: String,
    pub scoring_player_id: i64,
    /// "First Last", or empty when the scorer is not in the roster spots
    pub scoring_player_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGameSnapshot {
    pub request_time: DateTime<Utc>,
    pub id: GameId,
    pub away_team: String,
    pub home_team: String,
    pub away_score: Option<i32>,
    pub home_score: Option<i32>,
    pub away_sog: Option<i32>,
    pub home_sog: Option<i32>,
    pub game_state: GameState,
    pub period: Option<i32>,
    pub clock: String,
    pub in_intermission: bool,
    pub away_strength: Option<i32>,
    pub home_strength: Option<i32>,
    pub away_situation: Vec<String>,
    pub home_situation: Vec<String>,
    pub situation_clock: String,
    pub plays: Vec<GoalPlay>,
}
