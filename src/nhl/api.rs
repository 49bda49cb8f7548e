use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::error::FetchError;
use super::provider::DataSource;
use crate::db::models::{
    GameId, GameState, GoalPlay, Goalie, LiveGameSnapshot, RosterSnapshot, ScheduleSnapshot,
    ScheduledGame, Skater, StandingsGroup, StandingsSnapshot, TeamStanding, CONFERENCES,
    DIVISIONS, DIVISION_CAPACITY,
};

/// Client for the public NHL web API (`api-web.nhle.com`).
#[derive(Clone)]
pub struct NhlApi {
    http: Client,
    base_url: Url,
    team: String,
    /// Only mock servers want a key
    api_key: Option<String>,
}

impl NhlApi {
    pub fn new(
        base_url: &str,
        team: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        // Url::join replaces the last path segment unless the base ends in '/'
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid NHL API base URL")?;

        Ok(NhlApi {
            http,
            base_url,
            team: team.to_string(),
            api_key,
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);

        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        let resp = req.send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FetchError::from_status(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DataSource for NhlApi {
    fn name(&self) -> &str {
        "NHL web API"
    }

    async fn fetch_standings(&self) -> Result<StandingsSnapshot, FetchError> {
        let request_time = Utc::now();
        let raw = self.get_json("standings/now").await?;
        parse_standings(&raw, request_time)
    }

    async fn fetch_schedule(&self) -> Result<ScheduleSnapshot, FetchError> {
        let request_time = Utc::now();
        let raw = self
            .get_json(&format!("club-schedule-season/{}/now", self.team))
            .await?;
        parse_schedule(&raw, &self.team, request_time)
    }

    async fn fetch_roster(&self) -> Result<RosterSnapshot, FetchError> {
        let request_time = Utc::now();
        let raw = self
            .get_json(&format!("club-stats/{}/now", self.team))
            .await?;
        parse_roster(&raw, &self.team, request_time)
    }

    async fn fetch_live_game(&self, id: GameId) -> Result<LiveGameSnapshot, FetchError> {
        let request_time = Utc::now();
        let raw = self
            .get_json(&format!("gamecenter/{}/play-by-play", id))
            .await?;
        parse_live_game(&raw, request_time)
    }
}

// ── Field helpers ────────────────────────────────────────────────────────────

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

fn i64_at(v: &Value, pointer: &str) -> Option<i64> {
    v.pointer(pointer).and_then(Value::as_i64)
}

fn i32_at(v: &Value, pointer: &str) -> Option<i32> {
    i64_at(v, pointer).and_then(|n| i32::try_from(n).ok())
}

fn f64_at(v: &Value, pointer: &str) -> Option<f64> {
    v.pointer(pointer).and_then(Value::as_f64)
}

fn array_at<'a>(v: &'a Value, key: &str) -> Result<&'a Vec<Value>, FetchError> {
    v.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::InvalidResponse(format!("missing '{}' array", key)))
}

fn string_list_at(v: &Value, pointer: &str) -> Vec<String> {
    v.pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ── Standings ────────────────────────────────────────────────────────────────

/// Split the league table into division leaders and conference wild cards.
///
/// Each division keeps its first three teams in API order; everyone else goes
/// to their conference, sorted by points and then point percentage.
pub fn parse_standings(
    raw: &Value,
    request_time: DateTime<Utc>,
) -> Result<StandingsSnapshot, FetchError> {
    let mut divisions: Vec<StandingsGroup> =
        DIVISIONS.iter().map(|d| StandingsGroup::new(d)).collect();
    let mut conferences: Vec<StandingsGroup> =
        CONFERENCES.iter().map(|c| StandingsGroup::new(c)).collect();

    for team in array_at(raw, "standings")? {
        let Some(abbrev) = str_at(team, "/teamAbbrev/default") else {
            warn!("Standings entry without team abbreviation skipped");
            continue;
        };
        let division = str_at(team, "/divisionName").unwrap_or_default();
        let conference = str_at(team, "/conferenceName").unwrap_or_default();

        let standing = TeamStanding {
            abbrev: abbrev.to_string(),
            games_played: i32_at(team, "/gamesPlayed").unwrap_or(0),
            wins: i32_at(team, "/wins").unwrap_or(0),
            losses: i32_at(team, "/losses").unwrap_or(0),
            ot_losses: i32_at(team, "/otLosses").unwrap_or(0),
            points: i32_at(team, "/points").unwrap_or(0),
            point_pctg: f64_at(team, "/pointPctg").unwrap_or(0.0),
        };

        if let Some(group) = divisions.iter_mut().find(|g| g.name == division) {
            if group.teams.len() < DIVISION_CAPACITY {
                group.teams.push(standing);
                continue;
            }
        } else {
            warn!("Unknown division '{}' for {}", division, abbrev);
        }

        match conferences.iter_mut().find(|g| g.name == conference) {
            Some(group) => group.teams.push(standing),
            None => warn!("Unknown conference '{}' for {}, skipped", conference, abbrev),
        }
    }

    for group in &mut conferences {
        group.teams.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.point_pctg.total_cmp(&a.point_pctg))
        });
    }

    Ok(StandingsSnapshot {
        request_time,
        divisions,
        conferences,
    })
}

// ── Schedule ─────────────────────────────────────────────────────────────────

pub fn parse_schedule(
    raw: &Value,
    team: &str,
    request_time: DateTime<Utc>,
) -> Result<ScheduleSnapshot, FetchError> {
    let games = array_at(raw, "games")?
        .iter()
        .filter_map(|gm| {
            let id = i64_at(gm, "/id")?;
            let start_time_utc = match str_at(gm, "/startTimeUTC")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            {
                Some(t) => t.with_timezone(&Utc),
                None => {
                    warn!("Game {} has no usable start time, skipped", id);
                    return None;
                }
            };

            // Score and outcome only exist once a game has been played; keep
            // all three or none.
            let result = match (
                i32_at(gm, "/awayTeam/score"),
                i32_at(gm, "/homeTeam/score"),
                str_at(gm, "/gameOutcome/lastPeriodType"),
            ) {
                (Some(away), Some(home), Some(outcome)) => {
                    (Some(away), Some(home), Some(outcome.to_string()))
                }
                _ => (None, None, None),
            };

            Some(ScheduledGame {
                id,
                start_time_utc,
                game_type: i32_at(gm, "/gameType").unwrap_or(0),
                game_state: GameState::from_api(str_at(gm, "/gameState").unwrap_or_default()),
                away_team: str_at(gm, "/awayTeam/abbrev").unwrap_or_default().to_string(),
                home_team: str_at(gm, "/homeTeam/abbrev").unwrap_or_default().to_string(),
                away_score: result.0,
                home_score: result.1,
                game_outcome: result.2,
            })
        })
        .collect();

    Ok(ScheduleSnapshot {
        request_time,
        team: team.to_string(),
        games,
    })
}

// ── Roster ───────────────────────────────────────────────────────────────────

fn parse_skater(v: &Value) -> Option<Skater> {
    Some(Skater {
        player_id: i64_at(v, "/playerId")?,
        headshot: str_at(v, "/headshot").unwrap_or_default().to_string(),
        first_name: str_at(v, "/firstName/default")?.to_string(),
        last_name: str_at(v, "/lastName/default")?.to_string(),
        position_code: str_at(v, "/positionCode").unwrap_or_default().to_string(),
        games_played: i32_at(v, "/gamesPlayed").unwrap_or(0),
        goals: i32_at(v, "/goals").unwrap_or(0),
        assists: i32_at(v, "/assists").unwrap_or(0),
        points: i32_at(v, "/points").unwrap_or(0),
    })
}

fn parse_goalie(v: &Value) -> Option<Goalie> {
    Some(Goalie {
        player_id: i64_at(v, "/playerId")?,
        headshot: str_at(v, "/headshot").unwrap_or_default().to_string(),
        first_name: str_at(v, "/firstName/default")?.to_string(),
        last_name: str_at(v, "/lastName/default")?.to_string(),
        games_played: i32_at(v, "/gamesPlayed").unwrap_or(0),
        games_started: i32_at(v, "/gamesStarted").unwrap_or(0),
        wins: i32_at(v, "/wins").unwrap_or(0),
        losses: i32_at(v, "/losses").unwrap_or(0),
        ties: i32_at(v, "/ties"),
        overtime_losses: i32_at(v, "/overtimeLosses").unwrap_or(0),
        save_percentage: f64_at(v, "/savePercentage").unwrap_or(0.0),
        goals: i32_at(v, "/goals").unwrap_or(0),
        assists: i32_at(v, "/assists").unwrap_or(0),
        points: i32_at(v, "/points").unwrap_or(0),
    })
}

pub fn parse_roster(
    raw: &Value,
    team: &str,
    request_time: DateTime<Utc>,
) -> Result<RosterSnapshot, FetchError> {
    let skaters = array_at(raw, "skaters")?
        .iter()
        .filter_map(|s| {
            let skater = parse_skater(s);
            if skater.is_none() {
                warn!("Skater entry missing id or name, skipped");
            }
            skater
        })
        .collect();
    let goalies = array_at(raw, "goalies")?
        .iter()
        .filter_map(|g| {
            let goalie = parse_goalie(g);
            if goalie.is_none() {
                warn!("Goalie entry missing id or name, skipped");
            }
            goalie
        })
        .collect();

    Ok(RosterSnapshot {
        request_time,
        team: team.to_string(),
        skaters,
        goalies,
    })
}

// ── Live game ────────────────────────────────────────────────────────────────

/// Look up "First Last" for a player in the payload's roster spots.
fn scorer_name(roster_spots: &[Value], player_id: i64) -> String {
    roster_spots
        .iter()
        .find(|p| i64_at(p, "/playerId") == Some(player_id))
        .map(|p| {
            format!(
                "{} {}",
                str_at(p, "/firstName/default").unwrap_or_default(),
                str_at(p, "/lastName/default").unwrap_or_default()
            )
        })
        .unwrap_or_default()
}

fn parse_goal(play: &Value, roster_spots: &[Value]) -> Option<GoalPlay> {
    let scoring_player_id = i64_at(play, "/details/scoringPlayerId")?;
    Some(GoalPlay {
        period: i32_at(play, "/periodDescriptor/number")?,
        time_in_period: str_at(play, "/timeInPeriod")?.to_string(),
        scoring_player_id,
        scoring_player_name: scorer_name(roster_spots, scoring_player_id),
    })
}

pub fn parse_live_game(
    raw: &Value,
    request_time: DateTime<Utc>,
) -> Result<LiveGameSnapshot, FetchError> {
    let id = i64_at(raw, "/id")
        .ok_or_else(|| FetchError::InvalidResponse("play-by-play without game id".into()))?;

    let roster_spots: &[Value] = raw
        .get("rosterSpots")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut plays = Vec::new();
    for play in raw
        .get("plays")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        if str_at(play, "/typeDescKey") != Some("goal") {
            continue;
        }
        match parse_goal(play, roster_spots) {
            Some(goal) => plays.push(goal),
            None => error!("Goal event in game {} missing expected fields, skipped", id),
        }
    }

    Ok(LiveGameSnapshot {
        request_time,
        id,
        away_team: str_at(raw, "/awayTeam/abbrev").unwrap_or_default().to_string(),
        home_team: str_at(raw, "/homeTeam/abbrev").unwrap_or_default().to_string(),
        away_score: i32_at(raw, "/awayTeam/score"),
        home_score: i32_at(raw, "/homeTeam/score"),
        away_sog: i32_at(raw, "/awayTeam/sog"),
        home_sog: i32_at(raw, "/homeTeam/sog"),
        game_state: GameState::from_api(str_at(raw, "/gameState").unwrap_or_default()),
        period: i32_at(raw, "/periodDescriptor/number"),
        clock: str_at(raw, "/clock/timeRemaining").unwrap_or_default().to_string(),
        in_intermission: raw
            .pointer("/clock/inIntermission")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        away_strength: i32_at(raw, "/situation/awayTeam/strength"),
        home_strength: i32_at(raw, "/situation/homeTeam/strength"),
        away_situation: string_list_at(raw, "/situation/awayTeam/situationDescriptions"),
        home_situation: string_list_at(raw, "/situation/homeTeam/situationDescriptions"),
        situation_clock: str_at(raw, "/situation/timeRemaining")
            .unwrap_or_default()
            .to_string(),
        plays,
    })
}
