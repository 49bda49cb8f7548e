//! Builders and a scripted data source shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::db::models::*;
use crate::messages::Request;
use crate::nhl::{DataSource, FetchError};

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC 3339 timestamp")
}

pub fn game(id: GameId, start: DateTime<Utc>) -> ScheduledGame {
    ScheduledGame {
        id,
        start_time_utc: start,
        game_type: 2,
        game_state: GameState::Fut,
        away_team: "PHI".into(),
        home_team: "NYR".into(),
        away_score: None,
        home_score: None,
        game_outcome: None,
    }
}

pub fn schedule(request_time: DateTime<Utc>, games: Vec<ScheduledGame>) -> ScheduleSnapshot {
    ScheduleSnapshot {
        request_time,
        team: "PHI".into(),
        games,
    }
}

pub fn standings(request_time: DateTime<Utc>) -> StandingsSnapshot {
    StandingsSnapshot {
        request_time,
        divisions: DIVISIONS.iter().map(|d| StandingsGroup::new(d)).collect(),
        conferences: CONFERENCES.iter().map(|c| StandingsGroup::new(c)).collect(),
    }
}

pub fn roster(request_time: DateTime<Utc>) -> RosterSnapshot {
    RosterSnapshot {
        request_time,
        team: "PHI".into(),
        skaters: vec![],
        goalies: vec![],
    }
}

pub fn live_game(id: GameId, state: GameState, request_time: DateTime<Utc>) -> LiveGameSnapshot {
    LiveGameSnapshot {
        request_time,
        id,
        away_team: "PHI".into(),
        home_team: "NYR".into(),
        away_score: Some(0),
        home_score: Some(0),
        away_sog: Some(0),
        home_sog: Some(0),
        game_state: state,
        period: Some(1),
        clock: "20:00".into(),
        in_intermission: false,
        away_strength: None,
        home_strength: None,
        away_situation: vec![],
        home_situation: vec![],
        situation_clock: String::new(),
        plays: vec![],
    }
}

/// Settable wall clock shared between a worker under test and its fakes.
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock(Arc::new(Mutex::new(start)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.0.lock().unwrap() = t;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

/// Answers every call with a canned snapshot, except requests listed as failing.
#[derive(Default)]
pub struct FakeSource {
    calls: Mutex<Vec<(Request, Option<DateTime<Utc>>)>>,
    failing: Mutex<HashSet<Request>>,
    /// Clock to read when a call starts, and how far each call moves it
    latency: Option<(ManualClock, Duration)>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call is stamped from `clock` and then takes `per_call` on it.
    pub fn slow(clock: ManualClock, per_call: Duration) -> Self {
        FakeSource {
            latency: Some((clock, per_call)),
            ..Self::default()
        }
    }

    pub fn fail(&self, request: Request) {
        self.failing.lock().unwrap().insert(request);
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().iter().map(|(r, _)| *r).collect()
    }

    /// Clock readings at the start of each call; empty without a clock.
    pub fn call_times(&self) -> Vec<DateTime<Utc>> {
        self.calls.lock().unwrap().iter().filter_map(|(_, t)| *t).collect()
    }

    fn called(&self, request: Request) -> Result<(), FetchError> {
        let started = self.latency.as_ref().map(|(clock, per_call)| {
            let t = clock.now();
            clock.advance(*per_call);
            t
        });
        self.calls.lock().unwrap().push((request, started));
        if self.failing.lock().unwrap().contains(&request) {
            return Err(FetchError::InvalidResponse("empty body".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_standings(&self) -> Result<StandingsSnapshot, FetchError> {
        self.called(Request::Standings)?;
        Ok(standings(Utc::now()))
    }

    async fn fetch_schedule(&self) -> Result<ScheduleSnapshot, FetchError> {
        self.called(Request::Schedule)?;
        Ok(schedule(Utc::now(), vec![]))
    }

    async fn fetch_roster(&self) -> Result<RosterSnapshot, FetchError> {
        self.called(Request::Roster)?;
        Ok(roster(Utc::now()))
    }

    async fn fetch_live_game(&self, id: GameId) -> Result<LiveGameSnapshot, FetchError> {
        self.called(Request::LiveGame(id))?;
        Ok(live_game(id, GameState::Live, Utc::now()))
    }
}
