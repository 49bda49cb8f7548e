pub mod pointers;
pub mod schedule_time;

pub use pointers::{derive_pointers, Derivation, GamePointers};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::Config;
use crate::db::models::{
    GameId, GameState, LiveGameSnapshot, RosterSnapshot, ScheduleSnapshot, StandingsSnapshot,
};
use crate::db::Database;
use crate::messages::{Request, RequestSender, Response};
use schedule_time::{
    first_refresh_time, game_lead, live_poll_interval, live_poll_safety_net, no_game_horizon,
    STANDINGS_AFTER_GAME_DELAY_MINUTES,
};

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub refresh_period_hours: u32,
    pub stale_after: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        CoordinatorSettings {
            refresh_period_hours: config.refresh_period_hours,
            stale_after: Duration::hours(i64::from(config.stale_after_hours)),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            refresh_period_hours: 6,
            stale_after: Duration::hours(6),
        }
    }
}

/// A refresh issued on a fixed period, staggered by a per-kind offset.
#[derive(Debug, Clone, Copy)]
struct PeriodicRefresh {
    request: Request,
    next_at: DateTime<Utc>,
}

/// Owns every cached snapshot and decides what the fetcher should get next.
///
/// All time-dependent methods take `now` explicitly; only [`run`](Self::run)
/// reads the clock.
pub struct Coordinator {
    db: Database,
    requests: RequestSender,
    period: Duration,
    standings: Option<StandingsSnapshot>,
    schedule: Option<ScheduleSnapshot>,
    roster: Option<RosterSnapshot>,
    live_game: Option<LiveGameSnapshot>,
    pointers: GamePointers,
    /// Game whose live snapshots drive pointers and polling
    tracked_game: Option<GameId>,
    /// When the live game needs attention again; never unset
    game_update_time: DateTime<Utc>,
    refreshes: [PeriodicRefresh; 3],
}

impl Coordinator {
    /// Load cached snapshots and queue refreshes for anything missing or stale.
    ///
    /// `now` is taken in the local timezone because periodic refreshes are
    /// aligned to local midnight.
    pub fn new<Tz: TimeZone>(
        db: Database,
        requests: RequestSender,
        settings: CoordinatorSettings,
        now: DateTime<Tz>,
    ) -> Result<Self> {
        let period_hours = settings.refresh_period_hours;
        let refreshes = [
            (Request::Standings, Duration::zero()),
            (Request::Schedule, Duration::minutes(2)),
            (Request::Roster, Duration::minutes(4)),
        ]
        .map(|(request, offset)| PeriodicRefresh {
            request,
            next_at: first_refresh_time(&now, period_hours, offset),
        });
        let now = now.with_timezone(&Utc);

        let mut coordinator = Coordinator {
            db,
            requests,
            period: Duration::hours(i64::from(period_hours)),
            standings: None,
            schedule: None,
            roster: None,
            live_game: None,
            pointers: GamePointers::default(),
            tracked_game: None,
            game_update_time: now + no_game_horizon(),
            refreshes,
        };
        coordinator.load(settings.stale_after, now)?;
        Ok(coordinator)
    }

    fn load(&mut self, stale_after: Duration, now: DateTime<Utc>) -> Result<()> {
        let is_stale = |request_time: DateTime<Utc>| now - request_time > stale_after;

        self.live_game = self.db.load_live_game().context("loading live game")?;

        self.standings = self.db.load_standings().context("loading standings")?;
        match &self.standings {
            Some(s) if !is_stale(s.request_time) => {}
            Some(s) => {
                info!("Cached standings from {} are stale, refreshing", s.request_time);
                self.requests.submit_or_log(Request::Standings, 0);
            }
            None => {
                debug!("No cached standings, requesting");
                self.requests.submit_or_log(Request::Standings, 0);
            }
        }

        self.schedule = self.db.load_schedule().context("loading schedule")?;
        match self.schedule.as_ref().map(|s| s.request_time) {
            Some(request_time) => {
                self.set_game_ids(now);
                if is_stale(request_time) {
                    info!("Cached schedule from {} is stale, refreshing", request_time);
                    self.requests.submit_or_log(Request::Schedule, 0);
                }
            }
            None => {
                debug!("No cached schedule, requesting");
                self.requests.submit_or_log(Request::Schedule, 0);
            }
        }

        self.roster = self.db.load_roster().context("loading roster")?;
        match &self.roster {
            Some(r) if !is_stale(r.request_time) => {}
            Some(r) => {
                info!("Cached roster from {} is stale, refreshing", r.request_time);
                self.requests.submit_or_log(Request::Roster, 0);
            }
            None => {
                debug!("No cached roster, requesting");
                self.requests.submit_or_log(Request::Roster, 0);
            }
        }

        Ok(())
    }

    /// Run until the shutdown flag is raised. A persistence failure ends the
    /// loop with an error.
    pub async fn run(
        mut self,
        mut responses: mpsc::Receiver<Response>,
        shutdown: watch::Receiver<bool>,
        tick_interval: std::time::Duration,
    ) -> Result<()> {
        info!("Coordinator started (interval={:?})", tick_interval);
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if *shutdown.borrow() {
                break;
            }
            let response = match responses.try_recv() {
                Ok(response) => Some(response),
                Err(mpsc::error::TryRecvError::Empty) => None,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    anyhow::bail!("response queue closed: fetcher is gone");
                }
            };
            self.tick(response, Utc::now())?;
        }

        info!("Coordinator stopped");
        Ok(())
    }

    /// One pass: apply at most one response, issue due periodic refreshes,
    /// then look after the live game.
    pub fn tick(&mut self, response: Option<Response>, now: DateTime<Utc>) -> Result<()> {
        if let Some(response) = response {
            self.apply(response, now)?;
        }

        for refresh in &mut self.refreshes {
            if refresh.next_at < now {
                info!("Periodic {} refresh due", refresh.request);
                self.requests.submit_or_log(refresh.request, 0);
                refresh.next_at += self.period;
            }
        }

        if self.game_update_time < now {
            self.game_update_time = now + live_poll_safety_net();
            match self.pointers.current.as_ref().map(|g| g.id) {
                Some(id) => self.requests.submit_or_log(Request::LiveGame(id), 0),
                None => self.set_game_ids(now),
            }
        }

        Ok(())
    }

    /// Persist a fetched snapshot, then update state that depends on it.
    pub fn apply(&mut self, response: Response, now: DateTime<Utc>) -> Result<()> {
        debug!("Applying {}", response.operation());
        match response {
            Response::SaveStandings(standings) => {
                self.db.save_standings(&standings).context("saving standings")?;
                info!("Saved standings from {}", standings.request_time);
                self.standings = Some(standings);
            }
            Response::SaveSchedule(schedule) => {
                self.db.save_schedule(&schedule).context("saving schedule")?;
                info!(
                    "Saved {} schedule: {} games",
                    schedule.team,
                    schedule.games.len()
                );
                self.schedule = Some(schedule);
                self.set_game_ids(now);
            }
            Response::SaveRoster(roster) => {
                self.db.save_roster(&roster).context("saving roster")?;
                info!(
                    "Saved {} roster: {} skaters, {} goalies",
                    roster.team,
                    roster.skaters.len(),
                    roster.goalies.len()
                );
                self.roster = Some(roster);
            }
            Response::UpdateLiveGame(game) => self.on_live_game_update(game, now)?,
        }
        Ok(())
    }

    fn on_live_game_update(&mut self, game: LiveGameSnapshot, now: DateTime<Utc>) -> Result<()> {
        if let Some(tracked) = self.tracked_game {
            if game.id != tracked {
                info!(
                    "Ignoring live snapshot for game {} ({}), following game {}",
                    game.id, game.game_state, tracked
                );
                return Ok(());
            }
        }

        info!(
            "{} {} @ {} {} | {} {} {} | {} ({})",
            game.away_team,
            score(game.away_score),
            game.home_team,
            score(game.home_score),
            if game.in_intermission { "Intermission" } else { "Period" },
            game.period.map_or_else(|| "-".to_string(), |p| p.to_string()),
            game.clock,
            game.id,
            game.game_state
        );
        self.db.save_live_game(&game).context("saving live game")?;

        let prior_state = self
            .live_game
            .as_ref()
            .map_or(GameState::Off, |g| g.game_state);
        let state = game.game_state;
        self.live_game = Some(game);

        if state.is_terminal() {
            if let Some(current) = self.pointers.current.take() {
                self.pointers.last = Some(current);
            }
            self.game_update_time = match &self.pointers.next {
                Some(next) => next.start_time_utc - game_lead(),
                None => now + no_game_horizon(),
            };
            if !prior_state.is_terminal() {
                info!("Game went {}, refreshing standings shortly", state);
                self.requests
                    .submit_or_log(Request::Standings, STANDINGS_AFTER_GAME_DELAY_MINUTES);
            }
        } else {
            self.game_update_time = now + live_poll_interval();
        }
        Ok(())
    }

    /// Re-derive the game pointers from the cached schedule and queue a live
    /// fetch for the game they point at.
    fn set_game_ids(&mut self, now: DateTime<Utc>) {
        let Some(schedule) = &self.schedule else {
            debug!("No schedule to derive games from, requesting");
            self.requests.submit_or_log(Request::Schedule, 0);
            return;
        };

        match derive_pointers(&schedule.games, self.live_game.as_ref(), now) {
            Some(Derivation { pointers, fetch_id }) => {
                debug!(
                    "Games: last={:?} current={:?} next={:?}",
                    pointers.last.as_ref().map(|g| g.id),
                    pointers.current.as_ref().map(|g| g.id),
                    pointers.next.as_ref().map(|g| g.id)
                );
                self.pointers = pointers;
                self.tracked_game = Some(fetch_id);
                self.requests.submit_or_log(Request::LiveGame(fetch_id), 0);
            }
            None => {
                info!("Schedule for {} has no games", schedule.team);
                self.pointers = GamePointers::default();
                self.tracked_game = None;
                self.game_update_time = now + no_game_horizon();
            }
        }
    }
}

fn score(goals: Option<i32>) -> String {
    goals.map_or_else(|| "-".to_string(), |g| g.to_string())
}
