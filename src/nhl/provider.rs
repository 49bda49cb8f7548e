use async_trait::async_trait;

use super::error::FetchError;
use crate::db::models::{
    GameId, LiveGameSnapshot, RosterSnapshot, ScheduleSnapshot, StandingsSnapshot,
};

/// Trait every hockey data source must implement.
///
/// Implementations only fetch and normalise; retry and rate limiting belong
/// to the fetcher.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// League-wide standings as of now.
    async fn fetch_standings(&self) -> Result<StandingsSnapshot, FetchError>;

    /// The tracked team's full-season schedule.
    async fn fetch_schedule(&self) -> Result<ScheduleSnapshot, FetchError>;

    /// The tracked team's season stats roster.
    async fn fetch_roster(&self) -> Result<RosterSnapshot, FetchError>;

    /// Play-by-play for one game.
    async fn fetch_live_game(&self, id: GameId) -> Result<LiveGameSnapshot, FetchError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
