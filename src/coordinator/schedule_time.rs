use chrono::{DateTime, Duration, NaiveTime, Offset, TimeZone, Timelike, Utc};

/// A game is treated as live from this long before puck drop
pub fn game_lead() -> Duration {
    Duration::minutes(15)
}

/// ...until this long after puck drop
pub fn game_window() -> Duration {
    Duration::hours(6)
}

/// Poll cadence while a game is in progress
pub fn live_poll_interval() -> Duration {
    Duration::seconds(30)
}

/// Re-check deadline after issuing a live fetch, in case no answer ever comes
pub fn live_poll_safety_net() -> Duration {
    Duration::minutes(5)
}

/// Stand-in for "no upcoming game"
pub fn no_game_horizon() -> Duration {
    Duration::days(500)
}

/// Lookback used as the previous game's start for the first game of a schedule
pub fn first_game_lookback() -> Duration {
    Duration::days(1)
}

/// Standings are re-fetched this many minutes after a game ends
pub const STANDINGS_AFTER_GAME_DELAY_MINUTES: u32 = 15;

/// First time a periodic refresh is due: the local wall-clock time at
/// today's midnight, plus the current local hour rounded up to a multiple of
/// `period_hours`, plus `offset`.
///
/// Rounding up an exact multiple leaves it unchanged, so starting at 12:30
/// with a six hour period yields 12:00 and the refresh fires on the first tick.
/// A wall-clock time repeated by a DST change resolves to its first
/// occurrence; one skipped by a DST change keeps the current UTC offset.
pub fn first_refresh_time<Tz: TimeZone>(
    now: &DateTime<Tz>,
    period_hours: u32,
    offset: Duration,
) -> DateTime<Utc> {
    let period = period_hours.max(1);
    let start_hour = now.hour().div_ceil(period) * period;
    let local = now.date_naive().and_time(NaiveTime::MIN)
        + Duration::hours(i64::from(start_hour))
        + offset;

    match now.timezone().from_local_datetime(&local).earliest() {
        Some(t) => t.with_timezone(&Utc),
        None => {
            let utc_offset = Duration::seconds(i64::from(now.offset().fix().local_minus_utc()));
            Utc.from_utc_datetime(&(local - utc_offset))
        }
    }
}
