//! Which game is last, current and next, given the schedule and the clock.

use chrono::{DateTime, Utc};

use super::schedule_time::{first_game_lookback, game_lead, game_window};
use crate::db::models::{GameId, LiveGameSnapshot, ScheduledGame};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamePointers {
    pub last: Option<ScheduledGame>,
    /// Set only while a game is in progress or about to start
    pub current: Option<ScheduledGame>,
    pub next: Option<ScheduledGame>,
}

/// Result of one derivation pass: new pointers plus the game to fetch live.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub pointers: GamePointers,
    pub fetch_id: GameId,
}

/// Scan `games` in schedule order and place `now` relative to them.
///
/// A game whose window (`start - 15m ..= start + 6h`) contains `now` becomes
/// current, unless the cached live snapshot already shows that game over.
/// Otherwise the first game starting after the previous one's start becomes
/// next. With no match the season is over and the final game is last.
///
/// Returns `None` for an empty schedule.
pub fn derive_pointers(
    games: &[ScheduledGame],
    live: Option<&LiveGameSnapshot>,
    now: DateTime<Utc>,
) -> Option<Derivation> {
    for (i, game) in games.iter().enumerate() {
        let start = game.start_time_utc;
        let prior = i.checked_sub(1).map(|p| &games[p]);
        let prior_end = prior.map_or(now - first_game_lookback(), |g| g.start_time_utc);

        if start - game_lead() <= now && now <= start + game_window() {
            let next = games.get(i + 1).cloned();
            let over = live.is_some_and(|l| l.id == game.id && l.game_state.is_terminal());
            let pointers = if over {
                GamePointers {
                    last: Some(game.clone()),
                    current: None,
                    next,
                }
            } else {
                GamePointers {
                    last: prior.cloned(),
                    current: Some(game.clone()),
                    next,
                }
            };
            return Some(Derivation {
                pointers,
                fetch_id: game.id,
            });
        }

        if prior_end <= now && now <= start {
            let last = prior.unwrap_or(game);
            return Some(Derivation {
                fetch_id: last.id,
                pointers: GamePointers {
                    last: Some(last.clone()),
                    current: None,
                    next: Some(game.clone()),
                },
            });
        }
    }

    let last = games.last()?;
    Some(Derivation {
        fetch_id: last.id,
        pointers: GamePointers {
            last: Some(last.clone()),
            current: None,
            next: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::GameState;
    use crate::testing::{at, game, live_game};
    use chrono::Duration;

    fn season(now: DateTime<Utc>) -> Vec<ScheduledGame> {
        vec![
            game(1, now - Duration::days(3)),
            game(2, now - Duration::hours(1)),
            game(3, now + Duration::days(2)),
            game(4, now + Duration::days(4)),
        ]
    }

    fn ids(p: &GamePointers) -> (Option<GameId>, Option<GameId>, Option<GameId>) {
        (
            p.last.as_ref().map(|g| g.id),
            p.current.as_ref().map(|g| g.id),
            p.next.as_ref().map(|g| g.id),
        )
    }

    #[test]
    fn game_in_window_becomes_current() {
        let now = at("2024-11-02T23:00:00Z");
        let d = derive_pointers(&season(now), None, now).unwrap();
        assert_eq!(ids(&d.pointers), (Some(1), Some(2), Some(3)));
        assert_eq!(d.fetch_id, 2);
    }

    #[test]
    fn window_opens_fifteen_minutes_early_and_closes_after_six_hours() {
        let start = at("2024-11-02T23:00:00Z");
        let games = vec![game(10, start), game(11, start + Duration::days(2))];

        for now in [
            start - Duration::minutes(15),
            start,
            start + Duration::hours(6),
        ] {
            let d = derive_pointers(&games, None, now).unwrap();
            assert_eq!(ids(&d.pointers).1, Some(10), "at {}", now);
        }

        let early = derive_pointers(&games, None, start - Duration::minutes(16)).unwrap();
        assert_eq!(ids(&early.pointers), (Some(10), None, Some(10)));

        let late = derive_pointers(&games, None, start + Duration::hours(6) + Duration::seconds(1))
            .unwrap();
        assert_eq!(ids(&late.pointers), (Some(10), None, Some(11)));
        assert_eq!(late.fetch_id, 10);
    }

    #[test]
    fn finished_game_in_window_moves_to_last() {
        let now = at("2024-11-02T23:00:00Z");
        let ended = live_game(2, GameState::Final, now);
        let d = derive_pointers(&season(now), Some(&ended), now).unwrap();
        assert_eq!(ids(&d.pointers), (Some(2), None, Some(3)));
        assert_eq!(d.fetch_id, 2);
    }

    #[test]
    fn finished_snapshot_of_another_game_is_ignored() {
        let now = at("2024-11-02T23:00:00Z");
        let old = live_game(1, GameState::Off, now - Duration::days(3));
        let d = derive_pointers(&season(now), Some(&old), now).unwrap();
        assert_eq!(ids(&d.pointers).1, Some(2));
    }

    #[test]
    fn between_games_points_at_next_and_fetches_last() {
        let now = at("2024-11-02T23:00:00Z");
        let games = vec![
            game(1, now - Duration::days(2)),
            game(2, now + Duration::days(1)),
        ];
        let d = derive_pointers(&games, None, now).unwrap();
        assert_eq!(ids(&d.pointers), (Some(1), None, Some(2)));
        assert_eq!(d.fetch_id, 1);
    }

    #[test]
    fn before_first_game_uses_it_as_last_too() {
        let now = at("2024-09-30T12:00:00Z");
        let games = vec![game(1, now + Duration::hours(20))];
        let d = derive_pointers(&games, None, now).unwrap();
        assert_eq!(ids(&d.pointers), (Some(1), None, Some(1)));
        assert_eq!(d.fetch_id, 1);
    }

    #[test]
    fn after_final_game_only_last_is_set() {
        let now = at("2025-04-20T12:00:00Z");
        let games = vec![
            game(1, now - Duration::days(4)),
            game(2, now - Duration::days(2)),
        ];
        let d = derive_pointers(&games, None, now).unwrap();
        assert_eq!(ids(&d.pointers), (Some(2), None, None));
        assert_eq!(d.fetch_id, 2);
    }

    #[test]
    fn empty_schedule_yields_nothing() {
        assert_eq!(derive_pointers(&[], None, at("2024-11-02T23:00:00Z")), None);
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = at("2024-11-02T23:00:00Z");
        let games = season(now);
        for offset in [-100, -50, -2, 0, 1, 7, 30, 60, 100] {
            let t = now + Duration::hours(offset);
            assert_eq!(
                derive_pointers(&games, None, t),
                derive_pointers(&games, None, t),
            );
        }
    }

    #[test]
    fn current_is_always_inside_its_window() {
        let now = at("2024-11-02T23:00:00Z");
        let games = season(now);
        for minutes in (-6000..8000).step_by(7) {
            let t = now + Duration::minutes(minutes);
            let Some(d) = derive_pointers(&games, None, t) else {
                panic!("non-empty schedule must derive");
            };
            if let Some(current) = &d.pointers.current {
                let start = current.start_time_utc;
                assert!(start - game_lead() <= t && t <= start + game_window());
                assert_eq!(d.fetch_id, current.id);
            } else {
                assert!(d.pointers.last.is_some());
            }
        }
    }
}
