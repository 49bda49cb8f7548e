//! The fetcher worker: the only component that talks to the network.
//!
//! Every tick it takes at most one message off the request queue, then
//! releases any deferred requests whose time has come. A shared sliding
//! window caps dispatch attempts across all endpoints; a request that finds
//! the budget spent is pushed back a full window instead of being dropped.
//! Failed calls reschedule themselves and never reach the coordinator.
//!
//! The clock is read again for every dispatch, so time spent inside earlier
//! calls of the same tick counts against the window.

pub mod deferred;
pub mod rate_limit;

pub use deferred::DeferredRequests;
pub use rate_limit::{RateWindow, MAX_REQUESTS_PER_MINUTE};

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use crate::messages::{Request, RequestMessage, Response};
use crate::nhl::DataSource;

/// Pause after each executed call
pub const DISPATCH_DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(100);

/// Wall-clock source for rate accounting and deferral times.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Fetcher {
    source: Arc<dyn DataSource>,
    requests: mpsc::Receiver<RequestMessage>,
    responses: mpsc::Sender<Response>,
    limiter: RateWindow,
    deferred: DeferredRequests,
    debounce: std::time::Duration,
    clock: Clock,
}

impl Fetcher {
    pub fn new(
        source: Arc<dyn DataSource>,
        requests: mpsc::Receiver<RequestMessage>,
        responses: mpsc::Sender<Response>,
        max_requests_per_minute: usize,
    ) -> Self {
        Fetcher {
            source,
            requests,
            responses,
            limiter: RateWindow::new(max_requests_per_minute),
            deferred: DeferredRequests::new(),
            debounce: DISPATCH_DEBOUNCE,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_debounce(mut self, debounce: std::time::Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn deferred(&self) -> &DeferredRequests {
        &self.deferred
    }

    /// Dispatch attempts counted in the trailing window as of `now`.
    #[cfg(test)]
    pub fn requests_in_window(&mut self, now: DateTime<Utc>) -> usize {
        self.limiter.count(now)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Run until every request sender has been dropped.
    pub async fn run(mut self, tick_interval: std::time::Duration) {
        info!(
            "Fetcher started (source: {}, interval={:?})",
            self.source.name(),
            tick_interval
        );
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if !self.tick().await {
                break;
            }
        }
        if self.deferred.is_empty() {
            info!("Fetcher stopped: request queue closed");
        } else {
            info!(
                "Fetcher stopped: request queue closed ({} deferred requests discarded)",
                self.deferred.len()
            );
        }
    }

    /// One pass of the dispatch loop. Returns `false` once the request queue
    /// is closed.
    pub async fn tick(&mut self) -> bool {
        let open = match self.requests.try_recv() {
            Ok(msg) => {
                self.accept(msg).await;
                true
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Disconnected) => false,
        };

        let now = self.now();
        let ready = self.deferred.take_ready(now);
        for request in ready {
            self.dispatch(request).await;
        }

        open
    }

    async fn accept(&mut self, msg: RequestMessage) {
        if msg.delay_minutes > 0 {
            let ready_at = self.now() + Duration::minutes(i64::from(msg.delay_minutes));
            debug!(
                "{} delayed {} minutes to {}",
                msg.request, msg.delay_minutes, ready_at
            );
            self.deferred.insert(msg.request, ready_at);
        } else {
            self.dispatch(msg.request).await;
        }
    }

    async fn dispatch(&mut self, request: Request) {
        let now = self.now();
        if !self.limiter.has_capacity(now) {
            let ready_at = now + self.limiter.window();
            if let Some(oldest) = self.limiter.oldest() {
                debug!(
                    "Request budget spent (oldest: {} at {}), delaying {} to {}",
                    oldest.operation, oldest.issued_at, request, ready_at
                );
            }
            self.deferred.insert(request, ready_at);
            return;
        }

        self.limiter.record(request.operation(), now);
        self.execute(request).await;

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }
    }

    async fn execute(&mut self, request: Request) {
        debug!("Fetching {} from {}", request, self.source.name());

        let result = match request {
            Request::Standings => self
                .source
                .fetch_standings()
                .await
                .map(Response::SaveStandings),
            Request::Schedule => self
                .source
                .fetch_schedule()
                .await
                .map(Response::SaveSchedule),
            Request::Roster => self.source.fetch_roster().await.map(Response::SaveRoster),
            Request::LiveGame(id) => self
                .source
                .fetch_live_game(id)
                .await
                .map(Response::UpdateLiveGame),
        };

        match result {
            Ok(response) => {
                if let Err(e) = self.responses.send(response).await {
                    error!("Response queue closed, {} result DROPPED: {}", request, e);
                }
            }
            Err(e) => {
                let retry_at = self.now() + request.retry_delay();
                warn!("{} request failed ({}), retrying at {}", request, e, retry_at);
                self.deferred.insert(request, retry_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{request_queue, RequestSender, QUEUE_CAPACITY};
    use crate::testing::{at, FakeSource, ManualClock};

    struct Harness {
        fetcher: Fetcher,
        source: Arc<FakeSource>,
        clock: ManualClock,
        sender: RequestSender,
        responses: mpsc::Receiver<Response>,
    }

    impl Harness {
        async fn tick_at(&mut self, t: DateTime<Utc>) -> bool {
            self.clock.set(t);
            self.fetcher.tick().await
        }
    }

    fn harness_with(source: FakeSource, clock: ManualClock) -> Harness {
        let source = Arc::new(source);
        let (sender, requests) = request_queue();
        let (resp_tx, responses) = mpsc::channel(QUEUE_CAPACITY);
        let reader = clock.clone();
        let fetcher = Fetcher::new(
            source.clone(),
            requests,
            resp_tx,
            MAX_REQUESTS_PER_MINUTE,
        )
        .with_debounce(std::time::Duration::ZERO)
        .with_clock(Arc::new(move || reader.now()));
        Harness {
            fetcher,
            source,
            clock,
            sender,
            responses,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeSource::new(), ManualClock::new(t0()))
    }

    fn t0() -> DateTime<Utc> {
        at("2024-11-02T18:00:00Z")
    }

    fn assert_within_budget(times: &[DateTime<Utc>]) {
        for (i, &end) in times.iter().enumerate() {
            let in_window = times[..=i]
                .iter()
                .filter(|&&t| t > end - Duration::seconds(60))
                .count();
            assert!(
                in_window <= MAX_REQUESTS_PER_MINUTE,
                "{} dispatches in the minute ending {}",
                in_window,
                end
            );
        }
    }

    #[tokio::test]
    async fn eleventh_burst_request_is_deferred_a_full_window() {
        let mut h = harness();
        for id in 1..=11 {
            h.sender.submit(Request::LiveGame(id), 0).unwrap();
        }

        let mut last_tick = t0();
        for i in 0..11 {
            last_tick = t0() + Duration::milliseconds(50 * i);
            assert!(h.tick_at(last_tick).await);
        }

        let expected: Vec<_> = (1..=10).map(Request::LiveGame).collect();
        assert_eq!(h.source.calls(), expected);
        assert_eq!(h.fetcher.deferred().len(), 1);
        assert_eq!(
            h.fetcher.deferred().ready_at(&Request::LiveGame(11)),
            Some(last_tick + Duration::seconds(60))
        );

        let mut delivered = 0;
        while h.responses.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 10);
    }

    #[tokio::test]
    async fn deferred_request_runs_once_window_clears() {
        let mut h = harness();
        for id in 1..=11 {
            h.sender.submit(Request::LiveGame(id), 0).unwrap();
        }
        for i in 0..11 {
            h.tick_at(t0() + Duration::milliseconds(50 * i)).await;
        }

        // Not ready yet
        h.tick_at(t0() + Duration::seconds(30)).await;
        assert_eq!(h.source.calls().len(), 10);

        h.tick_at(t0() + Duration::seconds(61)).await;
        assert_eq!(h.source.calls().len(), 11);
        assert_eq!(h.source.calls()[10], Request::LiveGame(11));
        assert!(h.fetcher.deferred().is_empty());
    }

    #[tokio::test]
    async fn delayed_submission_skips_queue_and_budget() {
        let mut h = harness();
        h.sender.submit(Request::Standings, 15).unwrap();

        h.tick_at(t0()).await;
        assert!(h.source.calls().is_empty());
        assert_eq!(h.fetcher.requests_in_window(t0()), 0);
        assert_eq!(
            h.fetcher.deferred().ready_at(&Request::Standings),
            Some(t0() + Duration::minutes(15))
        );

        h.tick_at(t0() + Duration::minutes(14)).await;
        assert!(h.source.calls().is_empty());

        h.tick_at(t0() + Duration::minutes(15) + Duration::seconds(1)).await;
        assert_eq!(h.source.calls(), vec![Request::Standings]);
        assert!(matches!(
            h.responses.try_recv(),
            Ok(Response::SaveStandings(_))
        ));
    }

    #[tokio::test]
    async fn failed_fetch_retries_itself_without_a_response() {
        let mut h = harness();
        h.source.fail(Request::Schedule);
        h.source.fail(Request::LiveGame(42));
        h.sender.submit(Request::Schedule, 0).unwrap();
        h.sender.submit(Request::LiveGame(42), 0).unwrap();

        h.tick_at(t0()).await;
        h.tick_at(t0()).await;

        assert_eq!(
            h.source.calls(),
            vec![Request::Schedule, Request::LiveGame(42)]
        );
        assert!(h.responses.try_recv().is_err());
        assert_eq!(
            h.fetcher.deferred().ready_at(&Request::Schedule),
            Some(t0() + Duration::minutes(5))
        );
        assert_eq!(
            h.fetcher.deferred().ready_at(&Request::LiveGame(42)),
            Some(t0() + Duration::seconds(45))
        );
        // failed attempts still spend budget
        assert_eq!(h.fetcher.requests_in_window(t0()), 2);
    }

    #[tokio::test]
    async fn retry_time_counts_from_when_the_call_returned() {
        let clock = ManualClock::new(t0());
        let mut h = harness_with(
            FakeSource::slow(clock.clone(), Duration::seconds(20)),
            clock,
        );
        h.source.fail(Request::LiveGame(7));
        h.sender.submit(Request::LiveGame(7), 0).unwrap();

        h.tick_at(t0()).await;

        assert_eq!(h.source.call_times(), vec![t0()]);
        assert_eq!(
            h.fetcher.deferred().ready_at(&Request::LiveGame(7)),
            Some(t0() + Duration::seconds(20 + 45))
        );
    }

    #[tokio::test]
    async fn each_success_yields_matching_response() {
        let mut h = harness();
        for request in [
            Request::Standings,
            Request::Schedule,
            Request::Roster,
            Request::LiveGame(9),
        ] {
            h.sender.submit(request, 0).unwrap();
        }
        for _ in 0..4 {
            h.tick_at(t0()).await;
        }

        let ops: Vec<_> = std::iter::from_fn(|| h.responses.try_recv().ok())
            .map(|r| r.operation())
            .collect();
        assert_eq!(
            ops,
            ["save_standings", "save_schedule", "save_roster", "update_live_game"]
        );
    }

    #[tokio::test]
    async fn sustained_load_never_exceeds_window_budget() {
        let mut h = harness();
        let mut dispatched_at: Vec<DateTime<Utc>> = Vec::new();

        // 300 submissions spread over ten minutes, with every fifth failing
        for id in 0..300i64 {
            if id % 5 == 0 {
                h.source.fail(Request::LiveGame(id));
            }
        }
        for step in 0..6000i64 {
            let now = t0() + Duration::milliseconds(100 * step);
            if step % 20 == 0 && step / 20 < 300 {
                h.sender.submit(Request::LiveGame(step / 20), 0).unwrap();
            }
            let before = h.source.calls().len();
            h.tick_at(now).await;
            let after = h.source.calls().len();
            dispatched_at.extend(std::iter::repeat(now).take(after - before));
        }

        assert!(!dispatched_at.is_empty());
        assert_within_budget(&dispatched_at);
    }

    #[tokio::test]
    async fn slow_calls_in_one_tick_stay_within_budget() {
        // Every call takes 6.5s, so one tick's worth of ready requests
        // stretches over more than a minute of wall time.
        let clock = ManualClock::new(t0());
        let mut h = harness_with(
            FakeSource::slow(clock.clone(), Duration::milliseconds(6500)),
            clock,
        );
        for id in 1..=20 {
            h.sender.submit(Request::LiveGame(id), 1).unwrap();
        }
        for _ in 0..20 {
            h.fetcher.tick().await;
        }
        assert!(h.source.calls().is_empty());
        assert_eq!(h.fetcher.deferred().len(), 20);

        h.clock.set(t0() + Duration::seconds(61));
        for _ in 0..200 {
            if h.source.calls().len() == 20 {
                break;
            }
            h.fetcher.tick().await;
            h.clock.advance(Duration::seconds(1));
        }

        let times = h.source.call_times();
        assert_eq!(times.len(), 20);
        assert_within_budget(&times);
    }

    #[tokio::test]
    async fn closed_queue_stops_the_loop() {
        let mut h = harness();
        drop(h.sender);
        h.clock.set(t0());
        assert!(!h.fetcher.tick().await);
    }
}
