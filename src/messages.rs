//! Typed messages exchanged between the coordinator and the fetcher.
//!
//! ```text
//!  Coordinator ──RequestMessage──▶ Fetcher ──▶ NHL API
//!       ▲                             │
//!       └──────────Response───────────┘
//! ```

use chrono::Duration;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::db::models::{
    GameId, LiveGameSnapshot, RosterSnapshot, ScheduleSnapshot, StandingsSnapshot,
};

/// Capacity of each direction's queue
pub const QUEUE_CAPACITY: usize = 1024;

/// One call the fetcher knows how to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    Standings,
    Schedule,
    Roster,
    LiveGame(GameId),
}

impl Request {
    /// Operation name, as used by the string-named submission path and logs
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Standings => "standings",
            Request::Schedule => "schedule",
            Request::Roster => "roster",
            Request::LiveGame(_) => "game",
        }
    }

    /// Delay before a failed call is attempted again
    pub fn retry_delay(&self) -> Duration {
        match self {
            Request::LiveGame(_) => Duration::seconds(45),
            _ => Duration::minutes(5),
        }
    }

    /// Resolve a request from an operation name and its string arguments.
    pub fn from_operation(name: &str, args: &[String]) -> Result<Self, QueueError> {
        let no_args = |request: Request| {
            if args.is_empty() {
                Ok(request)
            } else {
                Err(QueueError::InvalidArguments {
                    operation: name.to_string(),
                    reason: format!("expected no arguments, got {}", args.len()),
                })
            }
        };

        match name {
            "standings" => no_args(Request::Standings),
            "schedule" => no_args(Request::Schedule),
            "roster" => no_args(Request::Roster),
            "game" => match args {
                [id] => id
                    .parse::<GameId>()
                    .map(Request::LiveGame)
                    .map_err(|e| QueueError::InvalidArguments {
                        operation: name.to_string(),
                        reason: format!("bad game id '{}': {}", id, e),
                    }),
                _ => Err(QueueError::InvalidArguments {
                    operation: name.to_string(),
                    reason: format!("expected one game id, got {} arguments", args.len()),
                }),
            },
            other => Err(QueueError::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::LiveGame(id) => write!(f, "game({})", id),
            other => f.write_str(other.operation()),
        }
    }
}

/// Coordinator → Fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub request: Request,
    /// 0 = as soon as the rate budget allows
    pub delay_minutes: u32,
}

/// Fetcher → Coordinator; one per successful fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    SaveStandings(StandingsSnapshot),
    SaveSchedule(ScheduleSnapshot),
    SaveRoster(RosterSnapshot),
    UpdateLiveGame(LiveGameSnapshot),
}

impl Response {
    pub fn operation(&self) -> &'static str {
        match self {
            Response::SaveStandings(_) => "save_standings",
            Response::SaveSchedule(_) => "save_schedule",
            Response::SaveRoster(_) => "save_roster",
            Response::UpdateLiveGame(_) => "update_live_game",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Request queue full")]
    Full,

    #[error("Request queue closed")]
    Closed,
}

/// Sending half of the request queue.
#[derive(Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<RequestMessage>,
}

impl RequestSender {
    pub fn new(tx: mpsc::Sender<RequestMessage>) -> Self {
        RequestSender { tx }
    }

    /// Queue a request. Never blocks; a full queue is reported, not awaited.
    pub fn submit(&self, request: Request, delay_minutes: u32) -> Result<(), QueueError> {
        self.tx
            .try_send(RequestMessage {
                request,
                delay_minutes,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })
    }

    /// Like [`submit`](Self::submit), but failures are logged instead of returned.
    pub fn submit_or_log(&self, request: Request, delay_minutes: u32) {
        if let Err(e) = self.submit(request, delay_minutes) {
            error!("Request {} DROPPED: {}", request, e);
        }
    }

    /// String-named submission. Unknown operations are logged and dropped.
    pub fn submit_named(
        &self,
        operation: &str,
        args: &[String],
        delay_minutes: u32,
    ) -> Result<Request, QueueError> {
        let request = Request::from_operation(operation, args).inspect_err(|e| {
            warn!("Dropping request '{}': {}", operation, e);
        })?;
        self.submit(request, delay_minutes)?;
        Ok(request)
    }
}

/// Build the request queue: a sender for the coordinator and a receiver for the fetcher.
pub fn request_queue() -> (RequestSender, mpsc::Receiver<RequestMessage>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (RequestSender::new(tx), rx)
}
