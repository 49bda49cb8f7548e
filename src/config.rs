use clap::Parser;
use url::Url;

use crate::fetcher::MAX_REQUESTS_PER_MINUTE;

/// Hockey kiosk backend: polls the NHL API and caches snapshots for the display
#[derive(Parser, Debug, Clone)]
#[command(name = "rinkside", version, about)]
pub struct Config {
    /// Team abbreviation whose schedule and roster are tracked
    #[arg(long, env = "TEAM", default_value = "PHI")]
    pub team: String,

    /// NHL web API base URL (point at a mock server for local development)
    #[arg(long, env = "NHL_API_URL", default_value = "https://api-web.nhle.com/v1")]
    pub nhl_api_url: String,

    /// Optional API key sent as `X-Api-Key` (mock servers only)
    #[arg(long, env = "NHL_API_KEY")]
    pub nhl_api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "rinkside.db")]
    pub database_path: String,

    /// Snapshot endpoint listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// Hours between periodic standings/schedule/roster refreshes
    #[arg(long, env = "REFRESH_PERIOD_HOURS", default_value = "6")]
    pub refresh_period_hours: u32,

    /// Cached snapshots older than this are refreshed at startup
    #[arg(long, env = "STALE_AFTER_HOURS", default_value = "6")]
    pub stale_after_hours: u32,

    /// Shared request budget across all endpoints, per trailing minute
    #[arg(long, env = "MAX_REQUESTS_PER_MINUTE", default_value_t = MAX_REQUESTS_PER_MINUTE)]
    pub max_requests_per_minute: usize,

    /// Worker tick interval in milliseconds
    #[arg(long, env = "TICK_INTERVAL_MS", default_value = "100")]
    pub tick_interval_ms: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.team.len() != 3 || !self.team.chars().all(|c| c.is_ascii_uppercase()) {
            anyhow::bail!("team must be a three-letter uppercase abbreviation, got '{}'", self.team);
        }
        if Url::parse(&self.nhl_api_url).is_err() {
            anyhow::bail!("nhl_api_url is not a valid URL: {}", self.nhl_api_url);
        }
        if !(1..=24).contains(&self.refresh_period_hours) || 24 % self.refresh_period_hours != 0 {
            anyhow::bail!(
                "refresh_period_hours must divide a day evenly (1, 2, 3, 4, 6, 8, 12 or 24), got {}",
                self.refresh_period_hours
            );
        }
        if self.stale_after_hours == 0 {
            anyhow::bail!("stale_after_hours must be positive");
        }
        if self.max_requests_per_minute == 0 {
            anyhow::bail!("max_requests_per_minute must be positive");
        }
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be positive");
        }
        Ok(())
    }
}
