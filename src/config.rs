use std::env;
use std::path::Path;
use std::time::Duration;

// Default configuration constants
pub const DEFAULT_API_BASE_URL: &str = "";
pub const DEFAULT_API_TOKEN: &str = "";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_WORKER_BUDGET: usize = 6;
pub const DEFAULT_OPTIMISTIC_EXPIRY_TICKS: u64 = 2;
pub const DEFAULT_REBOOT_EXPIRY_TICKS: u64 = 1;
pub const DEFAULT_EVICTION_MISSES: u32 = 3;
pub const DEFAULT_STALE_TTL_SECS: u64 = 90;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub fn load_env_file(env_file: Option<&str>) {
    if let Some(path) = env_file {
        dotenvy::from_path(Path::new(path)).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

pub fn get_api_base_url() -> String {
    sanitize_base_url(&env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()))
}

pub fn get_api_token() -> String {
    env::var("API_TOKEN").unwrap_or_else(|_| DEFAULT_API_TOKEN.to_string())
}

pub fn sanitize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Engine configuration. The policy knobs (expiry horizons, eviction
/// threshold, staleness TTL) are configuration rather than hardwired
/// constants; their correct values depend on observed remote API latency.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: String,
    /// Interval between automatic refresh ticks.
    pub refresh_interval: Duration,
    /// Per-region fetch deadline; a hung region cannot starve others.
    pub fetch_timeout: Duration,
    /// Maximum concurrent region fetches per scan.
    pub worker_budget: usize,
    /// How many ticks a start/stop optimistic overlay survives without
    /// corroboration before it is discarded.
    pub optimistic_expiry_ticks: u64,
    /// Shorter horizon for the transient "rebooting" display hint.
    pub reboot_expiry_ticks: u64,
    /// Consecutive absent fetches before a cached instance is evicted.
    pub eviction_misses: u32,
    /// Cached region data older than this is reported stale.
    pub stale_ttl: Duration,
    /// Whether the scheduler starts ticking immediately.
    pub auto_refresh: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: DEFAULT_API_TOKEN.to_string(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            worker_budget: DEFAULT_WORKER_BUDGET,
            optimistic_expiry_ticks: DEFAULT_OPTIMISTIC_EXPIRY_TICKS,
            reboot_expiry_ticks: DEFAULT_REBOOT_EXPIRY_TICKS,
            eviction_misses: DEFAULT_EVICTION_MISSES,
            stale_ttl: Duration::from_secs(DEFAULT_STALE_TTL_SECS),
            auto_refresh: true,
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            api_base_url: get_api_base_url(),
            api_token: get_api_token(),
            refresh_interval: Duration::from_secs(env_u64(
                "FLEETWATCH_REFRESH_INTERVAL_SECS",
                DEFAULT_REFRESH_INTERVAL_SECS,
            )),
            fetch_timeout: Duration::from_secs(env_u64(
                "FLEETWATCH_FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            worker_budget: env_usize("FLEETWATCH_WORKER_BUDGET", DEFAULT_WORKER_BUDGET).max(1),
            optimistic_expiry_ticks: env_u64(
                "FLEETWATCH_OPTIMISTIC_EXPIRY_TICKS",
                DEFAULT_OPTIMISTIC_EXPIRY_TICKS,
            ),
            reboot_expiry_ticks: env_u64(
                "FLEETWATCH_REBOOT_EXPIRY_TICKS",
                DEFAULT_REBOOT_EXPIRY_TICKS,
            ),
            eviction_misses: env_u32("FLEETWATCH_EVICTION_MISSES", DEFAULT_EVICTION_MISSES).max(1),
            stale_ttl: Duration::from_secs(env_u64(
                "FLEETWATCH_STALE_TTL_SECS",
                DEFAULT_STALE_TTL_SECS,
            )),
            auto_refresh: true,
        }
    }
}
