use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sweeper::hours;
use crate::transform::OutputFormat;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_TEMP_DIR: &str = "./temp";
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;
const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
const DEFAULT_BATCH_SIZE_LIMIT: usize = 10;
const DEFAULT_RETENTION_HOURS: u64 = 24;
const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 60;
const DEFAULT_ALLOWED_MIMES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/avif"];

/// Service settings read from `IMGPRESS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Prefix of every download link handed out
    pub base_url: String,
    pub max_file_size: usize,
    pub temp_dir: PathBuf,
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,
    pub batch_size_limit: usize,
    pub retention_hours: u64,
    pub cleanup_interval: Duration,
    pub allowed_formats: Vec<OutputFormat>,
    pub allowed_mimes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_url: format!("http://localhost:{DEFAULT_PORT}"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            rate_limit_window: Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            retention_hours: DEFAULT_RETENTION_HOURS,
            cleanup_interval: minutes(DEFAULT_CLEANUP_INTERVAL_MINUTES),
            allowed_formats: OutputFormat::ALL.to_vec(),
            allowed_mimes: DEFAULT_ALLOWED_MIMES.iter().map(|m| (*m).to_owned()).collect(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    /// Missing or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let port = parse_or(&lookup, "IMGPRESS_PORT", defaults.port);
        let base_url = lookup("IMGPRESS_BASE_URL")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let allowed_formats = lookup("IMGPRESS_ALLOWED_FORMATS")
            .map(|s| {
                s.split(',')
                    .filter_map(|f| OutputFormat::from_str(f.trim()).ok())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.allowed_formats);

        let allowed_mimes = lookup("IMGPRESS_ALLOWED_MIMES")
            .map(|s| {
                s.split(',')
                    .map(|m| m.trim().to_ascii_lowercase())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.allowed_mimes);

        Self {
            port,
            base_url: base_url.trim_end_matches('/').to_owned(),
            max_file_size: parse_positive(&lookup, "IMGPRESS_MAX_FILE_SIZE_BYTES", defaults.max_file_size),
            temp_dir: lookup("IMGPRESS_TEMP_DIR")
                .filter(|s| !s.is_empty())
                .map_or(defaults.temp_dir, PathBuf::from),
            rate_limit_window: Duration::from_millis(parse_positive(
                &lookup,
                "IMGPRESS_RATE_LIMIT_WINDOW_MS",
                DEFAULT_RATE_LIMIT_WINDOW_MS,
            )),
            rate_limit_max: parse_positive(&lookup, "IMGPRESS_RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit_max),
            batch_size_limit: parse_positive(&lookup, "IMGPRESS_BATCH_SIZE_LIMIT", defaults.batch_size_limit),
            retention_hours: parse_positive(&lookup, "IMGPRESS_FILE_RETENTION_HOURS", defaults.retention_hours),
            cleanup_interval: minutes(parse_positive(
                &lookup,
                "IMGPRESS_CLEANUP_INTERVAL_MINUTES",
                DEFAULT_CLEANUP_INTERVAL_MINUTES,
            )),
            allowed_formats,
            allowed_mimes,
        }
    }

    /// Upper bound for a whole multipart request body.
    #[must_use]
    pub fn request_body_limit(&self) -> usize {
        self.max_file_size
            .saturating_mul(self.batch_size_limit.max(1))
            .saturating_add(1024 * 1024)
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        hours(self.retention_hours)
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// zero behaves like an unset value
fn parse_positive<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq + Copy,
{
    let value = parse_or(lookup, key, default);
    if value == T::default() {
        default
    } else {
        value
    }
}
