use anyhow::{anyhow, Context, Result};
use chrono::FixedOffset;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::net::RetryPolicy;
use crate::render::Anchor;
use crate::session::ModeAnchors;
use crate::types::{Mode, WireFormat};
use crate::util_text::default_source_offset;

/// Tailview - live chat log viewer
///
/// Follows a conversation log over HTTP polling or a WebSocket subscription.
/// Configuration priority: CLI args > Environment variables > Config file > Defaults
#[derive(Parser, Debug, Default)]
#[command(name = "tailview")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live chat log viewer", long_about = None)]
pub struct CliArgs {
    /// Sync mode: pull (HTTP polling) or push (Socket.IO)
    #[arg(short, long, env = "TAILVIEW_MODE", value_parser = clap::value_parser!(Mode))]
    pub mode: Option<Mode>,

    /// Comma-separated source ids (log file names); the first one is opened
    #[arg(short, long, env = "TAILVIEW_SOURCES")]
    pub sources: Option<String>,

    /// Base URL of the polling API
    #[arg(long, env = "TAILVIEW_PULL_URL")]
    pub pull_url: Option<String>,

    /// Socket.IO endpoint of the push channel
    #[arg(long, env = "TAILVIEW_PUSH_URL")]
    pub push_url: Option<String>,

    /// Polling interval in milliseconds (100-60000)
    #[arg(long, env = "TAILVIEW_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Request / connect timeout in milliseconds (500-60000)
    #[arg(long, env = "TAILVIEW_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Records requested on first load (1-10000)
    #[arg(long, env = "TAILVIEW_INITIAL_LIMIT")]
    pub initial_limit: Option<usize>,

    /// Records requested per poll after the first load (1-100000)
    #[arg(long, env = "TAILVIEW_INCREMENTAL_LIMIT")]
    pub incremental_limit: Option<usize>,

    /// UTC offset of naive source timestamps, e.g. +09:00
    #[arg(long, env = "TAILVIEW_SOURCE_UTC_OFFSET", allow_hyphen_values = true)]
    pub source_utc_offset: Option<String>,

    /// First retry delay in milliseconds (10-60000)
    #[arg(long, env = "TAILVIEW_RETRY_BASE_MS")]
    pub retry_base_ms: Option<u64>,

    /// Retry delay ceiling in milliseconds (10-600000)
    #[arg(long, env = "TAILVIEW_RETRY_CAP_MS")]
    pub retry_cap_ms: Option<u64>,

    /// Retries before giving up (0-100)
    #[arg(long, env = "TAILVIEW_RETRY_MAX_ATTEMPTS")]
    pub retry_max_attempts: Option<u32>,

    /// Random jitter added to each retry delay, in milliseconds (0-10000)
    #[arg(long, env = "TAILVIEW_RETRY_JITTER_MS")]
    pub retry_jitter_ms: Option<u64>,

    /// Content bytes hashed into a record fingerprint; 0 hashes everything
    #[arg(long, env = "TAILVIEW_FINGERPRINT_PREFIX_BYTES")]
    pub fingerprint_prefix_bytes: Option<usize>,

    /// Rows per record (1-20)
    #[arg(long, env = "TAILVIEW_ITEM_HEIGHT")]
    pub item_height: Option<u32>,

    /// Extra records mounted above and below the viewport (0-200)
    #[arg(long, env = "TAILVIEW_BUFFER_COUNT")]
    pub buffer_count: Option<usize>,

    /// Minimum spacing between applied scroll updates in milliseconds (0-1000)
    #[arg(long, env = "TAILVIEW_SCROLL_THROTTLE_MS")]
    pub scroll_throttle_ms: Option<u64>,

    /// Target UI rendering FPS (1-120)
    #[arg(long, env = "TAILVIEW_RENDER_FPS")]
    pub render_fps: Option<u32>,

    /// Initial anchor in pull mode: head or tail
    #[arg(long, env = "TAILVIEW_PULL_ANCHOR", value_parser = clap::value_parser!(Anchor))]
    pub pull_anchor: Option<Anchor>,

    /// Initial anchor in push mode: head or tail
    #[arg(long, env = "TAILVIEW_PUSH_ANCHOR", value_parser = clap::value_parser!(Anchor))]
    pub push_anchor: Option<Anchor>,

    /// Log file (the terminal belongs to the UI)
    #[arg(long, env = "TAILVIEW_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Optional TOML config file
    #[arg(short, long, env = "TAILVIEW_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub endpoints: EndpointsSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointsSection {
    pub pull_url: Option<String>,
    pub push_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSection {
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub initial_limit: Option<usize>,
    pub incremental_limit: Option<usize>,
    pub source_utc_offset: Option<String>,
    pub fingerprint_prefix_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySection {
    pub base_ms: Option<u64>,
    pub cap_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderSection {
    pub item_height: Option<u32>,
    pub buffer_count: Option<usize>,
    pub scroll_throttle_ms: Option<u64>,
    pub fps: Option<u32>,
    pub pull_anchor: Option<String>,
    pub push_anchor: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub sources: Vec<String>,
    pub pull_url: String,
    pub push_url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub initial_limit: usize,
    pub incremental_limit: usize,
    pub source_utc_offset: FixedOffset,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_jitter_ms: u64,
    pub fingerprint_prefix_bytes: usize,
    pub item_height: u32,
    pub buffer_count: usize,
    pub scroll_throttle_ms: u64,
    pub render_fps: u32,
    pub pull_anchor: Anchor,
    pub push_anchor: Anchor,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Push,
            sources: Vec::new(),
            pull_url: "http://localhost:5000/api".to_string(),
            push_url: "ws://localhost:5000/socket.io/".to_string(),
            poll_interval_ms: 1000,
            request_timeout_ms: 5000,
            initial_limit: 50,
            incremental_limit: 1000,
            source_utc_offset: default_source_offset(),
            retry_base_ms: 1000,
            retry_cap_ms: 30_000,
            retry_max_attempts: 5,
            retry_jitter_ms: 0,
            fingerprint_prefix_bytes: crate::fingerprint::DEFAULT_PREFIX_BYTES,
            item_height: 3,
            buffer_count: 5,
            scroll_throttle_ms: 16,
            render_fps: 30,
            pull_anchor: Anchor::Head,
            push_anchor: Anchor::Tail,
            log_file: PathBuf::from("tailview.log"),
        }
    }
}

/// Validate that a value is within a given range (inclusive)
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format (basic check)
fn validate_url(url: &str, name: &str, schemes: &[&str]) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    if schemes.iter().any(|s| url.starts_with(s)) {
        Ok(())
    } else {
        Err(anyhow!("{name} must start with {}", schemes.join(" or ")))
    }
}

/// `+09:00`, `-0530`, `+9`, `Z` or `UTC`.
fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow!("invalid offset"));
    }
    let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(anyhow!("offset '{s}' must start with + or -"));
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| anyhow!("bad hours in offset '{s}'"))?;
    let minutes: i32 = minutes.parse().map_err(|_| anyhow!("bad minutes in offset '{s}'"))?;
    if hours > 14 || minutes > 59 {
        return Err(anyhow!("offset '{s}' is out of range"));
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("offset '{s}' is out of range"))
}

fn parse_source_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_file_value<T: std::str::FromStr>(raw: Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    raw.map(|s| s.parse::<T>().map_err(|e| anyhow!("{name}: {e}")))
        .transpose()
}

/// Load configuration from CLI args, environment variables and the optional config file
pub fn load() -> Result<Config> {
    let args = CliArgs::parse();
    let file = match args.config.as_deref() {
        Some(path) => Some(load_file(path)?),
        None => None,
    };
    resolve(args, file)
}

/// Load configuration from a TOML file
pub fn load_file(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
}

/// Merge CLI/env values over file values over defaults, then validate.
pub fn resolve(args: CliArgs, file: Option<FileConfig>) -> Result<Config> {
    let file = file.unwrap_or_default();
    let d = Config::default();

    let mode = match args.mode {
        Some(m) => m,
        None => parse_file_value(file.mode, "mode")?.unwrap_or(d.mode),
    };

    let sources = args
        .sources
        .as_deref()
        .map(parse_source_list)
        .or(file.sources)
        .unwrap_or_default();
    if sources.is_empty() {
        return Err(anyhow!(
            "At least one source is required (--sources or TAILVIEW_SOURCES)"
        ));
    }

    let pull_url = args
        .pull_url
        .or(file.endpoints.pull_url)
        .unwrap_or(d.pull_url);
    validate_url(&pull_url, "TAILVIEW_PULL_URL", &["http://", "https://"])?;

    let push_url = args
        .push_url
        .or(file.endpoints.push_url)
        .unwrap_or(d.push_url);
    validate_url(&push_url, "TAILVIEW_PUSH_URL", &["ws://", "wss://"])?;

    let poll_interval_ms = args
        .poll_interval_ms
        .or(file.sync.poll_interval_ms)
        .unwrap_or(d.poll_interval_ms);
    let poll_interval_ms =
        validate_in_range(poll_interval_ms, 100, 60_000, "TAILVIEW_POLL_INTERVAL_MS")?;

    let request_timeout_ms = args
        .request_timeout_ms
        .or(file.sync.request_timeout_ms)
        .unwrap_or(d.request_timeout_ms);
    let request_timeout_ms =
        validate_in_range(request_timeout_ms, 500, 60_000, "TAILVIEW_REQUEST_TIMEOUT_MS")?;

    let initial_limit = args
        .initial_limit
        .or(file.sync.initial_limit)
        .unwrap_or(d.initial_limit);
    let initial_limit = validate_in_range(initial_limit, 1, 10_000, "TAILVIEW_INITIAL_LIMIT")?;

    let incremental_limit = args
        .incremental_limit
        .or(file.sync.incremental_limit)
        .unwrap_or(d.incremental_limit);
    let incremental_limit =
        validate_in_range(incremental_limit, 1, 100_000, "TAILVIEW_INCREMENTAL_LIMIT")?;

    let source_utc_offset = match args.source_utc_offset.or(file.sync.source_utc_offset) {
        Some(raw) => parse_utc_offset(&raw).context("TAILVIEW_SOURCE_UTC_OFFSET")?,
        None => d.source_utc_offset,
    };

    let fingerprint_prefix_bytes = args
        .fingerprint_prefix_bytes
        .or(file.sync.fingerprint_prefix_bytes)
        .unwrap_or(d.fingerprint_prefix_bytes);

    let retry_base_ms = args
        .retry_base_ms
        .or(file.retry.base_ms)
        .unwrap_or(d.retry_base_ms);
    let retry_base_ms = validate_in_range(retry_base_ms, 10, 60_000, "TAILVIEW_RETRY_BASE_MS")?;

    let retry_cap_ms = args
        .retry_cap_ms
        .or(file.retry.cap_ms)
        .unwrap_or(d.retry_cap_ms);
    let retry_cap_ms = validate_in_range(retry_cap_ms, 10, 600_000, "TAILVIEW_RETRY_CAP_MS")?;
    if retry_cap_ms < retry_base_ms {
        return Err(anyhow!(
            "TAILVIEW_RETRY_CAP_MS ({retry_cap_ms}) must be >= TAILVIEW_RETRY_BASE_MS ({retry_base_ms})"
        ));
    }

    let retry_max_attempts = args
        .retry_max_attempts
        .or(file.retry.max_attempts)
        .unwrap_or(d.retry_max_attempts);
    let retry_max_attempts =
        validate_in_range(retry_max_attempts, 0, 100, "TAILVIEW_RETRY_MAX_ATTEMPTS")?;

    let retry_jitter_ms = args
        .retry_jitter_ms
        .or(file.retry.jitter_ms)
        .unwrap_or(d.retry_jitter_ms);
    let retry_jitter_ms = validate_in_range(retry_jitter_ms, 0, 10_000, "TAILVIEW_RETRY_JITTER_MS")?;

    let item_height = args
        .item_height
        .or(file.render.item_height)
        .unwrap_or(d.item_height);
    let item_height = validate_in_range(item_height, 1, 20, "TAILVIEW_ITEM_HEIGHT")?;

    let buffer_count = args
        .buffer_count
        .or(file.render.buffer_count)
        .unwrap_or(d.buffer_count);
    let buffer_count = validate_in_range(buffer_count, 0, 200, "TAILVIEW_BUFFER_COUNT")?;

    let scroll_throttle_ms = args
        .scroll_throttle_ms
        .or(file.render.scroll_throttle_ms)
        .unwrap_or(d.scroll_throttle_ms);
    let scroll_throttle_ms =
        validate_in_range(scroll_throttle_ms, 0, 1000, "TAILVIEW_SCROLL_THROTTLE_MS")?;

    let render_fps = args
        .render_fps
        .or(file.render.fps)
        .unwrap_or(d.render_fps);
    let render_fps = validate_in_range(render_fps, 1, 120, "TAILVIEW_RENDER_FPS")?;

    let pull_anchor = match args.pull_anchor {
        Some(a) => a,
        None => parse_file_value(file.render.pull_anchor, "render.pull_anchor")?
            .unwrap_or(d.pull_anchor),
    };
    let push_anchor = match args.push_anchor {
        Some(a) => a,
        None => parse_file_value(file.render.push_anchor, "render.push_anchor")?
            .unwrap_or(d.push_anchor),
    };

    Ok(Config {
        mode,
        sources,
        pull_url,
        push_url,
        poll_interval_ms,
        request_timeout_ms,
        initial_limit,
        incremental_limit,
        source_utc_offset,
        retry_base_ms,
        retry_cap_ms,
        retry_max_attempts,
        retry_jitter_ms,
        fingerprint_prefix_bytes,
        item_height,
        buffer_count,
        scroll_throttle_ms,
        render_fps,
        pull_anchor,
        push_anchor,
        log_file: args.log_file.or(file.log_file).unwrap_or(d.log_file),
    })
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(self.retry_base_ms),
            cap: Duration::from_millis(self.retry_cap_ms),
            max_attempts: self.retry_max_attempts,
            jitter_ms: self.retry_jitter_ms,
        }
    }

    pub fn anchors(&self) -> ModeAnchors {
        ModeAnchors {
            pull: self.pull_anchor,
            push: self.push_anchor,
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        WireFormat {
            prefix_bytes: self.fingerprint_prefix_bytes,
            source_offset: self.source_utc_offset,
        }
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    /// Print current configuration (useful for debugging)
    pub fn log_summary(&self) {
        log::info!("Tailview Configuration:");
        log::info!("  Mode: {}", self.mode);
        log::info!("  Sources: {}", self.sources.join(", "));
        match self.mode {
            Mode::Pull => {
                log::info!("  Pull URL: {}", self.pull_url);
                log::info!("  Poll Interval: {}ms", self.poll_interval_ms);
                log::info!("  Initial Limit: {}", self.initial_limit);
                log::info!("  Incremental Limit: {}", self.incremental_limit);
            }
            Mode::Push => log::info!("  Push URL: {}", self.push_url),
        }
        log::info!("  Source UTC Offset: {}", self.source_utc_offset);
        log::info!(
            "  Retry: base {}ms, cap {}ms, max {} attempts",
            self.retry_base_ms,
            self.retry_cap_ms,
            self.retry_max_attempts
        );
        log::info!("  Render FPS: {}", self.render_fps);
    }
}
