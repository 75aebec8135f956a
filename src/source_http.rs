use crate::{
    config::Config,
    dedup::Cursor,
    error::{TransportError, TransportResult},
    transport::Transport,
    types::{decode_records, Batch, Mode, PollResponse, WireFormat},
    util_text::format_since,
};
use async_trait::async_trait;
use tokio::time::{sleep, Duration};

/// Pull strategy: `GET {base}/polling/file/{source}` on a fixed interval.
///
/// The first request (no cursor) asks for the most recent `initial_limit`
/// records. Later ones ask for everything after the cursor, with
/// `incremental_limit` sent explicitly because the server cuts its own
/// default window before it applies `since`.
pub struct HttpPoll {
    client: reqwest::Client,
    base_url: String,
    interval: Duration,
    timeout: Duration,
    initial_limit: usize,
    incremental_limit: usize,
    format: WireFormat,
}

impl HttpPoll {
    pub fn new(
        base_url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
        initial_limit: usize,
        incremental_limit: usize,
        format: WireFormat,
    ) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .tcp_nodelay(true)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            interval,
            timeout,
            initial_limit,
            incremental_limit,
            format,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.pull_url.clone(),
            Duration::from_millis(cfg.poll_interval_ms),
            Duration::from_millis(cfg.request_timeout_ms),
            cfg.initial_limit,
            cfg.incremental_limit,
            cfg.wire_format(),
        )
    }

    pub fn request_url(&self, source_id: &str, cursor: Cursor) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = format!("{base}/polling/file/{}", urlencoding::encode(source_id));
        match cursor.last_seen() {
            Some(ts) => format!(
                "{path}?limit={}&since={}",
                self.incremental_limit,
                urlencoding::encode(&format_since(ts, self.format.source_offset))
            ),
            None => format!("{path}?limit={}", self.initial_limit),
        }
    }

    async fn fetch(&self, source_id: &str, cursor: Cursor) -> TransportResult<Batch> {
        let url = self.request_url(source_id, cursor);
        log::debug!("📡 GET {url}");

        let res = self.client.get(&url).timeout(self.timeout).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body: PollResponse = res.json().await?;
        if !body.success {
            return Err(TransportError::Remote(
                body.error.unwrap_or_else(|| "request unsuccessful".to_string()),
            ));
        }

        if cursor.last_seen().is_some() && body.messages.len() >= self.incremental_limit {
            log::warn!(
                "⚠️ {source_id}: poll returned a full window of {} records; older ones since the cursor may be missing",
                body.messages.len()
            );
        }
        let records = decode_records(body.messages, &self.format);
        log::debug!("✅ {} record(s) from {source_id}", records.len());
        Ok(Batch {
            records,
            meta: body.file_info,
        })
    }
}

#[async_trait]
impl Transport for HttpPoll {
    fn mode(&self) -> Mode {
        Mode::Pull
    }

    async fn connect(&mut self, source_id: &str, cursor: Cursor) -> TransportResult<Option<Batch>> {
        self.fetch(source_id, cursor).await.map(Some)
    }

    async fn next_batch(&mut self, source_id: &str, cursor: Cursor) -> TransportResult<Batch> {
        // Interval starts after the previous cycle finished, so polls never overlap.
        sleep(self.interval).await;
        self.fetch(source_id, cursor).await
    }

    async fn close(&mut self, _source_id: &str) {}
}
