//! Telemetry polling.
//!
//! Once a test is running, [`poll`] samples elapsed time, receive power and the
//! errored-seconds counter at a fixed interval and hands each sample to a
//! [`TelemetrySink`] until a stop predicate on the error count holds.
//!
//! Sinks provided here:
//! - [`CsvSink`]: one CSV line per sample (`storage_csv` feature)
//! - `Vec<TelemetryRow>`: in-memory collection
//! - `UnboundedSender<TelemetryRow>`: streams samples to another task, used by
//!   [`spawn_poller`]
//!
//! # Example
//!
//! ```no_run
//! use mpa_scpi::config::MpaConfig;
//! use mpa_scpi::session::Session;
//! use mpa_scpi::telemetry::{poll, stop_at_threshold, TelemetryRow};
//!
//! # async fn example() -> mpa_scpi::error::AppResult<()> {
//! let config = MpaConfig::load()?;
//! let mut session = Session::bootstrap_from_config(&config).await?;
//! let mut rows: Vec<TelemetryRow> = Vec::new();
//! let summary = poll(
//!     &mut session,
//!     &mut rows,
//!     stop_at_threshold(config.telemetry.error_threshold),
//!     config.telemetry.interval,
//! )
//! .await?;
//! println!("{} samples", summary.rows);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, MpaError};
use crate::protocol::Reply;
use crate::session::Session;
use crate::transport::Transport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// CSV column names, in field order.
pub const CSV_HEADER: [&str; 4] = ["timestamp", "rx_power", "time_elapsed", "err_seconds"];

/// One telemetry sample. Values are the instrument's text, unparsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    /// When the sample was completed.
    pub timestamp: DateTime<Utc>,
    /// QSFP receive power.
    pub rx_power: String,
    /// Elapsed test time in seconds.
    pub time_elapsed: String,
    /// Errored seconds.
    pub err_seconds: String,
}

impl TelemetryRow {
    /// Build a row from the three replies, keeping each reply's value line.
    pub fn from_replies(rx_power: &Reply, time_elapsed: &Reply, err_seconds: &Reply) -> Self {
        let value = |reply: &Reply| reply.first_value().unwrap_or_default().to_string();
        Self {
            timestamp: Utc::now(),
            rx_power: value(rx_power),
            time_elapsed: value(time_elapsed),
            err_seconds: value(err_seconds),
        }
    }

    /// Errored-seconds count, if the reply was an integer.
    pub fn error_count(&self) -> Option<u64> {
        self.err_seconds.trim().parse().ok()
    }
}

/// Destination for telemetry samples.
#[async_trait]
pub trait TelemetrySink: Send {
    /// Store one sample.
    async fn write_row(&mut self, row: &TelemetryRow) -> AppResult<()>;

    /// Flush buffered samples. Called once when polling stops.
    async fn finish(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for Vec<TelemetryRow> {
    async fn write_row(&mut self, row: &TelemetryRow) -> AppResult<()> {
        self.push(row.clone());
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for mpsc::UnboundedSender<TelemetryRow> {
    async fn write_row(&mut self, row: &TelemetryRow) -> AppResult<()> {
        self.send(row.clone())
            .map_err(|_| MpaError::Storage("Telemetry receiver dropped".to_string()))
    }
}

/// Writes samples to a CSV file, one flushed line per sample.
#[cfg(feature = "storage_csv")]
pub struct CsvSink {
    path: std::path::PathBuf,
    writer: csv::Writer<std::fs::File>,
}

#[cfg(feature = "storage_csv")]
impl CsvSink {
    /// Create (or truncate) `path` and write the header line.
    pub fn create(path: impl AsRef<std::path::Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MpaError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let file = std::fs::File::create(&path).map_err(|e| {
            MpaError::Storage(format!("Failed to create CSV file {}: {e}", path.display()))
        })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        info!(path = %path.display(), "Telemetry CSV created");
        Ok(Self { path, writer })
    }

    /// File being written.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(feature = "storage_csv")]
#[async_trait]
impl TelemetrySink for CsvSink {
    async fn write_row(&mut self, row: &TelemetryRow) -> AppResult<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }

    async fn finish(&mut self) -> AppResult<()> {
        self.writer.flush()?;
        info!(path = %self.path.display(), "Telemetry CSV closed");
        Ok(())
    }
}

/// Outcome of a poll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    /// Samples written.
    pub rows: usize,
    /// Last error count that parsed.
    pub last_error_count: Option<u64>,
}

/// Stop once the error count reaches `threshold`.
pub fn stop_at_threshold(threshold: u64) -> impl FnMut(u64) -> bool + Send + 'static {
    move |count| count >= threshold
}

/// Take one sample.
pub async fn sample<T: Transport>(session: &mut Session<T>) -> AppResult<TelemetryRow> {
    let time_elapsed = session.elapsed_test_time().await?;
    let rx_power = session.read_rx_power().await?;
    let err_seconds = session.error_seconds().await?;
    Ok(TelemetryRow::from_replies(
        &rx_power,
        &time_elapsed,
        &err_seconds,
    ))
}

/// Sample until `stop(error_count)` holds, sleeping `interval` between samples.
///
/// A count that does not parse never stops the loop.
pub async fn poll<T, S, F>(
    session: &mut Session<T>,
    sink: &mut S,
    mut stop: F,
    interval: Duration,
) -> AppResult<PollSummary>
where
    T: Transport,
    S: TelemetrySink + ?Sized,
    F: FnMut(u64) -> bool,
{
    let mut summary = PollSummary::default();
    info!(interval_ms = interval.as_millis(), "Telemetry polling started");

    loop {
        let row = sample(session).await?;
        sink.write_row(&row).await?;
        summary.rows += 1;
        debug!(
            rx_power = %row.rx_power,
            time_elapsed = %row.time_elapsed,
            err_seconds = %row.err_seconds,
            "Telemetry sample"
        );

        match row.error_count() {
            Some(count) => {
                summary.last_error_count = Some(count);
                if stop(count) {
                    break;
                }
            }
            None => warn!(reply = ?row.err_seconds, "Error count is not an integer"),
        }

        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    sink.finish().await?;
    info!(
        rows = summary.rows,
        error_count = ?summary.last_error_count,
        "Telemetry polling stopped"
    );
    Ok(summary)
}

/// Poll on a dedicated task, streaming rows over a channel.
///
/// The task hands the session back when polling stops so the caller can keep
/// using or close it.
pub fn spawn_poller<T, F>(
    mut session: Session<T>,
    stop: F,
    interval: Duration,
) -> (
    JoinHandle<AppResult<(Session<T>, PollSummary)>>,
    mpsc::UnboundedReceiver<TelemetryRow>,
)
where
    T: Transport + 'static,
    F: FnMut(u64) -> bool + Send + 'static,
{
    let (mut tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let summary = poll(&mut session, &mut tx, stop, interval).await?;
        Ok((session, summary))
    });
    (handle, rx)
}
