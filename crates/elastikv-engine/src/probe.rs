//! Workload probe connections and the telemetry wire protocol.
//!
//! A probe is a workload client that keeps one TCP connection to the
//! controller and answers each poll with its statistics for the current
//! sampling period. The exchange is fixed-layout big-endian binary: the
//! engine writes a 4-byte trigger (the value is irrelevant), the probe
//! answers with two 7-field blocks — read-only operations first, then
//! mixed read/write operations — each an `i64` op count followed by six
//! `f64` latency statistics (mean, stddev, min, p95, p99, max).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::sample::ClassSample;

/// One probe's full response for a sampling period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeSample {
    pub read: ClassSample,
    pub mixed: ClassSample,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe did not answer within {0:?}")]
    Timeout(Duration),
}

/// A live probe connection.
#[derive(Debug)]
pub struct Probe<S = TcpStream> {
    stream: S,
    label: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Probe<S> {
    pub fn new(stream: S, label: impl Into<String>) -> Self {
        Self {
            stream,
            label: label.into(),
        }
    }

    /// Identifier used in logs, usually the peer address.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Poll the probe for its statistics for the period just ended.
    ///
    /// Returns `Ok(None)` when the probe reports a zero read-op count:
    /// it has connected but produced no data yet, and its entire
    /// response is discarded for this period.
    pub async fn poll(&mut self, timeout: Duration) -> Result<Option<ProbeSample>, ProbeError> {
        let sample = tokio::time::timeout(timeout, self.exchange())
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;
        if sample.read.ops == 0 {
            debug!(probe = %self.label, "probe has no data yet, discarding response");
            return Ok(None);
        }
        Ok(Some(sample))
    }

    async fn exchange(&mut self) -> Result<ProbeSample, std::io::Error> {
        // Any 4-byte value works as the trigger; the probe blocks on it.
        self.stream.write_i32(0).await?;
        self.stream.flush().await?;
        let read = self.read_class().await?;
        let mixed = self.read_class().await?;
        Ok(ProbeSample { read, mixed })
    }

    async fn read_class(&mut self) -> Result<ClassSample, std::io::Error> {
        Ok(ClassSample {
            ops: self.stream.read_i64().await?,
            mean: self.stream.read_f64().await?,
            stddev: self.stream.read_f64().await?,
            min: self.stream.read_f64().await?,
            p95: self.stream.read_f64().await?,
            p99: self.stream.read_f64().await?,
            max: self.stream.read_f64().await?,
        })
    }
}

/// Shared set of registered probes.
///
/// Probes are added when a workload client connects and removed only on
/// explicit request — a probe that fails a poll stays registered. The
/// engine polls all probes sequentially while holding the registry lock,
/// so registration cannot race a poll in progress.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    inner: Arc<Mutex<Vec<Probe>>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, stream: TcpStream) {
        let label = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(probe = %label, "probe registered");
        self.inner.lock().await.push(Probe::new(stream, label));
    }

    /// Drop the most recently registered probe.
    pub async fn remove_last(&self) -> bool {
        let mut probes = self.inner.lock().await;
        match probes.pop() {
            Some(p) => {
                info!(probe = %p.label(), "probe removed");
                true
            }
            None => {
                warn!("probe removal requested but none are registered");
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Vec<Probe>> {
        self.inner.lock().await
    }
}
