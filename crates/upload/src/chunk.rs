//! Chunk transfer: one fresh target per attempt, bounded retries, and a
//! bounded pool of parallel workers.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use panup_transfer::{ChunkPlan, ChunkSource, ContentDigest, TransferError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Step, UploadError};
use crate::remote::RemoteApi;
use crate::session::UploadSession;
use crate::types::{UploadEvent, emit};

/// Retry behaviour for transport failures while pushing a chunk.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per chunk, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculates the delay after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }
}

/// Pushes chunk bytes to the remote.
#[derive(Clone)]
pub struct ChunkTransfer {
    remote: Arc<dyn RemoteApi>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<UploadEvent>>,
}

impl ChunkTransfer {
    pub fn new(remote: Arc<dyn RemoteApi>, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            remote,
            retry,
            cancel,
            events: None,
        }
    }

    /// Reports retries on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Sends chunk `index` and returns the digest of the bytes pushed.
    ///
    /// Every attempt asks for a new transfer target. Transport failures are
    /// retried per the [`RetryPolicy`]; any other failure ends the call.
    pub async fn send(
        &self,
        preupload_id: &str,
        index: u32,
        data: Bytes,
    ) -> Result<ContentDigest, UploadError> {
        let digest = tokio::task::spawn_blocking({
            let data = data.clone();
            move || ContentDigest::of(&data)
        })
        .await
        .map_err(|e| join_error(Step::ChunkPush, e))?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.check_cancelled(Step::ChunkTarget)?;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(UploadError::Cancelled { step: Step::ChunkPush });
                }
                r = self.attempt(preupload_id, index, data.clone()) => r,
            };

            match result {
                Ok(()) => return Ok(digest),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        chunk = index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chunk push failed, retrying"
                    );
                    emit(
                        self.events.as_ref(),
                        UploadEvent::ChunkRetry {
                            index,
                            attempt,
                        },
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(UploadError::Cancelled { step: Step::ChunkPush });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        preupload_id: &str,
        index: u32,
        data: Bytes,
    ) -> Result<(), UploadError> {
        let target = self
            .remote
            .get_upload_url(preupload_id, index)
            .await
            .map_err(|e| UploadError::from_api(Step::ChunkTarget, Some(index), e))?;
        self.remote
            .put_chunk(&target, data)
            .await
            .map_err(|e| UploadError::from_api(Step::ChunkPush, Some(index), e))
    }

    /// Sends every pending chunk of `session`, at most `concurrency` at once.
    ///
    /// Results are applied to the session here, by the calling task. The
    /// first failure aborts the workers still running and is returned; the
    /// failing chunk is marked failed.
    pub async fn transfer_all(
        &self,
        session: &mut UploadSession,
        source: &ChunkSource,
        concurrency: usize,
    ) -> Result<(), UploadError> {
        let preupload_id = session
            .preupload_id()
            .ok_or_else(|| UploadError::protocol(Step::ChunkTarget, "session has no preuploadID"))?
            .to_string();
        let total_chunks = session.total_chunks();
        let mut queue = session.pending_chunks().into_iter();
        let mut sent_chunks = total_chunks - queue.len() as u32;
        let limit = concurrency.max(1);

        let mut workers = JoinSet::new();
        let mut failure: Option<UploadError> = None;

        loop {
            while failure.is_none() && workers.len() < limit {
                let Some(plan) = queue.next() else {
                    break;
                };
                workers.spawn(self.clone().run_chunk(
                    preupload_id.clone(),
                    source.clone(),
                    plan,
                ));
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };

            match joined {
                Ok((index, bytes, Ok(digest))) => {
                    session.mark_sent(index, digest)?;
                    sent_chunks += 1;
                    debug!(chunk = index, bytes, sent_chunks, total_chunks, "chunk sent");
                    emit(
                        self.events.as_ref(),
                        UploadEvent::ChunkSent {
                            index,
                            bytes,
                            sent_chunks,
                            total_chunks,
                        },
                    );
                }
                Ok((index, _, Err(e))) => {
                    session.mark_failed(index);
                    if failure.is_none() {
                        warn!(chunk = index, error = %e, "chunk failed, aborting transfer");
                        workers.abort_all();
                        failure = Some(e);
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    if failure.is_none() {
                        workers.abort_all();
                        failure = Some(join_error(Step::ChunkPush, e));
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_chunk(
        self,
        preupload_id: String,
        source: ChunkSource,
        plan: ChunkPlan,
    ) -> (u32, u64, Result<ContentDigest, UploadError>) {
        let index = plan.index;
        let bytes = plan.len();
        let result: Result<ContentDigest, UploadError> = async {
            let data = tokio::task::spawn_blocking(move || source.read_chunk(&plan))
                .await
                .map_err(|e| join_error(Step::ChunkRead, e))?
                .map_err(|source| UploadError::LocalIo {
                    step: Step::ChunkRead,
                    source,
                })?;
            self.send(&preupload_id, index, data).await
        }
        .await;
        (index, bytes, result)
    }

    fn check_cancelled(&self, step: Step) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled { step })
        } else {
            Ok(())
        }
    }
}

fn join_error(step: Step, e: tokio::task::JoinError) -> UploadError {
    UploadError::LocalIo {
        step,
        source: TransferError::Io(std::io::Error::other(format!("task join error: {e}"))),
    }
}
