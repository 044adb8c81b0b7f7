//! Finalization, including the bounded wait for deferred completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Step, UploadError};
use crate::remote::RemoteApi;
use crate::session::{SessionStatus, UploadSession};
use crate::types::{CompletionResult, UploadEvent, emit};

/// Polling behaviour while the remote finishes a deferred completion.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first poll.
    pub interval: Duration,
    /// Cap on the delay between polls.
    pub max_interval: Duration,
    /// Growth of the delay per poll; 1.0 polls at a fixed interval.
    pub backoff_factor: f64,
    /// Total time allowed for polling.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            backoff_factor: 1.0,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    /// Delay before poll number `poll` (1-based).
    pub fn delay_for_poll(&self, poll: u32) -> Duration {
        let exp = poll.saturating_sub(1).min(63) as i32;
        let secs = self.interval.as_secs_f64() * self.backoff_factor.max(1.0).powi(exp);
        Duration::from_secs_f64(secs.min(self.max_interval.max(self.interval).as_secs_f64()))
    }
}

/// Drives a verified session to completion.
pub struct CompletionCoordinator {
    remote: Arc<dyn RemoteApi>,
    poll: PollConfig,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<UploadEvent>>,
}

impl CompletionCoordinator {
    pub fn new(remote: Arc<dyn RemoteApi>, poll: PollConfig, cancel: CancellationToken) -> Self {
        Self {
            remote,
            poll,
            cancel,
            events: None,
        }
    }

    /// Reports polling on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Finalizes `session`, which must be `Verified`.
    ///
    /// When the remote defers, polls until it reports completion, the
    /// [`PollConfig::max_wait`] budget runs out ([`UploadError::Timeout`]) or
    /// the token is cancelled ([`UploadError::Cancelled`]).
    pub async fn complete(
        &self,
        session: &mut UploadSession,
    ) -> Result<CompletionResult, UploadError> {
        let preupload_id = session
            .preupload_id()
            .ok_or_else(|| UploadError::protocol(Step::Complete, "session has no preuploadID"))?
            .to_string();
        session.transition(SessionStatus::Completing)?;

        let resp = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(UploadError::Cancelled { step: Step::Complete });
            }
            r = self.remote.complete_upload(&preupload_id) => {
                r.map_err(|e| UploadError::from_api(Step::Complete, None, e))?
            }
        };
        debug!(
            completed = resp.completed,
            is_async = resp.is_async,
            file_id = resp.file_id,
            "upload_complete answered"
        );

        if resp.completed {
            let file_id = require_file_id(Step::Complete, resp.file_id)?;
            session.set_remote_file_id(file_id);
            session.transition(SessionStatus::Completed)?;
            return Ok(CompletionResult {
                remote_file_id: file_id,
                is_async: resp.is_async,
                is_completed: true,
            });
        }

        if !resp.is_async {
            return Err(UploadError::protocol(
                Step::Complete,
                "upload neither completed nor deferred",
            ));
        }

        session.transition(SessionStatus::AsyncPending)?;
        let file_id = self.poll_until_done(&preupload_id).await?;
        session.set_remote_file_id(file_id);
        session.transition(SessionStatus::Completed)?;
        Ok(CompletionResult {
            remote_file_id: file_id,
            is_async: true,
            is_completed: true,
        })
    }

    async fn poll_until_done(&self, preupload_id: &str) -> Result<i64, UploadError> {
        let started = Instant::now();
        let deadline = started + self.poll.max_wait;
        let mut polls: u32 = 0;

        loop {
            let delay = self.poll.delay_for_poll(polls + 1);
            let waited = started.elapsed();
            if waited + delay > self.poll.max_wait {
                warn!(
                    polls,
                    waited_ms = waited.as_millis() as u64,
                    "gave up waiting for completion"
                );
                return Err(UploadError::Timeout { waited, polls });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(UploadError::Cancelled { step: Step::PollAsync });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            polls += 1;
            emit(self.events.as_ref(), UploadEvent::WaitingAsync { polls });

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(UploadError::Cancelled { step: Step::PollAsync });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let waited = started.elapsed();
                    warn!(
                        polls,
                        waited_ms = waited.as_millis() as u64,
                        "poll outlived the wait budget"
                    );
                    return Err(UploadError::Timeout { waited, polls });
                }
                r = self.remote.upload_async_result(preupload_id) => r,
            };

            match result {
                Ok(r) if r.completed => {
                    let file_id = require_file_id(Step::PollAsync, r.file_id)?;
                    info!(polls, file_id, "deferred completion finished");
                    return Ok(file_id);
                }
                Ok(_) => debug!(polls, "completion still pending"),
                // A lost poll is not fatal; the next one asks again.
                Err(e) if e.is_retryable() => {
                    warn!(polls, error = %e, "poll failed");
                }
                Err(e) => return Err(UploadError::from_api(Step::PollAsync, None, e)),
            }
        }
    }
}

fn require_file_id(step: Step, file_id: i64) -> Result<i64, UploadError> {
    if file_id > 0 {
        Ok(file_id)
    } else {
        Err(UploadError::protocol(
            step,
            format!("completed without a file id ({file_id})"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::{Failure, MockRemote};
    use crate::types::UploadRequest;
    use panup_protocol::{CompleteUploadResponse, CreateFileResponse};
    use panup_transfer::ContentDigest;

    /// A zero-byte session ready for completion.
    fn verified_session() -> UploadSession {
        let mut s = UploadSession::new(UploadRequest::new("/tmp/e", 0), 0, ContentDigest::of(b""));
        s.accept_create_response(CreateFileResponse {
            file_id: 0,
            preupload_id: "pre-1".into(),
            reuse: false,
            slice_size: 0,
        })
        .unwrap();
        s.begin_transfer().unwrap();
        s.transition(SessionStatus::Verified).unwrap();
        s
    }

    fn deferred() -> CompleteUploadResponse {
        CompleteUploadResponse {
            file_id: 0,
            is_async: true,
            completed: false,
        }
    }

    fn coordinator(remote: &Arc<MockRemote>, poll: PollConfig) -> CompletionCoordinator {
        CompletionCoordinator::new(remote.clone(), poll, CancellationToken::new())
    }

    #[test]
    fn fixed_interval_by_default() {
        let poll = PollConfig::default();
        assert_eq!(poll.delay_for_poll(1), Duration::from_secs(1));
        assert_eq!(poll.delay_for_poll(50), Duration::from_secs(1));
    }

    #[test]
    fn backoff_is_capped() {
        let poll = PollConfig {
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(5),
            ..PollConfig::default()
        };
        assert_eq!(poll.delay_for_poll(1), Duration::from_secs(1));
        assert_eq!(poll.delay_for_poll(2), Duration::from_secs(2));
        assert_eq!(poll.delay_for_poll(3), Duration::from_secs(4));
        assert_eq!(poll.delay_for_poll(4), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn synchronous_completion() {
        let remote = Arc::new(MockRemote::new());
        let mut session = verified_session();
        let result = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap();
        assert_eq!(
            result,
            CompletionResult {
                remote_file_id: 1001,
                is_async: false,
                is_completed: true
            }
        );
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.remote_file_id(), Some(1001));
        assert_eq!(remote.calls().async_result, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn async_completion_after_three_polls() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(deferred());
        remote.push_async_result(false, 0);
        remote.push_async_result(false, 0);
        remote.push_async_result(true, 42);

        let mut session = verified_session();
        let started = Instant::now();
        let result = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap();

        assert_eq!(result.remote_file_id, 42);
        assert!(result.is_async);
        assert_eq!(remote.calls().async_result, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_times_out() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(deferred());

        let poll = PollConfig {
            max_wait: Duration::from_millis(5500),
            ..PollConfig::default()
        };
        let mut session = verified_session();
        let err = coordinator(&remote, poll)
            .complete(&mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Timeout { polls: 5, .. }));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(remote.calls().async_result, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_poll_is_cut_at_max_wait() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(deferred());
        remote.delay_async_results(Duration::from_secs(60));

        let poll = PollConfig {
            max_wait: Duration::from_secs(5),
            ..PollConfig::default()
        };
        let mut session = verified_session();
        let started = Instant::now();
        let err = coordinator(&remote, poll)
            .complete(&mut session)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Timeout { polls: 1, .. }));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
        assert_eq!(session.status(), SessionStatus::AsyncPending);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_polling() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(deferred());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let mut session = verified_session();
        let err = CompletionCoordinator::new(remote.clone(), PollConfig::default(), cancel)
            .complete(&mut session)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.step(), Some(Step::PollAsync));
        assert_eq!(remote.calls().async_result, 2);
        assert_eq!(session.status(), SessionStatus::AsyncPending);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_failure_is_tolerated() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(deferred());
        remote.push_async_failure(Failure::Transport("HTTP 502"));
        remote.push_async_result(true, 7);

        let mut session = verified_session();
        let result = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap();
        assert_eq!(result.remote_file_id, 7);
        assert_eq!(remote.calls().async_result, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_while_polling_fails() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(deferred());
        remote.push_async_failure(Failure::Server(3, "preupload expired"));

        let mut session = verified_session();
        let err = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.remote_message(), Some("preupload expired"));
    }

    #[tokio::test]
    async fn neither_completed_nor_async_is_protocol_error() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(CompleteUploadResponse {
            file_id: 0,
            is_async: false,
            completed: false,
        });
        let mut session = verified_session();
        let err = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(remote.calls().async_result, 0);
    }

    #[tokio::test]
    async fn completed_without_file_id_is_protocol_error() {
        let remote = Arc::new(MockRemote::new());
        remote.set_complete_response(CompleteUploadResponse {
            file_id: 0,
            is_async: false,
            completed: true,
        });
        let mut session = verified_session();
        let err = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn requires_verified_session() {
        let remote = Arc::new(MockRemote::new());
        let mut session =
            UploadSession::new(UploadRequest::new("/tmp/e", 0), 0, ContentDigest::of(b""));
        let err = coordinator(&remote, PollConfig::default())
            .complete(&mut session)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(remote.calls().complete, 0);
    }
}
