//! Upload driver: runs one file through the whole pipeline.

use std::sync::Arc;

use panup_transfer::{ChunkSource, TransferError, digest_file, validate_remote_filename};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chunk::ChunkTransfer;
use crate::complete::CompletionCoordinator;
use crate::conflict::resolve_filename;
use crate::error::{Step, UploadError};
use crate::remote::RemoteApi;
use crate::session::{DedupOutcome, UploadSession};
use crate::types::{CompletionResult, UploadEvent, UploadOptions, UploadRequest, emit};
use crate::verify::PartVerifier;

/// Uploads files to the remote, reporting progress as [`UploadEvent`]s.
pub struct Uploader {
    remote: Arc<dyn RemoteApi>,
    options: UploadOptions,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl Uploader {
    /// Creates a new uploader.
    pub fn new(remote: Arc<dyn RemoteApi>, options: UploadOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            remote,
            options,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns the cancellation token shared by every upload of this uploader.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Uploads one file.
    ///
    /// Returns the remote file id once the remote holds the content, either
    /// because it already had it or because every chunk was sent, verified
    /// and finalized.
    pub async fn upload(&self, request: UploadRequest) -> Result<CompletionResult, UploadError> {
        let filename = request.filename.clone();
        match self.run(request).await {
            Ok(result) => {
                info!(
                    filename = %filename,
                    file_id = result.remote_file_id,
                    is_async = result.is_async,
                    "upload completed"
                );
                self.emit(UploadEvent::Completed {
                    file_id: result.remote_file_id,
                });
                Ok(result)
            }
            Err(e) => {
                error!(filename = %filename, error = %e, "upload failed");
                self.emit(UploadEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, request: UploadRequest) -> Result<CompletionResult, UploadError> {
        validate_remote_filename(&request.filename)
            .map_err(|e| UploadError::Config(e.to_string()))?;

        // 1. Hash
        self.check_cancelled(Step::Hash)?;
        let metadata = tokio::fs::metadata(&request.local_path)
            .await
            .map_err(|e| local_io(Step::Hash, e.into()))?;
        if !metadata.is_file() {
            return Err(UploadError::Config(format!(
                "{} is not a regular file",
                request.local_path.display()
            )));
        }
        let size = metadata.len();
        self.emit(UploadEvent::Hashing {
            filename: request.filename.clone(),
            size,
        });

        let path = request.local_path.clone();
        let (digest, source) = tokio::task::spawn_blocking(move || {
            let digest = digest_file(&path)?;
            let source = ChunkSource::open_expecting(&path, size)?;
            Ok::<_, TransferError>((digest, source))
        })
        .await
        .map_err(|e| local_io(Step::Hash, std::io::Error::other(e.to_string()).into()))?
        .map_err(|e| local_io(Step::Hash, e))?;
        debug!(filename = %request.filename, size, %digest, "file hashed");

        // 2. Conflict policy
        self.check_cancelled(Step::ConflictCheck)?;
        let filename = resolve_filename(
            self.remote.as_ref(),
            self.options.conflict,
            request.destination_folder_id,
            &request.filename,
        )
        .await?;
        let request = if filename != request.filename {
            validate_remote_filename(&filename).map_err(|e| UploadError::Config(e.to_string()))?;
            self.emit(UploadEvent::Renamed {
                from: request.filename.clone(),
                to: filename.clone(),
            });
            request.with_filename(filename)
        } else {
            request
        };

        let mut session = UploadSession::new(request, size, digest);
        let result = self.drive(&mut session, &source).await;
        if result.is_err() {
            session.fail();
        }
        result
    }

    async fn drive(
        &self,
        session: &mut UploadSession,
        source: &ChunkSource,
    ) -> Result<CompletionResult, UploadError> {
        // 3. Dedup check and plan
        self.check_cancelled(Step::Create)?;
        match session.initiate(self.remote.as_ref()).await? {
            DedupOutcome::Reused { file_id } => {
                info!(filename = %session.request().filename, file_id, "content already on remote");
                self.emit(UploadEvent::Reused { file_id });
                return Ok(CompletionResult {
                    remote_file_id: file_id,
                    is_async: false,
                    is_completed: true,
                });
            }
            DedupOutcome::ChunkedUpload {
                slice_size,
                total_chunks,
                ..
            } => {
                debug!(slice_size, total_chunks, "chunk plan ready");
                self.emit(UploadEvent::Planned {
                    total_chunks,
                    slice_size,
                    size: session.file_size(),
                });
            }
        }

        // 4. Transfer
        session.begin_transfer()?;
        if session.total_chunks() > 0 {
            ChunkTransfer::new(
                self.remote.clone(),
                self.options.retry.clone(),
                self.cancel.clone(),
            )
            .with_events(self.events_tx.clone())
            .transfer_all(session, source, self.options.concurrency)
            .await?;
            session.finish_transfer()?;
        }

        // 5. Verify
        self.check_cancelled(Step::ListParts)?;
        if session.requires_verification() {
            self.emit(UploadEvent::Verifying {
                total_chunks: session.total_chunks(),
            });
        }
        PartVerifier::new(self.remote.clone()).verify(session).await?;

        // 6. Complete
        self.check_cancelled(Step::Complete)?;
        self.emit(UploadEvent::Completing);
        CompletionCoordinator::new(
            self.remote.clone(),
            self.options.poll.clone(),
            self.cancel.clone(),
        )
        .with_events(self.events_tx.clone())
        .complete(session)
        .await
    }

    fn check_cancelled(&self, step: Step) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled { step })
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: UploadEvent) {
        emit(Some(&self.events_tx), event);
    }
}

fn local_io(step: Step, source: TransferError) -> UploadError {
    UploadError::LocalIo { step, source }
}
